use crate::Result;
use crate::db::{AuditRecord, Database};
use chrono::Utc;
use serde_json::json;

/// 审计日志记录器
/// 所有变更类操作都会留下一条审计记录；审计失败只记日志，不阻断业务操作
#[derive(Debug, Clone)]
pub struct AuditLogger {
    database: Database,
}

impl AuditLogger {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// 记录一次操作，detail 为任意JSON结构
    pub async fn record(&self, tenant_id: &str, action: &str, detail: serde_json::Value) {
        let detail_text = if detail == json!({}) {
            None
        } else {
            Some(detail.to_string())
        };

        if let Err(e) = self
            .database
            .insert_audit(tenant_id, action, detail_text, Utc::now())
            .await
        {
            tracing::error!("审计日志写入失败 [{}] {}: {}", tenant_id, action, e);
        }
    }

    /// 查询租户最近的审计记录
    pub async fn recent(&self, tenant_id: &str, limit: i64) -> Result<Vec<AuditRecord>> {
        self.database.recent_audit(tenant_id, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_and_query() {
        let db = Database::connect_memory().await.unwrap();
        let audit = AuditLogger::new(db);

        audit
            .record("tenant-a", "backup.create", json!({ "job_id": "j1" }))
            .await;
        audit.record("tenant-a", "backup.delete", json!({})).await;

        let records = audit.recent("tenant-a", 10).await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().any(|r| r.action == "backup.create"));
        // 空detail不落盘
        let delete = records.iter().find(|r| r.action == "backup.delete").unwrap();
        assert!(delete.detail.is_none());
    }
}

use crate::audit::AuditLogger;
use crate::db::{
    BackupJob, BackupJobStatus, ChangeOperation, ChangeStats, Database, RestoreLog, RestoreStatus,
    RestoreType, Tenant,
};
use crate::rate_limit::{OperationClass, RateLimiter};
use crate::{Result, VaultError};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// 预览中的单条变更
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewChange {
    pub operation: ChangeOperation,
    pub record_id: String,
    pub timestamp: DateTime<Utc>,
}

/// 干跑预览结果：统计与按表分组的变更明细
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestorePreview {
    pub base_backup_id: String,
    pub stats: ChangeStats,
    pub changes_by_table: BTreeMap<String, Vec<PreviewChange>>,
}

/// 时间点恢复引擎
/// 预览是纯读操作，可以任意次并发调用；确认执行会创建恢复记录，
/// 并持有租户级别的咨询锁，避免同一租户的破坏性操作并发执行
#[derive(Debug, Clone)]
pub struct PitrEngine {
    database: Database,
    rate_limiter: RateLimiter,
    audit: AuditLogger,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl PitrEngine {
    pub fn new(database: Database, rate_limiter: RateLimiter, audit: AuditLogger) -> Self {
        Self {
            database,
            rate_limiter,
            audit,
            locks: Arc::new(DashMap::new()),
        }
    }

    /// 选择基础备份
    /// 指定ID时必须是该租户的 completed 任务；否则自动选择目标时间
    /// 之前最新的 completed full 任务。只认 full 备份，避免串联增量链
    pub async fn select_base_backup(
        &self,
        tenant_id: &str,
        target: DateTime<Utc>,
        base_backup_id: Option<&str>,
    ) -> Result<BackupJob> {
        match base_backup_id {
            Some(id) => {
                let job = self
                    .database
                    .get_backup_job(tenant_id, id)
                    .await?
                    .filter(|job| job.status == BackupJobStatus::Completed)
                    .ok_or(VaultError::NoBaseBackup)?;
                Ok(job)
            }
            None => self
                .database
                .find_base_backup(tenant_id, target)
                .await?
                .ok_or(VaultError::NoBaseBackup),
        }
    }

    /// 统计恢复窗口内的变更
    /// 窗口为 (base.created_at, target]，纯读操作，可任意次调用
    pub async fn compute_restore_stats(
        &self,
        tenant_id: &str,
        base_created_at: DateTime<Utc>,
        target: DateTime<Utc>,
    ) -> Result<ChangeStats> {
        self.database
            .query_change_stats(tenant_id, base_created_at, target)
            .await
    }

    /// 干跑预览：计算统计并按表分组列出将要重放的变更
    /// 不创建恢复记录，不改动任何数据
    pub async fn preview(
        &self,
        tenant_id: &str,
        target: DateTime<Utc>,
        base_backup_id: Option<&str>,
        tables: Option<Vec<String>>,
    ) -> Result<RestorePreview> {
        let base = self
            .select_base_backup(tenant_id, target, base_backup_id)
            .await?;

        let stats = self
            .compute_restore_stats(tenant_id, base.created_at, target)
            .await?;

        let entries = self
            .database
            .query_change_window(tenant_id, base.created_at, target, tables)
            .await?;

        let mut changes_by_table: BTreeMap<String, Vec<PreviewChange>> = BTreeMap::new();
        for entry in entries {
            changes_by_table
                .entry(entry.table_name)
                .or_default()
                .push(PreviewChange {
                    operation: entry.operation,
                    record_id: entry.record_id,
                    timestamp: entry.changed_at,
                });
        }

        Ok(RestorePreview {
            base_backup_id: base.id,
            stats,
            changes_by_table,
        })
    }

    /// 执行确认后的时间点恢复
    /// confirm 是防止误触发破坏性恢复的唯一安全闸，必须显式为 true；
    /// 同步阶段创建 running 状态的恢复记录后立即返回记录ID，重放在后台执行
    #[allow(clippy::too_many_arguments)]
    pub async fn execute(
        &self,
        tenant: &Tenant,
        target: DateTime<Utc>,
        base_backup_id: Option<&str>,
        tables: Option<Vec<String>>,
        confirm: bool,
        initiated_by: &str,
    ) -> Result<String> {
        if !confirm {
            return Err(VaultError::ConfirmationRequired);
        }

        self.rate_limiter
            .check(&tenant.id, OperationClass::RestoreExecute)?;

        let base = self
            .select_base_backup(&tenant.id, target, base_backup_id)
            .await?;

        let stats = self
            .compute_restore_stats(&tenant.id, base.created_at, target)
            .await?;

        let restore_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let metadata = json!({
            "target_timestamp": target,
            "base_backup_id": base.id,
            "base_backup_name": base.name,
            "stats": stats,
            "tables": tables,
            "initiated_by": initiated_by,
        });

        let log = RestoreLog {
            id: restore_id.clone(),
            tenant_id: tenant.id.clone(),
            backup_job_id: base.id.clone(),
            restore_type: RestoreType::Pitr,
            status: RestoreStatus::Running,
            started_at: now,
            completed_at: None,
            duration_secs: None,
            tables_restored: None,
            rows_restored: None,
            error_message: None,
            notes: None,
            metadata: Some(metadata.to_string()),
        };
        self.database.create_restore_log(log).await?;

        self.audit
            .record(
                &tenant.id,
                "restore.execute",
                json!({
                    "restore_log_id": restore_id,
                    "base_backup_id": base.id,
                    "target_timestamp": target,
                    "total_operations": stats.total_operations,
                    "initiated_by": initiated_by,
                }),
            )
            .await;

        tracing::info!(
            "已启动时间点恢复 {} (租户 {}, 基础备份 {}, 目标 {}, 预计 {} 条变更)",
            restore_id,
            tenant.id,
            base.id,
            target,
            stats.total_operations
        );

        let engine = self.clone();
        let tenant_id = tenant.id.clone();
        let base_created_at = base.created_at;
        let background_restore_id = restore_id.clone();
        tokio::spawn(async move {
            engine
                .run_replay(
                    background_restore_id,
                    tenant_id,
                    base_created_at,
                    target,
                    tables,
                )
                .await;
        });

        Ok(restore_id)
    }

    /// 后台重放入口：持有租户锁执行，任何逃逸的错误都落到恢复记录上
    async fn run_replay(
        &self,
        restore_id: String,
        tenant_id: String,
        base_created_at: DateTime<Utc>,
        target: DateTime<Utc>,
        tables: Option<Vec<String>>,
    ) {
        // 租户级咨询锁：同一租户的恢复串行执行
        let lock = self
            .locks
            .entry(tenant_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if let Err(e) = self
            .replay(&restore_id, &tenant_id, base_created_at, target, tables)
            .await
        {
            tracing::error!("时间点恢复 {} 执行失败: {}", restore_id, e);

            if let Err(mark_err) = self
                .database
                .fail_restore_log(&restore_id, Utc::now(), e.to_string())
                .await
            {
                tracing::error!("恢复记录 {} 失败状态写入失败: {}", restore_id, mark_err);
            }
        }
    }

    /// 按变更时间顺序重放变更日志
    /// 单条变更应用失败只记日志并跳过，倾向最大化的部分恢复；
    /// 灾难恢复场景下目标库可能本就部分不一致，全有全无事务反而不可取
    async fn replay(
        &self,
        restore_id: &str,
        tenant_id: &str,
        base_created_at: DateTime<Utc>,
        target: DateTime<Utc>,
        tables: Option<Vec<String>>,
    ) -> Result<()> {
        let started = Utc::now();
        let entries = self
            .database
            .query_change_window(tenant_id, base_created_at, target, tables)
            .await?;

        let total = entries.len();
        let mut applied: i64 = 0;
        let mut touched_tables: HashSet<String> = HashSet::new();

        for entry in entries {
            match self.apply_entry(tenant_id, &entry.table_name, &entry).await {
                Ok(()) => {
                    applied += 1;
                    touched_tables.insert(entry.table_name.clone());
                }
                Err(e) => {
                    tracing::warn!(
                        "恢复 {} 跳过变更 #{} ({} {} {}): {}",
                        restore_id,
                        entry.id,
                        entry.table_name,
                        entry.operation.as_str(),
                        entry.record_id,
                        e
                    );
                }
            }
        }

        let duration_secs = (Utc::now() - started).num_seconds();
        self.database
            .complete_restore_log(
                restore_id,
                Utc::now(),
                duration_secs,
                touched_tables.len() as i32,
                applied,
            )
            .await?;

        tracing::info!(
            "时间点恢复 {} 完成: 应用 {}/{} 条变更, 涉及 {} 张表, 耗时 {} 秒",
            restore_id,
            applied,
            total,
            touched_tables.len(),
            duration_secs
        );
        Ok(())
    }

    /// 应用单条变更：insert/update 重建新值，delete 删除记录
    async fn apply_entry(
        &self,
        tenant_id: &str,
        table_name: &str,
        entry: &crate::db::ChangeLogEntry,
    ) -> Result<()> {
        match entry.operation {
            ChangeOperation::Insert | ChangeOperation::Update => {
                let data = entry.new_value.clone().ok_or_else(|| {
                    VaultError::restore(format!(
                        "变更 #{} 缺少 new_value，无法应用 {}",
                        entry.id,
                        entry.operation.as_str()
                    ))
                })?;
                self.database
                    .upsert_record(tenant_id, table_name, &entry.record_id, data, entry.changed_at)
                    .await
            }
            ChangeOperation::Delete => {
                self.database
                    .delete_record(tenant_id, table_name, &entry.record_id)
                    .await
            }
        }
    }

    /// 查询恢复记录
    pub async fn get_restore_log(&self, tenant_id: &str, restore_id: &str) -> Result<RestoreLog> {
        self.database
            .get_restore_log(tenant_id, restore_id)
            .await?
            .ok_or_else(|| VaultError::RestoreNotFound(restore_id.to_string()))
    }

    /// 列出租户的恢复记录
    pub async fn list_restore_logs(
        &self,
        tenant_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<RestoreLog>> {
        self.database.list_restore_logs(tenant_id, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;
    use crate::db::{BackupJob, BackupJobType, TenantStatus};
    use chrono::Duration;

    fn test_tenant() -> Tenant {
        Tenant {
            id: "tenant-a".to_string(),
            name: "甲方".to_string(),
            status: TenantStatus::Active,
            created_at: Utc::now(),
        }
    }

    fn engine_for(db: &Database) -> PitrEngine {
        PitrEngine::new(
            db.clone(),
            RateLimiter::new(RateLimitConfig {
                window_secs: 60,
                backup_create_max: 100,
                restore_execute_max: 100,
                backup_delete_max: 100,
            }),
            AuditLogger::new(db.clone()),
        )
    }

    /// 直接在库里落一个 completed full 备份作为基础备份
    async fn seed_base_backup(db: &Database, tenant_id: &str, created_at: DateTime<Utc>) -> String {
        let job_id = Uuid::new_v4().to_string();
        let job = BackupJob {
            id: job_id.clone(),
            tenant_id: tenant_id.to_string(),
            job_type: BackupJobType::Full,
            name: format!("backup-full-{}", created_at.format("%Y%m%d%H%M%S")),
            description: None,
            status: BackupJobStatus::Running,
            created_at,
            started_at: Some(created_at),
            completed_at: None,
            size_bytes: None,
            stored_bytes: None,
            table_count: None,
            row_count: None,
            checksum: None,
            error_message: None,
            error_detail: None,
            storage_location: None,
        };
        db.create_backup_job(job).await.unwrap();
        db.complete_backup_job(
            &job_id,
            created_at,
            100,
            50,
            2,
            10,
            "checksum".to_string(),
            format!("{tenant_id}/{job_id}-backup"),
        )
        .await
        .unwrap();
        job_id
    }

    async fn wait_restore_terminal(db: &Database, tenant_id: &str, restore_id: &str) -> RestoreLog {
        for _ in 0..200 {
            let log = db
                .get_restore_log(tenant_id, restore_id)
                .await
                .unwrap()
                .unwrap();
            if log.status != RestoreStatus::Running {
                return log;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("恢复 {restore_id} 未在预期时间内进入终态");
    }

    /// 样例场景：窗口内 3 插入 2 更新 1 删除，跨 orders/customers 两张表
    async fn seed_sample_window(db: &Database, base: DateTime<Utc>) {
        let changes = [
            ("orders", "o1", ChangeOperation::Insert, Some("{\"v\":1}")),
            ("customers", "c1", ChangeOperation::Insert, Some("{\"v\":1}")),
            ("orders", "o2", ChangeOperation::Insert, Some("{\"v\":1}")),
            ("orders", "o1", ChangeOperation::Update, Some("{\"v\":2}")),
            ("customers", "c1", ChangeOperation::Update, Some("{\"v\":2}")),
            ("orders", "o2", ChangeOperation::Delete, None),
        ];
        for (i, (table, record, op, value)) in changes.iter().enumerate() {
            db.append_change(
                "tenant-a",
                table,
                record,
                *op,
                None,
                value.map(|v| v.to_string()),
                base + Duration::hours(i as i64 + 1),
            )
            .await
            .unwrap();
        }
    }

    #[tokio::test]
    async fn test_sample_scenario_stats_and_preview_consistency() {
        let db = Database::connect_memory().await.unwrap();
        let engine = engine_for(&db);
        let base_at = Utc::now() - Duration::days(9);
        seed_base_backup(&db, "tenant-a", base_at).await;
        seed_sample_window(&db, base_at).await;

        let target = Utc::now();
        let preview = engine.preview("tenant-a", target, None, None).await.unwrap();

        assert_eq!(preview.stats.total_operations, 6);
        assert_eq!(preview.stats.insert_count, 3);
        assert_eq!(preview.stats.update_count, 2);
        assert_eq!(preview.stats.delete_count, 1);
        assert_eq!(
            preview.stats.affected_tables,
            vec!["customers".to_string(), "orders".to_string()]
        );

        // 统计与分组明细一致
        assert_eq!(
            preview.stats.total_operations,
            preview.stats.insert_count + preview.stats.update_count + preview.stats.delete_count
        );
        let grouped_total: usize = preview.changes_by_table.values().map(|v| v.len()).sum();
        assert_eq!(grouped_total as i64, preview.stats.total_operations);
        assert_eq!(preview.changes_by_table["orders"].len(), 4);
        assert_eq!(preview.changes_by_table["customers"].len(), 2);
    }

    #[tokio::test]
    async fn test_preview_is_idempotent_and_read_only() {
        let db = Database::connect_memory().await.unwrap();
        let engine = engine_for(&db);
        let base_at = Utc::now() - Duration::days(9);
        seed_base_backup(&db, "tenant-a", base_at).await;
        seed_sample_window(&db, base_at).await;

        db.upsert_record("tenant-a", "orders", "live-1", "{\"v\":9}".to_string(), Utc::now())
            .await
            .unwrap();

        let target = Utc::now();
        let first = engine.preview("tenant-a", target, None, None).await.unwrap();
        let second = engine.preview("tenant-a", target, None, None).await.unwrap();
        assert_eq!(first, second);

        // 干跑不产生恢复记录，不改动在线数据
        assert!(engine.list_restore_logs("tenant-a", None).await.unwrap().is_empty());
        let live = db.get_record("tenant-a", "orders", "live-1").await.unwrap().unwrap();
        assert_eq!(live.data, "{\"v\":9}");
    }

    #[tokio::test]
    async fn test_execute_requires_confirmation() {
        let db = Database::connect_memory().await.unwrap();
        let engine = engine_for(&db);
        let base_at = Utc::now() - Duration::days(9);
        seed_base_backup(&db, "tenant-a", base_at).await;
        seed_sample_window(&db, base_at).await;

        let err = engine
            .execute(&test_tenant(), Utc::now(), None, None, false, "ops")
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::ConfirmationRequired));

        // 未确认的调用不得留下任何痕迹
        assert!(engine.list_restore_logs("tenant-a", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_base_backup_selection_determinism() {
        let db = Database::connect_memory().await.unwrap();
        let engine = engine_for(&db);
        let now = Utc::now();

        seed_base_backup(&db, "tenant-a", now - Duration::days(10)).await;
        let newer = seed_base_backup(&db, "tenant-a", now - Duration::days(5)).await;

        let base = engine
            .select_base_backup("tenant-a", now, None)
            .await
            .unwrap();
        assert_eq!(base.id, newer);
    }

    #[tokio::test]
    async fn test_select_base_backup_errors_without_candidate() {
        let db = Database::connect_memory().await.unwrap();
        let engine = engine_for(&db);

        let err = engine
            .select_base_backup("tenant-a", Utc::now(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::NoBaseBackup));

        // 指定的基础备份不存在同样报错
        let err = engine
            .select_base_backup("tenant-a", Utc::now(), Some("ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::NoBaseBackup));
    }

    #[tokio::test]
    async fn test_replay_applies_full_window_in_order() {
        let db = Database::connect_memory().await.unwrap();
        let engine = engine_for(&db);
        let base_at = Utc::now() - Duration::days(9);
        seed_base_backup(&db, "tenant-a", base_at).await;

        // insert(A, t1) -> update(A, t2) -> delete(A, t3)
        let t1 = base_at + Duration::hours(1);
        let t2 = base_at + Duration::hours(2);
        let t3 = base_at + Duration::hours(3);
        db.append_change("tenant-a", "orders", "A", ChangeOperation::Insert, None, Some("{\"v\":1}".to_string()), t1)
            .await
            .unwrap();
        db.append_change("tenant-a", "orders", "A", ChangeOperation::Update, Some("{\"v\":1}".to_string()), Some("{\"v\":2}".to_string()), t2)
            .await
            .unwrap();
        db.append_change("tenant-a", "orders", "A", ChangeOperation::Delete, Some("{\"v\":2}".to_string()), None, t3)
            .await
            .unwrap();

        // 目标时间 >= t3：重放后记录A不存在
        let restore_id = engine
            .execute(&test_tenant(), t3, None, None, true, "ops")
            .await
            .unwrap();
        let log = wait_restore_terminal(&db, "tenant-a", &restore_id).await;
        assert_eq!(log.status, RestoreStatus::Completed);
        assert_eq!(log.rows_restored, Some(3));
        assert_eq!(log.tables_restored, Some(1));
        assert!(db.get_record("tenant-a", "orders", "A").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replay_stops_at_target_timestamp() {
        let db = Database::connect_memory().await.unwrap();
        let engine = engine_for(&db);
        let base_at = Utc::now() - Duration::days(9);
        seed_base_backup(&db, "tenant-a", base_at).await;

        let t1 = base_at + Duration::hours(1);
        let t2 = base_at + Duration::hours(2);
        let t3 = base_at + Duration::hours(3);
        db.append_change("tenant-a", "orders", "A", ChangeOperation::Insert, None, Some("{\"v\":1}".to_string()), t1)
            .await
            .unwrap();
        db.append_change("tenant-a", "orders", "A", ChangeOperation::Update, Some("{\"v\":1}".to_string()), Some("{\"v\":2}".to_string()), t2)
            .await
            .unwrap();
        db.append_change("tenant-a", "orders", "A", ChangeOperation::Delete, Some("{\"v\":2}".to_string()), None, t3)
            .await
            .unwrap();

        // 目标时间位于 t2 和 t3 之间：记录A应保留 t2 的值
        let target = t2 + Duration::minutes(30);
        let restore_id = engine
            .execute(&test_tenant(), target, None, None, true, "ops")
            .await
            .unwrap();
        let log = wait_restore_terminal(&db, "tenant-a", &restore_id).await;
        assert_eq!(log.status, RestoreStatus::Completed);
        assert_eq!(log.rows_restored, Some(2));

        let record = db.get_record("tenant-a", "orders", "A").await.unwrap().unwrap();
        assert_eq!(record.data, "{\"v\":2}");
    }

    #[tokio::test]
    async fn test_replay_skips_broken_entries_and_continues() {
        let db = Database::connect_memory().await.unwrap();
        let engine = engine_for(&db);
        let base_at = Utc::now() - Duration::days(9);
        seed_base_backup(&db, "tenant-a", base_at).await;

        // 缺失 new_value 的 insert 无法应用，应被跳过
        db.append_change("tenant-a", "orders", "bad", ChangeOperation::Insert, None, None, base_at + Duration::hours(1))
            .await
            .unwrap();
        db.append_change("tenant-a", "orders", "good", ChangeOperation::Insert, None, Some("{\"v\":1}".to_string()), base_at + Duration::hours(2))
            .await
            .unwrap();

        let restore_id = engine
            .execute(&test_tenant(), Utc::now(), None, None, true, "ops")
            .await
            .unwrap();
        let log = wait_restore_terminal(&db, "tenant-a", &restore_id).await;

        // 部分恢复仍然算 completed
        assert_eq!(log.status, RestoreStatus::Completed);
        assert_eq!(log.rows_restored, Some(1));
        assert!(db.get_record("tenant-a", "orders", "good").await.unwrap().is_some());
        assert!(db.get_record("tenant-a", "orders", "bad").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_execute_filters_tables() {
        let db = Database::connect_memory().await.unwrap();
        let engine = engine_for(&db);
        let base_at = Utc::now() - Duration::days(9);
        seed_base_backup(&db, "tenant-a", base_at).await;
        seed_sample_window(&db, base_at).await;

        let restore_id = engine
            .execute(
                &test_tenant(),
                Utc::now(),
                None,
                Some(vec!["customers".to_string()]),
                true,
                "ops",
            )
            .await
            .unwrap();
        let log = wait_restore_terminal(&db, "tenant-a", &restore_id).await;

        assert_eq!(log.status, RestoreStatus::Completed);
        assert_eq!(log.tables_restored, Some(1));
        assert_eq!(log.rows_restored, Some(2));
        // orders 表未被触碰
        assert!(db.get_record("tenant-a", "orders", "o1").await.unwrap().is_none());
        assert!(db.get_record("tenant-a", "customers", "c1").await.unwrap().is_some());
    }
}

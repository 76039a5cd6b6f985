use crate::audit::AuditLogger;
use crate::constants::backup as backup_constants;
use crate::db::{BackupJob, BackupJobStatus, BackupJobType, Database, Tenant};
use crate::object_store::LocalObjectStore;
use crate::rate_limit::{OperationClass, RateLimiter};
use crate::{Result, VaultError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// 备份任务管理器
/// 创建请求同步返回任务ID，导出工作在后台任务中完成，
/// 结果只能通过轮询任务记录观察
#[derive(Debug, Clone)]
pub struct BackupJobManager {
    database: Database,
    object_store: LocalObjectStore,
    rate_limiter: RateLimiter,
    audit: AuditLogger,
    default_tables: Vec<String>,
}

/// 备份载荷：单个对象内打包所有导出表
#[derive(Debug, Serialize, Deserialize)]
pub struct BackupPayload {
    pub version: u32,
    pub tenant_id: String,
    pub job_id: String,
    pub created_at: DateTime<Utc>,
    pub tables: Vec<TableDump>,
}

/// 单表导出结果
#[derive(Debug, Serialize, Deserialize)]
pub struct TableDump {
    pub table_name: String,
    pub rows: Vec<BackupRow>,
}

/// 单行导出结果
#[derive(Debug, Serialize, Deserialize)]
pub struct BackupRow {
    pub record_id: String,
    pub data: String,
}

impl BackupJobManager {
    pub fn new(
        database: Database,
        object_store: LocalObjectStore,
        rate_limiter: RateLimiter,
        audit: AuditLogger,
        default_tables: Vec<String>,
    ) -> Self {
        Self {
            database,
            object_store,
            rate_limiter,
            audit,
            default_tables,
        }
    }

    /// 创建备份任务
    /// 同步阶段完成校验与记账后立即返回任务ID，导出在后台执行；
    /// 后台失败不会抛回调用方，只会记录在任务记录上
    pub async fn create_backup(
        &self,
        tenant: &Tenant,
        job_type: BackupJobType,
        name: Option<String>,
        description: Option<String>,
        tables: Option<Vec<String>>,
    ) -> Result<String> {
        self.rate_limiter
            .check(&tenant.id, OperationClass::BackupCreate)?;

        let tables = self.resolve_tables(tables)?;

        let job_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let name = name.unwrap_or_else(|| {
            format!(
                "backup-{}-{}",
                job_type.as_str(),
                now.format("%Y%m%d%H%M%S")
            )
        });

        let job = BackupJob {
            id: job_id.clone(),
            tenant_id: tenant.id.clone(),
            job_type,
            name: name.clone(),
            description,
            status: BackupJobStatus::Running,
            created_at: now,
            started_at: Some(now),
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
        self.database.create_backup_job(job).await?;

        self.audit
            .record(
                &tenant.id,
                "backup.create",
                json!({
                    "job_id": job_id,
                    "job_type": job_type.as_str(),
                    "name": name,
                    "tables": tables,
                }),
            )
            .await;

        tracing::info!(
            "已创建备份任务 {} (租户 {}, 类型 {})",
            job_id,
            tenant.id,
            job_type.as_str()
        );

        // 后台导出，调用方不等待
        let manager = self.clone();
        let tenant_id = tenant.id.clone();
        let background_job_id = job_id.clone();
        tokio::spawn(async move {
            manager
                .run_export(background_job_id, tenant_id, tables)
                .await;
        });

        Ok(job_id)
    }

    /// 解析生效的表集合：调用方子集优先，否则使用配置的默认表列表
    fn resolve_tables(&self, tables: Option<Vec<String>>) -> Result<Vec<String>> {
        match tables {
            Some(tables) => {
                if tables.is_empty() {
                    return Err(VaultError::validation("tables 不能为空列表"));
                }
                if tables.iter().any(|t| t.trim().is_empty()) {
                    return Err(VaultError::validation("tables 中存在空表名"));
                }
                Ok(tables)
            }
            None => Ok(self.default_tables.clone()),
        }
    }

    /// 后台导出入口：任何逃逸的错误都落到任务记录上
    async fn run_export(&self, job_id: String, tenant_id: String, tables: Vec<String>) {
        if let Err(e) = self.execute_backup(&job_id, &tenant_id, &tables).await {
            tracing::error!("备份任务 {} 执行失败: {}", job_id, e);

            let detail = format!("{e:?}");
            if let Err(mark_err) = self
                .database
                .fail_backup_job(&job_id, Utc::now(), e.to_string(), Some(detail))
                .await
            {
                tracing::error!("备份任务 {} 失败状态写入失败: {}", job_id, mark_err);
            }
        }
    }

    /// 执行实际的导出操作
    async fn execute_backup(&self, job_id: &str, tenant_id: &str, tables: &[String]) -> Result<()> {
        let started = Utc::now();
        let mut dumps = Vec::new();
        let mut row_count: i64 = 0;

        for table in tables {
            // 单表读取失败不致命：跳过该表继续导出其余表
            match self.database.scan_table(tenant_id, table).await {
                Ok(records) => {
                    row_count += records.len() as i64;
                    dumps.push(TableDump {
                        table_name: table.clone(),
                        rows: records
                            .into_iter()
                            .map(|r| BackupRow {
                                record_id: r.record_id,
                                data: r.data,
                            })
                            .collect(),
                    });
                }
                Err(e) => {
                    tracing::warn!("备份任务 {} 导出表 {} 失败，已跳过: {}", job_id, table, e);
                }
            }
        }

        let table_count = dumps.len() as i32;
        let payload = BackupPayload {
            version: backup_constants::PAYLOAD_VERSION,
            tenant_id: tenant_id.to_string(),
            job_id: job_id.to_string(),
            created_at: started,
            tables: dumps,
        };

        let raw = serde_json::to_vec(&payload)?;
        let size_bytes = raw.len() as i64;

        // 压缩与哈希是CPU密集操作，放到阻塞线程池执行
        let (compressed, checksum) = tokio::task::spawn_blocking(move || {
            use flate2::Compression;
            use flate2::write::GzEncoder;
            use std::io::Write;

            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&raw)?;
            let compressed = encoder
                .finish()
                .map_err(|e| VaultError::backup(format!("压缩备份载荷失败: {e}")))?;

            let checksum = format!("{:x}", Sha256::digest(&compressed));
            Ok::<(Vec<u8>, String), VaultError>((compressed, checksum))
        })
        .await??;

        let stored_bytes = compressed.len() as i64;
        let key = LocalObjectStore::backup_key(tenant_id, job_id);
        self.object_store.put(&key, &compressed).await?;

        let duration = Utc::now() - started;
        self.database
            .complete_backup_job(
                job_id,
                Utc::now(),
                size_bytes,
                stored_bytes,
                table_count,
                row_count,
                checksum,
                key.clone(),
            )
            .await?;

        tracing::info!(
            "备份任务 {} 完成: {} 表 {} 行, 原始 {} 字节, 存储 {} 字节, 耗时 {} 秒, 位置 {}",
            job_id,
            table_count,
            row_count,
            size_bytes,
            stored_bytes,
            duration.num_seconds(),
            key
        );
        Ok(())
    }

    /// 查询备份任务
    pub async fn get_job(&self, tenant_id: &str, job_id: &str) -> Result<BackupJob> {
        self.database
            .get_backup_job(tenant_id, job_id)
            .await?
            .ok_or_else(|| VaultError::BackupNotFound(job_id.to_string()))
    }

    /// 列出租户的备份任务
    pub async fn list_jobs(&self, tenant_id: &str, limit: Option<i64>) -> Result<Vec<BackupJob>> {
        self.database.list_backup_jobs(tenant_id, limit).await
    }

    /// 删除备份任务（管理操作）：同时删除后备对象
    pub async fn delete_backup(&self, tenant: &Tenant, job_id: &str) -> Result<()> {
        self.rate_limiter
            .check(&tenant.id, OperationClass::BackupDelete)?;

        let job = self.get_job(&tenant.id, job_id).await?;

        if let Some(location) = &job.storage_location {
            self.object_store.delete(location).await?;
        }
        self.database.delete_backup_job(&tenant.id, job_id).await?;

        self.audit
            .record(&tenant.id, "backup.delete", json!({ "job_id": job_id }))
            .await;

        tracing::info!("备份任务 {} 已删除 (租户 {})", job_id, tenant.id);
        Ok(())
    }

    /// 校验备份对象完整性：读取、校验哈希并解析载荷
    pub async fn verify_backup(&self, tenant_id: &str, job_id: &str) -> Result<bool> {
        let job = self.get_job(tenant_id, job_id).await?;

        let Some(location) = &job.storage_location else {
            return Ok(false);
        };
        if !self.object_store.exists(location).await? {
            return Ok(false);
        }

        let compressed = self.object_store.get(location).await?;

        if let Some(expected) = &job.checksum {
            let actual = format!("{:x}", Sha256::digest(&compressed));
            if &actual != expected {
                tracing::warn!("备份任务 {} 哈希不匹配: {} != {}", job_id, actual, expected);
                return Ok(false);
            }
        }

        // 解压并解析载荷，能完整解析说明对象未损坏
        let parsed = tokio::task::spawn_blocking(move || {
            use flate2::read::GzDecoder;
            use std::io::Read;

            let mut decoder = GzDecoder::new(compressed.as_slice());
            let mut raw = Vec::new();
            decoder.read_to_end(&mut raw)?;

            let payload: BackupPayload = serde_json::from_slice(&raw)?;
            Ok::<BackupPayload, VaultError>(payload)
        })
        .await?;

        match parsed {
            Ok(payload) => Ok(payload.job_id == job.id),
            Err(e) => {
                tracing::warn!("备份任务 {} 载荷解析失败: {}", job_id, e);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;
    use crate::db::TenantStatus;
    use std::time::Duration;
    use tempfile::tempdir;

    fn test_tenant() -> Tenant {
        Tenant {
            id: "tenant-a".to_string(),
            name: "甲方".to_string(),
            status: TenantStatus::Active,
            created_at: Utc::now(),
        }
    }

    fn test_rate_limit() -> RateLimitConfig {
        RateLimitConfig {
            window_secs: 60,
            backup_create_max: 10,
            restore_execute_max: 10,
            backup_delete_max: 10,
        }
    }

    async fn build_manager(db: &Database, root: std::path::PathBuf) -> BackupJobManager {
        BackupJobManager::new(
            db.clone(),
            LocalObjectStore::new(root).unwrap(),
            RateLimiter::new(test_rate_limit()),
            AuditLogger::new(db.clone()),
            vec!["orders".to_string(), "customers".to_string()],
        )
    }

    async fn wait_terminal(db: &Database, tenant_id: &str, job_id: &str) -> BackupJob {
        for _ in 0..200 {
            let job = db.get_backup_job(tenant_id, job_id).await.unwrap().unwrap();
            if job.status.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("备份任务 {job_id} 未在预期时间内进入终态");
    }

    #[tokio::test]
    async fn test_create_backup_completes_in_background() {
        let temp_dir = tempdir().unwrap();
        let db = Database::connect_memory().await.unwrap();
        let manager = build_manager(&db, temp_dir.path().to_path_buf()).await;
        let tenant = test_tenant();

        let now = Utc::now();
        db.upsert_record("tenant-a", "orders", "o1", "{\"amount\":10}".to_string(), now)
            .await
            .unwrap();
        db.upsert_record("tenant-a", "orders", "o2", "{\"amount\":20}".to_string(), now)
            .await
            .unwrap();
        db.upsert_record("tenant-a", "customers", "c1", "{\"name\":\"张三\"}".to_string(), now)
            .await
            .unwrap();

        let job_id = manager
            .create_backup(&tenant, BackupJobType::Full, None, None, None)
            .await
            .unwrap();

        let job = wait_terminal(&db, "tenant-a", &job_id).await;
        assert_eq!(job.status, BackupJobStatus::Completed);
        assert_eq!(job.table_count, Some(2));
        assert_eq!(job.row_count, Some(3));
        assert!(job.size_bytes.unwrap() > 0);
        assert!(job.stored_bytes.unwrap() > 0);
        assert!(job.completed_at.is_some());
        assert_eq!(
            job.storage_location.as_deref(),
            Some(format!("tenant-a/{job_id}-backup").as_str())
        );
        assert!(job.name.starts_with("backup-full-"));

        // 对象完整性校验通过
        assert!(manager.verify_backup("tenant-a", &job_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_create_backup_rate_limited() {
        let temp_dir = tempdir().unwrap();
        let db = Database::connect_memory().await.unwrap();
        let manager = BackupJobManager::new(
            db.clone(),
            LocalObjectStore::new(temp_dir.path().to_path_buf()).unwrap(),
            RateLimiter::new(RateLimitConfig {
                window_secs: 60,
                backup_create_max: 1,
                restore_execute_max: 1,
                backup_delete_max: 1,
            }),
            AuditLogger::new(db.clone()),
            vec!["orders".to_string()],
        );
        let tenant = test_tenant();

        manager
            .create_backup(&tenant, BackupJobType::Full, None, None, None)
            .await
            .unwrap();

        let err = manager
            .create_backup(&tenant, BackupJobType::Full, None, None, None)
            .await
            .unwrap_err();
        assert!(err.retry_after().is_some());
    }

    #[tokio::test]
    async fn test_create_backup_rejects_empty_tables() {
        let temp_dir = tempdir().unwrap();
        let db = Database::connect_memory().await.unwrap();
        let manager = build_manager(&db, temp_dir.path().to_path_buf()).await;
        let tenant = test_tenant();

        let err = manager
            .create_backup(&tenant, BackupJobType::Full, None, None, Some(vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Validation(_)));
    }

    #[tokio::test]
    async fn test_object_store_failure_marks_job_failed() {
        let temp_dir = tempdir().unwrap();
        let db = Database::connect_memory().await.unwrap();

        // 用一个普通文件占住租户目录的位置，使对象写入必然失败
        let blocked_root = temp_dir.path().join("root");
        std::fs::create_dir_all(&blocked_root).unwrap();
        std::fs::write(blocked_root.join("tenant-a"), b"occupied").unwrap();

        let manager = build_manager(&db, blocked_root).await;
        let tenant = test_tenant();

        let job_id = manager
            .create_backup(&tenant, BackupJobType::Full, None, None, None)
            .await
            .unwrap();

        let job = wait_terminal(&db, "tenant-a", &job_id).await;
        assert_eq!(job.status, BackupJobStatus::Failed);
        assert!(job.error_message.is_some());
        assert!(job.error_detail.is_some());
        assert!(job.storage_location.is_none());
    }

    #[tokio::test]
    async fn test_delete_backup_removes_object() {
        let temp_dir = tempdir().unwrap();
        let db = Database::connect_memory().await.unwrap();
        let manager = build_manager(&db, temp_dir.path().to_path_buf()).await;
        let tenant = test_tenant();

        let job_id = manager
            .create_backup(&tenant, BackupJobType::Full, None, None, None)
            .await
            .unwrap();
        let job = wait_terminal(&db, "tenant-a", &job_id).await;
        let location = job.storage_location.clone().unwrap();

        manager.delete_backup(&tenant, &job_id).await.unwrap();

        assert!(matches!(
            manager.get_job("tenant-a", &job_id).await,
            Err(VaultError::BackupNotFound(_))
        ));
        assert!(!manager.object_store.exists(&location).await.unwrap());
    }
}

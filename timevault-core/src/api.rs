use crate::audit::AuditLogger;
use crate::backup::BackupJobManager;
use crate::config::AppConfig;
use crate::db::{BackupJob, BackupJobType, Database, HealthSnapshot, RestoreLog};
use crate::health::{HealthMonitor, HealthReport};
use crate::object_store::LocalObjectStore;
use crate::pitr::{PitrEngine, RestorePreview};
use crate::rate_limit::RateLimiter;
use crate::tenant::TenantResolver;
use crate::{Result, VaultError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 创建备份请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBackupRequest {
    pub tenant_id: String,
    pub backup_type: String,
    pub name: Option<String>,
    pub description: Option<String>,
    /// 指定导出的表子集，缺省时使用配置的默认表列表
    pub tables: Option<Vec<String>>,
}

/// 创建备份响应：任务已受理，结果通过轮询任务记录获取
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBackupResponse {
    pub job_id: String,
    pub status: String,
}

/// 时间点恢复请求
/// dry_run 为 true 时只做预览；执行恢复必须显式设置 confirm_restore
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreRequest {
    pub tenant_id: String,
    pub target_timestamp: DateTime<Utc>,
    pub base_backup_id: Option<String>,
    pub tables: Option<Vec<String>>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub confirm_restore: bool,
    pub initiated_by: Option<String>,
}

/// 时间点恢复响应
/// 预览时携带 preview，执行时携带恢复记录ID
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreResponse {
    pub dry_run: bool,
    pub restore_log_id: Option<String>,
    pub preview: Option<RestorePreview>,
}

/// 统一的错误响应体
/// 请求类错误（参数、租户、限流、未确认）与系统内部错误分开编码
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

/// 统一的响应信封：success 标志 + 数据或错误体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T> ApiResponse<T> {
    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self {
                success: true,
                data: Some(data),
                error: None,
            },
            Err(e) => Self {
                success: false,
                data: None,
                error: Some(ErrorBody::from(&e)),
            },
        }
    }
}

impl From<&VaultError> for ErrorBody {
    fn from(err: &VaultError) -> Self {
        let code = match err {
            VaultError::Validation(_) => "invalid_request",
            VaultError::TenantNotFound(_) => "tenant_not_found",
            VaultError::TenantSuspended(_) => "tenant_suspended",
            VaultError::RateLimited { .. } => "rate_limited",
            VaultError::ConfirmationRequired => "confirmation_required",
            VaultError::NoBaseBackup => "no_base_backup",
            VaultError::BackupNotFound(_) => "backup_not_found",
            VaultError::RestoreNotFound(_) => "restore_not_found",
            _ => "internal_error",
        };

        // 内部错误不向调用方透出细节
        let message = if code != "internal_error" {
            err.to_string()
        } else {
            "服务内部错误，请稍后重试".to_string()
        };

        ErrorBody {
            code: code.to_string(),
            message,
            retry_after_secs: err.retry_after(),
        }
    }
}

/// 备份与恢复子系统的统一入口
/// 所有操作先解析租户，再分派到对应的管理器
#[derive(Debug, Clone)]
pub struct VaultService {
    resolver: TenantResolver,
    backups: BackupJobManager,
    pitr: PitrEngine,
    health: HealthMonitor,
    audit: AuditLogger,
}

impl VaultService {
    /// 按配置组装完整的服务
    /// 速率限制器在备份与恢复之间共享，保证配额全局生效
    pub fn new(database: Database, config: &AppConfig) -> Result<Self> {
        let object_store = LocalObjectStore::new(config.get_object_root())?;
        let rate_limiter = RateLimiter::new(config.rate_limit.clone());
        let audit = AuditLogger::new(database.clone());

        Ok(Self {
            resolver: TenantResolver::new(database.clone()),
            backups: BackupJobManager::new(
                database.clone(),
                object_store,
                rate_limiter.clone(),
                audit.clone(),
                config.tables.default_tables.clone(),
            ),
            pitr: PitrEngine::new(database.clone(), rate_limiter, audit.clone()),
            health: HealthMonitor::new(
                database,
                config.health.clone(),
                config.storage.capacity_ceiling_bytes,
            ),
            audit,
        })
    }

    /// 测试与嵌入场景下以现成组件组装服务
    pub fn from_parts(
        resolver: TenantResolver,
        backups: BackupJobManager,
        pitr: PitrEngine,
        health: HealthMonitor,
        audit: AuditLogger,
    ) -> Self {
        Self {
            resolver,
            backups,
            pitr,
            health,
            audit,
        }
    }

    pub fn tenants(&self) -> &TenantResolver {
        &self.resolver
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    pub fn health_monitor(&self) -> &HealthMonitor {
        &self.health
    }

    // ========== 备份 ==========

    /// 受理备份创建请求
    pub async fn create_backup(&self, request: CreateBackupRequest) -> Result<CreateBackupResponse> {
        let tenant = self.resolver.resolve(&request.tenant_id).await?;
        let job_type = BackupJobType::parse(&request.backup_type)?;

        let job_id = self
            .backups
            .create_backup(
                &tenant,
                job_type,
                request.name,
                request.description,
                request.tables,
            )
            .await?;

        Ok(CreateBackupResponse {
            job_id,
            status: "running".to_string(),
        })
    }

    /// 查询备份任务
    pub async fn get_backup(&self, tenant_id: &str, job_id: &str) -> Result<BackupJob> {
        let tenant = self.resolver.resolve(tenant_id).await?;
        self.backups.get_job(&tenant.id, job_id).await
    }

    /// 列出备份任务
    pub async fn list_backups(&self, tenant_id: &str, limit: Option<i64>) -> Result<Vec<BackupJob>> {
        let tenant = self.resolver.resolve(tenant_id).await?;
        self.backups.list_jobs(&tenant.id, limit).await
    }

    /// 删除备份任务及后备对象
    pub async fn delete_backup(&self, tenant_id: &str, job_id: &str) -> Result<()> {
        let tenant = self.resolver.resolve(tenant_id).await?;
        self.backups.delete_backup(&tenant, job_id).await
    }

    /// 校验备份对象完整性
    pub async fn verify_backup(&self, tenant_id: &str, job_id: &str) -> Result<bool> {
        let tenant = self.resolver.resolve(tenant_id).await?;
        self.backups.verify_backup(&tenant.id, job_id).await
    }

    // ========== 恢复 ==========

    /// 受理时间点恢复请求：dry_run 走预览，否则执行恢复
    pub async fn restore(&self, request: RestoreRequest) -> Result<RestoreResponse> {
        let tenant = self.resolver.resolve(&request.tenant_id).await?;

        if request.dry_run {
            let preview = self
                .pitr
                .preview(
                    &tenant.id,
                    request.target_timestamp,
                    request.base_backup_id.as_deref(),
                    request.tables,
                )
                .await?;
            return Ok(RestoreResponse {
                dry_run: true,
                restore_log_id: None,
                preview: Some(preview),
            });
        }

        let initiated_by = request.initiated_by.as_deref().unwrap_or("unknown");
        let restore_log_id = self
            .pitr
            .execute(
                &tenant,
                request.target_timestamp,
                request.base_backup_id.as_deref(),
                request.tables,
                request.confirm_restore,
                initiated_by,
            )
            .await?;

        Ok(RestoreResponse {
            dry_run: false,
            restore_log_id: Some(restore_log_id),
            preview: None,
        })
    }

    /// 查询恢复记录
    pub async fn get_restore(&self, tenant_id: &str, restore_id: &str) -> Result<RestoreLog> {
        let tenant = self.resolver.resolve(tenant_id).await?;
        self.pitr.get_restore_log(&tenant.id, restore_id).await
    }

    /// 列出恢复记录
    pub async fn list_restores(
        &self,
        tenant_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<RestoreLog>> {
        let tenant = self.resolver.resolve(tenant_id).await?;
        self.pitr.list_restore_logs(&tenant.id, limit).await
    }

    // ========== 健康 ==========

    /// 按需检查单个租户的健康状况
    pub async fn check_health(&self, tenant_id: &str) -> Result<HealthReport> {
        let tenant = self.resolver.resolve(tenant_id).await?;
        self.health.check_tenant(&tenant.id).await
    }

    /// 查询历史健康快照
    pub async fn health_history(
        &self,
        tenant_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<HealthSnapshot>> {
        let tenant = self.resolver.resolve(tenant_id).await?;
        self.health.history(&tenant.id, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{BackupJobStatus, RestoreStatus, TenantStatus};
    use chrono::Duration;
    use tempfile::tempdir;

    async fn service_with_tenant() -> (Database, VaultService, tempfile::TempDir) {
        let temp_dir = tempdir().unwrap();
        let db = Database::connect_memory().await.unwrap();

        let mut config = AppConfig::default();
        config.storage.object_root = temp_dir.path().to_string_lossy().to_string();
        config.tables.default_tables = vec!["orders".to_string(), "customers".to_string()];

        let service = VaultService::new(db.clone(), &config).unwrap();
        service
            .tenants()
            .register("tenant-a", "甲方", TenantStatus::Active)
            .await
            .unwrap();

        (db, service, temp_dir)
    }

    async fn wait_backup_done(service: &VaultService, job_id: &str) -> BackupJob {
        for _ in 0..200 {
            let job = service.get_backup("tenant-a", job_id).await.unwrap();
            if job.status.is_terminal() {
                return job;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("备份任务 {job_id} 未在预期时间内进入终态");
    }

    #[tokio::test]
    async fn test_backup_then_restore_flow() {
        let (db, service, _guard) = service_with_tenant().await;
        let now = Utc::now();

        db.upsert_record("tenant-a", "orders", "o1", "{\"v\":1}".to_string(), now)
            .await
            .unwrap();

        // 创建备份并等待完成
        let response = service
            .create_backup(CreateBackupRequest {
                tenant_id: "tenant-a".to_string(),
                backup_type: "full".to_string(),
                name: None,
                description: None,
                tables: None,
            })
            .await
            .unwrap();
        assert_eq!(response.status, "running");
        let job = wait_backup_done(&service, &response.job_id).await;
        assert_eq!(job.status, BackupJobStatus::Completed);

        // 备份之后追加变更
        db.append_change(
            "tenant-a",
            "orders",
            "o2",
            crate::db::ChangeOperation::Insert,
            None,
            Some("{\"v\":2}".to_string()),
            Utc::now() + Duration::milliseconds(10),
        )
        .await
        .unwrap();

        // 预览
        let target = Utc::now() + Duration::seconds(1);
        let preview = service
            .restore(RestoreRequest {
                tenant_id: "tenant-a".to_string(),
                target_timestamp: target,
                base_backup_id: None,
                tables: None,
                dry_run: true,
                confirm_restore: false,
                initiated_by: None,
            })
            .await
            .unwrap();
        assert!(preview.dry_run);
        assert_eq!(preview.preview.unwrap().stats.total_operations, 1);
        assert!(preview.restore_log_id.is_none());

        // 执行
        let executed = service
            .restore(RestoreRequest {
                tenant_id: "tenant-a".to_string(),
                target_timestamp: target,
                base_backup_id: None,
                tables: None,
                dry_run: false,
                confirm_restore: true,
                initiated_by: Some("ops".to_string()),
            })
            .await
            .unwrap();
        let restore_id = executed.restore_log_id.unwrap();

        for _ in 0..200 {
            let log = service.get_restore("tenant-a", &restore_id).await.unwrap();
            if log.status != RestoreStatus::Running {
                assert_eq!(log.status, RestoreStatus::Completed);
                assert_eq!(log.rows_restored, Some(1));
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("恢复未在预期时间内完成");
    }

    #[tokio::test]
    async fn test_unknown_tenant_is_rejected_at_entry() {
        let (_db, service, _guard) = service_with_tenant().await;

        let err = service
            .create_backup(CreateBackupRequest {
                tenant_id: "ghost".to_string(),
                backup_type: "full".to_string(),
                name: None,
                description: None,
                tables: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::TenantNotFound(_)));
        assert!(err.is_request_error());
    }

    #[tokio::test]
    async fn test_invalid_backup_type_is_rejected() {
        let (_db, service, _guard) = service_with_tenant().await;

        let err = service
            .create_backup(CreateBackupRequest {
                tenant_id: "tenant-a".to_string(),
                backup_type: "weekly".to_string(),
                name: None,
                description: None,
                tables: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Validation(_)));
    }

    #[test]
    fn test_response_envelope() {
        let ok = ApiResponse::from_result(Ok(CreateBackupResponse {
            job_id: "j1".to_string(),
            status: "running".to_string(),
        }));
        assert!(ok.success);
        assert!(ok.error.is_none());
        assert_eq!(ok.data.unwrap().job_id, "j1");

        let err = ApiResponse::<CreateBackupResponse>::from_result(Err(
            VaultError::ConfirmationRequired,
        ));
        assert!(!err.success);
        assert!(err.data.is_none());
        assert_eq!(err.error.unwrap().code, "confirmation_required");
    }

    #[test]
    fn test_error_body_mapping() {
        let rate_limited = VaultError::RateLimited {
            retry_after_secs: 42,
        };
        let body = ErrorBody::from(&rate_limited);
        assert_eq!(body.code, "rate_limited");
        assert_eq!(body.retry_after_secs, Some(42));

        let confirm = ErrorBody::from(&VaultError::ConfirmationRequired);
        assert_eq!(confirm.code, "confirmation_required");
        assert!(confirm.retry_after_secs.is_none());

        // 内部错误不透出细节
        let internal = ErrorBody::from(&VaultError::custom("connection pool exhausted"));
        assert_eq!(internal.code, "internal_error");
        assert!(!internal.message.contains("connection pool"));
    }
}

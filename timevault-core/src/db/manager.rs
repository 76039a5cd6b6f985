use crate::{Result, VaultError};
use chrono::{DateTime, Utc};
use std::path::Path;
use tokio::sync::{mpsc, oneshot};

use super::actor::VaultDbActor;
use super::messages::DbMessage;
use super::models::{
    AuditRecord, BackupJob, BackupJobStats, BackupSchedule, ChangeLogEntry, ChangeOperation,
    ChangeStats, DrPlan, HealthSnapshot, LiveRecord, RestoreLog, RestoreSummary, Tenant,
};

/// TimeVault 元数据库句柄
/// 所有访问经由单线程 Actor 串行化，句柄本身可以随意克隆
#[derive(Debug, Clone)]
pub struct Database {
    sender: mpsc::Sender<DbMessage>,
}

impl Database {
    /// 连接到数据库文件
    pub async fn connect<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        // 确保数据库文件的父目录存在
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let (sender, receiver) = mpsc::channel(100);

        let actor = VaultDbActor::new(db_path)?;
        tokio::spawn(actor.run(receiver));

        let database = Self { sender };
        database.init_tables().await?;

        Ok(database)
    }

    /// 连接到内存数据库（主要用于测试）
    pub async fn connect_memory() -> Result<Self> {
        let (sender, receiver) = mpsc::channel(100);

        let actor = VaultDbActor::new_memory()?;
        tokio::spawn(actor.run(receiver));

        let database = Self { sender };
        database.init_tables().await?;

        Ok(database)
    }

    /// 发送消息并等待 Actor 回应
    async fn call<T>(
        &self,
        message: DbMessage,
        receiver: oneshot::Receiver<Result<T>>,
    ) -> Result<T> {
        self.sender
            .send(message)
            .await
            .map_err(|_| VaultError::custom("数据库Actor已关闭"))?;

        receiver
            .await
            .map_err(|_| VaultError::custom("等待数据库响应超时"))?
    }

    /// 初始化数据库表
    async fn init_tables(&self) -> Result<()> {
        let (respond_to, receiver) = oneshot::channel();
        self.call(DbMessage::InitTables { respond_to }, receiver)
            .await
    }

    // ========== 备份任务 ==========

    /// 插入备份任务记录
    pub async fn create_backup_job(&self, job: BackupJob) -> Result<()> {
        let (respond_to, receiver) = oneshot::channel();
        self.call(DbMessage::CreateBackupJob { job, respond_to }, receiver)
            .await
    }

    /// 备份任务转入 completed 终态
    #[allow(clippy::too_many_arguments)]
    pub async fn complete_backup_job(
        &self,
        job_id: &str,
        completed_at: DateTime<Utc>,
        size_bytes: i64,
        stored_bytes: i64,
        table_count: i32,
        row_count: i64,
        checksum: String,
        storage_location: String,
    ) -> Result<()> {
        let (respond_to, receiver) = oneshot::channel();
        self.call(
            DbMessage::CompleteBackupJob {
                job_id: job_id.to_string(),
                completed_at,
                size_bytes,
                stored_bytes,
                table_count,
                row_count,
                checksum,
                storage_location,
                respond_to,
            },
            receiver,
        )
        .await
    }

    /// 备份任务转入 failed 终态
    pub async fn fail_backup_job(
        &self,
        job_id: &str,
        completed_at: DateTime<Utc>,
        error_message: String,
        error_detail: Option<String>,
    ) -> Result<()> {
        let (respond_to, receiver) = oneshot::channel();
        self.call(
            DbMessage::FailBackupJob {
                job_id: job_id.to_string(),
                completed_at,
                error_message,
                error_detail,
                respond_to,
            },
            receiver,
        )
        .await
    }

    /// 查询备份任务
    pub async fn get_backup_job(&self, tenant_id: &str, job_id: &str) -> Result<Option<BackupJob>> {
        let (respond_to, receiver) = oneshot::channel();
        self.call(
            DbMessage::GetBackupJob {
                tenant_id: tenant_id.to_string(),
                job_id: job_id.to_string(),
                respond_to,
            },
            receiver,
        )
        .await
    }

    /// 列出租户的备份任务
    pub async fn list_backup_jobs(
        &self,
        tenant_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<BackupJob>> {
        let (respond_to, receiver) = oneshot::channel();
        self.call(
            DbMessage::ListBackupJobs {
                tenant_id: tenant_id.to_string(),
                limit,
                respond_to,
            },
            receiver,
        )
        .await
    }

    /// 自动选择基础备份
    pub async fn find_base_backup(
        &self,
        tenant_id: &str,
        target: DateTime<Utc>,
    ) -> Result<Option<BackupJob>> {
        let (respond_to, receiver) = oneshot::channel();
        self.call(
            DbMessage::FindBaseBackup {
                tenant_id: tenant_id.to_string(),
                target,
                respond_to,
            },
            receiver,
        )
        .await
    }

    /// 删除备份任务记录
    pub async fn delete_backup_job(&self, tenant_id: &str, job_id: &str) -> Result<()> {
        let (respond_to, receiver) = oneshot::channel();
        self.call(
            DbMessage::DeleteBackupJob {
                tenant_id: tenant_id.to_string(),
                job_id: job_id.to_string(),
                respond_to,
            },
            receiver,
        )
        .await
    }

    /// 聚合租户的备份任务统计
    pub async fn query_backup_job_stats(
        &self,
        tenant_id: &str,
        window_start: DateTime<Utc>,
        stuck_before: DateTime<Utc>,
    ) -> Result<BackupJobStats> {
        let (respond_to, receiver) = oneshot::channel();
        self.call(
            DbMessage::QueryBackupJobStats {
                tenant_id: tenant_id.to_string(),
                window_start,
                stuck_before,
                respond_to,
            },
            receiver,
        )
        .await
    }

    // ========== 变更日志 ==========

    /// 追加变更日志条目（供外围数据层与测试使用）
    #[allow(clippy::too_many_arguments)]
    pub async fn append_change(
        &self,
        tenant_id: &str,
        table_name: &str,
        record_id: &str,
        operation: ChangeOperation,
        old_value: Option<String>,
        new_value: Option<String>,
        changed_at: DateTime<Utc>,
    ) -> Result<i64> {
        let (respond_to, receiver) = oneshot::channel();
        self.call(
            DbMessage::AppendChange {
                tenant_id: tenant_id.to_string(),
                table_name: table_name.to_string(),
                record_id: record_id.to_string(),
                operation,
                old_value,
                new_value,
                changed_at,
                respond_to,
            },
            receiver,
        )
        .await
    }

    /// 查询时间窗口内的变更日志（按变更时间升序）
    pub async fn query_change_window(
        &self,
        tenant_id: &str,
        from_exclusive: DateTime<Utc>,
        to_inclusive: DateTime<Utc>,
        tables: Option<Vec<String>>,
    ) -> Result<Vec<ChangeLogEntry>> {
        let (respond_to, receiver) = oneshot::channel();
        self.call(
            DbMessage::QueryChangeWindow {
                tenant_id: tenant_id.to_string(),
                from_exclusive,
                to_inclusive,
                tables,
                respond_to,
            },
            receiver,
        )
        .await
    }

    /// 聚合时间窗口内的变更统计
    pub async fn query_change_stats(
        &self,
        tenant_id: &str,
        from_exclusive: DateTime<Utc>,
        to_inclusive: DateTime<Utc>,
    ) -> Result<ChangeStats> {
        let (respond_to, receiver) = oneshot::channel();
        self.call(
            DbMessage::QueryChangeStats {
                tenant_id: tenant_id.to_string(),
                from_exclusive,
                to_inclusive,
                respond_to,
            },
            receiver,
        )
        .await
    }

    // ========== 租户业务数据 ==========

    /// 扫描租户某张业务表的全部记录
    pub async fn scan_table(&self, tenant_id: &str, table_name: &str) -> Result<Vec<LiveRecord>> {
        let (respond_to, receiver) = oneshot::channel();
        self.call(
            DbMessage::ScanTable {
                tenant_id: tenant_id.to_string(),
                table_name: table_name.to_string(),
                respond_to,
            },
            receiver,
        )
        .await
    }

    /// 写入或覆盖一条业务记录
    pub async fn upsert_record(
        &self,
        tenant_id: &str,
        table_name: &str,
        record_id: &str,
        data: String,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let (respond_to, receiver) = oneshot::channel();
        self.call(
            DbMessage::UpsertRecord {
                tenant_id: tenant_id.to_string(),
                table_name: table_name.to_string(),
                record_id: record_id.to_string(),
                data,
                updated_at,
                respond_to,
            },
            receiver,
        )
        .await
    }

    /// 删除一条业务记录
    pub async fn delete_record(
        &self,
        tenant_id: &str,
        table_name: &str,
        record_id: &str,
    ) -> Result<()> {
        let (respond_to, receiver) = oneshot::channel();
        self.call(
            DbMessage::DeleteRecord {
                tenant_id: tenant_id.to_string(),
                table_name: table_name.to_string(),
                record_id: record_id.to_string(),
                respond_to,
            },
            receiver,
        )
        .await
    }

    /// 查询单条业务记录
    pub async fn get_record(
        &self,
        tenant_id: &str,
        table_name: &str,
        record_id: &str,
    ) -> Result<Option<LiveRecord>> {
        let (respond_to, receiver) = oneshot::channel();
        self.call(
            DbMessage::GetRecord {
                tenant_id: tenant_id.to_string(),
                table_name: table_name.to_string(),
                record_id: record_id.to_string(),
                respond_to,
            },
            receiver,
        )
        .await
    }

    // ========== 恢复记录 ==========

    /// 插入恢复执行记录
    pub async fn create_restore_log(&self, log: RestoreLog) -> Result<()> {
        let (respond_to, receiver) = oneshot::channel();
        self.call(DbMessage::CreateRestoreLog { log, respond_to }, receiver)
            .await
    }

    /// 恢复记录转入 completed 终态
    pub async fn complete_restore_log(
        &self,
        restore_id: &str,
        completed_at: DateTime<Utc>,
        duration_secs: i64,
        tables_restored: i32,
        rows_restored: i64,
    ) -> Result<()> {
        let (respond_to, receiver) = oneshot::channel();
        self.call(
            DbMessage::CompleteRestoreLog {
                restore_id: restore_id.to_string(),
                completed_at,
                duration_secs,
                tables_restored,
                rows_restored,
                respond_to,
            },
            receiver,
        )
        .await
    }

    /// 恢复记录转入 failed 终态
    pub async fn fail_restore_log(
        &self,
        restore_id: &str,
        completed_at: DateTime<Utc>,
        error_message: String,
    ) -> Result<()> {
        let (respond_to, receiver) = oneshot::channel();
        self.call(
            DbMessage::FailRestoreLog {
                restore_id: restore_id.to_string(),
                completed_at,
                error_message,
                respond_to,
            },
            receiver,
        )
        .await
    }

    /// 查询恢复记录
    pub async fn get_restore_log(
        &self,
        tenant_id: &str,
        restore_id: &str,
    ) -> Result<Option<RestoreLog>> {
        let (respond_to, receiver) = oneshot::channel();
        self.call(
            DbMessage::GetRestoreLog {
                tenant_id: tenant_id.to_string(),
                restore_id: restore_id.to_string(),
                respond_to,
            },
            receiver,
        )
        .await
    }

    /// 列出租户的恢复记录
    pub async fn list_restore_logs(
        &self,
        tenant_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<RestoreLog>> {
        let (respond_to, receiver) = oneshot::channel();
        self.call(
            DbMessage::ListRestoreLogs {
                tenant_id: tenant_id.to_string(),
                limit,
                respond_to,
            },
            receiver,
        )
        .await
    }

    /// 最近一次成功恢复摘要
    pub async fn latest_completed_restore(&self, tenant_id: &str) -> Result<Option<RestoreSummary>> {
        let (respond_to, receiver) = oneshot::channel();
        self.call(
            DbMessage::LatestCompletedRestore {
                tenant_id: tenant_id.to_string(),
                respond_to,
            },
            receiver,
        )
        .await
    }

    // ========== 健康快照 ==========

    /// 追加健康快照
    pub async fn insert_health_snapshot(&self, snapshot: HealthSnapshot) -> Result<i64> {
        let (respond_to, receiver) = oneshot::channel();
        self.call(
            DbMessage::InsertHealthSnapshot {
                snapshot,
                respond_to,
            },
            receiver,
        )
        .await
    }

    /// 查询租户的历史健康快照
    pub async fn list_health_snapshots(
        &self,
        tenant_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<HealthSnapshot>> {
        let (respond_to, receiver) = oneshot::channel();
        self.call(
            DbMessage::ListHealthSnapshots {
                tenant_id: tenant_id.to_string(),
                limit,
                respond_to,
            },
            receiver,
        )
        .await
    }

    // ========== 灾难恢复计划与调度 ==========

    /// 写入或更新灾难恢复计划
    pub async fn upsert_dr_plan(&self, plan: DrPlan) -> Result<()> {
        let (respond_to, receiver) = oneshot::channel();
        self.call(DbMessage::UpsertDrPlan { plan, respond_to }, receiver)
            .await
    }

    /// 列出租户的有效灾难恢复计划
    pub async fn list_active_dr_plans(&self, tenant_id: &str) -> Result<Vec<DrPlan>> {
        let (respond_to, receiver) = oneshot::channel();
        self.call(
            DbMessage::ListActiveDrPlans {
                tenant_id: tenant_id.to_string(),
                respond_to,
            },
            receiver,
        )
        .await
    }

    /// 写入或更新备份调度配置
    pub async fn upsert_schedule(&self, schedule: BackupSchedule) -> Result<()> {
        let (respond_to, receiver) = oneshot::channel();
        self.call(
            DbMessage::UpsertSchedule {
                schedule,
                respond_to,
            },
            receiver,
        )
        .await
    }

    /// 查询租户的备份调度配置
    pub async fn get_schedule(&self, tenant_id: &str) -> Result<Option<BackupSchedule>> {
        let (respond_to, receiver) = oneshot::channel();
        self.call(
            DbMessage::GetSchedule {
                tenant_id: tenant_id.to_string(),
                respond_to,
            },
            receiver,
        )
        .await
    }

    // ========== 租户 ==========

    /// 写入或更新租户
    pub async fn upsert_tenant(&self, tenant: Tenant) -> Result<()> {
        let (respond_to, receiver) = oneshot::channel();
        self.call(DbMessage::UpsertTenant { tenant, respond_to }, receiver)
            .await
    }

    /// 查询租户
    pub async fn get_tenant(&self, tenant_id: &str) -> Result<Option<Tenant>> {
        let (respond_to, receiver) = oneshot::channel();
        self.call(
            DbMessage::GetTenant {
                tenant_id: tenant_id.to_string(),
                respond_to,
            },
            receiver,
        )
        .await
    }

    /// 列出所有活跃租户
    pub async fn list_active_tenants(&self) -> Result<Vec<Tenant>> {
        let (respond_to, receiver) = oneshot::channel();
        self.call(DbMessage::ListActiveTenants { respond_to }, receiver)
            .await
    }

    // ========== 审计日志 ==========

    /// 追加审计日志
    pub async fn insert_audit(
        &self,
        tenant_id: &str,
        action: &str,
        detail: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Result<i64> {
        let (respond_to, receiver) = oneshot::channel();
        self.call(
            DbMessage::InsertAudit {
                tenant_id: tenant_id.to_string(),
                action: action.to_string(),
                detail,
                created_at,
                respond_to,
            },
            receiver,
        )
        .await
    }

    /// 查询租户最近的审计日志
    pub async fn recent_audit(&self, tenant_id: &str, limit: i64) -> Result<Vec<AuditRecord>> {
        let (respond_to, receiver) = oneshot::channel();
        self.call(
            DbMessage::RecentAudit {
                tenant_id: tenant_id.to_string(),
                limit,
                respond_to,
            },
            receiver,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{BackupJobStatus, BackupJobType};
    use chrono::Duration;

    fn sample_job(tenant_id: &str, job_type: BackupJobType, created_at: DateTime<Utc>) -> BackupJob {
        BackupJob {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            job_type,
            name: "测试备份".to_string(),
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
        }
    }

    #[tokio::test]
    async fn test_backup_job_lifecycle() {
        let db = Database::connect_memory().await.unwrap();
        let job = sample_job("tenant-a", BackupJobType::Full, Utc::now());
        let job_id = job.id.clone();

        db.create_backup_job(job).await.unwrap();

        // running -> completed
        db.complete_backup_job(
            &job_id,
            Utc::now(),
            1024,
            512,
            3,
            42,
            "abc".to_string(),
            "tenant-a/xyz-backup".to_string(),
        )
        .await
        .unwrap();

        let job = db.get_backup_job("tenant-a", &job_id).await.unwrap().unwrap();
        assert_eq!(job.status, BackupJobStatus::Completed);
        assert_eq!(job.row_count, Some(42));
        assert!(job.storage_location.is_some());

        // 终态后不允许再次转移
        let result = db
            .fail_backup_job(&job_id, Utc::now(), "boom".to_string(), None)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_tenant_isolation_on_job_lookup() {
        let db = Database::connect_memory().await.unwrap();
        let job = sample_job("tenant-a", BackupJobType::Full, Utc::now());
        let job_id = job.id.clone();
        db.create_backup_job(job).await.unwrap();

        // 其他租户看不到该任务
        let other = db.get_backup_job("tenant-b", &job_id).await.unwrap();
        assert!(other.is_none());
    }

    #[tokio::test]
    async fn test_find_base_backup_picks_latest_full() {
        let db = Database::connect_memory().await.unwrap();
        let now = Utc::now();

        let old = sample_job("tenant-a", BackupJobType::Full, now - Duration::days(10));
        let newer = sample_job("tenant-a", BackupJobType::Full, now - Duration::days(5));
        let incr = sample_job(
            "tenant-a",
            BackupJobType::Incremental,
            now - Duration::days(1),
        );

        let newer_id = newer.id.clone();
        for job in [old, newer, incr] {
            let id = job.id.clone();
            db.create_backup_job(job).await.unwrap();
            db.complete_backup_job(
                &id,
                now,
                1,
                1,
                1,
                1,
                "c".to_string(),
                "loc".to_string(),
            )
            .await
            .unwrap();
        }

        // 自动选择目标时间之前最新的 completed full 任务
        let base = db.find_base_backup("tenant-a", now).await.unwrap().unwrap();
        assert_eq!(base.id, newer_id);

        // 目标时间早于所有备份时无候选
        let none = db
            .find_base_backup("tenant-a", now - Duration::days(30))
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_change_window_query_and_stats() {
        let db = Database::connect_memory().await.unwrap();
        let base = Utc::now() - Duration::days(9);

        let ops = [
            ("orders", "o1", ChangeOperation::Insert),
            ("orders", "o2", ChangeOperation::Insert),
            ("customers", "c1", ChangeOperation::Insert),
            ("orders", "o1", ChangeOperation::Update),
            ("customers", "c1", ChangeOperation::Update),
            ("orders", "o2", ChangeOperation::Delete),
        ];
        for (i, (table, record, op)) in ops.iter().enumerate() {
            db.append_change(
                "tenant-a",
                table,
                record,
                *op,
                None,
                Some("{}".to_string()),
                base + Duration::hours(i as i64),
            )
            .await
            .unwrap();
        }

        let target = Utc::now();
        let stats = db
            .query_change_stats("tenant-a", base - Duration::hours(1), target)
            .await
            .unwrap();
        assert_eq!(stats.total_operations, 6);
        assert_eq!(stats.insert_count, 3);
        assert_eq!(stats.update_count, 2);
        assert_eq!(stats.delete_count, 1);
        assert_eq!(
            stats.affected_tables,
            vec!["customers".to_string(), "orders".to_string()]
        );

        // 窗口查询按变更时间升序
        let entries = db
            .query_change_window("tenant-a", base - Duration::hours(1), target, None)
            .await
            .unwrap();
        assert_eq!(entries.len(), 6);
        assert!(entries.windows(2).all(|w| w[0].changed_at <= w[1].changed_at));

        // 表过滤
        let orders_only = db
            .query_change_window(
                "tenant-a",
                base - Duration::hours(1),
                target,
                Some(vec!["orders".to_string()]),
            )
            .await
            .unwrap();
        assert_eq!(orders_only.len(), 4);
    }

    #[tokio::test]
    async fn test_live_record_upsert_and_delete() {
        let db = Database::connect_memory().await.unwrap();
        let now = Utc::now();

        db.upsert_record("tenant-a", "orders", "o1", "{\"v\":1}".to_string(), now)
            .await
            .unwrap();
        db.upsert_record("tenant-a", "orders", "o1", "{\"v\":2}".to_string(), now)
            .await
            .unwrap();

        let record = db
            .get_record("tenant-a", "orders", "o1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.data, "{\"v\":2}");

        db.delete_record("tenant-a", "orders", "o1").await.unwrap();
        assert!(db.get_record("tenant-a", "orders", "o1").await.unwrap().is_none());
    }
}

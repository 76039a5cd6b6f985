use crate::Result;
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use super::models::{
    AuditRecord, BackupJob, BackupJobStats, BackupSchedule, ChangeLogEntry, ChangeOperation,
    ChangeStats, DrPlan, HealthSnapshot, LiveRecord, RestoreLog, RestoreSummary, Tenant,
};

/// DuckDB数据库操作消息
#[derive(Debug)]
pub enum DbMessage {
    /// 初始化数据库表
    InitTables {
        respond_to: oneshot::Sender<Result<()>>,
    },

    // ========== 备份任务 ==========
    /// 插入备份任务记录
    CreateBackupJob {
        job: BackupJob,
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// 备份任务转入 completed 终态（仅对 running 状态生效）
    CompleteBackupJob {
        job_id: String,
        completed_at: DateTime<Utc>,
        size_bytes: i64,
        stored_bytes: i64,
        table_count: i32,
        row_count: i64,
        checksum: String,
        storage_location: String,
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// 备份任务转入 failed 终态（仅对 pending/running 状态生效）
    FailBackupJob {
        job_id: String,
        completed_at: DateTime<Utc>,
        error_message: String,
        error_detail: Option<String>,
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// 按租户和任务ID查询备份任务
    GetBackupJob {
        tenant_id: String,
        job_id: String,
        respond_to: oneshot::Sender<Result<Option<BackupJob>>>,
    },
    /// 列出租户的备份任务（按创建时间倒序）
    ListBackupJobs {
        tenant_id: String,
        limit: Option<i64>,
        respond_to: oneshot::Sender<Result<Vec<BackupJob>>>,
    },
    /// 自动选择基础备份：目标时间之前最新的 completed full 任务
    FindBaseBackup {
        tenant_id: String,
        target: DateTime<Utc>,
        respond_to: oneshot::Sender<Result<Option<BackupJob>>>,
    },
    /// 删除备份任务记录
    DeleteBackupJob {
        tenant_id: String,
        job_id: String,
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// 聚合租户的备份任务统计（健康监控）
    QueryBackupJobStats {
        tenant_id: String,
        window_start: DateTime<Utc>,
        stuck_before: DateTime<Utc>,
        respond_to: oneshot::Sender<Result<BackupJobStats>>,
    },

    // ========== 变更日志 ==========
    /// 追加变更日志条目（外围数据层/测试使用）
    AppendChange {
        tenant_id: String,
        table_name: String,
        record_id: String,
        operation: ChangeOperation,
        old_value: Option<String>,
        new_value: Option<String>,
        changed_at: DateTime<Utc>,
        respond_to: oneshot::Sender<Result<i64>>,
    },
    /// 查询时间窗口内的变更日志（按变更时间升序）
    QueryChangeWindow {
        tenant_id: String,
        from_exclusive: DateTime<Utc>,
        to_inclusive: DateTime<Utc>,
        tables: Option<Vec<String>>,
        respond_to: oneshot::Sender<Result<Vec<ChangeLogEntry>>>,
    },
    /// 聚合时间窗口内的变更统计
    QueryChangeStats {
        tenant_id: String,
        from_exclusive: DateTime<Utc>,
        to_inclusive: DateTime<Utc>,
        respond_to: oneshot::Sender<Result<ChangeStats>>,
    },

    // ========== 租户业务数据 ==========
    /// 扫描租户某张业务表的全部记录
    ScanTable {
        tenant_id: String,
        table_name: String,
        respond_to: oneshot::Sender<Result<Vec<LiveRecord>>>,
    },
    /// 写入或覆盖一条业务记录
    UpsertRecord {
        tenant_id: String,
        table_name: String,
        record_id: String,
        data: String,
        updated_at: DateTime<Utc>,
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// 删除一条业务记录
    DeleteRecord {
        tenant_id: String,
        table_name: String,
        record_id: String,
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// 查询单条业务记录
    GetRecord {
        tenant_id: String,
        table_name: String,
        record_id: String,
        respond_to: oneshot::Sender<Result<Option<LiveRecord>>>,
    },

    // ========== 恢复记录 ==========
    /// 插入恢复执行记录
    CreateRestoreLog {
        log: RestoreLog,
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// 恢复记录转入 completed 终态（仅对 running 状态生效）
    CompleteRestoreLog {
        restore_id: String,
        completed_at: DateTime<Utc>,
        duration_secs: i64,
        tables_restored: i32,
        rows_restored: i64,
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// 恢复记录转入 failed 终态（仅对 running 状态生效）
    FailRestoreLog {
        restore_id: String,
        completed_at: DateTime<Utc>,
        error_message: String,
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// 查询恢复记录
    GetRestoreLog {
        tenant_id: String,
        restore_id: String,
        respond_to: oneshot::Sender<Result<Option<RestoreLog>>>,
    },
    /// 列出租户的恢复记录（按开始时间倒序）
    ListRestoreLogs {
        tenant_id: String,
        limit: Option<i64>,
        respond_to: oneshot::Sender<Result<Vec<RestoreLog>>>,
    },
    /// 最近一次成功恢复摘要（健康监控）
    LatestCompletedRestore {
        tenant_id: String,
        respond_to: oneshot::Sender<Result<Option<RestoreSummary>>>,
    },

    // ========== 健康快照 ==========
    /// 追加健康快照
    InsertHealthSnapshot {
        snapshot: HealthSnapshot,
        respond_to: oneshot::Sender<Result<i64>>,
    },
    /// 查询租户的历史健康快照（按检查时间倒序）
    ListHealthSnapshots {
        tenant_id: String,
        limit: Option<i64>,
        respond_to: oneshot::Sender<Result<Vec<HealthSnapshot>>>,
    },

    // ========== 灾难恢复计划与调度 ==========
    /// 写入或更新灾难恢复计划
    UpsertDrPlan {
        plan: DrPlan,
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// 列出租户的有效灾难恢复计划
    ListActiveDrPlans {
        tenant_id: String,
        respond_to: oneshot::Sender<Result<Vec<DrPlan>>>,
    },
    /// 写入或更新备份调度配置
    UpsertSchedule {
        schedule: BackupSchedule,
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// 查询租户的备份调度配置
    GetSchedule {
        tenant_id: String,
        respond_to: oneshot::Sender<Result<Option<BackupSchedule>>>,
    },

    // ========== 租户 ==========
    /// 写入或更新租户
    UpsertTenant {
        tenant: Tenant,
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// 查询租户
    GetTenant {
        tenant_id: String,
        respond_to: oneshot::Sender<Result<Option<Tenant>>>,
    },
    /// 列出所有活跃租户
    ListActiveTenants {
        respond_to: oneshot::Sender<Result<Vec<Tenant>>>,
    },

    // ========== 审计日志 ==========
    /// 追加审计日志
    InsertAudit {
        tenant_id: String,
        action: String,
        detail: Option<String>,
        created_at: DateTime<Utc>,
        respond_to: oneshot::Sender<Result<i64>>,
    },
    /// 查询租户最近的审计日志
    RecentAudit {
        tenant_id: String,
        limit: i64,
        respond_to: oneshot::Sender<Result<Vec<AuditRecord>>>,
    },
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};

/// 备份任务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupJobType {
    Full,
    Incremental,
    Snapshot,
}

impl BackupJobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupJobType::Full => "full",
            BackupJobType::Incremental => "incremental",
            BackupJobType::Snapshot => "snapshot",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "full" => Ok(BackupJobType::Full),
            "incremental" => Ok(BackupJobType::Incremental),
            "snapshot" => Ok(BackupJobType::Snapshot),
            other => Err(VaultError::validation(format!(
                "未知的备份类型: {other}，支持 full/incremental/snapshot"
            ))),
        }
    }
}

/// 备份任务状态
/// 状态机: pending -> running -> completed | failed，终态后不再变化
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupJobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl BackupJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupJobStatus::Pending => "pending",
            BackupJobStatus::Running => "running",
            BackupJobStatus::Completed => "completed",
            BackupJobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(BackupJobStatus::Pending),
            "running" => Ok(BackupJobStatus::Running),
            "completed" => Ok(BackupJobStatus::Completed),
            "failed" => Ok(BackupJobStatus::Failed),
            other => Err(VaultError::custom(format!("未知的备份状态: {other}"))),
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, BackupJobStatus::Completed | BackupJobStatus::Failed)
    }
}

/// 备份任务记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupJob {
    pub id: String,
    pub tenant_id: String,
    pub job_type: BackupJobType,
    pub name: String,
    pub description: Option<String>,
    pub status: BackupJobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub size_bytes: Option<i64>,
    pub stored_bytes: Option<i64>,
    pub table_count: Option<i32>,
    pub row_count: Option<i64>,
    pub checksum: Option<String>,
    pub error_message: Option<String>,
    pub error_detail: Option<String>,
    pub storage_location: Option<String>,
}

/// 变更日志操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOperation {
    Insert,
    Update,
    Delete,
}

impl ChangeOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeOperation::Insert => "insert",
            ChangeOperation::Update => "update",
            ChangeOperation::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "insert" => Ok(ChangeOperation::Insert),
            "update" => Ok(ChangeOperation::Update),
            "delete" => Ok(ChangeOperation::Delete),
            other => Err(VaultError::custom(format!("未知的变更操作: {other}"))),
        }
    }
}

/// 变更日志条目（由外围数据层追加，本子系统只读重放）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub id: i64,
    pub tenant_id: String,
    pub table_name: String,
    pub record_id: String,
    pub operation: ChangeOperation,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_at: DateTime<Utc>,
}

/// 变更窗口统计结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeStats {
    pub total_operations: i64,
    pub insert_count: i64,
    pub update_count: i64,
    pub delete_count: i64,
    pub affected_tables: Vec<String>,
}

/// 租户业务表中的一行记录（以通用形式建模）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveRecord {
    pub tenant_id: String,
    pub table_name: String,
    pub record_id: String,
    pub data: String,
    pub updated_at: DateTime<Utc>,
}

/// 恢复类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreType {
    FullRestore,
    Pitr,
}

impl RestoreType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestoreType::FullRestore => "full_restore",
            RestoreType::Pitr => "pitr",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "full_restore" => Ok(RestoreType::FullRestore),
            "pitr" => Ok(RestoreType::Pitr),
            other => Err(VaultError::custom(format!("未知的恢复类型: {other}"))),
        }
    }
}

/// 恢复状态
/// 状态机: running -> completed | failed，终态后记录不可变
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreStatus {
    Running,
    Completed,
    Failed,
}

impl RestoreStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestoreStatus::Running => "running",
            RestoreStatus::Completed => "completed",
            RestoreStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(RestoreStatus::Running),
            "completed" => Ok(RestoreStatus::Completed),
            "failed" => Ok(RestoreStatus::Failed),
            other => Err(VaultError::custom(format!("未知的恢复状态: {other}"))),
        }
    }
}

/// 恢复执行记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreLog {
    pub id: String,
    pub tenant_id: String,
    pub backup_job_id: String,
    pub restore_type: RestoreType,
    pub status: RestoreStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<i64>,
    pub tables_restored: Option<i32>,
    pub rows_restored: Option<i64>,
    pub error_message: Option<String>,
    pub notes: Option<String>,
    /// 结构化元数据（目标时间点、基础备份名、操作统计、发起者等），JSON文本
    pub metadata: Option<String>,
}

/// 健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "healthy" => Ok(HealthStatus::Healthy),
            "warning" => Ok(HealthStatus::Warning),
            "critical" => Ok(HealthStatus::Critical),
            other => Err(VaultError::custom(format!("未知的健康状态: {other}"))),
        }
    }
}

/// 健康快照（每轮巡检每租户一条，只追加不修改）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub id: i64,
    pub tenant_id: String,
    pub checked_at: DateTime<Utc>,
    pub status: HealthStatus,
    pub score: f64,
    /// 指标明细，JSON文本
    pub metrics: String,
    /// 问题列表，JSON文本
    pub issues: String,
    /// 警告列表，JSON文本
    pub warnings: String,
    /// 建议列表，JSON文本
    pub recommendations: String,
}

/// 灾难恢复计划（外部输入，本子系统只读）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrPlan {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub rpo_minutes: i64,
    pub rto_minutes: i64,
    pub retention_days: i64,
    pub active: bool,
}

/// 备份调度配置（外部调度系统写入，健康监控只读）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSchedule {
    pub tenant_id: String,
    pub enabled: bool,
    pub cron: String,
    pub next_run_at: Option<DateTime<Utc>>,
}

/// 租户状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    Active,
    Suspended,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Active => "active",
            TenantStatus::Suspended => "suspended",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(TenantStatus::Active),
            "suspended" => Ok(TenantStatus::Suspended),
            other => Err(VaultError::custom(format!("未知的租户状态: {other}"))),
        }
    }
}

/// 租户记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub status: TenantStatus,
    pub created_at: DateTime<Utc>,
}

/// 审计日志记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub tenant_id: String,
    pub action: String,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 备份任务统计（健康监控使用，单轮查询聚合）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupJobStats {
    /// 窗口内任务总数
    pub total_jobs: i64,
    /// 窗口内成功任务数
    pub completed_jobs: i64,
    /// 窗口内失败任务数
    pub failed_jobs: i64,
    /// 最近一次成功备份时间（不限窗口）
    pub last_completed_at: Option<DateTime<Utc>>,
    /// 最早的备份创建时间（不限窗口，用于保留期合规判断）
    pub oldest_created_at: Option<DateTime<Utc>>,
    /// 窗口内成功备份占用的存储字节
    pub stored_bytes_window: i64,
    /// 所有成功备份占用的存储字节
    pub stored_bytes_total: i64,
    /// 窗口内平均备份耗时（秒）
    pub avg_duration_secs: Option<f64>,
    /// 停留在 running 状态超过阈值的任务数（监控异常信号）
    pub stuck_running_jobs: i64,
}

/// 最近一次成功恢复的摘要
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreSummary {
    pub completed_at: DateTime<Utc>,
    pub duration_secs: Option<i64>,
}

/// DuckDB Actor模式数据库模块
///
/// 使用消息传递确保DuckDB连接的单线程访问：
/// - actor: 持有连接并串行执行SQL
/// - manager: 可克隆的异步句柄
/// - messages: Actor消息定义
/// - models: 数据模型
pub mod actor;
pub mod manager;
pub mod messages;
pub mod models;

pub use manager::Database;
pub use models::{
    AuditRecord, BackupJob, BackupJobStats, BackupJobStatus, BackupJobType, BackupSchedule,
    ChangeLogEntry, ChangeOperation, ChangeStats, DrPlan, HealthSnapshot, HealthStatus, LiveRecord,
    RestoreLog, RestoreStatus, RestoreSummary, RestoreType, Tenant, TenantStatus,
};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, VaultError>;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("配置错误: {0}")]
    Config(#[from] toml::de::Error),

    #[error("DuckDB数据库错误: {0}")]
    DuckDb(String),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("任务执行错误: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("请求参数无效: {0}")]
    Validation(String),

    #[error("租户不存在: {0}")]
    TenantNotFound(String),

    #[error("租户已被暂停: {0}")]
    TenantSuspended(String),

    #[error("请求频率超限，请在 {retry_after_secs} 秒后重试")]
    RateLimited { retry_after_secs: u64 },

    #[error("未找到可用的基础备份")]
    NoBaseBackup,

    #[error("备份任务不存在: {0}")]
    BackupNotFound(String),

    #[error("恢复记录不存在: {0}")]
    RestoreNotFound(String),

    #[error("恢复操作未确认：必须显式设置 confirm_restore 才能执行")]
    ConfirmationRequired,

    #[error("备份操作失败: {0}")]
    Backup(String),

    #[error("恢复操作失败: {0}")]
    Restore(String),

    #[error("对象存储错误: {0}")]
    ObjectStore(String),

    #[error("自定义错误: {0}")]
    Custom(String),
}

// 为DuckDB错误实现From trait
impl From<duckdb::Error> for VaultError {
    fn from(err: duckdb::Error) -> Self {
        VaultError::DuckDb(err.to_string())
    }
}

impl VaultError {
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn backup(msg: impl Into<String>) -> Self {
        Self::Backup(msg.into())
    }

    pub fn restore(msg: impl Into<String>) -> Self {
        Self::Restore(msg.into())
    }

    pub fn object_store(msg: impl Into<String>) -> Self {
        Self::ObjectStore(msg.into())
    }

    /// 判断错误是否为客户端可自行纠正的请求错误
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            VaultError::Validation(_)
                | VaultError::TenantNotFound(_)
                | VaultError::TenantSuspended(_)
                | VaultError::RateLimited { .. }
                | VaultError::ConfirmationRequired
        )
    }

    /// 速率限制错误的重试提示（秒）
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            VaultError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

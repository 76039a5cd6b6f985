use crate::config::RateLimitConfig;
use crate::{Result, VaultError};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 操作类别：不同类别的变更操作有各自的速率限制
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationClass {
    BackupCreate,
    RestoreExecute,
    BackupDelete,
}

impl OperationClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationClass::BackupCreate => "backup_create",
            OperationClass::RestoreExecute => "restore_execute",
            OperationClass::BackupDelete => "backup_delete",
        }
    }
}

/// 固定窗口计数器
#[derive(Debug)]
struct Window {
    started_at: Instant,
    count: u32,
}

/// 按租户、按操作类别的速率限制器
/// 所有变更入口在执行前调用 check，超限时返回带重试提示的错误
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Arc<DashMap<(String, OperationClass), Window>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Arc::new(DashMap::new()),
        }
    }

    fn max_for(&self, class: OperationClass) -> u32 {
        match class {
            OperationClass::BackupCreate => self.config.backup_create_max,
            OperationClass::RestoreExecute => self.config.restore_execute_max,
            OperationClass::BackupDelete => self.config.backup_delete_max,
        }
    }

    /// 检查并记账一次请求
    /// 允许则计数加一，超限则返回 RateLimited，重试秒数由窗口剩余时间推出
    pub fn check(&self, tenant_id: &str, class: OperationClass) -> Result<()> {
        let window_len = Duration::from_secs(self.config.window_secs);
        let max = self.max_for(class);
        let now = Instant::now();

        let mut window = self
            .windows
            .entry((tenant_id.to_string(), class))
            .or_insert_with(|| Window {
                started_at: now,
                count: 0,
            });

        // 窗口过期后重新开窗
        if now.duration_since(window.started_at) >= window_len {
            window.started_at = now;
            window.count = 0;
        }

        if window.count >= max {
            let elapsed = now.duration_since(window.started_at);
            let retry_after_secs = window_len.saturating_sub(elapsed).as_secs().max(1);
            tracing::warn!(
                "租户 {} 的 {} 操作触发速率限制，{} 秒后可重试",
                tenant_id,
                class.as_str(),
                retry_after_secs
            );
            return Err(VaultError::RateLimited { retry_after_secs });
        }

        window.count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> RateLimitConfig {
        RateLimitConfig {
            window_secs: 60,
            backup_create_max: 2,
            restore_execute_max: 1,
            backup_delete_max: 3,
        }
    }

    #[test]
    fn test_allows_until_limit_then_rejects() {
        let limiter = RateLimiter::new(test_config());

        assert!(limiter.check("tenant-a", OperationClass::BackupCreate).is_ok());
        assert!(limiter.check("tenant-a", OperationClass::BackupCreate).is_ok());

        let err = limiter
            .check("tenant-a", OperationClass::BackupCreate)
            .unwrap_err();
        let retry = err.retry_after().expect("应携带重试提示");
        assert!(retry >= 1 && retry <= 60);
    }

    #[test]
    fn test_classes_are_independent() {
        let limiter = RateLimiter::new(test_config());

        assert!(limiter.check("tenant-a", OperationClass::RestoreExecute).is_ok());
        assert!(limiter.check("tenant-a", OperationClass::RestoreExecute).is_err());
        // 其他类别不受影响
        assert!(limiter.check("tenant-a", OperationClass::BackupCreate).is_ok());
    }

    #[test]
    fn test_tenants_are_independent() {
        let limiter = RateLimiter::new(test_config());

        assert!(limiter.check("tenant-a", OperationClass::RestoreExecute).is_ok());
        assert!(limiter.check("tenant-a", OperationClass::RestoreExecute).is_err());
        assert!(limiter.check("tenant-b", OperationClass::RestoreExecute).is_ok());
    }
}

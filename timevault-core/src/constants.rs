/// 存储相关常量
pub mod storage {
    use std::path::{Path, PathBuf};

    /// 默认数据库文件名
    pub const DEFAULT_DB_FILE: &str = "timevault.db";

    /// 默认对象存储根目录名
    pub const OBJECT_ROOT_DIR_NAME: &str = "vault-objects";

    /// 存储容量上限（字节），用于计算利用率
    pub const CAPACITY_CEILING_BYTES: u64 = 100 * 1024 * 1024 * 1024;

    /// 获取默认对象存储根目录路径
    pub fn get_default_object_root() -> PathBuf {
        Path::new(".").join(OBJECT_ROOT_DIR_NAME)
    }
}

/// 备份相关常量
pub mod backup {
    /// 未指定表集合时使用的默认备份表列表
    /// 该列表只是兜底值，实际生效的表集合来自配置文件
    pub const DEFAULT_TABLES: &[&str] = &[
        "customers",
        "orders",
        "products",
        "invoices",
        "payments",
        "documents",
        "audit_events",
    ];

    /// 备份载荷格式版本号
    pub const PAYLOAD_VERSION: u32 = 1;
}

/// 速率限制相关常量
pub mod rate_limit {
    /// 固定窗口长度（秒）
    pub const WINDOW_SECS: u64 = 60;

    /// 每窗口允许的备份创建请求数
    pub const BACKUP_CREATE_MAX: u32 = 5;

    /// 每窗口允许的恢复执行请求数
    pub const RESTORE_EXECUTE_MAX: u32 = 2;

    /// 每窗口允许的备份删除请求数
    pub const BACKUP_DELETE_MAX: u32 = 10;
}

/// 健康监控相关常量
pub mod health {
    /// 健康检查执行间隔（秒）
    pub const CHECK_INTERVAL_SECS: u64 = 3600;

    /// 指标统计窗口（天）
    pub const METRICS_WINDOW_DAYS: i64 = 30;

    /// 备份新鲜度警告阈值（小时）
    pub const FRESHNESS_WARNING_HOURS: i64 = 24;

    /// 备份新鲜度严重阈值（小时）
    pub const FRESHNESS_CRITICAL_HOURS: i64 = 48;

    /// 失败任务数超过该值时升级为严重问题
    pub const FAILED_JOBS_CRITICAL_THRESHOLD: u32 = 3;

    /// 存储利用率警告阈值
    pub const UTILIZATION_WARNING: f64 = 0.80;

    /// 存储利用率严重阈值
    pub const UTILIZATION_CRITICAL: f64 = 0.90;

    /// 存储增长率建议阈值（MB/天）
    pub const GROWTH_RECOMMEND_MB_PER_DAY: f64 = 1000.0;

    /// 任务停留在 running 状态超过该时长视为监控异常（小时）
    pub const STUCK_RUNNING_HOURS: i64 = 6;

    /// 健康评分达到该值且无问题时为 healthy
    pub const SCORE_HEALTHY: f64 = 80.0;

    /// 健康评分低于该值时为 critical
    pub const SCORE_CRITICAL: f64 = 60.0;

    /// 综合评分默认权重
    pub mod weights {
        /// 备份成功率权重
        pub const SUCCESS_RATE: f64 = 0.35;

        /// 备份新鲜度权重
        pub const FRESHNESS: f64 = 0.25;

        /// 合规性权重（RPO/RTO/保留期）
        pub const COMPLIANCE: f64 = 0.25;

        /// 存储状况权重
        pub const STORAGE: f64 = 0.15;
    }
}

/// 配置文件相关常量
pub mod config {
    /// 配置文件查找优先级列表
    pub const CONFIG_FILE_CANDIDATES: &[&str] =
        &["config.toml", "timevault.toml", ".timevault.toml"];

    /// 默认配置文件名
    pub const DEFAULT_CONFIG_FILE: &str = "config.toml";
}

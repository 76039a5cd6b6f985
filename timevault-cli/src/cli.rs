use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// 租户管理相关命令
#[derive(Subcommand, Debug)]
pub enum TenantCommand {
    /// 注册或更新租户
    Register {
        /// 租户ID
        tenant_id: String,
        /// 租户名称
        name: String,
        /// 注册为暂停状态（默认为活跃）
        #[arg(long)]
        suspended: bool,
    },
    /// 列出所有活跃租户
    List,
}

/// 备份相关命令
#[derive(Subcommand, Debug)]
pub enum BackupCommand {
    /// 创建备份任务（后台执行，通过 show 轮询结果）
    Create {
        /// 租户ID
        #[arg(long)]
        tenant: String,
        /// 备份类型：full / incremental / snapshot
        #[arg(long, default_value = "full")]
        backup_type: String,
        /// 备份名称（缺省时自动生成）
        #[arg(long)]
        name: Option<String>,
        /// 备份描述
        #[arg(long)]
        description: Option<String>,
        /// 指定导出的表，可重复传入（缺省时使用配置的默认表）
        #[arg(long = "table")]
        tables: Vec<String>,
    },
    /// 列出备份任务
    List {
        #[arg(long)]
        tenant: String,
        /// 最多显示的条数
        #[arg(long)]
        limit: Option<i64>,
    },
    /// 显示单个备份任务详情
    Show {
        #[arg(long)]
        tenant: String,
        /// 备份任务ID
        job_id: String,
    },
    /// 校验备份对象完整性
    Verify {
        #[arg(long)]
        tenant: String,
        /// 备份任务ID
        job_id: String,
    },
    /// 删除备份任务及后备对象
    Delete {
        #[arg(long)]
        tenant: String,
        /// 备份任务ID
        job_id: String,
    },
}

/// 业务记录写入命令：写入当前态的同时追加变更日志
#[derive(Subcommand, Debug)]
pub enum DataCommand {
    /// 写入或更新一条记录（JSON 内容）
    Put {
        #[arg(long)]
        tenant: String,
        /// 目标表名
        #[arg(long)]
        table: String,
        /// 记录ID
        #[arg(long)]
        id: String,
        /// 记录内容，JSON 字符串
        #[arg(long)]
        json: String,
    },
    /// 删除一条记录
    Delete {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        table: String,
        #[arg(long)]
        id: String,
    },
    /// 查看一条记录
    Show {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        table: String,
        #[arg(long)]
        id: String,
    },
}

/// 时间点恢复相关命令
#[derive(Subcommand, Debug)]
pub enum RestoreCommand {
    /// 干跑预览：显示将被重放的变更，不改动数据
    Preview {
        #[arg(long)]
        tenant: String,
        /// 恢复目标时间点，RFC3339 格式，例如 2026-08-29T12:00:00Z
        #[arg(long)]
        target: String,
        /// 指定基础备份ID（缺省时自动选择目标时间之前最新的完整备份）
        #[arg(long)]
        base_backup: Option<String>,
        /// 只恢复指定的表，可重复传入
        #[arg(long = "table")]
        tables: Vec<String>,
    },
    /// 执行时间点恢复（破坏性操作，必须带 --confirm）
    Execute {
        #[arg(long)]
        tenant: String,
        /// 恢复目标时间点，RFC3339 格式
        #[arg(long)]
        target: String,
        #[arg(long)]
        base_backup: Option<String>,
        #[arg(long = "table")]
        tables: Vec<String>,
        /// 确认执行恢复，覆盖目标表中的数据
        #[arg(long)]
        confirm: bool,
        /// 操作发起者标识，写入恢复记录
        #[arg(long, default_value = "cli")]
        initiated_by: String,
    },
    /// 列出恢复记录
    List {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        limit: Option<i64>,
    },
    /// 显示单条恢复记录详情
    Show {
        #[arg(long)]
        tenant: String,
        /// 恢复记录ID
        restore_id: String,
    },
}

/// 健康监控相关命令
#[derive(Subcommand, Debug)]
pub enum HealthCommand {
    /// 即时检查单个租户的备份健康状况
    Check {
        #[arg(long)]
        tenant: String,
    },
    /// 对所有活跃租户执行一轮巡检并落库快照
    Sweep,
    /// 显示租户的历史健康快照
    History {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        limit: Option<i64>,
    },
}

/// 灾难恢复计划与调度相关命令
#[derive(Subcommand, Debug)]
pub enum PlanCommand {
    /// 写入或更新灾难恢复计划
    Set {
        #[arg(long)]
        tenant: String,
        /// 计划ID
        #[arg(long)]
        id: String,
        /// 计划名称
        #[arg(long)]
        name: String,
        /// RPO 目标（分钟）
        #[arg(long)]
        rpo_minutes: i64,
        /// RTO 目标（分钟）
        #[arg(long)]
        rto_minutes: i64,
        /// 备份保留期（天）
        #[arg(long)]
        retention_days: i64,
    },
    /// 列出租户的有效灾难恢复计划
    List {
        #[arg(long)]
        tenant: String,
    },
    /// 写入或更新备份调度配置
    Schedule {
        #[arg(long)]
        tenant: String,
        /// cron 表达式，例如 "0 2 * * *" 表示每天凌晨2点
        #[arg(long)]
        cron: String,
        /// 是否启用调度
        #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
        enabled: bool,
    },
}

/// TimeVault CLI - 多租户备份与时间点恢复工具
#[derive(Parser)]
#[command(name = "timevault")]
#[command(about = "多租户备份与时间点恢复工具")]
#[command(version)]
pub struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// 详细输出
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 首次使用时初始化：创建配置文件、存储目录和数据库
    Init {
        /// 如果配置文件已存在，强制覆盖
        #[arg(long)]
        force: bool,
    },
    /// 租户管理
    #[command(subcommand)]
    Tenant(TenantCommand),
    /// 备份任务管理
    #[command(subcommand)]
    Backup(BackupCommand),
    /// 业务记录写入（同时维护变更日志）
    #[command(subcommand)]
    Data(DataCommand),
    /// 时间点恢复
    #[command(subcommand)]
    Restore(RestoreCommand),
    /// 备份健康监控
    #[command(subcommand)]
    Health(HealthCommand),
    /// 灾难恢复计划与调度
    #[command(subcommand)]
    Plan(PlanCommand),
    /// 显示租户最近的审计记录
    Audit {
        #[arg(long)]
        tenant: String,
        #[arg(long, default_value = "20")]
        limit: i64,
    },
}

use timevault_core::{config::AppConfig, constants::config, db::Database, error::Result};
use tracing::{info, warn};

/// 运行独立的初始化流程
pub async fn run_init(force: bool) -> Result<()> {
    info!("🕰️  TimeVault 初始化");
    info!("======================");

    // 检查是否已经初始化过
    if !force
        && config::CONFIG_FILE_CANDIDATES
            .iter()
            .any(|path| std::path::Path::new(path).exists())
    {
        warn!("⚠️  检测到已存在的配置文件");
        info!("如果您要重新初始化，请使用 --force 参数");
        info!("示例: timevault init --force");
        return Ok(());
    }

    info!("📋 步骤 1: 创建配置文件和存储目录");

    let app_config = AppConfig::default();
    app_config.save_to_file(config::DEFAULT_CONFIG_FILE)?;
    info!("   ✅ 创建配置文件: {}", config::DEFAULT_CONFIG_FILE);

    app_config.ensure_storage_dirs()?;
    info!("   ✅ 创建对象存储目录: {}", app_config.storage.object_root);

    info!("📋 步骤 2: 初始化数据库");

    let database = Database::connect(&app_config.storage.db_file).await?;
    drop(database);
    info!("   ✅ 创建DuckDB数据库: {}", app_config.storage.db_file);

    info!("🎉 初始化完成！");
    info!("下一步:");
    info!("   1. timevault tenant register <租户ID> <名称>");
    info!("   2. timevault backup create --tenant <租户ID>");
    Ok(())
}

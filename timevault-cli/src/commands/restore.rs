use crate::app::CliApp;
use crate::utils::{normalize_tables, parse_timestamp};
use timevault_core::api::RestoreRequest;
use timevault_core::db::RestoreLog;
use timevault_core::error::{Result, VaultError};
use tracing::{info, warn};

/// 干跑预览时间点恢复
pub async fn run_restore_preview(
    app: &CliApp,
    tenant: &str,
    target: &str,
    base_backup: Option<String>,
    tables: Vec<String>,
) -> Result<()> {
    let target = parse_timestamp(target)?;

    let response = app
        .service
        .restore(RestoreRequest {
            tenant_id: tenant.to_string(),
            target_timestamp: target,
            base_backup_id: base_backup,
            tables: normalize_tables(tables),
            dry_run: true,
            confirm_restore: false,
            initiated_by: None,
        })
        .await?;

    let preview = response
        .preview
        .ok_or_else(|| VaultError::restore("预览响应缺少 preview 内容"))?;

    info!("🔍 时间点恢复预览 (目标 {})", target.to_rfc3339());
    info!("   基础备份: {}", preview.base_backup_id);
    info!(
        "   待重放变更: {} 条 (插入 {}, 更新 {}, 删除 {})",
        preview.stats.total_operations,
        preview.stats.insert_count,
        preview.stats.update_count,
        preview.stats.delete_count
    );
    for (table, changes) in &preview.changes_by_table {
        info!("   表 {}: {} 条变更", table, changes.len());
    }
    info!("   确认无误后执行:");
    info!(
        "   timevault restore execute --tenant {} --target {} --confirm",
        tenant,
        target.to_rfc3339()
    );
    Ok(())
}

/// 执行时间点恢复
#[allow(clippy::too_many_arguments)]
pub async fn run_restore_execute(
    app: &CliApp,
    tenant: &str,
    target: &str,
    base_backup: Option<String>,
    tables: Vec<String>,
    confirm: bool,
    initiated_by: &str,
) -> Result<()> {
    let target = parse_timestamp(target)?;

    let response = app
        .service
        .restore(RestoreRequest {
            tenant_id: tenant.to_string(),
            target_timestamp: target,
            base_backup_id: base_backup,
            tables: normalize_tables(tables),
            dry_run: false,
            confirm_restore: confirm,
            initiated_by: Some(initiated_by.to_string()),
        })
        .await?;

    let restore_id = response
        .restore_log_id
        .ok_or_else(|| VaultError::restore("执行响应缺少恢复记录ID"))?;

    info!("✅ 时间点恢复已启动: {}", restore_id);
    info!("   重放在后台执行，查询进度:");
    info!("   timevault restore show --tenant {} {}", tenant, restore_id);
    Ok(())
}

/// 列出恢复记录
pub async fn run_restore_list(app: &CliApp, tenant: &str, limit: Option<i64>) -> Result<()> {
    let logs = app.service.list_restores(tenant, limit).await?;

    if logs.is_empty() {
        info!("租户 {} 还没有恢复记录", tenant);
        return Ok(());
    }

    info!("📋 恢复记录 ({} 条):", logs.len());
    for log in logs {
        info!(
            "   {} | {} | {} | {}",
            log.id,
            log.restore_type.as_str(),
            log.status.as_str(),
            log.started_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

/// 显示单条恢复记录详情
pub async fn run_restore_show(app: &CliApp, tenant: &str, restore_id: &str) -> Result<()> {
    let log = app.service.get_restore(tenant, restore_id).await?;
    print_restore(&log);
    Ok(())
}

fn print_restore(log: &RestoreLog) {
    info!("⏪ 恢复记录 {}", log.id);
    info!("   类型: {}", log.restore_type.as_str());
    info!("   状态: {}", log.status.as_str());
    info!("   基础备份: {}", log.backup_job_id);
    info!("   开始时间: {}", log.started_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(completed_at) = log.completed_at {
        info!("   完成时间: {}", completed_at.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(duration) = log.duration_secs {
        info!("   耗时: {} 秒", duration);
    }
    if let (Some(tables), Some(rows)) = (log.tables_restored, log.rows_restored) {
        info!("   恢复范围: {} 表 {} 条变更", tables, rows);
    }
    if let Some(metadata) = &log.metadata {
        info!("   元数据: {}", metadata);
    }
    if let Some(error) = &log.error_message {
        warn!("   ❌ 失败原因: {}", error);
    }
}

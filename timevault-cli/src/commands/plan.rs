use crate::app::CliApp;
use timevault_core::db::{BackupSchedule, DrPlan};
use timevault_core::error::Result;
use tracing::info;

/// 写入或更新灾难恢复计划
#[allow(clippy::too_many_arguments)]
pub async fn run_plan_set(
    app: &CliApp,
    tenant: &str,
    id: &str,
    name: &str,
    rpo_minutes: i64,
    rto_minutes: i64,
    retention_days: i64,
) -> Result<()> {
    // 租户校验走统一入口
    let resolved = app.service.tenants().resolve(tenant).await?;

    app.database
        .upsert_dr_plan(DrPlan {
            id: id.to_string(),
            tenant_id: resolved.id,
            name: name.to_string(),
            rpo_minutes,
            rto_minutes,
            retention_days,
            active: true,
        })
        .await?;

    info!(
        "✅ 灾难恢复计划 {} 已保存 (RPO {} 分钟, RTO {} 分钟, 保留 {} 天)",
        id, rpo_minutes, rto_minutes, retention_days
    );
    Ok(())
}

/// 列出租户的有效灾难恢复计划
pub async fn run_plan_list(app: &CliApp, tenant: &str) -> Result<()> {
    let resolved = app.service.tenants().resolve(tenant).await?;
    let plans = app.database.list_active_dr_plans(&resolved.id).await?;

    if plans.is_empty() {
        info!("租户 {} 还没有灾难恢复计划", tenant);
        return Ok(());
    }

    info!("📋 灾难恢复计划 ({} 个):", plans.len());
    for plan in plans {
        info!(
            "   {} | {} | RPO {} 分钟 | RTO {} 分钟 | 保留 {} 天",
            plan.id, plan.name, plan.rpo_minutes, plan.rto_minutes, plan.retention_days
        );
    }
    Ok(())
}

/// 写入或更新备份调度配置
pub async fn run_plan_schedule(app: &CliApp, tenant: &str, cron: &str, enabled: bool) -> Result<()> {
    let resolved = app.service.tenants().resolve(tenant).await?;

    app.database
        .upsert_schedule(BackupSchedule {
            tenant_id: resolved.id,
            enabled,
            cron: cron.to_string(),
            next_run_at: None,
        })
        .await?;

    info!(
        "✅ 备份调度已保存: '{}' ({})",
        cron,
        if enabled { "已启用" } else { "已禁用" }
    );
    Ok(())
}

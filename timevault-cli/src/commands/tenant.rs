use crate::app::CliApp;
use timevault_core::db::TenantStatus;
use timevault_core::error::Result;
use tracing::info;

/// 注册或更新租户
pub async fn run_tenant_register(
    app: &CliApp,
    tenant_id: &str,
    name: &str,
    suspended: bool,
) -> Result<()> {
    let status = if suspended {
        TenantStatus::Suspended
    } else {
        TenantStatus::Active
    };

    app.service
        .tenants()
        .register(tenant_id, name, status)
        .await?;

    info!("✅ 租户已注册: {} ({}) 状态 {}", tenant_id, name, status.as_str());
    Ok(())
}

/// 列出所有活跃租户
pub async fn run_tenant_list(app: &CliApp) -> Result<()> {
    let tenants = app.service.tenants().list_active().await?;

    if tenants.is_empty() {
        info!("当前没有活跃租户");
        return Ok(());
    }

    info!("📋 活跃租户 ({} 个):", tenants.len());
    for tenant in tenants {
        info!(
            "   {} | {} | 注册于 {}",
            tenant.id,
            tenant.name,
            tenant.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

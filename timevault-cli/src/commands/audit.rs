use crate::app::CliApp;
use timevault_core::error::Result;
use tracing::info;

/// 显示租户最近的审计记录
pub async fn run_audit(app: &CliApp, tenant: &str, limit: i64) -> Result<()> {
    let resolved = app.service.tenants().resolve(tenant).await?;
    let records = app.service.audit().recent(&resolved.id, limit).await?;

    if records.is_empty() {
        info!("租户 {} 还没有审计记录", tenant);
        return Ok(());
    }

    info!("📋 审计记录 ({} 条):", records.len());
    for record in records {
        match record.detail {
            Some(detail) => info!(
                "   {} | {} | {}",
                record.created_at.format("%Y-%m-%d %H:%M:%S"),
                record.action,
                detail
            ),
            None => info!(
                "   {} | {}",
                record.created_at.format("%Y-%m-%d %H:%M:%S"),
                record.action
            ),
        }
    }
    Ok(())
}

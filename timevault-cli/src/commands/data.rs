use crate::app::CliApp;
use chrono::Utc;
use timevault_core::db::ChangeOperation;
use timevault_core::error::{Result, VaultError};
use tracing::info;

/// 写入业务记录并同步追加变更日志
pub async fn run_data_put(
    app: &CliApp,
    tenant: &str,
    table: &str,
    record_id: &str,
    json: &str,
) -> Result<()> {
    let resolved = app.service.tenants().resolve(tenant).await?;

    // 记录值必须是合法 JSON，否则备份载荷和恢复重放都会出问题
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| VaultError::validation(format!("记录内容不是合法的 JSON: {e}")))?;
    let data = value.to_string();

    let existing = app
        .database
        .get_record(&resolved.id, table, record_id)
        .await?;
    let now = Utc::now();

    app.database
        .upsert_record(&resolved.id, table, record_id, data.clone(), now)
        .await?;

    // 区分插入与更新，旧值一并写入变更日志
    let (operation, old_value) = match existing {
        Some(record) => (ChangeOperation::Update, Some(record.data)),
        None => (ChangeOperation::Insert, None),
    };
    app.database
        .append_change(
            &resolved.id,
            table,
            record_id,
            operation,
            old_value,
            Some(data),
            now,
        )
        .await?;

    info!(
        "✅ 记录已写入: {}/{} ({})",
        table,
        record_id,
        operation.as_str()
    );
    Ok(())
}

/// 删除业务记录并同步追加变更日志
pub async fn run_data_delete(
    app: &CliApp,
    tenant: &str,
    table: &str,
    record_id: &str,
) -> Result<()> {
    let resolved = app.service.tenants().resolve(tenant).await?;

    let existing = app
        .database
        .get_record(&resolved.id, table, record_id)
        .await?;
    let Some(record) = existing else {
        info!("⚠️ 记录不存在: {}/{}", table, record_id);
        return Ok(());
    };
    let now = Utc::now();

    app.database
        .delete_record(&resolved.id, table, record_id)
        .await?;
    app.database
        .append_change(
            &resolved.id,
            table,
            record_id,
            ChangeOperation::Delete,
            Some(record.data),
            None,
            now,
        )
        .await?;

    info!("✅ 记录已删除: {}/{}", table, record_id);
    Ok(())
}

/// 查看单条业务记录
pub async fn run_data_show(
    app: &CliApp,
    tenant: &str,
    table: &str,
    record_id: &str,
) -> Result<()> {
    let resolved = app.service.tenants().resolve(tenant).await?;

    match app
        .database
        .get_record(&resolved.id, table, record_id)
        .await?
    {
        Some(record) => {
            info!("📄 {}/{}", record.table_name, record.record_id);
            info!("   更新时间: {}", record.updated_at.to_rfc3339());
            info!("   内容: {}", record.data);
        }
        None => info!("⚠️ 记录不存在: {}/{}", table, record_id),
    }
    Ok(())
}

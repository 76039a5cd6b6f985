use crate::app::CliApp;
use crate::utils::normalize_tables;
use timevault_core::api::CreateBackupRequest;
use timevault_core::db::BackupJob;
use timevault_core::error::Result;
use tracing::{info, warn};

/// 创建备份任务
pub async fn run_backup_create(
    app: &CliApp,
    tenant: &str,
    backup_type: &str,
    name: Option<String>,
    description: Option<String>,
    tables: Vec<String>,
) -> Result<()> {
    let response = app
        .service
        .create_backup(CreateBackupRequest {
            tenant_id: tenant.to_string(),
            backup_type: backup_type.to_string(),
            name,
            description,
            tables: normalize_tables(tables),
        })
        .await?;

    info!("✅ 备份任务已受理: {}", response.job_id);
    info!("   导出在后台执行，查询进度:");
    info!("   timevault backup show --tenant {} {}", tenant, response.job_id);
    Ok(())
}

/// 列出备份任务
pub async fn run_backup_list(app: &CliApp, tenant: &str, limit: Option<i64>) -> Result<()> {
    let jobs = app.service.list_backups(tenant, limit).await?;

    if jobs.is_empty() {
        info!("租户 {} 还没有备份任务", tenant);
        return Ok(());
    }

    info!("📋 备份任务 ({} 个):", jobs.len());
    for job in jobs {
        info!(
            "   {} | {} | {} | {} | {}",
            job.id,
            job.job_type.as_str(),
            job.status.as_str(),
            job.created_at.format("%Y-%m-%d %H:%M:%S"),
            job.name
        );
    }
    Ok(())
}

/// 显示单个备份任务详情
pub async fn run_backup_show(app: &CliApp, tenant: &str, job_id: &str) -> Result<()> {
    let job = app.service.get_backup(tenant, job_id).await?;
    print_job(&job);
    Ok(())
}

fn print_job(job: &BackupJob) {
    info!("📦 备份任务 {}", job.id);
    info!("   名称: {}", job.name);
    info!("   类型: {}", job.job_type.as_str());
    info!("   状态: {}", job.status.as_str());
    info!("   创建时间: {}", job.created_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(description) = &job.description {
        info!("   描述: {}", description);
    }
    if let Some(completed_at) = job.completed_at {
        info!("   完成时间: {}", completed_at.format("%Y-%m-%d %H:%M:%S"));
    }
    if let (Some(tables), Some(rows)) = (job.table_count, job.row_count) {
        info!("   导出范围: {} 表 {} 行", tables, rows);
    }
    if let (Some(size), Some(stored)) = (job.size_bytes, job.stored_bytes) {
        info!("   大小: 原始 {} 字节, 存储 {} 字节", size, stored);
    }
    if let Some(location) = &job.storage_location {
        info!("   存储位置: {}", location);
    }
    if let Some(checksum) = &job.checksum {
        info!("   校验和: {}", checksum);
    }
    if let Some(error) = &job.error_message {
        warn!("   ❌ 失败原因: {}", error);
    }
}

/// 校验备份对象完整性
pub async fn run_backup_verify(app: &CliApp, tenant: &str, job_id: &str) -> Result<()> {
    let ok = app.service.verify_backup(tenant, job_id).await?;
    if ok {
        info!("✅ 备份 {} 完整性校验通过", job_id);
    } else {
        warn!("❌ 备份 {} 完整性校验未通过，对象缺失或已损坏", job_id);
    }
    Ok(())
}

/// 删除备份任务及后备对象
pub async fn run_backup_delete(app: &CliApp, tenant: &str, job_id: &str) -> Result<()> {
    app.service.delete_backup(tenant, job_id).await?;
    info!("✅ 备份 {} 已删除", job_id);
    Ok(())
}

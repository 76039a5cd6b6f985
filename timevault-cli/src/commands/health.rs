use crate::app::CliApp;
use timevault_core::error::Result;
use timevault_core::health::HealthReport;
use tracing::{info, warn};

/// 即时检查单个租户的备份健康状况
pub async fn run_health_check(app: &CliApp, tenant: &str) -> Result<()> {
    let report = app.service.check_health(tenant).await?;
    print_report(&report);
    Ok(())
}

/// 对所有活跃租户执行一轮巡检
pub async fn run_health_sweep(app: &CliApp) -> Result<()> {
    let reports = app.service.health_monitor().run_once().await?;

    info!("🏥 巡检完成，共 {} 个租户:", reports.len());
    for report in reports {
        info!(
            "   {} | {} | 评分 {:.1} | 问题 {} 警告 {}",
            report.tenant_id,
            report.status.as_str(),
            report.score,
            report.issues.len(),
            report.warnings.len()
        );
    }
    Ok(())
}

/// 显示租户的历史健康快照
pub async fn run_health_history(app: &CliApp, tenant: &str, limit: Option<i64>) -> Result<()> {
    let snapshots = app.service.health_history(tenant, limit).await?;

    if snapshots.is_empty() {
        info!("租户 {} 还没有健康快照", tenant);
        return Ok(());
    }

    info!("📋 健康快照 ({} 条):", snapshots.len());
    for snapshot in snapshots {
        info!(
            "   {} | {} | 评分 {:.1}",
            snapshot.checked_at.format("%Y-%m-%d %H:%M:%S"),
            snapshot.status.as_str(),
            snapshot.score
        );
    }
    Ok(())
}

fn print_report(report: &HealthReport) {
    info!("🏥 租户 {} 健康报告", report.tenant_id);
    info!("   状态: {}", report.status.as_str());
    info!("   评分: {:.1}", report.score);
    info!(
        "   备份任务: 共 {} 个, 成功 {} 失败 {}",
        report.metrics.total_jobs, report.metrics.completed_jobs, report.metrics.failed_jobs
    );
    match report.metrics.backup_age_hours {
        Some(hours) => info!("   最近成功备份: {} 小时前", hours),
        None => warn!("   最近成功备份: 无"),
    }
    if let Some(next_run) = report.metrics.next_scheduled_backup {
        info!("   下次调度备份: {}", next_run.format("%Y-%m-%d %H:%M:%S"));
    }
    info!(
        "   存储: {} 字节 (利用率 {:.1}%)",
        report.metrics.stored_bytes_total,
        report.metrics.storage_utilization * 100.0
    );

    for issue in &report.issues {
        warn!("   ❌ 问题: {}", issue);
    }
    for warning in &report.warnings {
        warn!("   ⚠️  警告: {}", warning);
    }
    for recommendation in &report.recommendations {
        info!("   💡 建议: {}", recommendation);
    }
}

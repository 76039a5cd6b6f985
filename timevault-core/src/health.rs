use crate::config::HealthConfig;
use crate::constants::health;
use crate::db::{
    BackupJobStats, BackupSchedule, Database, DrPlan, HealthSnapshot, HealthStatus, RestoreSummary,
};
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

/// 单个租户一轮巡检的指标明细
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthMetrics {
    pub total_jobs: i64,
    pub completed_jobs: i64,
    pub failed_jobs: i64,
    pub success_rate_pct: f64,
    pub last_backup_at: Option<DateTime<Utc>>,
    pub backup_age_hours: Option<i64>,
    pub avg_duration_secs: Option<f64>,
    pub stored_bytes_total: i64,
    pub storage_utilization: f64,
    pub growth_mb_per_day: f64,
    pub stuck_running_jobs: i64,
    pub last_restore_at: Option<DateTime<Utc>>,
    pub next_scheduled_backup: Option<DateTime<Utc>>,
    pub rpo_compliance_pct: f64,
    pub rto_compliance_pct: f64,
    pub retention_compliance_pct: f64,
}

/// 单个租户一轮巡检的完整结论
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub tenant_id: String,
    pub checked_at: DateTime<Utc>,
    pub status: HealthStatus,
    pub score: f64,
    pub metrics: HealthMetrics,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

impl HealthReport {
    /// 转为只追加的落库快照，列表字段序列化为JSON文本
    fn into_snapshot(self) -> Result<HealthSnapshot> {
        Ok(HealthSnapshot {
            id: 0,
            tenant_id: self.tenant_id,
            checked_at: self.checked_at,
            status: self.status,
            score: self.score,
            metrics: serde_json::to_string(&self.metrics)?,
            issues: serde_json::to_string(&self.issues)?,
            warnings: serde_json::to_string(&self.warnings)?,
            recommendations: serde_json::to_string(&self.recommendations)?,
        })
    }
}

/// 备份健康监控器
/// 周期巡检所有活跃租户，每轮每租户产出一条只追加的健康快照；
/// 单个租户的巡检失败不影响其他租户
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    database: Database,
    config: HealthConfig,
    capacity_ceiling_bytes: u64,
}

impl HealthMonitor {
    pub fn new(database: Database, config: HealthConfig, capacity_ceiling_bytes: u64) -> Self {
        Self {
            database,
            config,
            capacity_ceiling_bytes,
        }
    }

    /// 对所有活跃租户执行一轮巡检并落库快照
    pub async fn run_once(&self) -> Result<Vec<HealthReport>> {
        let tenants = self.database.list_active_tenants().await?;
        let mut reports = Vec::with_capacity(tenants.len());

        for tenant in tenants {
            match self.check_tenant(&tenant.id).await {
                Ok(report) => {
                    if let Err(e) = self
                        .database
                        .insert_health_snapshot(report.clone().into_snapshot()?)
                        .await
                    {
                        tracing::error!("租户 {} 的健康快照写入失败: {}", tenant.id, e);
                    }
                    reports.push(report);
                }
                Err(e) => {
                    // 单租户失败只记日志，继续巡检剩余租户
                    tracing::error!("租户 {} 健康检查失败: {}", tenant.id, e);
                }
            }
        }

        tracing::info!("健康巡检完成，共产出 {} 条快照", reports.len());
        Ok(reports)
    }

    /// 检查单个租户的备份健康状况
    pub async fn check_tenant(&self, tenant_id: &str) -> Result<HealthReport> {
        let now = Utc::now();
        let window_start = now - Duration::days(self.config.metrics_window_days);
        let stuck_before = now - Duration::hours(health::STUCK_RUNNING_HOURS);

        let stats = self
            .database
            .query_backup_job_stats(tenant_id, window_start, stuck_before)
            .await?;
        let latest_restore = self.database.latest_completed_restore(tenant_id).await?;
        let plans = self.database.list_active_dr_plans(tenant_id).await?;
        let schedule = self.database.get_schedule(tenant_id).await?;

        Ok(self.evaluate(tenant_id, now, &stats, latest_restore.as_ref(), &plans, schedule.as_ref()))
    }

    /// 根据聚合指标计算评分、状态与问题列表
    /// 纯计算，不触库
    fn evaluate(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
        stats: &BackupJobStats,
        latest_restore: Option<&RestoreSummary>,
        plans: &[DrPlan],
        schedule: Option<&BackupSchedule>,
    ) -> HealthReport {
        let mut issues = Vec::new();
        let mut warnings = Vec::new();
        let mut recommendations = Vec::new();

        // 成功率：统计窗口内无任务时按 0 分处理，没有证据就没有信用
        let success_rate_pct = if stats.total_jobs > 0 {
            stats.completed_jobs as f64 / stats.total_jobs as f64 * 100.0
        } else {
            0.0
        };
        let success_score = success_rate_pct;

        if stats.failed_jobs > health::FAILED_JOBS_CRITICAL_THRESHOLD as i64 {
            issues.push(format!(
                "统计窗口内失败备份任务达 {} 个，超过阈值 {}",
                stats.failed_jobs,
                health::FAILED_JOBS_CRITICAL_THRESHOLD
            ));
        } else if stats.failed_jobs > 0 {
            warnings.push(format!("统计窗口内存在 {} 个失败备份任务", stats.failed_jobs));
        }

        // 新鲜度：看最近一次成功备份距今多久
        let backup_age_hours = stats
            .last_completed_at
            .map(|at| (now - at).num_hours());
        let freshness_score = match backup_age_hours {
            Some(hours) if hours < health::FRESHNESS_WARNING_HOURS => 100.0,
            Some(hours) if hours < health::FRESHNESS_CRITICAL_HOURS => {
                warnings.push(format!("最近一次成功备份已是 {hours} 小时前"));
                60.0
            }
            Some(hours) => {
                issues.push(format!(
                    "最近一次成功备份已是 {hours} 小时前，超过 {} 小时",
                    health::FRESHNESS_CRITICAL_HOURS
                ));
                20.0
            }
            None => {
                issues.push("该租户从未有过成功备份".to_string());
                0.0
            }
        };

        // 合规性：对照灾难恢复计划检查 RPO / RTO / 保留期
        let (rpo_pct, rto_pct, retention_pct) =
            compliance_percentages(now, stats, latest_restore, plans);
        let compliance_score = (rpo_pct + rto_pct + retention_pct) / 3.0;
        if rpo_pct < 100.0 {
            issues.push("存在 RPO 不达标的灾难恢复计划".to_string());
        }
        if retention_pct < 100.0 {
            recommendations.push("存在超出计划保留期仍未清理的备份，建议执行保留策略清理".to_string());
        }
        if plans.is_empty() {
            recommendations.push("尚未配置灾难恢复计划，建议为该租户制定 RPO/RTO 目标".to_string());
        }

        // 存储：利用率与增长趋势
        let storage_utilization = if self.capacity_ceiling_bytes > 0 {
            stats.stored_bytes_total as f64 / self.capacity_ceiling_bytes as f64
        } else {
            0.0
        };
        let storage_score = if storage_utilization < health::UTILIZATION_WARNING {
            100.0
        } else if storage_utilization < health::UTILIZATION_CRITICAL {
            warnings.push(format!(
                "备份存储利用率已达 {:.1}%",
                storage_utilization * 100.0
            ));
            recommendations.push("建议审查各租户的备份保留策略，清理过期备份".to_string());
            60.0
        } else {
            issues.push(format!(
                "备份存储利用率已达 {:.1}%，接近容量上限",
                storage_utilization * 100.0
            ));
            recommendations
                .push("建议收紧保留策略并将历史备份归档到冷存储，尽快释放容量".to_string());
            20.0
        };

        let growth_mb_per_day = stats.stored_bytes_window as f64
            / self.config.metrics_window_days.max(1) as f64
            / (1024.0 * 1024.0);
        if growth_mb_per_day > health::GROWTH_RECOMMEND_MB_PER_DAY {
            recommendations.push(format!(
                "备份存储日均增长 {growth_mb_per_day:.0} MB，建议评估增量备份或压缩策略"
            ));
        }

        // 监控异常信号
        if stats.stuck_running_jobs > 0 {
            warnings.push(format!(
                "有 {} 个任务停留在 running 状态超过 {} 小时",
                stats.stuck_running_jobs,
                health::STUCK_RUNNING_HOURS
            ));
        }
        match schedule {
            Some(s) if !s.enabled => {
                warnings.push("备份调度已被禁用".to_string());
            }
            None => {
                warnings.push("该租户没有启用中的备份调度".to_string());
                recommendations.push("尚未配置备份调度，建议启用周期性自动备份".to_string());
            }
            Some(_) => {}
        }

        let weights = self.config.weights;
        let score = success_score * weights.success_rate
            + freshness_score * weights.freshness
            + compliance_score * weights.compliance
            + storage_score * weights.storage;

        let status = if score < health::SCORE_CRITICAL {
            HealthStatus::Critical
        } else if score >= health::SCORE_HEALTHY && issues.is_empty() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Warning
        };

        HealthReport {
            tenant_id: tenant_id.to_string(),
            checked_at: now,
            status,
            score,
            metrics: HealthMetrics {
                total_jobs: stats.total_jobs,
                completed_jobs: stats.completed_jobs,
                failed_jobs: stats.failed_jobs,
                success_rate_pct,
                last_backup_at: stats.last_completed_at,
                backup_age_hours,
                avg_duration_secs: stats.avg_duration_secs,
                stored_bytes_total: stats.stored_bytes_total,
                storage_utilization,
                growth_mb_per_day,
                stuck_running_jobs: stats.stuck_running_jobs,
                last_restore_at: latest_restore.map(|r| r.completed_at),
                next_scheduled_backup: schedule.and_then(|s| s.next_run_at),
                rpo_compliance_pct: rpo_pct,
                rto_compliance_pct: rto_pct,
                retention_compliance_pct: retention_pct,
            },
            issues,
            warnings,
            recommendations,
        }
    }

    /// 查询租户的历史健康快照
    pub async fn history(
        &self,
        tenant_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<HealthSnapshot>> {
        self.database.list_health_snapshots(tenant_id, limit).await
    }

    /// 启动周期巡检后台循环
    pub fn spawn_interval_loop(self) -> JoinHandle<()> {
        let interval_secs = self.config.check_interval_secs.max(1);
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_secs(interval_secs));
            // 第一个 tick 立即返回，启动后先跑一轮
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once().await {
                    tracing::error!("健康巡检轮次失败: {}", e);
                }
            }
        })
    }
}

/// 计算 RPO / RTO / 保留期三项合规百分比
/// 没有灾难恢复计划时三项都视为满分；RTO 在没有恢复耗时数据时按达标处理
fn compliance_percentages(
    now: DateTime<Utc>,
    stats: &BackupJobStats,
    latest_restore: Option<&RestoreSummary>,
    plans: &[DrPlan],
) -> (f64, f64, f64) {
    if plans.is_empty() {
        return (100.0, 100.0, 100.0);
    }

    let backup_age_minutes = stats.last_completed_at.map(|at| (now - at).num_minutes());
    let history_days = stats.oldest_created_at.map(|at| (now - at).num_days());
    let restore_minutes = latest_restore
        .and_then(|r| r.duration_secs)
        .map(|secs| (secs as f64 / 60.0).ceil() as i64);

    let total = plans.len() as f64;
    let mut rpo_ok = 0u32;
    let mut rto_ok = 0u32;
    let mut retention_ok = 0u32;

    for plan in plans {
        match backup_age_minutes {
            Some(age) if age <= plan.rpo_minutes => rpo_ok += 1,
            _ => {}
        }
        match restore_minutes {
            Some(minutes) if minutes > plan.rto_minutes => {}
            // 未验证过恢复耗时时不惩罚 RTO
            _ => rto_ok += 1,
        }
        // 保留期合规：留存中没有比保留期更老的备份才算达标，
        // 出现超龄备份说明保留策略没有被执行
        match history_days {
            Some(days) if days > plan.retention_days => {}
            _ => retention_ok += 1,
        }
    }

    (
        rpo_ok as f64 / total * 100.0,
        rto_ok as f64 / total * 100.0,
        retention_ok as f64 / total * 100.0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, ScoreWeights};
    use crate::db::{Tenant, TenantStatus};

    const CAPACITY: u64 = 100 * 1024 * 1024 * 1024;

    async fn monitor() -> (Database, HealthMonitor) {
        let db = Database::connect_memory().await.unwrap();
        let config = AppConfig::default().health;
        let monitor = HealthMonitor::new(db.clone(), config, CAPACITY);
        (db, monitor)
    }

    fn perfect_stats(now: DateTime<Utc>) -> BackupJobStats {
        BackupJobStats {
            total_jobs: 10,
            completed_jobs: 10,
            failed_jobs: 0,
            last_completed_at: Some(now - Duration::hours(1)),
            oldest_created_at: Some(now - Duration::days(60)),
            stored_bytes_window: 1024,
            stored_bytes_total: 4096,
            avg_duration_secs: Some(12.5),
            stuck_running_jobs: 0,
        }
    }

    #[tokio::test]
    async fn test_perfect_tenant_is_healthy() {
        let (_db, monitor) = monitor().await;
        let now = Utc::now();

        let report = monitor.evaluate("tenant-a", now, &perfect_stats(now), None, &[], None);
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!((report.score - 100.0).abs() < 1e-9);
        assert!(report.issues.is_empty());
    }

    #[tokio::test]
    async fn test_no_backups_is_critical() {
        let (_db, monitor) = monitor().await;
        let now = Utc::now();

        let report = monitor.evaluate("tenant-a", now, &BackupJobStats::default(), None, &[], None);
        // 成功率0 + 新鲜度0，合规与存储满分: 0.25*100 + 0.15*100 = 40
        assert_eq!(report.status, HealthStatus::Critical);
        assert!(report.score < health::SCORE_CRITICAL);
        assert!(report.issues.iter().any(|i| i.contains("从未有过成功备份")));
    }

    #[tokio::test]
    async fn test_mid_score_without_issues_is_warning() {
        let (_db, monitor) = monitor().await;
        let now = Utc::now();

        // 成功率50（1个失败，未超阈值），新鲜度60: 17.5 + 15 + 25 + 15 = 72.5
        let stats = BackupJobStats {
            total_jobs: 2,
            completed_jobs: 1,
            failed_jobs: 1,
            last_completed_at: Some(now - Duration::hours(30)),
            ..perfect_stats(now)
        };
        let report = monitor.evaluate("tenant-a", now, &stats, None, &[], None);
        assert_eq!(report.status, HealthStatus::Warning);
        assert!(report.score >= health::SCORE_CRITICAL && report.score < health::SCORE_HEALTHY);
        assert!(report.issues.is_empty());
        assert!(!report.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_high_score_with_issue_is_still_warning() {
        let (_db, monitor) = monitor().await;
        let now = Utc::now();

        // 利用率 92%: 存储 20 分，其余满分: 35 + 25 + 25 + 3 = 88
        let stats = BackupJobStats {
            stored_bytes_total: (CAPACITY as f64 * 0.92) as i64,
            ..perfect_stats(now)
        };
        let report = monitor.evaluate("tenant-a", now, &stats, None, &[], None);
        assert!(report.score >= health::SCORE_HEALTHY);
        assert!(!report.issues.is_empty());
        assert_eq!(report.status, HealthStatus::Warning);
        // 超过90%要同时建议收紧保留策略和冷存储归档
        assert!(report.recommendations.iter().any(|r| r.contains("冷存储")));
    }

    #[tokio::test]
    async fn test_utilization_warning_band_recommends_retention_review() {
        let (_db, monitor) = monitor().await;
        let now = Utc::now();

        // 利用率 85%: 告警档，建议审查保留策略
        let stats = BackupJobStats {
            stored_bytes_total: (CAPACITY as f64 * 0.85) as i64,
            ..perfect_stats(now)
        };
        let report = monitor.evaluate("tenant-a", now, &stats, None, &[], None);
        assert!(report.warnings.iter().any(|w| w.contains("利用率")));
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.contains("保留策略")));
        assert!(report.recommendations.iter().all(|r| !r.contains("冷存储")));
    }

    #[tokio::test]
    async fn test_failed_jobs_threshold_escalates() {
        let (_db, monitor) = monitor().await;
        let now = Utc::now();

        let warn_stats = BackupJobStats {
            total_jobs: 10,
            completed_jobs: 7,
            failed_jobs: 3,
            ..perfect_stats(now)
        };
        let report = monitor.evaluate("tenant-a", now, &warn_stats, None, &[], None);
        assert!(report.issues.iter().all(|i| !i.contains("失败备份任务达")));
        assert!(report.warnings.iter().any(|w| w.contains("失败备份任务")));

        let critical_stats = BackupJobStats {
            total_jobs: 10,
            completed_jobs: 6,
            failed_jobs: 4,
            ..perfect_stats(now)
        };
        let report = monitor.evaluate("tenant-a", now, &critical_stats, None, &[], None);
        assert!(report.issues.iter().any(|i| i.contains("失败备份任务达")));
    }

    #[tokio::test]
    async fn test_rpo_violation_flags_issue() {
        let (_db, monitor) = monitor().await;
        let now = Utc::now();

        let plan = DrPlan {
            id: "plan-1".to_string(),
            tenant_id: "tenant-a".to_string(),
            name: "核心业务".to_string(),
            rpo_minutes: 15,
            rto_minutes: 120,
            retention_days: 7,
            active: true,
        };

        // 最近备份1小时前，RPO 15分钟不达标
        let report = monitor.evaluate("tenant-a", now, &perfect_stats(now), None, &[plan], None);
        assert!(report.metrics.rpo_compliance_pct < 100.0);
        assert!(report.issues.iter().any(|i| i.contains("RPO")));
        // 最老备份60天，早已超出7天保留期还留着，保留策略未执行
        assert_eq!(report.metrics.retention_compliance_pct, 0.0);
        assert!(report.recommendations.iter().any(|r| r.contains("保留策略")));
    }

    #[tokio::test]
    async fn test_retention_compliant_when_no_overaged_backup() {
        let (_db, monitor) = monitor().await;
        let now = Utc::now();

        let plan = DrPlan {
            id: "plan-1".to_string(),
            tenant_id: "tenant-a".to_string(),
            name: "核心业务".to_string(),
            rpo_minutes: 120,
            rto_minutes: 120,
            retention_days: 7,
            active: true,
        };

        // 最老备份只有2天，没有超龄备份，保留期达标
        let stats = BackupJobStats {
            oldest_created_at: Some(now - Duration::days(2)),
            ..perfect_stats(now)
        };
        let report = monitor.evaluate("tenant-a", now, &stats, None, &[plan.clone()], None);
        assert_eq!(report.metrics.retention_compliance_pct, 100.0);

        // 完全没有备份时同样不存在超龄备份
        let empty = BackupJobStats::default();
        let report = monitor.evaluate("tenant-a", now, &empty, None, &[plan], None);
        assert_eq!(report.metrics.retention_compliance_pct, 100.0);
    }

    #[tokio::test]
    async fn test_missing_schedule_warns() {
        let (_db, monitor) = monitor().await;
        let now = Utc::now();

        let report = monitor.evaluate("tenant-a", now, &perfect_stats(now), None, &[], None);
        assert!(report.warnings.iter().any(|w| w.contains("备份调度")));
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.contains("周期性自动备份")));

        // 配了启用中的调度就没有这条告警，next_run_at 进入指标
        let next_run = now + Duration::hours(6);
        let schedule = BackupSchedule {
            tenant_id: "tenant-a".to_string(),
            enabled: true,
            cron: "0 2 * * *".to_string(),
            next_run_at: Some(next_run),
        };
        let report =
            monitor.evaluate("tenant-a", now, &perfect_stats(now), None, &[], Some(&schedule));
        assert!(report.warnings.iter().all(|w| !w.contains("备份调度")));
        assert_eq!(report.metrics.next_scheduled_backup, Some(next_run));
    }

    #[tokio::test]
    async fn test_weights_are_tunable() {
        let db = Database::connect_memory().await.unwrap();
        let mut config = AppConfig::default().health;
        // 只看新鲜度
        config.weights = ScoreWeights {
            success_rate: 0.0,
            freshness: 1.0,
            compliance: 0.0,
            storage: 0.0,
        };
        let monitor = HealthMonitor::new(db, config, CAPACITY);
        let now = Utc::now();

        let stats = BackupJobStats {
            total_jobs: 10,
            completed_jobs: 1,
            failed_jobs: 9,
            last_completed_at: Some(now - Duration::hours(1)),
            ..perfect_stats(now)
        };
        let report = monitor.evaluate("tenant-a", now, &stats, None, &[], None);
        assert!((report.score - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_status_boundaries_are_exact() {
        let db = Database::connect_memory().await.unwrap();
        let mut config = AppConfig::default().health;
        // 只看成功率，分数即成功率百分比，方便卡边界
        config.weights = ScoreWeights {
            success_rate: 1.0,
            freshness: 0.0,
            compliance: 0.0,
            storage: 0.0,
        };
        let monitor = HealthMonitor::new(db, config, CAPACITY);
        let now = Utc::now();

        let with_rate = |completed: i64, total: i64| BackupJobStats {
            total_jobs: total,
            completed_jobs: completed,
            failed_jobs: 2,
            ..perfect_stats(now)
        };

        // 恰好80分且无问题项: healthy
        let report = monitor.evaluate("tenant-a", now, &with_rate(8, 10), None, &[], None);
        assert!((report.score - 80.0).abs() < 1e-9);
        assert!(report.issues.is_empty());
        assert_eq!(report.status, HealthStatus::Healthy);

        // 恰好60分: 还不到 critical
        let report = monitor.evaluate("tenant-a", now, &with_rate(60, 100), None, &[], None);
        assert!((report.score - 60.0).abs() < 1e-9);
        assert_eq!(report.status, HealthStatus::Warning);

        // 59分: critical
        let report = monitor.evaluate("tenant-a", now, &with_rate(59, 100), None, &[], None);
        assert!((report.score - 59.0).abs() < 1e-9);
        assert_eq!(report.status, HealthStatus::Critical);
    }

    #[tokio::test]
    async fn test_run_once_snapshots_all_active_tenants() {
        let (db, monitor) = monitor().await;
        let now = Utc::now();

        for (id, status) in [
            ("tenant-a", TenantStatus::Active),
            ("tenant-b", TenantStatus::Active),
            ("tenant-c", TenantStatus::Suspended),
        ] {
            db.upsert_tenant(Tenant {
                id: id.to_string(),
                name: id.to_string(),
                status,
                created_at: now,
            })
            .await
            .unwrap();
        }

        let reports = monitor.run_once().await.unwrap();
        // 停用租户不参与巡检
        assert_eq!(reports.len(), 2);

        let snapshots = monitor.history("tenant-a", None).await.unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].status, HealthStatus::Critical);
        let metrics: HealthMetrics = serde_json::from_str(&snapshots[0].metrics).unwrap();
        assert_eq!(metrics.total_jobs, 0);
        assert!(monitor.history("tenant-c", None).await.unwrap().is_empty());
    }
}

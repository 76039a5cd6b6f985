use crate::{Result, VaultError};
use chrono::{DateTime, Utc};
use duckdb::{Connection, Row, params};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::messages::DbMessage;
use super::models::{
    AuditRecord, BackupJob, BackupJobStats, BackupJobStatus, BackupJobType, BackupSchedule,
    ChangeLogEntry, ChangeOperation, ChangeStats, DrPlan, HealthSnapshot, HealthStatus, LiveRecord,
    RestoreLog, RestoreStatus, RestoreSummary, RestoreType, Tenant, TenantStatus,
};

/// DuckDB Actor - 确保单线程访问DuckDB
pub struct VaultDbActor {
    connection: Connection,
}

impl VaultDbActor {
    /// 创建新的DuckDB Actor
    pub fn new(db_path: PathBuf) -> Result<Self> {
        let connection = Connection::open(db_path)?;
        Ok(Self { connection })
    }

    /// 创建内存DuckDB Actor
    pub fn new_memory() -> Result<Self> {
        let connection = Connection::open_in_memory()?;
        Ok(Self { connection })
    }

    /// 运行Actor消息循环
    pub async fn run(mut self, mut receiver: mpsc::Receiver<DbMessage>) {
        info!("TimeVault 数据库 Actor 已启动");

        while let Some(message) = receiver.recv().await {
            self.handle_message(message);
        }

        info!("TimeVault 数据库 Actor 已关闭");
    }

    /// 处理数据库消息
    fn handle_message(&mut self, message: DbMessage) {
        match message {
            DbMessage::InitTables { respond_to } => {
                let _ = respond_to.send(self.init_tables());
            }
            DbMessage::CreateBackupJob { job, respond_to } => {
                let _ = respond_to.send(self.create_backup_job(&job));
            }
            DbMessage::CompleteBackupJob {
                job_id,
                completed_at,
                size_bytes,
                stored_bytes,
                table_count,
                row_count,
                checksum,
                storage_location,
                respond_to,
            } => {
                let _ = respond_to.send(self.complete_backup_job(
                    &job_id,
                    completed_at,
                    size_bytes,
                    stored_bytes,
                    table_count,
                    row_count,
                    &checksum,
                    &storage_location,
                ));
            }
            DbMessage::FailBackupJob {
                job_id,
                completed_at,
                error_message,
                error_detail,
                respond_to,
            } => {
                let _ = respond_to.send(self.fail_backup_job(
                    &job_id,
                    completed_at,
                    &error_message,
                    error_detail.as_deref(),
                ));
            }
            DbMessage::GetBackupJob {
                tenant_id,
                job_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.get_backup_job(&tenant_id, &job_id));
            }
            DbMessage::ListBackupJobs {
                tenant_id,
                limit,
                respond_to,
            } => {
                let _ = respond_to.send(self.list_backup_jobs(&tenant_id, limit));
            }
            DbMessage::FindBaseBackup {
                tenant_id,
                target,
                respond_to,
            } => {
                let _ = respond_to.send(self.find_base_backup(&tenant_id, target));
            }
            DbMessage::DeleteBackupJob {
                tenant_id,
                job_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.delete_backup_job(&tenant_id, &job_id));
            }
            DbMessage::QueryBackupJobStats {
                tenant_id,
                window_start,
                stuck_before,
                respond_to,
            } => {
                let _ =
                    respond_to.send(self.query_backup_job_stats(&tenant_id, window_start, stuck_before));
            }
            DbMessage::AppendChange {
                tenant_id,
                table_name,
                record_id,
                operation,
                old_value,
                new_value,
                changed_at,
                respond_to,
            } => {
                let _ = respond_to.send(self.append_change(
                    &tenant_id,
                    &table_name,
                    &record_id,
                    operation,
                    old_value.as_deref(),
                    new_value.as_deref(),
                    changed_at,
                ));
            }
            DbMessage::QueryChangeWindow {
                tenant_id,
                from_exclusive,
                to_inclusive,
                tables,
                respond_to,
            } => {
                let _ = respond_to.send(self.query_change_window(
                    &tenant_id,
                    from_exclusive,
                    to_inclusive,
                    tables,
                ));
            }
            DbMessage::QueryChangeStats {
                tenant_id,
                from_exclusive,
                to_inclusive,
                respond_to,
            } => {
                let _ =
                    respond_to.send(self.query_change_stats(&tenant_id, from_exclusive, to_inclusive));
            }
            DbMessage::ScanTable {
                tenant_id,
                table_name,
                respond_to,
            } => {
                let _ = respond_to.send(self.scan_table(&tenant_id, &table_name));
            }
            DbMessage::UpsertRecord {
                tenant_id,
                table_name,
                record_id,
                data,
                updated_at,
                respond_to,
            } => {
                let _ = respond_to.send(self.upsert_record(
                    &tenant_id,
                    &table_name,
                    &record_id,
                    &data,
                    updated_at,
                ));
            }
            DbMessage::DeleteRecord {
                tenant_id,
                table_name,
                record_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.delete_record(&tenant_id, &table_name, &record_id));
            }
            DbMessage::GetRecord {
                tenant_id,
                table_name,
                record_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.get_record(&tenant_id, &table_name, &record_id));
            }
            DbMessage::CreateRestoreLog { log, respond_to } => {
                let _ = respond_to.send(self.create_restore_log(&log));
            }
            DbMessage::CompleteRestoreLog {
                restore_id,
                completed_at,
                duration_secs,
                tables_restored,
                rows_restored,
                respond_to,
            } => {
                let _ = respond_to.send(self.complete_restore_log(
                    &restore_id,
                    completed_at,
                    duration_secs,
                    tables_restored,
                    rows_restored,
                ));
            }
            DbMessage::FailRestoreLog {
                restore_id,
                completed_at,
                error_message,
                respond_to,
            } => {
                let _ =
                    respond_to.send(self.fail_restore_log(&restore_id, completed_at, &error_message));
            }
            DbMessage::GetRestoreLog {
                tenant_id,
                restore_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.get_restore_log(&tenant_id, &restore_id));
            }
            DbMessage::ListRestoreLogs {
                tenant_id,
                limit,
                respond_to,
            } => {
                let _ = respond_to.send(self.list_restore_logs(&tenant_id, limit));
            }
            DbMessage::LatestCompletedRestore {
                tenant_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.latest_completed_restore(&tenant_id));
            }
            DbMessage::InsertHealthSnapshot {
                snapshot,
                respond_to,
            } => {
                let _ = respond_to.send(self.insert_health_snapshot(&snapshot));
            }
            DbMessage::ListHealthSnapshots {
                tenant_id,
                limit,
                respond_to,
            } => {
                let _ = respond_to.send(self.list_health_snapshots(&tenant_id, limit));
            }
            DbMessage::UpsertDrPlan { plan, respond_to } => {
                let _ = respond_to.send(self.upsert_dr_plan(&plan));
            }
            DbMessage::ListActiveDrPlans {
                tenant_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.list_active_dr_plans(&tenant_id));
            }
            DbMessage::UpsertSchedule {
                schedule,
                respond_to,
            } => {
                let _ = respond_to.send(self.upsert_schedule(&schedule));
            }
            DbMessage::GetSchedule {
                tenant_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.get_schedule(&tenant_id));
            }
            DbMessage::UpsertTenant { tenant, respond_to } => {
                let _ = respond_to.send(self.upsert_tenant(&tenant));
            }
            DbMessage::GetTenant {
                tenant_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.get_tenant(&tenant_id));
            }
            DbMessage::ListActiveTenants { respond_to } => {
                let _ = respond_to.send(self.list_active_tenants());
            }
            DbMessage::InsertAudit {
                tenant_id,
                action,
                detail,
                created_at,
                respond_to,
            } => {
                let _ = respond_to.send(self.insert_audit(
                    &tenant_id,
                    &action,
                    detail.as_deref(),
                    created_at,
                ));
            }
            DbMessage::RecentAudit {
                tenant_id,
                limit,
                respond_to,
            } => {
                let _ = respond_to.send(self.recent_audit(&tenant_id, limit));
            }
        }
    }

    /// 初始化数据库表
    fn init_tables(&mut self) -> Result<()> {
        debug!("正在初始化DuckDB表...");

        // 读取并执行SQL初始化脚本
        let sql_content = include_str!("../../migrations/init_duckdb.sql");

        // 按分号分割SQL语句并执行
        for statement in sql_content.split(';').filter(|s| !s.trim().is_empty()) {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                self.connection.execute(trimmed, [])?;
            }
        }

        info!("DuckDB表初始化完成");
        Ok(())
    }

    // ========== 备份任务 ==========

    fn create_backup_job(&mut self, job: &BackupJob) -> Result<()> {
        self.connection.execute(
            "INSERT INTO backup_jobs (id, tenant_id, job_type, name, description, status,
                created_at, started_at, completed_at, size_bytes, stored_bytes, table_count,
                row_count, checksum, error_message, error_detail, storage_location)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                job.id,
                job.tenant_id,
                job.job_type.as_str(),
                job.name,
                job.description,
                job.status.as_str(),
                job.created_at,
                job.started_at,
                job.completed_at,
                job.size_bytes,
                job.stored_bytes,
                job.table_count,
                job.row_count,
                job.checksum,
                job.error_message,
                job.error_detail,
                job.storage_location,
            ],
        )?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn complete_backup_job(
        &mut self,
        job_id: &str,
        completed_at: DateTime<Utc>,
        size_bytes: i64,
        stored_bytes: i64,
        table_count: i32,
        row_count: i64,
        checksum: &str,
        storage_location: &str,
    ) -> Result<()> {
        // 终态记录不可变，状态条件保证只有 running 任务能完成
        let updated = self.connection.execute(
            "UPDATE backup_jobs SET status = 'completed', completed_at = ?, size_bytes = ?,
                stored_bytes = ?, table_count = ?, row_count = ?, checksum = ?,
                storage_location = ?
             WHERE id = ? AND status = 'running'",
            params![
                completed_at,
                size_bytes,
                stored_bytes,
                table_count,
                row_count,
                checksum,
                storage_location,
                job_id
            ],
        )?;

        if updated == 0 {
            return Err(VaultError::backup(format!(
                "备份任务 {job_id} 不处于 running 状态，无法标记完成"
            )));
        }
        Ok(())
    }

    fn fail_backup_job(
        &mut self,
        job_id: &str,
        completed_at: DateTime<Utc>,
        error_message: &str,
        error_detail: Option<&str>,
    ) -> Result<()> {
        let updated = self.connection.execute(
            "UPDATE backup_jobs SET status = 'failed', completed_at = ?, error_message = ?,
                error_detail = ?
             WHERE id = ? AND status IN ('pending', 'running')",
            params![completed_at, error_message, error_detail, job_id],
        )?;

        if updated == 0 {
            return Err(VaultError::backup(format!(
                "备份任务 {job_id} 已处于终态，无法标记失败"
            )));
        }
        Ok(())
    }

    fn row_to_backup_job(row: &Row<'_>) -> duckdb::Result<(BackupJob, String, String)> {
        let job_type: String = row.get(2)?;
        let status: String = row.get(5)?;
        Ok((
            BackupJob {
                id: row.get(0)?,
                tenant_id: row.get(1)?,
                job_type: BackupJobType::Full,
                name: row.get(3)?,
                description: row.get(4)?,
                status: BackupJobStatus::Pending,
                created_at: row.get(6)?,
                started_at: row.get(7)?,
                completed_at: row.get(8)?,
                size_bytes: row.get(9)?,
                stored_bytes: row.get(10)?,
                table_count: row.get(11)?,
                row_count: row.get(12)?,
                checksum: row.get(13)?,
                error_message: row.get(14)?,
                error_detail: row.get(15)?,
                storage_location: row.get(16)?,
            },
            job_type,
            status,
        ))
    }

    fn finish_backup_job(raw: (BackupJob, String, String)) -> Result<BackupJob> {
        let (mut job, job_type, status) = raw;
        job.job_type = BackupJobType::parse(&job_type)?;
        job.status = BackupJobStatus::parse(&status)?;
        Ok(job)
    }

    const BACKUP_JOB_COLUMNS: &'static str = "id, tenant_id, job_type, name, description, status, \
         created_at, started_at, completed_at, size_bytes, stored_bytes, table_count, row_count, \
         checksum, error_message, error_detail, storage_location";

    fn get_backup_job(&mut self, tenant_id: &str, job_id: &str) -> Result<Option<BackupJob>> {
        let sql = format!(
            "SELECT {} FROM backup_jobs WHERE tenant_id = ? AND id = ?",
            Self::BACKUP_JOB_COLUMNS
        );
        let mut stmt = self.connection.prepare(&sql)?;
        let mut rows = stmt.query(params![tenant_id, job_id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(Self::finish_backup_job(Self::row_to_backup_job(row)?)?))
        } else {
            Ok(None)
        }
    }

    fn list_backup_jobs(&mut self, tenant_id: &str, limit: Option<i64>) -> Result<Vec<BackupJob>> {
        let mut sql = format!(
            "SELECT {} FROM backup_jobs WHERE tenant_id = ? ORDER BY created_at DESC",
            Self::BACKUP_JOB_COLUMNS
        );
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut stmt = self.connection.prepare(&sql)?;
        let job_iter = stmt.query_map(params![tenant_id], Self::row_to_backup_job)?;

        let mut jobs = Vec::new();
        for job in job_iter {
            jobs.push(Self::finish_backup_job(job?)?);
        }
        Ok(jobs)
    }

    fn find_base_backup(
        &mut self,
        tenant_id: &str,
        target: DateTime<Utc>,
    ) -> Result<Option<BackupJob>> {
        // 只从 completed full 备份中选取，避免串联增量链
        let sql = format!(
            "SELECT {} FROM backup_jobs
             WHERE tenant_id = ? AND status = 'completed' AND job_type = 'full'
               AND created_at <= ?
             ORDER BY created_at DESC LIMIT 1",
            Self::BACKUP_JOB_COLUMNS
        );
        let mut stmt = self.connection.prepare(&sql)?;
        let mut rows = stmt.query(params![tenant_id, target])?;

        if let Some(row) = rows.next()? {
            Ok(Some(Self::finish_backup_job(Self::row_to_backup_job(row)?)?))
        } else {
            Ok(None)
        }
    }

    fn delete_backup_job(&mut self, tenant_id: &str, job_id: &str) -> Result<()> {
        self.connection.execute(
            "DELETE FROM backup_jobs WHERE tenant_id = ? AND id = ?",
            params![tenant_id, job_id],
        )?;
        Ok(())
    }

    fn query_backup_job_stats(
        &mut self,
        tenant_id: &str,
        window_start: DateTime<Utc>,
        stuck_before: DateTime<Utc>,
    ) -> Result<BackupJobStats> {
        let (total_jobs, completed_jobs, failed_jobs, stored_bytes_window, avg_duration_secs) =
            self.connection.query_row(
                "SELECT COUNT(*),
                        CAST(COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0) AS BIGINT),
                        CAST(COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0) AS BIGINT),
                        CAST(COALESCE(SUM(CASE WHEN status = 'completed' THEN stored_bytes ELSE 0 END), 0) AS BIGINT),
                        AVG(CASE WHEN status = 'completed'
                                 THEN date_diff('second', started_at, completed_at) END)
                 FROM backup_jobs WHERE tenant_id = ? AND created_at >= ?",
                params![tenant_id, window_start],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, Option<f64>>(4)?,
                    ))
                },
            )?;

        let (last_completed_at, oldest_created_at, stored_bytes_total) =
            self.connection.query_row(
                "SELECT MAX(CASE WHEN status = 'completed' THEN created_at END),
                        MIN(created_at),
                        CAST(COALESCE(SUM(CASE WHEN status = 'completed' THEN stored_bytes ELSE 0 END), 0) AS BIGINT)
                 FROM backup_jobs WHERE tenant_id = ?",
                params![tenant_id],
                |row| {
                    Ok((
                        row.get::<_, Option<DateTime<Utc>>>(0)?,
                        row.get::<_, Option<DateTime<Utc>>>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )?;

        let stuck_running_jobs: i64 = self.connection.query_row(
            "SELECT COUNT(*) FROM backup_jobs
             WHERE tenant_id = ? AND status = 'running' AND started_at < ?",
            params![tenant_id, stuck_before],
            |row| row.get(0),
        )?;

        Ok(BackupJobStats {
            total_jobs,
            completed_jobs,
            failed_jobs,
            last_completed_at,
            oldest_created_at,
            stored_bytes_window,
            stored_bytes_total,
            avg_duration_secs,
            stuck_running_jobs,
        })
    }

    // ========== 变更日志 ==========

    #[allow(clippy::too_many_arguments)]
    fn append_change(
        &mut self,
        tenant_id: &str,
        table_name: &str,
        record_id: &str,
        operation: ChangeOperation,
        old_value: Option<&str>,
        new_value: Option<&str>,
        changed_at: DateTime<Utc>,
    ) -> Result<i64> {
        self.connection.execute(
            "INSERT INTO change_log (tenant_id, table_name, record_id, operation, old_value,
                new_value, changed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                tenant_id,
                table_name,
                record_id,
                operation.as_str(),
                old_value,
                new_value,
                changed_at
            ],
        )?;

        let id: i64 = self
            .connection
            .query_row("SELECT currval('change_log_id_seq')", [], |row| row.get(0))?;
        Ok(id)
    }

    fn query_change_window(
        &mut self,
        tenant_id: &str,
        from_exclusive: DateTime<Utc>,
        to_inclusive: DateTime<Utc>,
        tables: Option<Vec<String>>,
    ) -> Result<Vec<ChangeLogEntry>> {
        // 重放顺序契约：按变更时间升序，同一时刻按追加顺序
        let mut stmt = self.connection.prepare(
            "SELECT id, tenant_id, table_name, record_id, operation, old_value, new_value,
                    changed_at
             FROM change_log
             WHERE tenant_id = ? AND changed_at > ? AND changed_at <= ?
             ORDER BY changed_at ASC, id ASC",
        )?;

        let entry_iter = stmt.query_map(
            params![tenant_id, from_exclusive, to_inclusive],
            |row| {
                let operation: String = row.get(4)?;
                Ok((
                    ChangeLogEntry {
                        id: row.get(0)?,
                        tenant_id: row.get(1)?,
                        table_name: row.get(2)?,
                        record_id: row.get(3)?,
                        operation: ChangeOperation::Insert,
                        old_value: row.get(5)?,
                        new_value: row.get(6)?,
                        changed_at: row.get(7)?,
                    },
                    operation,
                ))
            },
        )?;

        let mut entries = Vec::new();
        for entry in entry_iter {
            let (mut entry, operation) = entry?;
            entry.operation = ChangeOperation::parse(&operation)?;
            if let Some(tables) = &tables {
                if !tables.contains(&entry.table_name) {
                    continue;
                }
            }
            entries.push(entry);
        }
        Ok(entries)
    }

    fn query_change_stats(
        &mut self,
        tenant_id: &str,
        from_exclusive: DateTime<Utc>,
        to_inclusive: DateTime<Utc>,
    ) -> Result<ChangeStats> {
        let (total, inserts, updates, deletes) = self.connection.query_row(
            "SELECT COUNT(*),
                    CAST(COALESCE(SUM(CASE WHEN operation = 'insert' THEN 1 ELSE 0 END), 0) AS BIGINT),
                    CAST(COALESCE(SUM(CASE WHEN operation = 'update' THEN 1 ELSE 0 END), 0) AS BIGINT),
                    CAST(COALESCE(SUM(CASE WHEN operation = 'delete' THEN 1 ELSE 0 END), 0) AS BIGINT)
             FROM change_log WHERE tenant_id = ? AND changed_at > ? AND changed_at <= ?",
            params![tenant_id, from_exclusive, to_inclusive],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            },
        )?;

        let mut stmt = self.connection.prepare(
            "SELECT DISTINCT table_name FROM change_log
             WHERE tenant_id = ? AND changed_at > ? AND changed_at <= ?
             ORDER BY table_name",
        )?;
        let table_iter = stmt.query_map(
            params![tenant_id, from_exclusive, to_inclusive],
            |row| row.get::<_, String>(0),
        )?;

        let mut affected_tables = Vec::new();
        for table in table_iter {
            affected_tables.push(table?);
        }

        Ok(ChangeStats {
            total_operations: total,
            insert_count: inserts,
            update_count: updates,
            delete_count: deletes,
            affected_tables,
        })
    }

    // ========== 租户业务数据 ==========

    fn scan_table(&mut self, tenant_id: &str, table_name: &str) -> Result<Vec<LiveRecord>> {
        let mut stmt = self.connection.prepare(
            "SELECT tenant_id, table_name, record_id, data, updated_at
             FROM live_records WHERE tenant_id = ? AND table_name = ?
             ORDER BY record_id",
        )?;

        let record_iter = stmt.query_map(params![tenant_id, table_name], |row| {
            Ok(LiveRecord {
                tenant_id: row.get(0)?,
                table_name: row.get(1)?,
                record_id: row.get(2)?,
                data: row.get(3)?,
                updated_at: row.get(4)?,
            })
        })?;

        let mut records = Vec::new();
        for record in record_iter {
            records.push(record?);
        }
        Ok(records)
    }

    fn upsert_record(
        &mut self,
        tenant_id: &str,
        table_name: &str,
        record_id: &str,
        data: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let updated = self.connection.execute(
            "UPDATE live_records SET data = ?, updated_at = ?
             WHERE tenant_id = ? AND table_name = ? AND record_id = ?",
            params![data, updated_at, tenant_id, table_name, record_id],
        )?;

        if updated == 0 {
            self.connection.execute(
                "INSERT INTO live_records (tenant_id, table_name, record_id, data, updated_at)
                 VALUES (?, ?, ?, ?, ?)",
                params![tenant_id, table_name, record_id, data, updated_at],
            )?;
        }
        Ok(())
    }

    fn delete_record(&mut self, tenant_id: &str, table_name: &str, record_id: &str) -> Result<()> {
        self.connection.execute(
            "DELETE FROM live_records WHERE tenant_id = ? AND table_name = ? AND record_id = ?",
            params![tenant_id, table_name, record_id],
        )?;
        Ok(())
    }

    fn get_record(
        &mut self,
        tenant_id: &str,
        table_name: &str,
        record_id: &str,
    ) -> Result<Option<LiveRecord>> {
        let mut stmt = self.connection.prepare(
            "SELECT tenant_id, table_name, record_id, data, updated_at
             FROM live_records WHERE tenant_id = ? AND table_name = ? AND record_id = ?",
        )?;
        let mut rows = stmt.query(params![tenant_id, table_name, record_id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(LiveRecord {
                tenant_id: row.get(0)?,
                table_name: row.get(1)?,
                record_id: row.get(2)?,
                data: row.get(3)?,
                updated_at: row.get(4)?,
            }))
        } else {
            Ok(None)
        }
    }

    // ========== 恢复记录 ==========

    fn create_restore_log(&mut self, log: &RestoreLog) -> Result<()> {
        self.connection.execute(
            "INSERT INTO restore_logs (id, tenant_id, backup_job_id, restore_type, status,
                started_at, completed_at, duration_secs, tables_restored, rows_restored,
                error_message, notes, metadata)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                log.id,
                log.tenant_id,
                log.backup_job_id,
                log.restore_type.as_str(),
                log.status.as_str(),
                log.started_at,
                log.completed_at,
                log.duration_secs,
                log.tables_restored,
                log.rows_restored,
                log.error_message,
                log.notes,
                log.metadata,
            ],
        )?;
        Ok(())
    }

    fn complete_restore_log(
        &mut self,
        restore_id: &str,
        completed_at: DateTime<Utc>,
        duration_secs: i64,
        tables_restored: i32,
        rows_restored: i64,
    ) -> Result<()> {
        let updated = self.connection.execute(
            "UPDATE restore_logs SET status = 'completed', completed_at = ?, duration_secs = ?,
                tables_restored = ?, rows_restored = ?
             WHERE id = ? AND status = 'running'",
            params![
                completed_at,
                duration_secs,
                tables_restored,
                rows_restored,
                restore_id
            ],
        )?;

        if updated == 0 {
            return Err(VaultError::restore(format!(
                "恢复记录 {restore_id} 不处于 running 状态，无法标记完成"
            )));
        }
        Ok(())
    }

    fn fail_restore_log(
        &mut self,
        restore_id: &str,
        completed_at: DateTime<Utc>,
        error_message: &str,
    ) -> Result<()> {
        let updated = self.connection.execute(
            "UPDATE restore_logs SET status = 'failed', completed_at = ?, error_message = ?
             WHERE id = ? AND status = 'running'",
            params![completed_at, error_message, restore_id],
        )?;

        if updated == 0 {
            return Err(VaultError::restore(format!(
                "恢复记录 {restore_id} 已处于终态，无法标记失败"
            )));
        }
        Ok(())
    }

    fn row_to_restore_log(row: &Row<'_>) -> duckdb::Result<(RestoreLog, String, String)> {
        let restore_type: String = row.get(3)?;
        let status: String = row.get(4)?;
        Ok((
            RestoreLog {
                id: row.get(0)?,
                tenant_id: row.get(1)?,
                backup_job_id: row.get(2)?,
                restore_type: RestoreType::Pitr,
                status: RestoreStatus::Running,
                started_at: row.get(5)?,
                completed_at: row.get(6)?,
                duration_secs: row.get(7)?,
                tables_restored: row.get(8)?,
                rows_restored: row.get(9)?,
                error_message: row.get(10)?,
                notes: row.get(11)?,
                metadata: row.get(12)?,
            },
            restore_type,
            status,
        ))
    }

    fn finish_restore_log(raw: (RestoreLog, String, String)) -> Result<RestoreLog> {
        let (mut log, restore_type, status) = raw;
        log.restore_type = RestoreType::parse(&restore_type)?;
        log.status = RestoreStatus::parse(&status)?;
        Ok(log)
    }

    const RESTORE_LOG_COLUMNS: &'static str = "id, tenant_id, backup_job_id, restore_type, \
         status, started_at, completed_at, duration_secs, tables_restored, rows_restored, \
         error_message, notes, metadata";

    fn get_restore_log(&mut self, tenant_id: &str, restore_id: &str) -> Result<Option<RestoreLog>> {
        let sql = format!(
            "SELECT {} FROM restore_logs WHERE tenant_id = ? AND id = ?",
            Self::RESTORE_LOG_COLUMNS
        );
        let mut stmt = self.connection.prepare(&sql)?;
        let mut rows = stmt.query(params![tenant_id, restore_id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(Self::finish_restore_log(Self::row_to_restore_log(row)?)?))
        } else {
            Ok(None)
        }
    }

    fn list_restore_logs(&mut self, tenant_id: &str, limit: Option<i64>) -> Result<Vec<RestoreLog>> {
        let mut sql = format!(
            "SELECT {} FROM restore_logs WHERE tenant_id = ? ORDER BY started_at DESC",
            Self::RESTORE_LOG_COLUMNS
        );
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut stmt = self.connection.prepare(&sql)?;
        let log_iter = stmt.query_map(params![tenant_id], Self::row_to_restore_log)?;

        let mut logs = Vec::new();
        for log in log_iter {
            logs.push(Self::finish_restore_log(log?)?);
        }
        Ok(logs)
    }

    fn latest_completed_restore(&mut self, tenant_id: &str) -> Result<Option<RestoreSummary>> {
        let mut stmt = self.connection.prepare(
            "SELECT completed_at, duration_secs FROM restore_logs
             WHERE tenant_id = ? AND status = 'completed'
             ORDER BY completed_at DESC LIMIT 1",
        )?;
        let mut rows = stmt.query(params![tenant_id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(RestoreSummary {
                completed_at: row.get(0)?,
                duration_secs: row.get(1)?,
            }))
        } else {
            Ok(None)
        }
    }

    // ========== 健康快照 ==========

    fn insert_health_snapshot(&mut self, snapshot: &HealthSnapshot) -> Result<i64> {
        self.connection.execute(
            "INSERT INTO health_snapshots (tenant_id, checked_at, status, score, metrics,
                issues, warnings, recommendations)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                snapshot.tenant_id,
                snapshot.checked_at,
                snapshot.status.as_str(),
                snapshot.score,
                snapshot.metrics,
                snapshot.issues,
                snapshot.warnings,
                snapshot.recommendations,
            ],
        )?;

        let id: i64 = self.connection.query_row(
            "SELECT currval('health_snapshot_id_seq')",
            [],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn list_health_snapshots(
        &mut self,
        tenant_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<HealthSnapshot>> {
        let mut sql = "SELECT id, tenant_id, checked_at, status, score, metrics, issues, \
                       warnings, recommendations
             FROM health_snapshots WHERE tenant_id = ? ORDER BY checked_at DESC"
            .to_string();
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut stmt = self.connection.prepare(&sql)?;
        let snapshot_iter = stmt.query_map(params![tenant_id], |row| {
            let status: String = row.get(3)?;
            Ok((
                HealthSnapshot {
                    id: row.get(0)?,
                    tenant_id: row.get(1)?,
                    checked_at: row.get(2)?,
                    status: HealthStatus::Healthy,
                    score: row.get(4)?,
                    metrics: row.get(5)?,
                    issues: row.get(6)?,
                    warnings: row.get(7)?,
                    recommendations: row.get(8)?,
                },
                status,
            ))
        })?;

        let mut snapshots = Vec::new();
        for snapshot in snapshot_iter {
            let (mut snapshot, status) = snapshot?;
            snapshot.status = HealthStatus::parse(&status)?;
            snapshots.push(snapshot);
        }
        Ok(snapshots)
    }

    // ========== 灾难恢复计划与调度 ==========

    fn upsert_dr_plan(&mut self, plan: &DrPlan) -> Result<()> {
        let updated = self.connection.execute(
            "UPDATE dr_plans SET name = ?, rpo_minutes = ?, rto_minutes = ?, retention_days = ?,
                active = ?
             WHERE id = ? AND tenant_id = ?",
            params![
                plan.name,
                plan.rpo_minutes,
                plan.rto_minutes,
                plan.retention_days,
                plan.active,
                plan.id,
                plan.tenant_id
            ],
        )?;

        if updated == 0 {
            self.connection.execute(
                "INSERT INTO dr_plans (id, tenant_id, name, rpo_minutes, rto_minutes,
                    retention_days, active)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    plan.id,
                    plan.tenant_id,
                    plan.name,
                    plan.rpo_minutes,
                    plan.rto_minutes,
                    plan.retention_days,
                    plan.active
                ],
            )?;
        }
        Ok(())
    }

    fn list_active_dr_plans(&mut self, tenant_id: &str) -> Result<Vec<DrPlan>> {
        let mut stmt = self.connection.prepare(
            "SELECT id, tenant_id, name, rpo_minutes, rto_minutes, retention_days, active
             FROM dr_plans WHERE tenant_id = ? AND active ORDER BY name",
        )?;

        let plan_iter = stmt.query_map(params![tenant_id], |row| {
            Ok(DrPlan {
                id: row.get(0)?,
                tenant_id: row.get(1)?,
                name: row.get(2)?,
                rpo_minutes: row.get(3)?,
                rto_minutes: row.get(4)?,
                retention_days: row.get(5)?,
                active: row.get(6)?,
            })
        })?;

        let mut plans = Vec::new();
        for plan in plan_iter {
            plans.push(plan?);
        }
        Ok(plans)
    }

    fn upsert_schedule(&mut self, schedule: &BackupSchedule) -> Result<()> {
        let updated = self.connection.execute(
            "UPDATE backup_schedules SET enabled = ?, cron = ?, next_run_at = ?
             WHERE tenant_id = ?",
            params![
                schedule.enabled,
                schedule.cron,
                schedule.next_run_at,
                schedule.tenant_id
            ],
        )?;

        if updated == 0 {
            self.connection.execute(
                "INSERT INTO backup_schedules (tenant_id, enabled, cron, next_run_at)
                 VALUES (?, ?, ?, ?)",
                params![
                    schedule.tenant_id,
                    schedule.enabled,
                    schedule.cron,
                    schedule.next_run_at
                ],
            )?;
        }
        Ok(())
    }

    fn get_schedule(&mut self, tenant_id: &str) -> Result<Option<BackupSchedule>> {
        let mut stmt = self.connection.prepare(
            "SELECT tenant_id, enabled, cron, next_run_at FROM backup_schedules
             WHERE tenant_id = ?",
        )?;
        let mut rows = stmt.query(params![tenant_id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(BackupSchedule {
                tenant_id: row.get(0)?,
                enabled: row.get(1)?,
                cron: row.get(2)?,
                next_run_at: row.get(3)?,
            }))
        } else {
            Ok(None)
        }
    }

    // ========== 租户 ==========

    fn upsert_tenant(&mut self, tenant: &Tenant) -> Result<()> {
        let updated = self.connection.execute(
            "UPDATE tenants SET name = ?, status = ? WHERE id = ?",
            params![tenant.name, tenant.status.as_str(), tenant.id],
        )?;

        if updated == 0 {
            self.connection.execute(
                "INSERT INTO tenants (id, name, status, created_at) VALUES (?, ?, ?, ?)",
                params![
                    tenant.id,
                    tenant.name,
                    tenant.status.as_str(),
                    tenant.created_at
                ],
            )?;
        }
        Ok(())
    }

    fn get_tenant(&mut self, tenant_id: &str) -> Result<Option<Tenant>> {
        let mut stmt = self
            .connection
            .prepare("SELECT id, name, status, created_at FROM tenants WHERE id = ?")?;
        let mut rows = stmt.query(params![tenant_id])?;

        if let Some(row) = rows.next()? {
            let status: String = row.get(2)?;
            Ok(Some(Tenant {
                id: row.get(0)?,
                name: row.get(1)?,
                status: TenantStatus::parse(&status)?,
                created_at: row.get(3)?,
            }))
        } else {
            Ok(None)
        }
    }

    fn list_active_tenants(&mut self) -> Result<Vec<Tenant>> {
        let mut stmt = self.connection.prepare(
            "SELECT id, name, status, created_at FROM tenants
             WHERE status = 'active' ORDER BY id",
        )?;

        let tenant_iter = stmt.query_map([], |row| {
            Ok((
                Tenant {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    status: TenantStatus::Active,
                    created_at: row.get(3)?,
                },
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut tenants = Vec::new();
        for tenant in tenant_iter {
            let (mut tenant, status) = tenant?;
            tenant.status = TenantStatus::parse(&status)?;
            tenants.push(tenant);
        }
        Ok(tenants)
    }

    // ========== 审计日志 ==========

    fn insert_audit(
        &mut self,
        tenant_id: &str,
        action: &str,
        detail: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Result<i64> {
        self.connection.execute(
            "INSERT INTO audit_log (tenant_id, action, detail, created_at) VALUES (?, ?, ?, ?)",
            params![tenant_id, action, detail, created_at],
        )?;

        let id: i64 = self
            .connection
            .query_row("SELECT currval('audit_log_id_seq')", [], |row| row.get(0))?;
        Ok(id)
    }

    fn recent_audit(&mut self, tenant_id: &str, limit: i64) -> Result<Vec<AuditRecord>> {
        let sql = format!(
            "SELECT id, tenant_id, action, detail, created_at FROM audit_log
             WHERE tenant_id = ? ORDER BY created_at DESC, id DESC LIMIT {limit}"
        );
        let mut stmt = self.connection.prepare(&sql)?;

        let record_iter = stmt.query_map(params![tenant_id], |row| {
            Ok(AuditRecord {
                id: row.get(0)?,
                tenant_id: row.get(1)?,
                action: row.get(2)?,
                detail: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;

        let mut records = Vec::new();
        for record in record_iter {
            records.push(record?);
        }
        Ok(records)
    }
}

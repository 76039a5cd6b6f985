use timevault_core::{
    api::VaultService, config::AppConfig, db::Database, error::Result,
};

use crate::cli::{
    BackupCommand, Commands, DataCommand, HealthCommand, PlanCommand, RestoreCommand, TenantCommand,
};
use crate::commands;

/// CLI 应用上下文：配置、数据库句柄与服务入口
#[derive(Clone)]
pub struct CliApp {
    pub config: AppConfig,
    pub database: Database,
    pub service: VaultService,
}

impl CliApp {
    /// 使用智能配置查找初始化CLI应用
    pub async fn new_with_auto_config() -> Result<Self> {
        let config = AppConfig::find_and_load_config()?;

        // 确保对象存储目录存在
        config.ensure_storage_dirs()?;

        // 初始化数据库
        let database = Database::connect(&config.storage.db_file).await?;

        let service = VaultService::new(database.clone(), &config)?;

        Ok(Self {
            config,
            database,
            service,
        })
    }

    /// 运行应用命令
    pub async fn run(&mut self, command: Commands) -> Result<()> {
        match command {
            Commands::Init { .. } => unreachable!(), // 已经在 main.rs 中处理
            Commands::Tenant(tenant_cmd) => self.run_tenant_command(tenant_cmd).await,
            Commands::Backup(backup_cmd) => self.run_backup_command(backup_cmd).await,
            Commands::Data(data_cmd) => self.run_data_command(data_cmd).await,
            Commands::Restore(restore_cmd) => self.run_restore_command(restore_cmd).await,
            Commands::Health(health_cmd) => self.run_health_command(health_cmd).await,
            Commands::Plan(plan_cmd) => self.run_plan_command(plan_cmd).await,
            Commands::Audit { tenant, limit } => commands::run_audit(self, &tenant, limit).await,
        }
    }

    async fn run_tenant_command(&self, command: TenantCommand) -> Result<()> {
        match command {
            TenantCommand::Register {
                tenant_id,
                name,
                suspended,
            } => commands::run_tenant_register(self, &tenant_id, &name, suspended).await,
            TenantCommand::List => commands::run_tenant_list(self).await,
        }
    }

    async fn run_backup_command(&self, command: BackupCommand) -> Result<()> {
        match command {
            BackupCommand::Create {
                tenant,
                backup_type,
                name,
                description,
                tables,
            } => commands::run_backup_create(self, &tenant, &backup_type, name, description, tables).await,
            BackupCommand::List { tenant, limit } => {
                commands::run_backup_list(self, &tenant, limit).await
            }
            BackupCommand::Show { tenant, job_id } => {
                commands::run_backup_show(self, &tenant, &job_id).await
            }
            BackupCommand::Verify { tenant, job_id } => {
                commands::run_backup_verify(self, &tenant, &job_id).await
            }
            BackupCommand::Delete { tenant, job_id } => {
                commands::run_backup_delete(self, &tenant, &job_id).await
            }
        }
    }

    async fn run_data_command(&self, command: DataCommand) -> Result<()> {
        match command {
            DataCommand::Put {
                tenant,
                table,
                id,
                json,
            } => commands::run_data_put(self, &tenant, &table, &id, &json).await,
            DataCommand::Delete { tenant, table, id } => {
                commands::run_data_delete(self, &tenant, &table, &id).await
            }
            DataCommand::Show { tenant, table, id } => {
                commands::run_data_show(self, &tenant, &table, &id).await
            }
        }
    }

    async fn run_restore_command(&self, command: RestoreCommand) -> Result<()> {
        match command {
            RestoreCommand::Preview {
                tenant,
                target,
                base_backup,
                tables,
            } => commands::run_restore_preview(self, &tenant, &target, base_backup, tables).await,
            RestoreCommand::Execute {
                tenant,
                target,
                base_backup,
                tables,
                confirm,
                initiated_by,
            } => {
                commands::run_restore_execute(
                    self,
                    &tenant,
                    &target,
                    base_backup,
                    tables,
                    confirm,
                    &initiated_by,
                )
                .await
            }
            RestoreCommand::List { tenant, limit } => {
                commands::run_restore_list(self, &tenant, limit).await
            }
            RestoreCommand::Show { tenant, restore_id } => {
                commands::run_restore_show(self, &tenant, &restore_id).await
            }
        }
    }

    async fn run_health_command(&self, command: HealthCommand) -> Result<()> {
        match command {
            HealthCommand::Check { tenant } => commands::run_health_check(self, &tenant).await,
            HealthCommand::Sweep => commands::run_health_sweep(self).await,
            HealthCommand::History { tenant, limit } => {
                commands::run_health_history(self, &tenant, limit).await
            }
        }
    }

    async fn run_plan_command(&self, command: PlanCommand) -> Result<()> {
        match command {
            PlanCommand::Set {
                tenant,
                id,
                name,
                rpo_minutes,
                rto_minutes,
                retention_days,
            } => {
                commands::run_plan_set(self, &tenant, &id, &name, rpo_minutes, rto_minutes, retention_days)
                    .await
            }
            PlanCommand::List { tenant } => commands::run_plan_list(self, &tenant).await,
            PlanCommand::Schedule {
                tenant,
                cron,
                enabled,
            } => commands::run_plan_schedule(self, &tenant, &cron, enabled).await,
        }
    }
}

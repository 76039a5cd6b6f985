mod audit;
mod backup;
mod data;
mod health;
mod plan;
mod restore;
mod tenant;

// Tenant commands
pub use tenant::{run_tenant_list, run_tenant_register};

// Backup commands
pub use backup::{
    run_backup_create, run_backup_delete, run_backup_list, run_backup_show, run_backup_verify,
};

// Data commands
pub use data::{run_data_delete, run_data_put, run_data_show};

// Restore commands
pub use restore::{run_restore_execute, run_restore_list, run_restore_preview, run_restore_show};

// Health commands
pub use health::{run_health_check, run_health_history, run_health_sweep};

// Plan commands
pub use plan::{run_plan_list, run_plan_schedule, run_plan_set};

// Audit commands
pub use audit::run_audit;

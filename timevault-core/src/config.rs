use crate::constants::{backup, config, health, rate_limit, storage};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use toml;

/// 应用配置结构
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub tables: TablesConfig,
    pub rate_limit: RateLimitConfig,
    pub health: HealthConfig,
}

/// 存储相关配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    pub db_file: String,
    pub object_root: String,
    pub capacity_ceiling_bytes: u64,
}

/// 默认备份表配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TablesConfig {
    pub default_tables: Vec<String>,
}

/// 速率限制配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub backup_create_max: u32,
    pub restore_execute_max: u32,
    pub backup_delete_max: u32,
}

/// 健康监控配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HealthConfig {
    pub check_interval_secs: u64,
    pub metrics_window_days: i64,
    pub weights: ScoreWeights,
}

/// 综合评分权重（可调策略，不是固定契约）
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct ScoreWeights {
    pub success_rate: f64,
    pub freshness: f64,
    pub compliance: f64,
    pub storage: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                db_file: storage::DEFAULT_DB_FILE.to_string(),
                object_root: storage::get_default_object_root()
                    .to_string_lossy()
                    .to_string(),
                capacity_ceiling_bytes: storage::CAPACITY_CEILING_BYTES,
            },
            tables: TablesConfig {
                default_tables: backup::DEFAULT_TABLES
                    .iter()
                    .map(|t| t.to_string())
                    .collect(),
            },
            rate_limit: RateLimitConfig {
                window_secs: rate_limit::WINDOW_SECS,
                backup_create_max: rate_limit::BACKUP_CREATE_MAX,
                restore_execute_max: rate_limit::RESTORE_EXECUTE_MAX,
                backup_delete_max: rate_limit::BACKUP_DELETE_MAX,
            },
            health: HealthConfig {
                check_interval_secs: health::CHECK_INTERVAL_SECS,
                metrics_window_days: health::METRICS_WINDOW_DAYS,
                weights: ScoreWeights {
                    success_rate: health::weights::SUCCESS_RATE,
                    freshness: health::weights::FRESHNESS,
                    compliance: health::weights::COMPLIANCE,
                    storage: health::weights::STORAGE,
                },
            },
        }
    }
}

impl AppConfig {
    /// 智能查找并加载配置文件
    /// 按优先级查找：config.toml -> timevault.toml -> .timevault.toml
    pub fn find_and_load_config() -> Result<Self> {
        for config_file in config::CONFIG_FILE_CANDIDATES {
            if Path::new(config_file).exists() {
                tracing::info!("找到配置文件: {}", config_file);
                return Self::load_from_file(config_file);
            }
        }

        // 如果没找到配置文件，创建默认配置
        tracing::warn!(
            "未找到配置文件，创建默认配置: {}",
            config::DEFAULT_CONFIG_FILE
        );
        let default_config = Self::default();
        default_config.save_to_file(config::DEFAULT_CONFIG_FILE)?;
        Ok(default_config)
    }

    /// 从指定文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let config: AppConfig = toml::from_str(&content)?;

        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = self.to_toml_with_comments();
        fs::write(&path, content)?;
        Ok(())
    }

    /// 生成带注释的TOML配置
    fn to_toml_with_comments(&self) -> String {
        const TEMPLATE: &str = include_str!("../templates/config.toml.template");

        let default_tables = self
            .tables
            .default_tables
            .iter()
            .map(|t| format!("\"{t}\""))
            .collect::<Vec<_>>()
            .join(", ");

        TEMPLATE
            .replace("{db_file}", &self.storage.db_file)
            .replace("{object_root}", &self.storage.object_root)
            .replace(
                "{capacity_ceiling_bytes}",
                &self.storage.capacity_ceiling_bytes.to_string(),
            )
            .replace("{default_tables}", &default_tables)
            .replace("{window_secs}", &self.rate_limit.window_secs.to_string())
            .replace(
                "{backup_create_max}",
                &self.rate_limit.backup_create_max.to_string(),
            )
            .replace(
                "{restore_execute_max}",
                &self.rate_limit.restore_execute_max.to_string(),
            )
            .replace(
                "{backup_delete_max}",
                &self.rate_limit.backup_delete_max.to_string(),
            )
            .replace(
                "{check_interval_secs}",
                &self.health.check_interval_secs.to_string(),
            )
            .replace(
                "{metrics_window_days}",
                &self.health.metrics_window_days.to_string(),
            )
            .replace(
                "{w_success_rate}",
                &self.health.weights.success_rate.to_string(),
            )
            .replace("{w_freshness}", &self.health.weights.freshness.to_string())
            .replace(
                "{w_compliance}",
                &self.health.weights.compliance.to_string(),
            )
            .replace("{w_storage}", &self.health.weights.storage.to_string())
    }

    /// 获取对象存储根目录路径
    pub fn get_object_root(&self) -> PathBuf {
        PathBuf::from(&self.storage.object_root)
    }

    /// 确保对象存储根目录存在
    pub fn ensure_storage_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.storage.object_root)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_round_trip() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");

        let config = AppConfig::default();
        config.save_to_file(&path).unwrap();

        let loaded = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.tables.default_tables, config.tables.default_tables);
        assert_eq!(loaded.rate_limit.window_secs, config.rate_limit.window_secs);
        assert_eq!(
            loaded.storage.capacity_ceiling_bytes,
            config.storage.capacity_ceiling_bytes
        );
    }
}

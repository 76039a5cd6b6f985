use chrono::{DateTime, Utc};
use timevault_core::{Result, VaultError};

/// 设置日志记录
///
/// 默认输出到终端，设置 `TIMEVAULT_LOG_FILE` 环境变量后输出到文件；
/// 级别由 `-v` 参数和 `RUST_LOG` 环境变量控制
pub fn setup_logging(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt};

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if let Ok(log_file) = std::env::var("TIMEVAULT_LOG_FILE") {
        // 输出到文件 - 使用详细格式便于调试
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .expect("Failed to create log file");

        fmt()
            .with_env_filter(env_filter)
            .with_writer(file)
            .with_target(true)
            .with_thread_names(true)
            .with_line_number(true)
            .init();
    } else {
        // 输出到终端 - 使用简洁格式，用户友好
        fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_names(false)
            .with_line_number(false)
            .without_time()
            .compact()
            .init();
    }
}

/// 解析命令行传入的时间点参数（RFC3339 格式）
pub fn parse_timestamp(input: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(input)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            VaultError::validation(format!(
                "无法解析时间点 '{input}': {e}，请使用 RFC3339 格式，例如 2026-08-29T12:00:00Z"
            ))
        })
}

/// 空的可选表列表归一化：CLI 未传表时表示使用默认表集合
pub fn normalize_tables(tables: Vec<String>) -> Option<Vec<String>> {
    if tables.is_empty() { None } else { Some(tables) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp() {
        let parsed = parse_timestamp("2026-08-29T12:00:00Z").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2026-08-29T12:00:00+00:00");

        assert!(parse_timestamp("昨天中午").is_err());
    }

    #[test]
    fn test_normalize_tables() {
        assert!(normalize_tables(vec![]).is_none());
        assert_eq!(
            normalize_tables(vec!["orders".to_string()]),
            Some(vec!["orders".to_string()])
        );
    }
}

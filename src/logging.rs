/*!
 * Logging and tracing initialization
 */

use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::FsConfig;
use crate::error::{FsError, FsResult};

/// Where and how verbosely to log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Level applied to this crate when `RUST_LOG` is unset
    pub level: Level,

    /// Write JSON lines to this file instead of stdout
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Build from a level name such as `debug`
    pub fn from_level_name(name: &str) -> FsResult<Self> {
        let level = Level::from_str(name)
            .map_err(|_| FsError::Config(format!("Unknown log level: {}", name)))?;
        Ok(Self { level, file: None })
    }

    /// Raise the level to debug
    pub fn verbose(mut self) -> Self {
        self.level = Level::DEBUG;
        self
    }
}

impl TryFrom<&FsConfig> for LoggingConfig {
    type Error = FsError;

    fn try_from(config: &FsConfig) -> FsResult<Self> {
        let mut logging = Self::from_level_name(&config.log_level)?;
        logging.file = config.log_file.clone();
        Ok(logging)
    }
}

fn env_filter(level: Level) -> FsResult<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("bucketfs={}", level)))
        .map_err(|e| FsError::Config(format!("Failed to create log filter: {}", e)))
}

/// Initialize structured logging
pub fn init_logging(config: &LoggingConfig) -> FsResult<()> {
    let env_filter = env_filter(config.level)?;

    if let Some(ref log_path) = config.file {
        init_file_logging(log_path, env_filter)
    } else {
        init_stdout_logging(env_filter)
    }
}

/// Initialize logging to stdout
fn init_stdout_logging(env_filter: EnvFilter) -> FsResult<()> {
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(FmtSpan::NONE)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| FsError::Config(format!("Logging already initialized: {}", e)))
}

/// Initialize logging to a file
fn init_file_logging(log_path: &Path, env_filter: EnvFilter) -> FsResult<()> {
    let file = File::create(log_path)
        .map_err(|e| FsError::Config(format!("Failed to create log file: {}", e)))?;

    let fmt_layer = fmt::layer()
        .with_writer(file)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(false)
        .json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| FsError::Config(format!("Logging already initialized: {}", e)))
}

/// Route logs to the test harness output, once per process
pub fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bucketfs=debug"));

        let fmt_layer = fmt::layer().with_test_writer().with_target(false).compact();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .ok();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_names() {
        assert_eq!(LoggingConfig::from_level_name("debug").unwrap().level, Level::DEBUG);
        assert_eq!(LoggingConfig::from_level_name("WARN").unwrap().level, Level::WARN);
        assert!(LoggingConfig::from_level_name("chatty").is_err());
    }

    #[test]
    fn test_from_fs_config() {
        let mut config = FsConfig::new("bucket");
        config.log_level = "trace".to_string();
        config.log_file = Some(PathBuf::from("/tmp/bucketfs.log"));

        let logging = LoggingConfig::try_from(&config).unwrap();
        assert_eq!(logging.level, Level::TRACE);
        assert_eq!(logging.file, Some(PathBuf::from("/tmp/bucketfs.log")));
    }

    #[test]
    fn test_verbose_overrides_level() {
        let logging = LoggingConfig::from_level_name("error").unwrap().verbose();
        assert_eq!(logging.level, Level::DEBUG);
    }

    #[test]
    fn test_init_test_logging_is_repeatable() {
        init_test_logging();
        init_test_logging();
        tracing::debug!("logging initialized");
    }
}

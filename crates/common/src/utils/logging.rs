use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::EnvFilter;

/// HTTP client internals are chatty at debug level
const QUIET_DEPENDENCIES: &str = "hyper=warn,reqwest=warn,h2=warn";

/// Where and how services write their logs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Base level or filter directives, e.g. `info` or `info,kol_faucet=debug`
    pub level: String,

    /// `pretty`, `compact` or `json`
    pub format: String,

    pub console: bool,

    /// Directory for daily-rotated log files; no file output when unset
    pub log_dir: Option<PathBuf>,

    pub log_file: String,

    /// Print the emitting module with each event
    pub show_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            console: true,
            log_dir: None,
            log_file: "faucet.log".to_string(),
            show_target: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl From<&str> for LogFormat {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

/// Install the global subscriber.
///
/// Hold the returned guard until shutdown when file output is enabled; the
/// file writer flushes on drop.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = filter_directives(&config.level, std::env::var("RUST_LOG").ok().as_deref());
    let env_filter = EnvFilter::try_new(&filter)
        .map_err(|e| anyhow::anyhow!("invalid log filter {:?}: {}", filter, e))?;

    let mut guard = None;
    let writer = match (&config.log_dir, config.console) {
        (Some(dir), console) => {
            std::fs::create_dir_all(dir)?;
            let (file, file_guard) = tracing_appender::non_blocking(
                tracing_appender::rolling::daily(dir, &config.log_file),
            );
            guard = Some(file_guard);
            if console {
                BoxMakeWriter::new(std::io::stdout.and(file))
            } else {
                BoxMakeWriter::new(file)
            }
        }
        (None, true) => BoxMakeWriter::new(std::io::stdout),
        (None, false) => BoxMakeWriter::new(std::io::sink),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.show_target)
        .with_writer(writer);

    let installed = match LogFormat::from(config.format.as_str()) {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("logging already initialized: {}", e))?;

    tracing::debug!("Log filter: {}", filter);
    Ok(guard)
}

/// Configured level, then dependency quieting, then `RUST_LOG` so that it
/// wins on conflicting directives
fn filter_directives(level: &str, rust_log: Option<&str>) -> String {
    let mut directives = vec![level.trim(), QUIET_DEPENDENCIES];
    if let Some(extra) = rust_log.map(str::trim).filter(|s| !s.is_empty()) {
        directives.push(extra);
    }
    directives.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_names() {
        assert_eq!(LogFormat::from("json"), LogFormat::Json);
        assert_eq!(LogFormat::from(" Compact "), LogFormat::Compact);
        assert_eq!(LogFormat::from("anything"), LogFormat::Pretty);
    }

    #[test]
    fn test_rust_log_appended_last() {
        assert_eq!(
            filter_directives("info", Some("kol_faucet=trace")),
            "info,hyper=warn,reqwest=warn,h2=warn,kol_faucet=trace"
        );
        assert_eq!(
            filter_directives("debug", Some("  ")),
            "debug,hyper=warn,reqwest=warn,h2=warn"
        );
    }

    #[test]
    fn test_directives_parse() {
        let filter = filter_directives("warn,kol_faucet=debug", None);
        assert!(EnvFilter::try_new(filter).is_ok());
    }

    #[test]
    fn test_partial_config_deserializes() {
        let config: LoggingConfig = serde_json::from_str(r#"{"format": "json"}"#).unwrap();
        assert_eq!(config.format, "json");
        assert_eq!(config.level, "info");
        assert!(config.log_dir.is_none());
        assert!(config.console);
    }
}

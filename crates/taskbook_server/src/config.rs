//! Command-line and environment configuration.
//!
//! # Invariants
//! - Every flag has an environment fallback with the `TASKBOOK_` prefix.
//! - A `ServerConfig` is only built from validated arguments.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use taskbook_core::{default_log_level, LoggingOptions};

#[derive(Debug, Parser)]
#[command(name = "taskbook_server")]
#[command(about = "Graduation task document approval service", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Socket address to listen on
    #[arg(long, env = "TASKBOOK_BIND", default_value = "127.0.0.1:8080")]
    pub bind: String,

    /// SQLite database file
    #[arg(long, env = "TASKBOOK_DB_PATH", default_value = "taskbook.sqlite3")]
    pub db_path: PathBuf,

    /// Directory for uploaded task documents
    #[arg(long, env = "TASKBOOK_UPLOAD_DIR", default_value = "uploads/task")]
    pub upload_dir: PathBuf,

    /// trace|debug|info|warn|error (defaults to debug in debug builds, info otherwise)
    #[arg(long, env = "TASKBOOK_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Directory for rolling log files; logs go to stderr when omitted
    #[arg(long, env = "TASKBOOK_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Insert demo users and a project into an empty database
    #[arg(long, env = "TASKBOOK_SEED_DEMO")]
    pub seed_demo: bool,
}

/// Validated server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub db_path: PathBuf,
    pub upload_dir: PathBuf,
    pub logging: LoggingOptions,
    pub seed_demo: bool,
}

impl Cli {
    /// Validates arguments and resolves defaults.
    ///
    /// # Errors
    /// - Returns an error when `bind` is not a socket address.
    /// - Returns an error when a relative `log_dir` cannot be made absolute.
    pub fn into_config(self) -> Result<ServerConfig, String> {
        let bind = self
            .bind
            .trim()
            .parse::<SocketAddr>()
            .map_err(|err| format!("invalid bind address `{}`: {err}", self.bind))?;

        let log_dir = match self.log_dir {
            Some(dir) if dir.is_absolute() => Some(dir),
            Some(dir) => Some(
                std::env::current_dir()
                    .map_err(|err| format!("cannot resolve log directory: {err}"))?
                    .join(dir),
            ),
            None => None,
        };

        Ok(ServerConfig {
            bind,
            db_path: self.db_path,
            upload_dir: self.upload_dir,
            logging: LoggingOptions {
                level: self
                    .log_level
                    .unwrap_or_else(|| default_log_level().to_string()),
                log_dir: log_dir.map(|dir| dir.display().to_string()),
                duplicate_to_stderr: true,
            },
            seed_demo: self.seed_demo,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::Cli;
    use clap::Parser;

    #[test]
    fn defaults_resolve_to_local_sqlite_and_stderr_logging() {
        let config = Cli::try_parse_from(["taskbook_server"])
            .unwrap()
            .into_config()
            .unwrap();

        assert_eq!(config.bind.to_string(), "127.0.0.1:8080");
        assert_eq!(config.db_path.to_str(), Some("taskbook.sqlite3"));
        assert_eq!(config.upload_dir.to_str(), Some("uploads/task"));
        assert!(config.logging.log_dir.is_none());
        assert!(!config.seed_demo);
    }

    #[test]
    fn relative_log_dir_becomes_absolute() {
        let config = Cli::try_parse_from(["taskbook_server", "--log-dir", "logs", "--seed-demo"])
            .unwrap()
            .into_config()
            .unwrap();

        let log_dir = config.logging.log_dir.unwrap();
        assert!(std::path::Path::new(&log_dir).is_absolute());
        assert!(log_dir.ends_with("logs"));
        assert!(config.seed_demo);
    }

    #[test]
    fn rejects_malformed_bind_address() {
        let err = Cli::try_parse_from(["taskbook_server", "--bind", "localhost"])
            .unwrap()
            .into_config()
            .unwrap_err();
        assert!(err.contains("invalid bind address"));
    }
}

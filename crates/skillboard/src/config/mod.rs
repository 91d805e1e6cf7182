use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::leaderboard::{ScoringConfig, ScoringConfigError};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub leaderboard: LeaderboardConfig,
    pub scoring: ScoringConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let refresh_secs = seconds_var("APP_LEADERBOARD_REFRESH_SECS", 300)?;
        let timeout_secs = seconds_var("APP_REBUILD_TIMEOUT_SECS", 30)?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidDuration {
                var: "APP_REBUILD_TIMEOUT_SECS",
            });
        }

        let scoring = match env::var_os("APP_SCORING_CONFIG") {
            Some(path) => ScoringConfig::from_path(PathBuf::from(path))?,
            None => ScoringConfig::standard(),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            leaderboard: LeaderboardConfig {
                refresh_interval: (refresh_secs > 0).then(|| Duration::from_secs(refresh_secs)),
                rebuild_timeout: Duration::from_secs(timeout_secs),
                snapshot_path: env::var_os("APP_SNAPSHOT_PATH").map(PathBuf::from),
                cache_path: env::var_os("APP_CACHE_PATH").map(PathBuf::from),
            },
            scoring,
        })
    }
}

fn seconds_var(var: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidDuration { var }),
        Err(_) => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Cache refresh cadence and collaborator locations.
#[derive(Debug, Clone)]
pub struct LeaderboardConfig {
    /// `None` disables the periodic refresh task.
    pub refresh_interval: Option<Duration>,
    pub rebuild_timeout: Duration,
    pub snapshot_path: Option<PathBuf>,
    pub cache_path: Option<PathBuf>,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidDuration { var: &'static str },
    Scoring(ScoringConfigError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidDuration { var } => {
                write!(f, "{var} must be a positive number of seconds")
            }
            ConfigError::Scoring(err) => write!(f, "APP_SCORING_CONFIG rejected: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidDuration { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::Scoring(err) => Some(err),
        }
    }
}

impl From<ScoringConfigError> for ConfigError {
    fn from(value: ScoringConfigError) -> Self {
        Self::Scoring(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for var in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "APP_LEADERBOARD_REFRESH_SECS",
            "APP_REBUILD_TIMEOUT_SECS",
            "APP_SCORING_CONFIG",
            "APP_SNAPSHOT_PATH",
            "APP_CACHE_PATH",
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(
            config.leaderboard.refresh_interval,
            Some(Duration::from_secs(300))
        );
        assert_eq!(config.leaderboard.rebuild_timeout, Duration::from_secs(30));
        assert_eq!(config.scoring, ScoringConfig::standard());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn zero_refresh_disables_periodic_rebuilds() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_LEADERBOARD_REFRESH_SECS", "0");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.leaderboard.refresh_interval, None);
        reset_env();
    }

    #[test]
    fn rejects_zero_rebuild_timeout() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_REBUILD_TIMEOUT_SECS", "0");
        match AppConfig::load() {
            Err(ConfigError::InvalidDuration { var }) => {
                assert_eq!(var, "APP_REBUILD_TIMEOUT_SECS")
            }
            other => panic!("expected invalid duration, got {other:?}"),
        }
        reset_env();
    }

    #[test]
    fn missing_scoring_file_is_reported() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_SCORING_CONFIG", "/nonexistent/skillboard-scoring.json");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::Scoring(ScoringConfigError::Io(_)))
        ));
        reset_env();
    }
}

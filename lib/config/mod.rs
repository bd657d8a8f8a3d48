use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_HN_API_URL: &str = "https://hacker-news.firebaseio.com/v0";
/// Every 15 minutes. The scheduler expects a seconds field first.
const DEFAULT_CRON_SCHEDULE: &str = "0 */15 * * * *";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub hn_api_url: String,
    /// Only required by modes that talk to Postgres.
    pub db_url: Option<String>,
    /// Only required by the publish and relay modes.
    pub redis_url: Option<String>,
    pub queue_name: String,
    pub cron_schedule: String,
    /// Default: 5
    pub n_workers: usize,
    pub cache_ttl: Duration,
    pub api_addr: SocketAddr,
    pub rpc_addr: SocketAddr,
    pub rpc_url: String,
    /// Health and metrics listener for the worker modes.
    pub metrics_addr: SocketAddr,
    pub http_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let n_workers = parse_var("N_WORKERS", 5usize)?;
        if n_workers == 0 {
            return Err(ConfigError::InvalidValue {
                name: "N_WORKERS".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(Self {
            hn_api_url: env::var("HN_API_URL").unwrap_or_else(|_| DEFAULT_HN_API_URL.to_string()),
            db_url: env::var("DATABASE_URL").ok(),
            redis_url: env::var("REDIS_URL").ok(),
            queue_name: env::var("QUEUE_NAME").unwrap_or_else(|_| "items".to_string()),
            cron_schedule: env::var("CRON_SCHEDULE")
                .unwrap_or_else(|_| DEFAULT_CRON_SCHEDULE.to_string()),
            n_workers,
            cache_ttl: Duration::from_secs(parse_var("CACHE_TTL_SECS", 300u64)?),
            api_addr: parse_var("API_ADDRESS", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            rpc_addr: parse_var("RPC_ADDRESS", SocketAddr::from(([0, 0, 0, 0], 9090)))?,
            rpc_url: env::var("RPC_URL").unwrap_or_else(|_| "http://127.0.0.1:9090".to_string()),
            metrics_addr: parse_var("METRICS_ADDRESS", SocketAddr::from(([0, 0, 0, 0], 3000)))?,
            http_timeout: Duration::from_secs(parse_var("HTTP_TIMEOUT_SECS", 10u64)?),
        })
    }

    pub fn require_db_url(&self) -> Result<&str, ConfigError> {
        self.db_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))
    }

    pub fn require_redis_url(&self) -> Result<&str, ConfigError> {
        self.redis_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("REDIS_URL".to_string()))
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => parse_value(name, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T: FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            value: raw.to_string(),
        })
}

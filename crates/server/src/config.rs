//! Server configuration from environment variables.
//!
//! | Variable | Default |
//! |---|---|
//! | `HOST` | `0.0.0.0` |
//! | `PORT` | `8000` |
//! | `API_SECRET` | unset (auth disabled) |
//! | `DB_PATH` | `data/scrape-hub.db` |
//! | `CORS_ORIGINS` | unset (any origin) |
//! | `JOB_RETENTION_SECS` | `600` |
//! | `JOB_MAX_RUNTIME_SECS` | unset (no watchdog) |
//! | `SEIA_PAGE_DELAY_MS` | `1000` |
//! | `SEIA_MAX_PAGES` | `10` |

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use scrape_hub_core::SeiaConfig;
use scrape_hub_server_jobs::RegistryConfig;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_DB_PATH: &str = "data/scrape-hub.db";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid value for {name}: {value:?}")]
pub struct ConfigError {
    pub name: &'static str,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Shared secret expected in `X-API-Key`. `None` disables auth.
    pub api_secret: Option<String>,
    pub db_path: PathBuf,
    /// Allowed CORS origins. Empty allows any origin.
    pub cors_origins: Vec<String>,
    pub job_retention: Duration,
    pub job_max_runtime: Option<Duration>,
    /// Time a job past `job_max_runtime` gets to close its run before it
    /// is aborted.
    pub job_abort_grace: Duration,
    pub seia_page_delay: Duration,
    pub seia_max_pages: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            api_secret: None,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            cors_origins: Vec::new(),
            job_retention: RegistryConfig::default().retention,
            job_max_runtime: None,
            job_abort_grace: RegistryConfig::default().abort_grace,
            seia_page_delay: SeiaConfig::default().page_delay,
            seia_max_pages: SeiaConfig::default().max_pages,
        }
    }
}

impl ServerConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        Ok(Self {
            host: parse_or(get("HOST"), "HOST", defaults.host)?,
            port: parse_or(get("PORT"), "PORT", defaults.port)?,
            api_secret: get("API_SECRET"),
            db_path: get("DB_PATH").map(PathBuf::from).unwrap_or(defaults.db_path),
            cors_origins: get("CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            job_retention: get("JOB_RETENTION_SECS")
                .map(|v| parse::<u64>(&v, "JOB_RETENTION_SECS").map(Duration::from_secs))
                .transpose()?
                .unwrap_or(defaults.job_retention),
            job_max_runtime: get("JOB_MAX_RUNTIME_SECS")
                .map(|v| parse::<u64>(&v, "JOB_MAX_RUNTIME_SECS"))
                .transpose()?
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            job_abort_grace: get("JOB_ABORT_GRACE_SECS")
                .map(|v| parse::<u64>(&v, "JOB_ABORT_GRACE_SECS").map(Duration::from_secs))
                .transpose()?
                .unwrap_or(defaults.job_abort_grace),
            seia_page_delay: get("SEIA_PAGE_DELAY_MS")
                .map(|v| parse::<u64>(&v, "SEIA_PAGE_DELAY_MS").map(Duration::from_millis))
                .transpose()?
                .unwrap_or(defaults.seia_page_delay),
            seia_max_pages: parse_or(get("SEIA_MAX_PAGES"), "SEIA_MAX_PAGES", defaults.seia_max_pages)?,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            retention: self.job_retention,
            max_runtime: self.job_max_runtime,
            abort_grace: self.job_abort_grace,
            ..Default::default()
        }
    }

    pub fn seia_config(&self) -> SeiaConfig {
        SeiaConfig {
            max_pages: self.seia_max_pages,
            page_delay: self.seia_page_delay,
            ..Default::default()
        }
    }
}

fn parse<T: FromStr>(value: &str, name: &'static str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError {
        name,
        value: value.to_string(),
    })
}

fn parse_or<T: FromStr>(value: Option<String>, name: &'static str, default: T) -> Result<T, ConfigError> {
    match value {
        Some(v) => parse(&v, name),
        None => Ok(default),
    }
}

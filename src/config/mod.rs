use anyhow::{bail, Context};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Upper bound for any configured short code length
pub const MAX_CODE_LENGTH: usize = 64;

pub const BASE62_ALPHABET: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub short_code: ShortCodeConfig,
    pub resolve: ResolveConfig,
    pub cache: CacheConfig,
    pub recorder: RecorderConfig,
    pub analytics: AnalyticsConfig,
    pub pagination: PaginationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortCodeConfig {
    /// Symbols a short code is drawn from
    pub alphabet: String,
    /// Length of newly drawn codes
    pub length: usize,
    /// Upper bound the generator may grow to under code-space pressure
    pub max_length: usize,
    /// Insert-if-absent attempts per allocation
    pub max_attempts: u32,
}

impl Default for ShortCodeConfig {
    fn default() -> Self {
        Self {
            alphabet: BASE62_ALPHABET.to_string(),
            length: 7,
            max_length: 12,
            max_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveConfig {
    pub timeout_ms: u64,
    pub redirect_status: RedirectStatus,
}

impl ResolveConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 250,
            redirect_status: RedirectStatus::default(),
        }
    }
}

/// Status code used for the bare `/{code}` redirect
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedirectStatus {
    #[default]
    Found,
    MovedPermanently,
}

impl FromStr for RedirectStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "302" | "found" | "temporary" => Ok(Self::Found),
            "301" | "moved" | "permanent" => Ok(Self::MovedPermanently),
            other => bail!("unsupported REDIRECT_STATUS '{other}', expected 301 or 302"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_entries: u64,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Capacity of the click queue between the redirect path and the recorder
    pub queue_size: usize,
    pub batch_size: usize,
    pub flush_interval_ms: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            queue_size: 100_000,
            batch_size: 256,
            flush_interval_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    pub ip_mode: IpMode,
    pub trusted_proxy_mode: TrustedProxyMode,
    /// CIDR ranges of proxies whose forwarding headers are believed
    #[serde(default)]
    pub trusted_proxies: Vec<IpNet>,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            ip_mode: IpMode::Full,
            trusted_proxy_mode: TrustedProxyMode::None,
            trusted_proxies: Vec::new(),
        }
    }
}

/// How much of the client address is kept on a click event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpMode {
    Full,
    Anonymize,
    Omit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustedProxyMode {
    /// Use the socket peer address only
    None,
    /// Forwarded / X-Forwarded-For, validated against `trusted_proxies`
    Standard,
    /// CF-Connecting-IP
    Cloudflare,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// If None, a random key is generated and cursors do not survive restarts
    pub cursor_hmac_secret: Option<String>,
}

fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("invalid value for {key}: '{raw}'")),
        Err(_) => Ok(default),
    }
}

/// In-memory SQLite with every other setting at its default
impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                backend: DatabaseBackend::Sqlite,
                url: "sqlite::memory:".to_string(),
                max_connections: 5,
            },
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 4000,
            },
            short_code: ShortCodeConfig::default(),
            resolve: ResolveConfig::default(),
            cache: CacheConfig::default(),
            recorder: RecorderConfig::default(),
            analytics: AnalyticsConfig::default(),
            pagination: PaginationConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend_str =
            std::env::var("DATABASE_BACKEND").unwrap_or_else(|_| "sqlite".to_string());

        let backend = match backend_str.to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            "memory" => DatabaseBackend::Memory,
            "sqlite" => DatabaseBackend::Sqlite,
            other => {
                tracing::warn!(
                    "Unknown DATABASE_BACKEND '{other}', falling back to 'sqlite'. Supported values: sqlite, postgres, memory"
                );
                DatabaseBackend::Sqlite
            }
        };

        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://./relink.db".to_string());
        let max_connections = env_or("DATABASE_MAX_CONNECTIONS", 10u32)?;

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env_or("PORT", 4000u16)?;

        let defaults = ShortCodeConfig::default();
        let short_code = ShortCodeConfig {
            alphabet: std::env::var("SHORT_CODE_ALPHABET").unwrap_or(defaults.alphabet),
            length: env_or("SHORT_CODE_LENGTH", defaults.length)?,
            max_length: env_or("SHORT_CODE_MAX_LENGTH", defaults.max_length)?,
            max_attempts: env_or("SHORT_CODE_MAX_ATTEMPTS", defaults.max_attempts)?,
        };

        let resolve = ResolveConfig {
            timeout_ms: env_or("RESOLVE_TIMEOUT_MS", ResolveConfig::default().timeout_ms)?,
            redirect_status: env_or("REDIRECT_STATUS", RedirectStatus::default())?,
        };

        let cache_defaults = CacheConfig::default();
        let cache = CacheConfig {
            max_entries: env_or("CACHE_MAX_ENTRIES", cache_defaults.max_entries)?,
            ttl_secs: env_or("CACHE_TTL_SECS", cache_defaults.ttl_secs)?,
        };

        let recorder_defaults = RecorderConfig::default();
        let recorder = RecorderConfig {
            queue_size: env_or("RECORDER_QUEUE_SIZE", recorder_defaults.queue_size)?,
            batch_size: env_or("RECORDER_BATCH_SIZE", recorder_defaults.batch_size)?,
            flush_interval_ms: env_or(
                "RECORDER_FLUSH_INTERVAL_MS",
                recorder_defaults.flush_interval_ms,
            )?,
        };

        let ip_mode = match std::env::var("ANALYTICS_IP_MODE")
            .unwrap_or_else(|_| "full".to_string())
            .to_lowercase()
            .as_str()
        {
            "full" => IpMode::Full,
            "anonymize" | "anonymise" => IpMode::Anonymize,
            "omit" | "none" => IpMode::Omit,
            other => bail!("invalid ANALYTICS_IP_MODE '{other}', expected full, anonymize or omit"),
        };

        let trusted_proxy_mode = match std::env::var("TRUSTED_PROXY_MODE")
            .unwrap_or_else(|_| "none".to_string())
            .to_lowercase()
            .as_str()
        {
            "none" => TrustedProxyMode::None,
            "standard" => TrustedProxyMode::Standard,
            "cloudflare" => TrustedProxyMode::Cloudflare,
            other => {
                tracing::warn!(
                    "Unknown TRUSTED_PROXY_MODE '{other}', falling back to 'none'. Supported values: none, standard, cloudflare"
                );
                TrustedProxyMode::None
            }
        };

        let trusted_proxies = std::env::var("TRUSTED_PROXIES")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<IpNet>()
                    .with_context(|| format!("invalid CIDR in TRUSTED_PROXIES: '{s}'"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let config = Config {
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections,
            },
            server: ServerConfig { host, port },
            short_code,
            resolve,
            cache,
            recorder,
            analytics: AnalyticsConfig {
                ip_mode,
                trusted_proxy_mode,
                trusted_proxies,
            },
            pagination: PaginationConfig {
                cursor_hmac_secret: std::env::var("CURSOR_HMAC_SECRET").ok(),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let sc = &self.short_code;
        if sc.length < 4 {
            bail!("SHORT_CODE_LENGTH must be at least 4");
        }
        if sc.max_length < sc.length {
            bail!("SHORT_CODE_MAX_LENGTH must not be smaller than SHORT_CODE_LENGTH");
        }
        if sc.max_length > MAX_CODE_LENGTH {
            bail!("SHORT_CODE_MAX_LENGTH must be at most {MAX_CODE_LENGTH}");
        }
        if sc.max_attempts == 0 {
            bail!("SHORT_CODE_MAX_ATTEMPTS must be at least 1");
        }
        if self.resolve.timeout_ms == 0 {
            bail!("RESOLVE_TIMEOUT_MS must be positive");
        }
        if self.recorder.queue_size == 0 || self.recorder.batch_size == 0 {
            bail!("RECORDER_QUEUE_SIZE and RECORDER_BATCH_SIZE must be positive");
        }
        Ok(())
    }
}

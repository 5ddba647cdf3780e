//! Configuration loading for the device bridge.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `BRIDGE_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::connectors::{HttpDeviceCloudConfig, OdooConfig};
use crate::mapping::erp::LocationDefaults;
use crate::retry::RetryPolicy;

const ENV_PREFIX: &str = "BRIDGE_";
const REDACTED: &str = "[REDACTED]";

/// Application configuration derived from `BRIDGE_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operator_tokens: Vec<String>,
    #[serde(default)]
    pub vendor: VendorConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub erp: ErpConfig,
}

/// Which vendor implementation backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VendorMode {
    #[default]
    Http,
    InMemory,
}

impl FromStr for VendorMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(VendorMode::Http),
            "in_memory" | "memory" => Ok(VendorMode::InMemory),
            _ => Err(ConfigError::InvalidVendorMode {
                value: value.to_string(),
            }),
        }
    }
}

/// IoT vendor API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct VendorConfig {
    #[serde(default)]
    pub mode: VendorMode,
    /// Environment variable: `BRIDGE_VENDOR_API_BASE`
    #[serde(default = "default_vendor_api_base")]
    pub api_base: String,
    /// Bearer token obtained out of band.
    ///
    /// Environment variable: `BRIDGE_VENDOR_TOKEN`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Per-page timeout of the full discovery scan
    #[serde(default = "default_vendor_discovery_timeout_ms")]
    pub discovery_timeout_ms: u64,
    /// Timeout of targeted cluster reads and writes
    #[serde(default = "default_vendor_cluster_timeout_ms")]
    pub cluster_timeout_ms: u64,
    #[serde(default = "default_vendor_page_size")]
    pub page_size: u32,
    #[serde(default = "default_vendor_max_pages")]
    pub max_pages: u32,
}

/// Cache lifetimes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct CacheConfig {
    /// Environment variable: `BRIDGE_CACHE_TOPOLOGY_TTL_SECONDS`
    #[serde(default = "default_cache_topology_ttl_seconds")]
    pub topology_ttl_seconds: u64,
    /// Environment variable: `BRIDGE_CACHE_DEVICE_TTL_SECONDS`
    #[serde(default = "default_cache_device_ttl_seconds")]
    pub device_ttl_seconds: u64,
}

/// Retry policy for vendor calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RetryConfig {
    /// Total attempts per vendor read, including the first (1-5)
    #[serde(default = "default_retry_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Random extra delay as a fraction of the backoff (0.0-1.0)
    #[serde(default = "default_retry_jitter_factor")]
    pub jitter_factor: f64,
}

/// Optional ERP (Odoo) connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ErpConfig {
    /// Environment variable: `BRIDGE_ERP_URL`; ERP features are disabled when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Product category holding inspection points
    #[serde(default = "default_erp_category_id")]
    pub category_id: i64,
    #[serde(default = "default_erp_default_customer")]
    pub default_customer: String,
    #[serde(default = "default_erp_default_site")]
    pub default_site: String,
    #[serde(default = "default_erp_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            operator_tokens: Vec::new(),
            vendor: VendorConfig::default(),
            cache: CacheConfig::default(),
            retry: RetryConfig::default(),
            erp: ErpConfig::default(),
        }
    }
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            mode: VendorMode::default(),
            api_base: default_vendor_api_base(),
            token: None,
            discovery_timeout_ms: default_vendor_discovery_timeout_ms(),
            cluster_timeout_ms: default_vendor_cluster_timeout_ms(),
            page_size: default_vendor_page_size(),
            max_pages: default_vendor_max_pages(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            topology_ttl_seconds: default_cache_topology_ttl_seconds(),
            device_ttl_seconds: default_cache_device_ttl_seconds(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_max_attempts(),
            base_delay_ms: default_retry_base_delay_ms(),
            max_delay_ms: default_retry_max_delay_ms(),
            jitter_factor: default_retry_jitter_factor(),
        }
    }
}

impl Default for ErpConfig {
    fn default() -> Self {
        Self {
            url: None,
            database: None,
            username: None,
            password: None,
            category_id: default_erp_category_id(),
            default_customer: default_erp_default_customer(),
            default_site: default_erp_default_site(),
            timeout_ms: default_erp_timeout_ms(),
        }
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    fn is_local_profile(&self) -> bool {
        matches!(self.profile.as_str(), "local" | "test")
    }

    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if !config.operator_tokens.is_empty() {
            config.operator_tokens = vec![REDACTED.to_string()];
        }
        if config.vendor.token.is_some() {
            config.vendor.token = Some(REDACTED.to_string());
        }
        if config.erp.password.is_some() {
            config.erp.password = Some(REDACTED.to_string());
        }
        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration, returning an error if required settings are missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.vendor.validate()?;

        if self.vendor.mode == VendorMode::Http
            && !self.is_local_profile()
            && self.vendor.token.as_deref().is_none_or(str::is_empty)
        {
            return Err(ConfigError::MissingVendorToken);
        }

        self.cache.validate()?;
        self.retry.validate()?;
        self.erp.validate()?;

        Ok(())
    }

    /// Hosting settings for the HTTP vendor client.
    pub fn http_device_cloud(&self) -> Result<HttpDeviceCloudConfig, ConfigError> {
        Ok(HttpDeviceCloudConfig {
            api_base: self.vendor.api_base_url()?,
            token: self.vendor.token.clone().unwrap_or_default(),
            discovery_timeout: Duration::from_millis(self.vendor.discovery_timeout_ms),
            cluster_timeout: Duration::from_millis(self.vendor.cluster_timeout_ms),
            page_size: self.vendor.page_size,
            max_pages: self.vendor.max_pages,
        })
    }
}

impl VendorConfig {
    pub fn api_base_url(&self) -> Result<Url, ConfigError> {
        parse_http_url(&self.api_base).map_err(|reason| ConfigError::InvalidVendorApiBase {
            value: self.api_base.clone(),
            reason,
        })
    }

    /// Validate vendor timeouts and paging bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.api_base_url()?;

        if !(10_000..=120_000).contains(&self.discovery_timeout_ms) {
            return Err(ConfigError::InvalidDiscoveryTimeout {
                value: self.discovery_timeout_ms,
            });
        }
        if !(1_000..10_000).contains(&self.cluster_timeout_ms) {
            return Err(ConfigError::InvalidClusterTimeout {
                value: self.cluster_timeout_ms,
            });
        }
        if self.page_size == 0 || self.max_pages == 0 {
            return Err(ConfigError::InvalidPaging {
                page_size: self.page_size,
                max_pages: self.max_pages,
            });
        }
        Ok(())
    }
}

impl CacheConfig {
    pub fn topology_ttl(&self) -> Duration {
        Duration::from_secs(self.topology_ttl_seconds)
    }

    pub fn device_ttl(&self) -> Duration {
        Duration::from_secs(self.device_ttl_seconds)
    }

    /// Device snapshots must not outlive the topology they were resolved through.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.topology_ttl_seconds == 0
            || self.device_ttl_seconds == 0
            || self.device_ttl_seconds > self.topology_ttl_seconds
        {
            return Err(ConfigError::InvalidCacheTtl {
                topology: self.topology_ttl_seconds,
                device: self.device_ttl_seconds,
            });
        }
        Ok(())
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.jitter_factor,
        )
    }

    /// Validate retry bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=5).contains(&self.max_attempts) {
            return Err(ConfigError::InvalidRetryAttempts {
                value: self.max_attempts,
            });
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ConfigError::InvalidRetryJitter {
                value: self.jitter_factor,
            });
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(ConfigError::InvalidRetryBounds {
                base: self.base_delay_ms,
                max: self.max_delay_ms,
            });
        }
        Ok(())
    }
}

impl ErpConfig {
    pub fn is_enabled(&self) -> bool {
        self.url.as_deref().is_some_and(|url| !url.is_empty())
    }

    pub fn location_defaults(&self) -> LocationDefaults {
        LocationDefaults {
            customer: self.default_customer.clone(),
            site: self.default_site.clone(),
        }
    }

    /// Odoo client settings, `None` when the ERP is not configured.
    pub fn odoo(&self) -> Result<Option<OdooConfig>, ConfigError> {
        let Some(url) = self.url.as_deref().filter(|url| !url.is_empty()) else {
            return Ok(None);
        };
        let url = parse_http_url(url).map_err(|reason| ConfigError::InvalidErpUrl {
            value: url.to_string(),
            reason,
        })?;
        let required = |value: &Option<String>, name: &'static str| {
            value
                .clone()
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::IncompleteErpConfig { missing: name })
        };

        Ok(Some(OdooConfig {
            url,
            database: required(&self.database, "ERP_DATABASE")?,
            username: required(&self.username, "ERP_USERNAME")?,
            password: required(&self.password, "ERP_PASSWORD")?,
            category_id: self.category_id,
            timeout: Duration::from_millis(self.timeout_ms),
        }))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.odoo().map(|_| ())
    }
}

fn parse_http_url(value: &str) -> Result<Url, String> {
    let url = Url::parse(value).map_err(|err| err.to_string())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme '{}'", url.scheme()));
    }
    if url.cannot_be_a_base() {
        return Err("URL cannot be a base".to_string());
    }
    Ok(url)
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_vendor_api_base() -> String {
    "https://dapi.microshare.io".to_string()
}

fn default_vendor_discovery_timeout_ms() -> u64 {
    30_000
}

fn default_vendor_cluster_timeout_ms() -> u64 {
    5_000
}

fn default_vendor_page_size() -> u32 {
    2_000
}

fn default_vendor_max_pages() -> u32 {
    50
}

fn default_cache_topology_ttl_seconds() -> u64 {
    3_600
}

fn default_cache_device_ttl_seconds() -> u64 {
    300
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    250
}

fn default_retry_max_delay_ms() -> u64 {
    4_000
}

fn default_retry_jitter_factor() -> f64 {
    0.1
}

fn default_erp_category_id() -> i64 {
    4
}

fn default_erp_default_customer() -> String {
    "Golden Crust Manchester".to_string()
}

fn default_erp_default_site() -> String {
    "Manchester Production".to_string()
}

fn default_erp_timeout_ms() -> u64 {
    10_000
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("invalid vendor mode '{value}', expected http or in_memory")]
    InvalidVendorMode { value: String },
    #[error("invalid vendor API base '{value}': {reason}")]
    InvalidVendorApiBase { value: String, reason: String },
    #[error("vendor token is missing; set BRIDGE_VENDOR_TOKEN or use BRIDGE_VENDOR_MODE=in_memory")]
    MissingVendorToken,
    #[error("vendor discovery timeout must be between 10000 and 120000 ms, got {value}")]
    InvalidDiscoveryTimeout { value: u64 },
    #[error("vendor cluster timeout must be between 1000 and 9999 ms, got {value}")]
    InvalidClusterTimeout { value: u64 },
    #[error("vendor page size ({page_size}) and max pages ({max_pages}) must be positive")]
    InvalidPaging { page_size: u32, max_pages: u32 },
    #[error(
        "cache TTLs must be positive with device TTL ({device}s) not above topology TTL ({topology}s)"
    )]
    InvalidCacheTtl { topology: u64, device: u64 },
    #[error("retry max attempts must be between 1 and 5, got {value}")]
    InvalidRetryAttempts { value: u32 },
    #[error("retry jitter factor must be between 0.0 and 1.0, got {value}")]
    InvalidRetryJitter { value: f64 },
    #[error("retry base delay ({base} ms) cannot be greater than max delay ({max} ms)")]
    InvalidRetryBounds { base: u64, max: u64 },
    #[error("invalid ERP URL '{value}': {reason}")]
    InvalidErpUrl { value: String, reason: String },
    #[error("ERP is enabled but BRIDGE_{missing} is not set")]
    IncompleteErpConfig { missing: &'static str },
}

/// Loads configuration using layered `.env` files and `BRIDGE_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads and validates configuration.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = take_string(&mut layered, "PROFILE").unwrap_or(profile_hint);
        let api_bind_addr =
            take_string(&mut layered, "API_BIND_ADDR").unwrap_or_else(default_api_bind_addr);
        let log_level = take_string(&mut layered, "LOG_LEVEL").unwrap_or_else(default_log_level);
        let log_format = take_string(&mut layered, "LOG_FORMAT").unwrap_or_else(default_log_format);

        // Support both a single token and a comma-separated list
        let operator_tokens = if let Some(tokens) = layered.remove("OPERATOR_TOKENS") {
            tokens
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        } else if let Some(token) = take_string(&mut layered, "OPERATOR_TOKEN") {
            vec![token]
        } else {
            Vec::new()
        };

        let vendor = VendorConfig {
            mode: match take_string(&mut layered, "VENDOR_MODE") {
                Some(mode) => mode.parse()?,
                None => VendorMode::default(),
            },
            api_base: take_string(&mut layered, "VENDOR_API_BASE")
                .unwrap_or_else(default_vendor_api_base),
            token: take_string(&mut layered, "VENDOR_TOKEN"),
            discovery_timeout_ms: take_parsed(&mut layered, "VENDOR_DISCOVERY_TIMEOUT_MS")
                .unwrap_or_else(default_vendor_discovery_timeout_ms),
            cluster_timeout_ms: take_parsed(&mut layered, "VENDOR_CLUSTER_TIMEOUT_MS")
                .unwrap_or_else(default_vendor_cluster_timeout_ms),
            page_size: take_parsed(&mut layered, "VENDOR_PAGE_SIZE")
                .unwrap_or_else(default_vendor_page_size),
            max_pages: take_parsed(&mut layered, "VENDOR_MAX_PAGES")
                .unwrap_or_else(default_vendor_max_pages),
        };

        let cache = CacheConfig {
            topology_ttl_seconds: take_parsed(&mut layered, "CACHE_TOPOLOGY_TTL_SECONDS")
                .unwrap_or_else(default_cache_topology_ttl_seconds),
            device_ttl_seconds: take_parsed(&mut layered, "CACHE_DEVICE_TTL_SECONDS")
                .unwrap_or_else(default_cache_device_ttl_seconds),
        };

        let retry = RetryConfig {
            max_attempts: take_parsed(&mut layered, "RETRY_MAX_ATTEMPTS")
                .unwrap_or_else(default_retry_max_attempts),
            base_delay_ms: take_parsed(&mut layered, "RETRY_BASE_DELAY_MS")
                .unwrap_or_else(default_retry_base_delay_ms),
            max_delay_ms: take_parsed(&mut layered, "RETRY_MAX_DELAY_MS")
                .unwrap_or_else(default_retry_max_delay_ms),
            jitter_factor: take_parsed(&mut layered, "RETRY_JITTER_FACTOR")
                .unwrap_or_else(default_retry_jitter_factor),
        };

        let erp = ErpConfig {
            url: take_string(&mut layered, "ERP_URL"),
            database: take_string(&mut layered, "ERP_DATABASE"),
            username: take_string(&mut layered, "ERP_USERNAME"),
            password: take_string(&mut layered, "ERP_PASSWORD"),
            category_id: take_parsed(&mut layered, "ERP_CATEGORY_ID")
                .unwrap_or_else(default_erp_category_id),
            default_customer: take_string(&mut layered, "ERP_DEFAULT_CUSTOMER")
                .unwrap_or_else(default_erp_default_customer),
            default_site: take_string(&mut layered, "ERP_DEFAULT_SITE")
                .unwrap_or_else(default_erp_default_site),
            timeout_ms: take_parsed(&mut layered, "ERP_TIMEOUT_MS")
                .unwrap_or_else(default_erp_timeout_ms),
        };

        let config = AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            operator_tokens,
            vendor,
            cache,
            retry,
            erp,
        };

        config.validate()?;

        match config.bind_addr() {
            Ok(_) => Ok(config),
            Err(source) => Err(ConfigError::InvalidBindAddr {
                value: config.api_bind_addr.clone(),
                source,
            }),
        }
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var(format!("{ENV_PREFIX}PROFILE"))
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn take_string(layered: &mut BTreeMap<String, String>, key: &str) -> Option<String> {
    layered
        .remove(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn take_parsed<T: FromStr>(layered: &mut BTreeMap<String, String>, key: &str) -> Option<T> {
    take_string(layered, key).and_then(|value| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = AppConfig::default();
        config.validate().expect("defaults are valid for the local profile");
        assert_eq!(config.vendor.mode, VendorMode::Http);
        assert_eq!(config.cache.topology_ttl(), Duration::from_secs(3600));
        assert_eq!(config.cache.device_ttl(), Duration::from_secs(300));
        assert!(!config.erp.is_enabled());
    }

    #[test]
    fn test_vendor_token_required_outside_local() {
        let mut config = AppConfig {
            profile: "production".to_string(),
            ..AppConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingVendorToken)
        ));

        config.vendor.mode = VendorMode::InMemory;
        config.validate().expect("in-memory vendor needs no token");

        config.vendor.mode = VendorMode::Http;
        config.vendor.token = Some("vendor-token".to_string());
        config.validate().expect("token satisfies http mode");
    }

    #[test]
    fn test_timeout_bounds() {
        let mut config = AppConfig::default();
        config.vendor.discovery_timeout_ms = 5_000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDiscoveryTimeout { value: 5_000 })
        ));

        let mut config = AppConfig::default();
        config.vendor.cluster_timeout_ms = 10_000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidClusterTimeout { value: 10_000 })
        ));
    }

    #[test]
    fn test_cache_ttl_ordering() {
        let mut config = AppConfig::default();
        config.cache.device_ttl_seconds = 7_200;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCacheTtl { .. })
        ));

        config.cache.device_ttl_seconds = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCacheTtl { .. })
        ));
    }

    #[test]
    fn test_retry_validation() {
        let mut retry = RetryConfig::default();
        retry.max_attempts = 6;
        assert!(matches!(
            retry.validate(),
            Err(ConfigError::InvalidRetryAttempts { value: 6 })
        ));

        let mut retry = RetryConfig::default();
        retry.jitter_factor = 1.5;
        assert!(matches!(
            retry.validate(),
            Err(ConfigError::InvalidRetryJitter { .. })
        ));

        let mut retry = RetryConfig::default();
        retry.base_delay_ms = 5_000;
        assert!(matches!(
            retry.validate(),
            Err(ConfigError::InvalidRetryBounds { .. })
        ));

        let policy = RetryConfig::default().policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_erp_requires_credentials_when_enabled() {
        let mut erp = ErpConfig {
            url: Some("https://erp.example".to_string()),
            database: Some("prod".to_string()),
            username: Some("bridge".to_string()),
            ..ErpConfig::default()
        };
        assert!(matches!(
            erp.validate(),
            Err(ConfigError::IncompleteErpConfig {
                missing: "ERP_PASSWORD"
            })
        ));

        erp.password = Some("secret".to_string());
        let odoo = erp.odoo().unwrap().unwrap();
        assert_eq!(odoo.category_id, 4);
        assert_eq!(odoo.timeout, Duration::from_secs(10));

        erp.url = Some("ftp://erp.example".to_string());
        assert!(matches!(
            erp.validate(),
            Err(ConfigError::InvalidErpUrl { .. })
        ));
    }

    #[test]
    fn test_vendor_mode_parsing() {
        assert_eq!("HTTP".parse::<VendorMode>().unwrap(), VendorMode::Http);
        assert_eq!(
            "in_memory".parse::<VendorMode>().unwrap(),
            VendorMode::InMemory
        );
        assert!("grpc".parse::<VendorMode>().is_err());
    }

    #[test]
    fn test_redacted_json_hides_secrets() {
        let mut config = AppConfig::default();
        config.operator_tokens = vec!["operator-secret".to_string()];
        config.vendor.token = Some("vendor-secret".to_string());
        config.erp.password = Some("erp-secret".to_string());

        let json = config.redacted_json().unwrap();
        assert!(!json.contains("operator-secret"));
        assert!(!json.contains("vendor-secret"));
        assert!(!json.contains("erp-secret"));
        assert!(json.contains(REDACTED));
    }
}

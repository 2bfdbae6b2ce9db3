//! Application configuration, read from `TEXTSHARE_*` environment variables.
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `TEXTSHARE_BIND` | store server address | `127.0.0.1:9090` |
//! | `TEXTSHARE_ORIGIN` | origin the app is reached on | `http://localhost:3000` |
//! | `TEXTSHARE_LAN_HOST` | host substituted for loopback in share links | unset |
//! | `TEXTSHARE_CREATE_RETRIES` | attempts per create | `1` |
//! | `TEXTSHARE_RETRY_DELAY_MS` | delay between attempts | `1000` |
//! | `TEXTSHARE_STORAGE_PATH` | RocksDB directory | unset (in-memory) |
//!
//! Unparseable values are logged and replaced by the default.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use textshare_sync::ServerConfig;

use crate::retry::RetryPolicy;
use crate::share::{derive_share_url, LanSubstitution, Origin, OriginResolver, PassThrough};

pub const ENV_BIND: &str = "TEXTSHARE_BIND";
pub const ENV_ORIGIN: &str = "TEXTSHARE_ORIGIN";
pub const ENV_LAN_HOST: &str = "TEXTSHARE_LAN_HOST";
pub const ENV_CREATE_RETRIES: &str = "TEXTSHARE_CREATE_RETRIES";
pub const ENV_RETRY_DELAY_MS: &str = "TEXTSHARE_RETRY_DELAY_MS";
pub const ENV_STORAGE_PATH: &str = "TEXTSHARE_STORAGE_PATH";

const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub origin: Origin,
    pub lan_host: Option<String>,
    pub create_retry: RetryPolicy,
    pub storage_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: ServerConfig::default().bind_addr,
            origin: Origin::new("http", "localhost", Some(3000)),
            lan_host: None,
            create_retry: RetryPolicy::default(),
            storage_path: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` uses the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let attempts = parse_or(
            ENV_CREATE_RETRIES,
            get(ENV_CREATE_RETRIES),
            defaults.create_retry.max_attempts,
        );
        let delay_ms = parse_or(
            ENV_RETRY_DELAY_MS,
            get(ENV_RETRY_DELAY_MS),
            DEFAULT_RETRY_DELAY.as_millis() as u64,
        );
        let create_retry = if attempts > 1 {
            RetryPolicy::new(attempts, Duration::from_millis(delay_ms))
        } else {
            defaults.create_retry
        };

        Self {
            bind_addr: get(ENV_BIND).unwrap_or(defaults.bind_addr),
            origin: parse_or(ENV_ORIGIN, get(ENV_ORIGIN), defaults.origin),
            lan_host: get(ENV_LAN_HOST),
            create_retry,
            storage_path: get(ENV_STORAGE_PATH).map(PathBuf::from),
        }
    }

    /// LAN substitution when a LAN host is configured, otherwise pass-through.
    pub fn resolver(&self) -> Box<dyn OriginResolver> {
        match &self.lan_host {
            Some(host) => Box::new(LanSubstitution::new(host.clone())),
            None => Box::new(PassThrough),
        }
    }

    pub fn share_url(&self) -> String {
        derive_share_url(&self.origin, self.resolver().as_ref())
    }

    /// URL a `RemoteStore` connects to.
    pub fn store_url(&self) -> String {
        format!("ws://{}", self.bind_addr)
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind_addr: self.bind_addr.clone(),
            storage_path: self.storage_path.clone(),
            ..ServerConfig::default()
        }
    }
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match raw {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|e| {
            log::warn!("Ignoring {key}={raw:?}: {e}");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]);
        assert_eq!(cfg.bind_addr, "127.0.0.1:9090");
        assert_eq!(cfg.create_retry, RetryPolicy::fail_fast());
        assert!(cfg.lan_host.is_none());
        assert!(cfg.storage_path.is_none());
        assert_eq!(cfg.share_url(), "http://localhost:3000/view");
        assert_eq!(cfg.store_url(), "ws://127.0.0.1:9090");
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            (ENV_BIND, "0.0.0.0:7000"),
            (ENV_ORIGIN, "http://localhost:8080"),
            (ENV_LAN_HOST, "10.0.0.5"),
            (ENV_CREATE_RETRIES, "3"),
            (ENV_RETRY_DELAY_MS, "250"),
            (ENV_STORAGE_PATH, "/var/lib/textshare"),
        ]);
        assert_eq!(cfg.server_config().bind_addr, "0.0.0.0:7000");
        assert_eq!(cfg.share_url(), "http://10.0.0.5:8080/view");
        assert_eq!(cfg.create_retry, RetryPolicy::new(3, Duration::from_millis(250)));
        assert_eq!(
            cfg.server_config().storage_path,
            Some(PathBuf::from("/var/lib/textshare"))
        );
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let cfg = config(&[
            (ENV_ORIGIN, "not an origin"),
            (ENV_CREATE_RETRIES, "many"),
            (ENV_LAN_HOST, "   "),
        ]);
        assert_eq!(cfg.origin, AppConfig::default().origin);
        assert_eq!(cfg.create_retry, RetryPolicy::fail_fast());
        assert!(cfg.lan_host.is_none());
    }

    #[test]
    fn test_retries_default_to_one_second_delay() {
        let cfg = config(&[(ENV_CREATE_RETRIES, "3")]);
        assert_eq!(cfg.create_retry, RetryPolicy::backoff());
    }
}

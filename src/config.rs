//! Client configuration parsed from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CaroError, Result};

pub const DEFAULT_API_URL: &str = "http://localhost:3000";
pub const DEFAULT_DATA_DIR: &str = ".caro";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
const WS_PATH: &str = "/ws";

/// Endpoints and local paths for a client process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_url: String,
    pub ws_url: String,
    pub data_dir: PathBuf,
    pub http_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ws_url: derive_ws_url(DEFAULT_API_URL).unwrap_or_default(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    /// Build config from environment variables.
    ///
    /// Optional:
    /// - `CARO_API_URL`: REST base URL, default `http://localhost:3000`
    /// - `CARO_WS_URL`: room channel URL, default derived from the API URL
    /// - `CARO_DATA_DIR`: identity storage directory, default `.caro`
    /// - `CARO_HTTP_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns [`CaroError::Config`] if no WebSocket URL can be derived.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading values through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`CaroError::Config`] if no WebSocket URL can be derived.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_url = lookup("CARO_API_URL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let ws_url = match lookup("CARO_WS_URL").filter(|v| !v.trim().is_empty()) {
            Some(url) => url.trim().trim_end_matches('/').to_string(),
            None => derive_ws_url(&api_url)?,
        };
        let data_dir = lookup("CARO_DATA_DIR")
            .filter(|v| !v.trim().is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_DATA_DIR), PathBuf::from);
        let http_timeout = Duration::from_secs(
            lookup("CARO_HTTP_TIMEOUT_SECS")
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
        );

        Ok(Self {
            api_url,
            ws_url,
            data_dir,
            http_timeout,
        })
    }
}

/// `http://host` → `ws://host/ws`, `https://host` → `wss://host/ws`.
fn derive_ws_url(api_url: &str) -> Result<String> {
    let base = api_url.trim_end_matches('/');
    let ws = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        return Err(CaroError::Config(format!(
            "cannot derive a WebSocket URL from '{api_url}', set CARO_WS_URL"
        )));
    };
    Ok(format!("{ws}{WS_PATH}"))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.ws_url, "ws://localhost:3000/ws");
        assert_eq!(config.http_timeout, Duration::from_secs(10));
    }

    #[test]
    fn https_api_derives_wss() {
        let config =
            ClientConfig::from_lookup(lookup(&[("CARO_API_URL", "https://caro.example/")])).unwrap();
        assert_eq!(config.api_url, "https://caro.example");
        assert_eq!(config.ws_url, "wss://caro.example/ws");
    }

    #[test]
    fn explicit_values_win() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("CARO_WS_URL", "ws://other:9000/rooms/"),
            ("CARO_DATA_DIR", "/tmp/caro"),
            ("CARO_HTTP_TIMEOUT_SECS", "3"),
        ]))
        .unwrap();
        assert_eq!(config.ws_url, "ws://other:9000/rooms");
        assert_eq!(config.data_dir, PathBuf::from("/tmp/caro"));
        assert_eq!(config.http_timeout, Duration::from_secs(3));
    }

    #[test]
    fn bad_timeout_falls_back() {
        let config =
            ClientConfig::from_lookup(lookup(&[("CARO_HTTP_TIMEOUT_SECS", "soon")])).unwrap();
        assert_eq!(config.http_timeout, Duration::from_secs(10));
    }

    #[test]
    fn unknown_scheme_needs_explicit_ws_url() {
        let err = ClientConfig::from_lookup(lookup(&[("CARO_API_URL", "ftp://x")])).unwrap_err();
        assert!(matches!(err, CaroError::Config(_)));
    }
}

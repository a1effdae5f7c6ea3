//! Option bags. Field names are frozen for wire compatibility with callers
//! that serialise these as config (e.g. JSON/TOML), so they keep their
//! snake_case shape rather than following Rust naming conventions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_max_conn_per_addr")]
    pub max_conn_per_addr: usize,
    #[serde(default = "default_keepalive_timeout")]
    pub keepalive_timeout: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// TLS/transport options. An absent entry means "use the insecure
    /// default `{verify_peer=false, verify_peer_name=false,
    /// allow_self_signed=true}`".
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
}

fn default_max_conn_per_addr() -> usize {
    128
}

fn default_keepalive_timeout() -> u64 {
    15
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_timeout() -> u64 {
    30
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_conn_per_addr: default_max_conn_per_addr(),
            keepalive_timeout: default_keepalive_timeout(),
            connect_timeout: default_connect_timeout(),
            timeout: default_timeout(),
            context: HashMap::new(),
        }
    }
}

/// `allow_redirects` sub-bag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllowRedirects {
    #[serde(default = "default_redirect_max")]
    pub max: u32,
}

fn default_redirect_max() -> u32 {
    5
}

impl Default for AllowRedirects {
    fn default() -> Self {
        Self {
            max: default_redirect_max(),
        }
    }
}

/// HTTP version on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpVersion {
    #[serde(rename = "1.0")]
    Http10,
    #[serde(rename = "1.1")]
    Http11,
}

impl Default for HttpVersion {
    fn default() -> Self {
        HttpVersion::Http11
    }
}

impl std::fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpVersion::Http10 => write!(f, "1.0"),
            HttpVersion::Http11 => write!(f, "1.1"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_config_defaults_are_stable() {
        let cfg = PoolConfig::default();
        assert_eq!(cfg.max_conn_per_addr, 128);
        assert_eq!(cfg.keepalive_timeout, 15);
        assert_eq!(cfg.connect_timeout, 30);
        assert_eq!(cfg.timeout, 30);
    }

    #[test]
    fn redirect_default_is_five() {
        assert_eq!(AllowRedirects::default().max, 5);
    }
}

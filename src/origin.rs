use crate::error::{ClientError, Result};
use std::fmt;
use url::Url;

/// Wire scheme of an origin. Only the two HTTP/1.1 transports are modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn is_tls(self) -> bool {
        matches!(self, Scheme::Https)
    }

    fn default_port(self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Http => write!(f, "http"),
            Scheme::Https => write!(f, "https"),
        }
    }
}

/// The `(scheme, host, port)` tuple that uniquely identifies a pooling
/// target. Canonical serialisation is `tcp://host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
}

impl Origin {
    /// Parse the origin (scheme/host/port) out of a request URL.
    ///
    /// Fails with `ClientError::InvalidUrl` if the host is missing.
    pub fn from_url(url: &Url) -> Result<Self> {
        let scheme = match url.scheme() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => return Err(ClientError::InvalidUrl(format!("unsupported scheme: {other}"))),
        };
        let host = url
            .host_str()
            .ok_or_else(|| ClientError::InvalidUrl("missing host".to_string()))?
            .to_string();
        let port = url.port().unwrap_or_else(|| scheme.default_port());
        Ok(Origin { scheme, host, port })
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tcp://{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_http_default_port() {
        let url = Url::parse("http://example.com/path").unwrap();
        let origin = Origin::from_url(&url).unwrap();
        assert_eq!(origin.scheme, Scheme::Http);
        assert_eq!(origin.host, "example.com");
        assert_eq!(origin.port, 80);
        assert_eq!(origin.to_string(), "tcp://example.com:80");
    }

    #[test]
    fn parses_https_explicit_port() {
        let url = Url::parse("https://example.com:8443/path").unwrap();
        let origin = Origin::from_url(&url).unwrap();
        assert_eq!(origin.scheme, Scheme::Https);
        assert_eq!(origin.port, 8443);
    }

    #[test]
    fn rejects_unsupported_scheme() {
        let url = Url::parse("ftp://example.com/").unwrap();
        assert!(Origin::from_url(&url).is_err());
    }

    #[test]
    fn same_origin_is_equal_key() {
        let a = Origin::from_url(&Url::parse("http://h:80/a").unwrap()).unwrap();
        let b = Origin::from_url(&Url::parse("http://h:80/b").unwrap()).unwrap();
        assert_eq!(a, b);
    }
}

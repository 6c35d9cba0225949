//! Proxy candidate and validated proxy value types

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Everything but RFC 3986 unreserved characters is escaped in userinfo
const USERINFO: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyScheme {
    Http,
    Https,
}

impl ProxyScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyScheme::Http => "http",
            ProxyScheme::Https => "https",
        }
    }
}

impl fmt::Display for ProxyScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Country/region metadata attached to a candidate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Location {
    pub code: Option<String>,
    pub name: Option<String>,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, &self.code) {
            (Some(name), Some(code)) => write!(f, "{} ({})", name, code),
            (Some(name), None) => write!(f, "{}", name),
            (None, Some(code)) => write!(f, "{}", code),
            (None, None) => write!(f, "unknown location"),
        }
    }
}

/// A proxy server not yet proven reachable.
///
/// Two candidates are equal when host, port and credentials match; location
/// metadata is ignored.
#[derive(Debug, Clone, Serialize)]
pub struct ProxyCandidate {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub location: Location,
}

impl PartialEq for ProxyCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host
            && self.port == other.port
            && self.username == other.username
            && self.password == other.password
    }
}

impl Eq for ProxyCandidate {}

impl ProxyCandidate {
    /// `scheme://[user:pass@]host:port` with percent-encoded credentials
    pub fn connection_string(&self, scheme: ProxyScheme) -> String {
        match &self.username {
            Some(user) => format!(
                "{}://{}:{}@{}:{}",
                scheme,
                utf8_percent_encode(user, USERINFO),
                utf8_percent_encode(self.password.as_deref().unwrap_or(""), USERINFO),
                self.host,
                self.port
            ),
            None => format!("{}://{}:{}", scheme, self.host, self.port),
        }
    }

    /// `host:port`, safe to log
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A candidate proven reachable by a live probe in the current run
#[derive(Debug, Clone, Serialize)]
pub struct ValidatedProxy {
    pub candidate: ProxyCandidate,
    pub scheme: ProxyScheme,
    pub url: String,
    /// Address the probe target saw the request coming from
    pub exit_ip: Option<String>,
}

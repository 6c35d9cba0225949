//! Configuration handling for vendor profiles
//!
//! Each vendor is described entirely by data: candidate domains, request
//! templates, header template, and field-priority lists. The engine in
//! [`crate::pipeline`] never hardcodes a vendor.

use crate::extract::{FieldPath, paths};
use crate::http::Method;
use crate::proxy::ProxyScheme;
use crate::tokens::TokenScope;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const CHROME_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const URBAN_CLIENT_APP: &str = "URBAN_VPN_BROWSER_EXTENSION";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
    #[error("Unknown vendor '{0}'")]
    UnknownVendor(String),
    #[error("Invalid setting {field}: {message}")]
    Invalid { field: String, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub default_vendor: String,
    pub probe: ProbeConfig,
    pub vendors: BTreeMap<String, VendorProfile>,
}

/// Where and how long to probe candidate proxies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub target: String,
    pub timeout_secs: u64,
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            target: "https://httpbin.org/ip".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorProfile {
    pub name: String,
    pub scheme: ProxyScheme,
    pub app_version: String,
    pub headers: HeaderTemplate,
    pub domains: DomainConfig,
    pub timeouts: Timeouts,
    /// Ordered token exchanges; each stage's token authorizes the next
    pub tokens: Vec<TokenStage>,
    /// Per-server exchange of a signature for a proxy-scoped token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_auth: Option<TokenStage>,
    pub catalog: CatalogConfig,
    pub servers: ServerSource,
    pub credentials: CredentialSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderTemplate {
    pub user_agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Base URLs tried in order
    pub primary: Vec<String>,
    /// Descriptor documents listing further domains
    #[serde(default)]
    pub backup_sources: Vec<String>,
    #[serde(default = "default_backup_field")]
    pub backup_field: FieldPath,
    /// Without a health check the first primary is used unprobed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthCheck>,
}

fn default_backup_field() -> FieldPath {
    FieldPath::new("domains.free")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub path: String,
    /// Field that carries the "available" signal and its expected value
    pub field: FieldPath,
    pub expect: Value,
    /// Accept backup-listed domains on any 2xx without checking the signal
    #[serde(default)]
    pub lenient_backups: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeouts {
    pub health_secs: u64,
    pub request_secs: u64,
}

impl Timeouts {
    pub fn health(&self) -> Duration {
        Duration::from_secs(self.health_secs)
    }

    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            health_secs: 5,
            request_secs: 10,
        }
    }
}

/// Method, path and JSON body template of one API call.
///
/// Paths starting with `http://` or `https://` are absolute, anything else
/// is joined onto the resolved endpoint. Body strings such as `{udid}` or
/// `{entry.region}` are substituted at request time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestTemplate {
    pub method: Method,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl RequestTemplate {
    pub fn post(path: &str, body: Option<Value>) -> Self {
        Self {
            method: Method::Post,
            path: path.to_string(),
            body,
            headers: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenStage {
    pub scope: TokenScope,
    /// Send the previous stage's token as a bearer credential
    #[serde(default)]
    pub authorize: bool,
    pub request: RequestTemplate,
    /// Where the token may appear in the response, highest priority first
    pub fields: Vec<FieldPath>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub request: RequestTemplate,
    pub list_field: FieldPath,
    pub code_fields: Vec<FieldPath>,
    pub name_fields: Vec<FieldPath>,
    pub policy: SelectionPolicy,
}

/// How the catalog is narrowed to a bounded candidate list.
///
/// Applied as: filter, then shuffle, then move the preferred code to the
/// front, then truncate to `limit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<EntryFilter>,
    #[serde(default)]
    pub shuffle: bool,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryFilter {
    pub field: FieldPath,
    pub equals: Value,
}

/// Where concrete host/port/credentials for a catalog entry come from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerSource {
    /// Details are embedded in the catalog entry
    Inline { layout: ServerLayout },
    /// One extra call per entry resolves the details
    Lookup {
        request: RequestTemplate,
        layout: ServerLayout,
    },
}

impl ServerSource {
    pub fn layout(&self) -> &ServerLayout {
        match self {
            ServerSource::Inline { layout } | ServerSource::Lookup { layout, .. } => layout,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerLayout {
    /// Sub-objects tried in order; the first carrying a host and port wins
    pub roots: Vec<FieldPath>,
    pub host_fields: Vec<FieldPath>,
    pub port_fields: Vec<FieldPath>,
    #[serde(default)]
    pub username_fields: Vec<FieldPath>,
    #[serde(default)]
    pub password_fields: Vec<FieldPath>,
    #[serde(default)]
    pub signature_fields: Vec<FieldPath>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CredentialSource {
    /// Username and password are supplied with the server
    Server,
    /// The bearer token doubles as username with a fixed password
    Token { password: String },
}

/// Command-line overrides layered on top of a vendor profile
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub preferred_code: Option<String>,
    pub limit: Option<usize>,
    pub probe_timeout_secs: Option<u64>,
    pub probe_target: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let mut vendors = BTreeMap::new();
        vendors.insert("urban".to_string(), urban_profile());
        vendors.insert("veepn".to_string(), veepn_profile());
        Self {
            default_vendor: "veepn".to_string(),
            probe: ProbeConfig::default(),
            vendors,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// `<config dir>/vpn-proxy-fetch/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("vpn-proxy-fetch").join("config.toml"))
    }

    /// Load an explicit path, else the default path when it exists, else built-ins
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn vendor(&self, name: &str) -> Result<&VendorProfile, ConfigError> {
        self.vendors
            .get(name)
            .ok_or_else(|| ConfigError::UnknownVendor(name.to_string()))
    }

    /// Resolve the profile and probe settings for one run
    pub fn resolve(
        &self,
        vendor: Option<&str>,
        overrides: &Overrides,
    ) -> Result<(VendorProfile, ProbeConfig), ConfigError> {
        let mut profile = self.vendor(vendor.unwrap_or(&self.default_vendor))?.clone();
        let mut probe = self.probe.clone();

        if let Some(code) = &overrides.preferred_code {
            profile.catalog.policy.preferred_code = Some(code.to_ascii_uppercase());
        }
        if let Some(limit) = overrides.limit {
            if limit == 0 {
                return Err(ConfigError::Invalid {
                    field: "limit".to_string(),
                    message: "must be at least 1".to_string(),
                });
            }
            profile.catalog.policy.limit = limit;
        }
        if let Some(secs) = overrides.probe_timeout_secs {
            probe.timeout_secs = secs;
        }
        if let Some(target) = &overrides.probe_target {
            probe.target = target.clone();
        }

        Ok((profile, probe))
    }
}

/// Urban VPN browser-extension API
pub fn urban_profile() -> VendorProfile {
    let mut catalog_request = RequestTemplate {
        method: Method::Get,
        path: "https://stats.urban-vpn.com/api/rest/v2/entrypoints/countries".to_string(),
        body: None,
        headers: BTreeMap::new(),
    };
    catalog_request
        .headers
        .insert("x-client-app".to_string(), URBAN_CLIENT_APP.to_string());

    VendorProfile {
        name: "Urban VPN".to_string(),
        scheme: ProxyScheme::Http,
        app_version: "5.0.0".to_string(),
        headers: HeaderTemplate {
            user_agent: CHROME_UA.to_string(),
            accept: Some("application/json, text/plain, */*".to_string()),
            extra: BTreeMap::new(),
        },
        domains: DomainConfig {
            primary: vec!["https://api-pro.urban-vpn.com/rest/v1".to_string()],
            backup_sources: Vec::new(),
            backup_field: default_backup_field(),
            health: None,
        },
        timeouts: Timeouts::default(),
        tokens: vec![
            TokenStage {
                scope: TokenScope::Registration,
                authorize: false,
                request: RequestTemplate::post(
                    &format!("/registrations/clientApps/{}/users/anonymous", URBAN_CLIENT_APP),
                    Some(json!({"clientApp": {"name": URBAN_CLIENT_APP, "browser": "CHROME"}})),
                ),
                fields: paths(&["id_token", "idToken", "value"]),
            },
            TokenStage {
                scope: TokenScope::Security,
                authorize: true,
                request: RequestTemplate::post(
                    "/security/tokens/accs",
                    Some(json!({"type": "accs", "clientApp": {"name": URBAN_CLIENT_APP}})),
                ),
                fields: paths(&["token.value", "token", "value"]),
            },
        ],
        proxy_auth: Some(TokenStage {
            scope: TokenScope::ProxyAuth,
            authorize: true,
            request: RequestTemplate::post(
                "/security/tokens/accs-proxy",
                Some(json!({
                    "type": "accs-proxy",
                    "clientApp": {"name": URBAN_CLIENT_APP},
                    "signature": "{signature}"
                })),
            ),
            fields: paths(&["value", "token.value"]),
        }),
        catalog: CatalogConfig {
            request: catalog_request,
            list_field: FieldPath::new("countries.elements"),
            code_fields: paths(&["code.iso2"]),
            name_fields: paths(&["title", "name"]),
            policy: SelectionPolicy {
                preferred_code: Some("US".to_string()),
                filter: None,
                shuffle: false,
                limit: 3,
            },
        },
        servers: ServerSource::Inline {
            layout: ServerLayout {
                roots: paths(&["", "servers.elements.0"]),
                host_fields: paths(&["address.primary.host"]),
                port_fields: paths(&["address.primary.port", "address.primary.port_min"]),
                username_fields: Vec::new(),
                password_fields: Vec::new(),
                signature_fields: paths(&["signature"]),
            },
        },
        credentials: CredentialSource::Token {
            password: "1".to_string(),
        },
    }
}

/// VeePN extension API with mirrored domains
pub fn veepn_profile() -> VendorProfile {
    VendorProfile {
        name: "VeePN".to_string(),
        scheme: ProxyScheme::Https,
        app_version: "3.7.8".to_string(),
        headers: HeaderTemplate {
            user_agent: CHROME_UA.to_string(),
            accept: None,
            extra: BTreeMap::new(),
        },
        domains: DomainConfig {
            primary: vec![
                "https://antpeak.com".to_string(),
                "https://zorvian.com".to_string(),
            ],
            backup_sources: vec![
                "https://s3-oregon-1.s3-us-west-2.amazonaws.com/api.json".to_string(),
                "https://proigor.com/payload.json".to_string(),
            ],
            backup_field: default_backup_field(),
            health: Some(HealthCheck {
                path: "/api/available/".to_string(),
                field: FieldPath::new("message"),
                expect: json!("OK"),
                lenient_backups: true,
            }),
        },
        timeouts: Timeouts::default(),
        tokens: vec![TokenStage {
            scope: TokenScope::Security,
            authorize: false,
            request: RequestTemplate::post(
                "/api/launch/",
                Some(json!({
                    "udid": "{udid}",
                    "appVersion": "{app_version}",
                    "platform": "chrome",
                    "platformVersion": "{user_agent}",
                    "timeZone": "{time_zone}",
                    "deviceName": "Chrome"
                })),
            ),
            fields: paths(&["data.accessToken", "accessToken"]),
        }],
        proxy_auth: None,
        catalog: CatalogConfig {
            request: RequestTemplate::post("/api/location/list/", None),
            list_field: FieldPath::new("data.locations"),
            code_fields: paths(&["region"]),
            name_fields: paths(&["name"]),
            policy: SelectionPolicy {
                preferred_code: None,
                filter: Some(EntryFilter {
                    field: FieldPath::new("proxyType"),
                    equals: json!(0),
                }),
                shuffle: true,
                limit: 5,
            },
        },
        servers: ServerSource::Lookup {
            request: RequestTemplate::post(
                "/api/server/list/",
                Some(json!({
                    "protocol": "{protocol}",
                    "region": "{entry.region}",
                    "type": "{entry.type}"
                })),
            ),
            layout: ServerLayout {
                roots: paths(&["data.0"]),
                host_fields: paths(&["addresses.0", "address", "host"]),
                port_fields: paths(&["port"]),
                username_fields: paths(&["username"]),
                password_fields: paths(&["password"]),
                signature_fields: Vec::new(),
            },
        },
        credentials: CredentialSource::Server,
    }
}

//! Request templating: placeholder substitution and header assembly

use crate::config::{RequestTemplate, VendorProfile};
use crate::extract::FieldPath;
use crate::http::ApiRequest;
use crate::resolver::ApiEndpoint;
use serde_json::Value;
use std::time::Duration;

/// Values available to `{name}` placeholders in request bodies.
///
/// A body string consisting of exactly one placeholder is replaced by the
/// value; `{entry.<path>}` copies the value at `<path>` of the current
/// catalog entry, keeping its JSON type. Unknown placeholders stay literal.
#[derive(Debug, Clone, Default)]
pub struct TemplateVars {
    pub udid: String,
    pub user_agent: String,
    pub app_version: String,
    pub protocol: String,
    /// IANA zone reported in device fingerprints
    pub time_zone: String,
    pub signature: Option<String>,
    pub entry: Option<Value>,
}

impl TemplateVars {
    /// Fresh anonymous device identity for one run
    pub fn for_profile(profile: &VendorProfile) -> Self {
        Self {
            udid: uuid::Uuid::new_v4().to_string(),
            user_agent: profile.headers.user_agent.clone(),
            app_version: profile.app_version.clone(),
            protocol: profile.scheme.as_str().to_string(),
            time_zone: host_time_zone(),
            signature: None,
            entry: None,
        }
    }

    pub fn with_signature(&self, signature: &str) -> Self {
        Self {
            signature: Some(signature.to_string()),
            ..self.clone()
        }
    }

    pub fn with_entry(&self, entry: &Value) -> Self {
        Self {
            entry: Some(entry.clone()),
            ..self.clone()
        }
    }

    fn resolve(&self, name: &str) -> Option<Value> {
        match name {
            "udid" => Some(Value::String(self.udid.clone())),
            "user_agent" => Some(Value::String(self.user_agent.clone())),
            "app_version" => Some(Value::String(self.app_version.clone())),
            "protocol" => Some(Value::String(self.protocol.clone())),
            "time_zone" => Some(Value::String(self.time_zone.clone())),
            "signature" => self.signature.clone().map(Value::String),
            _ => {
                let path = name.strip_prefix("entry.")?;
                FieldPath::new(path).lookup(self.entry.as_ref()?).cloned()
            }
        }
    }

    pub fn render(&self, template: &Value) -> Value {
        match template {
            Value::String(s) => s
                .strip_prefix('{')
                .and_then(|rest| rest.strip_suffix('}'))
                .and_then(|name| self.resolve(name))
                .unwrap_or_else(|| template.clone()),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.render(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.render(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

/// Host time zone: `TZ`, else the `/etc/localtime` link target, else UTC
pub fn host_time_zone() -> String {
    std::env::var("TZ")
        .ok()
        .as_deref()
        .and_then(zone_name)
        .or_else(|| {
            std::fs::read_link("/etc/localtime")
                .ok()
                .and_then(|target| zone_name(&target.to_string_lossy()))
        })
        .unwrap_or_else(|| "UTC".to_string())
}

/// `Europe/Berlin` from `Europe/Berlin`, `:Europe/Berlin` or a zoneinfo path
fn zone_name(raw: &str) -> Option<String> {
    let raw = raw.trim().trim_start_matches(':');
    let name = match raw.split_once("zoneinfo/") {
        Some((_, zone)) => zone,
        None if raw.starts_with('/') => return None,
        None => raw,
    };
    (!name.is_empty()).then(|| name.to_string())
}

/// Assemble a concrete request: URL, vendor header template, per-call
/// headers and rendered body.
pub fn build_request(
    profile: &VendorProfile,
    endpoint: &ApiEndpoint,
    template: &RequestTemplate,
    vars: &TemplateVars,
    timeout: Duration,
) -> ApiRequest {
    let mut request = ApiRequest::new(template.method, endpoint.url(&template.path), timeout)
        .header("user-agent", profile.headers.user_agent.as_str());

    if let Some(accept) = &profile.headers.accept {
        request = request.header("accept", accept.as_str());
    }
    for (name, value) in profile.headers.extra.iter().chain(&template.headers) {
        request = request.header(name.as_str(), value.as_str());
    }
    if let Some(body) = &template.body {
        request = request.json(vars.render(body));
    }
    request
}

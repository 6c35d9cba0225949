//! API domain resolution
//!
//! Primary domains are probed in order and the first healthy one wins. Only
//! when every primary fails are the backup descriptor sources fetched; each
//! descriptor lists further domains, probed the same way. Probing is strictly
//! sequential and a failed probe is never retried.

use crate::config::{HealthCheck, VendorProfile};
use crate::error::FetchError;
use crate::extract::FieldPath;
use crate::http::{ApiRequest, Transport};
use tracing::{debug, info, warn};

/// Base URL selected for the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoint {
    pub base_url: String,
    /// Whether a health check confirmed the domain
    pub verified: bool,
}

impl ApiEndpoint {
    pub fn verified(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            verified: true,
        }
    }

    pub fn unverified(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            verified: false,
        }
    }

    /// Join `path` onto the base URL; absolute URLs pass through
    pub fn url(&self, path: &str) -> String {
        join(&self.base_url, path)
    }
}

fn join(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Pick the API domain for this run
pub async fn resolve(
    transport: &dyn Transport,
    profile: &VendorProfile,
) -> Result<ApiEndpoint, FetchError> {
    let domains = &profile.domains;

    let Some(health) = &domains.health else {
        let base = domains
            .primary
            .first()
            .ok_or(FetchError::NoReachableDomain { tried: 0 })?;
        info!("No health check configured, using {}", base);
        return Ok(ApiEndpoint::unverified(base));
    };

    let mut tried = 0;
    for domain in &domains.primary {
        tried += 1;
        if is_available(transport, profile, health, domain, true).await {
            info!("API domain: {}", domain);
            return Ok(ApiEndpoint::verified(domain));
        }
    }

    for source in &domains.backup_sources {
        let listed = fetch_descriptor(transport, profile, source, &domains.backup_field).await;
        for domain in listed {
            tried += 1;
            if is_available(transport, profile, health, &domain, !health.lenient_backups).await {
                info!("API domain (from backup {}): {}", source, domain);
                return Ok(ApiEndpoint::verified(&domain));
            }
        }
    }

    Err(FetchError::NoReachableDomain { tried })
}

async fn is_available(
    transport: &dyn Transport,
    profile: &VendorProfile,
    health: &HealthCheck,
    domain: &str,
    require_signal: bool,
) -> bool {
    let request = ApiRequest::get(join(domain, &health.path), profile.timeouts.health())
        .header("user-agent", profile.headers.user_agent.as_str());

    let response = match transport.execute(request).await {
        Ok(response) if response.is_success() => response,
        Ok(response) => {
            debug!("{} unavailable: HTTP {}", domain, response.status);
            return false;
        }
        Err(e) => {
            debug!("{} unavailable: {}", domain, e);
            return false;
        }
    };

    if !require_signal {
        return true;
    }

    let signalled = response
        .json()
        .is_some_and(|body| health.field.lookup(&body) == Some(&health.expect));
    if !signalled {
        debug!("{} answered without the available signal: {}", domain, response.body);
    }
    signalled
}

async fn fetch_descriptor(
    transport: &dyn Transport,
    profile: &VendorProfile,
    source: &str,
    field: &FieldPath,
) -> Vec<String> {
    let request = ApiRequest::get(source, profile.timeouts.health())
        .header("user-agent", profile.headers.user_agent.as_str());

    let body = match transport.execute(request).await {
        Ok(response) if response.is_success() => response.json(),
        Ok(response) => {
            warn!("Backup source {} returned HTTP {}", source, response.status);
            None
        }
        Err(e) => {
            warn!("Backup source {} failed: {}", source, e);
            None
        }
    };

    let domains: Vec<String> = body
        .as_ref()
        .and_then(|b| field.lookup(b))
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|d| d.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    debug!("Backup source {} lists {} domains", source, domains.len());
    domains
}

//! Candidate selection
//!
//! Fetches the vendor's location catalog, narrows it with the configured
//! [`SelectionPolicy`]. Concrete server details are resolved one entry at a
//! time, either from the entry itself or with one extra lookup call, so the
//! caller only pays for the entries it actually tries.

use crate::config::{SelectionPolicy, ServerLayout, ServerSource, VendorProfile};
use crate::error::{FetchError, Stage};
use crate::extract::{self, FieldPath};
use crate::http::{Transport, send_checked};
use crate::proxy::Location;
use crate::resolver::ApiEndpoint;
use crate::template::{TemplateVars, build_request};
use crate::tokens::TokenEnvelope;
use rand::Rng;
use rand::seq::SliceRandom;
use serde_json::Value;
use tracing::{debug, info, warn};

/// One catalog row: parsed location plus the raw JSON for later lookups
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub location: Location,
    pub raw: Value,
}

/// Connection details resolved for one catalog entry
#[derive(Debug, Clone, PartialEq)]
pub struct ServerDetails {
    pub location: Location,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Per-server value exchanged for a proxy-auth token
    pub signature: Option<String>,
}

/// Catalog fetch and policy narrowing; details are resolved per entry later
pub async fn select_locations<R: Rng + ?Sized>(
    transport: &dyn Transport,
    profile: &VendorProfile,
    endpoint: &ApiEndpoint,
    token: &TokenEnvelope,
    vars: &TemplateVars,
    rng: &mut R,
) -> Result<Vec<CatalogEntry>, FetchError> {
    let catalog = fetch_catalog(transport, profile, endpoint, token, vars).await?;
    let total = catalog.len();

    let chosen = apply_policy(catalog, &profile.catalog.policy, rng);
    info!("Selected {} of {} locations", chosen.len(), total);
    if chosen.is_empty() {
        return Err(FetchError::NoCandidatesAvailable(format!(
            "no location among {} matched the selection policy",
            total
        )));
    }
    Ok(chosen)
}

/// Retrieve and parse the location list
pub async fn fetch_catalog(
    transport: &dyn Transport,
    profile: &VendorProfile,
    endpoint: &ApiEndpoint,
    token: &TokenEnvelope,
    vars: &TemplateVars,
) -> Result<Vec<CatalogEntry>, FetchError> {
    let catalog = &profile.catalog;
    info!("Fetching location catalog");

    let request = build_request(
        profile,
        endpoint,
        &catalog.request,
        vars,
        profile.timeouts.request(),
    )
    .bearer(&token.value);
    let response = send_checked(transport, Stage::Catalog, request).await?;

    let malformed = || FetchError::MalformedResponse {
        stage: Stage::Catalog,
        tried: vec![catalog.list_field.to_string()],
        body: response.body.clone(),
    };
    let body = response.json().ok_or_else(malformed)?;
    let items = extract::first_array(&body, std::slice::from_ref(&catalog.list_field))
        .ok_or_else(malformed)?;

    let entries: Vec<CatalogEntry> = items
        .iter()
        .map(|raw| CatalogEntry {
            location: Location {
                code: extract::first_string(raw, &catalog.code_fields),
                name: extract::first_string(raw, &catalog.name_fields),
            },
            raw: raw.clone(),
        })
        .collect();

    info!("Found {} locations", entries.len());
    Ok(entries)
}

/// Filter, shuffle, promote the preferred code, truncate
pub fn apply_policy<R: Rng + ?Sized>(
    entries: Vec<CatalogEntry>,
    policy: &SelectionPolicy,
    rng: &mut R,
) -> Vec<CatalogEntry> {
    let mut chosen: Vec<CatalogEntry> = match &policy.filter {
        Some(filter) => entries
            .into_iter()
            .filter(|e| filter.field.lookup(&e.raw) == Some(&filter.equals))
            .collect(),
        None => entries,
    };

    if policy.shuffle {
        chosen.shuffle(rng);
    }

    if let Some(code) = &policy.preferred_code {
        let position = chosen.iter().position(|e| {
            e.location
                .code
                .as_deref()
                .is_some_and(|c| c.eq_ignore_ascii_case(code))
        });
        match position {
            Some(index) => {
                let preferred = chosen.remove(index);
                chosen.insert(0, preferred);
            }
            None => debug!("Preferred location {} not offered", code),
        }
    }

    chosen.truncate(policy.limit);
    chosen
}

/// Resolve connection details for one entry, `None` if it cannot be resolved
pub async fn resolve_server(
    transport: &dyn Transport,
    profile: &VendorProfile,
    endpoint: &ApiEndpoint,
    token: &TokenEnvelope,
    vars: &TemplateVars,
    entry: &CatalogEntry,
) -> Option<ServerDetails> {
    let resolved = match &profile.servers {
        ServerSource::Inline { layout } => read_server(layout, &entry.raw, &entry.location),
        ServerSource::Lookup { request, layout } => {
            let request = build_request(
                profile,
                endpoint,
                request,
                &vars.with_entry(&entry.raw),
                profile.timeouts.request(),
            )
            .bearer(&token.value);

            match send_checked(transport, Stage::ServerDetails, request).await {
                Ok(response) => response
                    .json()
                    .and_then(|body| read_server(layout, &body, &entry.location)),
                Err(e) => {
                    warn!("Server lookup for {} failed: {}", entry.location, e);
                    return None;
                }
            }
        }
    };

    match &resolved {
        Some(server) => debug!("{} -> {}:{}", server.location, server.host, server.port),
        None => warn!("No server details for {}", entry.location),
    }
    resolved
}

/// Read host/port/credentials from the first layout root that has them
pub fn read_server(layout: &ServerLayout, value: &Value, location: &Location) -> Option<ServerDetails> {
    let root_all = [FieldPath::new("")];
    let roots = if layout.roots.is_empty() { &root_all[..] } else { &layout.roots[..] };

    roots.iter().find_map(|root| {
        let node = root.lookup(value)?;
        let host = extract::first_string(node, &layout.host_fields)?;
        let port = extract::first_port(node, &layout.port_fields)?;
        Some(ServerDetails {
            location: location.clone(),
            host,
            port,
            username: extract::first_string(node, &layout.username_fields),
            password: extract::first_string(node, &layout.password_fields),
            signature: extract::first_string(node, &layout.signature_fields),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, EntryFilter};
    use crate::http::testing::ScriptedTransport;
    use crate::tokens::TokenScope;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use serde_json::json;

    const COUNTRIES: &str = "/entrypoints/countries";
    const LOCATIONS: &str = "/api/location/list";
    const SERVERS: &str = "/api/server/list";

    fn token() -> TokenEnvelope {
        TokenEnvelope {
            value: "acc".to_string(),
            scope: TokenScope::Security,
        }
    }

    fn profile(vendor: &str) -> (VendorProfile, ApiEndpoint, TemplateVars) {
        let profile = Config::default().vendor(vendor).unwrap().clone();
        let endpoint = ApiEndpoint::verified(&profile.domains.primary[0]);
        let vars = TemplateVars::for_profile(&profile);
        (profile, endpoint, vars)
    }

    fn entry(raw: Value) -> CatalogEntry {
        CatalogEntry {
            location: Location {
                code: raw["region"].as_str().map(str::to_string),
                name: None,
            },
            raw,
        }
    }

    fn locations(count: usize) -> Vec<CatalogEntry> {
        (0..count)
            .map(|i| entry(json!({"region": format!("r{i}"), "proxyType": i % 2, "type": 1})))
            .collect()
    }

    fn codes(entries: &[CatalogEntry]) -> Vec<String> {
        entries
            .iter()
            .map(|e| e.location.code.clone().unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_preferred_code_moves_first() {
        let policy = SelectionPolicy {
            preferred_code: Some("R3".to_string()),
            filter: None,
            shuffle: false,
            limit: 3,
        };
        let chosen = apply_policy(locations(6), &policy, &mut StdRng::seed_from_u64(1));
        assert_eq!(codes(&chosen), vec!["r3", "r0", "r1"]);
    }

    #[test]
    fn test_missing_preferred_keeps_vendor_order() {
        let policy = SelectionPolicy {
            preferred_code: Some("ZZ".to_string()),
            filter: None,
            shuffle: false,
            limit: 2,
        };
        let chosen = apply_policy(locations(4), &policy, &mut StdRng::seed_from_u64(1));
        assert_eq!(codes(&chosen), vec!["r0", "r1"]);
    }

    #[test]
    fn test_sampling_is_bounded_and_filtered() {
        let policy = SelectionPolicy {
            preferred_code: None,
            filter: Some(EntryFilter {
                field: FieldPath::new("proxyType"),
                equals: json!(0),
            }),
            shuffle: true,
            limit: 5,
        };

        for seed in 0..20 {
            let chosen = apply_policy(locations(30), &policy, &mut StdRng::seed_from_u64(seed));
            assert_eq!(chosen.len(), 5);
            assert!(chosen.iter().all(|e| e.raw["proxyType"] == 0));
        }

        let few = apply_policy(locations(5), &policy, &mut StdRng::seed_from_u64(3));
        assert_eq!(few.len(), 3);
        assert!(few.iter().all(|e| e.raw["proxyType"] == 0));
    }

    #[test]
    fn test_read_server_falls_through_roots() {
        let (profile, _, _) = profile("urban");
        let layout = profile.servers.layout();
        let location = Location::default();

        let direct = json!({"address": {"primary": {"host": "us1.urban.test", "port": 8080}}});
        let server = read_server(layout, &direct, &location).unwrap();
        assert_eq!((server.host.as_str(), server.port), ("us1.urban.test", 8080));
        assert_eq!(server.signature, None);

        let nested = json!({
            "servers": {"elements": [{
                "address": {"primary": {"host": "us2.urban.test", "port_min": 3128}},
                "signature": "sig-abc"
            }]}
        });
        let server = read_server(layout, &nested, &location).unwrap();
        assert_eq!((server.host.as_str(), server.port), ("us2.urban.test", 3128));
        assert_eq!(server.signature.as_deref(), Some("sig-abc"));

        assert!(read_server(layout, &json!({"title": "USA"}), &location).is_none());
    }

    #[tokio::test]
    async fn test_urban_catalog_prefers_us() {
        let (profile, endpoint, vars) = profile("urban");
        let body = json!({"countries": {"elements": [
            {"title": "Germany", "code": {"iso2": "DE"},
             "address": {"primary": {"host": "de.urban.test", "port": 8000}}},
            {"title": "United States", "code": {"iso2": "US"},
             "servers": {"elements": [{"address": {"primary": {"host": "us.urban.test", "port": 8001}},
                                       "signature": "sig-us"}]}}
        ]}});
        let transport = ScriptedTransport::new().reply(COUNTRIES, 200, &body.to_string());

        let entries = select_locations(
            &transport,
            &profile,
            &endpoint,
            &token(),
            &vars,
            &mut StdRng::seed_from_u64(7),
        )
        .await
        .unwrap();
        assert_eq!(entries.len(), 2);

        let first = resolve_server(&transport, &profile, &endpoint, &token(), &vars, &entries[0])
            .await
            .unwrap();
        assert_eq!(first.host, "us.urban.test");
        assert_eq!(first.location.name.as_deref(), Some("United States"));
        assert_eq!(first.signature.as_deref(), Some("sig-us"));

        let second = resolve_server(&transport, &profile, &endpoint, &token(), &vars, &entries[1])
            .await
            .unwrap();
        assert_eq!(second.host, "de.urban.test");

        assert_eq!(transport.requests().len(), 1);
        let request = &transport.requests()[0];
        assert_eq!(request.authorization(), Some("Bearer acc"));
        assert_eq!(request.headers.get("x-client-app").unwrap(), "URBAN_VPN_BROWSER_EXTENSION");
        assert!(request.body.is_none());
    }

    #[tokio::test]
    async fn test_veepn_lookup_only_when_resolved() {
        let (profile, endpoint, vars) = profile("veepn");
        let catalog = json!({"data": {"locations": [
            {"region": "de", "name": "Germany", "type": 2, "proxyType": 0},
            {"region": "us", "name": "USA", "type": 2, "proxyType": 1}
        ]}});
        let server = json!({"data": [{
            "addresses": ["1.2.3.4"], "port": 443, "username": "u", "password": "p"
        }]});
        let transport = ScriptedTransport::new()
            .reply(LOCATIONS, 200, &catalog.to_string())
            .reply(SERVERS, 200, &server.to_string());

        let entries = select_locations(
            &transport,
            &profile,
            &endpoint,
            &token(),
            &vars,
            &mut StdRng::seed_from_u64(7),
        )
        .await
        .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(transport.calls_to(SERVERS), 0);

        let server = resolve_server(&transport, &profile, &endpoint, &token(), &vars, &entries[0])
            .await
            .unwrap();
        assert_eq!(server.host, "1.2.3.4");
        assert_eq!(server.username.as_deref(), Some("u"));
        assert_eq!(server.password.as_deref(), Some("p"));

        assert_eq!(transport.calls_to(SERVERS), 1);
        let lookup = transport
            .requests()
            .into_iter()
            .find(|r| r.url.contains(SERVERS))
            .unwrap();
        assert_eq!(
            lookup.body,
            Some(json!({"protocol": "https", "region": "de", "type": 2}))
        );
    }

    #[tokio::test]
    async fn test_failed_lookup_resolves_nothing() {
        let (profile, endpoint, vars) = profile("veepn");
        let de = entry(json!({"region": "de", "type": 2, "proxyType": 0}));
        let transport = ScriptedTransport::new()
            .reply(SERVERS, 500, "error")
            .reply(SERVERS, 200, r#"{"data":[]}"#);

        let rejected = resolve_server(&transport, &profile, &endpoint, &token(), &vars, &de).await;
        let empty = resolve_server(&transport, &profile, &endpoint, &token(), &vars, &de).await;

        assert!(rejected.is_none());
        assert!(empty.is_none());
        assert_eq!(transport.calls_to(SERVERS), 2);
    }

    #[tokio::test]
    async fn test_no_free_locations() {
        let (profile, endpoint, vars) = profile("veepn");
        let catalog = json!({"data": {"locations": [{"region": "us", "proxyType": 1}]}});
        let transport = ScriptedTransport::new().reply(LOCATIONS, 200, &catalog.to_string());

        let err = select_locations(
            &transport,
            &profile,
            &endpoint,
            &token(),
            &vars,
            &mut StdRng::seed_from_u64(7),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, FetchError::NoCandidatesAvailable(_)));
        assert_eq!(transport.calls_to(SERVERS), 0);
    }

    #[tokio::test]
    async fn test_catalog_without_list_is_malformed() {
        let (profile, endpoint, vars) = profile("urban");
        let transport = ScriptedTransport::new().reply(COUNTRIES, 200, r#"{"countries":{}}"#);

        let err = fetch_catalog(&transport, &profile, &endpoint, &token(), &vars)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FetchError::MalformedResponse { stage: Stage::Catalog, .. }
        ));
    }
}

//! End-to-end proxy acquisition
//!
//! Domain resolution → token chain → candidate selection → validation.
//! Each stage is awaited before the next begins and the first failure
//! aborts the run. Selected locations are walked one at a time: details,
//! credentials and the probe for an entry are all done before the next
//! entry is touched, and the walk stops at the first working proxy.
//! Nothing here touches process lifecycle.

use crate::config::{CredentialSource, ProbeConfig, VendorProfile};
use crate::error::FetchError;
use crate::http::Transport;
use crate::proxy::{ProxyCandidate, ValidatedProxy};
use crate::resolver::{self, ApiEndpoint};
use crate::selector::{self, ServerDetails};
use crate::template::TemplateVars;
use crate::tokens::{self, TokenEnvelope};
use crate::validator::Validator;
use rand::Rng;
use tracing::{debug, info};

/// Acquire one validated proxy from `profile`'s vendor
pub async fn acquire<R: Rng + ?Sized>(
    transport: &dyn Transport,
    profile: &VendorProfile,
    probe: &ProbeConfig,
    rng: &mut R,
) -> Result<ValidatedProxy, FetchError> {
    info!("Acquiring {} proxy from {}", profile.scheme, profile.name);

    let endpoint = resolver::resolve(transport, profile).await?;
    let vars = TemplateVars::for_profile(profile);
    let token = tokens::run_chain(transport, profile, &endpoint, &vars).await?;
    let entries =
        selector::select_locations(transport, profile, &endpoint, &token, &vars, rng).await?;

    let mut validator = Validator::new(transport, profile.scheme, probe, entries.len());
    let mut probed: Vec<ProxyCandidate> = Vec::with_capacity(entries.len());

    for entry in &entries {
        let Some(server) =
            selector::resolve_server(transport, profile, &endpoint, &token, &vars, entry).await
        else {
            continue;
        };

        let candidate = attach_credentials(transport, profile, &endpoint, &token, &vars, server).await;
        if probed.contains(&candidate) {
            debug!("Skipping duplicate candidate {}", candidate.addr());
            continue;
        }
        if let Some(proxy) = validator.check(&candidate).await {
            return Ok(proxy);
        }
        probed.push(candidate);
    }

    if validator.tried() == 0 {
        return Err(FetchError::NoCandidatesAvailable(format!(
            "server details unavailable for all {} selected locations",
            entries.len()
        )));
    }
    Err(validator.exhausted())
}

/// Turn resolved server details into a candidate, minting a proxy-auth
/// token for signed servers when the vendor uses token credentials
async fn attach_credentials(
    transport: &dyn Transport,
    profile: &VendorProfile,
    endpoint: &ApiEndpoint,
    token: &TokenEnvelope,
    vars: &TemplateVars,
    server: ServerDetails,
) -> ProxyCandidate {
    let (username, password) = match &profile.credentials {
        CredentialSource::Server => (server.username, server.password),
        CredentialSource::Token { password } => {
            let user_token = match &server.signature {
                Some(signature) => {
                    tokens::authorize_server(transport, profile, endpoint, token, signature, vars)
                        .await
                }
                None => {
                    debug!("No signature for {}, using {} token", server.host, token.scope);
                    token.clone()
                }
            };
            (Some(user_token.value), Some(password.clone()))
        }
    };

    ProxyCandidate {
        host: server.host,
        port: server.port,
        username,
        password,
        location: server.location,
    }
}

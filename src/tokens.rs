//! Token chain client
//!
//! Runs the vendor's ordered token exchanges:
//! 1. anonymous registration - identity token
//! 2. security exchange - access token, authorized by the identity token
//! 3. proxy-auth (optional, per server) - signature plus access token
//!
//! Each stage's token is pulled from the response with the stage's ordered
//! field list. Any non-2xx aborts the chain; the proxy-auth stage alone
//! degrades to the security token on failure.

use crate::config::{TokenStage, VendorProfile};
use crate::error::{FetchError, Stage};
use crate::extract;
use crate::http::{Transport, send_checked};
use crate::resolver::ApiEndpoint;
use crate::template::{TemplateVars, build_request};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenScope {
    Registration,
    Security,
    ProxyAuth,
}

impl fmt::Display for TokenScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenScope::Registration => write!(f, "registration"),
            TokenScope::Security => write!(f, "security"),
            TokenScope::ProxyAuth => write!(f, "proxy-auth"),
        }
    }
}

/// Bearer token plus the scope it was issued for
#[derive(Clone, PartialEq, Eq)]
pub struct TokenEnvelope {
    pub value: String,
    pub scope: TokenScope,
}

impl fmt::Debug for TokenEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenEnvelope")
            .field("scope", &self.scope)
            .field("value", &format_args!("<{} chars>", self.value.len()))
            .finish()
    }
}

/// Run every configured token stage and return the last stage's token
pub async fn run_chain(
    transport: &dyn Transport,
    profile: &VendorProfile,
    endpoint: &ApiEndpoint,
    vars: &TemplateVars,
) -> Result<TokenEnvelope, FetchError> {
    let mut current: Option<TokenEnvelope> = None;

    for stage in &profile.tokens {
        let token = exchange(transport, profile, endpoint, stage, current.as_ref(), vars).await?;
        info!("Got {} token", token.scope);
        current = Some(token);
    }

    current.ok_or_else(|| FetchError::TokenChainBroken {
        stage: Stage::Token(TokenScope::Registration),
        reason: format!("{} has no token stages configured", profile.name),
    })
}

/// Obtain the token used as proxy username for a signed server.
///
/// Falls back to `security` when no proxy-auth stage is configured or the
/// exchange fails for any reason.
pub async fn authorize_server(
    transport: &dyn Transport,
    profile: &VendorProfile,
    endpoint: &ApiEndpoint,
    security: &TokenEnvelope,
    signature: &str,
    vars: &TemplateVars,
) -> TokenEnvelope {
    let Some(stage) = &profile.proxy_auth else {
        debug!("No proxy-auth stage configured, using security token");
        return security.clone();
    };

    let vars = vars.with_signature(signature);
    match exchange(transport, profile, endpoint, stage, Some(security), &vars).await {
        Ok(token) => {
            info!("Got {} token", token.scope);
            token
        }
        Err(e) => {
            warn!("Proxy auth exchange failed, using security token as username: {}", e);
            security.clone()
        }
    }
}

async fn exchange(
    transport: &dyn Transport,
    profile: &VendorProfile,
    endpoint: &ApiEndpoint,
    stage: &TokenStage,
    previous: Option<&TokenEnvelope>,
    vars: &TemplateVars,
) -> Result<TokenEnvelope, FetchError> {
    let id = Stage::Token(stage.scope);
    info!("Requesting {} token", stage.scope);

    let mut request = build_request(
        profile,
        endpoint,
        &stage.request,
        vars,
        profile.timeouts.request(),
    );
    if stage.authorize {
        let previous = previous.ok_or_else(|| FetchError::TokenChainBroken {
            stage: id,
            reason: "stage requires a token from an earlier stage".to_string(),
        })?;
        request = request.bearer(&previous.value);
    }

    let response = send_checked(transport, id, request).await?;
    debug!("{} response: {}", stage.scope, response.body);

    let body: Value = serde_json::from_str(&response.body).map_err(|e| {
        FetchError::TokenChainBroken {
            stage: id,
            reason: format!("response is not JSON: {}", e),
        }
    })?;

    let value = extract::require_string(&body, &stage.fields).map_err(|miss| {
        FetchError::MalformedResponse {
            stage: id,
            tried: miss.tried,
            body: response.body.clone(),
        }
    })?;

    Ok(TokenEnvelope {
        value,
        scope: stage.scope,
    })
}

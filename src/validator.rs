//! Live proxy validation
//!
//! Candidates are probed strictly in the order they are offered, one
//! request each through the candidate to the probe target. The first 2xx
//! wins; any failure moves on to the next candidate without retrying.
//! Candidates are handed over one at a time so their details can be
//! resolved just before the probe.

use crate::config::ProbeConfig;
use crate::error::FetchError;
use crate::extract::{self, FieldPath};
use crate::http::Transport;
use crate::proxy::{ProxyCandidate, ProxyScheme, ValidatedProxy};
use tracing::{info, warn};

/// Probes candidates and counts how many were tried
pub struct Validator<'a> {
    transport: &'a dyn Transport,
    scheme: ProxyScheme,
    probe: &'a ProbeConfig,
    expected: usize,
    tried: usize,
}

impl<'a> Validator<'a> {
    /// `expected` is only used for progress logging
    pub fn new(
        transport: &'a dyn Transport,
        scheme: ProxyScheme,
        probe: &'a ProbeConfig,
        expected: usize,
    ) -> Self {
        Self {
            transport,
            scheme,
            probe,
            expected,
            tried: 0,
        }
    }

    pub fn tried(&self) -> usize {
        self.tried
    }

    /// Probe one candidate; `Some` if it carried the request
    pub async fn check(&mut self, candidate: &ProxyCandidate) -> Option<ValidatedProxy> {
        self.tried += 1;
        let url = candidate.connection_string(self.scheme);
        info!(
            "Testing {} via {} ({}/{})",
            candidate.location,
            candidate.addr(),
            self.tried,
            self.expected.max(self.tried)
        );

        match self
            .transport
            .probe(&url, &self.probe.target, self.probe.timeout())
            .await
        {
            Ok(response) if response.is_success() => {
                let exit_ip = response
                    .json()
                    .and_then(|body| extract::first_string(&body, &[FieldPath::new("origin")]));
                info!(
                    "Proxy {} is working (exit IP: {})",
                    candidate.addr(),
                    exit_ip.as_deref().unwrap_or("unknown")
                );
                Some(ValidatedProxy {
                    candidate: candidate.clone(),
                    scheme: self.scheme,
                    url,
                    exit_ip,
                })
            }
            Ok(response) => {
                warn!("Proxy {} returned HTTP {}", candidate.addr(), response.status);
                None
            }
            Err(e) => {
                warn!("Proxy {} failed: {}", candidate.addr(), e);
                None
            }
        }
    }

    /// Error for a run in which no checked candidate worked
    pub fn exhausted(&self) -> FetchError {
        FetchError::AllCandidatesUnreachable { tried: self.tried }
    }
}

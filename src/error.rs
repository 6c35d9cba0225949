//! Pipeline error taxonomy
//!
//! Every stage fails fast: the first error aborts the run and is carried up
//! to the binary, which maps it to a process exit code.

use crate::config::ConfigError;
use crate::http::{ApiResponse, TransportError};
use crate::tokens::TokenScope;
use std::fmt;
use thiserror::Error;

const BODY_SNIPPET_CHARS: usize = 512;

/// Pipeline stage an error is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    DomainResolution,
    Token(TokenScope),
    Catalog,
    ServerDetails,
    Validation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::DomainResolution => write!(f, "domain resolution"),
            Stage::Token(scope) => write!(f, "{} token", scope),
            Stage::Catalog => write!(f, "location catalog"),
            Stage::ServerDetails => write!(f, "server details"),
            Stage::Validation => write!(f, "proxy validation"),
        }
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{stage}: network error: {source}")]
    Network {
        stage: Stage,
        #[source]
        source: TransportError,
    },

    #[error("{stage}: HTTP {status}: {}", snippet(.body))]
    HttpStatus {
        stage: Stage,
        status: u16,
        body: String,
    },

    #[error("{stage}: rate limited (HTTP 429): {}", snippet(.body))]
    RateLimited { stage: Stage, body: String },

    #[error("{stage}: malformed response, no value at [{}]: {}", .tried.join(", "), snippet(.body))]
    MalformedResponse {
        stage: Stage,
        tried: Vec<String>,
        body: String,
    },

    #[error("{stage}: token chain broken: {reason}")]
    TokenChainBroken { stage: Stage, reason: String },

    #[error("No reachable API domain ({tried} domains tried)")]
    NoReachableDomain { tried: usize },

    #[error("No proxy candidates available: {0}")]
    NoCandidatesAvailable(String),

    #[error("All {tried} proxy candidates unreachable")]
    AllCandidatesUnreachable { tried: usize },
}

impl FetchError {
    /// Classify a non-2xx response, flagging 429 separately
    pub fn from_status(stage: Stage, response: ApiResponse) -> Self {
        if response.status == 429 {
            FetchError::RateLimited {
                stage,
                body: response.body,
            }
        } else {
            FetchError::HttpStatus {
                stage,
                status: response.status,
                body: response.body,
            }
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited { .. })
    }

    /// Stage the failure happened in, when it is attributable to one
    pub fn stage(&self) -> Option<Stage> {
        match self {
            FetchError::Network { stage, .. }
            | FetchError::HttpStatus { stage, .. }
            | FetchError::RateLimited { stage, .. }
            | FetchError::MalformedResponse { stage, .. }
            | FetchError::TokenChainBroken { stage, .. } => Some(*stage),
            FetchError::NoReachableDomain { .. } => Some(Stage::DomainResolution),
            FetchError::NoCandidatesAvailable(_) => Some(Stage::Catalog),
            FetchError::AllCandidatesUnreachable { .. } => Some(Stage::Validation),
            FetchError::Config(_) => None,
        }
    }

    /// Non-zero process exit status for this kind of failure
    pub fn exit_code(&self) -> i32 {
        match self {
            FetchError::Config(_) => 2,
            FetchError::Network { .. } => 3,
            FetchError::HttpStatus { .. } => 4,
            FetchError::RateLimited { .. } => 5,
            FetchError::MalformedResponse { .. } => 6,
            FetchError::TokenChainBroken { .. } => 7,
            FetchError::NoReachableDomain { .. } => 10,
            FetchError::NoCandidatesAvailable(_) => 11,
            FetchError::AllCandidatesUnreachable { .. } => 12,
        }
    }
}

fn snippet(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(BODY_SNIPPET_CHARS) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FetchError::HttpStatus {
            stage: Stage::Token(TokenScope::Registration),
            status: 500,
            body: "oops".to_string(),
        };
        assert_eq!(err.to_string(), "registration token: HTTP 500: oops");

        let err = FetchError::MalformedResponse {
            stage: Stage::Token(TokenScope::Security),
            tried: vec!["token.value".to_string(), "value".to_string()],
            body: "{}".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "security token: malformed response, no value at [token.value, value]: {}"
        );

        let err = FetchError::NoReachableDomain { tried: 4 };
        assert_eq!(err.to_string(), "No reachable API domain (4 domains tried)");
    }

    #[test]
    fn test_from_status_flags_rate_limit() {
        let limited = FetchError::from_status(
            Stage::Catalog,
            ApiResponse { status: 429, body: String::new() },
        );
        assert!(limited.is_rate_limited());

        let other = FetchError::from_status(
            Stage::Catalog,
            ApiResponse { status: 503, body: String::new() },
        );
        assert!(!other.is_rate_limited());
        assert!(matches!(other, FetchError::HttpStatus { status: 503, .. }));
    }

    #[test]
    fn test_exit_codes_are_nonzero_and_distinct() {
        let errors = [
            FetchError::NoReachableDomain { tried: 0 },
            FetchError::NoCandidatesAvailable("empty".to_string()),
            FetchError::AllCandidatesUnreachable { tried: 5 },
            FetchError::TokenChainBroken {
                stage: Stage::Token(TokenScope::Registration),
                reason: "x".to_string(),
            },
            FetchError::RateLimited { stage: Stage::Catalog, body: String::new() },
        ];
        let codes: Vec<i32> = errors.iter().map(FetchError::exit_code).collect();

        assert!(codes.iter().all(|c| *c != 0));
        let mut unique = codes.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), codes.len());
    }

    #[test]
    fn test_stage_attribution() {
        assert_eq!(
            FetchError::NoReachableDomain { tried: 2 }.stage(),
            Some(Stage::DomainResolution)
        );
        assert_eq!(
            FetchError::AllCandidatesUnreachable { tried: 2 }.stage(),
            Some(Stage::Validation)
        );
    }

    #[test]
    fn test_snippet_truncates_long_bodies() {
        let long = "x".repeat(BODY_SNIPPET_CHARS + 10);
        let cut = snippet(&long);
        assert_eq!(cut.len(), BODY_SNIPPET_CHARS + 3);
        assert!(cut.ends_with("..."));
        assert_eq!(snippet("  short  "), "short");
    }
}

//! VPN proxy fetch - acquire a working proxy from free-tier VPN vendor APIs
//!
//! This crate bootstraps an anonymous session against a VPN vendor's
//! browser-extension API, walks its token chain, picks candidate proxy
//! servers, and returns the first one that carries live traffic.
//!
//! # Architecture
//!
//! - `config`: Vendor profiles and probe settings (TOML)
//! - `error`: Stage-tagged failure taxonomy and exit codes
//! - `http`: Transport seam and the reqwest implementation
//! - `extract`: Ordered field-path extraction from loose JSON
//! - `template`: Request body placeholders and header assembly
//! - `proxy`: Candidate and validated proxy value types
//! - `resolver`: Reachable API domain discovery
//! - `tokens`: Registration/security/proxy-auth token chain
//! - `selector`: Location catalog narrowing and server detail lookup
//! - `validator`: Live connectivity probes through candidates
//! - `pipeline`: The four stages wired together
//! - `output`: Text/JSON rendering and shell export lines
//!
//! # Usage
//!
//! ```bash
//! eval "$(vpn-proxy-fetch fetch --vendor veepn --exports-only)"
//! ```

pub mod config;
pub mod error;
pub mod extract;
pub mod http;
pub mod output;
pub mod pipeline;
pub mod proxy;
pub mod resolver;
pub mod selector;
pub mod template;
pub mod tokens;
pub mod validator;

pub use config::{Config, Overrides, VendorProfile};
pub use error::{FetchError, Stage};
pub use http::{ReqwestTransport, Transport};
pub use pipeline::acquire;
pub use proxy::{ProxyCandidate, ValidatedProxy};

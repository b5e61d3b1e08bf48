//! Production wiring for the hybrid consensus router.
//!
//! Loads a [`HybridConfig`] from TOML, reads request batches in JSON-lines
//! form, and builds a [`Router`](hybrid_router::Router) from both. The
//! `hybrid-consensus` binary is a thin CLI over this crate.

mod config;
mod requests;

pub use config::{ConfigError, HybridConfig};
pub use requests::{read_requests, RequestParseError};

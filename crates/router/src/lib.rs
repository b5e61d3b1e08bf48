//! Hybrid transaction router.
//!
//! The router classifies each request and sends it down one of two paths:
//!
//! - **Critical** → strict validation → engine actor (PBFT across the
//!   in-process cluster) → post-commit integrity check → REPLY outcome
//! - **Routine** → light validation → ordering service → executor
//!
//! Every outcome, success or failure, is counted by the shared
//! [`hybrid_metrics::MetricsCollector`] and returned as a [`RouterResult`].
//! Errors never escape the router.

mod config;
mod engine;
mod error;
mod ledger;
mod result;
mod router;
mod validation;

pub use config::RouterConfig;
pub use engine::{EngineHandle, EngineOutcome};
pub use error::RouterError;
pub use ledger::{Admission, ExecutionLedger};
pub use result::{
    ConsensusReceipt, NetworkStatus, RouterResult, TransactionReceipt, ViewChangeOutcome,
};
pub use router::{Router, RouterBuilder};
pub use validation::{validate_critical, validate_routine, ValidationError};

//! Test fixtures for hybrid consensus.
//!
//! Shared across crates' unit and integration tests:
//!
//! - Request fixtures for the tea supply-chain operations
//! - [`RecordingExecutor`]: counts calls and can fail chosen operations
//! - [`FailingOrderingService`]: refuses every routine envelope

mod executor;
pub mod fixtures;
mod ordering;

pub use executor::RecordingExecutor;
pub use ordering::FailingOrderingService;

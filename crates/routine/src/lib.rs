//! Routine path.
//!
//! Routine transactions skip agreement. They are wrapped in a
//! [`RoutineEnvelope`] and handed to an external [`OrderingService`]; the
//! replication algorithm behind that service is a black box.

mod envelope;
mod ordering;
mod path;

pub use envelope::{OrderingAck, RoutineEnvelope};
pub use ordering::{InMemoryOrderingService, OrderingService, RoutineError};
pub use path::{RoutineHandle, RoutinePath};

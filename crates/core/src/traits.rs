//! Core traits for state machines and message delivery.

use crate::{Action, Envelope, Event};
use std::time::Duration;

/// A state machine that processes events.
///
/// Every replica of the agreement protocol is one of these. Implementations
/// are:
///
/// - **Synchronous**: No async, no `.await`
/// - **Deterministic**: Same state + event = same actions
/// - **Pure-ish**: Mutates self, but performs no I/O
///
/// # Example
///
/// ```ignore
/// impl StateMachine for PbftState {
///     fn handle(&mut self, event: Event) -> Vec<Action> {
///         match event {
///             Event::SubmitCritical { request } => self.on_submit_critical(request),
///             Event::MessageReceived { from, message } => self.on_message(from, message),
///             // ... etc
///         }
///     }
///
///     fn set_time(&mut self, now: Duration) {
///         self.now = now;
///     }
/// }
/// ```
pub trait StateMachine {
    /// Process an event, returning actions to perform.
    ///
    /// Messages to peers, executor invocations and client replies are all
    /// returned as actions; the runner performs them.
    fn handle(&mut self, event: Event) -> Vec<Action>;

    /// Set the current time.
    ///
    /// Called by the runner before each `handle()` call.
    fn set_time(&mut self, now: Duration);

    /// Get the time that was last set via `set_time()`.
    fn now(&self) -> Duration;
}

/// Delivers messages between replicas.
///
/// State machines never call this directly; the runner turns
/// [`Action::Broadcast`] into one `send` per replica.
pub trait Transport {
    /// Queue a message for delivery.
    fn send(&mut self, envelope: Envelope);

    /// Take the next deliverable message, if any.
    fn next_delivery(&mut self) -> Option<Envelope>;

    /// Number of messages waiting for delivery.
    fn pending(&self) -> usize;
}

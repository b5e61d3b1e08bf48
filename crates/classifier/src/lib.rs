//! Rule-based transaction classifier.
//!
//! Decides whether a request is CRITICAL (agreement path) or ROUTINE
//! (ordering path). Rules are evaluated in order, first match wins:
//!
//! 1. Operation on the critical list
//! 2. Operation on the routine list
//! 3. Value or a numeric argument above the value threshold
//! 4. Default: routine
//!
//! Classification never fails. Unknown operations fall through to the
//! threshold and default rules.

mod classifier;
mod rules;

pub use classifier::{
    Classifier, RATIONALE_CRITICAL_OPERATION, RATIONALE_DEFAULT, RATIONALE_HIGH_VALUE,
    RATIONALE_ROUTINE_OPERATION,
};
pub use rules::RoutingRules;

//! Request fixtures.

use hybrid_types::{Argument, TransactionRequest};

/// `registerFarmer ["F1", "Alice", "Valley"]`: critical at the router.
pub fn register_farmer() -> TransactionRequest {
    TransactionRequest::new(
        "registerFarmer",
        vec!["F1".into(), "Alice".into(), "Valley".into()],
    )
    .with_client("org1")
    .with_submitted_at(1_000)
}

/// `createTeaBatch`: routine at the router, critical at admission.
pub fn create_tea_batch() -> TransactionRequest {
    TransactionRequest::new(
        "createTeaBatch",
        vec!["B1".into(), "F1".into(), "Assam".into(), "50kg".into()],
    )
    .with_client("org1")
    .with_submitted_at(1_000)
}

/// Unknown operation carrying a numeric argument of 5000.
pub fn high_value_unknown() -> TransactionRequest {
    TransactionRequest::new(
        "transferFunds",
        vec!["acct-1".into(), Argument::number(5000.0)],
    )
    .with_client("org2")
    .with_submitted_at(1_000)
}

/// The `n`th distinct critical request.
pub fn critical_request(n: u64) -> TransactionRequest {
    TransactionRequest::new(
        "registerBuyer",
        vec![format!("BUYER{n}").into(), "Acme".into()],
    )
    .with_client("org2")
    .with_submitted_at(n)
}

/// The `n`th distinct routine request.
pub fn routine_request(n: u64) -> TransactionRequest {
    TransactionRequest::new("placeBid", vec![format!("B{n}").into(), "10".into()])
        .with_client("org3")
        .with_submitted_at(n)
}

//! Business-operation executor contract.

use async_trait::async_trait;
use hybrid_types::{Argument, OperationResult};
use serde_json::json;

/// Runs domain operations once consensus has finished.
///
/// Implementations own the ledger. They are called at most once per
/// committed request on the local replica.
#[async_trait]
pub trait BusinessExecutor: Send + Sync {
    /// Execute `operation` with its arguments.
    async fn execute(&self, operation: &str, arguments: &[Argument]) -> OperationResult;
}

/// Executor that acknowledges every operation without side effects.
///
/// Echoes the operation and its arguments back as the result.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcknowledgingExecutor;

#[async_trait]
impl BusinessExecutor for AcknowledgingExecutor {
    async fn execute(&self, operation: &str, arguments: &[Argument]) -> OperationResult {
        let args: Vec<String> = arguments.iter().map(ToString::to_string).collect();
        Ok(json!({
            "operation": operation,
            "arguments": args,
            "status": "acknowledged",
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acknowledging_executor_echoes() {
        let result = AcknowledgingExecutor
            .execute("registerFarmer", &["F1".into(), Argument::number(3.0)])
            .await
            .unwrap();
        assert_eq!(result["operation"], "registerFarmer");
        assert_eq!(result["arguments"][1], "3");
    }
}

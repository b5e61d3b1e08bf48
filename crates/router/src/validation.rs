//! Pre-dispatch request validation.
//!
//! A request that fails validation never reaches the engine and never
//! consumes a sequence number.

use hybrid_types::TransactionRequest;

/// Why a request was refused before dispatch.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// Operation name is empty.
    #[error("Operation name is empty")]
    EmptyOperation,

    /// Operation name has characters outside `[A-Za-z0-9_]`.
    #[error("Operation name {0:?} may only contain ASCII alphanumerics and '_'")]
    InvalidOperation(String),

    /// Client identity is empty.
    #[error("Client identity is empty")]
    EmptyClient,

    /// A text argument is empty or whitespace.
    #[error("Argument {index} is blank")]
    BlankArgument {
        /// Position of the argument.
        index: usize,
    },

    /// Value is negative, NaN or infinite.
    #[error("Value {0} must be finite and non-negative")]
    InvalidValue(f64),

    /// More arguments than allowed.
    #[error("{count} arguments exceed the maximum of {max}")]
    TooManyArguments {
        /// Arguments given.
        count: usize,
        /// Configured maximum.
        max: usize,
    },
}

/// Light checks for the routine path.
pub fn validate_routine(
    request: &TransactionRequest,
    max_arguments: usize,
) -> Result<(), ValidationError> {
    if request.operation().trim().is_empty() {
        return Err(ValidationError::EmptyOperation);
    }
    let count = request.arguments().len();
    if count > max_arguments {
        return Err(ValidationError::TooManyArguments {
            count,
            max: max_arguments,
        });
    }
    Ok(())
}

/// Strict checks for the agreement path.
pub fn validate_critical(
    request: &TransactionRequest,
    max_arguments: usize,
) -> Result<(), ValidationError> {
    validate_routine(request, max_arguments)?;

    let operation = request.operation();
    if !operation
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(ValidationError::InvalidOperation(operation.to_string()));
    }
    if request.client().as_str().trim().is_empty() {
        return Err(ValidationError::EmptyClient);
    }
    if let Some(index) = request.arguments().iter().position(|a| a.is_blank()) {
        return Err(ValidationError::BlankArgument { index });
    }
    if let Some(value) = request.value() {
        if !value.is_finite() || value < 0.0 {
            return Err(ValidationError::InvalidValue(value));
        }
    }
    Ok(())
}

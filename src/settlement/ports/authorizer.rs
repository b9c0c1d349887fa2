//! Port for the external service that raises spending allowances.

use crate::settlement::domain::LedgerAddress;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for allowance authorization calls.
pub type AuthorizerResult<T> = Result<T, AuthorizerError>;

/// Raises the allowance `owner` grants to `spender` for `token`.
///
/// Implementations return only once the allowance change is confirmed.
#[async_trait]
pub trait AllowanceAuthorizer: Send + Sync {
    /// Requests an allowance increase.
    async fn raise_allowance(
        &self,
        owner: &LedgerAddress,
        token: &LedgerAddress,
        spender: &LedgerAddress,
    ) -> AuthorizerResult<()>;
}

/// Errors returned by allowance authorizers.
#[derive(Debug, Clone, Error)]
pub enum AuthorizerError {
    /// The authorizer is not configured for use.
    #[error("allowance authorizer is not configured: {0}")]
    NotConfigured(String),

    /// The authorizer refused the request.
    #[error("allowance authorization refused: {0}")]
    Refused(String),

    /// The authorizer could not be reached or answered unexpectedly.
    #[error("allowance authorizer transport error: {0}")]
    Transport(Arc<dyn std::error::Error + Send + Sync>),
}

impl AuthorizerError {
    /// Wraps a transport failure.
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Arc::new(err))
    }
}

//! HTTP client for the external allowance authorization service.
//!
//! The service signs an approval on the owner's behalf. It is called with
//! `POST {base_url}/api/approve-escrow` and answers `{"success": true}` once
//! the approval has been confirmed, or `{"error": "..."}` otherwise.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::settlement::{
    domain::LedgerAddress,
    ports::{AllowanceAuthorizer, AuthorizerError, AuthorizerResult},
};

const APPROVE_PATH: &str = "/api/approve-escrow";

/// Allowance authorizer that calls the approval service over HTTP.
#[derive(Debug, Clone)]
pub struct HttpAllowanceAuthorizer {
    client: Client,
    endpoint: String,
}

#[derive(Debug, Serialize)]
struct ApproveRequest<'a> {
    token_address: &'a str,
    spender_address: &'a str,
    owner_address: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApproveResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

impl HttpAllowanceAuthorizer {
    /// Creates a client for the service rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorizerError::NotConfigured`] when `base_url` is blank and
    /// [`AuthorizerError::Transport`] when the HTTP client cannot be built.
    pub fn new(base_url: &str, request_timeout: Duration) -> AuthorizerResult<Self> {
        let trimmed = base_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(AuthorizerError::NotConfigured(
                "authorizer base URL is empty".to_owned(),
            ));
        }
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(AuthorizerError::transport)?;
        Ok(Self {
            client,
            endpoint: format!("{trimmed}{APPROVE_PATH}"),
        })
    }

    /// Full URL requests are posted to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AllowanceAuthorizer for HttpAllowanceAuthorizer {
    async fn raise_allowance(
        &self,
        owner: &LedgerAddress,
        token: &LedgerAddress,
        spender: &LedgerAddress,
    ) -> AuthorizerResult<()> {
        let request = ApproveRequest {
            token_address: token.as_str(),
            spender_address: spender.as_str(),
            owner_address: owner.as_str(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(AuthorizerError::transport)?;
        let status = response.status();
        let body: ApproveResponse = response
            .json()
            .await
            .map_err(AuthorizerError::transport)?;

        if body.success {
            return Ok(());
        }
        let reason = body
            .error
            .unwrap_or_else(|| format!("approval service answered {status} without success"));
        Err(AuthorizerError::Refused(reason))
    }
}

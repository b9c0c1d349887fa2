//! Marketplace configuration loaded from TOML.
//!
//! Every field has a default, so an empty document yields a working
//! configuration backed by the in-process ledger settings:
//!
//! ```toml
//! [reputation]
//! bid_credit_floor = 0
//! completion_bonus = 100
//!
//! [ledger]
//! confirmation_timeout_ms = 60000
//! authorization_settle_delay_ms = 3000
//! read_retry_attempts = 3
//! read_retry_backoff_ms = 200
//!
//! [authorizer]
//! base_url = "http://localhost:8000"
//! request_timeout_ms = 10000
//! ```

use crate::settlement::{
    adapters::HttpAllowanceAuthorizer, ports::AuthorizerResult,
    services::GatewaySettings,
};
use crate::task::services::{DEFAULT_BID_CREDIT_FLOOR, DEFAULT_COMPLETION_BONUS, ReputationPolicy};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding [`AuthorizerConfig::base_url`].
pub const AUTHORIZER_URL_ENV: &str = "MARKETPLACE_AUTHORIZER_URL";

/// Environment variable overriding [`ReputationConfig::bid_credit_floor`].
pub const BID_CREDIT_FLOOR_ENV: &str = "MARKETPLACE_BID_CREDIT_FLOOR";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration from {path}: {source}")]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },

    /// The document is not valid TOML for this schema.
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid configuration value for {field}: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Top-level marketplace configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarketplaceConfig {
    /// Reputation rules.
    pub reputation: ReputationConfig,
    /// Ledger gateway timing.
    pub ledger: LedgerConfig,
    /// Allowance authorization service, when one is deployed.
    pub authorizer: Option<AuthorizerConfig>,
}

/// Reputation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReputationConfig {
    /// Minimum credit score required to bid.
    pub bid_credit_floor: i64,
    /// Credit awarded to the executor on completion.
    pub completion_bonus: i64,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            bid_credit_floor: DEFAULT_BID_CREDIT_FLOOR,
            completion_bonus: DEFAULT_COMPLETION_BONUS,
        }
    }
}

/// Ledger gateway timing, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    /// How long a mutating call may take to confirm.
    pub confirmation_timeout_ms: u64,
    /// Pause after an allowance increase before the escrow opens.
    pub authorization_settle_delay_ms: u64,
    /// Attempts for read-only calls.
    pub read_retry_attempts: u32,
    /// Base backoff between read attempts.
    pub read_retry_backoff_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout_ms: 60_000,
            authorization_settle_delay_ms: 3_000,
            read_retry_attempts: 3,
            read_retry_backoff_ms: 200,
        }
    }
}

/// Allowance authorization service endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthorizerConfig {
    /// Service root, e.g. `http://localhost:8000`.
    pub base_url: String,
    /// Per-request timeout.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

const fn default_request_timeout_ms() -> u64 {
    10_000
}

impl MarketplaceConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed documents and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(document: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read, otherwise
    /// as [`Self::from_toml_str`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let document = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&document)
    }

    /// Applies overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when an override cannot be parsed.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`, keyed by the `MARKETPLACE_*`
    /// variable names.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when an override cannot be parsed.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = lookup(AUTHORIZER_URL_ENV) {
            match &mut self.authorizer {
                Some(authorizer) => authorizer.base_url = url,
                None => {
                    self.authorizer = Some(AuthorizerConfig {
                        base_url: url,
                        request_timeout_ms: default_request_timeout_ms(),
                    });
                }
            }
        }
        if let Some(raw) = lookup(BID_CREDIT_FLOOR_ENV) {
            self.reputation.bid_credit_floor =
                raw.trim().parse().map_err(|_| ConfigError::Invalid {
                    field: "reputation.bid_credit_floor",
                    reason: format!("'{raw}' is not an integer"),
                })?;
        }
        self.validate()
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reputation.completion_bonus < 0 {
            return Err(ConfigError::Invalid {
                field: "reputation.completion_bonus",
                reason: "must not be negative".to_owned(),
            });
        }
        if self.ledger.confirmation_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "ledger.confirmation_timeout_ms",
                reason: "must be positive".to_owned(),
            });
        }
        if self.ledger.read_retry_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "ledger.read_retry_attempts",
                reason: "at least one attempt is required".to_owned(),
            });
        }
        if let Some(authorizer) = &self.authorizer
            && authorizer.base_url.trim().is_empty()
        {
            return Err(ConfigError::Invalid {
                field: "authorizer.base_url",
                reason: "must not be empty".to_owned(),
            });
        }
        Ok(())
    }

    /// Builds the reputation policy.
    #[must_use]
    pub const fn reputation_policy(&self) -> ReputationPolicy {
        ReputationPolicy::new()
            .with_bid_credit_floor(self.reputation.bid_credit_floor)
            .with_completion_bonus(self.reputation.completion_bonus)
    }

    /// Builds the ledger gateway settings.
    #[must_use]
    pub const fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings::new()
            .with_confirmation_timeout(Duration::from_millis(self.ledger.confirmation_timeout_ms))
            .with_authorization_settle_delay(Duration::from_millis(
                self.ledger.authorization_settle_delay_ms,
            ))
            .with_read_retry_attempts(self.ledger.read_retry_attempts)
            .with_read_retry_backoff(Duration::from_millis(self.ledger.read_retry_backoff_ms))
    }

    /// Builds the HTTP allowance authorizer, when one is configured.
    ///
    /// # Errors
    ///
    /// Returns the authorizer's construction error.
    pub fn authorizer(&self) -> AuthorizerResult<Option<HttpAllowanceAuthorizer>> {
        self.authorizer
            .as_ref()
            .map(|cfg| {
                HttpAllowanceAuthorizer::new(
                    &cfg.base_url,
                    Duration::from_millis(cfg.request_timeout_ms),
                )
            })
            .transpose()
    }
}

// Core error taxonomy for classification, configuration and report filters

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RiskError {
    /// A single record cannot be classified (negative amount, bad delay value)
    #[error("invalid input for transaction {id}: {reason}")]
    InvalidInput { id: String, reason: String },

    /// Threshold or bucket configuration is inconsistent
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Report filter cannot select anything meaningful (e.g. inverted date range)
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
}

pub type RiskResult<T> = std::result::Result<T, RiskError>;

impl RiskError {
    pub fn invalid_input(id: impl Into<String>, reason: impl Into<String>) -> Self {
        RiskError::InvalidInput {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Per-record errors are skipped by the batch runner instead of aborting it
    pub fn is_record_local(&self) -> bool {
        matches!(self, RiskError::InvalidInput { .. })
    }

    /// Human-readable reason without the record prefix
    pub fn reason(&self) -> String {
        match self {
            RiskError::InvalidInput { reason, .. } => reason.clone(),
            RiskError::InvalidConfig(msg) | RiskError::InvalidFilter(msg) => msg.clone(),
        }
    }
}

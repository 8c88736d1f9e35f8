//! Error type shared by every component of the core.

use thiserror::Error;

/// Errors raised by the blocker core.
///
/// Validation and duplicate-state errors are meant for the user; storage and
/// rule-engine errors are logged at the component boundary where they occur.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockerError {
    /// Input did not normalize to a canonical domain.
    #[error("invalid domain: {0:?}")]
    InvalidDomain(String),

    /// Site is already in the blocklist.
    #[error("{0} is already blocked")]
    AlreadyBlocked(String),

    /// Site is not in the blocklist.
    #[error("{0} is not in the blocklist")]
    NotBlocked(String),

    /// Underlying storage area failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// A persisted field could not be decoded.
    #[error("malformed settings field {field}: {reason}")]
    Decode { field: &'static str, reason: String },

    /// Configuration failed to parse or validate.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Rule engine rejected or failed an operation.
    #[error("rule engine error: {0}")]
    Engine(String),

    /// Rule engine already holds a rule with this id.
    #[error("duplicate rule id {0}")]
    DuplicateRuleId(u32),

    /// Installing the batch would exceed the engine's dynamic rule quota.
    #[error("rule quota exceeded: {requested} rules requested, limit is {limit}")]
    RuleQuota { limit: usize, requested: usize },
}

impl BlockerError {
    /// True for errors that should be shown to the user as a notice.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::InvalidDomain(_) | Self::AlreadyBlocked(_) | Self::NotBlocked(_)
        )
    }
}

impl From<serde_json::Error> for BlockerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BlockerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_facing_classification() {
        assert!(BlockerError::InvalidDomain("x".into()).is_user_facing());
        assert!(BlockerError::AlreadyBlocked("a.com".into()).is_user_facing());
        assert!(BlockerError::NotBlocked("a.com".into()).is_user_facing());
        assert!(!BlockerError::Engine("boom".into()).is_user_facing());
        assert!(!BlockerError::DuplicateRuleId(3).is_user_facing());
    }

    #[test]
    fn test_display() {
        let err = BlockerError::RuleQuota { limit: 10, requested: 12 };
        assert_eq!(err.to_string(), "rule quota exceeded: 12 rules requested, limit is 10");
    }
}

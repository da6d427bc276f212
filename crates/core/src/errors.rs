use thiserror::Error;

/// Error taxonomy for the gateway core.
///
/// Denials (suspended, paced, usage caps) are not errors: they travel in
/// the [`crate::Decision`] payload so callers can render them. Errors here
/// are the operational failures.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("scheduled-job quota exceeded for tier {tier} (limit {limit})")]
    QuotaExceeded { tier: i64, limit: i64 },
    #[error("job id generation exhausted after {attempts} attempts")]
    IdGenerationExhausted { attempts: usize },
    /// Scheduler or store call failed or timed out; retryable by the caller.
    #[error("upstream unavailable: {0}")]
    Upstream(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl GatewayError {
    /// Whether the caller may retry the same call unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream(_) | Self::Persistence(_))
    }
}

#[cfg(test)]
mod tests {
    use super::GatewayError;

    #[test]
    fn upstream_and_persistence_failures_are_retryable() {
        assert!(GatewayError::Upstream("scheduler timeout".to_string()).is_retryable());
        assert!(GatewayError::Persistence("database lock timeout".to_string()).is_retryable());
        assert!(!GatewayError::QuotaExceeded { tier: 1, limit: 2 }.is_retryable());
        assert!(!GatewayError::IdGenerationExhausted { attempts: 3 }.is_retryable());
    }
}

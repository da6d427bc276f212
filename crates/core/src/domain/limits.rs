use serde::{Deserialize, Serialize};

/// Per-tier rate limits. Read-only reference data from the gateway's
/// point of view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierRateLimit {
    pub tier: i64,
    /// Minimum spacing between two accepted messages, in seconds.
    pub pause_seconds: i64,
    pub daily_limit: i64,
    pub monthly_limit: i64,
    pub max_scheduled_jobs: i64,
}

/// Read-only snapshot of a tenant's usage against its tier caps.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageReport {
    pub tier: i64,
    pub daily_usage: i64,
    pub daily_limit: i64,
    pub monthly_usage: i64,
    pub monthly_limit: i64,
}

/// Per-operation call limits for the coarser API-level limiter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRateLimit {
    pub endpoint: String,
    pub max_calls: i64,
    pub interval_seconds: i64,
}

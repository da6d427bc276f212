//! Pure access-policy evaluation.
//!
//! The evaluator snapshot-reads a tenant row inside a write transaction,
//! feeds it through [`evaluate_access`], and applies the mutation the
//! outcome dictates. Keeping the decision logic pure keeps the ordering
//! of the checks testable without a database.

use chrono::{DateTime, Duration, Utc};

use crate::domain::decision::DenialReason;
use crate::domain::limits::TierRateLimit;
use crate::domain::tenant::{Tenant, TenantStatus};

/// What the caller must do with the tenant row after evaluation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccessOutcome {
    Deny(DenialReason),
    /// First contact: bind identity, mark joined and active, bump the
    /// lifetime counter, stamp the join time.
    AllowFirstContact,
    /// Regular allow: stamp `last_message_time`, bump all three usage
    /// counters.
    Allow,
}

/// Applies the account-state machine and quota checks in their fixed
/// order. Each check short-circuits; only the final arm allows with
/// counter mutation.
pub fn evaluate_access(
    tenant: &Tenant,
    limit: &TierRateLimit,
    now: DateTime<Utc>,
) -> AccessOutcome {
    if tenant.service_maintenance {
        return AccessOutcome::Deny(DenialReason::Maintenance);
    }
    if tenant.suspended {
        return AccessOutcome::Deny(DenialReason::Suspended);
    }
    if let Some(expire_at) = tenant.expire_at {
        if expire_at < now {
            return AccessOutcome::Deny(DenialReason::Expired);
        }
    }
    if tenant.status == TenantStatus::Created {
        return AccessOutcome::AllowFirstContact;
    }
    if !tenant.active {
        return AccessOutcome::Deny(DenialReason::Inactive);
    }
    if tenant.daily_usage >= limit.daily_limit {
        return AccessOutcome::Deny(DenialReason::DailyLimit {
            used: tenant.daily_usage,
            limit: limit.daily_limit,
        });
    }
    if tenant.monthly_usage >= limit.monthly_limit {
        return AccessOutcome::Deny(DenialReason::MonthlyLimit {
            used: tenant.monthly_usage,
            limit: limit.monthly_limit,
        });
    }
    if let Some(last) = tenant.last_message_time {
        let elapsed = now - last;
        let pause = Duration::seconds(limit.pause_seconds);
        if elapsed < pause {
            return AccessOutcome::Deny(DenialReason::Paced {
                retry_after_secs: ceil_seconds(pause - elapsed),
            });
        }
    }
    AccessOutcome::Allow
}

fn ceil_seconds(remaining: Duration) -> i64 {
    let millis = remaining.num_milliseconds();
    (millis + 999) / 1000
}

use serde::{Deserialize, Serialize};

use crate::domain::tenant::Role;

/// Why an authorization was denied. Every variant is user-presentable:
/// the calling bot/API layer renders tier-specific guidance from the
/// structured fields rather than from a bare failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DenialReason {
    NoSuchTenant,
    Maintenance,
    Suspended,
    Expired,
    Inactive,
    DailyLimit { used: i64, limit: i64 },
    MonthlyLimit { used: i64, limit: i64 },
    /// Pacing interval has not elapsed; retry after the given seconds.
    Paced { retry_after_secs: i64 },
}

impl DenialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoSuchTenant => "no such tenant",
            Self::Maintenance => "maintenance",
            Self::Suspended => "suspended",
            Self::Expired => "expired",
            Self::Inactive => "inactive",
            Self::DailyLimit { .. } => "daily_limit",
            Self::MonthlyLimit { .. } => "monthly_limit",
            Self::Paced { .. } => "pause",
        }
    }
}

/// The outcome of one authorization attempt. The role and model-choice
/// setting are present on both allow and deny so the caller can render
/// tier-appropriate messaging either way.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    pub denial: Option<DenialReason>,
    pub first_interaction: bool,
    pub role: Option<Role>,
    pub llm_choice: Option<String>,
}

impl Decision {
    pub fn allow(role: Role, llm_choice: Option<String>, first_interaction: bool) -> Self {
        Self { allowed: true, denial: None, first_interaction, role: Some(role), llm_choice }
    }

    pub fn deny(reason: DenialReason, role: Option<Role>, llm_choice: Option<String>) -> Self {
        Self { allowed: false, denial: Some(reason), first_interaction: false, role, llm_choice }
    }

    pub fn not_found() -> Self {
        Self::deny(DenialReason::NoSuchTenant, None, None)
    }
}

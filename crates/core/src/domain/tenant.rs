use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::GatewayError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TenantStatus {
    Created,
    Joined,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Joined => "joined",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "created" => Some(Self::Created),
            "joined" => Some(Self::Joined),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "user" => Some(Self::User),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// A registered chat account subject to tier, quota, and state rules.
///
/// Rows are pre-provisioned in `Created` state with unbound identity
/// columns; the first successful authorization binds the identity and
/// transitions the row to `Joined`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub chat_id: Option<i64>,
    pub user_name: Option<String>,
    pub role: Role,
    pub status: TenantStatus,
    pub active: bool,
    pub suspended: bool,
    pub service_maintenance: bool,
    pub expire_at: Option<DateTime<Utc>>,
    pub tier: i64,
    pub daily_usage: i64,
    pub monthly_usage: i64,
    pub messages_count: i64,
    pub last_message_time: Option<DateTime<Utc>>,
    pub llm_choice: Option<String>,
    pub created_at: DateTime<Utc>,
    pub joined_at: Option<DateTime<Utc>>,
}

/// Inputs for pre-provisioning a tenant row. Identity columns may stay
/// unbound until first contact.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NewTenant {
    pub chat_id: Option<i64>,
    pub user_name: Option<String>,
    pub role: Option<Role>,
    pub tier: Option<i64>,
    pub expire_at: Option<DateTime<Utc>>,
}

/// An inbound identity: at least one of the two identifiers must be set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantIdentity {
    pub chat_id: Option<i64>,
    pub user_name: Option<String>,
}

impl TenantIdentity {
    pub fn by_chat_id(chat_id: i64) -> Self {
        Self { chat_id: Some(chat_id), user_name: None }
    }

    pub fn by_user_name(user_name: impl Into<String>) -> Self {
        Self { chat_id: None, user_name: Some(user_name.into()) }
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.chat_id.is_none() && self.user_name.is_none() {
            return Err(GatewayError::InvalidArgument(
                "either chat_id or user_name must be provided".to_string(),
            ));
        }
        Ok(())
    }
}

/// Normalizes an externally supplied user name: strips a `https://t.me/`
/// style prefix and keeps only alphanumerics and underscores.
pub fn sanitize_user_name(raw: &str) -> String {
    let tail = match raw.rsplit_once('/') {
        Some((head, tail)) if head.starts_with("https://t.me") => tail,
        _ => raw,
    };
    tail.chars().filter(|ch| ch.is_ascii_alphanumeric() || *ch == '_').collect()
}

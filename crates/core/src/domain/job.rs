use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::tenant::TenantId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

/// Opaque reference to a registration held by the external scheduler.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchedulerHandle(pub String);

/// A tenant-owned recurring trigger that re-invokes the message-processing
/// path with a stored prompt.
///
/// Invariant: `handle` refers to a live registration in the external
/// scheduler whenever the record exists, except transiently while a create
/// or update is in flight.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: JobId,
    pub tenant_id: TenantId,
    pub job_name: String,
    pub prompt_text: String,
    /// Cron schedule expression, interpreted in UTC.
    pub schedule: String,
    pub thread_id: i64,
    pub message_id: Option<i64>,
    pub file_url: Option<String>,
    pub handle: SchedulerHandle,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload the scheduler delivers to the downstream invoker when a job
/// fires.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackPayload {
    pub tenant_chat_id: i64,
    pub prompt_text: String,
    pub message_id: Option<i64>,
    pub file_url: Option<String>,
    pub thread_id: i64,
}

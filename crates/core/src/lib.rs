pub mod config;
pub mod domain;
pub mod errors;
pub mod jobid;
pub mod policy;

pub use chrono;

pub use domain::decision::{Decision, DenialReason};
pub use domain::job::{CallbackPayload, JobId, ScheduledJob, SchedulerHandle};
pub use domain::limits::{EndpointRateLimit, TierRateLimit, UsageReport};
pub use domain::settings::ServerSettings;
pub use domain::tenant::{NewTenant, Role, Tenant, TenantId, TenantIdentity, TenantStatus};
pub use domain::tools::Tool;
pub use errors::GatewayError;
pub use jobid::{generate_job_id, JOB_ID_ALPHABET, JOB_ID_LEN, MAX_JOB_ID_ATTEMPTS};
pub use policy::{evaluate_access, AccessOutcome};

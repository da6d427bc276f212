pub mod evaluator;
pub mod invoker;
pub mod jobs;
pub mod scheduler;
pub mod storage;
pub mod tenants;

pub use evaluator::AccessControlEvaluator;
pub use invoker::{
    trigger_url, verify_callback_secret, DownstreamInvoker, HttpDownstreamInvoker,
    CALLBACK_SECRET_HEADER,
};
pub use jobs::{
    CreateJobRequest, DeleteJobReport, JobSummary, ScheduledJobManager, UpdateJobRequest,
};
pub use scheduler::{
    CallbackRegistration, HttpJobScheduler, InMemoryJobScheduler, JobScheduler,
};
pub use storage::{InMemoryObjectStore, ObjectStore};
pub use tenants::{TenantDeletionReport, TenantService};

use tollgate_core::GatewayError;
use tollgate_db::RepositoryError;

pub(crate) fn persistence_error(error: RepositoryError) -> GatewayError {
    GatewayError::Persistence(error.to_string())
}

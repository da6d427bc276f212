//! Front door for per-message authorization.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use tollgate_core::domain::limits::UsageReport;
use tollgate_core::domain::tenant::TenantIdentity;
use tollgate_core::{Decision, GatewayError};
use tollgate_db::TenantRepository;

use crate::persistence_error;

pub struct AccessControlEvaluator {
    tenants: Arc<dyn TenantRepository>,
}

impl AccessControlEvaluator {
    pub fn new(tenants: Arc<dyn TenantRepository>) -> Self {
        Self { tenants }
    }

    /// Runs one authorization attempt against the atomic repository path
    /// and logs the structured decision.
    pub async fn authorize(&self, identity: &TenantIdentity) -> Result<Decision, GatewayError> {
        identity.validate()?;

        let correlation_id = Uuid::new_v4();
        let decision =
            self.tenants.authorize(identity, Utc::now()).await.map_err(persistence_error)?;

        info!(
            event_name = "access_decision",
            correlation_id = %correlation_id,
            chat_id = identity.chat_id,
            allowed = decision.allowed,
            first_interaction = decision.first_interaction,
            reason = decision.denial.as_ref().map(|reason| reason.as_str()),
            "authorization evaluated"
        );

        Ok(decision)
    }

    pub async fn usage_report(&self, chat_id: i64) -> Result<UsageReport, GatewayError> {
        self.tenants
            .usage_report(chat_id)
            .await
            .map_err(persistence_error)?
            .ok_or_else(|| GatewayError::NotFound(format!("no tenant for chat id {chat_id}")))
    }
}

//! Client side of the downstream message-processing service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};

use tollgate_core::domain::job::CallbackPayload;
use tollgate_core::domain::settings::ServerSettings;
use tollgate_core::GatewayError;

pub const CALLBACK_SECRET_HEADER: &str = "X-Callback-Secret";

/// The invoker endpoint scheduled jobs post back into.
pub fn trigger_url(base_url: &str) -> String {
    format!("{}/internal/jobs/trigger", base_url.trim_end_matches('/'))
}

#[async_trait]
pub trait DownstreamInvoker: Send + Sync {
    async fn invoke(&self, payload: &CallbackPayload) -> Result<(), GatewayError>;
}

pub struct HttpDownstreamInvoker {
    client: Client,
    trigger_url: String,
    secret: SecretString,
}

impl HttpDownstreamInvoker {
    pub fn new(
        base_url: &str,
        timeout_secs: u64,
        secret: SecretString,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|error| GatewayError::Configuration(error.to_string()))?;

        Ok(Self { client, trigger_url: trigger_url(base_url), secret })
    }

    pub fn trigger_url(&self) -> &str {
        &self.trigger_url
    }
}

#[async_trait]
impl DownstreamInvoker for HttpDownstreamInvoker {
    async fn invoke(&self, payload: &CallbackPayload) -> Result<(), GatewayError> {
        let response = self
            .client
            .post(&self.trigger_url)
            .header(CALLBACK_SECRET_HEADER, self.secret.expose_secret())
            .json(payload)
            .send()
            .await
            .map_err(|error| GatewayError::Upstream(format!("invoker call: {error}")))?;

        if !response.status().is_success() {
            return Err(GatewayError::Upstream(format!(
                "invoker returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}

/// Receiving-side check: does the presented header value match the current
/// callback secret?
pub fn verify_callback_secret(settings: &ServerSettings, presented: Option<&str>) -> bool {
    presented.is_some_and(|value| settings.secret_matches(value))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use tollgate_core::domain::settings::ServerSettings;

    use super::{trigger_url, verify_callback_secret, HttpDownstreamInvoker};

    #[test]
    fn trigger_url_tolerates_a_trailing_slash() {
        assert_eq!(trigger_url("http://invoker:8001"), "http://invoker:8001/internal/jobs/trigger");
        assert_eq!(
            trigger_url("http://invoker:8001/"),
            "http://invoker:8001/internal/jobs/trigger"
        );
    }

    #[test]
    fn invoker_builds_its_trigger_url_from_the_base() {
        let invoker =
            HttpDownstreamInvoker::new("http://invoker:8001/", 5, "shh".to_string().into())
                .expect("build invoker");
        assert_eq!(invoker.trigger_url(), "http://invoker:8001/internal/jobs/trigger");
    }

    #[test]
    fn missing_or_wrong_header_is_rejected() {
        let settings = ServerSettings {
            version: 1,
            callback_secret: "expected".to_string().into(),
            invoker_base_url: "http://invoker:8001".to_string(),
            allowed_models: Vec::new(),
            created_at: Utc::now(),
        };

        assert!(verify_callback_secret(&settings, Some("expected")));
        assert!(!verify_callback_secret(&settings, Some("wrong")));
        assert!(!verify_callback_secret(&settings, None));
    }
}

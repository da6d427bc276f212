//! Seam to the external time-based trigger service.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use tollgate_core::domain::job::{CallbackPayload, SchedulerHandle};
use tollgate_core::GatewayError;

/// What the scheduler must deliver when a registration fires: a POST of
/// `payload` to `url` carrying the shared secret header.
#[derive(Clone, Debug, Serialize)]
pub struct CallbackRegistration {
    pub url: String,
    #[serde(skip)]
    pub secret: SecretString,
    pub payload: CallbackPayload,
}

#[async_trait]
pub trait JobScheduler: Send + Sync {
    async fn register(
        &self,
        job_name: &str,
        schedule: &str,
        callback: &CallbackRegistration,
    ) -> Result<SchedulerHandle, GatewayError>;

    /// Removes a registration. `Ok(false)` means the handle was already
    /// gone, which callers treat as success.
    async fn unregister(&self, handle: &SchedulerHandle) -> Result<bool, GatewayError>;

    async fn exists(&self, handle: &SchedulerHandle) -> Result<bool, GatewayError>;
}

pub struct HttpJobScheduler {
    client: Client,
    base_url: String,
    api_token: Option<SecretString>,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    name: &'a str,
    schedule: &'a str,
    callback_url: &'a str,
    callback_secret: &'a str,
    payload: &'a CallbackPayload,
}

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    handle: String,
}

impl HttpJobScheduler {
    pub fn new(
        base_url: impl Into<String>,
        timeout_secs: u64,
        api_token: Option<SecretString>,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|error| GatewayError::Configuration(error.to_string()))?;

        Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_string(), api_token })
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }
}

#[async_trait]
impl JobScheduler for HttpJobScheduler {
    async fn register(
        &self,
        job_name: &str,
        schedule: &str,
        callback: &CallbackRegistration,
    ) -> Result<SchedulerHandle, GatewayError> {
        let body = RegisterRequest {
            name: job_name,
            schedule,
            callback_url: &callback.url,
            callback_secret: callback.secret.expose_secret(),
            payload: &callback.payload,
        };

        let response = self
            .request(self.client.post(format!("{}/jobs", self.base_url)))
            .json(&body)
            .send()
            .await
            .map_err(|error| GatewayError::Upstream(format!("scheduler register: {error}")))?;

        if !response.status().is_success() {
            return Err(GatewayError::Upstream(format!(
                "scheduler register returned {}",
                response.status()
            )));
        }

        let registered: RegisterResponse = response
            .json()
            .await
            .map_err(|error| GatewayError::Upstream(format!("scheduler register body: {error}")))?;

        Ok(SchedulerHandle(registered.handle))
    }

    async fn unregister(&self, handle: &SchedulerHandle) -> Result<bool, GatewayError> {
        let response = self
            .request(self.client.delete(format!("{}/jobs/{}", self.base_url, handle.0)))
            .send()
            .await
            .map_err(|error| GatewayError::Upstream(format!("scheduler unregister: {error}")))?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                Err(GatewayError::Upstream(format!("scheduler unregister returned {status}")))
            }
        }
    }

    async fn exists(&self, handle: &SchedulerHandle) -> Result<bool, GatewayError> {
        let response = self
            .request(self.client.get(format!("{}/jobs/{}", self.base_url, handle.0)))
            .send()
            .await
            .map_err(|error| GatewayError::Upstream(format!("scheduler lookup: {error}")))?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(GatewayError::Upstream(format!("scheduler lookup returned {status}"))),
        }
    }
}

/// In-process scheduler for tests: tracks live registrations and can be
/// told to fail the next register call.
#[derive(Default)]
pub struct InMemoryJobScheduler {
    registrations: Mutex<HashMap<String, (String, String)>>,
    next_handle: AtomicU64,
    register_failures: AtomicUsize,
    register_calls: AtomicUsize,
}

impl InMemoryJobScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` register calls fail with an upstream error.
    pub fn fail_next_registers(&self, count: usize) {
        self.register_failures.store(count, Ordering::SeqCst);
    }

    pub fn live_count(&self) -> usize {
        self.registrations.lock().map(|map| map.len()).unwrap_or(0)
    }

    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn contains(&self, handle: &SchedulerHandle) -> bool {
        self.registrations.lock().map(|map| map.contains_key(&handle.0)).unwrap_or(false)
    }

    /// Drops a registration out from under the bookkeeping, simulating a
    /// scheduler-side loss.
    pub fn drop_registration(&self, handle: &SchedulerHandle) {
        if let Ok(mut map) = self.registrations.lock() {
            map.remove(&handle.0);
        }
    }
}

#[async_trait]
impl JobScheduler for InMemoryJobScheduler {
    async fn register(
        &self,
        job_name: &str,
        schedule: &str,
        _callback: &CallbackRegistration,
    ) -> Result<SchedulerHandle, GatewayError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.register_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.register_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(GatewayError::Upstream("scheduler register: injected failure".to_string()));
        }

        let handle = format!("mem-{}", self.next_handle.fetch_add(1, Ordering::SeqCst));
        self.registrations
            .lock()
            .map_err(|_| GatewayError::Upstream("scheduler state poisoned".to_string()))?
            .insert(handle.clone(), (job_name.to_string(), schedule.to_string()));

        Ok(SchedulerHandle(handle))
    }

    async fn unregister(&self, handle: &SchedulerHandle) -> Result<bool, GatewayError> {
        Ok(self
            .registrations
            .lock()
            .map_err(|_| GatewayError::Upstream("scheduler state poisoned".to_string()))?
            .remove(&handle.0)
            .is_some())
    }

    async fn exists(&self, handle: &SchedulerHandle) -> Result<bool, GatewayError> {
        Ok(self
            .registrations
            .lock()
            .map_err(|_| GatewayError::Upstream("scheduler state poisoned".to_string()))?
            .contains_key(&handle.0))
    }
}

#[cfg(test)]
mod tests {
    use tollgate_core::domain::job::{CallbackPayload, SchedulerHandle};

    use super::{CallbackRegistration, InMemoryJobScheduler, JobScheduler};

    fn callback() -> CallbackRegistration {
        CallbackRegistration {
            url: "http://invoker:8001/internal/jobs/trigger".to_string(),
            secret: "shh".to_string().into(),
            payload: CallbackPayload {
                tenant_chat_id: 1,
                prompt_text: "ping".to_string(),
                message_id: None,
                file_url: None,
                thread_id: 1,
            },
        }
    }

    #[tokio::test]
    async fn register_unregister_round_trip() {
        let scheduler = InMemoryJobScheduler::new();

        let handle =
            scheduler.register("job_a", "0 9 * * *", &callback()).await.expect("register");
        assert!(scheduler.exists(&handle).await.expect("exists"));
        assert_eq!(scheduler.live_count(), 1);

        assert!(scheduler.unregister(&handle).await.expect("unregister"));
        assert!(!scheduler.exists(&handle).await.expect("exists"));
        assert!(!scheduler.unregister(&handle).await.expect("second unregister is a no-op"));
    }

    #[tokio::test]
    async fn injected_failures_consume_then_clear() {
        let scheduler = InMemoryJobScheduler::new();
        scheduler.fail_next_registers(1);

        assert!(scheduler.register("job_b", "* * * * *", &callback()).await.is_err());
        assert!(scheduler.register("job_b", "* * * * *", &callback()).await.is_ok());
        assert_eq!(scheduler.register_calls(), 2);
    }

    #[tokio::test]
    async fn unknown_handle_does_not_exist() {
        let scheduler = InMemoryJobScheduler::new();
        let ghost = SchedulerHandle("mem-404".to_string());
        assert!(!scheduler.exists(&ghost).await.expect("exists"));
    }
}

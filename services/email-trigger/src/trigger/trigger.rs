//! Trigger client - responsibility and behavior
//!
//! The trigger client performs the single remote mutation this tool exists
//! for: asking the application backend to dispatch its queued onboarding
//! emails. It owns one reused HTTP session and a bounded fixed-delay retry
//! loop around the call.
//!
//! Key responsibilities:
//! - Build the mutation endpoint from the configured base URL.
//! - Issue the POST with an empty JSON body and a per-request timeout.
//! - Classify every failed attempt through a single retryable/terminal
//! taxonomy and drive the retry loop off that classification.
//! - Produce exactly one [`SendReport`] per invocation, success or not.
//!
//! Important design notes:
//! - The delay between attempts is fixed. The backend signals "asleep" with
//! 502/503 and wakes on its own schedule; pacing attempts evenly is the
//! existing operational contract, so there is no backoff curve or jitter.
//! - Authentication failures never retry: a bad token stays bad no matter
//! how many attempts remain.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};
use tokio::time::sleep;
use tracing::instrument;

use crate::trigger::models::SendReport;

/// Path of the mutation that dispatches queued onboarding emails.
const MUTATION_PATH: &str = "/api/trpc/onboardingEmails.sendPendingEmails";

/// Runtime knobs for the trigger client.
///
/// Production runs use the defaults baked into [`TriggerConfig::new`]; tests
/// shrink the delays to keep the retry loop fast.
#[derive(Debug, Clone)]
pub struct TriggerConfig {
    /// Base URL of the target application, scheme included.
    pub base_url: String,
    /// Optional bearer token attached to every request.
    pub auth_token: Option<String>,
    /// Per-request deadline for the mutation call.
    pub request_timeout: Duration,
    /// Fixed pause between retryable attempts.
    pub retry_delay: Duration,
}

impl TriggerConfig {
    /// Config with the operational defaults: 30 s request timeout, 5 s
    /// between attempts.
    pub fn new(base_url: impl Into<String>, auth_token: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token,
            request_timeout: Duration::from_secs(30),
            retry_delay: Duration::from_secs(5),
        }
    }
}

/// Failure taxonomy for one trigger attempt.
///
/// Everything except a rejected token is worth another attempt: the backend
/// may be asleep (502/503), mid-deploy (other statuses), or unreachable
/// (timeout, transport).
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("Authentication failed")]
    Authentication,
    #[error("Service unavailable (status {0})")]
    ServiceUnavailable(u16),
    #[error("Unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("Request timeout")]
    Timeout,
    #[error("Request failed: {0}")]
    Transport(String),
}

impl TriggerError {
    /// Single classification point driving the retry loop.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TriggerError::Authentication)
    }

    /// HTTP status observed for this failure, if the backend responded at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            TriggerError::Authentication => Some(401),
            TriggerError::ServiceUnavailable(status) => Some(*status),
            TriggerError::UnexpectedStatus { status, .. } => Some(*status),
            TriggerError::Timeout | TriggerError::Transport(_) => None,
        }
    }
}

/// Client for the onboarding email mutation endpoint.
///
/// One `reqwest::Client` is built up front with the default headers and the
/// request timeout, then reused across attempts so retries share the
/// underlying connection where the server allows it.
#[derive(Debug)]
pub struct TriggerClient {
    client: reqwest::Client,
    config: TriggerConfig,
}

impl TriggerClient {
    /// Build the reused HTTP session from the given config.
    pub fn new(config: TriggerConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = &config.auth_token {
            headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}"))?);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self { client, config })
    }

    /// Call the mutation with a bounded retry budget.
    ///
    /// Attempts run strictly one after another; each failed attempt is
    /// classified, and only retryable classes with budget remaining sleep the
    /// fixed delay and go again. Exactly one report comes back, carrying the
    /// attempt at which the outcome was reached.
    #[instrument(
        name = "email_trigger::send_pending_emails",
        target = "trigger::trigger::TriggerClient",
        skip_all,
        level = "debug"
    )]
    pub async fn send_pending_emails(&self, retry_budget: u32) -> SendReport {
        let endpoint = mutation_endpoint(&self.config.base_url);
        tracing::info!(endpoint = %endpoint, "Calling onboarding email trigger endpoint");

        for attempt in 1..=retry_budget {
            match self.attempt_send(&endpoint).await {
                Ok(data) => {
                    tracing::info!(attempt, "Successfully sent pending onboarding emails");
                    return SendReport::succeeded(data, attempt);
                }
                Err(err) => {
                    match &err {
                        TriggerError::Authentication => {
                            tracing::error!("Authentication failed. Check the configured token.");
                        }
                        TriggerError::ServiceUnavailable(status) => {
                            tracing::warn!(
                                status = *status,
                                attempt,
                                retry_budget,
                                "Service unavailable. Application may be asleep."
                            );
                        }
                        TriggerError::Timeout => {
                            tracing::error!(attempt, retry_budget, "Request timeout");
                        }
                        TriggerError::UnexpectedStatus { status, body } => {
                            tracing::error!(
                                status = *status,
                                body = %body,
                                attempt,
                                retry_budget,
                                "Trigger call failed with unexpected status"
                            );
                        }
                        TriggerError::Transport(reason) => {
                            tracing::error!(
                                reason = %reason,
                                attempt,
                                retry_budget,
                                "Trigger call failed before a response arrived"
                            );
                        }
                    }

                    if err.is_retryable() && attempt < retry_budget {
                        tracing::info!(
                            delay_secs = self.config.retry_delay.as_secs_f64(),
                            "Retrying after fixed delay"
                        );
                        sleep(self.config.retry_delay).await;
                        continue;
                    }

                    return SendReport::failed(&err, attempt);
                }
            }
        }

        // Only reachable with a zero attempt budget.
        SendReport::exhausted(retry_budget)
    }

    /// One POST against the mutation endpoint, classified into the taxonomy.
    ///
    /// A 200 whose body is not valid JSON still counts as success; the body
    /// is recorded as JSON null and the emails-sent count falls back to 0.
    #[instrument(
        name = "email_trigger::attempt_send",
        target = "trigger::trigger::TriggerClient",
        skip_all,
        level = "debug"
    )]
    async fn attempt_send(&self, endpoint: &str) -> Result<Value, TriggerError> {
        let response = self
            .client
            .post(endpoint)
            .json(&json!({}))
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        match status {
            StatusCode::OK => Ok(response.json::<Value>().await.unwrap_or(Value::Null)),
            StatusCode::UNAUTHORIZED => Err(TriggerError::Authentication),
            StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY => {
                Err(TriggerError::ServiceUnavailable(status.as_u16()))
            }
            other => Err(TriggerError::UnexpectedStatus {
                status: other.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

/// Concatenate the base URL (trailing slashes stripped) with the fixed
/// mutation path.
fn mutation_endpoint(base_url: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), MUTATION_PATH)
}

/// Sort connection-level failures into the taxonomy: deadline expiry is its
/// own class, everything else is transport.
fn classify_request_error(err: reqwest::Error) -> TriggerError {
    if err.is_timeout() {
        TriggerError::Timeout
    } else {
        TriggerError::Transport(err.to_string())
    }
}

//! One-shot trigger for the onboarding email mutation.
//!
//! Once the waker has established that the sandbox answers at all, the
//! mutation gets exactly one attempt. A failure here is reported and left
//! for the next scheduled run rather than retried, since the wake loop has
//! already absorbed the transient-outage cases.

use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::instrument;

use crate::waker::waker::SANDBOX_BASE_URL;

/// Path of the mutation that dispatches queued onboarding emails.
const MUTATION_PATH: &str = "/api/trpc/onboardingEmails.sendPendingEmails";

/// Error bodies are clipped to this many characters before they reach the
/// report.
const ERROR_TEXT_LIMIT: usize = 500;

/// Mutation call knobs; [`Default`] carries the build-time constants.
#[derive(Debug, Clone)]
pub struct TriggerConfig {
    /// Base URL of the sandbox, scheme included.
    pub base_url: String,
    /// Deadline for the single mutation call.
    pub request_timeout: Duration,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            base_url: SANDBOX_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Outcome of the single unretried mutation call.
#[derive(Debug, Clone, Serialize)]
pub struct SendReport {
    pub success: bool,
    pub status_code: Option<u16>,
    pub emails_sent: u64,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl SendReport {
    fn succeeded(data: Value) -> Self {
        Self {
            success: true,
            status_code: Some(200),
            emails_sent: extract_emails_sent(&data),
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    fn failed(status_code: Option<u16>, error: String) -> Self {
        Self {
            success: false,
            status_code,
            emails_sent: 0,
            data: None,
            error: Some(error),
            timestamp: Utc::now(),
        }
    }
}

/// Client for the onboarding email mutation endpoint.
#[derive(Debug)]
pub struct EmailTrigger {
    client: reqwest::Client,
    config: TriggerConfig,
}

impl EmailTrigger {
    /// Build the HTTP session with the default headers and request timeout.
    pub fn new(config: TriggerConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self { client, config })
    }

    /// POST the mutation once and report the outcome.
    ///
    /// A 200 whose body is not valid JSON still counts as success; the body
    /// is recorded as JSON null and the emails-sent count reads as 0.
    #[instrument(
        name = "sandbox_waker::send_onboarding_emails",
        target = "trigger::trigger::EmailTrigger",
        skip_all,
        level = "debug"
    )]
    pub async fn send_onboarding_emails(&self) -> SendReport {
        let endpoint = format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            MUTATION_PATH
        );
        tracing::info!(endpoint = %endpoint, "Calling onboarding email API");

        match self.client.post(&endpoint).json(&json!({})).send().await {
            Ok(response) => {
                let status = response.status();
                if status == StatusCode::OK {
                    let data = response.json::<Value>().await.unwrap_or(Value::Null);
                    tracing::info!("Successfully sent pending onboarding emails");
                    SendReport::succeeded(data)
                } else {
                    tracing::error!(
                        status = status.as_u16(),
                        "API request failed"
                    );
                    let body = response.text().await.unwrap_or_default();
                    SendReport::failed(Some(status.as_u16()), truncate_error(&body))
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "Request failed");
                SendReport::failed(None, truncate_error(&err.to_string()))
            }
        }
    }
}

/// Resolve `result.data.emailsSent` in the response body, defaulting to 0
/// whenever the path is absent or the value is not an integer.
fn extract_emails_sent(data: &Value) -> u64 {
    data.pointer("/result/data/emailsSent")
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

/// Clip error text on a character boundary.
fn truncate_error(text: &str) -> String {
    text.chars().take(ERROR_TEXT_LIMIT).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use serde_json::json;

    fn test_config(base_url: &str) -> TriggerConfig {
        TriggerConfig {
            base_url: base_url.to_string(),
            request_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn extraction_defaults_to_zero_for_unrecognized_shapes() {
        assert_eq!(extract_emails_sent(&json!({})), 0);
        assert_eq!(extract_emails_sent(&json!({"result": {}})), 0);
        assert_eq!(extract_emails_sent(&json!("plain text")), 0);
        assert_eq!(extract_emails_sent(&Value::Null), 0);
        assert_eq!(
            extract_emails_sent(&json!({"result": {"data": {"emailsSent": 9}}})),
            9
        );
    }

    #[test]
    fn error_text_is_clipped_to_the_limit() {
        let long = "x".repeat(2 * ERROR_TEXT_LIMIT);
        assert_eq!(truncate_error(&long).len(), ERROR_TEXT_LIMIT);
        assert_eq!(truncate_error("short"), "short");
    }

    #[tokio::test]
    async fn reports_success_with_the_emails_sent_count() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", MUTATION_PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"result":{"data":{"emailsSent":3}}}"#)
            .expect(1)
            .create_async()
            .await;

        let trigger = EmailTrigger::new(test_config(&server.url())).expect("trigger");
        let report = trigger.send_onboarding_emails().await;

        assert!(report.success);
        assert_eq!(report.status_code, Some(200));
        assert_eq!(report.emails_sent, 3);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn a_failed_status_is_captured_without_retrying() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", MUTATION_PATH)
            .with_status(500)
            .with_body("upstream exploded")
            .expect(1)
            .create_async()
            .await;

        let trigger = EmailTrigger::new(test_config(&server.url())).expect("trigger");
        let report = trigger.send_onboarding_emails().await;

        assert!(!report.success);
        assert_eq!(report.status_code, Some(500));
        assert_eq!(report.error.as_deref(), Some("upstream exploded"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn long_error_bodies_are_truncated_in_the_report() {
        let body = "e".repeat(3 * ERROR_TEXT_LIMIT);
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", MUTATION_PATH)
            .with_status(502)
            .with_body(body)
            .expect(1)
            .create_async()
            .await;

        let trigger = EmailTrigger::new(test_config(&server.url())).expect("trigger");
        let report = trigger.send_onboarding_emails().await;

        assert!(!report.success);
        assert_eq!(report.status_code, Some(502));
        assert_eq!(report.error.expect("error text").len(), ERROR_TEXT_LIMIT);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn a_transport_failure_reports_without_a_status() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind probe port");
        let port = listener.local_addr().expect("probe port addr").port();
        drop(listener);

        let trigger = EmailTrigger::new(test_config(&format!("http://127.0.0.1:{port}")))
            .expect("trigger");
        let report = trigger.send_onboarding_emails().await;

        assert!(!report.success);
        assert_eq!(report.status_code, None);
        assert!(report.error.is_some());
    }

    #[tokio::test]
    async fn a_malformed_success_body_is_tolerated() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", MUTATION_PATH)
            .with_status(200)
            .with_body("<html>not json</html>")
            .expect(1)
            .create_async()
            .await;

        let trigger = EmailTrigger::new(test_config(&server.url())).expect("trigger");
        let report = trigger.send_onboarding_emails().await;

        assert!(report.success);
        assert_eq!(report.emails_sent, 0);
        mock.assert_async().await;
    }
}

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::trigger::trigger::TriggerError;

/// Banner line delimiting summary blocks in the shared log.
const BANNER: &str =
    "================================================================================";

/// Nested location of the emails-sent count in the mutation response.
const EMAILS_SENT_POINTER: &str = "/result/data/emailsSent";

/// Outcome record for one trigger invocation.
///
/// Exactly one of these is produced per run. `attempt` is the attempt at
/// which the outcome was reached, or the final attempt when the budget ran
/// out.
#[derive(Debug, Clone, Serialize)]
pub struct SendReport {
    pub success: bool,
    pub status_code: Option<u16>,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub attempt: u32,
}

impl SendReport {
    /// Report for a 200 outcome carrying the parsed response body.
    pub fn succeeded(data: Value, attempt: u32) -> Self {
        Self {
            success: true,
            status_code: Some(200),
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
            attempt,
        }
    }

    /// Report for a classified failure, carrying whatever status the backend
    /// produced before the loop gave up.
    pub fn failed(err: &TriggerError, attempt: u32) -> Self {
        Self {
            success: false,
            status_code: err.status_code(),
            data: None,
            error: Some(err.to_string()),
            timestamp: Utc::now(),
            attempt,
        }
    }

    /// Fallback report for a loop that never produced an outcome.
    pub fn exhausted(retry_budget: u32) -> Self {
        Self {
            success: false,
            status_code: None,
            data: None,
            error: Some(format!("Failed after {retry_budget} attempts")),
            timestamp: Utc::now(),
            attempt: retry_budget,
        }
    }

    /// Count of emails the backend reports having dispatched.
    ///
    /// Resolves `result.data.emailsSent` in the response body and falls back
    /// to 0 whenever the path is absent, the body is not an object, or the
    /// value is not an integer.
    pub fn emails_sent(&self) -> u64 {
        self.data
            .as_ref()
            .and_then(|data| data.pointer(EMAILS_SENT_POINTER))
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }

    /// Emit the banner-delimited summary block for this run.
    pub fn log_summary(&self) {
        tracing::info!("{BANNER}");
        tracing::info!("ONBOARDING EMAIL SEND RESULTS");
        tracing::info!("{BANNER}");
        tracing::info!("Timestamp: {}", self.timestamp.to_rfc3339());
        tracing::info!("Success: {}", self.success);

        if self.success {
            match self.data.as_ref() {
                // Any object (or tolerated empty body) goes through the
                // counted path; missing fields read as zero sends.
                Some(data) if data.is_object() || data.is_null() => {
                    tracing::info!("Emails Sent: {}", self.emails_sent());
                }
                Some(data) => {
                    let rendered = serde_json::to_string_pretty(data)
                        .unwrap_or_else(|_| data.to_string());
                    tracing::info!("Response Data: {rendered}");
                }
                None => tracing::info!("Emails Sent: {}", self.emails_sent()),
            }
        } else {
            tracing::error!("Error: {}", self.error.as_deref().unwrap_or("Unknown error"));
            match self.status_code {
                Some(code) => tracing::error!("Status Code: {code}"),
                None => tracing::error!("Status Code: N/A"),
            }
        }

        tracing::info!("{BANNER}");
    }
}

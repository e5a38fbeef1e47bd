use anyhow::Result;

use crate::trigger::models::SendReport;
use crate::trigger::trigger::{TriggerClient, TriggerConfig};

/// Run one trigger invocation end to end: build the client, perform the
/// mutation with the given retry budget, emit the summary block.
///
/// Returns the success flag of the produced report; client construction
/// failures (a malformed bearer token, for instance) bubble up as errors.
pub async fn run_email_trigger(
    base_url: &str,
    auth_token: Option<String>,
    retry_budget: u32,
) -> Result<bool> {
    tracing::info!("Starting onboarding email send process");
    tracing::info!(target_url = %base_url, "Target application");

    let client = TriggerClient::new(TriggerConfig::new(base_url, auth_token))?;
    let report: SendReport = client.send_pending_emails(retry_budget).await;

    report.log_summary();

    Ok(report.success)
}

use anyhow::Result;
use chrono::Utc;

use crate::trigger::trigger::{EmailTrigger, SendReport, TriggerConfig};
use crate::waker::waker::{SandboxWaker, WakerConfig};

/// Banner line delimiting summary blocks in the shared log.
const BANNER: &str =
    "================================================================================";

/// Entry used by `main`: run the flow against the fixed sandbox constants.
pub async fn run_sandbox_waker() -> Result<bool> {
    run_flow(WakerConfig::default(), TriggerConfig::default()).await
}

/// Full automation flow: wake the sandbox, then trigger the email dispatch
/// once. The configs are parameters so tests can point both steps at local
/// servers; production callers pass the defaults.
///
/// Returns the overall success flag: false when the sandbox never woke up
/// (the send is skipped entirely) or when the single send attempt failed.
pub async fn run_flow(waker_config: WakerConfig, trigger_config: TriggerConfig) -> Result<bool> {
    tracing::info!("{BANNER}");
    tracing::info!("ONBOARDING EMAIL AUTOMATION");
    tracing::info!("{BANNER}");
    tracing::info!("Started at: {}", Utc::now().to_rfc3339());

    let waker = SandboxWaker::new(waker_config)?;
    if !waker.wake_up().await {
        tracing::error!("Could not wake up sandbox. Skipping the email send.");
        return Ok(false);
    }

    let trigger = EmailTrigger::new(trigger_config)?;
    let report = trigger.send_onboarding_emails().await;
    log_results(&report);

    Ok(report.success)
}

/// Banner-delimited results block, mirrored into the shared log file.
fn log_results(report: &SendReport) {
    tracing::info!("{BANNER}");
    tracing::info!("EXECUTION RESULTS");
    tracing::info!("{BANNER}");
    tracing::info!("Success: {}", report.success);
    tracing::info!("Timestamp: {}", report.timestamp.to_rfc3339());

    if report.success {
        tracing::info!("Emails Sent: {}", report.emails_sent);
        if let Some(code) = report.status_code {
            tracing::info!("Status Code: {code}");
        }
    } else {
        tracing::error!("Error: {}", report.error.as_deref().unwrap_or("Unknown error"));
        match report.status_code {
            Some(code) => tracing::error!("Status Code: {code}"),
            None => tracing::error!("Status Code: N/A"),
        }
    }

    tracing::info!("{BANNER}");
    tracing::info!("Completed at: {}", Utc::now().to_rfc3339());
    tracing::info!("{BANNER}");
}

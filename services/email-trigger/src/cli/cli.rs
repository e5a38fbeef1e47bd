use std::env;
use std::process::ExitCode;

use clap::Parser;

use crate::runtime;

const API_URL_ENV: &str = "ONBOARDING_API_URL";
const AUTH_TOKEN_ENV: &str = "ONBOARDING_AUTH_TOKEN";
const DEFAULT_BASE_URL: &str = "https://app.onboardhq.io";

#[derive(Parser)]
#[command(
    name = "email-trigger",
    version,
    about = "Trigger dispatch of pending onboarding emails",
    long_about = "Calls the application's tRPC endpoint to send queued onboarding emails \
to new users, retrying transient failures on a fixed delay.",
    after_help = "\
EXAMPLES:
    email-trigger --url https://app.onboardhq.io
    ONBOARDING_API_URL=https://staging.onboardhq.io email-trigger --retry 5"
)]
struct Cli {
    /// Base URL of the target application (default: $ONBOARDING_API_URL, else
    /// the production host)
    #[arg(long)]
    url: Option<String>,

    /// Bearer token for API requests (default: $ONBOARDING_AUTH_TOKEN)
    #[arg(long)]
    auth_token: Option<String>,

    /// Number of attempts before giving up on retryable failures
    #[arg(long, default_value_t = 3)]
    retry: u32,
}

/// Entry function for the CLI. Resolves flag/env/default precedence and maps
/// the run outcome onto the process exit code.
pub async fn run() -> ExitCode {
    let cli = Cli::parse();

    let url = cli
        .url
        .or_else(|| env::var(API_URL_ENV).ok())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    if url.trim().is_empty() {
        tracing::error!(
            "No URL provided. Use --url or set the {API_URL_ENV} environment variable."
        );
        return ExitCode::FAILURE;
    }

    let auth_token = cli.auth_token.or_else(|| env::var(AUTH_TOKEN_ENV).ok());

    match runtime::runtime::run_email_trigger(&url, auth_token, cli.retry).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!(error = %err, "Email trigger run aborted");
            ExitCode::FAILURE
        }
    }
}

mod instrumentation;
mod runtime;
mod trigger;
mod waker;

use std::process::ExitCode;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // The guard owns the background file writer; it must outlive the run so
    // buffered lines reach the shared log file before the process exits.
    let _guard = instrumentation::tracing::init_tracing();
    instrumentation::tracing::init_panic_handler();

    // No CLI layer: this binary takes no flags, everything is fixed at build
    // time.
    match runtime::runtime::run_sandbox_waker().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!(error = %err, "Sandbox wake automation aborted");
            ExitCode::FAILURE
        }
    }
}

mod cli;
mod instrumentation;
mod runtime;
mod trigger;

use std::process::ExitCode;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // The guard owns the background file writer; it must outlive the run so
    // buffered lines reach the shared log file before the process exits.
    let _guard = instrumentation::tracing::init_tracing();
    instrumentation::tracing::init_panic_handler();

    // Main entrypoint simply delegates control to the CLI layer.
    cli::cli::run().await
}

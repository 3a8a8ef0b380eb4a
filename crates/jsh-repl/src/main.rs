//! jsh entry point.

use std::process::ExitCode;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> ExitCode {
    // Respects RUST_LOG. Diagnostics go to stderr; stdout belongs to
    // the jobs.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    match jsh_repl::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("jsh: {e:#}");
            ExitCode::FAILURE
        }
    }
}

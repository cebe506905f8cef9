pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;

#[cfg(test)]
pub(crate) mod test_support;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::interfaces::cli::{execute, Cli};

pub use crate::application::use_cases::generation::TestCaseGenerator;
pub use crate::domain::error::{AppError, Result};
pub use crate::domain::test_case::{TestCase, TestType};

/// Entry point of the `interface-gen` binary.
pub fn run() {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise info, or debug with --verbose.
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(execute(cli)) {
        tracing::error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

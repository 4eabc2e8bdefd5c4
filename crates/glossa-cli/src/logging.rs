//! Logging initialization for the CLI.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Initialize tracing with a verbosity-derived filter.
///
/// `RUST_LOG` overrides the flag-derived level when set.
pub fn initialize(verbose: u8, quiet: bool) -> Result<()> {
    let default_level = if quiet {
        "off"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("glossa_core={default_level},glossa_cli={default_level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

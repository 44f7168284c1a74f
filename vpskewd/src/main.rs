//! vpskew Daemon
//!
//! Runs one strategy cycle per minute boundary against the configured venue.
//!
//! # Usage
//!
//! ```bash
//! # Start with default configuration
//! cargo run -p vpskewd
//!
//! # Test environment, JSON logs, audit trail visible
//! VPSKEW_ENV=test VPSKEW_LOG_FORMAT=json RUST_LOG=vpskewd=info,vpskew::audit=info cargo run -p vpskewd
//! ```
//!
//! # Environment Variables
//!
//! - `VPSKEW_ENV`: Environment (test, development, production)
//! - `VPSKEW_SYMBOL`: Instrument symbol (default: XAUUSDm)
//! - `VPSKEW_DIGITS`: Quoted decimal places (default: 2)
//! - `VPSKEW_MAX_POSITIONS`: Concurrent position cap (default: 5)
//! - `VPSKEW_SKEW_THRESHOLD`: Minimum |skew| (default: 0.1)
//! - `VPSKEW_SIZING`: fixed, risk or margin (default: fixed)
//! - `VPSKEW_LOG_FORMAT`: text or json (default: text)

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vpskewd::{Config, Daemon, DaemonError, Environment};

/// Daemon, driver and controller decisions plus the audit trail
const DEFAULT_LOG_FILTER: &str = "vpskewd=info,vpskew_exec=info,vpskew_engine=info,vpskew::audit=info";

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load .env before reading RUST_LOG
    let _ = dotenvy::dotenv();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("VPSKEW_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::registry().with(fmt::layer().json()).with(filter).init();
    } else {
        tracing_subscriber::registry().with(fmt::layer()).with(filter).init();
    }

    // Load configuration
    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        symbol = %config.instrument.symbol,
        max_positions = config.controller.max_positions,
        "vpskew daemon"
    );

    if config.environment == Environment::Production {
        return Err(DaemonError::Startup("no live venue adapter is linked into this build".to_string()).into());
    }

    // Create and run daemon
    let daemon = Daemon::new_stub(config);
    daemon.run().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_covers_every_crate() {
        for target in ["vpskewd", "vpskew_exec", "vpskew_engine", "vpskew::audit"] {
            assert!(DEFAULT_LOG_FILTER.contains(&format!("{target}=info")), "{target} missing");
        }
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }
}

//! ws-auth-probe entry point.
//!
//! Runs one probe against the configured endpoint and logs the outcome.

use tracing_subscriber::EnvFilter;

use ws_auth_probe::config::ProbeConfig;
use ws_auth_probe::ws::run_probe;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = ProbeConfig::from_env()?;

    let report = run_probe(&config).await;

    if report.is_pass() {
        tracing::info!(verdict = ?report.verdict, frames = report.frames_received, "auth handshake behaved as expected");
    } else {
        tracing::warn!(
            state = ?report.state,
            frames = report.frames_received,
            error = report.error.as_deref().unwrap_or("-"),
            "no auth reply recognized"
        );
    }
    if let Ok(json) = serde_json::to_string(&report) {
        tracing::debug!(report = %json, "probe report");
    }
    tracing::info!("test complete");

    Ok(())
}

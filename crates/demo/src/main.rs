//! Runs the circuit breaker demo until Ctrl-C or the configured iteration
//! limit.
//!
//! Log verbosity follows `RUST_LOG` (default `info`); set it to
//! `breakwater_core=debug` to also see admission decisions.

use anyhow::Context;
use breakwater_demo::config::millis;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for Ctrl-C, running until iteration limit");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = breakwater_demo::config::load().context("failed to load demo configuration")?;
    tracing::info!(
        failure_threshold = config.breaker.failure_threshold,
        success_threshold = config.breaker.success_threshold,
        timeout_ms = millis(config.breaker.timeout),
        interval_ms = millis(config.interval),
        failure_rate = config.failure_rate,
        "starting circuit breaker demo"
    );

    breakwater_demo::run(config, shutdown_signal()).await.context("demo run failed")?;
    Ok(())
}

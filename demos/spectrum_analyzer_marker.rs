//! Read the marker power on a generic SCPI spectrum analyzer.
//!
//! Edit the `[spectrum_analyzer]` block of `config/drivers.toml` before
//! running:
//!
//! ```bash
//! cargo run --example spectrum_analyzer_marker
//! ```

use anyhow::{anyhow, Context, Result};
use measurement_drivers::config::DriversConfig;
use measurement_drivers::logging;
use measurement_drivers::prelude::*;
use tracing::warn;

#[tokio::main]
async fn main() -> Result<()> {
    let config = DriversConfig::load().context("loading config/drivers.toml")?;
    logging::init(&config.logging);

    let sa_config = config
        .spectrum_analyzer
        .ok_or_else(|| anyhow!("no [spectrum_analyzer] block configured"))?;
    let mut sa = SpectrumAnalyzer::connect(&sa_config).await?;

    let center_hz = 10.0e9;
    let span_hz = 50.0e6;
    let rbw_hz = 100e3;

    sa.set_center_frequency(center_hz).await?;
    sa.set_span(span_hz).await?;
    sa.set_rbw(rbw_hz).await?;

    // Not every analyzer accepts a marker position over SCPI
    if let Err(e) = sa.set_marker_frequency(center_hz).await {
        warn!(error = %e, "Could not place marker at center");
    }

    let power_dbm = sa.read_marker_power().await?;
    println!(
        "Marker power at ~{:.6} GHz: {:.2} dBm",
        center_hz / 1e9,
        power_dbm
    );

    sa.close().await?;
    Ok(())
}

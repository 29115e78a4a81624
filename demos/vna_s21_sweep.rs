//! Acquire an S21 sweep from a Rohde & Schwarz ZNL20 VNA.
//!
//! Edit the `[vna]` block of `config/drivers.toml` before running:
//!
//! ```bash
//! cargo run --example vna_s21_sweep
//! ```

use anyhow::{anyhow, Context, Result};
use measurement_drivers::config::DriversConfig;
use measurement_drivers::logging;
use measurement_drivers::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    let config = DriversConfig::load().context("loading config/drivers.toml")?;
    logging::init(&config.logging);

    let vna_config = config
        .vna
        .ok_or_else(|| anyhow!("no [vna] block configured"))?;
    let mut vna = Vna::connect(&vna_config).await?;

    let center_hz = 6.0e9;
    let span_hz = 200e6;
    let npoints = 1601;

    vna.set_center_frequency(center_hz).await?;
    vna.set_span(span_hz).await?;
    vna.set_sweep_points(npoints).await?;

    let entry = vna.select_or_create_trace("Trc1", SParameter::S21, 1).await?;
    if !entry.is_no_error() {
        println!("Trace setup reported: {}", entry);
    }
    vna.single_sweep(true).await?;

    let trace = vna.get_trace_data(1).await?;
    if let (Some(first), Some(last), Some(s21)) = (
        trace.frequencies_hz.first(),
        trace.frequencies_hz.last(),
        trace.values.first(),
    ) {
        println!("Acquired {} points.", trace.len());
        println!("f[0]={:.3e} Hz, f[-1]={:.3e} Hz", first, last);
        println!("S21[0]={} ({:.2} dB)", s21, 20.0 * s21.norm().log10());
    }

    vna.close().await?;
    Ok(())
}

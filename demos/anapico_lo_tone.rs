//! Set a CW LO tone on an AnaPico APSIN20G signal generator.
//!
//! Edit `config/drivers.toml` (or set `MCD_SIGNAL_GENERATOR__RESOURCE`)
//! before running:
//!
//! ```bash
//! cargo run --example anapico_lo_tone --features instrument_visa
//! ```

use anyhow::{anyhow, Context, Result};
use measurement_drivers::config::DriversConfig;
use measurement_drivers::logging;
use measurement_drivers::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<()> {
    let config = DriversConfig::load().context("loading config/drivers.toml")?;
    logging::init(&config.logging);

    let sg_config = config
        .signal_generator
        .ok_or_else(|| anyhow!("no [signal_generator] block configured"))?;
    let mut sg = SignalGenerator::connect(&sg_config).await?;

    let lo_freq_hz = 10.0e9;
    let lo_power_dbm = -5.0;

    sg.set_frequency(lo_freq_hz).await?;
    sg.set_power(lo_power_dbm).await?;
    sg.rf_on().await?;

    println!(
        "LO ON: f = {:.6} GHz, P = {:.2} dBm",
        lo_freq_hz / 1e9,
        lo_power_dbm
    );
    println!("Press Enter to turn RF OFF and exit...");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;

    sg.rf_off().await?;
    sg.close().await?;
    Ok(())
}

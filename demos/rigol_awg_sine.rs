//! Output a sine wave on a Rigol DG922 Pro.
//!
//! Edit the `[awg]` block of `config/drivers.toml` before running:
//!
//! ```bash
//! cargo run --example rigol_awg_sine --features instrument_visa
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

    let awg_config = config
        .awg
        .ok_or_else(|| anyhow!("no [awg] block configured"))?;
    let mut awg = RigolDg922Pro::connect(&awg_config).await?;

    let channel = 1;
    let freq_hz = 1_000.0;
    let amp_vpp = 1.0;

    awg.set_waveform(channel, Waveform::Sine).await?;
    awg.set_frequency(channel, freq_hz).await?;
    awg.set_amplitude(channel, amp_vpp).await?;
    awg.output_on(channel).await?;

    println!(
        "AWG CH{} ON: SIN, f = {:.2} Hz, A = {:.3} Vpp",
        channel, freq_hz, amp_vpp
    );
    println!("Press Enter to turn output OFF and exit...");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;

    awg.output_off(channel).await?;
    awg.close().await?;
    Ok(())
}

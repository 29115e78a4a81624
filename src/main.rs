//! CLI entry point for measurement_drivers
//!
//! Sends ad hoc SCPI to any instrument, either by resource address or by
//! the name of an instrument block in the configuration file.
//!
//! # Usage
//!
//! ```bash
//! measurement_drivers idn --resource 192.168.0.30
//! measurement_drivers query --instrument vna "SENS:FREQ:STAR?"
//! measurement_drivers values --instrument spectrum-analyzer "TRAC:DATA? TRACE1" --json
//! measurement_drivers errors --resource "USB0::0x1AB1::0x0646::DG9R264500967::INSTR"
//! measurement_drivers config
//! ```

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use measurement_drivers::config::{DriversConfig, InstrumentConfig};
use measurement_drivers::instrument::{Session, DEFAULT_ERROR_READS};
use measurement_drivers::logging;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

#[derive(Parser)]
#[command(name = "measurement_drivers")]
#[command(about = "Send SCPI commands to lab instruments", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = "config/drivers.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the parsed *IDN? reply
    Idn {
        #[command(flatten)]
        target: Target,
    },
    /// Send a command that has no reply
    Write {
        #[command(flatten)]
        target: Target,
        /// SCPI command
        command: String,
    },
    /// Send a query and print the reply
    Query {
        #[command(flatten)]
        target: Target,
        /// SCPI query
        command: String,
    },
    /// Send a query returning an array (ASCII or binary block)
    Values {
        #[command(flatten)]
        target: Target,
        /// SCPI query
        command: String,
        /// Print a JSON array instead of one value per line
        #[arg(long)]
        json: bool,
        /// Binary blocks carry 4-byte floats (`FORM REAL,32`)
        #[arg(long)]
        real32: bool,
    },
    /// Drain and print the error queue
    Errors {
        #[command(flatten)]
        target: Target,
    },
    /// Print the effective configuration (file plus MCD_ overrides)
    Config,
}

#[derive(Args)]
struct Target {
    /// VISA resource string or bare IP address
    #[arg(long, conflicts_with = "instrument")]
    resource: Option<String>,

    /// Instrument block from the configuration file
    #[arg(long, value_enum)]
    instrument: Option<Instrument>,

    /// Override the I/O timeout
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Instrument {
    Vna,
    SignalGenerator,
    Awg,
    SpectrumAnalyzer,
}

impl Target {
    fn resolve(&self, config: &DriversConfig) -> Result<InstrumentConfig> {
        let mut instrument = match (&self.resource, self.instrument) {
            (Some(resource), _) => InstrumentConfig::new(resource.as_str()),
            (None, Some(name)) => {
                let block = match name {
                    Instrument::Vna => config.vna.clone(),
                    Instrument::SignalGenerator => config.signal_generator.clone(),
                    Instrument::Awg => config.awg.clone(),
                    Instrument::SpectrumAnalyzer => {
                        config.spectrum_analyzer.clone().map(|sa| sa.instrument)
                    }
                };
                block.ok_or_else(|| anyhow!("instrument is not configured"))?
            }
            (None, None) => return Err(anyhow!("pass --resource or --instrument")),
        };
        if let Some(ms) = self.timeout_ms {
            instrument = instrument.with_timeout(Duration::from_millis(ms));
        }
        Ok(instrument)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = DriversConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    logging::init(&config.logging);
    debug!(config = %cli.config.display(), "Configuration loaded");

    match cli.command {
        Commands::Idn { target } => {
            let mut session = open(&target, &config).await?;
            let identity = session.identify().await?;
            println!("Manufacturer: {}", identity.manufacturer);
            println!("Model:        {}", identity.model);
            println!("Serial:       {}", identity.serial);
            println!("Firmware:     {}", identity.firmware);
            session.close().await?;
        }
        Commands::Write { target, command } => {
            let mut session = open(&target, &config).await?;
            session.write(&command).await?;
            session.close().await?;
        }
        Commands::Query { target, command } => {
            let mut session = open(&target, &config).await?;
            println!("{}", session.query(&command).await?);
            session.close().await?;
        }
        Commands::Values {
            target,
            command,
            json,
            real32,
        } => {
            let mut session = open(&target, &config).await?;
            let values: Vec<f64> = if real32 {
                let narrow = session.query_binary::<f32>(&command).await?;
                narrow.into_iter().map(f64::from).collect()
            } else {
                session.query_binary::<f64>(&command).await?
            };
            if json {
                println!("{}", serde_json::to_string(&values)?);
            } else {
                for value in &values {
                    println!("{}", value);
                }
            }
            session.close().await?;
        }
        Commands::Errors { target } => {
            let mut session = open(&target, &config).await?;
            let errors = session.check_errors(DEFAULT_ERROR_READS).await?;
            if errors.is_empty() {
                println!("No errors");
            }
            for entry in &errors {
                println!("{}", entry);
            }
            session.close().await?;
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

async fn open(target: &Target, config: &DriversConfig) -> Result<Session> {
    let instrument = target.resolve(config)?;
    Session::connect(&instrument)
        .await
        .with_context(|| format!("connecting to {}", instrument.resource))
}

//! Driver Configuration System
//!
//! Instrument addresses and session settings are passed to drivers as explicit
//! configuration structs rather than process-wide globals. A whole lab setup
//! can be described in one TOML file and loaded with Figment.
//!
//! # Configuration Sources
//!
//! Configuration is loaded from (in order of precedence):
//! 1. Environment variables prefixed with `MCD_` (nested keys separated by `__`)
//! 2. TOML configuration file (default: `config/drivers.toml`)
//!
//! # Example
//!
//! ```no_run
//! use measurement_drivers::config::DriversConfig;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DriversConfig::load()?;
//!     if let Some(vna) = &config.vna {
//!         println!("VNA at {} ({} ms timeout)", vna.resource, vna.timeout_ms);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Environment Variables
//!
//! ```text
//! # Point the signal generator somewhere else
//! MCD_SIGNAL_GENERATOR__RESOURCE="TCPIP0::192.168.0.21::INSTR"
//!
//! # Longer VNA timeout
//! MCD_VNA__TIMEOUT_MS=20000
//!
//! # Log level
//! MCD_LOGGING__LEVEL=debug
//! ```

pub mod drivers_config;

pub use drivers_config::{
    ConfigError, DriversConfig, InstrumentConfig, LoggingConfig, SpectrumAnalyzerConfig,
    TransportKind,
};

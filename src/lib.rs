//! SCPI/VISA drivers for microwave lab instruments.
//!
//! Thin, typed command wrappers for:
//! - a Rohde & Schwarz ZNL20 vector network analyzer ([`drivers::Vna`])
//! - an AnaPico APSIN20G signal generator ([`drivers::SignalGenerator`])
//! - a Rigol DG922 Pro arbitrary waveform generator ([`drivers::RigolDg922Pro`])
//! - a generic SCPI spectrum analyzer ([`drivers::SpectrumAnalyzer`])
//!
//! Each driver owns one [`instrument::Session`], turns method calls into
//! SCPI text and parses replies (including IEEE 488.2 binary blocks) back
//! into numbers and traces.
//!
//! # Features
//!
//! - `instrument_visa` - VISA transport via `visa-rs` (needs a VISA runtime).
//!   Without it, LAN instruments are reached over the raw SCPI socket.
//!
//! # Example
//!
//! ```no_run
//! use measurement_drivers::config::InstrumentConfig;
//! use measurement_drivers::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = InstrumentConfig::new("192.168.0.20");
//!     let mut lo = SignalGenerator::connect(&config).await?;
//!     lo.configure_sine_output(10e9, -5.0, true).await?;
//!     lo.close().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod drivers;
pub mod error;
pub mod instrument;
pub mod logging;
pub mod scpi;
pub mod trace;
pub mod transport;

pub use error::{DriverError, DriverResult};

/// Everything a measurement script usually needs
pub mod prelude {
    pub use crate::drivers::awg::{ArbitraryWaveform, SineSettings, TriggerSource, Waveform};
    pub use crate::drivers::spectrum_analyzer::{
        Attenuation, BandwidthSettings, CommandStyle, Detector, PeakDirection, PowerUnit,
        SweepTime, TraceFormat,
    };
    pub use crate::drivers::vna::SParameter;
    pub use crate::drivers::{RigolDg922Pro, SignalGenerator, SpectrumAnalyzer, Vna};
    pub use crate::error::{DriverError, DriverResult};
    pub use crate::instrument::{ScpiInstrument, Session};
    pub use crate::trace::{ComplexTrace, SweepTrace};
}

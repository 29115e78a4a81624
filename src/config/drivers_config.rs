//! Driver configuration using Figment
//!
//! Strongly-typed configuration for the four instrument drivers and the
//! logging subscriber. Every section is optional so a script that only talks
//! to one instrument only needs that instrument's block.
//!
//! ```toml
//! [logging]
//! level = "info"
//!
//! [vna]
//! resource = "192.168.0.30"            # bare IP: hislip0 then inst0
//! timeout_ms = 5000                    # VNA default; other blocks use 10000
//!
//! [signal_generator]
//! resource = "USB0::0x03EB::0xAFFF::121-4396D0002-1156::INSTR"
//!
//! [spectrum_analyzer]
//! resource = "TCPIP0::192.168.0.50::hislip0::INSTR"
//! command_style = "sense"
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::drivers::spectrum_analyzer::CommandStyle;
use crate::scpi::block::ByteOrder;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Figment could not read or deserialize a source.
    #[error("Configuration load error: {0}")]
    LoadError(#[from] figment::Error),
    /// Values were read but are not usable.
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

/// Top-level configuration for a lab setup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriversConfig {
    /// Logging subscriber settings
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Rohde & Schwarz ZNL20 vector network analyzer (timeout defaults to 5 s)
    #[serde(default, deserialize_with = "deserialize_vna")]
    pub vna: Option<InstrumentConfig>,
    /// AnaPico APSIN20G signal generator
    #[serde(default)]
    pub signal_generator: Option<InstrumentConfig>,
    /// Rigol DG922 Pro arbitrary waveform generator
    #[serde(default)]
    pub awg: Option<InstrumentConfig>,
    /// Generic SCPI spectrum analyzer
    #[serde(default)]
    pub spectrum_analyzer: Option<SpectrumAnalyzerConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Which transport implementation a session should use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// VISA when compiled with `instrument_visa`, raw socket otherwise
    #[default]
    Auto,
    /// VISA library via `visa-rs`
    Visa,
    /// Raw SCPI over TCP (port 5025 by default)
    Socket,
}

/// Connection settings for a single instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// VISA resource string (e.g., "TCPIP0::192.168.1.100::INSTR") or bare host/IP
    pub resource: String,
    /// I/O timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Transport selection
    #[serde(default)]
    pub transport: TransportKind,
    /// Terminator stripped from replies
    #[serde(default = "default_terminator")]
    pub read_terminator: String,
    /// Terminator appended to commands
    #[serde(default = "default_terminator")]
    pub write_terminator: String,
    /// TCP port used by the socket transport
    #[serde(default = "default_socket_port")]
    pub socket_port: u16,
    /// Byte order of binary block payloads
    #[serde(default)]
    pub byte_order: ByteOrder,
}

/// Spectrum analyzer settings: connection plus SCPI dialect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumAnalyzerConfig {
    /// Connection settings
    #[serde(flatten)]
    pub instrument: InstrumentConfig,
    /// Header style used for SENSe subsystem commands
    #[serde(default)]
    pub command_style: CommandStyle,
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_vna_timeout_ms() -> u64 {
    5_000
}

/// The `vna` block uses its own timeout default; other fields as usual.
fn deserialize_vna<'de, D>(deserializer: D) -> Result<Option<InstrumentConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(mut block) = Option::<toml::Table>::deserialize(deserializer)? else {
        return Ok(None);
    };
    block
        .entry("timeout_ms")
        .or_insert_with(|| toml::Value::Integer(default_vna_timeout_ms() as i64));
    toml::Value::Table(block)
        .try_into()
        .map(Some)
        .map_err(de::Error::custom)
}

fn default_terminator() -> String {
    "\n".to_string()
}

fn default_socket_port() -> u16 {
    5025
}

// ============================================================================
// Builders
// ============================================================================

impl InstrumentConfig {
    /// Settings for `resource` with default timeout, terminators and transport
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            timeout_ms: default_timeout_ms(),
            transport: TransportKind::Auto,
            read_terminator: default_terminator(),
            write_terminator: default_terminator(),
            socket_port: default_socket_port(),
            byte_order: ByteOrder::default(),
        }
    }

    /// Set the I/O timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Select the transport implementation
    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    /// Set the terminator stripped from replies
    pub fn with_read_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.read_terminator = terminator.into();
        self
    }

    /// Set the terminator appended to commands
    pub fn with_write_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.write_terminator = terminator.into();
        self
    }

    /// Set the TCP port for the socket transport
    pub fn with_socket_port(mut self, port: u16) -> Self {
        self.socket_port = port;
        self
    }

    /// Set the byte order of binary blocks
    pub fn with_byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    /// I/O timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Check the settings for one named instrument block
    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.resource.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "Instrument '{}': 'resource' cannot be empty",
                name
            )));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(format!(
                "Instrument '{}': 'timeout_ms' must be > 0",
                name
            )));
        }
        if self.read_terminator.is_empty() || self.write_terminator.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "Instrument '{}': terminators cannot be empty",
                name
            )));
        }
        if self.socket_port == 0 {
            return Err(ConfigError::ValidationError(format!(
                "Instrument '{}': 'socket_port' must be > 0",
                name
            )));
        }
        Ok(())
    }
}

impl SpectrumAnalyzerConfig {
    /// Settings for `resource` using the short command style
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            instrument: InstrumentConfig::new(resource),
            command_style: CommandStyle::default(),
        }
    }

    /// Select the SENSe header style
    pub fn with_command_style(mut self, style: CommandStyle) -> Self {
        self.command_style = style;
        self
    }
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl DriversConfig {
    /// Load configuration from `config/drivers.toml` and environment variables
    ///
    /// # Errors
    ///
    /// Returns a ConfigError if the file cannot be parsed or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config/drivers.toml")
    }

    /// Load configuration from a specific file path
    ///
    /// Environment variables prefixed with `MCD_` override file values.
    /// A missing file is treated as empty, so env-only setups work.
    ///
    /// # Errors
    ///
    /// Returns a ConfigError if the file cannot be parsed or validation fails.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("MCD_").split("__"))
            .extract()
            .map_err(ConfigError::LoadError)?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - Every configured instrument has a resource, a non-zero timeout and
    ///   non-empty terminators
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        if let Some(vna) = &self.vna {
            vna.validate("vna")?;
        }
        if let Some(sg) = &self.signal_generator {
            sg.validate("signal_generator")?;
        }
        if let Some(awg) = &self.awg {
            awg.validate("awg")?;
        }
        if let Some(sa) = &self.spectrum_analyzer {
            sa.instrument.validate("spectrum_analyzer")?;
        }

        Ok(())
    }
}

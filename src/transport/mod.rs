//! Byte-level links to instruments.
//!
//! A [`Transport`] moves whole messages: `write` sends one already-terminated
//! command, `read_message` returns one reply including its terminator (and the
//! full payload of a binary block, even when that payload contains the
//! terminator byte). Everything above this layer, such as terminators,
//! timeouts and parsing, lives in [`crate::instrument::Session`]. After a
//! timed-out read the session calls [`Transport::clear`] to drop whatever
//! the instrument sends late.
//!
//! Implementations:
//! - [`socket::SocketTransport`]: raw SCPI over TCP, always available
//! - `visa::VisaTransport`: VISA library via `visa-rs` (feature `instrument_visa`)
//! - [`mock::MockTransport`]: scripted replies for tests and demos

pub mod mock;
pub mod socket;
#[cfg(feature = "instrument_visa")]
pub mod visa;

pub use mock::MockTransport;
pub use socket::SocketTransport;

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{InstrumentConfig, TransportKind};
use crate::error::{DriverError, DriverResult};
use crate::scpi::ResourceAddress;

/// Message-oriented link to one instrument.
///
/// Methods take `&mut self`: a transport serves one exchange at a time.
#[async_trait]
pub trait Transport: Send {
    /// Send `data` exactly as given (the caller appends the terminator).
    async fn write(&mut self, data: &[u8]) -> DriverResult<()>;

    /// Read one complete reply, terminator included if the device sent one.
    async fn read_message(&mut self) -> DriverResult<Vec<u8>>;

    /// Discard input until the link has stayed quiet for `quiet`.
    ///
    /// Called after a read times out so that a reply arriving late is not
    /// taken as the answer to the next query. Returns the number of bytes
    /// discarded, where the link can tell.
    async fn clear(&mut self, quiet: Duration) -> DriverResult<usize>;

    /// Release the underlying handle. Further I/O fails.
    async fn close(&mut self) -> DriverResult<()>;

    /// Resource string this transport is connected to.
    fn resource(&self) -> &str;
}

/// Per-link settings derived from an [`InstrumentConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportSettings {
    /// Open and I/O timeout
    pub timeout: Duration,
    /// Last byte of the read terminator; marks the end of a reply
    pub read_terminator: u8,
    /// TCP port for the socket transport
    pub socket_port: u16,
}

impl TransportSettings {
    /// Derive link settings from instrument configuration.
    pub fn from_config(config: &InstrumentConfig) -> Self {
        Self {
            timeout: config.timeout(),
            read_terminator: config.read_terminator.bytes().last().unwrap_or(b'\n'),
            socket_port: config.socket_port,
        }
    }
}

/// Open the transport selected by `config`.
///
/// With [`TransportKind::Auto`], VISA is used when compiled in and the raw
/// socket transport otherwise. A bare host is expanded into candidate
/// resources which are tried in order; the first that opens wins.
///
/// # Errors
/// `Connection` when no candidate opens, `FeatureNotEnabled` when VISA was
/// requested without the `instrument_visa` feature.
pub async fn open(config: &InstrumentConfig) -> DriverResult<Box<dyn Transport>> {
    let address = ResourceAddress::parse(&config.resource)?;
    let settings = TransportSettings::from_config(config);

    let kind = match config.transport {
        TransportKind::Auto if cfg!(feature = "instrument_visa") => TransportKind::Visa,
        TransportKind::Auto => TransportKind::Socket,
        other => other,
    };
    debug!(resource = %address, transport = ?kind, "Opening transport");

    match kind {
        TransportKind::Visa => open_visa(&address, settings).await,
        _ => {
            let target = address.socket_target(settings.socket_port)?;
            let transport = SocketTransport::connect(&target, settings).await?;
            info!(resource = %address, target = %target, "Socket transport connected");
            Ok(Box::new(transport))
        }
    }
}

#[cfg(feature = "instrument_visa")]
async fn open_visa(
    address: &ResourceAddress,
    settings: TransportSettings,
) -> DriverResult<Box<dyn Transport>> {
    let mut failures = Vec::new();
    for candidate in address.visa_candidates() {
        match visa::VisaTransport::open(&candidate, settings).await {
            Ok(transport) => {
                info!(resource = %candidate, "VISA session opened");
                return Ok(Box::new(transport));
            }
            Err(e) => {
                debug!(resource = %candidate, error = %e, "VISA candidate failed");
                failures.push(format!("{}: {}", candidate, e));
            }
        }
    }
    Err(DriverError::connection(
        &address.to_string(),
        format!("no VISA resource could be opened ({})", failures.join("; ")),
    ))
}

#[cfg(not(feature = "instrument_visa"))]
async fn open_visa(
    _address: &ResourceAddress,
    _settings: TransportSettings,
) -> DriverResult<Box<dyn Transport>> {
    Err(DriverError::FeatureNotEnabled("instrument_visa".to_string()))
}

//! Sessions and the behavior shared by every instrument driver.
//!
//! [`Session`] owns the transport and does the SCPI framing. Drivers hold a
//! session and implement [`ScpiInstrument`], which supplies the common
//! IEEE 488.2 operations on top of it.

pub mod session;

pub use session::{Session, DEFAULT_ERROR_READS};

use async_trait::async_trait;

use crate::error::DriverResult;
use crate::scpi::{ErrorEntry, Identity};

/// Common operations of a SCPI instrument driver.
///
/// Implementors only provide access to their session; everything else has a
/// default that goes straight to it. Drivers override [`ScpiInstrument::reset`]
/// and [`ScpiInstrument::close`] where the instrument needs more than `*RST`
/// or a plain release.
#[async_trait]
pub trait ScpiInstrument: Send {
    /// Short model name used in logs
    fn model(&self) -> &'static str;

    /// The underlying session
    fn session(&self) -> &Session;

    /// The underlying session, mutably
    fn session_mut(&mut self) -> &mut Session;

    /// `false` once the driver has been closed
    fn is_open(&self) -> bool {
        self.session().is_open()
    }

    /// Send a raw command
    async fn write(&mut self, command: &str) -> DriverResult<()> {
        self.session_mut().write(command).await
    }

    /// Send a raw query
    async fn query(&mut self, command: &str) -> DriverResult<String> {
        self.session_mut().query(command).await
    }

    /// `*IDN?`
    async fn identify(&mut self) -> DriverResult<Identity> {
        self.session_mut().identify().await
    }

    /// `*RST`, optionally waiting for the instrument to settle
    async fn reset(&mut self, wait: bool) -> DriverResult<()> {
        self.session_mut().reset(wait).await
    }

    /// Drain the error queue; returns only real errors
    async fn check_errors(&mut self) -> DriverResult<Vec<ErrorEntry>> {
        self.session_mut().check_errors(DEFAULT_ERROR_READS).await
    }

    /// Release the session. Safe to call more than once.
    async fn close(&mut self) -> DriverResult<()> {
        self.session_mut().close().await
    }
}

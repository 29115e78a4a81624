//! VISA transport via `visa-rs`.
//!
//! VISA calls block, so every operation runs on tokio's blocking pool. The
//! resource manager is kept alive next to the instrument session; both are
//! released when the transport is closed or dropped.

use async_trait::async_trait;
use std::ffi::CString;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, trace};
use visa_rs::prelude::*;

use super::{Transport, TransportSettings};
use crate::error::{DriverError, DriverResult};
use crate::scpi::block::{self, Completion};

/// Size of each VISA read
const READ_CHUNK: usize = 64 * 1024;

struct VisaSession {
    instrument: Instrument,
    _rm: DefaultRM,
}

/// VISA session to one instrument
pub struct VisaTransport {
    resource: String,
    session: Option<Arc<Mutex<VisaSession>>>,
    settings: TransportSettings,
}

impl VisaTransport {
    /// Open `resource` through the default VISA resource manager.
    ///
    /// # Errors
    /// `Connection` if the resource manager or the resource cannot be opened.
    pub async fn open(resource: &str, settings: TransportSettings) -> DriverResult<Self> {
        let name = resource.to_string();
        let session = tokio::task::spawn_blocking(move || -> DriverResult<VisaSession> {
            let rm = DefaultRM::new().map_err(|e| DriverError::connection(&name, e))?;
            let c_string = CString::new(name.as_str())
                .map_err(|e| DriverError::connection(&name, e))?;
            let visa_string = visa_rs::VisaString::from(c_string);
            let instrument = rm
                .open(&visa_string, AccessMode::NO_LOCK, settings.timeout)
                .map_err(|e| DriverError::connection(&name, e))?;

            let timeout_ms = u32::try_from(settings.timeout.as_millis()).unwrap_or(u32::MAX);
            let attr = visa_rs::attribute::AttrTmoValue::new_checked(timeout_ms).ok_or_else(
                || DriverError::connection(&name, format!("invalid VISA timeout {} ms", timeout_ms)),
            )?;
            instrument
                .set_attr(attr)
                .map_err(|e| DriverError::connection(&name, e))?;

            Ok(VisaSession {
                instrument,
                _rm: rm,
            })
        })
        .await
        .map_err(|e| DriverError::connection(resource, format!("VISA open task failed: {}", e)))??;

        debug!(resource = %resource, "VISA resource opened");
        Ok(Self {
            resource: resource.to_string(),
            session: Some(Arc::new(Mutex::new(session))),
            settings,
        })
    }

    fn session(&self) -> DriverResult<Arc<Mutex<VisaSession>>> {
        self.session
            .clone()
            .ok_or_else(|| DriverError::NotConnected(self.resource.clone()))
    }

    fn io_error(&self, error: io::Error) -> DriverError {
        if error.kind() == io::ErrorKind::TimedOut {
            // Session fills in the command
            DriverError::Timeout {
                command: String::new(),
                timeout: self.settings.timeout,
            }
        } else {
            DriverError::communication(&self.resource, error)
        }
    }
}

#[async_trait]
impl Transport for VisaTransport {
    async fn write(&mut self, data: &[u8]) -> DriverResult<()> {
        let session = self.session()?;
        let data = data.to_vec();
        let result = tokio::task::spawn_blocking(move || {
            let mut guard = session.lock().unwrap_or_else(PoisonError::into_inner);
            guard.instrument.write_all(&data)
        })
        .await
        .map_err(|e| DriverError::communication(&self.resource, e))?;

        result.map_err(|e| self.io_error(e))?;
        trace!(resource = %self.resource, "VISA write");
        Ok(())
    }

    async fn read_message(&mut self) -> DriverResult<Vec<u8>> {
        let session = self.session()?;
        let terminator = self.settings.read_terminator;
        let result = tokio::task::spawn_blocking(move || -> io::Result<Vec<u8>> {
            let mut guard = session.lock().unwrap_or_else(PoisonError::into_inner);
            let mut message = Vec::new();
            let mut chunk = vec![0u8; READ_CHUNK];
            loop {
                let n = guard.instrument.read(&mut chunk)?;
                message.extend_from_slice(&chunk[..n]);
                let buffer_full = n == chunk.len();
                match block::completion(&message, terminator) {
                    Completion::NeedBytes(_) if n > 0 => continue,
                    _ if buffer_full => continue,
                    _ => break,
                }
            }
            Ok(message)
        })
        .await
        .map_err(|e| DriverError::communication(&self.resource, e))?;

        let message = result.map_err(|e| self.io_error(e))?;
        trace!(resource = %self.resource, bytes = message.len(), "VISA read");
        Ok(message)
    }

    /// Device clear (`viClear`): the instrument drops its output queue, so
    /// `quiet` is not needed and the discarded byte count is unknown.
    async fn clear(&mut self, _quiet: Duration) -> DriverResult<usize> {
        let session = self.session()?;
        let resource = self.resource.clone();
        tokio::task::spawn_blocking(move || {
            let guard = session.lock().unwrap_or_else(PoisonError::into_inner);
            guard
                .instrument
                .clear()
                .map_err(|e| DriverError::communication(&resource, e))
        })
        .await
        .map_err(|e| DriverError::communication(&self.resource, e))??;
        debug!(resource = %self.resource, "VISA device clear");
        Ok(0)
    }

    async fn close(&mut self) -> DriverResult<()> {
        if let Some(session) = self.session.take() {
            // Dropping the last handle closes the VISA session
            tokio::task::spawn_blocking(move || drop(session))
                .await
                .map_err(|e| DriverError::communication(&self.resource, e))?;
            debug!(resource = %self.resource, "VISA resource closed");
        }
        Ok(())
    }

    fn resource(&self) -> &str {
        &self.resource
    }
}

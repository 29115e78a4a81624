//! SCPI session: one open transport plus framing, timeouts and parsing.
//!
//! Every operation is a single awaited round trip bounded by the session
//! timeout. Methods take `&mut self`, so a session (and the driver owning
//! it) cannot interleave two exchanges on the same handle.

use bytes::{BufMut, BytesMut};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::config::InstrumentConfig;
use crate::error::{DriverError, DriverResult};
use crate::scpi::block::{self, BlockValue, ByteOrder};
use crate::scpi::{self, ErrorEntry, Identity};
use crate::transport::{self, Transport};

/// Upper bound on `SYST:ERR?` reads in [`Session::check_errors`]
pub const DEFAULT_ERROR_READS: usize = 10;

/// Shortest quiet period that ends the discard after a timed-out read
const MIN_CLEAR_WINDOW: Duration = Duration::from_millis(500);

/// An open connection to one SCPI instrument
pub struct Session {
    resource: String,
    transport: Option<Box<dyn Transport>>,
    timeout: Duration,
    write_terminator: String,
    read_terminator: String,
    byte_order: ByteOrder,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("resource", &self.resource)
            .field("open", &self.is_open())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Session {
    /// Open a session as described by `config`.
    ///
    /// # Errors
    /// `Config` for invalid settings, `Connection` if no transport opens.
    pub async fn connect(config: &InstrumentConfig) -> DriverResult<Self> {
        config.validate(&config.resource)?;
        let transport = transport::open(config).await?;
        info!(
            resource = transport.resource(),
            timeout_ms = config.timeout_ms,
            "Session opened"
        );
        Ok(Self::with_transport(transport, config))
    }

    /// Open `address` with default terminators and the given timeout.
    pub async fn open(address: &str, timeout: Duration) -> DriverResult<Self> {
        Self::connect(&InstrumentConfig::new(address).with_timeout(timeout)).await
    }

    /// Wrap an already-open transport (used with [`crate::transport::MockTransport`]).
    pub fn with_transport(transport: Box<dyn Transport>, config: &InstrumentConfig) -> Self {
        Self {
            resource: transport.resource().to_string(),
            transport: Some(transport),
            timeout: config.timeout(),
            write_terminator: config.write_terminator.clone(),
            read_terminator: config.read_terminator.clone(),
            byte_order: config.byte_order,
        }
    }

    /// Resource the session was opened on
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// `false` once [`Session::close`] has run
    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Per-operation timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Change the per-operation timeout (e.g. around a long sweep)
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Byte order assumed for binary blocks
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Change the byte order assumed for binary blocks
    pub fn set_byte_order(&mut self, byte_order: ByteOrder) {
        self.byte_order = byte_order;
    }

    fn transport_mut(&mut self) -> DriverResult<&mut (dyn Transport + 'static)> {
        let resource = &self.resource;
        self.transport
            .as_deref_mut()
            .ok_or_else(|| DriverError::NotConnected(resource.clone()))
    }

    async fn send(&mut self, command: &str, message: &[u8]) -> DriverResult<()> {
        let timeout = self.timeout;
        let transport = self.transport_mut()?;
        match tokio::time::timeout(timeout, transport.write(message)).await {
            Ok(result) => result.map_err(|e| name_timeout(e, command)),
            Err(_) => Err(DriverError::Timeout {
                command: command.to_string(),
                timeout,
            }),
        }
    }

    async fn receive(&mut self, command: &str) -> DriverResult<Vec<u8>> {
        let timeout = self.timeout;
        let transport = self.transport_mut()?;
        let result = match tokio::time::timeout(timeout, transport.read_message()).await {
            Ok(result) => result.map_err(|e| name_timeout(e, command)),
            Err(_) => {
                warn!(command = %command, timeout_ms = timeout.as_millis() as u64, "Read timed out");
                Err(DriverError::Timeout {
                    command: command.to_string(),
                    timeout,
                })
            }
        };
        if matches!(result, Err(DriverError::Timeout { .. })) {
            self.discard_late_reply(command).await;
        }
        result
    }

    /// Drop a reply that may still arrive for a timed-out `command`.
    ///
    /// The timeout stays the reported error; a failing clear is only logged.
    async fn discard_late_reply(&mut self, command: &str) {
        let quiet = self.timeout.max(MIN_CLEAR_WINDOW);
        let Ok(transport) = self.transport_mut() else {
            return;
        };
        match transport.clear(quiet).await {
            Ok(0) => {}
            Ok(bytes) => debug!(command = %command, bytes, "Discarded late reply"),
            Err(e) => warn!(command = %command, error = %e, "Clearing input after timeout failed"),
        }
    }

    /// Send a command that produces no reply.
    pub async fn write(&mut self, command: &str) -> DriverResult<()> {
        let mut message = Vec::with_capacity(command.len() + self.write_terminator.len());
        message.extend_from_slice(command.as_bytes());
        message.extend_from_slice(self.write_terminator.as_bytes());
        self.send(command, &message).await?;
        debug!(resource = %self.resource, command = %command, "SCPI write");
        Ok(())
    }

    /// Send a query and return its raw reply bytes.
    pub async fn query_raw(&mut self, command: &str) -> DriverResult<Vec<u8>> {
        self.write(command).await?;
        let reply = self.receive(command).await?;
        trace!(resource = %self.resource, command = %command, bytes = reply.len(), "SCPI raw reply");
        Ok(reply)
    }

    /// Send a query and return its reply with terminator and whitespace
    /// stripped.
    pub async fn query(&mut self, command: &str) -> DriverResult<String> {
        let raw = self.query_raw(command).await?;
        let text = String::from_utf8_lossy(&raw);
        let reply = text
            .trim_end_matches('\0')
            .trim_end_matches(self.read_terminator.as_str())
            .trim()
            .to_string();
        debug!(resource = %self.resource, command = %command, reply = %reply, "SCPI query");
        Ok(reply)
    }

    /// Query a numeric value.
    pub async fn query_f64(&mut self, command: &str) -> DriverResult<f64> {
        let reply = self.query(command).await?;
        scpi::parse_f64(&reply)
    }

    /// Query a boolean state (`1`/`0`/`ON`/`OFF`).
    pub async fn query_bool(&mut self, command: &str) -> DriverResult<bool> {
        let reply = self.query(command).await?;
        scpi::parse_bool(&reply)
    }

    /// Query an array using the session byte order.
    ///
    /// The reply may be a binary block or delimited ASCII; the format is
    /// detected from the first byte.
    pub async fn query_binary<T: BlockValue>(&mut self, command: &str) -> DriverResult<Vec<T>> {
        let order = self.byte_order;
        self.query_binary_ordered(command, order).await
    }

    /// Query an array whose block elements use `order`.
    pub async fn query_binary_ordered<T: BlockValue>(
        &mut self,
        command: &str,
        order: ByteOrder,
    ) -> DriverResult<Vec<T>> {
        let raw = self.query_raw(command).await?;
        let values = block::parse_values::<T>(&raw, order)?;
        debug!(
            resource = %self.resource,
            command = %command,
            count = values.len(),
            "SCPI array reply"
        );
        Ok(values)
    }

    /// Send `prefix` followed by `values` as a definite-length block.
    ///
    /// The prefix carries the header and any separator, e.g.
    /// `":SOUR1:TRAC:DATA:DAC16 VOLATILE,END,"`.
    pub async fn write_binary<T: BlockValue>(
        &mut self,
        prefix: &str,
        values: &[T],
        order: ByteOrder,
    ) -> DriverResult<()> {
        let block = block::encode_block(values, order);
        let mut message =
            BytesMut::with_capacity(prefix.len() + block.len() + self.write_terminator.len());
        message.put_slice(prefix.as_bytes());
        message.put(block);
        message.put_slice(self.write_terminator.as_bytes());

        self.send(prefix, &message).await?;
        debug!(
            resource = %self.resource,
            prefix = %prefix,
            count = values.len(),
            bytes = message.len(),
            "SCPI block write"
        );
        Ok(())
    }

    /// `*IDN?`, parsed.
    pub async fn identify(&mut self) -> DriverResult<Identity> {
        let reply = self.query("*IDN?").await?;
        Ok(Identity::parse(&reply))
    }

    /// `*CLS`
    pub async fn clear_status(&mut self) -> DriverResult<()> {
        self.write("*CLS").await
    }

    /// `*CLS`, `*RST`, then `*OPC?` if `wait`.
    pub async fn reset(&mut self, wait: bool) -> DriverResult<()> {
        self.clear_status().await?;
        self.write("*RST").await?;
        if wait {
            self.wait_complete().await?;
        }
        Ok(())
    }

    /// Block on `*OPC?` until pending operations finish.
    pub async fn wait_complete(&mut self) -> DriverResult<()> {
        let reply = self.query("*OPC?").await?;
        if scpi::parse_bool(&reply)? {
            Ok(())
        } else {
            Err(DriverError::Parse(format!(
                "*OPC? answered '{}' instead of 1",
                reply
            )))
        }
    }

    /// Read one entry from the error queue.
    pub async fn next_error(&mut self) -> DriverResult<ErrorEntry> {
        let reply = self.query("SYST:ERR?").await?;
        ErrorEntry::parse(&reply)
    }

    /// Drain the error queue, reading at most `max_reads` entries.
    ///
    /// Returns only real errors; an empty vector means the queue was clean.
    pub async fn check_errors(&mut self, max_reads: usize) -> DriverResult<Vec<ErrorEntry>> {
        let mut errors = Vec::new();
        for _ in 0..max_reads {
            let entry = self.next_error().await?;
            if entry.is_no_error() {
                return Ok(errors);
            }
            warn!(resource = %self.resource, code = entry.code, message = %entry.message, "Instrument error");
            errors.push(entry);
        }
        debug!(resource = %self.resource, max_reads, "Error queue not drained");
        Ok(errors)
    }

    /// Release the transport. Safe to call more than once.
    pub async fn close(&mut self) -> DriverResult<()> {
        if let Some(mut transport) = self.transport.take() {
            transport.close().await?;
            info!(resource = %self.resource, "Session closed");
        }
        Ok(())
    }
}

/// Transports do not know which command timed out.
fn name_timeout(error: DriverError, command: &str) -> DriverError {
    match error {
        DriverError::Timeout { timeout, .. } => DriverError::Timeout {
            command: command.to_string(),
            timeout,
        },
        other => other,
    }
}

//! Scripted transport for testing drivers without hardware.
//!
//! Replies are registered per command. Writing a registered command queues
//! its reply for the next `read_message`; unregistered commands are logged
//! and produce nothing, so a query for them waits until the session times
//! out. Provides:
//! - Per-command reply scripts (the last reply repeats)
//! - Failure injection for the next operation
//! - A log of every message written
//! - Optional simulated latency

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::Transport;
use crate::error::{DriverError, DriverResult};

/// Mock transport; clones share state, so a test keeps one handle for
/// inspection after boxing another into a session.
///
/// # Example
///
/// ```
/// use measurement_drivers::config::InstrumentConfig;
/// use measurement_drivers::instrument::Session;
/// use measurement_drivers::transport::MockTransport;
///
/// # tokio_test::block_on(async {
/// let mock = MockTransport::new().with_reply("*IDN?", "Rigol,DG922Pro,DG9R264500967,00.01.06\n");
/// let mut session = Session::with_transport(
///     Box::new(mock.clone()),
///     &InstrumentConfig::new("MOCK0::INSTR"),
/// );
///
/// let identity = session.identify().await.unwrap();
/// assert_eq!(identity.model, "DG922Pro");
/// assert_eq!(mock.written(), vec!["*IDN?"]);
/// # });
/// ```
#[derive(Clone)]
pub struct MockTransport {
    resource: String,
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    scripts: HashMap<String, VecDeque<Vec<u8>>>,
    pending: VecDeque<Vec<u8>>,
    written: Vec<Vec<u8>>,
    fail_next: bool,
    silent: bool,
    closed: bool,
    close_count: usize,
    latency: Duration,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create a mock with no scripted replies
    pub fn new() -> Self {
        Self::with_resource("MOCK0::INSTR")
    }

    /// Create a mock reporting `resource` as its address
    pub fn with_resource(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Add a reply for `command` (builder form of [`Self::add_reply`])
    pub fn with_reply(self, command: &str, reply: impl AsRef<[u8]>) -> Self {
        self.add_reply(command, reply);
        self
    }

    /// Append a reply to the script for `command`.
    ///
    /// Replies are served in order; the last one keeps answering.
    pub fn add_reply(&self, command: &str, reply: impl AsRef<[u8]>) {
        self.lock()
            .scripts
            .entry(command.to_string())
            .or_default()
            .push_back(reply.as_ref().to_vec());
    }

    /// Replace the whole script for `command` with a single reply
    pub fn set_reply(&self, command: &str, reply: impl AsRef<[u8]>) {
        let mut script = VecDeque::new();
        script.push_back(reply.as_ref().to_vec());
        self.lock().scripts.insert(command.to_string(), script);
    }

    /// Queue a reply for the next read regardless of what was written.
    ///
    /// A queued reply stands in for one the device sends late: it is served
    /// to the next read unless the session clears the link first.
    pub fn push_reply(&self, reply: impl AsRef<[u8]>) {
        self.lock().pending.push_back(reply.as_ref().to_vec());
    }

    /// Never answer anything (builder form)
    pub fn silent(self) -> Self {
        self.lock().silent = true;
        self
    }

    /// Delay every operation by `latency`
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = latency;
        self
    }

    /// Make the next write or read fail with a communication error
    pub fn inject_next_failure(&self) {
        self.lock().fail_next = true;
    }

    /// Messages written so far, decoded as text with terminators removed
    pub fn written(&self) -> Vec<String> {
        self.lock()
            .written
            .iter()
            .map(|raw| strip_terminator(&String::from_utf8_lossy(raw)).to_string())
            .collect()
    }

    /// Messages written so far, byte for byte
    pub fn written_raw(&self) -> Vec<Vec<u8>> {
        self.lock().written.clone()
    }

    /// Forget the write log
    pub fn clear_log(&self) {
        self.lock().written.clear();
    }

    /// How many times `close` released the link
    pub fn close_count(&self) -> usize {
        self.lock().close_count
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn simulate_latency(&self) {
        let latency = self.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_open(&self, state: &mut MockState) -> DriverResult<()> {
        if state.closed {
            return Err(DriverError::NotConnected(self.resource.clone()));
        }
        if std::mem::take(&mut state.fail_next) {
            return Err(DriverError::communication(&self.resource, "Injected failure"));
        }
        Ok(())
    }
}

fn strip_terminator(text: &str) -> &str {
    text.trim_end_matches(['\n', '\r'])
}

#[async_trait]
impl Transport for MockTransport {
    async fn write(&mut self, data: &[u8]) -> DriverResult<()> {
        self.simulate_latency().await;

        let mut state = self.lock();
        self.check_open(&mut state)?;
        state.written.push(data.to_vec());

        if state.silent {
            return Ok(());
        }
        let command = String::from_utf8_lossy(data);
        let command = strip_terminator(&command);
        let reply = state.scripts.get_mut(command).and_then(|script| {
            if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            }
        });
        if let Some(reply) = reply {
            state.pending.push_back(reply);
        }
        Ok(())
    }

    async fn read_message(&mut self) -> DriverResult<Vec<u8>> {
        self.simulate_latency().await;

        let next = {
            let mut state = self.lock();
            self.check_open(&mut state)?;
            state.pending.pop_front()
        };
        match next {
            Some(reply) => Ok(reply),
            // Nothing was asked for: behave like a device that stays quiet
            None => std::future::pending().await,
        }
    }

    async fn clear(&mut self, _quiet: Duration) -> DriverResult<usize> {
        let mut state = self.lock();
        if state.closed {
            return Err(DriverError::NotConnected(self.resource.clone()));
        }
        let discarded = state.pending.drain(..).map(|reply| reply.len()).sum();
        Ok(discarded)
    }

    async fn close(&mut self) -> DriverResult<()> {
        let mut state = self.lock();
        if !state.closed {
            state.closed = true;
            state.close_count += 1;
        }
        Ok(())
    }

    fn resource(&self) -> &str {
        &self.resource
    }
}

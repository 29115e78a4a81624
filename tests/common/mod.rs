//! Shared fixtures for the driver integration tests.

#![allow(dead_code)]

use measurement_drivers::config::InstrumentConfig;
use measurement_drivers::instrument::Session;
use measurement_drivers::scpi::block::encode_block;
use measurement_drivers::scpi::ByteOrder;
use measurement_drivers::transport::MockTransport;
use std::time::Duration;

/// I/O window used by every mock session
pub const TIMEOUT: Duration = Duration::from_millis(500);

/// Session over a clone of `mock`; the caller keeps `mock` for inspection.
pub fn session_with(mock: &MockTransport) -> Session {
    let config = InstrumentConfig::new(mock_resource()).with_timeout(TIMEOUT);
    Session::with_transport(Box::new(mock.clone()), &config)
}

pub fn mock_resource() -> &'static str {
    "MOCK0::INSTR"
}

/// `REAL,32` little-endian block reply with its trailing newline.
pub fn f32_block(values: &[f32]) -> Vec<u8> {
    let mut reply = encode_block(values, ByteOrder::Little).to_vec();
    reply.push(b'\n');
    reply
}

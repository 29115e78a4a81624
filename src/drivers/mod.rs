//! Instrument drivers.
//!
//! One module per device. Each driver owns a [`crate::instrument::Session`],
//! implements [`crate::instrument::ScpiInstrument`] and adds typed wrappers
//! that format one SCPI command per call.

pub mod awg;
pub mod signal_generator;
pub mod spectrum_analyzer;
pub mod vna;

pub use awg::RigolDg922Pro;
pub use signal_generator::SignalGenerator;
pub use spectrum_analyzer::SpectrumAnalyzer;
pub use vna::Vna;

use crate::error::{DriverError, DriverResult};

/// Highest marker index the supported analyzers expose
pub const MAX_MARKERS: u8 = 10;

/// Upper bound on the points of one sweep, stepped or read back
pub const MAX_SWEEP_POINTS: usize = 1_000_000;

pub(crate) fn check_marker(index: u8) -> DriverResult<()> {
    if index == 0 || index > MAX_MARKERS {
        return Err(DriverError::InvalidParameter(format!(
            "marker index {} outside 1..={}",
            index, MAX_MARKERS
        )));
    }
    Ok(())
}

pub(crate) fn check_positive(name: &str, value: f64) -> DriverResult<()> {
    if !(value.is_finite() && value > 0.0) {
        return Err(DriverError::InvalidParameter(format!(
            "{} must be > 0, got {}",
            name, value
        )));
    }
    Ok(())
}

pub(crate) fn check_range(start: f64, stop: f64) -> DriverResult<()> {
    if !(stop > start) {
        return Err(DriverError::InvalidParameter(format!(
            "stop frequency {} must be greater than start frequency {}",
            stop, start
        )));
    }
    Ok(())
}

pub(crate) fn check_points(points: u32) -> DriverResult<()> {
    if points < 2 {
        return Err(DriverError::InvalidParameter(format!(
            "sweep needs at least 2 points, got {}",
            points
        )));
    }
    Ok(())
}

/// Convert a `SWE:POIN?` reply into a point count.
pub(crate) fn sweep_point_count(reply: f64) -> DriverResult<usize> {
    let valid = reply >= 0.0 && reply <= MAX_SWEEP_POINTS as f64 && reply.fract() == 0.0;
    if !valid {
        return Err(DriverError::Parse(format!(
            "sweep point count {} is not a valid number of points",
            reply
        )));
    }
    Ok(reply as usize)
}

/// Reject a marker frequency outside the current sweep.
pub(crate) fn check_within_sweep(hz: f64, start: f64, stop: f64) -> DriverResult<()> {
    if !(start <= hz && hz <= stop) {
        return Err(DriverError::InvalidParameter(format!(
            "frequency {} outside sweep [{}, {}]",
            hz, start, stop
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_bounds() {
        assert!(check_marker(1).is_ok());
        assert!(check_marker(10).is_ok());
        assert!(check_marker(0).is_err());
        assert!(check_marker(11).is_err());
    }

    #[test]
    fn test_range_and_points() {
        assert!(check_range(1e9, 2e9).is_ok());
        assert!(check_range(2e9, 2e9).is_err());
        assert!(check_range(f64::NAN, 2e9).is_err());
        assert!(check_points(2).is_ok());
        assert!(check_points(1).is_err());
        assert!(check_positive("span", 0.0).is_err());
        assert!(check_within_sweep(1.5e9, 1e9, 2e9).is_ok());
        assert!(check_within_sweep(2.5e9, 1e9, 2e9).is_err());
    }

    #[test]
    fn test_sweep_point_count() {
        assert_eq!(sweep_point_count(201.0).unwrap(), 201);
        assert_eq!(sweep_point_count(0.0).unwrap(), 0);
        for bad in [-1.0, f64::NAN, f64::INFINITY, 1e12, 200.5] {
            assert!(matches!(sweep_point_count(bad), Err(DriverError::Parse(_))), "{}", bad);
        }
    }
}

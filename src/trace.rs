//! Swept measurement results.

use chrono::{DateTime, Utc};
use num_complex::Complex64;
use serde::Serialize;

use crate::error::{DriverError, DriverResult};

/// Real-valued samples against a frequency axis (dBm, dB, degrees...)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepTrace {
    /// Frequency of each sample in Hz
    pub frequencies_hz: Vec<f64>,
    /// One sample per frequency
    pub values: Vec<f64>,
    /// When the data was read back
    pub acquired_at: DateTime<Utc>,
}

/// Complex samples against a frequency axis (unformatted S-parameters)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplexTrace {
    /// Frequency of each sample in Hz
    pub frequencies_hz: Vec<f64>,
    /// One sample per frequency
    pub values: Vec<Complex64>,
    /// When the data was read back
    pub acquired_at: DateTime<Utc>,
}

fn check_lengths(axis: usize, samples: usize) -> DriverResult<()> {
    if axis != samples {
        return Err(DriverError::Parse(format!(
            "trace has {} samples for {} frequency points",
            samples, axis
        )));
    }
    Ok(())
}

impl SweepTrace {
    /// Pair `values` with `frequencies_hz`, stamped now.
    ///
    /// # Errors
    /// `Parse` if the lengths differ.
    pub fn new(frequencies_hz: Vec<f64>, values: Vec<f64>) -> DriverResult<Self> {
        check_lengths(frequencies_hz.len(), values.len())?;
        Ok(Self {
            frequencies_hz,
            values,
            acquired_at: Utc::now(),
        })
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// `true` for a trace without points
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `(frequency, value)` of the largest sample
    pub fn peak(&self) -> Option<(f64, f64)> {
        self.frequencies_hz
            .iter()
            .copied()
            .zip(self.values.iter().copied())
            .fold(None, |best, point| match best {
                Some((_, v)) if v >= point.1 => best,
                _ => Some(point),
            })
    }
}

impl ComplexTrace {
    /// Pair `values` with `frequencies_hz`, stamped now.
    ///
    /// # Errors
    /// `Parse` if the lengths differ.
    pub fn new(frequencies_hz: Vec<f64>, values: Vec<Complex64>) -> DriverResult<Self> {
        check_lengths(frequencies_hz.len(), values.len())?;
        Ok(Self {
            frequencies_hz,
            values,
            acquired_at: Utc::now(),
        })
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// `true` for a trace without points
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `20·log10(|z|)` per point
    pub fn magnitude_db(&self) -> Vec<f64> {
        self.values.iter().map(|z| 20.0 * z.norm().log10()).collect()
    }

    /// Phase per point in degrees
    pub fn phase_deg(&self) -> Vec<f64> {
        self.values.iter().map(|z| z.arg().to_degrees()).collect()
    }
}

/// `points` evenly spaced frequencies from `start` to `stop` inclusive.
///
/// Fewer than two points yields just `start`.
pub fn linear_axis(start: f64, stop: f64, points: usize) -> Vec<f64> {
    if points < 2 {
        return vec![start];
    }
    let step = (stop - start) / (points - 1) as f64;
    (0..points).map(|i| start + step * i as f64).collect()
}

/// Pair interleaved `re, im, re, im, ...` samples into complex values.
///
/// # Errors
/// `Parse` for an odd number of samples.
pub fn interleaved_to_complex(samples: &[f32]) -> DriverResult<Vec<Complex64>> {
    if samples.len() % 2 != 0 {
        return Err(DriverError::Parse(format!(
            "complex trace needs an even sample count, got {}",
            samples.len()
        )));
    }
    Ok(samples
        .chunks_exact(2)
        .map(|pair| Complex64::new(f64::from(pair[0]), f64::from(pair[1])))
        .collect())
}

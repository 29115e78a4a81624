//! AnaPico APSIN20G RF signal generator.
//!
//! The APSIN20G speaks short-form SCPI without a leading colon. Some units
//! never answer `*IDN?`; the connect handshake tolerates that. Closing the
//! driver switches RF off first.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::MAX_SWEEP_POINTS;
use crate::config::InstrumentConfig;
use crate::error::{DriverError, DriverResult};
use crate::instrument::{ScpiInstrument, Session};
use crate::scpi::{self, ErrorEntry, Identity};

/// The unit has no `*OPC?`; a reset is given this long to settle
const RESET_SETTLE: Duration = Duration::from_secs(1);

/// Reference oscillator source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReferenceSource {
    /// Internal 100 MHz reference
    Internal,
    /// External reference input
    External,
}

impl ReferenceSource {
    fn scpi(self) -> &'static str {
        match self {
            Self::Internal => "INT",
            Self::External => "EXT",
        }
    }
}

/// Snapshot of the output settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalGeneratorStatus {
    /// Output frequency in Hz
    pub frequency_hz: f64,
    /// Output power in dBm
    pub power_dbm: f64,
    /// RF output enabled
    pub output_on: bool,
    /// Output phase in degrees
    pub phase_deg: f64,
}

/// Points visited by a stepped sweep, `start` first, never past `stop`.
fn sweep_points(start: f64, stop: f64, step: f64) -> DriverResult<Vec<f64>> {
    if !(step.is_finite() && step > 0.0) {
        return Err(DriverError::InvalidParameter(format!(
            "sweep step must be > 0, got {}",
            step
        )));
    }
    if !(start.is_finite() && stop.is_finite()) || stop < start {
        return Err(DriverError::InvalidParameter(format!(
            "sweep stop {} is below start {}",
            stop, start
        )));
    }
    // Tolerate rounding so that e.g. 1e9..2e9 by 1e8 includes 2e9
    let steps = ((stop - start) / step + 1e-9).floor();
    if !(steps < MAX_SWEEP_POINTS as f64) {
        return Err(DriverError::InvalidParameter(format!(
            "sweep {}..{} by {} exceeds {} points",
            start, stop, step, MAX_SWEEP_POINTS
        )));
    }
    let count = steps as usize + 1;
    Ok((0..count).map(|i| start + step * i as f64).collect())
}

/// AnaPico APSIN20G driver
#[derive(Debug)]
pub struct SignalGenerator {
    session: Session,
    identity: Option<Identity>,
}

impl SignalGenerator {
    /// Open the generator described by `config`.
    pub async fn connect(config: &InstrumentConfig) -> DriverResult<Self> {
        let session = Session::connect(config).await?;
        Self::from_session(session).await
    }

    /// Run the connect handshake on an open session.
    ///
    /// A timeout on `*IDN?` is logged and the connection kept; any other
    /// failure is returned.
    pub async fn from_session(mut session: Session) -> DriverResult<Self> {
        let identity = match session.identify().await {
            Ok(identity) => {
                info!(resource = session.resource(), idn = %identity, "Signal generator connected");
                Some(identity)
            }
            Err(e) if e.is_timeout() => {
                warn!(
                    resource = session.resource(),
                    "Signal generator did not answer *IDN?, continuing without identity"
                );
                None
            }
            Err(e) => return Err(e),
        };
        Ok(Self { session, identity })
    }

    /// Identity captured at connect, if the unit answered
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Output frequency in Hz
    pub async fn set_frequency(&mut self, hz: f64) -> DriverResult<()> {
        let hz = scpi::number(hz)?;
        self.session.write(&format!("FREQ {}", hz)).await
    }

    /// Output power in dBm
    pub async fn set_power(&mut self, dbm: f64) -> DriverResult<()> {
        let dbm = scpi::number(dbm)?;
        self.session.write(&format!("POW {}", dbm)).await
    }

    /// Output amplitude in volts (alternative to power)
    pub async fn set_amplitude(&mut self, volts: f64) -> DriverResult<()> {
        let volts = scpi::number(volts)?;
        self.session.write(&format!("VOLT {}", volts)).await
    }

    /// Switch the RF output
    pub async fn set_output(&mut self, on: bool) -> DriverResult<()> {
        self.session
            .write(&format!("OUTP {}", scpi::on_off(on)))
            .await
    }

    /// `OUTP ON`
    pub async fn rf_on(&mut self) -> DriverResult<()> {
        self.set_output(true).await
    }

    /// `OUTP OFF`
    pub async fn rf_off(&mut self) -> DriverResult<()> {
        self.set_output(false).await
    }

    /// Current frequency in Hz
    pub async fn get_frequency(&mut self) -> DriverResult<f64> {
        self.session.query_f64("FREQ?").await
    }

    /// Current power in dBm
    pub async fn get_power(&mut self) -> DriverResult<f64> {
        self.session.query_f64("POW?").await
    }

    /// Current phase in degrees
    pub async fn get_phase(&mut self) -> DriverResult<f64> {
        self.session.query_f64("PHAS?").await
    }

    /// RF output state
    pub async fn get_output_state(&mut self) -> DriverResult<bool> {
        self.session.query_bool("OUTP?").await
    }

    /// Select the reference oscillator
    pub async fn set_reference_source(&mut self, source: ReferenceSource) -> DriverResult<()> {
        self.session
            .write(&format!("ROSC:SOUR {}", source.scpi()))
            .await
    }

    /// Expected external reference frequency in Hz (typically 10 MHz)
    pub async fn set_reference_frequency(&mut self, hz: f64) -> DriverResult<()> {
        let hz = scpi::number(hz)?;
        self.session.write(&format!("ROSC:EXT:FREQ {}", hz)).await
    }

    /// One entry from the error queue
    pub async fn get_error(&mut self) -> DriverResult<ErrorEntry> {
        self.session.next_error().await
    }

    /// `SYST:PRES`
    pub async fn preset(&mut self) -> DriverResult<()> {
        self.session.write("SYST:PRES").await
    }

    /// Output phase in degrees
    pub async fn set_phase(&mut self, degrees: f64) -> DriverResult<()> {
        let degrees = scpi::number(degrees)?;
        self.session.write(&format!("PHAS {}", degrees)).await
    }

    /// Frequency and power, then RF on if `enable`.
    pub async fn configure_sine_output(
        &mut self,
        hz: f64,
        dbm: f64,
        enable: bool,
    ) -> DriverResult<()> {
        self.set_frequency(hz).await?;
        self.set_power(dbm).await?;
        if enable {
            self.rf_on().await?;
        }
        Ok(())
    }

    /// Read back frequency, power, output state and phase.
    pub async fn status(&mut self) -> DriverResult<SignalGeneratorStatus> {
        Ok(SignalGeneratorStatus {
            frequency_hz: self.get_frequency().await?,
            power_dbm: self.get_power().await?,
            output_on: self.get_output_state().await?,
            phase_deg: self.get_phase().await?,
        })
    }

    /// Step the frequency from `start_hz` to `stop_hz`, waiting `dwell` at
    /// each point. Returns the frequencies visited.
    pub async fn frequency_sweep(
        &mut self,
        start_hz: f64,
        stop_hz: f64,
        step_hz: f64,
        dwell: Duration,
    ) -> DriverResult<Vec<f64>> {
        let points = sweep_points(start_hz, stop_hz, step_hz)?;
        for &hz in &points {
            self.set_frequency(hz).await?;
            debug!(frequency_hz = hz, "Sweep step");
            tokio::time::sleep(dwell).await;
        }
        Ok(points)
    }

    /// Step the power from `start_dbm` to `stop_dbm`, waiting `dwell` at
    /// each level. Returns the levels visited.
    pub async fn power_sweep(
        &mut self,
        start_dbm: f64,
        stop_dbm: f64,
        step_db: f64,
        dwell: Duration,
    ) -> DriverResult<Vec<f64>> {
        let levels = sweep_points(start_dbm, stop_dbm, step_db)?;
        for &dbm in &levels {
            self.set_power(dbm).await?;
            debug!(power_dbm = dbm, "Sweep step");
            tokio::time::sleep(dwell).await;
        }
        Ok(levels)
    }
}

#[async_trait]
impl ScpiInstrument for SignalGenerator {
    fn model(&self) -> &'static str {
        "APSIN20G"
    }

    fn session(&self) -> &Session {
        &self.session
    }

    fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// `*RST`, then a fixed settle delay if `wait`.
    async fn reset(&mut self, wait: bool) -> DriverResult<()> {
        self.session.write("*RST").await?;
        if wait {
            tokio::time::sleep(RESET_SETTLE).await;
        }
        Ok(())
    }

    /// RF off, then release the session.
    async fn close(&mut self) -> DriverResult<()> {
        if !self.session.is_open() {
            return Ok(());
        }
        let rf_off = self.rf_off().await;
        if let Err(e) = &rf_off {
            warn!(resource = self.session.resource(), error = %e, "Could not switch RF off before closing");
        }
        self.session.close().await?;
        rf_off
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_points_include_stop() {
        let points = sweep_points(1e9, 2e9, 1e8).unwrap();
        assert_eq!(points.len(), 11);
        assert_eq!(points[0], 1e9);
        assert!((points[10] - 2e9).abs() < 1.0);
    }

    #[test]
    fn test_sweep_points_stop_short_of_overshoot() {
        let points = sweep_points(-10.0, -5.5, 2.0).unwrap();
        assert_eq!(points, vec![-10.0, -8.0, -6.0]);
    }

    #[test]
    fn test_sweep_rejects_bad_step() {
        assert!(sweep_points(1e9, 2e9, 0.0).is_err());
        assert!(sweep_points(1e9, 2e9, -1e6).is_err());
        assert!(sweep_points(2e9, 1e9, 1e6).is_err());
    }

    #[test]
    fn test_sweep_rejects_too_many_points() {
        assert!(sweep_points(0.0, 1e10, 1e-12).is_err());
        assert!(sweep_points(0.0, f64::MAX, f64::MIN_POSITIVE).is_err());
        let largest = sweep_points(0.0, (MAX_SWEEP_POINTS - 1) as f64, 1.0).unwrap();
        assert_eq!(largest.len(), MAX_SWEEP_POINTS);
    }

    #[test]
    fn test_single_point_sweep() {
        assert_eq!(sweep_points(5.0, 5.0, 1.0).unwrap(), vec![5.0]);
    }
}

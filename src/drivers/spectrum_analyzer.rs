//! Generic SCPI spectrum analyzer.
//!
//! Tested against R&S FSV/FSW/ZNL-SA and Keysight X-Series command sets.
//! The SENSe subsystem is addressed either by its short form (`FREQ:STAR`)
//! or with the explicit `SENS:` root, chosen once through [`CommandStyle`].
//! The preamplifier command is picked from the vendor reported by `*IDN?`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    check_marker, check_points, check_positive, check_range, check_within_sweep,
    sweep_point_count, MAX_MARKERS,
};
use crate::config::SpectrumAnalyzerConfig;
use crate::error::{DriverError, DriverResult};
use crate::instrument::{ScpiInstrument, Session};
use crate::scpi::{self, Identity};
use crate::trace::{self, SweepTrace};

/// Header form used for SENSe subsystem commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStyle {
    /// Implicit root: `FREQ:STAR`
    #[default]
    Short,
    /// Explicit root: `SENS:FREQ:STAR`
    Sense,
}

impl CommandStyle {
    fn sense(self, command: &str) -> String {
        match self {
            Self::Short => command.to_string(),
            Self::Sense => format!("SENS:{}", command),
        }
    }
}

/// Sweep time setting
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SweepTime {
    /// Coupled to span and bandwidths
    Auto,
    /// Fixed duration in seconds
    Fixed(f64),
}

/// Resolution and video bandwidth settings; `None` fields are left alone
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BandwidthSettings {
    /// Resolution bandwidth in Hz
    pub rbw_hz: Option<f64>,
    /// Video bandwidth in Hz
    pub vbw_hz: Option<f64>,
    /// Couple RBW to span
    pub rbw_auto: Option<bool>,
    /// Couple VBW to RBW
    pub vbw_auto: Option<bool>,
}

/// Trace detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Detector {
    /// Positive peak
    Positive,
    /// Negative peak
    Negative,
    /// Sample
    Sample,
    /// Average
    Average,
    /// RMS
    Rms,
    /// Quasi-peak
    QuasiPeak,
}

impl Detector {
    fn scpi(self) -> &'static str {
        match self {
            Self::Positive => "POS",
            Self::Negative => "NEG",
            Self::Sample => "SAMP",
            Self::Average => "AVER",
            Self::Rms => "RMS",
            Self::QuasiPeak => "QPE",
        }
    }
}

/// Input attenuation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Attenuation {
    /// Coupled to the reference level
    Auto,
    /// Fixed value in dB
    Fixed(f64),
}

/// Direction for [`SpectrumAnalyzer::next_peak`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeakDirection {
    /// Next lower peak to the right
    Next,
    /// Next peak to the left
    Left,
}

/// Amplitude unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerUnit {
    /// dBm
    Dbm,
    /// dBmV
    Dbmv,
    /// dBµV
    Dbuv,
    /// Volts
    Volt,
    /// Watts
    Watt,
}

impl PowerUnit {
    fn scpi(self) -> &'static str {
        match self {
            Self::Dbm => "DBM",
            Self::Dbmv => "DBMV",
            Self::Dbuv => "DBUV",
            Self::Volt => "V",
            Self::Watt => "W",
        }
    }
}

/// Trace transfer format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceFormat {
    /// Comma-separated ASCII
    Ascii,
    /// `REAL,32` binary block
    Real32,
}

/// Generic SCPI spectrum analyzer driver
#[derive(Debug)]
pub struct SpectrumAnalyzer {
    session: Session,
    identity: Identity,
    style: CommandStyle,
}

impl SpectrumAnalyzer {
    /// Open the analyzer described by `config`.
    pub async fn connect(config: &SpectrumAnalyzerConfig) -> DriverResult<Self> {
        let session = Session::connect(&config.instrument).await?;
        Self::from_session(session, config.command_style).await
    }

    /// Run the connect handshake (`*CLS`, `*IDN?`) on an open session.
    pub async fn from_session(mut session: Session, style: CommandStyle) -> DriverResult<Self> {
        session.clear_status().await?;
        let identity = session.identify().await?;
        info!(
            resource = session.resource(),
            idn = %identity,
            style = ?style,
            "Spectrum analyzer connected"
        );
        Ok(Self {
            session,
            identity,
            style,
        })
    }

    /// Identity captured at connect
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Upper-cased manufacturer
    pub fn vendor(&self) -> String {
        self.identity.vendor()
    }

    /// SENSe header style in use
    pub fn command_style(&self) -> CommandStyle {
        self.style
    }

    async fn write_sense(&mut self, command: &str) -> DriverResult<()> {
        let command = self.style.sense(command);
        self.session.write(&command).await
    }

    async fn query_sense_f64(&mut self, command: &str) -> DriverResult<f64> {
        let command = self.style.sense(command);
        self.session.query_f64(&command).await
    }

    /// Start/stop sweep with `points` points.
    pub async fn set_start_stop(
        &mut self,
        start_hz: f64,
        stop_hz: f64,
        points: u32,
    ) -> DriverResult<()> {
        check_range(start_hz, stop_hz)?;
        check_points(points)?;
        let start = scpi::number(start_hz)?;
        let stop = scpi::number(stop_hz)?;
        self.write_sense(&format!("FREQ:STAR {}", start)).await?;
        self.write_sense(&format!("FREQ:STOP {}", stop)).await?;
        self.set_points(points).await
    }

    /// Center/span sweep with `points` points.
    pub async fn set_center_span(
        &mut self,
        center_hz: f64,
        span_hz: f64,
        points: u32,
    ) -> DriverResult<()> {
        check_positive("span", span_hz)?;
        check_points(points)?;
        self.set_center_frequency(center_hz).await?;
        self.set_span(span_hz).await?;
        self.set_points(points).await
    }

    /// Center frequency in Hz
    pub async fn set_center_frequency(&mut self, hz: f64) -> DriverResult<()> {
        let hz = scpi::number(hz)?;
        self.write_sense(&format!("FREQ:CENT {}", hz)).await
    }

    /// Span in Hz; must be positive
    pub async fn set_span(&mut self, hz: f64) -> DriverResult<()> {
        check_positive("span", hz)?;
        let hz = scpi::number(hz)?;
        self.write_sense(&format!("FREQ:SPAN {}", hz)).await
    }

    /// Current `(start, stop)` in Hz
    pub async fn get_start_stop(&mut self) -> DriverResult<(f64, f64)> {
        let start = self.query_sense_f64("FREQ:STAR?").await?;
        let stop = self.query_sense_f64("FREQ:STOP?").await?;
        Ok((start, stop))
    }

    /// Coupled or fixed sweep time
    pub async fn set_sweep_time(&mut self, sweep_time: SweepTime) -> DriverResult<()> {
        match sweep_time {
            SweepTime::Auto => self.write_sense("SWE:TIME:AUTO ON").await,
            SweepTime::Fixed(seconds) => {
                check_positive("sweep time", seconds)?;
                self.write_sense("SWE:TIME:AUTO OFF").await?;
                self.write_sense(&format!("SWE:TIME {}", scpi::number(seconds)?))
                    .await
            }
        }
    }

    /// Number of sweep points
    pub async fn set_points(&mut self, points: u32) -> DriverResult<()> {
        check_points(points)?;
        self.write_sense(&format!("SWE:POIN {}", points)).await
    }

    /// Apply the bandwidth fields that are set.
    pub async fn set_bandwidths(&mut self, settings: BandwidthSettings) -> DriverResult<()> {
        if let Some(auto) = settings.rbw_auto {
            self.write_sense(&format!("BAND:AUTO {}", scpi::on_off(auto)))
                .await?;
        }
        if let Some(rbw) = settings.rbw_hz {
            check_positive("RBW", rbw)?;
            self.write_sense(&format!("BAND {}", scpi::number(rbw)?))
                .await?;
        }
        if let Some(auto) = settings.vbw_auto {
            self.write_sense(&format!("BAND:VID:AUTO {}", scpi::on_off(auto)))
                .await?;
        }
        if let Some(vbw) = settings.vbw_hz {
            check_positive("VBW", vbw)?;
            self.write_sense(&format!("BAND:VID {}", scpi::number(vbw)?))
                .await?;
        }
        Ok(())
    }

    /// Resolution bandwidth in Hz
    pub async fn set_rbw(&mut self, hz: f64) -> DriverResult<()> {
        self.set_bandwidths(BandwidthSettings {
            rbw_hz: Some(hz),
            ..Default::default()
        })
        .await
    }

    /// Trace detector
    pub async fn set_detector(&mut self, detector: Detector) -> DriverResult<()> {
        self.write_sense(&format!("DET {}", detector.scpi())).await
    }

    /// Reference level in dBm
    pub async fn set_reference_level(&mut self, dbm: f64) -> DriverResult<()> {
        let dbm = scpi::number(dbm)?;
        self.session
            .write(&format!("DISP:WIND:TRAC:Y:RLEV {}", dbm))
            .await
    }

    /// Input attenuation
    pub async fn set_attenuation(&mut self, attenuation: Attenuation) -> DriverResult<()> {
        let root = match self.style {
            CommandStyle::Short => "INP:ATT",
            CommandStyle::Sense => "SENS:POW:ATT",
        };
        match attenuation {
            Attenuation::Auto => self.session.write(&format!("{}:AUTO ON", root)).await,
            Attenuation::Fixed(db) => {
                if !(db.is_finite() && db >= 0.0) {
                    return Err(DriverError::InvalidParameter(format!(
                        "attenuation must be >= 0 dB, got {}",
                        db
                    )));
                }
                self.session.write(&format!("{}:AUTO OFF", root)).await?;
                self.session
                    .write(&format!("{} {}", root, scpi::number(db)?))
                    .await
            }
        }
    }

    /// Switch the preamplifier
    pub async fn set_preamp(&mut self, on: bool) -> DriverResult<()> {
        let command = if self.identity.is_rohde_schwarz() {
            format!("INP:GAIN:STAT {}", scpi::on_off(on))
        } else {
            format!("POW:GAIN {}", scpi::on_off(on))
        };
        self.session.write(&command).await
    }

    /// Trace averaging
    pub async fn set_averaging(
        &mut self,
        on: bool,
        count: Option<u32>,
        clear: bool,
    ) -> DriverResult<()> {
        self.write_sense(&format!("AVER:STAT {}", scpi::on_off(on)))
            .await?;
        if let Some(count) = count {
            self.write_sense(&format!("AVER:COUN {}", count)).await?;
        }
        if clear {
            self.write_sense("AVER:CLE").await?;
        }
        Ok(())
    }

    /// Continuous sweeping on or off
    pub async fn continuous(&mut self, on: bool) -> DriverResult<()> {
        self.session
            .write(&format!("INIT:CONT {}", scpi::on_off(on)))
            .await
    }

    /// Stop continuous sweeping and trigger one sweep.
    pub async fn single_sweep(&mut self, wait: bool) -> DriverResult<()> {
        self.continuous(false).await?;
        self.session.write("INIT:IMM").await?;
        if wait {
            self.session.wait_complete().await?;
        }
        Ok(())
    }

    /// Trace transfer format
    pub async fn set_trace_format(&mut self, format: TraceFormat) -> DriverResult<()> {
        let command = match format {
            TraceFormat::Ascii => "FORM ASC",
            TraceFormat::Real32 => "FORM REAL,32",
        };
        self.session.write(command).await
    }

    /// Amplitude samples of trace `trace` (usually dBm).
    ///
    /// Accepts ASCII or a `REAL,32` block, whichever format is active.
    pub async fn fetch_trace(&mut self, trace: u8) -> DriverResult<Vec<f64>> {
        if trace == 0 {
            return Err(DriverError::InvalidParameter(
                "traces are numbered from 1".to_string(),
            ));
        }
        let values = self
            .session
            .query_binary::<f32>(&format!("TRAC:DATA? TRACE{}", trace))
            .await?;
        Ok(values.into_iter().map(f64::from).collect())
    }

    /// Linear frequency axis of the current sweep
    pub async fn get_frequency_axis(&mut self) -> DriverResult<Vec<f64>> {
        let (start, stop) = self.get_start_stop().await?;
        let points = sweep_point_count(self.query_sense_f64("SWE:POIN?").await?)?;
        Ok(trace::linear_axis(start, stop, points))
    }

    /// Frequency axis plus trace `trace`
    pub async fn acquire_trace(&mut self, trace: u8) -> DriverResult<SweepTrace> {
        let axis = self.get_frequency_axis().await?;
        let values = self.fetch_trace(trace).await?;
        debug!(points = values.len(), trace, "Spectrum trace read");
        SweepTrace::new(axis, values)
    }

    /// Switch marker `index` on or off
    pub async fn set_marker(&mut self, index: u8, on: bool) -> DriverResult<()> {
        check_marker(index)?;
        self.session
            .write(&format!("CALC:MARK{}:STAT {}", index, scpi::on_off(on)))
            .await
    }

    /// Move marker `index` to `hz`, which must lie within the span.
    pub async fn set_marker_x(&mut self, index: u8, hz: f64) -> DriverResult<()> {
        check_marker(index)?;
        let (start, stop) = self.get_start_stop().await?;
        check_within_sweep(hz, start, stop)?;
        self.session
            .write(&format!("CALC:MARK{}:X {}", index, scpi::number(hz)?))
            .await
    }

    /// Switch marker 1 on and move it to `hz`.
    pub async fn set_marker_frequency(&mut self, hz: f64) -> DriverResult<()> {
        self.set_marker(1, true).await?;
        self.set_marker_x(1, hz).await
    }

    /// `(x, y)` of marker `index`
    pub async fn get_marker_xy(&mut self, index: u8) -> DriverResult<(f64, f64)> {
        check_marker(index)?;
        let x = self.session.query_f64(&format!("CALC:MARK{}:X?", index)).await?;
        let y = self.session.query_f64(&format!("CALC:MARK{}:Y?", index)).await?;
        Ok((x, y))
    }

    /// Level at marker 1, in the current unit
    pub async fn read_marker_power(&mut self) -> DriverResult<f64> {
        self.session.query_f64("CALC:MARK1:Y?").await
    }

    /// Switch off markers `1..=max`
    pub async fn clear_markers(&mut self, max: u8) -> DriverResult<()> {
        check_marker(max)?;
        for index in 1..=max {
            self.set_marker(index, false).await?;
        }
        Ok(())
    }

    /// Put marker `index` on the highest peak and switch it on
    pub async fn peak_search(&mut self, index: u8) -> DriverResult<()> {
        check_marker(index)?;
        self.session
            .write(&format!("CALC:MARK{}:MAX", index))
            .await?;
        self.set_marker(index, true).await
    }

    /// Move marker `index` to the next peak
    pub async fn next_peak(&mut self, index: u8, direction: PeakDirection) -> DriverResult<()> {
        check_marker(index)?;
        let suffix = match direction {
            PeakDirection::Next => "NEXT",
            PeakDirection::Left => "LEFT",
        };
        self.session
            .write(&format!("CALC:MARK{}:MAX:{}", index, suffix))
            .await?;
        self.set_marker(index, true).await
    }

    /// Make marker `delta` a delta marker relative to `reference`
    pub async fn marker_delta_mode(
        &mut self,
        on: bool,
        reference: u8,
        delta: u8,
    ) -> DriverResult<()> {
        check_marker(reference)?;
        check_marker(delta)?;
        if on {
            self.session
                .write(&format!("CALC:MARK{}:FUNC:TYPE DELT", delta))
                .await?;
            self.session
                .write(&format!("CALC:MARK{}:FUNC:STAT ON", delta))
                .await?;
            self.set_marker(reference, true).await?;
            self.set_marker(delta, true).await
        } else {
            self.session
                .write(&format!("CALC:MARK{}:FUNC:STAT OFF", delta))
                .await
        }
    }

    /// `(Δf, Δlevel)` read directly from delta marker `delta`
    pub async fn get_delta_reading(&mut self, delta: u8) -> DriverResult<(f64, f64)> {
        check_marker(delta)?;
        let dx = self
            .session
            .query_f64(&format!("CALC:MARK{}:DELT:X?", delta))
            .await?;
        let dy = self
            .session
            .query_f64(&format!("CALC:MARK{}:DELT:Y?", delta))
            .await?;
        Ok((dx, dy))
    }

    /// `(Δf, Δlevel)` computed from the coordinates of two normal markers
    pub async fn marker_difference(&mut self, reference: u8, other: u8) -> DriverResult<(f64, f64)> {
        let (x1, y1) = self.get_marker_xy(reference).await?;
        let (x2, y2) = self.get_marker_xy(other).await?;
        Ok((x2 - x1, y2 - y1))
    }

    /// Indices of markers that are switched on, probing up to marker 10.
    ///
    /// Stops at the first marker the analyzer refuses to report on.
    pub async fn active_markers(&mut self) -> DriverResult<Vec<u8>> {
        let mut active = Vec::new();
        for index in 1..=MAX_MARKERS {
            match self
                .session
                .query_bool(&format!("CALC:MARK{}:STAT?", index))
                .await
            {
                Ok(true) => active.push(index),
                Ok(false) => {}
                Err(e @ DriverError::NotConnected(_)) => return Err(e),
                Err(e) => {
                    debug!(marker = index, error = %e, "Marker probe stopped");
                    break;
                }
            }
        }
        Ok(active)
    }

    /// Amplitude unit
    pub async fn set_unit_power(&mut self, unit: PowerUnit) -> DriverResult<()> {
        self.session
            .write(&format!("UNIT:POW {}", unit.scpi()))
            .await
    }

    /// Show trace `trace` averaged or as clear/write
    pub async fn set_trace_mode(&mut self, trace: u8, average_display: bool) -> DriverResult<()> {
        if trace == 0 {
            return Err(DriverError::InvalidParameter(
                "traces are numbered from 1".to_string(),
            ));
        }
        let mode = if average_display { "AVER" } else { "WRIT" };
        self.session
            .write(&format!("DISP:TRAC{}:MODE {}", trace, mode))
            .await
    }

    /// Save a PNG screenshot to `path` on the instrument's file system.
    pub async fn save_screenshot(&mut self, path: &str) -> DriverResult<()> {
        let path = scpi::quoted(path)?;
        self.session.write("HCOP:DEV:LANG PNG").await?;
        self.session.write(&format!("MMEM:NAME {}", path)).await?;
        self.session.write("HCOP:IMM").await?;
        self.session.wait_complete().await
    }
}

#[async_trait]
impl ScpiInstrument for SpectrumAnalyzer {
    fn model(&self) -> &'static str {
        "SCPI spectrum analyzer"
    }

    fn session(&self) -> &Session {
        &self.session
    }

    fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}

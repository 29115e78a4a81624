//! Rohde & Schwarz ZNL20 vector network analyzer.
//!
//! Connects over VISA (HiSLIP or VXI-11) or the raw socket. On connect the
//! status registers are cleared and the identity is recorded.
//!
//! Unformatted trace data is read as little-endian `REAL,32` blocks of
//! interleaved real/imaginary pairs.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use super::{
    check_marker, check_points, check_positive, check_range, check_within_sweep,
    sweep_point_count, MAX_MARKERS,
};
use crate::config::InstrumentConfig;
use crate::error::{DriverError, DriverResult};
use crate::instrument::{ScpiInstrument, Session};
use crate::scpi::{self, ByteOrder, ErrorEntry, Identity};
use crate::trace::{self, ComplexTrace, SweepTrace};

/// Two-port scattering parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SParameter {
    /// Port 1 reflection
    S11,
    /// Reverse transmission
    S12,
    /// Forward transmission
    S21,
    /// Port 2 reflection
    S22,
}

impl SParameter {
    /// SCPI name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::S11 => "S11",
            Self::S12 => "S12",
            Self::S21 => "S21",
            Self::S22 => "S22",
        }
    }
}

impl fmt::Display for SParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SParameter {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "S11" => Ok(Self::S11),
            "S12" => Ok(Self::S12),
            "S21" => Ok(Self::S21),
            "S22" => Ok(Self::S22),
            other => Err(DriverError::InvalidParameter(format!(
                "unknown S-parameter '{}'",
                other
            ))),
        }
    }
}

/// One entry of the channel's trace catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceDefinition {
    /// Trace name, e.g. `Trc1`
    pub name: String,
    /// Measured parameter, e.g. `S21`
    pub parameter: String,
}

/// Parse a `CALC:PAR:CAT?` reply: `'Trc1,S21,Trc2,S11'`.
fn parse_catalog(reply: &str) -> DriverResult<Vec<TraceDefinition>> {
    let body = reply.trim().trim_matches(|c| c == '\'' || c == '"');
    if body.is_empty() {
        return Ok(Vec::new());
    }
    let fields: Vec<&str> = body.split(',').map(str::trim).collect();
    if fields.len() % 2 != 0 {
        return Err(DriverError::Parse(format!(
            "trace catalog has an odd number of fields: '{}'",
            reply
        )));
    }
    Ok(fields
        .chunks_exact(2)
        .map(|pair| TraceDefinition {
            name: pair[0].to_string(),
            parameter: pair[1].to_string(),
        })
        .collect())
}

fn check_channel(channel: u8) -> DriverResult<()> {
    if channel == 0 {
        return Err(DriverError::InvalidParameter(
            "VNA channels are numbered from 1".to_string(),
        ));
    }
    Ok(())
}

/// R&S ZNL20 driver
#[derive(Debug)]
pub struct Vna {
    session: Session,
    identity: Identity,
}

impl Vna {
    /// Open the analyzer described by `config`.
    pub async fn connect(config: &InstrumentConfig) -> DriverResult<Self> {
        let session = Session::connect(config).await?;
        Self::from_session(session).await
    }

    /// Run the connect handshake (`*CLS`, `*IDN?`) on an open session.
    pub async fn from_session(mut session: Session) -> DriverResult<Self> {
        session.clear_status().await?;
        let identity = session.identify().await?;
        info!(resource = session.resource(), idn = %identity, "VNA connected");
        Ok(Self { session, identity })
    }

    /// Identity captured at connect
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Traces defined on `channel`.
    pub async fn trace_catalog(&mut self, channel: u8) -> DriverResult<Vec<TraceDefinition>> {
        check_channel(channel)?;
        let reply = self
            .session
            .query(&format!("CALC{}:PAR:CAT?", channel))
            .await?;
        parse_catalog(&reply)
    }

    /// Define trace `name` measuring `parameter` and select it.
    ///
    /// Returns the first error queue entry so the caller can see whether the
    /// definition was accepted.
    pub async fn select_or_create_trace(
        &mut self,
        name: &str,
        parameter: SParameter,
        channel: u8,
    ) -> DriverResult<ErrorEntry> {
        check_channel(channel)?;
        let quoted_name = scpi::quoted(name)?;
        self.session
            .write(&format!(
                "CALC{}:PAR:MEAS {},'{}'",
                channel, quoted_name, parameter
            ))
            .await?;
        self.session
            .write(&format!("CALC{}:PAR:SEL {}", channel, quoted_name))
            .await?;
        self.session.next_error().await
    }

    /// Sweep from `start_hz` to `stop_hz` with `points` points.
    pub async fn set_sweep_range(
        &mut self,
        start_hz: f64,
        stop_hz: f64,
        points: u32,
    ) -> DriverResult<()> {
        check_range(start_hz, stop_hz)?;
        check_points(points)?;
        let start = scpi::number(start_hz)?;
        let stop = scpi::number(stop_hz)?;
        self.session.write(&format!("SENS:FREQ:STAR {}", start)).await?;
        self.session.write(&format!("SENS:FREQ:STOP {}", stop)).await?;
        self.session.write(&format!("SENS:SWE:POIN {}", points)).await
    }

    /// Center frequency in Hz
    pub async fn set_center_frequency(&mut self, hz: f64) -> DriverResult<()> {
        let hz = scpi::number(hz)?;
        self.session.write(&format!("SENS:FREQ:CENT {}", hz)).await
    }

    /// Span in Hz; must be positive
    pub async fn set_span(&mut self, hz: f64) -> DriverResult<()> {
        check_positive("span", hz)?;
        let hz = scpi::number(hz)?;
        self.session.write(&format!("SENS:FREQ:SPAN {}", hz)).await
    }

    /// Number of sweep points; at least 2
    pub async fn set_sweep_points(&mut self, points: u32) -> DriverResult<()> {
        check_points(points)?;
        self.session.write(&format!("SENS:SWE:POIN {}", points)).await
    }

    /// IF (measurement) bandwidth in Hz
    pub async fn set_if_bandwidth(&mut self, hz: f64) -> DriverResult<()> {
        check_positive("IF bandwidth", hz)?;
        let hz = scpi::number(hz)?;
        self.session.write(&format!("SENS:BAND {}", hz)).await
    }

    /// Source power in dBm
    pub async fn set_power(&mut self, dbm: f64) -> DriverResult<()> {
        let dbm = scpi::number(dbm)?;
        self.session.write(&format!("SOUR:POW {}", dbm)).await
    }

    /// Current `(start, stop)` in Hz
    pub async fn get_start_stop(&mut self) -> DriverResult<(f64, f64)> {
        let start = self.session.query_f64("SENS:FREQ:STAR?").await?;
        let stop = self.session.query_f64("SENS:FREQ:STOP?").await?;
        Ok((start, stop))
    }

    /// Linear frequency axis of the current sweep
    pub async fn frequency_axis(&mut self) -> DriverResult<Vec<f64>> {
        let (start, stop) = self.get_start_stop().await?;
        let points = sweep_point_count(self.session.query_f64("SENS:SWE:POIN?").await?)?;
        Ok(trace::linear_axis(start, stop, points))
    }

    /// Stop continuous sweeping and trigger one sweep.
    pub async fn single_sweep(&mut self, wait: bool) -> DriverResult<()> {
        self.session.write("INIT:CONT OFF").await?;
        self.session.write("INIT:IMM").await?;
        if wait {
            self.session.wait_complete().await?;
        }
        Ok(())
    }

    async fn fetch_block(&mut self, channel: u8, format: &str) -> DriverResult<Vec<f32>> {
        check_channel(channel)?;
        self.session.write("FORM:DATA REAL,32").await?;
        self.session.write("FORM:BORD SWAP").await?;
        self.session
            .query_binary_ordered::<f32>(
                &format!("CALC{}:DATA? {}", channel, format),
                ByteOrder::Little,
            )
            .await
    }

    /// Unformatted complex data of the selected trace.
    pub async fn get_trace_data(&mut self, channel: u8) -> DriverResult<ComplexTrace> {
        let axis = self.frequency_axis().await?;
        let samples = self.fetch_block(channel, "SDAT").await?;
        let values = trace::interleaved_to_complex(&samples)?;
        debug!(points = values.len(), "VNA complex trace read");
        ComplexTrace::new(axis, values)
    }

    /// Formatted data (as displayed, e.g. dB magnitude) of the selected trace.
    pub async fn get_formatted_trace(&mut self, channel: u8) -> DriverResult<SweepTrace> {
        let axis = self.frequency_axis().await?;
        let samples = self.fetch_block(channel, "FDAT").await?;
        SweepTrace::new(axis, samples.into_iter().map(f64::from).collect())
    }

    /// Switch marker `index` on or off.
    pub async fn set_marker(&mut self, index: u8, on: bool) -> DriverResult<()> {
        check_marker(index)?;
        self.session
            .write(&format!("CALC:MARK{}:STAT {}", index, scpi::on_off(on)))
            .await
    }

    /// Move marker `index` to `hz`, which must lie within the sweep.
    pub async fn set_marker_x(&mut self, index: u8, hz: f64) -> DriverResult<()> {
        check_marker(index)?;
        let (start, stop) = self.get_start_stop().await?;
        check_within_sweep(hz, start, stop)?;
        let hz = scpi::number(hz)?;
        self.session
            .write(&format!("CALC:MARK{}:X {}", index, hz))
            .await
    }

    /// `(x, y)` of marker `index`
    pub async fn get_marker_xy(&mut self, index: u8) -> DriverResult<(f64, f64)> {
        check_marker(index)?;
        let x = self.session.query_f64(&format!("CALC:MARK{}:X?", index)).await?;
        let y = self.session.query_f64(&format!("CALC:MARK{}:Y?", index)).await?;
        Ok((x, y))
    }

    /// Indices of markers that are switched on.
    ///
    /// Probes markers in order and stops at the first one the analyzer
    /// refuses to report on.
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

    /// `(index, x, y)` for every active marker
    pub async fn all_marker_xy(&mut self) -> DriverResult<Vec<(u8, f64, f64)>> {
        let mut readings = Vec::new();
        for index in self.active_markers().await? {
            let (x, y) = self.get_marker_xy(index).await?;
            readings.push((index, x, y));
        }
        Ok(readings)
    }

    /// Switch off markers `1..=max`.
    pub async fn clear_markers(&mut self, max: u8) -> DriverResult<()> {
        check_marker(max)?;
        for index in 1..=max {
            self.set_marker(index, false).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ScpiInstrument for Vna {
    fn model(&self) -> &'static str {
        "ZNL20"
    }

    fn session(&self) -> &Session {
        &self.session
    }

    fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_catalog() {
        let catalog = parse_catalog("'Trc1,S21,Trc2,S11'").unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog[0].name, "Trc1");
        assert_eq!(catalog[1].parameter, "S11");

        assert!(parse_catalog("''").unwrap().is_empty());
        assert!(parse_catalog("'Trc1,S21,Trc2'").is_err());
    }

    #[test]
    fn test_sparameter_from_str() {
        assert_eq!("s21".parse::<SParameter>().unwrap(), SParameter::S21);
        assert!("S31".parse::<SParameter>().is_err());
        assert_eq!(SParameter::S12.to_string(), "S12");
    }
}

//! Rigol DG922 Pro two-channel arbitrary waveform generator.
//!
//! Commands use the long-header form with a leading colon
//! (`:SOUR1:APPL:SIN ...`). Arbitrary waveforms are uploaded as
//! little-endian `f32` blocks normalised to [-1, 1]. Closing the driver
//! switches both outputs off first.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::InstrumentConfig;
use crate::error::{DriverError, DriverResult};
use crate::instrument::{ScpiInstrument, Session};
use crate::scpi::{self, ByteOrder, ErrorEntry, Identity};

/// Smallest amplitude the outputs accept, in Vpp
pub const MIN_AMPLITUDE_VPP: f64 = 0.001;

/// Output channels of the instrument
pub const CHANNELS: [u8; 2] = [1, 2];

fn check_channel(channel: u8) -> DriverResult<()> {
    if !CHANNELS.contains(&channel) {
        return Err(DriverError::InvalidParameter(format!(
            "DG922 Pro has channels 1 and 2, got {}",
            channel
        )));
    }
    Ok(())
}

/// Built-in output function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Waveform {
    /// Sine
    Sine,
    /// Square
    Square,
    /// Ramp
    Ramp,
    /// Pulse
    Pulse,
    /// Noise
    Noise,
    /// DC level
    Dc,
    /// User waveform from non-volatile memory
    User,
    /// Arbitrary waveform from volatile memory
    Arbitrary,
}

impl Waveform {
    fn scpi(self) -> &'static str {
        match self {
            Self::Sine => "SIN",
            Self::Square => "SQU",
            Self::Ramp => "RAMP",
            Self::Pulse => "PULS",
            Self::Noise => "NOIS",
            Self::Dc => "DC",
            Self::User => "USER",
            Self::Arbitrary => "ARB",
        }
    }
}

/// Sine output settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SineSettings {
    /// Frequency in Hz
    pub frequency_hz: f64,
    /// Amplitude in Vpp; values below [`MIN_AMPLITUDE_VPP`] are clamped
    pub amplitude_vpp: f64,
    /// DC offset in V
    pub offset_v: f64,
    /// Phase in degrees; only sent when non-zero
    pub phase_deg: f64,
}

impl SineSettings {
    /// Sine at `frequency_hz` with `amplitude_vpp`, no offset or phase
    pub fn new(frequency_hz: f64, amplitude_vpp: f64) -> Self {
        Self {
            frequency_hz,
            amplitude_vpp,
            offset_v: 0.0,
            phase_deg: 0.0,
        }
    }

    /// Set the DC offset
    pub fn with_offset(mut self, offset_v: f64) -> Self {
        self.offset_v = offset_v;
        self
    }

    /// Set the phase
    pub fn with_phase(mut self, phase_deg: f64) -> Self {
        self.phase_deg = phase_deg;
        self
    }
}

/// Playback settings for an uploaded arbitrary waveform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitraryWaveform {
    /// Name in volatile memory
    pub name: String,
    /// Sample rate in Sa/s
    pub sample_rate: f64,
    /// Output amplitude in Vpp
    pub amplitude_vpp: f64,
    /// DC offset in V
    pub offset_v: f64,
}

impl ArbitraryWaveform {
    /// Waveform `name` played at `sample_rate` with 1 Vpp and no offset
    pub fn new(name: impl Into<String>, sample_rate: f64) -> Self {
        Self {
            name: name.into(),
            sample_rate,
            amplitude_vpp: 1.0,
            offset_v: 0.0,
        }
    }

    /// Set the amplitude
    pub fn with_amplitude(mut self, amplitude_vpp: f64) -> Self {
        self.amplitude_vpp = amplitude_vpp;
        self
    }

    /// Set the offset
    pub fn with_offset(mut self, offset_v: f64) -> Self {
        self.offset_v = offset_v;
        self
    }
}

impl Default for ArbitraryWaveform {
    fn default() -> Self {
        Self::new("USER_WAV", 1_000.0)
    }
}

/// Burst trigger source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerSource {
    /// Rear-panel trigger input
    External,
    /// Internal timer
    Internal,
    /// `*TRG` or the front-panel key
    Manual,
}

impl TriggerSource {
    fn scpi(self) -> &'static str {
        match self {
            Self::External => "EXT",
            Self::Internal => "INT",
            Self::Manual => "MAN",
        }
    }
}

fn check_waveform_name(name: &str) -> DriverResult<()> {
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(DriverError::InvalidParameter(format!(
            "invalid waveform name '{}': use letters, digits and '_', starting with a letter",
            name
        )));
    }
    Ok(())
}

/// Convert samples to `f32` clipped to the DAC range [-1, 1].
///
/// # Errors
/// `InvalidParameter` for an empty waveform or NaN samples.
fn normalise_samples(samples: &[f64]) -> DriverResult<Vec<f32>> {
    if samples.is_empty() {
        return Err(DriverError::InvalidParameter(
            "arbitrary waveform has no samples".to_string(),
        ));
    }
    if samples.iter().any(|s| s.is_nan()) {
        return Err(DriverError::InvalidParameter(
            "arbitrary waveform contains NaN samples".to_string(),
        ));
    }
    Ok(samples.iter().map(|&s| s.clamp(-1.0, 1.0) as f32).collect())
}

/// Rigol DG922 Pro driver
#[derive(Debug)]
pub struct RigolDg922Pro {
    session: Session,
    identity: Identity,
}

impl RigolDg922Pro {
    /// Open the generator described by `config`.
    pub async fn connect(config: &InstrumentConfig) -> DriverResult<Self> {
        let session = Session::connect(config).await?;
        Self::from_session(session).await
    }

    /// Run the connect handshake (`*IDN?`) on an open session.
    pub async fn from_session(mut session: Session) -> DriverResult<Self> {
        let identity = session.identify().await?;
        info!(resource = session.resource(), idn = %identity, "AWG connected");
        Ok(Self { session, identity })
    }

    /// Identity captured at connect
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// 50 Ω load, then a DC level of `offset_v`.
    pub async fn init_and_set(&mut self, channel: u8, offset_v: f64) -> DriverResult<()> {
        check_channel(channel)?;
        self.session
            .write(&format!(":OUTP{}:LOAD 50", channel))
            .await?;
        self.set_dc(channel, offset_v).await
    }

    /// DC output at `offset_v`
    pub async fn set_dc(&mut self, channel: u8, offset_v: f64) -> DriverResult<()> {
        check_channel(channel)?;
        let offset = scpi::number(offset_v)?;
        self.session
            .write(&format!(":SOUR{}:APPL:DC DEF,DEF,{}", channel, offset))
            .await
    }

    /// Sine output. The phase is only sent when non-zero.
    pub async fn set_sine(&mut self, channel: u8, settings: SineSettings) -> DriverResult<()> {
        check_channel(channel)?;
        let mut amplitude = settings.amplitude_vpp;
        if amplitude < MIN_AMPLITUDE_VPP {
            warn!(
                channel,
                requested_vpp = amplitude,
                "Amplitude below minimum, clamping to {} Vpp",
                MIN_AMPLITUDE_VPP
            );
            amplitude = MIN_AMPLITUDE_VPP;
        }
        let command = format!(
            ":SOUR{}:APPL:SIN {},{},{}",
            channel,
            scpi::number(settings.frequency_hz)?,
            scpi::number(amplitude)?,
            scpi::number(settings.offset_v)?
        );
        self.session.write(&command).await?;
        if settings.phase_deg != 0.0 {
            self.set_phase(channel, settings.phase_deg).await?;
        }
        Ok(())
    }

    /// Output phase in degrees
    pub async fn set_phase(&mut self, channel: u8, degrees: f64) -> DriverResult<()> {
        check_channel(channel)?;
        let degrees = scpi::number(degrees)?;
        self.session
            .write(&format!(":SOUR{}:PHAS {}", channel, degrees))
            .await
    }

    /// Align the phase of both channels
    pub async fn sync_phase(&mut self) -> DriverResult<()> {
        self.session.write(":SOUR:PHAS:SYNC").await
    }

    /// Amplitude in Vpp
    pub async fn set_amplitude(&mut self, channel: u8, vpp: f64) -> DriverResult<()> {
        check_channel(channel)?;
        let vpp = scpi::number(vpp)?;
        self.session
            .write(&format!(":SOUR{}:VOLT {}", channel, vpp))
            .await
    }

    /// DC offset in V
    pub async fn set_offset(&mut self, channel: u8, volts: f64) -> DriverResult<()> {
        check_channel(channel)?;
        let volts = scpi::number(volts)?;
        self.session
            .write(&format!(":SOUR{}:VOLT:OFFS {}", channel, volts))
            .await
    }

    /// Frequency in Hz
    pub async fn set_frequency(&mut self, channel: u8, hz: f64) -> DriverResult<()> {
        check_channel(channel)?;
        let hz = scpi::number(hz)?;
        self.session
            .write(&format!(":SOUR{}:FREQ {}", channel, hz))
            .await
    }

    /// Switch an output
    pub async fn set_output(&mut self, channel: u8, on: bool) -> DriverResult<()> {
        check_channel(channel)?;
        self.session
            .write(&format!(":OUTP{} {}", channel, scpi::on_off(on)))
            .await
    }

    /// `:OUTP<ch> ON`
    pub async fn output_on(&mut self, channel: u8) -> DriverResult<()> {
        self.set_output(channel, true).await
    }

    /// `:OUTP<ch> OFF`
    pub async fn output_off(&mut self, channel: u8) -> DriverResult<()> {
        self.set_output(channel, false).await
    }

    /// Select the output function
    pub async fn set_waveform(&mut self, channel: u8, waveform: Waveform) -> DriverResult<()> {
        check_channel(channel)?;
        self.session
            .write(&format!(":SOUR{}:FUNC {}", channel, waveform.scpi()))
            .await
    }

    async fn upload(&mut self, channel: u8, name: &str, samples: &[f32]) -> DriverResult<()> {
        self.session
            .write_binary(
                &format!(":SOUR{}:DATA:ARB {},", channel, name),
                samples,
                ByteOrder::Little,
            )
            .await?;
        debug!(channel, name = %name, samples = samples.len(), "Arbitrary waveform uploaded");
        Ok(())
    }

    async fn select_arbitrary(&mut self, channel: u8, name: &str) -> DriverResult<()> {
        self.session
            .write(&format!(":SOUR{}:FUNC ARB", channel))
            .await?;
        self.session
            .write(&format!(":SOUR{}:FUNC:ARB {}", channel, name))
            .await
    }

    async fn set_sample_rate(&mut self, channel: u8, rate: f64) -> DriverResult<()> {
        let rate = scpi::number(rate)?;
        self.session
            .write(&format!(":SOUR{}:FUNC:ARB:SRAT {}", channel, rate))
            .await
    }

    /// Upload `samples` to volatile memory and play them on `channel`.
    ///
    /// Samples are clipped to [-1, 1]; the output is scaled by the
    /// amplitude and offset in `waveform`.
    pub async fn setup_arbitrary_waveform(
        &mut self,
        channel: u8,
        samples: &[f64],
        waveform: &ArbitraryWaveform,
    ) -> DriverResult<()> {
        check_channel(channel)?;
        check_waveform_name(&waveform.name)?;
        super::check_positive("sample rate", waveform.sample_rate)?;
        let data = normalise_samples(samples)?;

        self.session
            .write(&format!(":OUTP{}:LOAD 50", channel))
            .await?;
        self.session
            .write(&format!(":SOUR{}:DATA:VOL:CLE", channel))
            .await?;
        self.upload(channel, &waveform.name, &data).await?;
        self.select_arbitrary(channel, &waveform.name).await?;
        self.set_sample_rate(channel, waveform.sample_rate).await?;
        self.set_amplitude(channel, waveform.amplitude_vpp).await?;
        self.set_offset(channel, waveform.offset_v).await
    }

    /// Upload one waveform per channel as `MYARB1` and `MYARB2`.
    ///
    /// `channel1` and `channel2` are `(samples, amplitude_vpp, offset_v)`.
    pub async fn setup_dual_arbitrary_waveforms(
        &mut self,
        channel1: (&[f64], f64, f64),
        channel2: (&[f64], f64, f64),
        sample_rate: f64,
    ) -> DriverResult<()> {
        super::check_positive("sample rate", sample_rate)?;
        let data1 = normalise_samples(channel1.0)?;
        let data2 = normalise_samples(channel2.0)?;

        self.session.write(":SOUR1:DATA:VOL:CLE").await?;
        self.session.write(":SOUR2:DATA:VOL:CLE").await?;

        for (channel, data, amplitude, offset) in [
            (1u8, &data1, channel1.1, channel1.2),
            (2u8, &data2, channel2.1, channel2.2),
        ] {
            let name = format!("MYARB{}", channel);
            self.session
                .write(&format!(":OUTP{}:LOAD 50", channel))
                .await?;
            self.upload(channel, &name, data).await?;
            self.select_arbitrary(channel, &name).await?;
            self.set_amplitude(channel, amplitude).await?;
            self.set_offset(channel, offset).await?;
        }

        self.set_sample_rate(1, sample_rate).await?;
        self.set_sample_rate(2, sample_rate).await
    }

    /// Triggered burst of `cycles` periods per trigger.
    pub async fn setup_trigger(
        &mut self,
        channel: u8,
        source: TriggerSource,
        cycles: u32,
    ) -> DriverResult<()> {
        check_channel(channel)?;
        if cycles == 0 {
            return Err(DriverError::InvalidParameter(
                "burst needs at least one cycle".to_string(),
            ));
        }
        self.session
            .write(&format!(":SOUR{}:BURS:STAT ON", channel))
            .await?;
        self.session
            .write(&format!(":SOUR{}:BURS:MODE TRIG", channel))
            .await?;
        self.session
            .write(&format!(":SOUR{}:BURS:NCYC {}", channel, cycles))
            .await?;
        self.session
            .write(&format!(":TRIG{}:SOUR {}", channel, source.scpi()))
            .await
    }

    /// `*TRG`
    pub async fn trigger_manual(&mut self) -> DriverResult<()> {
        self.session.write("*TRG").await
    }

    /// One entry from the error queue
    pub async fn get_error(&mut self) -> DriverResult<ErrorEntry> {
        let reply = self.session.query(":SYST:ERR?").await?;
        ErrorEntry::parse(&reply)
    }
}

#[async_trait]
impl ScpiInstrument for RigolDg922Pro {
    fn model(&self) -> &'static str {
        "DG922Pro"
    }

    fn session(&self) -> &Session {
        &self.session
    }

    fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Both outputs off, then release the session.
    async fn close(&mut self) -> DriverResult<()> {
        if !self.session.is_open() {
            return Ok(());
        }
        let mut first_error = None;
        for channel in CHANNELS {
            if let Err(e) = self.output_off(channel).await {
                warn!(channel, error = %e, "Could not switch output off before closing");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        self.session.close().await?;
        first_error.map_or(Ok(()), Err)
    }
}

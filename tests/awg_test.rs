//! Rigol DG922 Pro integration tests
//!
//! Covers command text for the standard functions, the framing of
//! arbitrary waveform uploads and the outputs-off-on-close rule.

mod common;

use common::session_with;
use measurement_drivers::prelude::*;
use measurement_drivers::scpi::block::decode_block;
use measurement_drivers::scpi::ByteOrder;
use measurement_drivers::transport::MockTransport;
use tracing_test::traced_test;

const IDN: &str = "Rigol Technologies,DG922Pro,DG9R264500967,00.01.06\n";

async fn connected(mock: &MockTransport) -> RigolDg922Pro {
    let awg = RigolDg922Pro::from_session(session_with(mock)).await.unwrap();
    mock.clear_log();
    awg
}

/// Find the raw upload message and return the block that follows `prefix`.
fn uploaded_block(mock: &MockTransport, prefix: &str) -> Vec<u8> {
    mock.written_raw()
        .into_iter()
        .find(|raw| raw.starts_with(prefix.as_bytes()))
        .map(|raw| raw[prefix.len()..].to_vec())
        .unwrap_or_else(|| panic!("no message starting with {}", prefix))
}

/// Test that the handshake reads the identity
#[tokio::test]
async fn test_connect_reads_identity() {
    let mock = MockTransport::new().with_reply("*IDN?", IDN);
    let awg = RigolDg922Pro::from_session(session_with(&mock)).await.unwrap();

    assert_eq!(awg.identity().model, "DG922Pro");
    assert_eq!(awg.identity().serial, "DG9R264500967");
    assert_eq!(mock.written(), vec!["*IDN?"]);
}

/// Test the DC initialisation sequence
#[tokio::test]
async fn test_init_and_set_dc() {
    let mock = MockTransport::new().with_reply("*IDN?", IDN);
    let mut awg = connected(&mock).await;

    awg.init_and_set(2, -0.25).await.unwrap();

    assert_eq!(
        mock.written(),
        vec![":OUTP2:LOAD 50", ":SOUR2:APPL:DC DEF,DEF,-0.25"]
    );
}

/// Test a sine with phase sends APPL then PHAS
#[tokio::test]
async fn test_sine_with_phase() {
    let mock = MockTransport::new().with_reply("*IDN?", IDN);
    let mut awg = connected(&mock).await;

    let settings = SineSettings::new(1e6, 0.5).with_offset(0.1).with_phase(90.0);
    awg.set_sine(1, settings).await.unwrap();
    awg.set_sine(2, SineSettings::new(2e3, 1.0)).await.unwrap();

    assert_eq!(
        mock.written(),
        vec![
            ":SOUR1:APPL:SIN 1000000,0.5,0.1",
            ":SOUR1:PHAS 90",
            ":SOUR2:APPL:SIN 2000,1,0",
        ]
    );
}

/// Test that an amplitude below the minimum is clamped with a warning
#[tokio::test]
#[traced_test]
async fn test_sine_amplitude_clamped() {
    let mock = MockTransport::new().with_reply("*IDN?", IDN);
    let mut awg = connected(&mock).await;

    awg.set_sine(1, SineSettings::new(1e3, 0.0001)).await.unwrap();

    assert_eq!(mock.written(), vec![":SOUR1:APPL:SIN 1000,0.001,0"]);
    assert!(logs_contain("clamping"));
}

/// Test that an invalid channel is rejected before anything is sent
#[tokio::test]
async fn test_invalid_channel_sends_nothing() {
    let mock = MockTransport::new().with_reply("*IDN?", IDN);
    let mut awg = connected(&mock).await;

    for result in [
        awg.set_frequency(3, 1e3).await,
        awg.set_output(0, true).await,
        awg.set_waveform(3, Waveform::Square).await,
    ] {
        assert!(matches!(result, Err(DriverError::InvalidParameter(_))));
    }
    assert!(mock.written().is_empty());
}

/// Test the command sequence and block framing of an arbitrary upload
#[tokio::test]
async fn test_arbitrary_waveform_upload() {
    let mock = MockTransport::new().with_reply("*IDN?", IDN);
    let mut awg = connected(&mock).await;

    let waveform = ArbitraryWaveform::default()
        .with_amplitude(2.0)
        .with_offset(0.5);
    awg.setup_arbitrary_waveform(1, &[0.5, -2.0, 1.5, 0.0], &waveform)
        .await
        .unwrap();

    let written = mock.written();
    assert_eq!(written.len(), 8);
    assert_eq!(written[0], ":OUTP1:LOAD 50");
    assert_eq!(written[1], ":SOUR1:DATA:VOL:CLE");
    assert!(written[2].starts_with(":SOUR1:DATA:ARB USER_WAV,#216"));
    assert_eq!(
        &written[3..],
        &[
            ":SOUR1:FUNC ARB",
            ":SOUR1:FUNC:ARB USER_WAV",
            ":SOUR1:FUNC:ARB:SRAT 1000",
            ":SOUR1:VOLT 2",
            ":SOUR1:VOLT:OFFS 0.5",
        ]
    );

    // Samples are clipped to [-1, 1] and sent as little-endian f32
    let block = uploaded_block(&mock, ":SOUR1:DATA:ARB USER_WAV,");
    assert_eq!(&block[..4], b"#216");
    assert_eq!(&block[4..8], &0.5f32.to_le_bytes());
    assert_eq!(block.last(), Some(&b'\n'));
    let samples = decode_block::<f32>(&block, ByteOrder::Little).unwrap();
    assert_eq!(samples, vec![0.5, -1.0, 1.0, 0.0]);
}

/// Test that bad waveform input is rejected before anything is sent
#[tokio::test]
async fn test_arbitrary_waveform_validation() {
    let mock = MockTransport::new().with_reply("*IDN?", IDN);
    let mut awg = connected(&mock).await;

    let empty = awg
        .setup_arbitrary_waveform(1, &[], &ArbitraryWaveform::default())
        .await;
    let nan = awg
        .setup_arbitrary_waveform(1, &[0.0, f64::NAN], &ArbitraryWaveform::default())
        .await;
    let bad_name = awg
        .setup_arbitrary_waveform(1, &[0.0], &ArbitraryWaveform::new("my wave", 1e3))
        .await;
    let bad_rate = awg
        .setup_arbitrary_waveform(2, &[0.0], &ArbitraryWaveform::new("W", 0.0))
        .await;

    for result in [empty, nan, bad_name, bad_rate] {
        assert!(matches!(result, Err(DriverError::InvalidParameter(_))));
    }
    assert!(mock.written().is_empty());
}

/// Test the order of a dual-channel upload
#[tokio::test]
async fn test_dual_arbitrary_waveforms() {
    let mock = MockTransport::new().with_reply("*IDN?", IDN);
    let mut awg = connected(&mock).await;

    let ramp = [0.0, 0.5, 1.0];
    let square = [1.0, -1.0];
    awg.setup_dual_arbitrary_waveforms((&ramp, 1.0, 0.0), (&square, 0.5, -0.1), 1e6)
        .await
        .unwrap();

    let written = mock.written();
    assert_eq!(&written[..3], &[":SOUR1:DATA:VOL:CLE", ":SOUR2:DATA:VOL:CLE", ":OUTP1:LOAD 50"]);
    assert!(written[3].starts_with(":SOUR1:DATA:ARB MYARB1,#212"));
    assert_eq!(
        &written[4..9],
        &[
            ":SOUR1:FUNC ARB",
            ":SOUR1:FUNC:ARB MYARB1",
            ":SOUR1:VOLT 1",
            ":SOUR1:VOLT:OFFS 0",
            ":OUTP2:LOAD 50",
        ]
    );
    assert!(written[9].starts_with(":SOUR2:DATA:ARB MYARB2,#18"));
    assert_eq!(
        &written[10..],
        &[
            ":SOUR2:FUNC ARB",
            ":SOUR2:FUNC:ARB MYARB2",
            ":SOUR2:VOLT 0.5",
            ":SOUR2:VOLT:OFFS -0.1",
            ":SOUR1:FUNC:ARB:SRAT 1000000",
            ":SOUR2:FUNC:ARB:SRAT 1000000",
        ]
    );
}

/// Test burst trigger configuration
#[tokio::test]
async fn test_setup_trigger() {
    let mock = MockTransport::new().with_reply("*IDN?", IDN);
    let mut awg = connected(&mock).await;

    awg.setup_trigger(1, TriggerSource::External, 5).await.unwrap();
    awg.trigger_manual().await.unwrap();
    let err = awg.setup_trigger(1, TriggerSource::Manual, 0).await.unwrap_err();

    assert!(matches!(err, DriverError::InvalidParameter(_)));
    assert_eq!(
        mock.written(),
        vec![
            ":SOUR1:BURS:STAT ON",
            ":SOUR1:BURS:MODE TRIG",
            ":SOUR1:BURS:NCYC 5",
            ":TRIG1:SOUR EXT",
            "*TRG",
        ]
    );
}

/// Test the error queue query
#[tokio::test]
async fn test_get_error() {
    let mock = MockTransport::new()
        .with_reply("*IDN?", IDN)
        .with_reply(":SYST:ERR?", "0,\"No error\"\n");
    let mut awg = connected(&mock).await;

    let entry = awg.get_error().await.unwrap();
    assert!(entry.is_no_error());
}

/// Test that close switches both outputs off once
#[tokio::test]
async fn test_close_turns_outputs_off() {
    let mock = MockTransport::new().with_reply("*IDN?", IDN);
    let mut awg = connected(&mock).await;

    awg.close().await.unwrap();
    awg.close().await.unwrap();

    assert_eq!(mock.written(), vec![":OUTP1 OFF", ":OUTP2 OFF"]);
    assert_eq!(mock.close_count(), 1);
}

/// Test that one failed output-off does not stop the other or the release
#[tokio::test]
async fn test_close_continues_after_failure() {
    let mock = MockTransport::new().with_reply("*IDN?", IDN);
    let mut awg = connected(&mock).await;
    mock.inject_next_failure();

    let err = awg.close().await.unwrap_err();

    assert!(matches!(err, DriverError::Communication { .. }));
    assert_eq!(mock.written(), vec![":OUTP2 OFF"]);
    assert_eq!(mock.close_count(), 1);
}

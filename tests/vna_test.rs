//! R&S ZNL20 vector network analyzer integration tests
//!
//! Runs the `Vna` driver against the mock transport: connect handshake,
//! sweep setup, complex trace transfer and marker handling.

mod common;

use common::{f32_block, session_with};
use measurement_drivers::prelude::*;
use measurement_drivers::transport::MockTransport;

const IDN: &str = "Rohde-Schwarz,ZNL20-2Port,1323.0012k20/101234,1.10\n";

/// Mock answering the handshake and a 1-2 GHz, 3 point sweep.
fn analyzer_mock() -> MockTransport {
    MockTransport::new()
        .with_reply("*IDN?", IDN)
        .with_reply("SENS:FREQ:STAR?", "1.000000000E+09\n")
        .with_reply("SENS:FREQ:STOP?", "2.000000000E+09\n")
        .with_reply("SENS:SWE:POIN?", "3\n")
}

async fn connected(mock: &MockTransport) -> Vna {
    let vna = Vna::from_session(session_with(mock)).await.unwrap();
    mock.clear_log();
    vna
}

/// Test that the handshake clears status before identifying
#[tokio::test]
async fn test_connect_handshake() {
    let mock = analyzer_mock();
    let vna = Vna::from_session(session_with(&mock)).await.unwrap();

    assert_eq!(mock.written(), vec!["*CLS", "*IDN?"]);
    assert_eq!(vna.identity().manufacturer, "Rohde-Schwarz");
    assert_eq!(vna.model(), "ZNL20");
}

/// Test sweep configuration commands
#[tokio::test]
async fn test_sweep_configuration() {
    let mock = analyzer_mock();
    let mut vna = connected(&mock).await;

    vna.set_sweep_range(1e9, 2e9, 201).await.unwrap();
    vna.set_if_bandwidth(1e3).await.unwrap();
    vna.set_power(-10.0).await.unwrap();

    assert_eq!(
        mock.written(),
        vec![
            "SENS:FREQ:STAR 1000000000",
            "SENS:FREQ:STOP 2000000000",
            "SENS:SWE:POIN 201",
            "SENS:BAND 1000",
            "SOUR:POW -10",
        ]
    );
}

/// Test that invalid sweep settings send nothing
#[tokio::test]
async fn test_sweep_validation() {
    let mock = analyzer_mock();
    let mut vna = connected(&mock).await;

    assert!(matches!(
        vna.set_sweep_range(2e9, 1e9, 201).await,
        Err(DriverError::InvalidParameter(_))
    ));
    assert!(matches!(
        vna.set_sweep_range(1e9, 2e9, 1).await,
        Err(DriverError::InvalidParameter(_))
    ));
    assert!(matches!(
        vna.set_if_bandwidth(0.0).await,
        Err(DriverError::InvalidParameter(_))
    ));
    assert!(mock.written().is_empty());
}

/// Test trace creation and the catalog query
#[tokio::test]
async fn test_select_or_create_trace() {
    let mock = analyzer_mock()
        .with_reply("SYST:ERR?", "0,\"No error\"\n")
        .with_reply("CALC1:PAR:CAT?", "'Trc1,S11,Trc2,S21'\n");
    let mut vna = connected(&mock).await;

    let entry = vna
        .select_or_create_trace("Trc2", SParameter::S21, 1)
        .await
        .unwrap();
    let catalog = vna.trace_catalog(1).await.unwrap();

    assert!(entry.is_no_error());
    assert_eq!(
        &mock.written()[..2],
        &["CALC1:PAR:MEAS 'Trc2','S21'", "CALC1:PAR:SEL 'Trc2'"]
    );
    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog[1].name, "Trc2");
    assert_eq!(catalog[1].parameter, "S21");
}

/// Test the complex trace transfer
#[tokio::test]
async fn test_get_trace_data() {
    let samples = [1.0f32, 0.0, 0.0, 1.0, 0.5, -0.5];
    let mock = analyzer_mock().with_reply("CALC1:DATA? SDAT", f32_block(&samples));
    let mut vna = connected(&mock).await;

    let trace = vna.get_trace_data(1).await.unwrap();

    assert_eq!(trace.len(), 3);
    assert_eq!(trace.frequencies_hz, vec![1e9, 1.5e9, 2e9]);
    assert_eq!(trace.values[0].re, 1.0);
    assert_eq!(trace.values[1].im, 1.0);
    assert_eq!(trace.values[2].re, 0.5);
    assert_eq!(trace.values[2].im, -0.5);
    assert!(trace.magnitude_db()[0].abs() < 1e-9);
    assert!((trace.phase_deg()[1] - 90.0).abs() < 1e-9);
    assert_eq!(
        &mock.written()[3..],
        &["FORM:DATA REAL,32", "FORM:BORD SWAP", "CALC1:DATA? SDAT"]
    );
}

/// Test that an odd number of floats cannot form complex points
#[tokio::test]
async fn test_odd_sample_count_is_parse_error() {
    let mock = analyzer_mock().with_reply("CALC1:DATA? SDAT", f32_block(&[1.0, 0.0, 0.5]));
    let mut vna = connected(&mock).await;

    let err = vna.get_trace_data(1).await.unwrap_err();
    assert!(matches!(err, DriverError::Parse(_)), "unexpected error: {:?}", err);
}

/// Test that a trace whose length disagrees with the axis is rejected
#[tokio::test]
async fn test_trace_axis_mismatch_is_parse_error() {
    let mock = analyzer_mock().with_reply("CALC1:DATA? FDAT", f32_block(&[-3.0, -4.0]));
    let mut vna = connected(&mock).await;

    let err = vna.get_formatted_trace(1).await.unwrap_err();
    assert!(matches!(err, DriverError::Parse(_)), "unexpected error: {:?}", err);
}

/// Test that a negative point count from the analyzer is a Parse error
#[tokio::test]
async fn test_negative_point_count_is_parse_error() {
    let mock = analyzer_mock();
    mock.set_reply("SENS:SWE:POIN?", "-1\n");
    let mut vna = connected(&mock).await;

    let err = vna.frequency_axis().await.unwrap_err();
    assert!(matches!(err, DriverError::Parse(_)), "unexpected error: {:?}", err);
}

/// Test that channel 0 is rejected
#[tokio::test]
async fn test_channel_zero_rejected() {
    let mock = analyzer_mock();
    let mut vna = connected(&mock).await;

    let err = vna.trace_catalog(0).await.unwrap_err();
    assert!(matches!(err, DriverError::InvalidParameter(_)));
    assert!(mock.written().is_empty());
}

/// Test that a marker outside the sweep is refused
#[tokio::test]
async fn test_marker_outside_sweep() {
    let mock = analyzer_mock();
    let mut vna = connected(&mock).await;

    vna.set_marker_x(1, 1.5e9).await.unwrap();
    let err = vna.set_marker_x(1, 2.5e9).await.unwrap_err();

    assert!(matches!(err, DriverError::InvalidParameter(_)));
    let marker_writes: Vec<String> = mock
        .written()
        .into_iter()
        .filter(|c| c.starts_with("CALC:MARK"))
        .collect();
    assert_eq!(marker_writes, vec!["CALC:MARK1:X 1500000000"]);
}

/// Test that marker indices are bounded
#[tokio::test]
async fn test_marker_index_bounds() {
    let mock = analyzer_mock();
    let mut vna = connected(&mock).await;

    assert!(vna.set_marker(0, true).await.is_err());
    assert!(vna.set_marker(11, true).await.is_err());
    assert!(mock.written().is_empty());
}

/// Test that active marker probing stops at the first unanswered marker
#[tokio::test(start_paused = true)]
async fn test_active_markers_stop_at_timeout() {
    let mock = analyzer_mock()
        .with_reply("CALC:MARK1:STAT?", "1\n")
        .with_reply("CALC:MARK2:STAT?", "0\n")
        .with_reply("CALC:MARK3:STAT?", "1\n")
        .with_reply("CALC:MARK1:X?", "1.2E+09\n")
        .with_reply("CALC:MARK1:Y?", "-3.5\n")
        .with_reply("CALC:MARK3:X?", "1.8E+09\n")
        .with_reply("CALC:MARK3:Y?", "-20.25\n");
    let mut vna = connected(&mock).await;

    assert_eq!(vna.active_markers().await.unwrap(), vec![1, 3]);

    let readings = vna.all_marker_xy().await.unwrap();
    assert_eq!(readings, vec![(1, 1.2e9, -3.5), (3, 1.8e9, -20.25)]);
}

/// Test that active marker probing on a closed session is an error
#[tokio::test]
async fn test_active_markers_after_close() {
    let mock = analyzer_mock();
    let mut vna = connected(&mock).await;
    vna.close().await.unwrap();

    let err = vna.active_markers().await.unwrap_err();
    assert!(matches!(err, DriverError::NotConnected(_)));
}

/// Test single sweep with completion wait
#[tokio::test]
async fn test_single_sweep_waits() {
    let mock = analyzer_mock().with_reply("*OPC?", "1\n");
    let mut vna = connected(&mock).await;

    vna.single_sweep(true).await.unwrap();

    assert_eq!(mock.written(), vec!["INIT:CONT OFF", "INIT:IMM", "*OPC?"]);
}

/// Test clearing markers
#[tokio::test]
async fn test_clear_markers() {
    let mock = analyzer_mock();
    let mut vna = connected(&mock).await;

    vna.clear_markers(3).await.unwrap();

    assert_eq!(
        mock.written(),
        vec!["CALC:MARK1:STAT OFF", "CALC:MARK2:STAT OFF", "CALC:MARK3:STAT OFF"]
    );
}

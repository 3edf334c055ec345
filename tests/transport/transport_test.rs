// Transport Tests
// UART and BLE implementations of the Transport trait over simulated links

use ambiance::transport::sim::{SimulatedBleLink, SimulatedChannel};
use ambiance::transport::{
    BleCharacteristic, BleProfile, BleService, BleTransport, Endpoint, FlowConfig, Transport,
    TransportError, TransportKind, UartConfig, UartTransport,
};

// ============================================================================
// ENDPOINTS AND ERRORS
// ============================================================================

#[test]
fn test_endpoint_kind_and_display() {
    let uart = Endpoint::uart("/dev/ttyUSB0", 9600);
    assert_eq!(uart.kind(), TransportKind::Uart);
    assert_eq!(uart.to_string(), "uart:///dev/ttyUSB0@9600");

    let ble = Endpoint::ble("AA:BB:CC:DD:EE:FF");
    assert_eq!(ble.kind(), TransportKind::Ble);
    assert_eq!(ble, Endpoint::ble("aa:bb:cc:dd:ee:ff"));
}

#[test]
fn test_error_classification() {
    assert!(TransportError::IncompatibleDevice("x".into()).is_fatal());
    assert!(!TransportError::IncompatibleDevice("x".into()).is_retryable());
    assert!(TransportError::HardwareUnavailable("x".into()).is_fatal());
    assert!(TransportError::ConnectFailed("x".into()).is_retryable());
    assert!(TransportError::Timeout("x".into()).is_timeout());
    assert!(!TransportError::Timeout("x".into()).is_link_failure());
    assert!(TransportError::Closed.is_link_failure());
}

// ============================================================================
// UART TRANSPORT
// ============================================================================

#[tokio::test]
async fn test_uart_frame_is_one_write() {
    let channel = SimulatedChannel::new();
    let mut transport = UartTransport::new(Box::new(channel.clone()), UartConfig::default());

    let frame = vec![0x05, 7, 21, 72, 28, 168, 1, 2, 0x0D];
    let reply = transport.send_frame(&frame).await.unwrap();

    assert!(reply.is_empty());
    assert_eq!(channel.writes(), vec![frame.clone()]);
    assert_eq!(transport.stats().frames_sent, 1);
    assert_eq!(transport.stats().bytes_sent, frame.len() as u64);
}

#[tokio::test]
async fn test_uart_read_chunk_respects_max() {
    let channel = SimulatedChannel::new();
    channel.push_inbound(b"hello world");
    let mut transport = UartTransport::new(Box::new(channel.clone()), UartConfig::default());

    assert_eq!(transport.read_chunk(5).await.unwrap(), b"hello");
    assert_eq!(transport.read_chunk(64).await.unwrap(), b" world");
    assert!(transport.read_chunk(64).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_uart_drain_output() {
    let channel = SimulatedChannel::new();
    channel.push_inbound(b"Track finished\r\n");
    let mut transport = UartTransport::new(Box::new(channel.clone()), UartConfig::default());

    assert_eq!(transport.drain_output().await.unwrap(), b"Track finished\r\n");
}

#[tokio::test]
async fn test_uart_close_is_idempotent() {
    let channel = SimulatedChannel::new();
    let mut transport = UartTransport::new(Box::new(channel.clone()), UartConfig::default());

    transport.close().await.unwrap();
    transport.close().await.unwrap();

    assert_eq!(channel.close_calls(), 1);
    assert_eq!(transport.send_frame(&[0x02]).await, Err(TransportError::Closed));
}

#[test]
fn test_uart_config_validation() {
    assert!(UartConfig::default().validate().is_ok());
    assert!(UartConfig::new().with_read_timeout_ms(0).validate().is_err());
}

// ============================================================================
// BLE VERIFICATION
// ============================================================================

#[test]
fn test_profile_uuids() {
    let profile = BleProfile::default();
    assert_eq!(profile.service_uuid.to_string(), "d2de8bd0-2b7a-11f0-90a7-0800200c9a66");
    assert_eq!(profile.tx_uuid.to_string(), "d2de8bd1-2b7a-11f0-90a7-0800200c9a66");
    assert_eq!(profile.rx_uuid.to_string(), "d2de8bd2-2b7a-11f0-90a7-0800200c9a66");
    assert_eq!(profile.flow_uuid.to_string(), "d2de8bd3-2b7a-11f0-90a7-0800200c9a66");
}

#[test]
fn test_verify_accepts_extra_characteristics() {
    let profile = BleProfile::default();
    let service = profile
        .service()
        .with_characteristic(BleCharacteristic::new(uuid::Uuid::from_u128(42)).with_read());
    assert!(profile.verify(&[service]).is_ok());
}

#[test]
fn test_verify_rejects_missing_flow_control() {
    let profile = BleProfile::default();
    let service = BleService::new(profile.service_uuid)
        .with_characteristic(BleCharacteristic::new(profile.tx_uuid).with_read())
        .with_characteristic(BleCharacteristic::new(profile.rx_uuid).with_write());

    let err = profile.verify(&[service]).unwrap_err();
    assert!(err.is_fatal());
    assert!(err.to_string().contains("flow-control"));
}

#[test]
fn test_verify_rejects_read_only_flow_register() {
    let profile = BleProfile::default();
    let service = BleService::new(profile.service_uuid)
        .with_characteristic(BleCharacteristic::new(profile.tx_uuid).with_read())
        .with_characteristic(BleCharacteristic::new(profile.rx_uuid).with_write())
        .with_characteristic(BleCharacteristic::new(profile.flow_uuid).with_read());

    let err = profile.verify(&[service]).unwrap_err();
    assert!(matches!(err, TransportError::IncompatibleDevice(_)));
    assert!(err.to_string().contains("flow-control"));
    assert!(!err.to_string().contains("RX"));
}

#[test]
fn test_verify_rejects_missing_service() {
    let profile = BleProfile::default();
    let err = profile.verify(&[]).unwrap_err();
    assert!(matches!(err, TransportError::IncompatibleDevice(_)));
}

#[tokio::test(start_paused = true)]
async fn test_ble_open_disconnects_incompatible_link() {
    let profile = BleProfile::default();
    let link = SimulatedBleLink::with_services(profile.clone(), Vec::new());

    let result = BleTransport::open(Box::new(link.clone()), profile, FlowConfig::default()).await;

    assert!(matches!(result, Err(TransportError::IncompatibleDevice(_))));
    assert!(link.is_disconnected());
}

// ============================================================================
// BLE TRANSPORT
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_ble_send_frame_collects_reply() {
    let profile = BleProfile::default();
    let link = SimulatedBleLink::compatible(profile.clone());
    link.push_tx(b"OK\n");

    let mut transport = BleTransport::open(Box::new(link.clone()), profile, FlowConfig::default())
        .await
        .unwrap();
    let reply = transport.send_frame(&[0x00, 0x32]).await.unwrap();

    assert!(reply.complete);
    assert_eq!(reply.text(), "OK");
    assert_eq!(link.rx_bytes(), vec![0x00, 0x32]);
    assert_eq!(transport.kind(), TransportKind::Ble);
}

#[tokio::test(start_paused = true)]
async fn test_ble_silent_timeout_is_error() {
    let profile = BleProfile::default();
    let link = SimulatedBleLink::compatible(profile.clone());
    link.set_register(1);

    let mut transport = BleTransport::open(
        Box::new(link.clone()),
        profile,
        FlowConfig::new().with_max_polls(4),
    )
    .await
    .unwrap();

    let err = transport.send_frame(&[0x04, 0x10]).await.unwrap_err();
    assert!(err.is_timeout());
}

#[tokio::test(start_paused = true)]
async fn test_ble_partial_reply_on_timeout() {
    let profile = BleProfile::default();
    let link = SimulatedBleLink::compatible(profile.clone());
    link.set_register(1);
    link.push_tx(b"half");

    let mut transport = BleTransport::open(
        Box::new(link.clone()),
        profile,
        FlowConfig::new().with_max_polls(4),
    )
    .await
    .unwrap();

    let reply = transport.send_frame(&[0x01, 1, 1]).await.unwrap();
    assert!(!reply.complete);
    assert_eq!(reply.data, b"half");
}

#[tokio::test(start_paused = true)]
async fn test_ble_read_chunk_acknowledges() {
    let profile = BleProfile::default();
    let link = SimulatedBleLink::compatible(profile.clone());

    let mut transport = BleTransport::open(Box::new(link.clone()), profile.clone(), FlowConfig::default())
        .await
        .unwrap();
    transport.begin_stream(&[0x02]).await.unwrap();

    link.push_tx(&[0x00, 0x03]);
    assert_eq!(transport.read_chunk(2).await.unwrap(), vec![0x00, 0x03]);
    assert!(transport.read_chunk(2).await.unwrap().is_empty());

    // Stream request plus one acknowledgement for the non-empty chunk
    assert_eq!(link.writes_to(profile.flow_uuid).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_ble_close_is_idempotent() {
    let profile = BleProfile::default();
    let link = SimulatedBleLink::compatible(profile.clone());

    let mut transport = BleTransport::open(Box::new(link.clone()), profile, FlowConfig::default())
        .await
        .unwrap();
    transport.close().await.unwrap();
    transport.close().await.unwrap();

    assert_eq!(link.disconnect_calls(), 1);
    assert!(matches!(transport.read_chunk(1).await, Err(TransportError::Closed)));
}

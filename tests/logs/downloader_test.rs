// Log Downloader Tests
// Size prefix handling, chunked reads and incomplete transfers

use ambiance::logs::{LogDownloader, LogDownloaderConfig, LogError};
use ambiance::transport::sim::{SimulatedBleLink, SimulatedChannel};
use ambiance::transport::{
    BleProfile, BleTransport, FlowConfig, Transport, TransportError, UartConfig, UartTransport,
};
use tokio::time::{Duration, Instant};

fn uart_with(inbound: &[u8]) -> (UartTransport, SimulatedChannel) {
    let channel = SimulatedChannel::new();
    channel.push_inbound(inbound);
    let transport = UartTransport::new(Box::new(channel.clone()), UartConfig::default());
    (transport, channel)
}

fn size_prefixed(payload: &[u8], announced: u16) -> Vec<u8> {
    let mut bytes = announced.to_be_bytes().to_vec();
    bytes.extend_from_slice(payload);
    bytes
}

// ============================================================================
// UART
// ============================================================================

#[tokio::test]
async fn test_uart_download_complete() {
    let payload = b"2025-07-01 09:00 play 1/2\n2025-07-01 21:00 stop\n";
    let (mut transport, channel) = uart_with(&size_prefixed(payload, payload.len() as u16));

    let downloader = LogDownloader::new(LogDownloaderConfig::new().with_chunk_size(8));
    let transfer = downloader.download(&mut transport).await.unwrap();

    assert!(transfer.is_complete());
    assert_eq!(transfer.received(), payload);
    assert_eq!(transfer.text(), String::from_utf8_lossy(payload));
    assert_eq!(channel.writes(), vec![vec![0x02]]);
}

#[tokio::test]
async fn test_uart_download_incomplete() {
    let payload = vec![b'a'; 300];
    let (mut transport, _channel) = uart_with(&size_prefixed(&payload, 500));

    let err = LogDownloader::default().download(&mut transport).await.unwrap_err();

    match err {
        LogError::IncompleteTransfer {
            expected,
            received,
            partial,
        } => {
            assert_eq!(expected, 500);
            assert_eq!(received, 300);
            assert_eq!(partial, payload);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_size_prefix_is_short_read() {
    let (mut transport, _channel) = uart_with(&[0x01]);

    let err = LogDownloader::default().download(&mut transport).await.unwrap_err();
    assert_eq!(err, LogError::ShortRead { received: 1 });
}

#[tokio::test]
async fn test_zero_size_log() {
    let (mut transport, _channel) = uart_with(&[0x00, 0x00]);

    let transfer = LogDownloader::default().download(&mut transport).await.unwrap();
    assert!(transfer.received().is_empty());
    assert_eq!(transfer.expected_size(), 0);
}

#[tokio::test]
async fn test_extra_bytes_are_dropped() {
    let (mut transport, _channel) = uart_with(&size_prefixed(b"abcdef", 4));

    let transfer = LogDownloader::default().download(&mut transport).await.unwrap();
    assert_eq!(transfer.received(), b"abcd");
}

#[tokio::test]
async fn test_invalid_utf8_is_replaced() {
    let (mut transport, _channel) = uart_with(&size_prefixed(&[b'o', 0xC3, b'k'], 3));

    let transfer = LogDownloader::default().download(&mut transport).await.unwrap();
    assert_eq!(transfer.text(), "o\u{FFFD}k");
}

#[tokio::test(start_paused = true)]
async fn test_deadline_returns_partial_payload() {
    let (mut transport, channel) = uart_with(&size_prefixed(&[b'a'; 500], 500));
    channel.set_read_delay(Duration::from_millis(500));

    let downloader = LogDownloader::new(LogDownloaderConfig::new().with_chunk_size(10));
    let deadline = Instant::now() + Duration::from_millis(2_750);
    let err = downloader.download_until(&mut transport, deadline).await.unwrap_err();

    // Size prefix at 500 ms, then one payload chunk per 500 ms
    assert_eq!(
        err,
        LogError::IncompleteTransfer {
            expected: 500,
            received: 40,
            partial: vec![b'a'; 40],
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_deadline_before_size_prefix_is_timeout() {
    let (mut transport, channel) = uart_with(&size_prefixed(b"late", 4));
    channel.set_read_delay(Duration::from_secs(1));

    let deadline = Instant::now() + Duration::from_millis(200);
    let err = LogDownloader::default()
        .download_until(&mut transport, deadline)
        .await
        .unwrap_err();

    assert!(matches!(err, LogError::Transport(TransportError::Timeout(_))));
}

#[tokio::test(start_paused = true)]
async fn test_download_within_deadline_completes() {
    let (mut transport, channel) = uart_with(&size_prefixed(b"on time", 7));
    channel.set_read_delay(Duration::from_millis(100));

    let deadline = Instant::now() + Duration::from_secs(5);
    let transfer = LogDownloader::default()
        .download_until(&mut transport, deadline)
        .await
        .unwrap();

    assert_eq!(transfer.text(), "on time");
}

// ============================================================================
// BLE
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_ble_download_acknowledges_every_chunk() {
    let profile = BleProfile::default();
    let link = SimulatedBleLink::compatible(profile.clone());
    let mut transport = BleTransport::open(Box::new(link.clone()), profile.clone(), FlowConfig::default())
        .await
        .unwrap();

    link.push_tx(&[0x00]);
    link.push_tx(&[0x0A]);
    link.push_tx(b"event ");
    link.push_tx(b"log");
    link.push_tx(b"!");

    let transfer = LogDownloader::default().download(&mut transport).await.unwrap();

    assert_eq!(transfer.text(), "event log!");
    assert_eq!(link.rx_bytes(), vec![0x02]);
    // Stream request plus five acknowledgements
    assert_eq!(link.writes_to(profile.flow_uuid).len(), 6);
    assert_eq!(transport.stats().bytes_received, 12);
}

#[tokio::test(start_paused = true)]
async fn test_ble_size_and_payload_in_one_value() {
    let profile = BleProfile::default();
    let link = SimulatedBleLink::compatible(profile.clone());
    let mut transport = BleTransport::open(Box::new(link.clone()), profile, FlowConfig::default())
        .await
        .unwrap();

    link.push_tx(&size_prefixed(b"boot ok", 7));

    let transfer = LogDownloader::default().download(&mut transport).await.unwrap();
    assert_eq!(transfer.text(), "boot ok");
}

#[tokio::test(start_paused = true)]
async fn test_ble_stall_keeps_partial() {
    let profile = BleProfile::default();
    let link = SimulatedBleLink::compatible(profile.clone());
    let mut transport = BleTransport::open(Box::new(link.clone()), profile, FlowConfig::default())
        .await
        .unwrap();

    link.push_tx(&size_prefixed(b"half", 10));

    let err = LogDownloader::default().download(&mut transport).await.unwrap_err();

    assert_eq!(
        err,
        LogError::IncompleteTransfer {
            expected: 10,
            received: 4,
            partial: b"half".to_vec(),
        }
    );
    assert_eq!(err.partial(), Some(&b"half"[..]));
}

#[tokio::test(start_paused = true)]
async fn test_ble_link_loss_before_size_is_transport_error() {
    let profile = BleProfile::default();
    let link = SimulatedBleLink::compatible(profile.clone());
    let mut transport = BleTransport::open(Box::new(link.clone()), profile, FlowConfig::default())
        .await
        .unwrap();

    transport.begin_stream(&[0x02]).await.unwrap();
    link.fail_tx_reads(true);

    let err = LogDownloader::default().download(&mut transport).await.unwrap_err();
    assert!(matches!(err, LogError::Transport(_)));
}

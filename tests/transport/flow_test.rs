// BLE Flow Control Tests
// Poll loop termination, acknowledgements and register handling

use ambiance::transport::sim::SimulatedBleLink;
use ambiance::transport::{BleProfile, FlowConfig, FlowController, FlowState, PollOutcome};
use tokio::time::Instant;

fn controller() -> FlowController {
    FlowController::new(FlowConfig::default(), BleProfile::default())
}

// ============================================================================
// TERMINATION
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_poll_terminates_when_tx_reads_always_fail() {
    let profile = BleProfile::default();
    let mut link = SimulatedBleLink::compatible(profile.clone());
    link.fail_tx_reads(true);
    link.set_register(1);

    let mut flow = controller();
    let started = Instant::now();
    let outcome = flow.poll(&mut link).await;

    assert_eq!(outcome, PollOutcome::TimedOut(Vec::new()));
    // 80 polls with a 10 ms sleep after each
    assert!(started.elapsed() >= std::time::Duration::from_millis(800));
    assert!(link.writes_to(profile.flow_uuid).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_poll_keeps_partial_data_on_timeout() {
    let link_profile = BleProfile::default();
    let mut link = SimulatedBleLink::compatible(link_profile);
    link.set_register(1);
    link.push_tx(b"par");
    link.push_tx(b"tial");

    let mut flow = FlowController::new(FlowConfig::new().with_max_polls(5), BleProfile::default());
    let outcome = flow.poll(&mut link).await;

    assert_eq!(outcome, PollOutcome::TimedOut(b"partial".to_vec()));
    assert!(!outcome.is_complete());
}

#[tokio::test(start_paused = true)]
async fn test_unknown_register_values_are_ignored() {
    let mut link = SimulatedBleLink::compatible(BleProfile::default());
    link.set_register(9);

    let mut flow = FlowController::new(FlowConfig::new().with_max_polls(3), BleProfile::default());
    let outcome = flow.poll(&mut link).await;

    assert_eq!(outcome, PollOutcome::TimedOut(Vec::new()));
    assert_eq!(flow.state(), FlowState::Idle);
}

// ============================================================================
// EXCHANGE
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_exchange_paces_payload_and_acknowledges_chunks() {
    let profile = BleProfile::default();
    let mut link = SimulatedBleLink::compatible(profile.clone());
    link.push_tx(b"Volume ");
    link.push_tx(b"set");

    let mut flow = controller();
    let outcome = flow.exchange(&mut link, &[0x00, 0x32]).await.unwrap();

    assert_eq!(outcome, PollOutcome::Complete(b"Volume set".to_vec()));
    assert_eq!(flow.state(), FlowState::Complete);

    // One RX write per payload byte
    assert_eq!(link.writes_to(profile.rx_uuid), vec![vec![0x00], vec![0x32]]);

    // Request plus one acknowledgement per chunk
    assert_eq!(link.writes_to(profile.flow_uuid), vec![vec![1], vec![1], vec![1]]);
}

#[tokio::test(start_paused = true)]
async fn test_exchange_without_reply_is_empty() {
    let mut link = SimulatedBleLink::compatible(BleProfile::default());

    let mut flow = controller();
    let outcome = flow.exchange(&mut link, &[0x02]).await.unwrap();

    assert_eq!(outcome, PollOutcome::Empty);
    assert!(outcome.data().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_exchange_fails_when_rx_write_fails() {
    let mut link = SimulatedBleLink::compatible(BleProfile::default());
    link.fail_writes(true);

    let mut flow = controller();
    assert!(flow.exchange(&mut link, &[0x00, 0x10]).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_scripted_register_sequence() {
    let mut link = SimulatedBleLink::compatible(BleProfile::default());
    link.script_register(&[1, 1, 2]);

    let mut flow = controller();
    flow.request(&mut link).await.unwrap();
    let outcome = flow.poll(&mut link).await;

    assert_eq!(outcome, PollOutcome::Empty);
}

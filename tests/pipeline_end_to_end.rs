//! End-to-end runs of the gesture pipeline over virtual hands

use std::time::Duration;

use futures::StreamExt;
use gesturelink::codec::{Delimiting, decode, encode};
use gesturelink::config::PipelineConfig;
use gesturelink::hand::{HandTiming, PsyonicHand, SmartHand, ZeusHand};
use gesturelink::pipeline::SmoothingMethod;
use gesturelink::protocol::summation::CMD_FINGER_POS;
use gesturelink::protocol::{ByteOrder, CrcFrameProtocol, PacketProtocol, SummationProtocol};
use gesturelink::transport::{VirtualProbe, VirtualTransport};
use gesturelink::{
    GestureLink, GestureSet, LinkConfig, PipelineOutcome, PipelineState, PredictionSample, UpdateRate,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn smart_hand() -> (SmartHand, VirtualProbe) {
    let transport = VirtualTransport::new("smart");
    let probe = transport.probe();
    (SmartHand::new(Box::new(transport), HandTiming::IMMEDIATE), probe)
}

fn no_smoothing() -> PipelineConfig {
    PipelineConfig { smoothing_window: 1, debounce_ms: 500, ..PipelineConfig::default() }
}

#[tokio::test]
async fn duplicate_within_debounce_is_suppressed() {
    init_tracing();
    let (hand, probe) = smart_hand();
    let gestures = GestureSet::default();
    let session = GestureLink::start_with_hand(hand, gestures.clone(), &no_smoothing()).unwrap();

    let predictions = session.predictions();
    for (t, idx) in [(0.0, 0), (0.05, 0), (0.2, 2)] {
        predictions.send(PredictionSample::new(t, idx)).await.unwrap();
    }

    let report = session.finish().await.unwrap();
    assert_eq!(report.outcome, PipelineOutcome::EndOfStream);
    assert_eq!(report.stats.received, 3);
    assert_eq!(report.stats.dispatched, 2);
    assert_eq!(report.stats.suppressed, 1);

    let first = gestures.get(0).unwrap().id as u8;
    let third = gestures.get(2).unwrap().id as u8;
    assert_eq!(probe.writes(), vec![vec![0x02, first], vec![0x02, third]]);
    assert!(!probe.is_connected());
}

#[tokio::test]
async fn unchanged_gesture_is_resent_after_timeout() {
    init_tracing();
    let (hand, probe) = smart_hand();
    let session = GestureLink::start_with_hand(hand, GestureSet::default(), &no_smoothing()).unwrap();

    let predictions = session.predictions();
    for (t, idx) in [(0.0, 1), (0.1, 1), (0.6, 1), (0.7, 1)] {
        predictions.send(PredictionSample::new(t, idx)).await.unwrap();
    }

    let report = session.finish().await.unwrap();
    assert_eq!(report.stats.dispatched, 2);
    assert_eq!(probe.writes(), vec![vec![0x02, 3], vec![0x02, 3]]);
}

#[tokio::test]
async fn majority_window_over_psyonic_frames() {
    init_tracing();
    let transport = VirtualTransport::new("psyonic").without_notifications();
    let probe = transport.probe();
    let hand = PsyonicHand::new(Box::new(transport), HandTiming::IMMEDIATE);
    let config = PipelineConfig {
        smoothing_window: 3,
        smoothing_method: SmoothingMethod::Mode,
        ..PipelineConfig::default()
    };
    let session = GestureLink::start_with_hand(hand, GestureSet::default(), &config).unwrap();

    let predictions = session.predictions();
    // Class 1 (open) with a one-frame blip of class 0 (close)
    for (i, idx) in [1, 1, 0, 1, 1].into_iter().enumerate() {
        predictions.send(PredictionSample::new(i as f64 * 0.01, idx)).await.unwrap();
    }
    session.finish().await.unwrap();

    let writes = probe.writes();
    // Init, then a single hand-open vector
    assert_eq!(writes.len(), 2);
    let frames = decode(&writes[1]);
    let response = SummationProtocol.parse_frame(&frames[0]).unwrap();
    assert_eq!(response.frame_type, CMD_FINGER_POS);
    assert_eq!(response.frame_data, vec![0, 0, 0, 0, 0]);

    // Bytes on the wire are stuffed and FLAG-bounded
    let logical = SummationProtocol.packet(CMD_FINGER_POS, &[0, 0, 0, 0, 0]).unwrap();
    assert_eq!(writes[1], encode(&logical[1..], Delimiting::Both));
}

#[tokio::test]
async fn zeus_gesture_is_five_crc_frames() {
    init_tracing();
    let transport = VirtualTransport::new("zeus");
    let probe = transport.probe();
    let hand = ZeusHand::new(Box::new(transport), HandTiming::IMMEDIATE);
    let session = GestureLink::start_with_hand(hand, GestureSet::default(), &no_smoothing()).unwrap();

    session.predictions().send(PredictionSample::new(0.0, 2)).await.unwrap();
    session.finish().await.unwrap();

    let parser = CrcFrameProtocol::with_byte_orders(ByteOrder::BigEndian, ByteOrder::BigEndian);
    let positions: Vec<u32> = probe
        .writes()
        .iter()
        .map(|w| {
            let frame = parser.parse_response(w).unwrap();
            u32::from_be_bytes([frame.frame_data[1], frame.frame_data[2], frame.frame_data[3], frame.frame_data[4]])
        })
        .collect();
    // Index extension: index open, the rest closed
    assert_eq!(positions, vec![1000, 0, 1000, 1000, 1000]);
}

#[tokio::test(start_paused = true)]
async fn classifier_feed_drives_pipeline_from_config() {
    init_tracing();
    let config = LinkConfig::from_yaml_str(
        r#"
hand:
  family: smart
  transport: virtual
  settle_ms: 0
pipeline:
  smoothing_window: 1
  debounce_ms: 500
classifier:
  rate: native
"#,
    )
    .unwrap();

    let session = GestureLink::start(&config).unwrap();
    let labels = tokio::spawn(session.pipeline().label_updates().collect::<Vec<_>>());

    // Paced like a live classifier so every dispatch is published on its own
    let source = futures::stream::iter([
        PredictionSample::new(0.0, 3),
        PredictionSample::new(0.1, 3),
        PredictionSample::new(0.2, 4),
    ])
    .then(|sample| async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        sample
    });
    let feed = session.feed(source, UpdateRate::Native, config.classifier.source_hz);
    assert_eq!(feed.join().await.unwrap(), 3);

    let (_predictions, handle) = session.into_parts();
    let mut state = handle.state_changes();
    let report = handle.join().await.unwrap();
    assert_eq!(report.outcome, PipelineOutcome::EndOfStream);
    assert_eq!(report.stats.dispatched, 2);
    assert_eq!(*state.borrow_and_update(), PipelineState::Stopped);

    let seen: Vec<u16> = labels.await.unwrap().into_iter().map(|label| label.id).collect();
    assert_eq!(seen, vec![14, 18]);
}

#[tokio::test(start_paused = true)]
async fn finish_completes_with_a_full_queue_and_a_live_sender() {
    init_tracing();
    let transport = VirtualTransport::new("smart");
    let probe = transport.probe();
    let timing = HandTiming { settle: Duration::from_millis(300), write_delay: Duration::ZERO };
    let hand = SmartHand::new(Box::new(transport), timing);
    let config = PipelineConfig { channel_capacity: 1, ..no_smoothing() };
    let session = GestureLink::start_with_hand(hand, GestureSet::default(), &config).unwrap();

    // Fills the queue while the hand is still settling
    let predictions = session.predictions();
    predictions.send(PredictionSample::new(0.0, 1)).await.unwrap();

    let report = tokio::time::timeout(Duration::from_secs(3), session.finish())
        .await
        .expect("finish returned")
        .unwrap();
    assert_eq!(report.outcome, PipelineOutcome::EndOfStream);
    assert_eq!(report.stats.dispatched, 1);
    assert_eq!(probe.writes(), vec![vec![0x02, 3]]);
    drop(predictions);
}

#[tokio::test]
async fn unreachable_hand_reports_connect_failure() {
    init_tracing();
    let (hand, probe) = smart_hand();
    probe.fail_next_connects(1);
    let session = GestureLink::start_with_hand(hand, GestureSet::default(), &no_smoothing()).unwrap();

    let report = session.finish().await.unwrap();
    assert_eq!(report.outcome, PipelineOutcome::ConnectFailed);
    let error = report.error.unwrap();
    assert!(error.is_retryable());
    assert!(!error.recovery_suggestions().is_empty());
}

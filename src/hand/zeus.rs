//! Zeus hand over BLE.
//!
//! Commands are CRC-32 framed. The hand reports back through notifications,
//! which are validated on the delivery task and queued for
//! [`HandInterface::read_responses`].

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use super::{Capability, HandInterface, HandTiming, validate_finger};
use crate::protocol::crc_frame::{FRAME_FINGER_POSITION, FRAME_TELEMETRY};
use crate::protocol::{CrcFrameProtocol, PacketProtocol, Response};
use crate::transport::{BleProfile, Transport};
use crate::types::{DeviceFamily, Finger, FingerPositions, GestureLabel};
use crate::Result;

pub const UART_PROFILE: BleProfile = BleProfile {
    service: 0x6E40_0001_C352_11E5_953D_0002_A5D5_C51B,
    notify: 0x6E40_0003_C352_11E5_953D_0002_A5D5_C51B,
    write: 0x6E40_0002_C352_11E5_953D_0002_A5D5_C51B,
};

pub const DEFAULT_DEVICE_NAME: &str = "A-235328";

/// Validated notifications held until read.
const RESPONSE_QUEUE: usize = 64;

pub struct ZeusHand {
    transport: Box<dyn Transport>,
    protocol: CrcFrameProtocol,
    timing: HandTiming,
    last_sent: FingerPositions,
    responses: mpsc::Receiver<Response>,
    notifications: bool,
}

impl ZeusHand {
    pub fn new(transport: Box<dyn Transport>, timing: HandTiming) -> Self {
        Self::with_protocol(transport, timing, CrcFrameProtocol::new())
    }

    pub fn with_protocol(mut transport: Box<dyn Transport>, timing: HandTiming, protocol: CrcFrameProtocol) -> Self {
        let (tx, responses) = mpsc::channel(RESPONSE_QUEUE);
        let notifications = match transport.set_notification_handler(notification_handler(protocol, tx)) {
            Ok(()) => true,
            Err(e) => {
                debug!(device = transport.name(), "Falling back to polled reads: {}", e);
                false
            }
        };
        Self { transport, protocol, timing, last_sent: FingerPositions::NEUTRAL, responses, notifications }
    }

    async fn send_frame(&mut self, frame_type: u8, data: &[u8]) -> Result<()> {
        let packet = self.protocol.build_command(frame_type, data)?;
        self.transport.write(&packet).await?;
        trace!(device = self.transport.name(), frame_type, ?data, "Sent frame");
        if !self.timing.write_delay.is_zero() {
            tokio::time::sleep(self.timing.write_delay).await;
        }
        Ok(())
    }

    async fn send_finger(&mut self, finger: Finger, position: u16) -> Result<()> {
        let mut data = [0u8; 5];
        data[0] = finger as u8;
        data[1..].copy_from_slice(&(position as u32).to_be_bytes());
        self.send_frame(FRAME_FINGER_POSITION, &data).await?;
        self.last_sent.set(finger, position);
        Ok(())
    }
}

/// Decode, validate and enqueue. Runs on the transport's delivery task.
fn notification_handler(
    protocol: CrcFrameProtocol,
    tx: mpsc::Sender<Response>,
) -> crate::transport::NotificationHandler {
    Arc::new(move |data: &[u8]| match protocol.parse_response(data) {
        Ok(response) => {
            if let Err(e) = tx.try_send(response) {
                warn!("Dropping notification: {}", e);
            }
        }
        Err(e) if e.is_wire_noise() => warn!(bytes = ?data, "Malformed notification: {}", e),
        Err(e) => warn!("Notification rejected: {}", e),
    })
}

#[async_trait::async_trait]
impl HandInterface for ZeusHand {
    fn family(&self) -> DeviceFamily {
        DeviceFamily::Zeus
    }

    fn name(&self) -> &str {
        self.transport.name()
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::Telemetry, Capability::RawData]
    }

    fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    async fn connect(&mut self) -> Result<()> {
        if self.transport.is_connected() {
            return Ok(());
        }
        info!(device = self.transport.name(), "Connecting Zeus hand");
        self.transport.connect().await?;
        tokio::time::sleep(self.timing.settle).await;
        info!(device = self.transport.name(), notifications = self.notifications, "Zeus hand ready");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.transport.disconnect().await
    }

    /// Five sequential single-finger writes, thumb first.
    async fn send_gesture(&mut self, label: &GestureLabel) -> Result<()> {
        let positions = label.finger_positions();
        for finger in Finger::ALL {
            self.send_finger(finger, positions.get(finger)).await?;
        }
        self.last_sent = positions;
        Ok(())
    }

    async fn send_finger_position(&mut self, finger: u8, position: u16) -> Result<()> {
        let finger = validate_finger(finger, position)?;
        self.send_finger(finger, position).await
    }

    fn last_positions(&self) -> FingerPositions {
        self.last_sent
    }

    async fn read_responses(&mut self) -> Result<Vec<Response>> {
        let mut responses = Vec::new();
        while let Ok(response) = self.responses.try_recv() {
            responses.push(response);
        }

        if !self.notifications
            && let Some(raw) = self.transport.read().await?
        {
            match self.protocol.parse_response(&raw) {
                Ok(response) => responses.push(response),
                Err(e) if e.is_wire_noise() => {
                    warn!(device = self.transport.name(), "Dropping malformed reply: {}", e)
                }
                Err(e) => return Err(e),
            }
        }
        Ok(responses)
    }

    async fn start_telemetry(&mut self) -> Result<()> {
        self.send_frame(FRAME_TELEMETRY, &[0x01]).await
    }

    async fn stop_telemetry(&mut self) -> Result<()> {
        self.send_frame(FRAME_TELEMETRY, &[0x00]).await
    }

    async fn send_data(&mut self, data: &[u8], frame_type: u8) -> Result<()> {
        self.send_frame(frame_type, data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::crc32;
    use crate::LinkError;
    use crate::protocol::ByteOrder;
    use crate::protocol::crc_frame::FRAME_RAW_DATA;
    use crate::transport::{VirtualProbe, VirtualTransport};

    fn hand() -> (ZeusHand, VirtualProbe) {
        let transport = VirtualTransport::new("zeus");
        let probe = transport.probe();
        (ZeusHand::new(Box::new(transport), HandTiming::IMMEDIATE), probe)
    }

    fn frame_of(write: &[u8]) -> Response {
        CrcFrameProtocol::with_byte_orders(ByteOrder::BigEndian, ByteOrder::BigEndian)
            .parse_response(write)
            .unwrap()
    }

    #[tokio::test]
    async fn gesture_is_five_finger_writes() {
        let (mut hand, probe) = hand();
        hand.connect().await.unwrap();
        hand.send_gesture(&GestureLabel::new(30, "Index_Extension")).await.unwrap();

        let frames: Vec<_> = probe.take_writes().iter().map(|w| frame_of(w)).collect();
        assert_eq!(frames.len(), 5);
        assert!(frames.iter().all(|f| f.frame_type == FRAME_FINGER_POSITION));
        assert_eq!(frames[0].frame_data, vec![0, 0, 0, 0x03, 0xE8]);
        assert_eq!(frames[1].frame_data, vec![1, 0, 0, 0, 0]);
        assert_eq!(hand.last_positions().as_array(), [1000, 0, 1000, 1000, 1000]);
    }

    #[tokio::test]
    async fn finger_packet_bytes() {
        let (mut hand, probe) = hand();
        hand.connect().await.unwrap();
        hand.send_finger_position(2, 500).await.unwrap();

        let write = probe.take_writes().remove(0);
        let crc = crc32(&[FRAME_FINGER_POSITION, 2, 0, 0, 0x01, 0xF4]);
        assert_eq!(&write[..3], &[0x01, 0xA5, 0x5A]);
        assert_eq!(&write[3..7], &crc.to_be_bytes());
        assert_eq!(&write[7..], &[FRAME_FINGER_POSITION, 2, 0, 0, 0x01, 0xF4]);
    }

    #[tokio::test]
    async fn telemetry_and_raw_data() {
        let (mut hand, probe) = hand();
        hand.connect().await.unwrap();
        hand.start_telemetry().await.unwrap();
        hand.stop_telemetry().await.unwrap();
        hand.send_data(b"hi", FRAME_RAW_DATA).await.unwrap();

        let frames: Vec<_> = probe.take_writes().iter().map(|w| frame_of(w)).collect();
        assert_eq!(frames[0], Response::new(FRAME_TELEMETRY, [0x01]));
        assert_eq!(frames[1], Response::new(FRAME_TELEMETRY, [0x00]));
        assert_eq!(frames[2], Response::new(FRAME_RAW_DATA, *b"hi"));
    }

    #[tokio::test]
    async fn notifications_are_validated_and_queued() {
        let (mut hand, probe) = hand();
        hand.connect().await.unwrap();

        let protocol = CrcFrameProtocol::new();
        let good = protocol.build_response(FRAME_TELEMETRY, &[7, 8]).unwrap();
        let mut bad = good.clone();
        bad[8] ^= 0x01;

        assert!(probe.notify(&good));
        assert!(probe.notify(&bad));
        assert!(probe.notify(&[0x01, 0xA5]));

        let responses = hand.read_responses().await.unwrap();
        assert_eq!(responses, vec![Response::new(FRAME_TELEMETRY, [7, 8])]);
        assert!(hand.read_responses().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn polled_transport_reads_directly() {
        let transport = VirtualTransport::new("zeus-polled").without_notifications();
        let probe = transport.probe();
        let mut hand = ZeusHand::new(Box::new(transport), HandTiming::IMMEDIATE);
        hand.connect().await.unwrap();

        probe.inject_read(CrcFrameProtocol::new().build_response(FRAME_TELEMETRY, &[1]).unwrap());
        assert_eq!(hand.read_responses().await.unwrap(), vec![Response::new(FRAME_TELEMETRY, [1])]);
    }

    #[tokio::test]
    async fn writes_require_connection() {
        let (mut hand, _probe) = hand();
        assert!(matches!(hand.send_finger_position(0, 0).await, Err(LinkError::NotConnected { .. })));
    }
}

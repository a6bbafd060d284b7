//! Psyonic hand over a serial link.
//!
//! Every command carries the full five-finger vector, scaled to the firmware's
//! `0..=100` range. Single-finger moves are merged into the last vector sent.

use tracing::{debug, info, warn};

use super::{Capability, HandInterface, HandTiming, validate_finger};
use crate::codec::FrameDecoder;
use crate::protocol::summation::{CMD_FINGER_POS, CMD_INIT};
use crate::protocol::{PacketProtocol, Response, SummationProtocol};
use crate::transport::Transport;
use crate::types::{DeviceFamily, FingerPositions, GestureLabel};
use crate::Result;

/// Firmware position range.
pub const WIRE_POSITION_MAX: u16 = 100;

pub struct PsyonicHand {
    transport: Box<dyn Transport>,
    protocol: SummationProtocol,
    decoder: FrameDecoder,
    timing: HandTiming,
    last_sent: FingerPositions,
}

impl PsyonicHand {
    pub fn new(transport: Box<dyn Transport>, timing: HandTiming) -> Self {
        Self {
            transport,
            protocol: SummationProtocol::new(),
            decoder: FrameDecoder::new(),
            timing,
            last_sent: FingerPositions::NEUTRAL,
        }
    }

    async fn send_command(&mut self, command: u8, payload: &[u8]) -> Result<()> {
        let packet = self.protocol.build_command(command, payload)?;
        self.transport.write(&packet).await?;
        debug!(device = self.transport.name(), command, ?payload, "Sent command");
        if !self.timing.write_delay.is_zero() {
            tokio::time::sleep(self.timing.write_delay).await;
        }
        Ok(())
    }

    async fn send_positions(&mut self, positions: FingerPositions) -> Result<()> {
        let payload = positions.rescaled(WIRE_POSITION_MAX).map(|p| p as u8);
        self.send_command(CMD_FINGER_POS, &payload).await?;
        self.last_sent = positions;
        Ok(())
    }
}

#[async_trait::async_trait]
impl HandInterface for PsyonicHand {
    fn family(&self) -> DeviceFamily {
        DeviceFamily::Psyonic
    }

    fn name(&self) -> &str {
        self.transport.name()
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[]
    }

    fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    async fn connect(&mut self) -> Result<()> {
        if self.transport.is_connected() {
            return Ok(());
        }
        info!(device = self.transport.name(), "Connecting Psyonic hand (TX→RX, RX→TX, GND→GND)");
        self.transport.connect().await?;

        if let Err(e) = self.send_command(CMD_INIT, &[]).await {
            warn!(device = self.transport.name(), "Init command failed: {}", e);
            let _ = self.transport.disconnect().await;
            return Err(e);
        }
        tokio::time::sleep(self.timing.settle).await;
        self.decoder.reset();
        info!(device = self.transport.name(), "Psyonic hand initialised");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.transport.disconnect().await
    }

    async fn send_gesture(&mut self, label: &GestureLabel) -> Result<()> {
        self.send_positions(label.finger_positions()).await
    }

    async fn send_finger_position(&mut self, finger: u8, position: u16) -> Result<()> {
        let finger = validate_finger(finger, position)?;
        let mut positions = self.last_sent;
        positions.set(finger, position);
        self.send_positions(positions).await
    }

    fn last_positions(&self) -> FingerPositions {
        self.last_sent
    }

    async fn read_responses(&mut self) -> Result<Vec<Response>> {
        let Some(bytes) = self.transport.read().await? else {
            return Ok(Vec::new());
        };
        let responses = self
            .decoder
            .push(&bytes)
            .iter()
            .filter_map(|frame| match self.protocol.parse_frame(frame) {
                Ok(response) => Some(response),
                Err(e) => {
                    warn!(device = self.transport.name(), "Dropping malformed frame: {}", e);
                    None
                }
            })
            .collect();
        Ok(responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode;
    use crate::transport::{VirtualProbe, VirtualTransport};
    use crate::LinkError;

    fn hand() -> (PsyonicHand, VirtualProbe) {
        let transport = VirtualTransport::new("psyonic").without_notifications();
        let probe = transport.probe();
        (PsyonicHand::new(Box::new(transport), HandTiming::IMMEDIATE), probe)
    }

    fn payload_of(write: &[u8]) -> Vec<u8> {
        let frame = decode(write).remove(0);
        SummationProtocol.parse_frame(&frame).unwrap().frame_data
    }

    #[tokio::test]
    async fn connect_sends_init() {
        let (mut hand, probe) = hand();
        hand.connect().await.unwrap();
        assert_eq!(probe.take_writes(), vec![vec![0x7E, 0x02, 0x01, 0xFD, 0x7E]]);

        hand.connect().await.unwrap();
        assert!(probe.writes().is_empty());
    }

    #[tokio::test]
    async fn failed_init_leaves_hand_disconnected() {
        let (mut hand, probe) = hand();
        probe.fail_next_writes(1);
        assert!(hand.connect().await.is_err());
        assert!(!hand.is_connected());
        assert!(!probe.is_connected());
    }

    #[tokio::test]
    async fn gesture_is_rescaled_to_firmware_range() {
        let (mut hand, probe) = hand();
        hand.connect().await.unwrap();
        probe.take_writes();

        hand.send_gesture(&GestureLabel::new(2, "Hand_Close")).await.unwrap();
        let writes = probe.take_writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(payload_of(&writes[0]), vec![50, 100, 100, 100, 100]);
    }

    #[tokio::test]
    async fn single_finger_merges_into_last_vector() {
        let (mut hand, probe) = hand();
        hand.connect().await.unwrap();
        probe.take_writes();

        hand.send_finger_position(1, 1000).await.unwrap();
        assert_eq!(payload_of(&probe.take_writes()[0]), vec![25, 100, 25, 25, 25]);

        hand.send_gesture(&GestureLabel::new(3, "Hand_Open")).await.unwrap();
        hand.send_finger_position(4, 730).await.unwrap();
        let writes = probe.take_writes();
        assert_eq!(payload_of(&writes[1]), vec![0, 0, 0, 0, 73]);
        assert_eq!(hand.last_positions().little, 730);
    }

    #[tokio::test]
    async fn invalid_arguments_are_not_sent() {
        let (mut hand, probe) = hand();
        hand.connect().await.unwrap();
        probe.take_writes();

        assert!(matches!(hand.send_finger_position(7, 0).await, Err(LinkError::InvalidArgument { .. })));
        assert!(matches!(hand.send_finger_position(0, 5000).await, Err(LinkError::InvalidArgument { .. })));
        assert!(probe.writes().is_empty());
    }

    #[tokio::test]
    async fn responses_survive_noise_and_split_reads() {
        let (mut hand, probe) = hand();
        hand.connect().await.unwrap();

        let wire = SummationProtocol.build_command(CMD_FINGER_POS, &[1, 2, 3, 4, 5]).unwrap();
        let mut corrupt = SummationProtocol.build_command(CMD_FINGER_POS, &[9]).unwrap();
        corrupt[3] ^= 0x40;

        let (head, tail) = wire.split_at(4);
        let mut first = vec![0x00, 0x11];
        first.extend_from_slice(&corrupt);
        first.extend_from_slice(head);
        probe.inject_read(first);
        probe.inject_read(tail.to_vec());

        assert!(hand.read_responses().await.unwrap().is_empty());
        let responses = hand.read_responses().await.unwrap();
        assert_eq!(responses, vec![Response::new(CMD_FINGER_POS, [1, 2, 3, 4, 5])]);
        assert!(hand.read_responses().await.unwrap().is_empty());
    }
}

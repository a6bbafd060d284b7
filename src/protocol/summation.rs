//! Summation-checksum packets (Psyonic).
//!
//! Logical packet, before stuffing:
//!
//! ```text
//! FLAG | length | command | payload ... | checksum
//!        length = payload.len() + 2
//!        checksum = -(length + command + payload) mod 256
//! ```
//!
//! Everything after the leading `FLAG` is byte-stuffed and followed by a closing
//! `FLAG`, so a [`FrameDecoder`](crate::codec::FrameDecoder) on the receive side
//! yields `length | command | payload | checksum` as one frame.

use tracing::trace;

use super::{PacketProtocol, Response, check_payload};
use crate::codec::{Delimiting, FLAG, decode, encode, negated_sum8};
use crate::{LinkError, Result};

pub const CMD_INIT: u8 = 0x01;
pub const CMD_FINGER_POS: u8 = 0x02;
pub const CMD_GESTURE: u8 = 0x03;

/// The length byte counts command and checksum, so the payload tops out at 253.
pub const MAX_PAYLOAD: usize = u8::MAX as usize - 2;

const NAME: &str = "summation";

// length + command + checksum
const MIN_FRAME: usize = 3;

#[derive(Debug, Clone, Copy, Default)]
pub struct SummationProtocol;

impl SummationProtocol {
    pub fn new() -> Self {
        Self
    }

    /// Unstuffed packet: `[FLAG, length, command, payload.., checksum]`.
    pub fn packet(&self, command: u8, payload: &[u8]) -> Result<Vec<u8>> {
        check_payload(NAME, payload, MAX_PAYLOAD)?;

        let mut packet = Vec::with_capacity(payload.len() + 4);
        packet.push(FLAG);
        packet.push((payload.len() + 2) as u8);
        packet.push(command);
        packet.extend_from_slice(payload);
        packet.push(negated_sum8(&packet[1..]));
        Ok(packet)
    }

    /// Validate one decoded frame body: `length | command | payload | checksum`.
    pub fn parse_frame(&self, frame: &[u8]) -> Result<Response> {
        if frame.len() < MIN_FRAME {
            return Err(LinkError::InvalidLength { protocol: NAME, min: MIN_FRAME, actual: frame.len() });
        }

        let declared = frame[0] as usize + 1;
        if declared != frame.len() {
            return Err(LinkError::InvalidLength { protocol: NAME, min: declared, actual: frame.len() });
        }

        let (body, checksum) = frame.split_at(frame.len() - 1);
        let computed = negated_sum8(body);
        if computed != checksum[0] {
            return Err(LinkError::checksum_mismatch(NAME, checksum[0] as u32, computed as u32));
        }

        Ok(Response::new(body[1], &body[2..]))
    }
}

impl PacketProtocol for SummationProtocol {
    fn name(&self) -> &'static str {
        NAME
    }

    fn max_payload(&self) -> usize {
        MAX_PAYLOAD
    }

    fn build_command(&self, command_type: u8, payload: &[u8]) -> Result<Vec<u8>> {
        let packet = self.packet(command_type, payload)?;
        let wire = encode(&packet[1..], Delimiting::Both);
        trace!(command = command_type, len = wire.len(), "Built summation packet");
        Ok(wire)
    }

    /// Parse the first complete frame in `raw` (stuffed wire bytes).
    fn parse_response(&self, raw: &[u8]) -> Result<Response> {
        let frame = decode(raw).into_iter().next().ok_or_else(|| LinkError::InvalidHeader {
            protocol: NAME,
            found: raw.iter().take(8).copied().collect(),
        })?;
        self.parse_frame(&frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{ESCAPE, FrameDecoder};
    use proptest::prelude::*;

    #[test]
    fn init_packet_layout() {
        let packet = SummationProtocol.packet(CMD_INIT, &[]).unwrap();
        assert_eq!(packet, vec![FLAG, 0x02, 0x01, 0xFD]);

        let wire = SummationProtocol.build_command(CMD_INIT, &[]).unwrap();
        assert_eq!(wire, vec![FLAG, 0x02, 0x01, 0xFD, FLAG]);
    }

    #[test]
    fn finger_packet_round_trips() {
        let positions = [50, 100, 100, 100, 100];
        let wire = SummationProtocol.build_command(CMD_FINGER_POS, &positions).unwrap();
        let response = SummationProtocol.parse_response(&wire).unwrap();
        assert_eq!(response, Response::new(CMD_FINGER_POS, positions));
    }

    #[test]
    fn reserved_bytes_in_payload_are_stuffed() {
        let wire = SummationProtocol.build_command(CMD_GESTURE, &[FLAG, ESCAPE]).unwrap();
        let interior = &wire[1..wire.len() - 1];
        assert!(!interior.contains(&FLAG));
        assert_eq!(SummationProtocol.parse_response(&wire).unwrap().frame_data, vec![FLAG, ESCAPE]);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let payload = vec![0u8; MAX_PAYLOAD + 1];
        let err = SummationProtocol.build_command(CMD_FINGER_POS, &payload).unwrap_err();
        assert!(matches!(err, LinkError::PayloadTooLarge { len: 254, max: 253, .. }));
        assert!(SummationProtocol.build_command(CMD_FINGER_POS, &payload[1..]).is_ok());
    }

    #[test]
    fn corrupted_frames_are_rejected() {
        let mut frame = SummationProtocol.packet(CMD_FINGER_POS, &[1, 2, 3, 4, 5]).unwrap()[1..].to_vec();
        frame[3] ^= 0x01;
        assert!(matches!(
            SummationProtocol.parse_frame(&frame),
            Err(LinkError::ChecksumMismatch { .. })
        ));

        assert!(matches!(
            SummationProtocol.parse_frame(&[0x09, CMD_INIT, 0xF6]),
            Err(LinkError::InvalidLength { min: 10, actual: 3, .. })
        ));
        assert!(matches!(SummationProtocol.parse_frame(&[0x02]), Err(LinkError::InvalidLength { .. })));
        assert!(matches!(
            SummationProtocol.parse_response(&[0x00, 0x01]),
            Err(LinkError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn decoder_recovers_packets_from_a_noisy_stream() {
        let mut stream = vec![0x13, 0x37];
        stream.extend(SummationProtocol.build_command(CMD_GESTURE, &[3]).unwrap());
        stream.extend(SummationProtocol.build_command(CMD_FINGER_POS, &[0, 0, 0, 0, 0]).unwrap());

        let mut decoder = FrameDecoder::new();
        let responses: Vec<_> = decoder
            .push(&stream)
            .iter()
            .map(|frame| SummationProtocol.parse_frame(frame).unwrap())
            .collect();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0], Response::new(CMD_GESTURE, [3]));
        assert_eq!(responses[1].frame_type, CMD_FINGER_POS);
    }

    proptest! {
        #[test]
        fn prop_checksum_cancels_the_sum(
            command in any::<u8>(),
            payload in prop::collection::vec(any::<u8>(), 0..=MAX_PAYLOAD)
        ) {
            let packet = SummationProtocol.packet(command, &payload).unwrap();
            let (checksum, rest) = packet.split_last().unwrap();
            let sum = rest[1..].iter().fold(*checksum as u32, |acc, &b| acc + b as u32);
            prop_assert_eq!(sum % 256, 0);
        }

        #[test]
        fn prop_build_then_parse(
            command in any::<u8>(),
            payload in prop::collection::vec(any::<u8>(), 0..64)
        ) {
            let wire = SummationProtocol.build_command(command, &payload).unwrap();
            prop_assert_eq!(SummationProtocol.parse_response(&wire).unwrap(), Response::new(command, payload));
        }
    }
}

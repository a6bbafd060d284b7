//! CRC-32 framed packets (Zeus).
//!
//! ```text
//! 0x01 | 0xA5 0x5A | crc32 (4 bytes) | frame_type | frame_data ...
//! addr   magic       over frame_type + frame_data
//! ```
//!
//! The firmware writes the CRC of outbound packets big-endian but reports the
//! CRC of its own notifications little-endian. Both orders are configurable.

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{PacketProtocol, Response, check_payload};
use crate::codec::{Crc32, crc32};
use crate::{LinkError, Result};

/// Serial-port-profile address byte.
pub const ADDRESS: u8 = 0x01;

/// Frame header signature.
pub const MAGIC: [u8; 2] = [0xA5, 0x5A];

/// Raw data for the application firmware.
pub const FRAME_RAW_DATA: u8 = 0x00;
/// Telemetry on/off switch.
pub const FRAME_TELEMETRY: u8 = 0x01;
/// Single finger target: `[finger, position u32 BE]`.
pub const FRAME_FINGER_POSITION: u8 = 0x05;

/// Largest packet the peripheral accepts in one write.
pub const MAX_PACKET: usize = 244;

// address + magic + crc
const HEADER_LEN: usize = 7;
const MIN_PACKET: usize = HEADER_LEN + 1;

/// Largest `frame_data` that fits in [`MAX_PACKET`].
pub const MAX_PAYLOAD: usize = MAX_PACKET - MIN_PACKET;

const NAME: &str = "crc-frame";

/// Byte order of the CRC field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    BigEndian,
    LittleEndian,
}

impl ByteOrder {
    fn write(self, value: u32) -> [u8; 4] {
        match self {
            ByteOrder::BigEndian => value.to_be_bytes(),
            ByteOrder::LittleEndian => value.to_le_bytes(),
        }
    }

    fn read(self, bytes: [u8; 4]) -> u32 {
        match self {
            ByteOrder::BigEndian => u32::from_be_bytes(bytes),
            ByteOrder::LittleEndian => u32::from_le_bytes(bytes),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrcFrameProtocol {
    command_order: ByteOrder,
    response_order: ByteOrder,
}

impl Default for CrcFrameProtocol {
    fn default() -> Self {
        Self { command_order: ByteOrder::BigEndian, response_order: ByteOrder::LittleEndian }
    }
}

impl CrcFrameProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_byte_orders(command_order: ByteOrder, response_order: ByteOrder) -> Self {
        Self { command_order, response_order }
    }

    /// Build a packet as the device would send it, using the response byte order.
    pub fn build_response(&self, frame_type: u8, frame_data: &[u8]) -> Result<Vec<u8>> {
        assemble(self.response_order, frame_type, frame_data)
    }
}

fn assemble(order: ByteOrder, frame_type: u8, frame_data: &[u8]) -> Result<Vec<u8>> {
    check_payload(NAME, frame_data, MAX_PAYLOAD)?;

    let mut crc = Crc32::new();
    crc.update(&[frame_type]);
    crc.update(frame_data);

    let mut packet = Vec::with_capacity(MIN_PACKET + frame_data.len());
    packet.push(ADDRESS);
    packet.extend_from_slice(&MAGIC);
    packet.extend_from_slice(&order.write(crc.finalize()));
    packet.push(frame_type);
    packet.extend_from_slice(frame_data);
    Ok(packet)
}

impl PacketProtocol for CrcFrameProtocol {
    fn name(&self) -> &'static str {
        NAME
    }

    fn max_payload(&self) -> usize {
        MAX_PAYLOAD
    }

    fn build_command(&self, command_type: u8, payload: &[u8]) -> Result<Vec<u8>> {
        let packet = assemble(self.command_order, command_type, payload)?;
        trace!(frame_type = command_type, len = packet.len(), "Built CRC frame");
        Ok(packet)
    }

    fn parse_response(&self, raw: &[u8]) -> Result<Response> {
        if raw.len() < MIN_PACKET {
            return Err(LinkError::InvalidLength { protocol: NAME, min: MIN_PACKET, actual: raw.len() });
        }
        if raw[0] != ADDRESS || raw[1..3] != MAGIC {
            return Err(LinkError::InvalidHeader { protocol: NAME, found: raw[..3].to_vec() });
        }

        let received = self.response_order.read([raw[3], raw[4], raw[5], raw[6]]);
        let computed = crc32(&raw[HEADER_LEN..]);
        if received != computed {
            return Err(LinkError::checksum_mismatch(NAME, received, computed));
        }

        Ok(Response::new(raw[HEADER_LEN], &raw[MIN_PACKET..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn finger_command_layout() {
        let data = [1, 0, 0, 0x03, 0xE8];
        let packet = CrcFrameProtocol::new().build_command(FRAME_FINGER_POSITION, &data).unwrap();

        let crc = crc32(&[FRAME_FINGER_POSITION, 1, 0, 0, 0x03, 0xE8]);
        let mut expected = vec![0x01, 0xA5, 0x5A];
        expected.extend_from_slice(&crc.to_be_bytes());
        expected.push(FRAME_FINGER_POSITION);
        expected.extend_from_slice(&data);
        assert_eq!(packet, expected);
    }

    #[test]
    fn parses_little_endian_notifications() {
        let protocol = CrcFrameProtocol::new();
        let packet = protocol.build_response(FRAME_TELEMETRY, &[0x10, 0x20]).unwrap();
        assert_eq!(&packet[3..7], &crc32(&[FRAME_TELEMETRY, 0x10, 0x20]).to_le_bytes());
        assert_eq!(protocol.parse_response(&packet).unwrap(), Response::new(FRAME_TELEMETRY, [0x10, 0x20]));
    }

    #[test]
    fn own_commands_fail_with_mismatched_byte_order() {
        let protocol = CrcFrameProtocol::new();
        let packet = protocol.build_command(FRAME_RAW_DATA, b"hello").unwrap();
        assert!(matches!(protocol.parse_response(&packet), Err(LinkError::ChecksumMismatch { .. })));

        let symmetric = CrcFrameProtocol::with_byte_orders(ByteOrder::BigEndian, ByteOrder::BigEndian);
        assert!(symmetric.parse_response(&packet).is_ok());
    }

    #[test]
    fn header_and_length_validation() {
        let protocol = CrcFrameProtocol::new();
        assert!(matches!(
            protocol.parse_response(&[0x01, 0xA5, 0x5A, 0, 0, 0, 0]),
            Err(LinkError::InvalidLength { min: 8, actual: 7, .. })
        ));

        let mut packet = protocol.build_response(FRAME_TELEMETRY, &[1]).unwrap();
        packet[1] = 0x5A;
        match protocol.parse_response(&packet) {
            Err(LinkError::InvalidHeader { found, .. }) => assert_eq!(found, vec![0x01, 0x5A, 0x5A]),
            other => panic!("expected invalid header, got {other:?}"),
        }
    }

    #[test]
    fn payload_limit() {
        let protocol = CrcFrameProtocol::new();
        assert_eq!(protocol.build_command(0, &[0; MAX_PAYLOAD]).unwrap().len(), MAX_PACKET);
        assert!(matches!(
            protocol.build_command(0, &[0; MAX_PAYLOAD + 1]),
            Err(LinkError::PayloadTooLarge { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_single_bit_flip_is_detected(
            frame_type in any::<u8>(),
            data in prop::collection::vec(any::<u8>(), 0..64),
            flip in any::<prop::sample::Index>(),
            bit in 0u8..8
        ) {
            let protocol = CrcFrameProtocol::new();
            let mut packet = protocol.build_response(frame_type, &data).unwrap();
            let covered = packet.len() - HEADER_LEN;
            packet[HEADER_LEN + flip.index(covered)] ^= 1 << bit;

            let is_mismatch = matches!(protocol.parse_response(&packet), Err(LinkError::ChecksumMismatch { .. }));
            prop_assert!(is_mismatch);
        }

        #[test]
        fn prop_response_round_trip(frame_type in any::<u8>(), data in prop::collection::vec(any::<u8>(), 0..=MAX_PAYLOAD)) {
            let protocol = CrcFrameProtocol::new();
            let packet = protocol.build_response(frame_type, &data).unwrap();
            prop_assert_eq!(protocol.parse_response(&packet).unwrap(), Response::new(frame_type, data));
        }
    }
}

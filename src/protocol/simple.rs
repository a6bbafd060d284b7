//! Raw opcode commands (Smart hand).
//!
//! Commands are at most four bytes, `opcode, operand...`, with no checksum:
//!
//! - finger: `0x01, finger, position (u16 BE)`
//! - gesture: `0x02, label_id`

use super::{PacketProtocol, Response, check_payload};
use crate::types::Finger;
use crate::{LinkError, Result};

pub const OP_FINGER: u8 = 0x01;
pub const OP_GESTURE: u8 = 0x02;

/// Opcode plus at most three operand bytes.
pub const MAX_COMMAND: usize = 4;
pub const MAX_PAYLOAD: usize = MAX_COMMAND - 1;

const NAME: &str = "simple";

#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleProtocol;

impl SimpleProtocol {
    pub fn new() -> Self {
        Self
    }

    pub fn finger_command(&self, finger: Finger, position: u16) -> Result<Vec<u8>> {
        let [hi, lo] = position.to_be_bytes();
        self.build_command(OP_FINGER, &[finger as u8, hi, lo])
    }

    /// The firmware looks gestures up by label id, which must fit in one byte.
    pub fn gesture_command(&self, label_id: u16) -> Result<Vec<u8>> {
        let id = u8::try_from(label_id).map_err(|_| {
            LinkError::invalid_argument("gesture label id", format!("{label_id} does not fit in one byte"))
        })?;
        self.build_command(OP_GESTURE, &[id])
    }
}

impl PacketProtocol for SimpleProtocol {
    fn name(&self) -> &'static str {
        NAME
    }

    fn max_payload(&self) -> usize {
        MAX_PAYLOAD
    }

    fn build_command(&self, command_type: u8, payload: &[u8]) -> Result<Vec<u8>> {
        check_payload(NAME, payload, MAX_PAYLOAD)?;
        let mut command = Vec::with_capacity(payload.len() + 1);
        command.push(command_type);
        command.extend_from_slice(payload);
        Ok(command)
    }

    /// Replies carry no checksum; the first byte is taken as the type.
    fn parse_response(&self, raw: &[u8]) -> Result<Response> {
        match raw.split_first() {
            Some((&frame_type, data)) => Ok(Response::new(frame_type, data)),
            None => Err(LinkError::InvalidLength { protocol: NAME, min: 1, actual: 0 }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_layouts() {
        let protocol = SimpleProtocol::new();
        assert_eq!(protocol.finger_command(Finger::Ring, 1000).unwrap(), vec![0x01, 0x03, 0x03, 0xE8]);
        assert_eq!(protocol.gesture_command(30).unwrap(), vec![0x02, 30]);
    }

    #[test]
    fn oversized_inputs_are_rejected() {
        let protocol = SimpleProtocol::new();
        assert!(matches!(protocol.gesture_command(256), Err(LinkError::InvalidArgument { .. })));
        assert!(matches!(
            protocol.build_command(OP_FINGER, &[0, 0, 0, 0]),
            Err(LinkError::PayloadTooLarge { len: 4, max: 3, .. })
        ));
    }

    #[test]
    fn responses_split_type_and_data() {
        let protocol = SimpleProtocol::new();
        assert_eq!(protocol.parse_response(b"ok").unwrap(), Response::new(b'o', *b"k"));
        assert!(protocol.parse_response(&[]).is_err());
    }
}

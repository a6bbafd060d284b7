//! Command/response packet formats.
//!
//! Each hand family speaks one packet layout. All of them implement
//! [`PacketProtocol`], so the device layer builds and validates packets the same
//! way regardless of checksum scheme:
//!
//! | Protocol                  | Family  | Integrity          | Framing                 |
//! |---------------------------|---------|--------------------|-------------------------|
//! | [`SummationProtocol`]     | Psyonic | negated 8-bit sum  | stuffed, `FLAG`-bounded |
//! | [`CrcFrameProtocol`]      | Zeus    | CRC-32             | one BLE write per packet |
//! | [`SimpleProtocol`]        | Smart   | none               | one write per command   |
//!
//! Building validates the payload against the device's maximum packet size and
//! fails rather than truncating. Parsing either returns a complete [`Response`]
//! or an error; partially validated data never escapes.

pub mod crc_frame;
pub mod simple;
pub mod summation;

pub use crc_frame::{ByteOrder, CrcFrameProtocol};
pub use simple::SimpleProtocol;
pub use summation::SummationProtocol;

use crate::Result;

/// A validated packet received from a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Command or frame type byte
    pub frame_type: u8,
    /// Payload following the type byte, checksum removed
    pub frame_data: Vec<u8>,
}

impl Response {
    pub fn new(frame_type: u8, frame_data: impl Into<Vec<u8>>) -> Self {
        Self { frame_type, frame_data: frame_data.into() }
    }
}

/// A device packet layout.
pub trait PacketProtocol: Send + Sync {
    /// Short name used in errors and logs.
    fn name(&self) -> &'static str;

    /// Largest payload [`PacketProtocol::build_command`] accepts.
    fn max_payload(&self) -> usize;

    /// Assemble the bytes written to the transport for one command.
    ///
    /// Fails with [`crate::LinkError::PayloadTooLarge`] when `payload` exceeds
    /// [`PacketProtocol::max_payload`].
    fn build_command(&self, command_type: u8, payload: &[u8]) -> Result<Vec<u8>>;

    /// Validate and unpack bytes received from the transport.
    fn parse_response(&self, raw: &[u8]) -> Result<Response>;
}

pub(crate) fn check_payload(protocol: &'static str, payload: &[u8], max: usize) -> Result<()> {
    if payload.len() > max {
        return Err(crate::LinkError::PayloadTooLarge { protocol, len: payload.len(), max });
    }
    Ok(())
}

//! Byte-level codecs shared by the device protocols.
//!
//! - [`frame`]: escape-based byte stuffing and the incremental frame decoder
//! - [`checksum`]: the summation and CRC-32 digests used by packet validation

pub mod checksum;
pub mod frame;

pub use checksum::{Crc32, crc32, negated_sum8};
pub use frame::{
    DEFAULT_FRAME_CAPACITY, DecoderState, DecoderStats, Delimiting, ESCAPE, ESCAPE_MASK, FLAG,
    FrameDecoder, decode, encode,
};

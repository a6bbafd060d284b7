//! Escape-based frame stuffing and incremental frame recovery.
//!
//! Frames are delimited by [`FLAG`]. Any `FLAG` or [`ESCAPE`] byte inside the
//! frame body is sent as `[ESCAPE, byte ^ ESCAPE_MASK]`, so a decoded frame can
//! carry arbitrary bytes.
//!
//! ```text
//! data:    01 7E 02 7D
//! encoded: 7E 01 7D 5E 02 7D 5D 7E
//!          ^^    ^^^^^    ^^^^^ ^^
//!          open  escaped  escaped close
//! ```
//!
//! [`FrameDecoder`] consumes bytes one at a time and keeps its state between
//! calls, so it can sit directly behind a serial read that returns partial frames.

use tracing::{debug, trace, warn};

use crate::{LinkError, Result};

/// Frame delimiter.
pub const FLAG: u8 = 0x7E;

/// Marks the following byte as masked.
pub const ESCAPE: u8 = 0x7D;

/// XOR mask applied to escaped bytes.
pub const ESCAPE_MASK: u8 = 0x20;

/// Default decoder buffer capacity in bytes.
pub const DEFAULT_FRAME_CAPACITY: usize = 512;

/// Where delimiters are placed around an encoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delimiting {
    /// `FLAG body FLAG`
    #[default]
    Both,
    /// `FLAG body`; the next frame's opening delimiter closes this one.
    LeadingOnly,
}

/// Stuff `data` and wrap it in delimiters.
pub fn encode(data: &[u8], delimiting: Delimiting) -> Vec<u8> {
    // Worst case every byte is escaped
    let mut out = Vec::with_capacity(data.len() * 2 + 2);
    out.push(FLAG);
    for &byte in data {
        if byte == FLAG || byte == ESCAPE {
            out.push(ESCAPE);
            out.push(byte ^ ESCAPE_MASK);
        } else {
            out.push(byte);
        }
    }
    if delimiting == Delimiting::Both {
        out.push(FLAG);
    }
    out
}

/// Decode every complete frame in `bytes`.
///
/// Convenience wrapper for callers that hold a whole buffer; bytes of a trailing
/// incomplete frame are discarded.
pub fn decode(bytes: &[u8]) -> Vec<Vec<u8>> {
    let mut decoder = FrameDecoder::new();
    decoder.push(bytes)
}

/// Decoder state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Waiting for an opening delimiter; everything else is dropped.
    AwaitingFrame,
    /// Collecting frame bytes.
    InFrame,
    /// A frame was just emitted. Behaves like `AwaitingFrame` for the next byte.
    EndFrame,
}

/// Running counters kept by a [`FrameDecoder`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Complete frames emitted
    pub frames: u64,
    /// Bytes dropped while no frame was open
    pub dropped_bytes: u64,
    /// Frames discarded because they exceeded the buffer capacity
    pub overflows: u64,
    /// Frames discarded because a delimiter followed a dangling escape
    pub aborted: u64,
}

/// Byte-at-a-time frame decoder.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    state: DecoderState,
    buffer: Vec<u8>,
    capacity: usize,
    unmask_next: bool,
    delimiting: Delimiting,
    stats: DecoderStats,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a decoder for `FLAG body FLAG` frames with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_FRAME_CAPACITY)
    }

    /// Create a decoder whose frames may hold at most `capacity` decoded bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: DecoderState::AwaitingFrame,
            buffer: Vec::with_capacity(capacity.min(DEFAULT_FRAME_CAPACITY)),
            capacity,
            unmask_next: false,
            delimiting: Delimiting::Both,
            stats: DecoderStats::default(),
        }
    }

    /// Set the delimiter layout of the incoming stream.
    pub fn with_delimiting(mut self, delimiting: Delimiting) -> Self {
        self.delimiting = delimiting;
        self
    }

    /// Current state.
    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Counters since creation.
    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Number of decoded bytes buffered for the open frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Discard any partial frame and wait for the next delimiter.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.unmask_next = false;
        self.state = DecoderState::AwaitingFrame;
    }

    /// Feed one byte.
    ///
    /// Returns `Ok(Some(frame))` when `byte` closes a non-empty frame, and
    /// [`LinkError::BufferOverflow`] when the open frame exceeds the capacity; the
    /// partial frame is discarded and the decoder waits for the next delimiter.
    pub fn feed(&mut self, byte: u8) -> Result<Option<Vec<u8>>> {
        if byte == FLAG {
            return Ok(self.on_delimiter());
        }

        if self.state != DecoderState::InFrame {
            self.stats.dropped_bytes += 1;
            trace!(byte, "Dropping byte outside frame");
            return Ok(None);
        }

        if byte == ESCAPE {
            self.unmask_next = true;
            return Ok(None);
        }

        let byte = if self.unmask_next {
            self.unmask_next = false;
            byte ^ ESCAPE_MASK
        } else {
            byte
        };

        if self.buffer.len() >= self.capacity {
            self.stats.overflows += 1;
            self.reset();
            return Err(LinkError::BufferOverflow { capacity: self.capacity });
        }

        self.buffer.push(byte);
        Ok(None)
    }

    /// Feed a chunk of bytes and collect every completed frame.
    ///
    /// Overflows are logged and the decoder resynchronises on the next delimiter.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        for &byte in bytes {
            match self.feed(byte) {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => {}
                Err(e) => warn!("{}", e),
            }
        }
        frames
    }

    /// Flush the open frame of a [`Delimiting::LeadingOnly`] stream.
    ///
    /// Such streams only close a frame when the next one opens; call this when
    /// the stream is known to be idle. Returns `None` for `Both` streams, whose
    /// frames are only complete once the closing delimiter arrives.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        if self.delimiting != Delimiting::LeadingOnly
            || self.state != DecoderState::InFrame
            || self.unmask_next
            || self.buffer.is_empty()
        {
            return None;
        }
        self.stats.frames += 1;
        self.state = DecoderState::EndFrame;
        Some(std::mem::take(&mut self.buffer))
    }

    fn on_delimiter(&mut self) -> Option<Vec<u8>> {
        if self.unmask_next {
            // ESCAPE immediately before a delimiter cannot be unmasked
            self.stats.aborted += 1;
            warn!(discarded = self.buffer.len(), "Dangling escape before delimiter, frame dropped");
            self.buffer.clear();
            self.unmask_next = false;
            self.state = DecoderState::InFrame;
            return None;
        }

        if self.buffer.is_empty() {
            self.state = DecoderState::InFrame;
            return None;
        }

        self.stats.frames += 1;
        self.state = match self.delimiting {
            Delimiting::Both => DecoderState::EndFrame,
            Delimiting::LeadingOnly => DecoderState::InFrame,
        };
        let frame = std::mem::take(&mut self.buffer);
        debug!(len = frame.len(), "Frame decoded");
        Some(frame)
    }
}

use thiserror::Error;

/// Terminates every frame on the wire.
///
/// There is no length prefix: the debuggee emits variable-length,
/// often unknown-ahead-of-time payloads (script output, formatted
/// prints) from contexts where buffering a length up front is awkward,
/// so frames end at a rare 4-byte tail instead. The sequence never
/// appears inside a payload; control records are fixed layouts that
/// cannot produce it and senders are responsible for the rest.
pub const SENTINEL: [u8; 4] = [0x00, 0x80, 0xEE, 0xFF];

/// Hard cap on a single frame, shared with the peer. A stream that
/// exceeds it without a sentinel is desynchronized and the session has
/// to come down.
pub const MAX_FRAME: usize = 8 * 1024;

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame exceeded {MAX_FRAME} bytes before the end-of-buffer sentinel")]
    Oversized,
}

/// Incremental frame reassembler.
///
/// Feed it one byte at a time, in whatever chunking the transport
/// produces. After yielding a payload the decoder is ready for the
/// next frame, which makes the stream self-synchronizing: garbage
/// between frames is consumed until the next sentinel.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self { buf: Vec::with_capacity(256) }
    }

    /// Appends one byte. Returns the completed payload, sentinel
    /// stripped, once the last four buffered bytes match [`SENTINEL`].
    /// Fewer than four buffered bytes never match.
    pub fn push(&mut self, byte: u8) -> Result<Option<Vec<u8>>, FrameError> {
        if self.buf.len() == MAX_FRAME {
            self.buf.clear();
            return Err(FrameError::Oversized);
        }
        self.buf.push(byte);

        let len = self.buf.len();
        if len < SENTINEL.len() || self.buf[len - SENTINEL.len()..] != SENTINEL {
            return Ok(None);
        }

        self.buf.truncate(len - SENTINEL.len());
        Ok(Some(std::mem::take(&mut self.buf)))
    }
}

/// `payload || SENTINEL` as one allocation.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + SENTINEL.len());
    out.extend_from_slice(payload);
    out.extend_from_slice(&SENTINEL);
    out
}

/// Appends the sentinel to a frame staged in `buf`.
pub fn terminate(buf: &mut Vec<u8>) {
    buf.extend_from_slice(&SENTINEL);
}

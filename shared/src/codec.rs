//! Marker-delimited frame splitter for decoder output
//!
//! The external decoder writes a continuous stream of JPEG images:
//! ```text
//! [ junk ][ FF D8 ... image ... FF D9 ][ FF D8 ... image ... FF D9 ][ partial ...
//! ```
//!
//! Frames are cut on the two sentinels only; the image data in between is
//! never inspected.

use bytes::{Bytes, BytesMut};
use tracing::warn;

use crate::protocol::MAX_FRAME_BUFFER;

/// Start-of-image marker
pub const FRAME_START: [u8; 2] = [0xFF, 0xD8];

/// End-of-image marker
pub const FRAME_END: [u8; 2] = [0xFF, 0xD9];

/// Find `marker` in `buf` at or after `from`
fn find_marker(buf: &[u8], from: usize, marker: &[u8]) -> Option<usize> {
    if from >= buf.len() {
        return None;
    }
    buf[from..]
        .windows(marker.len())
        .position(|window| window == marker)
        .map(|pos| pos + from)
}

/// Streaming splitter with bounded memory
///
/// Scan offsets are kept between pushes so single-byte chunks do not rescan
/// the whole buffer; the results are the same as scanning from offset 0.
#[derive(Debug)]
pub struct FrameSplitter {
    /// Unconsumed decoder output
    buffer: BytesMut,
    /// Hard ceiling for `buffer`
    max_buffer: usize,
    /// No start marker begins before this offset
    start_scan: usize,
    /// Offset of the pending frame's start marker
    frame_start: Option<usize>,
    /// No end marker begins between the start marker and this offset
    end_scan: usize,
    /// Number of times the buffer was discarded on overflow
    overflows: u64,
}

impl Default for FrameSplitter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSplitter {
    /// Create a splitter with the default 5 MiB ceiling
    pub fn new() -> Self {
        Self::with_max_buffer(MAX_FRAME_BUFFER)
    }

    /// Create a splitter with a custom ceiling
    pub fn with_max_buffer(max_buffer: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            max_buffer,
            start_scan: 0,
            frame_start: None,
            end_scan: 0,
            overflows: 0,
        }
    }

    /// Append a chunk and extract every complete frame
    ///
    /// Bytes in front of a start marker are consumed with the frame; the
    /// tail after the last end marker stays buffered for the next push.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame() {
            frames.push(frame);
        }

        if self.buffer.len() > self.max_buffer {
            warn!(
                "[VIDEO] Frame buffer exceeded {} bytes without a frame boundary, discarding {} bytes",
                self.max_buffer,
                self.buffer.len()
            );
            self.overflows += 1;
            self.clear();
        }

        frames
    }

    /// Try to cut the next frame out of the buffer
    ///
    /// Call this repeatedly until it returns `None` to drain all complete frames
    pub fn next_frame(&mut self) -> Option<Bytes> {
        let start = match self.frame_start {
            Some(start) => start,
            None => match find_marker(&self.buffer, self.start_scan, &FRAME_START) {
                Some(start) => {
                    self.frame_start = Some(start);
                    self.end_scan = start + FRAME_START.len();
                    start
                }
                None => {
                    // A marker may straddle the next chunk boundary
                    self.start_scan = self.buffer.len().saturating_sub(FRAME_START.len() - 1);
                    return None;
                }
            },
        };

        match find_marker(&self.buffer, self.end_scan, &FRAME_END) {
            Some(end) => {
                let mut consumed = self.buffer.split_to(end + FRAME_END.len());
                let frame = consumed.split_off(start).freeze();
                self.rewind();
                Some(frame)
            }
            None => {
                self.end_scan = self
                    .buffer
                    .len()
                    .saturating_sub(FRAME_END.len() - 1)
                    .max(start + FRAME_START.len());
                None
            }
        }
    }

    /// Drop all buffered bytes
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.rewind();
    }

    /// Current buffer length
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// True while a start marker is buffered without its end marker
    pub fn has_partial_frame(&self) -> bool {
        self.frame_start.is_some()
    }

    /// How many times the buffer was discarded on overflow
    pub fn overflows(&self) -> u64 {
        self.overflows
    }

    fn rewind(&mut self) {
        self.start_scan = 0;
        self.frame_start = None;
        self.end_scan = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut out = FRAME_START.to_vec();
        out.extend_from_slice(payload);
        out.extend_from_slice(&FRAME_END);
        out
    }

    #[test]
    fn test_single_frame_with_junk_and_tail() {
        let mut input = vec![0x00, 0x13, 0x37];
        input.extend(frame(b"payload"));
        input.extend_from_slice(b"tail");

        let mut splitter = FrameSplitter::new();
        let frames = splitter.push(&input);

        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &frame(b"payload")[..]);
        assert_eq!(splitter.buffer_len(), 4, "tail should stay buffered");
    }

    #[test]
    fn test_chunk_boundary_independence() {
        let mut input = vec![0xAA, 0xFF, 0x00];
        input.extend(frame(&[1, 2, 0xFF, 3, 0xD9 - 1, 4]));
        input.extend_from_slice(&[0xFF, 0xD8, 9, 9]);

        let expected = frame(&[1, 2, 0xFF, 3, 0xD9 - 1, 4]);

        for split_at in 0..=input.len() {
            let mut splitter = FrameSplitter::new();
            let mut frames = splitter.push(&input[..split_at]);
            frames.extend(splitter.push(&input[split_at..]));

            assert_eq!(frames.len(), 1, "split at {}", split_at);
            assert_eq!(&frames[0][..], &expected[..], "split at {}", split_at);
            assert_eq!(splitter.buffer_len(), 4, "split at {}", split_at);
            assert!(splitter.has_partial_frame(), "split at {}", split_at);
        }
    }

    #[test]
    fn test_single_byte_feed_round_trip() {
        let payloads: Vec<Vec<u8>> = (0..5u8)
            .map(|i| (0..(i as usize * 7 + 3)).map(|n| (n as u8) ^ i).collect())
            .collect();

        let mut stream = Vec::new();
        for payload in &payloads {
            stream.extend(frame(payload));
        }

        let mut splitter = FrameSplitter::new();
        let mut frames = Vec::new();
        for byte in &stream {
            frames.extend(splitter.push(std::slice::from_ref(byte)));
        }

        assert_eq!(frames.len(), payloads.len());
        for (got, payload) in frames.iter().zip(&payloads) {
            assert_eq!(&got[..], &frame(payload)[..]);
        }
        assert_eq!(splitter.buffer_len(), 0);
    }

    #[test]
    fn test_partial_frame_waits_for_end_marker() {
        let mut splitter = FrameSplitter::new();

        assert!(splitter.push(&[0xFF, 0xD8, 1, 2, 3]).is_empty());
        assert!(splitter.has_partial_frame());
        assert_eq!(splitter.buffer_len(), 5);

        let frames = splitter.push(&[4, 0xFF]);
        assert!(frames.is_empty());

        let frames = splitter.push(&[0xD9]);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &[0xFF, 0xD8, 1, 2, 3, 4, 0xFF, 0xD9]);
    }

    #[test]
    fn test_end_marker_before_start_is_ignored() {
        let mut splitter = FrameSplitter::new();
        let mut input = vec![0xFF, 0xD9, 7];
        input.extend(frame(b"x"));

        let frames = splitter.push(&input);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &frame(b"x")[..]);
    }

    #[test]
    fn test_overflow_without_markers_clears_buffer() {
        let mut splitter = FrameSplitter::with_max_buffer(1024);

        for _ in 0..10 {
            assert!(splitter.push(&[0x11; 100]).is_empty());
        }
        assert_eq!(splitter.buffer_len(), 1000);

        assert!(splitter.push(&[0x11; 100]).is_empty());
        assert_eq!(splitter.buffer_len(), 0);
        assert_eq!(splitter.overflows(), 1);
    }

    #[test]
    fn test_overflow_of_unterminated_frame() {
        let mut splitter = FrameSplitter::with_max_buffer(64);
        splitter.push(&FRAME_START);
        splitter.push(&[0x22; 100]);

        assert_eq!(splitter.buffer_len(), 0);
        assert!(!splitter.has_partial_frame());

        // Recovers for the next frame
        let frames = splitter.push(&frame(b"ok"));
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_default_ceiling() {
        let mut splitter = FrameSplitter::new();
        let chunk = vec![0u8; 1024 * 1024];
        for _ in 0..5 {
            splitter.push(&chunk);
        }
        assert_eq!(splitter.buffer_len(), MAX_FRAME_BUFFER);

        splitter.push(&[0u8]);
        assert_eq!(splitter.buffer_len(), 0);
    }

    #[test]
    fn test_clear_resets_partial_frame() {
        let mut splitter = FrameSplitter::new();
        splitter.push(&[0xFF, 0xD8, 1]);
        splitter.clear();

        assert_eq!(splitter.buffer_len(), 0);
        assert!(splitter.push(&[2, 0xFF, 0xD9]).is_empty());
    }
}

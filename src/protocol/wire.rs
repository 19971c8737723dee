//! Incoming byte stream reassembly
//!
//! Socket reads arrive in arbitrary sizes. [`StreamReassembler`] buffers
//! them and hands exactly-sized frames to a [`FrameHandler`], which in turn
//! decides how large the next frame is. The reassembler itself knows
//! nothing about the protocol.

use bytes::{Bytes, BytesMut};
use tracing::trace;

/// Consumer of fixed-size frames
pub trait FrameHandler {
    /// Size of the next frame, or `None` once no more frames are wanted
    fn demand(&self) -> Option<usize>;

    /// Handle one frame of exactly `demand()` bytes.
    ///
    /// The handler must update its demand before returning.
    fn handle_frame(&mut self, frame: Bytes);
}

/// Buffers bytes until the current frame demand can be satisfied
#[derive(Debug, Default)]
pub struct StreamReassembler {
    buffer: BytesMut,
}

impl StreamReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes buffered but not yet handed out
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Append `data` and dispatch every frame that is now complete.
    ///
    /// Returns the number of frames handed to `handler`. Several small
    /// frames arriving in one read are all dispatched by a single call.
    pub fn feed<H: FrameHandler>(&mut self, data: &[u8], handler: &mut H) -> usize {
        self.buffer.extend_from_slice(data);
        trace!("Reassembler received {} bytes, {} buffered", data.len(), self.buffer.len());

        let mut frames = 0;
        while let Some(size) = handler.demand() {
            if self.buffer.len() < size {
                break;
            }
            let frame = self.buffer.split_to(size).freeze();
            frames += 1;
            handler.handle_frame(frame);
        }

        if handler.demand().is_none() && !self.buffer.is_empty() {
            trace!("Handler finished, discarding {} buffered bytes", self.buffer.len());
            self.buffer.clear();
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reads a one-byte length, then a body of that length, repeatedly
    struct LengthPrefixed {
        next: usize,
        in_body: bool,
        bodies: Vec<Vec<u8>>,
        limit: usize,
    }

    impl LengthPrefixed {
        fn new(limit: usize) -> Self {
            Self { next: 1, in_body: false, bodies: Vec::new(), limit }
        }
    }

    impl FrameHandler for LengthPrefixed {
        fn demand(&self) -> Option<usize> {
            if self.bodies.len() >= self.limit {
                None
            } else {
                Some(self.next)
            }
        }

        fn handle_frame(&mut self, frame: Bytes) {
            if self.in_body {
                self.bodies.push(frame.to_vec());
                self.next = 1;
                self.in_body = false;
            } else {
                self.next = frame[0] as usize;
                self.in_body = true;
            }
        }
    }

    #[test]
    fn test_frames_split_across_reads() {
        let mut reassembler = StreamReassembler::new();
        let mut handler = LengthPrefixed::new(10);

        assert_eq!(reassembler.feed(&[5, b'h'], &mut handler), 1);
        assert_eq!(reassembler.feed(b"el", &mut handler), 0);
        assert_eq!(reassembler.feed(b"lo", &mut handler), 1);

        assert_eq!(handler.bodies, vec![b"hello".to_vec()]);
        assert_eq!(reassembler.buffered(), 0);
    }

    #[test]
    fn test_many_frames_in_one_read() {
        let mut reassembler = StreamReassembler::new();
        let mut handler = LengthPrefixed::new(10);

        let frames = reassembler.feed(&[2, b'a', b'b', 1, b'c', 3, b'd'], &mut handler);
        assert_eq!(frames, 5);
        assert_eq!(handler.bodies, vec![b"ab".to_vec(), b"c".to_vec()]);
        assert_eq!(reassembler.buffered(), 1);
    }

    #[test]
    fn test_byte_at_a_time_matches_single_read() {
        let stream = [3, b'x', b'y', b'z', 2, b'p', b'q'];

        let mut whole = StreamReassembler::new();
        let mut whole_handler = LengthPrefixed::new(10);
        whole.feed(&stream, &mut whole_handler);

        let mut trickle = StreamReassembler::new();
        let mut trickle_handler = LengthPrefixed::new(10);
        for byte in stream {
            trickle.feed(&[byte], &mut trickle_handler);
        }

        assert_eq!(whole_handler.bodies, trickle_handler.bodies);
    }

    #[test]
    fn test_stops_when_handler_is_done() {
        let mut reassembler = StreamReassembler::new();
        let mut handler = LengthPrefixed::new(1);

        reassembler.feed(&[1, b'a', 1, b'b'], &mut handler);
        assert_eq!(handler.bodies, vec![b"a".to_vec()]);
        assert_eq!(reassembler.buffered(), 0);

        assert_eq!(reassembler.feed(&[1, b'c'], &mut handler), 0);
        assert_eq!(handler.bodies.len(), 1);
    }
}

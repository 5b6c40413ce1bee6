//! Bounded line framing for stream-oriented transports
//!
//! Commands on stream channels are newline-delimited and capped at a fixed
//! size. The framer accumulates input chunks until it sees the delimiter;
//! bytes past the capacity are discarded rather than buffered or treated as
//! an error, which bounds memory against a hostile or broken sender. The
//! accumulated state lives in the framer so a signal interrupting the read
//! mid-line does not lose the partial command.

use crate::control::command::MAX_COMMAND_SIZE;

/// Incremental newline-delimited scanner with a fixed capacity
#[derive(Debug)]
pub struct LineFramer {
    cap: usize,
    pending: Vec<u8>,
}

impl LineFramer {
    /// Create a framer with the standard command capacity
    pub fn new() -> Self {
        Self::with_capacity(MAX_COMMAND_SIZE)
    }

    /// Create a framer with an explicit capacity
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            cap,
            pending: Vec::with_capacity(cap),
        }
    }

    /// Consume as much of `chunk` as belongs to the current line.
    ///
    /// Returns the number of bytes consumed and whether the line is now
    /// complete. The delimiter is consumed but never stored. When the line
    /// is complete, collect it with [`LineFramer::take`].
    pub fn feed(&mut self, chunk: &[u8]) -> (usize, bool) {
        match chunk.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                self.push(&chunk[..pos]);
                (pos + 1, true)
            }
            None => {
                self.push(chunk);
                (chunk.len(), false)
            }
        }
    }

    /// Take the accumulated line, resetting the framer
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending)
    }

    /// No bytes accumulated yet
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn push(&mut self, bytes: &[u8]) {
        let room = self.cap.saturating_sub(self.pending.len());
        let keep = bytes.len().min(room);
        self.pending.extend_from_slice(&bytes[..keep]);
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_single_chunk_line() {
        let mut framer = LineFramer::new();
        let (consumed, complete) = framer.feed(b"QUIT\n");
        assert_eq!(consumed, 5);
        assert!(complete);
        assert_eq!(framer.take(), b"QUIT");
        assert!(framer.is_empty());
    }

    #[test]
    fn test_line_split_across_chunks() {
        let mut framer = LineFramer::new();
        let (consumed, complete) = framer.feed(b"QU");
        assert_eq!((consumed, complete), (2, false));
        let (consumed, complete) = framer.feed(b"IT\nrest");
        assert_eq!((consumed, complete), (3, true));
        assert_eq!(framer.take(), b"QUIT");
    }

    #[test]
    fn test_consumes_only_up_to_delimiter() {
        let mut framer = LineFramer::new();
        let (consumed, complete) = framer.feed(b"A\nB\n");
        assert_eq!((consumed, complete), (2, true));
        assert_eq!(framer.take(), b"A");
        // The caller re-feeds the remainder
        let (consumed, complete) = framer.feed(b"B\n");
        assert_eq!((consumed, complete), (2, true));
        assert_eq!(framer.take(), b"B");
    }

    #[test]
    fn test_payload_exactly_at_capacity() {
        let mut framer = LineFramer::new();
        let payload = vec![b'x'; MAX_COMMAND_SIZE];
        let mut line = payload.clone();
        line.push(b'\n');
        let (_, complete) = framer.feed(&line);
        assert!(complete);
        assert_eq!(framer.take(), payload);
    }

    #[test]
    fn test_payload_one_byte_over_is_truncated() {
        let mut framer = LineFramer::new();
        let mut line = vec![b'x'; MAX_COMMAND_SIZE + 1];
        line.push(b'\n');
        let (consumed, complete) = framer.feed(&line);
        assert_eq!(consumed, line.len());
        assert!(complete);
        assert_eq!(framer.take().len(), MAX_COMMAND_SIZE);
    }

    #[test]
    fn test_excess_discarded_across_chunks() {
        let mut framer = LineFramer::with_capacity(4);
        framer.feed(b"abcd");
        framer.feed(b"efgh");
        let (_, complete) = framer.feed(b"i\n");
        assert!(complete);
        assert_eq!(framer.take(), b"abcd");
    }

    proptest! {
        #[test]
        fn prop_keeps_at_most_capacity(payload in proptest::collection::vec(any::<u8>(), 0..300)) {
            let body: Vec<u8> = payload.into_iter().filter(|&b| b != b'\n').collect();
            let mut framer = LineFramer::new();
            let mut line = body.clone();
            line.push(b'\n');
            let (consumed, complete) = framer.feed(&line);
            prop_assert_eq!(consumed, line.len());
            prop_assert!(complete);
            let kept = framer.take();
            let expect = &body[..body.len().min(MAX_COMMAND_SIZE)];
            prop_assert_eq!(kept.as_slice(), expect);
        }
    }
}

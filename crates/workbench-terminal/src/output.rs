/// Turns raw process output into UTF-8 text chunks.
///
/// A multi-byte character split across two reads is held back until the rest
/// of it arrives. Bytes that can never become valid UTF-8 are replaced with
/// U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Chunker {
    pending: Vec<u8>,
}

impl Utf8Chunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `bytes` after any held-back tail. Returns `None` when nothing
    /// complete is available yet.
    pub fn push(&mut self, bytes: &[u8]) -> Option<String> {
        self.pending.extend_from_slice(bytes);

        let keep = incomplete_tail_len(&self.pending);
        let ready = self.pending.len() - keep;
        if ready == 0 {
            return None;
        }

        let text = String::from_utf8_lossy(&self.pending[..ready]).into_owned();
        self.pending.drain(..ready);
        Some(text)
    }

    /// Flush whatever is left at end of stream
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(text)
    }
}

/// Length of a trailing, possibly incomplete UTF-8 sequence
fn incomplete_tail_len(bytes: &[u8]) -> usize {
    // A sequence is at most 4 bytes, so only the last 3 can be a prefix
    for back in 1..=bytes.len().min(3) {
        let b = bytes[bytes.len() - back];
        if b & 0b1100_0000 == 0b1000_0000 {
            // continuation byte, keep looking for the lead
            continue;
        }
        let needed = match b {
            b if b & 0b1110_0000 == 0b1100_0000 => 2,
            b if b & 0b1111_0000 == 0b1110_0000 => 3,
            b if b & 0b1111_1000 == 0b1111_0000 => 4,
            _ => return 0,
        };
        return if needed > back { back } else { 0 };
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_passes_through() {
        let mut chunker = Utf8Chunker::new();
        assert_eq!(chunker.push(b"ls -la\r\n").as_deref(), Some("ls -la\r\n"));
        assert_eq!(chunker.finish(), None);
    }

    #[test]
    fn test_split_multibyte_character_is_held_back() {
        let snowman = "☃".as_bytes();
        let mut chunker = Utf8Chunker::new();

        let mut first = b"hi ".to_vec();
        first.extend_from_slice(&snowman[..1]);
        assert_eq!(chunker.push(&first).as_deref(), Some("hi "));
        assert_eq!(chunker.push(&snowman[1..2]), None);
        assert_eq!(chunker.push(&snowman[2..]).as_deref(), Some("☃"));
    }

    #[test]
    fn test_invalid_bytes_are_replaced() {
        let mut chunker = Utf8Chunker::new();
        assert_eq!(chunker.push(b"a\xffb").as_deref(), Some("a\u{fffd}b"));
    }

    #[test]
    fn test_truncated_tail_flushed_on_finish() {
        let mut chunker = Utf8Chunker::new();
        assert_eq!(chunker.push(&"é".as_bytes()[..1]), None);
        assert_eq!(chunker.finish().as_deref(), Some("\u{fffd}"));
    }
}

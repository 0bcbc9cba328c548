//! Bounded raw output history

use tracing::trace;

use crate::matcher::strip_ansi;

/// Raw bytes read from the pty, trimmed from the front past a ceiling
#[derive(Debug)]
pub struct Transcript {
    data: Vec<u8>,
    limit: usize,
    retain: usize,
    trimmed: u64,
}

impl Transcript {
    /// `retain` is clamped to `limit`
    pub fn new(limit: usize, retain: usize) -> Self {
        Self {
            data: Vec::new(),
            limit,
            retain: retain.min(limit),
            trimmed: 0,
        }
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
        if self.data.len() > self.limit {
            let cut = self.cut_point(self.data.len() - self.retain);
            self.data.drain(..cut);
            self.trimmed += cut as u64;
            trace!("Trimmed {} bytes from transcript", cut);
        }
    }

    /// Move a cut at `start` forward so the kept bytes begin a line, or at
    /// least a whole character when no newline is near
    fn cut_point(&self, start: usize) -> usize {
        let window = &self.data[start..];
        let near = &window[..window.len().min(self.retain / 2)];
        if let Some(newline) = near.iter().position(|&b| b == b'\n') {
            return start + newline + 1;
        }
        let continuation = window
            .iter()
            .take_while(|&&b| b & 0b1100_0000 == 0b1000_0000)
            .count();
        start + continuation
    }

    pub fn raw(&self) -> &[u8] {
        &self.data
    }

    /// Decoded text with control sequences stripped
    pub fn text(&self) -> String {
        strip_ansi(&String::from_utf8_lossy(&self.data))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Total bytes dropped so far
    pub fn trimmed_bytes(&self) -> u64 {
        self.trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_most_recent_bytes() {
        let mut transcript = Transcript::new(10, 4);
        assert!(transcript.is_empty());
        transcript.append(b"0123456789");
        assert_eq!(transcript.raw(), b"0123456789");

        transcript.append(b"ab");
        assert_eq!(transcript.raw(), b"89ab");
        assert_eq!(transcript.trimmed_bytes(), 8);
    }

    #[test]
    fn test_text_strips_escapes() {
        let mut transcript = Transcript::new(100, 50);
        transcript.append(b"\x1b[32mReady>\x1b[0m\r\n");
        assert_eq!(transcript.text(), "Ready>\n");
    }

    #[test]
    fn test_trim_starts_at_next_line() {
        let mut transcript = Transcript::new(20, 15);
        transcript.append(b"aaaa\x1b[38;5;1mZ\nnext-line\n");

        assert_eq!(transcript.raw(), b"next-line\n");
        assert_eq!(transcript.trimmed_bytes(), 15);
        assert_eq!(transcript.text(), "next-line\n");
    }

    #[test]
    fn test_trim_never_splits_a_character() {
        let mut transcript = Transcript::new(10, 4);
        transcript.append("abcdefgéxyz".as_bytes());

        assert_eq!(transcript.raw(), b"xyz");
        assert_eq!(transcript.trimmed_bytes(), 9);
        assert!(!transcript.text().contains('\u{fffd}'));
    }
}

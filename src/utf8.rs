// Byte-level UTF-8 decoding with a fixed recovery policy: an invalid byte
// decodes to U+FFFD and consumes exactly one byte.

pub const REPLACEMENT: char = char::REPLACEMENT_CHARACTER;

/// Outcome of decoding one code point at a position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    /// A valid code point and its encoded width
    Char(char, usize),
    /// Not a valid sequence; consume one byte as U+FFFD
    Invalid,
    /// A valid prefix cut off by the end of the buffer
    Incomplete,
}

/// Encoded width implied by a lead byte, 0 for bytes that cannot start a sequence
#[inline]
pub fn sequence_width(lead: u8) -> usize {
    match lead {
        0x00..=0x7F => 1,
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => 0,
    }
}

/// Decode the code point starting at `pos`
///
/// When `at_eof` is set a truncated sequence is reported as `Invalid` instead
/// of `Incomplete`, since no further bytes will arrive to complete it.
pub fn decode_at(bytes: &[u8], pos: usize, at_eof: bool) -> Decoded {
    let lead = bytes[pos];
    if lead < 0x80 {
        return Decoded::Char(lead as char, 1);
    }
    let width = sequence_width(lead);
    if width == 0 {
        return Decoded::Invalid;
    }
    let end = (pos + width).min(bytes.len());
    match std::str::from_utf8(&bytes[pos..end]) {
        Ok(s) if end - pos == width => match s.chars().next() {
            Some(c) => Decoded::Char(c, width),
            None => Decoded::Invalid,
        },
        // error_len() == None means the input ended mid-sequence
        Err(e) if e.error_len().is_none() && !at_eof => Decoded::Incomplete,
        _ => Decoded::Invalid,
    }
}

/// True if `bytes` is a non-empty, valid, but unfinished multi-byte prefix
pub fn is_incomplete_prefix(bytes: &[u8]) -> bool {
    !bytes.is_empty() && matches!(decode_at(bytes, 0, false), Decoded::Incomplete)
}

/// Length of the longest prefix of `bytes` that does not end inside an
/// unfinished multi-byte sequence
pub fn complete_prefix_len(bytes: &[u8]) -> usize {
    let len = bytes.len();
    // A lead byte can sit at most 3 bytes before the end of a truncated sequence.
    let floor = len.saturating_sub(3);
    for start in (floor..len).rev() {
        let b = bytes[start];
        if b & 0xC0 == 0x80 {
            continue;
        }
        return if is_incomplete_prefix(&bytes[start..]) { start } else { len };
    }
    len
}

/// Iterator over the chars of a byte slice under the one-byte recovery policy
pub struct LossyChars<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> LossyChars<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }
}

impl Iterator for LossyChars<'_> {
    type Item = char;

    fn next(&mut self) -> Option<char> {
        if self.pos >= self.bytes.len() {
            return None;
        }
        match decode_at(self.bytes, self.pos, true) {
            Decoded::Char(c, width) => {
                self.pos += width;
                Some(c)
            }
            Decoded::Invalid | Decoded::Incomplete => {
                self.pos += 1;
                Some(REPLACEMENT)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_ascii_and_multibyte() {
        let text = "aé日🦀".as_bytes();
        assert_eq!(decode_at(text, 0, false), Decoded::Char('a', 1));
        assert_eq!(decode_at(text, 1, false), Decoded::Char('é', 2));
        assert_eq!(decode_at(text, 3, false), Decoded::Char('日', 3));
        assert_eq!(decode_at(text, 6, false), Decoded::Char('🦀', 4));
    }

    #[test]
    fn test_truncated_sequence() {
        let bytes = &"日".as_bytes()[..2];
        assert_eq!(decode_at(bytes, 0, false), Decoded::Incomplete);
        assert_eq!(decode_at(bytes, 0, true), Decoded::Invalid);
        assert!(is_incomplete_prefix(bytes));
    }

    #[test]
    fn test_invalid_bytes() {
        assert_eq!(decode_at(&[0xFF], 0, false), Decoded::Invalid);
        assert_eq!(decode_at(&[0x80], 0, false), Decoded::Invalid);
        // lead byte followed by a non-continuation byte
        assert_eq!(decode_at(&[0xE6, 0x41], 0, false), Decoded::Invalid);
        assert!(!is_incomplete_prefix(&[0xE6, 0x41]));
    }

    #[test]
    fn test_complete_prefix_len() {
        let crab = "ab🦀".as_bytes();
        assert_eq!(complete_prefix_len(crab), crab.len());
        for cut in 3..crab.len() {
            assert_eq!(complete_prefix_len(&crab[..cut]), 2, "cut at {cut}");
        }
        assert_eq!(complete_prefix_len(&[0x61, 0xFF]), 2);
        assert_eq!(complete_prefix_len(&[]), 0);
    }

    #[test]
    fn test_lossy_consumes_one_byte_per_invalid_start() {
        // E6 97 is a truncated 3-byte sequence followed by 'x'
        let chars: String = LossyChars::new(&[0x61, 0xE6, 0x97, 0x78]).collect();
        assert_eq!(chars, "a\u{FFFD}\u{FFFD}x");

        let chars: String = LossyChars::new(&[0xFF, 0x62]).collect();
        assert_eq!(chars, "\u{FFFD}b");
    }
}

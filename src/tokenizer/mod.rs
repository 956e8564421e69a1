// Boundary-aware tokenizer: turns a sequence of arbitrarily cut chunks into
// the same token sequence the whole text would produce.

use memchr::memchr2;

use crate::config::Mode;
use crate::error::StreamError;
use crate::utf8::{self, Decoded};

pub mod classify;

pub use classify::{is_ascii_word_byte, is_word_char};

/// Receives tokens as the tokenizer resolves them
///
/// The slice is only valid for the duration of the call.
pub trait TokenSink {
    fn accept(&mut self, token: &[u8]) -> Result<(), StreamError>;
}

/// `[start, end)` offsets into a buffer that owns the token bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenRange {
    pub start: usize,
    pub end: usize,
}

impl TokenRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn slice<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.start..self.end]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Scanning,
    InToken,
    /// A token is open across a chunk boundary; its head sits in the carry buffer
    CarryPending,
}

/// Chunk-boundary-safe token state machine
///
/// * word mode: runs of word characters (see [`classify`])
/// * line mode: lines ended by LF, CRLF or a lone CR
/// * chunk mode: each chunk, cut back to a UTF-8 boundary
pub struct Tokenizer {
    mode: Mode,
    state: ScanState,
    /// Head of a token split by a chunk boundary; grows as needed, never truncates
    carry: Vec<u8>,
    /// Unfinished multi-byte sequence from the end of the previous chunk
    pending: Vec<u8>,
    /// Previous chunk ended in CR; a leading LF belongs to the same terminator
    pending_cr: bool,
    longest_carry: usize,
}

impl Tokenizer {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            state: ScanState::Scanning,
            carry: Vec::new(),
            pending: Vec::with_capacity(4),
            pending_cr: false,
            longest_carry: 0,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Largest carry buffer seen so far, in bytes
    pub fn longest_carry(&self) -> usize {
        self.longest_carry
    }

    /// Bytes held back waiting for the next chunk
    pub fn held_bytes(&self) -> usize {
        self.carry.len() + self.pending.len()
    }

    /// Consume one chunk
    ///
    /// Tokens completed by this chunk are handed to `sink`; an unterminated
    /// tail is copied out so the caller may reuse `chunk` immediately.
    pub fn feed<S: TokenSink>(&mut self, chunk: &[u8], sink: &mut S) -> Result<(), StreamError> {
        let mut offset = 0;

        while !self.pending.is_empty() {
            while offset < chunk.len() && utf8::is_incomplete_prefix(&self.pending) {
                self.pending.push(chunk[offset]);
                offset += 1;
            }
            if utf8::is_incomplete_prefix(&self.pending) {
                // Chunk exhausted before the sequence completed.
                return Ok(());
            }
            let held = std::mem::take(&mut self.pending);
            let consumed = self.scan(&held, false, sink)?;
            self.pending.extend_from_slice(&held[consumed..]);
            if self.pending.is_empty() {
                self.pending = held;
                self.pending.clear();
            }
        }

        let rest = &chunk[offset..];
        let consumed = self.scan(rest, false, sink)?;
        self.pending.extend_from_slice(&rest[consumed..]);
        Ok(())
    }

    /// Flush everything held at end of stream
    pub fn finish<S: TokenSink>(&mut self, sink: &mut S) -> Result<(), StreamError> {
        if !self.pending.is_empty() {
            let held = std::mem::take(&mut self.pending);
            self.scan(&held, true, sink)?;
        }
        if self.state == ScanState::CarryPending {
            let result = sink.accept(&self.carry);
            self.carry.clear();
            result?;
        }
        self.state = ScanState::Scanning;
        self.pending_cr = false;
        Ok(())
    }

    /// Scan `buf`, returning how many bytes were consumed
    ///
    /// Only an unfinished UTF-8 sequence at the very end is left unconsumed,
    /// and only when `at_eof` is false.
    fn scan<S: TokenSink>(&mut self, buf: &[u8], at_eof: bool, sink: &mut S) -> Result<usize, StreamError> {
        if buf.is_empty() {
            return Ok(0);
        }
        let consumed = match self.mode {
            Mode::Word => self.scan_words(buf, at_eof, sink)?,
            Mode::Line => self.scan_lines(buf, sink)?,
            Mode::Chunk => {
                let cut = if at_eof { buf.len() } else { utf8::complete_prefix_len(buf) };
                if cut > 0 {
                    sink.accept(&buf[..cut])?;
                }
                cut
            }
        };
        self.longest_carry = self.longest_carry.max(self.carry.len());
        Ok(consumed)
    }

    fn scan_words<S: TokenSink>(&mut self, buf: &[u8], at_eof: bool, sink: &mut S) -> Result<usize, StreamError> {
        let ascii = buf.is_ascii();
        let mut start = if self.state == ScanState::CarryPending { Some(0) } else { None };
        let mut i = 0;

        while i < buf.len() {
            let (is_word, width) = if ascii {
                (is_ascii_word_byte(buf[i]), 1)
            } else {
                match utf8::decode_at(buf, i, at_eof) {
                    Decoded::Char(c, width) => (is_word_char(c), width),
                    Decoded::Invalid => (false, 1),
                    Decoded::Incomplete => break,
                }
            };

            if is_word {
                if start.is_none() {
                    start = Some(i);
                    self.state = ScanState::InToken;
                }
            } else if let Some(s) = start.take() {
                emit(&mut self.carry, &buf[s..i], sink)?;
                self.state = ScanState::Scanning;
            }
            i += width;
        }

        if let Some(s) = start {
            self.carry.extend_from_slice(&buf[s..i]);
            self.state = ScanState::CarryPending;
        }
        Ok(i)
    }

    fn scan_lines<S: TokenSink>(&mut self, buf: &[u8], sink: &mut S) -> Result<usize, StreamError> {
        let mut start = 0;
        let mut i = 0;

        if self.pending_cr {
            self.pending_cr = false;
            if buf[0] == b'\n' {
                start = 1;
                i = 1;
            }
        }
        if start < buf.len() && self.state == ScanState::Scanning {
            self.state = ScanState::InToken;
        }

        while let Some(pos) = memchr2(b'\n', b'\r', &buf[i..]) {
            let end = i + pos;
            emit(&mut self.carry, &buf[start..end], sink)?;
            i = if buf[end] == b'\r' {
                match buf.get(end + 1) {
                    Some(b'\n') => end + 2,
                    Some(_) => end + 1,
                    None => {
                        // CR is the last byte; the next chunk decides whether LF follows.
                        self.pending_cr = true;
                        end + 1
                    }
                }
            } else {
                end + 1
            };
            start = i;
        }

        if start < buf.len() {
            self.carry.extend_from_slice(&buf[start..]);
            self.state = ScanState::CarryPending;
        } else {
            self.state = ScanState::Scanning;
        }
        Ok(buf.len())
    }
}

/// Hand a finished token to the sink, merging any carried head
fn emit<S: TokenSink>(carry: &mut Vec<u8>, tail: &[u8], sink: &mut S) -> Result<(), StreamError> {
    if carry.is_empty() {
        return sink.accept(tail);
    }
    carry.extend_from_slice(tail);
    let result = sink.accept(carry);
    carry.clear();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Collect(Vec<Vec<u8>>);

    impl TokenSink for Collect {
        fn accept(&mut self, token: &[u8]) -> Result<(), StreamError> {
            self.0.push(token.to_vec());
            Ok(())
        }
    }

    impl Collect {
        fn strings(&self) -> Vec<String> {
            self.0.iter().map(|t| String::from_utf8_lossy(t).into_owned()).collect()
        }
    }

    fn tokenize(mode: Mode, input: &[u8], chunk_size: usize) -> Vec<String> {
        let mut tokenizer = Tokenizer::new(mode);
        let mut sink = Collect::default();
        for chunk in input.chunks(chunk_size.max(1)) {
            tokenizer.feed(chunk, &mut sink).unwrap();
        }
        tokenizer.finish(&mut sink).unwrap();
        sink.strings()
    }

    #[test]
    fn test_words_basic() {
        let words = tokenize(Mode::Word, b"The quick brown fox.", 64);
        assert_eq!(words, vec!["The", "quick", "brown", "fox"]);
    }

    #[test]
    fn test_words_keep_hyphen_apostrophe_underscore() {
        let words = tokenize(Mode::Word, b"don't well-known snake_case, x", 64);
        assert_eq!(words, vec!["don't", "well-known", "snake_case", "x"]);
    }

    #[test]
    fn test_words_across_every_cut() {
        let input = b"alpha beta, gamma-delta epsilon";
        let expected = tokenize(Mode::Word, input, input.len());
        for size in 1..=input.len() {
            assert_eq!(tokenize(Mode::Word, input, size), expected, "chunk size {size}");
        }
    }

    #[test]
    fn test_multibyte_split_inside_code_point() {
        let input = "café 日本語 naïve".as_bytes();
        let expected = vec!["café", "日本語", "naïve"];
        for size in 1..=input.len() {
            assert_eq!(tokenize(Mode::Word, input, size), expected, "chunk size {size}");
        }
    }

    #[test]
    fn test_split_between_lead_and_continuation_counts_once() {
        // 'é' is C3 A9; cut right after the lead byte
        let input = "aé b".as_bytes();
        let mut tokenizer = Tokenizer::new(Mode::Word);
        let mut sink = Collect::default();
        tokenizer.feed(&input[..2], &mut sink).unwrap();
        assert!(sink.0.is_empty());
        assert_eq!(tokenizer.held_bytes(), 2);
        tokenizer.feed(&input[2..], &mut sink).unwrap();
        tokenizer.finish(&mut sink).unwrap();
        assert_eq!(sink.strings(), vec!["aé", "b"]);
    }

    #[test]
    fn test_non_word_multibyte_delimits() {
        let words = tokenize(Mode::Word, "one—two«three»".as_bytes(), 2);
        assert_eq!(words, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_invalid_utf8_delimits_and_never_fails() {
        let input = [b'a', b'b', 0xFF, b'c', 0xE6, 0x97, b'd'];
        for size in 1..=input.len() {
            assert_eq!(tokenize(Mode::Word, &input, size), vec!["ab", "c", "d"], "chunk size {size}");
        }
    }

    #[test]
    fn test_truncated_sequence_at_eof() {
        let mut input = b"word ".to_vec();
        input.extend_from_slice(&"日".as_bytes()[..2]);
        assert_eq!(tokenize(Mode::Word, &input, 3), vec!["word"]);
    }

    #[test]
    fn test_token_larger_than_chunk_grows_carry() {
        let long = "x".repeat(10_000);
        let input = format!("a {long} b");
        let mut tokenizer = Tokenizer::new(Mode::Word);
        let mut sink = Collect::default();
        for chunk in input.as_bytes().chunks(7) {
            tokenizer.feed(chunk, &mut sink).unwrap();
        }
        tokenizer.finish(&mut sink).unwrap();
        assert_eq!(sink.0.len(), 3);
        assert_eq!(sink.0[1].len(), 10_000);
        assert!(tokenizer.longest_carry() >= 9_990);
    }

    #[test]
    fn test_lines_all_terminators() {
        let lines = tokenize(Mode::Line, b"a\nb\r\nc\rd", 64);
        assert_eq!(lines, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_lines_empty_and_trailing() {
        assert_eq!(tokenize(Mode::Line, b"a\n\nb\n", 64), vec!["a", "", "b"]);
        assert_eq!(tokenize(Mode::Line, b"\r\n\r\n", 64), vec!["", ""]);
        assert_eq!(tokenize(Mode::Line, b"\r\r", 64), vec!["", ""]);
        assert!(tokenize(Mode::Line, b"", 64).is_empty());
    }

    #[test]
    fn test_crlf_split_across_chunks() {
        let mut tokenizer = Tokenizer::new(Mode::Line);
        let mut sink = Collect::default();
        tokenizer.feed(b"one\r", &mut sink).unwrap();
        assert_eq!(sink.strings(), vec!["one"]);
        tokenizer.feed(b"\ntwo", &mut sink).unwrap();
        tokenizer.finish(&mut sink).unwrap();
        assert_eq!(sink.strings(), vec!["one", "two"], "CRLF split must be a single terminator");
    }

    #[test]
    fn test_lone_cr_at_chunk_end_then_text() {
        let mut tokenizer = Tokenizer::new(Mode::Line);
        let mut sink = Collect::default();
        tokenizer.feed(b"one\r", &mut sink).unwrap();
        tokenizer.feed(b"two\n", &mut sink).unwrap();
        tokenizer.finish(&mut sink).unwrap();
        assert_eq!(sink.strings(), vec!["one", "two"]);
    }

    #[test]
    fn test_lines_across_every_cut() {
        let input = b"first line\r\nsecond\rthird\n\nfifth\r\n\r\nlast";
        let expected = tokenize(Mode::Line, input, input.len());
        assert_eq!(expected, vec!["first line", "second", "third", "", "fifth", "", "last"]);
        for size in 1..=input.len() {
            assert_eq!(tokenize(Mode::Line, input, size), expected, "chunk size {size}");
        }
    }

    #[test]
    fn test_chunk_mode_respects_utf8_boundaries() {
        let input = "ab🦀cd".as_bytes();
        let mut tokenizer = Tokenizer::new(Mode::Chunk);
        let mut sink = Collect::default();
        for chunk in input.chunks(3) {
            tokenizer.feed(chunk, &mut sink).unwrap();
        }
        tokenizer.finish(&mut sink).unwrap();
        for segment in &sink.0 {
            assert!(std::str::from_utf8(segment).is_ok(), "segment {segment:?} splits a code point");
        }
        assert_eq!(sink.0.concat(), input);
    }

    #[test]
    fn test_sink_error_stops_scan() {
        struct FailAfter(usize);
        impl TokenSink for FailAfter {
            fn accept(&mut self, _token: &[u8]) -> Result<(), StreamError> {
                if self.0 == 0 {
                    return Err(StreamError::Cancelled);
                }
                self.0 -= 1;
                Ok(())
            }
        }
        let mut tokenizer = Tokenizer::new(Mode::Word);
        let err = tokenizer.feed(b"a b c d", &mut FailAfter(2)).unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_state_transitions() {
        let mut tokenizer = Tokenizer::new(Mode::Word);
        let mut sink = Collect::default();
        assert_eq!(tokenizer.state(), ScanState::Scanning);
        tokenizer.feed(b"hel", &mut sink).unwrap();
        assert_eq!(tokenizer.state(), ScanState::CarryPending);
        tokenizer.feed(b"lo ", &mut sink).unwrap();
        assert_eq!(tokenizer.state(), ScanState::Scanning);
        assert_eq!(sink.strings(), vec!["hello"]);
    }

    #[test]
    fn test_token_range() {
        let data = b"hello world";
        let range = TokenRange::new(6, 11);
        assert_eq!(range.slice(data), b"world");
        assert_eq!(range.len(), 5);
        assert!(!range.is_empty());
    }
}

// Text normalization: lowercase letters, map punctuation and whitespace to a
// single space, collapse runs. Pure-ASCII input goes through a byte class
// table; anything else is decoded and classified with Unicode rules. Both paths
// must agree byte-for-byte on ASCII input.

use crate::category::is_punctuation;
use crate::utf8::LossyChars;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AsciiClass {
    Keep,
    Lower,
    Space,
}

// Unicode general category P restricted to ASCII
const ASCII_PUNCT: &[u8] = b"!\"#%&'()*,-./:;?@[\\]_{}";

const fn build_ascii_table() -> [AsciiClass; 128] {
    let mut table = [AsciiClass::Keep; 128];
    let mut i = 0;
    while i < 128 {
        let b = i as u8;
        // White_Space in ASCII: TAB, LF, VT, FF, CR, SPACE
        if (b >= 0x09 && b <= 0x0D) || b == b' ' {
            table[i] = AsciiClass::Space;
        } else if b >= b'A' && b <= b'Z' {
            table[i] = AsciiClass::Lower;
        }
        i += 1;
    }
    let mut j = 0;
    while j < ASCII_PUNCT.len() {
        table[ASCII_PUNCT[j] as usize] = AsciiClass::Space;
        j += 1;
    }
    table
}

static ASCII_TABLE: [AsciiClass; 128] = build_ascii_table();

/// Separator rule without the ASCII table
fn is_separator_unicode(c: char) -> bool {
    c.is_whitespace() || is_punctuation(c)
}

/// Whether `c` normalizes to a (collapsible) space
#[inline]
pub fn is_separator(c: char) -> bool {
    if c.is_ascii() {
        ASCII_TABLE[c as usize] == AsciiClass::Space
    } else {
        is_separator_unicode(c)
    }
}

/// Carry-over between pieces of one logical text
///
/// Feeding a text in several pieces with the same state yields the same output
/// as feeding it whole.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeState {
    last_was_space: bool,
}

impl NormalizeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// State after a text whose final char was (or was not) a separator
    pub fn after_separator(last_was_space: bool) -> Self {
        Self { last_was_space }
    }

    pub fn last_was_space(&self) -> bool {
        self.last_was_space
    }
}

#[inline]
fn ascii_with<F: FnMut(u8)>(input: &[u8], state: &mut NormalizeState, mut emit: F) {
    for &b in input {
        match ASCII_TABLE[b as usize] {
            AsciiClass::Space => {
                if !state.last_was_space {
                    emit(b' ');
                    state.last_was_space = true;
                }
            }
            AsciiClass::Lower => {
                emit(b | 0x20);
                state.last_was_space = false;
            }
            AsciiClass::Keep => {
                emit(b);
                state.last_was_space = false;
            }
        }
    }
}

#[inline]
fn chars_with<I, F>(chars: I, state: &mut NormalizeState, mut emit: F)
where
    I: Iterator<Item = char>,
    F: FnMut(char),
{
    for c in chars {
        if is_separator_unicode(c) {
            if !state.last_was_space {
                emit(' ');
                state.last_was_space = true;
            }
        } else {
            for lower in c.to_lowercase() {
                emit(lower);
            }
            state.last_was_space = false;
        }
    }
}

/// Normalize a string
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    normalize_into(text, &mut out);
    out
}

/// Normalize into a caller-owned buffer, replacing its contents
pub fn normalize_into(text: &str, out: &mut String) {
    out.clear();
    out.reserve(text.len());
    let mut state = NormalizeState::new();
    if text.is_ascii() {
        ascii_with(text.as_bytes(), &mut state, |b| out.push(b as char));
    } else {
        chars_with(text.chars(), &mut state, |c| out.push(c));
    }
}

/// Code-point path applied to any input, ASCII included
pub fn normalize_unicode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut state = NormalizeState::new();
    chars_with(text.chars(), &mut state, |c| out.push(c));
    out
}

/// Append the normalized form of `input` to `out`
///
/// Invalid UTF-8 decodes to U+FFFD, one byte at a time. `out` stays valid
/// UTF-8 if it was before the call.
pub fn normalize_bytes_into(input: &[u8], state: &mut NormalizeState, out: &mut Vec<u8>) {
    if input.is_ascii() {
        out.reserve(input.len());
        ascii_with(input, state, |b| out.push(b));
    } else {
        let mut buf = [0u8; 4];
        chars_with(LossyChars::new(input), state, |c| {
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes())
        });
    }
}

/// Char count of the normalized form of `input`, without materializing it
pub fn normalized_char_count(input: &[u8], state: &mut NormalizeState) -> u64 {
    let mut count = 0u64;
    if input.is_ascii() {
        ascii_with(input, state, |_| count += 1);
    } else {
        chars_with(LossyChars::new(input), state, |_| count += 1);
    }
    count
}

// Word character classification. ASCII goes through a 128-entry table;
// other code points are words when their general category is L or N.

use crate::category::is_letter;

const fn build_word_table() -> [bool; 128] {
    let mut table = [false; 128];
    let mut i = 0;
    while i < 128 {
        let b = i as u8;
        table[i] = (b >= b'a' && b <= b'z')
            || (b >= b'A' && b <= b'Z')
            || (b >= b'0' && b <= b'9')
            || b == b'_'
            || b == b'-'
            || b == b'\'';
        i += 1;
    }
    table
}

static WORD_TABLE: [bool; 128] = build_word_table();

/// Word membership for a byte of pure-ASCII input
#[inline]
pub fn is_ascii_word_byte(b: u8) -> bool {
    b < 128 && WORD_TABLE[b as usize]
}

/// Word membership for any code point
#[inline]
pub fn is_word_char(c: char) -> bool {
    if c.is_ascii() {
        WORD_TABLE[c as usize]
    } else {
        is_letter(c) || c.is_numeric()
    }
}

// Unicode general category membership for single code points.
//
// Each class is one anchored regex-automata matcher built on first use. Every
// thread keeps its own search cache so a lookup never touches the shared pool.

use regex_automata::meta::{Cache, Regex};
use regex_automata::{Anchored, Input};
use std::cell::RefCell;
use std::sync::OnceLock;

fn build(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static category class must compile")
}

fn punctuation_class() -> &'static Regex {
    static PUNCT: OnceLock<Regex> = OnceLock::new();
    PUNCT.get_or_init(|| build(r"\p{P}"))
}

fn letter_class() -> &'static Regex {
    static LETTER: OnceLock<Regex> = OnceLock::new();
    LETTER.get_or_init(|| build(r"\p{L}"))
}

thread_local! {
    static PUNCT_CACHE: RefCell<Cache> = RefCell::new(punctuation_class().create_cache());
    static LETTER_CACHE: RefCell<Cache> = RefCell::new(letter_class().create_cache());
}

fn starts_with_class(regex: &Regex, cache: &mut Cache, c: char) -> bool {
    let mut buf = [0u8; 4];
    let input = Input::new(c.encode_utf8(&mut buf).as_bytes())
        .anchored(Anchored::Yes)
        .earliest(true);
    regex.search_half_with(cache, &input).is_some()
}

/// General category P (any punctuation)
pub fn is_punctuation(c: char) -> bool {
    PUNCT_CACHE.with(|cache| starts_with_class(punctuation_class(), &mut cache.borrow_mut(), c))
}

/// General category L (any letter)
///
/// Narrower than `char::is_alphabetic`: combining vowel signs and other
/// Other_Alphabetic marks are not letters.
pub fn is_letter(c: char) -> bool {
    // L is a subset of Alphabetic, so the cheap property check rules most code points out
    c.is_alphabetic() && LETTER_CACHE.with(|cache| starts_with_class(letter_class(), &mut cache.borrow_mut(), c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_punctuation() {
        for c in ['!', '_', '—', '«', '。', '¿', '…'] {
            assert!(is_punctuation(c), "{c:?} should be punctuation");
        }
        for c in ['a', 'é', ' ', '$', '+', '🦀', '\u{FFFD}'] {
            assert!(!is_punctuation(c), "{c:?} should not be punctuation");
        }
    }

    #[test]
    fn test_letters_exclude_alphabetic_marks() {
        for c in ['a', 'Ж', 'ß', '日', 'ह'] {
            assert!(is_letter(c), "{c:?} should be a letter");
        }
        // DEVANAGARI VOWEL SIGN I and CIRCLED LATIN CAPITAL LETTER A are Alphabetic but not L
        for c in ['\u{093F}', '\u{24B6}', 'ⅷ', '٣', '—'] {
            assert!(!is_letter(c), "{c:?} should not be a letter");
        }
    }

    #[test]
    fn test_lookups_on_many_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| (0..1000).filter(|_| is_punctuation('«') && is_letter('é')).count()))
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 1000);
        }
    }
}

// Shared input texts

pub const ORIGINAL_SENTENCE: &str = "The quick brown fox jumps over the lazy dog.";
pub const AUGMENTED_SENTENCE: &str = "The quick brown fox jumps over the lazy canine.";

/// Mixed terminators, punctuation runs, an empty line and no trailing newline
pub const MIXED_PROSE: &str = "It was the best of times, it was the worst of times;\r\n\
it was the age of wisdom -- it was the age of foolishness...\n\
\n\
\"Well,\" said he, \"it's Mr. O'Brien's turn!\"\r\
The end";

/// Multi-byte text: 2-, 3- and 4-byte sequences, non-ASCII punctuation and spaces
pub const UNICODE_PROSE: &str = "Über den Wolken — muss die Freiheit «grenzenlos» sein.\n\
日本語のテキスト、句読点。\u{00A0}Ωμέγα!\r\n\
Crab 🦀 emoji 🦀🦀 and naïve café façades\n";

/// Builds a larger document by repeating the prose fixtures
pub fn large_document(repeats: usize) -> String {
    let mut doc = String::new();
    for i in 0..repeats {
        doc.push_str(MIXED_PROSE);
        doc.push('\n');
        doc.push_str(UNICODE_PROSE);
        doc.push_str(&format!("Paragraph {i} closes here.\n"));
    }
    doc
}

//! Comparison keys for review text.

/// Canonical comparison key for `text`: lowercased, punctuation removed,
/// whitespace trimmed and collapsed to single spaces. The input is never
/// modified; the key is only used to detect duplicates.
pub fn normalize(text: &str) -> String {
    let mut key = String::with_capacity(text.len());
    let mut pending_space = false;

    for c in text.chars().flat_map(char::to_lowercase) {
        if is_punctuation(c) {
            continue;
        }
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !key.is_empty() {
            key.push(' ');
        }
        pending_space = false;
        key.push(c);
    }

    key
}

fn is_punctuation(c: char) -> bool {
    c.is_ascii_punctuation()
        || matches!(c,
            '\u{00A1}' | '\u{00A7}' | '\u{00AB}' | '\u{00B6}' | '\u{00B7}' | '\u{00BB}' | '\u{00BF}'
            | '\u{2010}'..='\u{2027}'
            | '\u{2030}'..='\u{205E}'
            | '\u{3001}'..='\u{3003}'
            | '\u{3008}'..='\u{3011}'
            | '\u{FF01}'..='\u{FF0F}'
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_case_whitespace_and_punctuation() {
        assert_eq!(normalize("  Great   product!! "), "great product");
        assert_eq!(normalize("GREAT\tproduct."), "great product");
        assert_eq!(normalize("It's \u{201C}fine\u{201D}\u{2026}"), "its fine");
    }

    #[test]
    fn empty_and_punctuation_only_inputs() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
        assert_eq!(normalize("?!..."), "");
    }

    #[test]
    fn punctuation_between_words_does_not_leave_double_spaces() {
        assert_eq!(normalize("good - value"), "good value");
        assert_eq!(normalize("a , b"), "a b");
    }

    #[test]
    fn keeps_non_ascii_letters_and_emoji() {
        assert_eq!(normalize("Très BIEN 👍"), "très bien 👍");
    }

    #[test]
    fn normalize_is_idempotent() {
        let samples = [
            "  Great   product!! ",
            "İstanbul ŞEHİR",
            "Straße — GROSS",
            "¿Qué tal?  ¡Muy bien!",
            "line\nbreak\r\nand\ttab",
            "   ",
            "5 stars!!! 10/10 would buy again :)",
        ];
        for sample in samples {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "not idempotent for {sample:?}");
        }
    }
}

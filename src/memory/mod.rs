pub mod store;
pub mod types;

/// Sentence fragments this short are treated as extraction noise (page numbers,
/// headers, stray OCR tokens).
const MIN_FRAGMENT_CHARS: usize = 21;

/// Normalize extracted document text before it is stored.
///
/// Whitespace runs collapse to single spaces, the text is split on `.`, and
/// fragments shorter than [`MIN_FRAGMENT_CHARS`] are dropped. Survivors are
/// rejoined with `". "`.
pub fn clean_text(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .split('.')
        .map(str::trim)
        .filter(|fragment| fragment.chars().count() >= MIN_FRAGMENT_CHARS)
        .collect::<Vec<_>>()
        .join(". ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_collapses_whitespace() {
        assert_eq!(
            clean_text("  the scheduler\n\n\tpicks the   next task "),
            "the scheduler picks the next task"
        );
        assert_eq!(clean_text(" \n\t "), "");
    }

    #[test]
    fn clean_text_drops_short_fragments() {
        let raw = "Page 3. Round robin gives each process a time slice. Fig. 2. \
                   Context switches cost cache locality.";
        assert_eq!(
            clean_text(raw),
            "Round robin gives each process a time slice. Context switches cost cache locality"
        );
    }

    #[test]
    fn clean_text_boundary_is_twenty_one_chars() {
        let twenty = "a".repeat(20);
        let twenty_one = "b".repeat(21);
        assert_eq!(clean_text(&format!("{twenty}. {twenty_one}")), twenty_one);
    }
}

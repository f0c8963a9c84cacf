//! Rune-indexed text utilities
//!
//! Every position, length and slice in the engine is counted in runes
//! (`char`s), never bytes. Byte indexing would silently mis-position errors
//! and break matching on multibyte input, so the conversion to byte offsets
//! happens in exactly one place: this module.

/// Number of runes in `s`.
pub(crate) fn rune_count(s: &str) -> usize {
    s.chars().count()
}

/// Byte offset of the rune at `rune_index`, or `s.len()` when the index is
/// at or past the end.
fn byte_offset(s: &str, rune_index: usize) -> usize {
    s.char_indices()
        .nth(rune_index)
        .map(|(offset, _)| offset)
        .unwrap_or(s.len())
}

/// Slice `s` by rune indices, `from..to`.
pub(crate) fn rune_slice(s: &str, from: usize, to: usize) -> &str {
    debug_assert!(from <= to, "invalid rune slice: {from}..{to}");
    let start = byte_offset(s, from);
    let end = byte_offset(s, to);
    &s[start..end]
}

/// Everything from the rune at `from` to the end of `s`.
pub(crate) fn rune_slice_from(s: &str, from: usize) -> &str {
    &s[byte_offset(s, from)..]
}

/// 1-based line and column of the rune position `pos` in `text`.
///
/// The line is the number of newlines before `pos` plus one; the column is
/// the rune distance from the last newline, also 1-based.
pub(crate) fn line_and_column(text: &str, pos: usize) -> (usize, usize) {
    let mut line = 1;
    let mut column = 1;
    for ch in text.chars().take(pos) {
        if ch == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    (line, column)
}

/// Up to `max_runes` runes of `text` starting at rune position `pos`, for
/// error messages.
pub(crate) fn snippet(text: &str, pos: usize, max_runes: usize) -> &str {
    let total = rune_count(text);
    let from = pos.min(total);
    let to = (pos + max_runes).min(total);
    rune_slice(text, from, to)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rune_slice_ascii() {
        assert_eq!(rune_slice("hello", 1, 3), "el");
        assert_eq!(rune_slice("hello", 0, 5), "hello");
        assert_eq!(rune_slice("hello", 5, 5), "");
    }

    #[test]
    fn test_rune_slice_multibyte() {
        let s = "a你好b";
        assert_eq!(rune_count(s), 4);
        assert_eq!(rune_slice(s, 1, 3), "你好");
        assert_eq!(rune_slice(s, 3, 4), "b");
    }

    #[test]
    fn test_rune_slice_composite_emoji() {
        // The keycap emoji is three runes: '0', a variation selector, and
        // the combining keycap.
        let s = "0\u{fe0f}\u{20e3}";
        assert_eq!(rune_count(s), 3);
        assert_eq!(rune_slice(s, 0, 3), s);
        assert_eq!(rune_slice(s, 1, 2), "\u{fe0f}");
    }

    #[test]
    fn test_rune_slice_from() {
        assert_eq!(rune_slice_from("héllo", 2), "llo");
        assert_eq!(rune_slice_from("héllo", 5), "");
    }

    #[test]
    fn test_line_and_column_first_line() {
        assert_eq!(line_and_column("abc", 0), (1, 1));
        assert_eq!(line_and_column("abc", 2), (1, 3));
    }

    #[test]
    fn test_line_and_column_after_newline() {
        let text = "ab\ncd\nef";
        assert_eq!(line_and_column(text, 3), (2, 1));
        assert_eq!(line_and_column(text, 4), (2, 2));
        assert_eq!(line_and_column(text, 6), (3, 1));
    }

    #[test]
    fn test_line_and_column_counts_runes() {
        let text = "你好\nab";
        assert_eq!(line_and_column(text, 1), (1, 2));
        assert_eq!(line_and_column(text, 3), (2, 1));
    }

    #[test]
    fn test_snippet_clamps_to_end() {
        assert_eq!(snippet("a bb", 3, 20), "b");
        assert_eq!(snippet("a bb", 4, 20), "");
        assert_eq!(snippet("abcdef", 1, 3), "bcd");
    }
}

//! Head/tail excerpts: the fallback when no summary can be produced.
//!
//! The excerpt keeps 70% of the size budget from the start of the text and
//! 25% from the end, with an elision marker in between stating how many
//! characters were dropped. The remaining 5% covers the marker and the
//! optional location note, so the whole excerpt fits in `max_len`.

use crate::text::{char_len, clip_chars, format_count, tail_chars};

const HEAD_SHARE: usize = 70;
const TAIL_SHARE: usize = 25;

/// Elision marker placed between head and tail.
pub fn elision_marker(elided: usize) -> String {
    format!("\n\n...[TRUNCATED {} chars]...\n\n", format_count(elided))
}

/// Note naming where the full payload was saved.
pub fn location_note(location: &str) -> String {
    format!("\n\n[Full data: {location}]")
}

/// Excerpt `text` to at most `max_len` characters.
///
/// Text that already fits is returned unchanged. Otherwise the result is
/// `head + marker + tail`, followed by a [`location_note`] when `location`
/// is given.
pub fn head_tail(text: &str, max_len: usize, location: Option<&str>) -> String {
    let total = char_len(text);
    if total <= max_len {
        return text.to_string();
    }

    let note = location.map(location_note).unwrap_or_default();
    // Worst case for the marker: every character elided.
    let overhead = char_len(&elision_marker(total)) + char_len(&note);

    let mut head = max_len * HEAD_SHARE / 100;
    let mut tail = max_len * TAIL_SHARE / 100;
    if head + tail + overhead > max_len {
        let budget = max_len.saturating_sub(overhead);
        head = budget * HEAD_SHARE / (HEAD_SHARE + TAIL_SHARE);
        tail = budget * TAIL_SHARE / (HEAD_SHARE + TAIL_SHARE);
    }

    let elided = total - head - tail;
    let mut out = String::with_capacity(text.len().min(max_len * 4) + overhead);
    out.push_str(clip_chars(text, head));
    out.push_str(&elision_marker(elided));
    out.push_str(tail_chars(text, tail));
    out.push_str(&note);
    out
}

//! Splits oversized text for a size-limited remote write API.
//!
//! Cuts prefer a newline, then a space, then a hard cut at the limit. A
//! boundary earlier than a quarter of the limit is ignored so chunks never
//! degenerate into tiny fragments.

/// Write limit the remote message API accepts per message body.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 24_000;

/// Returns the ordered chunks of `text`, each at most `max_size` bytes before
/// the `[Part i/N] ` marker is added. A text that already fits comes back as a
/// single unmarked element.
pub fn split_text(text: &str, max_size: usize) -> Vec<String> {
    let max_size = max_size.max(1);
    if text.len() <= max_size {
        return vec![text.to_string()];
    }

    let min_boundary = max_size.div_ceil(4);
    let mut chunks: Vec<&str> = Vec::new();
    let mut remaining = text;

    while remaining.len() > max_size {
        let cut = find_cut(remaining, max_size, min_boundary);
        chunks.push(&remaining[..cut]);
        remaining = remaining[cut..].trim_start();
    }
    if !remaining.is_empty() {
        chunks.push(remaining);
    }

    let total = chunks.len();
    if total == 1 {
        return vec![chunks[0].to_string()];
    }
    chunks
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| format!("[Part {}/{}] {}", index + 1, total, chunk))
        .collect()
}

fn find_cut(remaining: &str, max_size: usize, min_boundary: usize) -> usize {
    // `lastIndexOf(ch, max_size)` semantics: the boundary char itself may sit at `max_size`.
    let window_end = floor_char_boundary(remaining, (max_size + 1).min(remaining.len()));
    let window = &remaining[..window_end];

    if let Some(index) = window.rfind('\n').filter(|index| *index >= min_boundary) {
        return index;
    }
    if let Some(index) = window.rfind(' ').filter(|index| *index >= min_boundary) {
        return index;
    }

    let hard = floor_char_boundary(remaining, max_size);
    if hard > 0 {
        return hard;
    }
    // A single char wider than the limit still has to move forward.
    remaining
        .char_indices()
        .nth(1)
        .map_or(remaining.len(), |(index, _)| index)
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip_marker(chunk: &str) -> &str {
        if chunk.starts_with("[Part ") {
            chunk
                .split_once("] ")
                .map_or(chunk, |(_, body)| body)
        } else {
            chunk
        }
    }

    #[test]
    fn short_text_is_returned_unchanged_without_marker() {
        let chunks = split_text("hello world", 100);
        assert_eq!(chunks, vec!["hello world".to_string()]);

        let exact = "x".repeat(50);
        assert_eq!(split_text(&exact, 50), vec![exact.clone()]);
    }

    #[test]
    fn repeated_lines_split_into_three_newline_aligned_parts() {
        let text = "line1\nline2\n".repeat(5000);
        assert_eq!(text.len(), 60_000);

        let chunks = split_text(&text, 24_000);
        assert_eq!(chunks.len(), 3);
        for (index, chunk) in chunks.iter().enumerate() {
            let marker = format!("[Part {}/3] ", index + 1);
            assert!(chunk.starts_with(&marker));
            let body = strip_marker(chunk);
            assert!(body.len() <= 24_000);
        }

        let bodies: Vec<&str> = chunks.iter().map(|chunk| strip_marker(chunk)).collect();
        assert!(bodies[0].ends_with("line2"));
        assert!(bodies[1].ends_with("line2"));
        assert!(bodies[1].starts_with("line1"));
        assert_eq!(bodies.join("\n"), text);
    }

    #[test]
    fn falls_back_to_space_when_newline_is_too_early() {
        let text = format!("a\n{}", "word ".repeat(40));
        let chunks = split_text(&text, 40);
        assert!(chunks.len() > 1);
        let first = strip_marker(&chunks[0]);
        assert!(first.len() > 10, "early newline must be ignored: {first:?}");
        assert!(first.ends_with("word"));
    }

    #[test]
    fn boundary_before_a_quarter_is_ignored_for_odd_limits() {
        // A quarter of 10 is 2.5, so a space at index 2 is too early.
        let chunks = split_text("ab cdefghijklmno", 10);
        assert_eq!(strip_marker(&chunks[0]), "ab cdefghi");
    }

    #[test]
    fn hard_cuts_when_no_boundary_exists() {
        let text = "x".repeat(250);
        let chunks = split_text(&text, 100);
        let bodies: Vec<&str> = chunks.iter().map(|chunk| strip_marker(chunk)).collect();
        assert_eq!(bodies.iter().map(|body| body.len()).collect::<Vec<_>>(), vec![100, 100, 50]);
        assert_eq!(bodies.concat(), text);
    }

    #[test]
    fn rejoined_bodies_match_input_modulo_boundary_whitespace() {
        let text = "The quick brown fox jumps over the lazy dog.\n".repeat(37)
            + &"unbroken".repeat(30)
            + " tail words here";
        let chunks = split_text(&text, 120);
        assert!(chunks.len() > 1);

        let squash = |value: &str| {
            value
                .chars()
                .filter(|ch| !ch.is_whitespace())
                .collect::<String>()
        };
        let rejoined = chunks
            .iter()
            .map(|chunk| strip_marker(chunk))
            .collect::<String>();
        assert_eq!(squash(&rejoined), squash(&text));
        assert!(chunks.iter().all(|chunk| !strip_marker(chunk).is_empty()));
    }

    #[test]
    fn multibyte_text_never_splits_inside_a_char() {
        let text = "é".repeat(100);
        let chunks = split_text(&text, 25);
        let bodies: Vec<&str> = chunks.iter().map(|chunk| strip_marker(chunk)).collect();
        assert!(bodies.iter().all(|body| body.len() <= 25));
        assert_eq!(bodies.concat(), text);
    }

    #[test]
    fn zero_limit_still_terminates() {
        let chunks = split_text("abc", 0);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2], "[Part 3/3] c");
    }
}

/// The first `max_chars` characters of `text` (characters, not bytes)
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// `text` truncated to `max_chars` characters, followed by `...` if something was cut
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let truncated = truncate_chars(text, max_chars);
    if truncated.len() < text.len() {
        format!("{}...", truncated)
    } else {
        text.to_string()
    }
}

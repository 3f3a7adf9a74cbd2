//! Text helpers for bounded tool output and error snippets.

/// Truncate to at most `max_bytes` without splitting a codepoint.
pub fn truncate_utf8(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }

    let mut cutoff = max_bytes;
    while cutoff > 0 && !s.is_char_boundary(cutoff) {
        cutoff -= 1;
    }
    s[..cutoff].to_string()
}

/// First `max_chars` characters of `s`.
pub fn snippet(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((cutoff, _)) => s[..cutoff].to_string(),
        None => s.to_string(),
    }
}

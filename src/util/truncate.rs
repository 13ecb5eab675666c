//! Output truncation on UTF-8 boundaries.

/// Prefix of the marker appended to truncated output.
pub const TRUNCATION_MARKER: &str = "[output truncated:";

/// Cut `s` to at most `max_bytes` without splitting a codepoint.
pub fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }

    let mut cutoff = max_bytes;
    while cutoff > 0 && !s.is_char_boundary(cutoff) {
        cutoff -= 1;
    }
    &s[..cutoff]
}

/// Bound `s` to `max_bytes`, appending a marker that names how much was cut.
///
/// Returns the bounded text and whether anything was removed.
pub fn bound_output(s: &str, max_bytes: usize) -> (String, bool) {
    if s.len() <= max_bytes {
        return (s.to_string(), false);
    }
    let kept = truncate_utf8(s, max_bytes);
    (mark_truncated(kept, s.len() - kept.len()), true)
}

/// Append the truncation marker to `kept`.
pub fn mark_truncated(kept: &str, omitted_bytes: usize) -> String {
    format!("{kept}\n... {TRUNCATION_MARKER} {omitted_bytes} bytes omitted]")
}

/// Whether `s` carries the truncation marker.
pub fn is_truncated(s: &str) -> bool {
    s.contains(TRUNCATION_MARKER)
}

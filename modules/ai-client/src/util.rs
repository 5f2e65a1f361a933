/// Truncate a string to at most `max_bytes` bytes at a character boundary.
pub fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    &s[..end]
}

/// Strip markdown code fences from a response.
pub fn strip_code_blocks(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Best-effort recovery of a JSON object from a response that wraps it in
/// prose or code fences. Returns the span from the first `{` to the last `}`.
pub fn extract_json_object(response: &str) -> Option<&str> {
    let stripped = strip_code_blocks(response);
    let start = stripped.find('{')?;
    let end = stripped.rfind('}')?;
    (end > start).then(|| &stripped[start..=end])
}

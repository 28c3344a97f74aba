//! Brace scanning shared by the extractor and the splicer.
//!
//! All positions are byte offsets. Braces are ASCII, so every offset
//! returned here is a valid `str` char boundary.

/// Given the offset of an opening `{`, return the offset of its matching `}`.
pub fn matching_brace(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.get(open) != Some(&b'{') {
        return None;
    }
    let mut depth = 0usize;
    for (i, b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Given the offset of a closing `}`, return the offset of its matching `{`.
pub fn opening_brace(text: &str, close: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.get(close) != Some(&b'}') {
        return None;
    }
    let mut depth = 0usize;
    for i in (0..=close).rev() {
        match bytes[i] {
            b'}' => depth += 1,
            b'{' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Offset of the first non-whitespace byte at or after `from`.
pub fn skip_ws(text: &str, from: usize) -> usize {
    text[from..]
        .find(|c: char| !c.is_whitespace())
        .map(|i| from + i)
        .unwrap_or(text.len())
}

/// Count of `{` and `}` in `text`.
pub fn brace_counts(text: &str) -> (usize, usize) {
    text.bytes().fold((0, 0), |(open, close), b| match b {
        b'{' => (open + 1, close),
        b'}' => (open, close + 1),
        _ => (open, close),
    })
}

//! Small string helpers shared by logging, the store and the scrapers.

/// Truncate a string for logging purposes.
///
/// Long strings are cut after `max` bytes (backing off to the previous
/// character boundary) with an ellipsis and byte count indicator appended.
///
/// # Arguments
///
/// * `s` - The string to potentially truncate
/// * `max` - Maximum number of bytes to keep
///
/// # Returns
///
/// The original string if not longer than `max`, otherwise a truncated
/// version with `"…(+N bytes)"` appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log("a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Canonical form of a highlight tag for searching: trimmed, without the
/// leading `#`, lowercase.
///
/// ```ignore
/// assert_eq!(normalize_tag(" #Bitcoin "), "bitcoin");
/// ```
pub fn normalize_tag(tag: &str) -> String {
    tag.trim().trim_start_matches('#').to_lowercase()
}

/// Hashtag form of a keyword: `Spot ETF` becomes `#SpotETF`.
pub fn hashtag(keyword: &str) -> String {
    let body: String = keyword.chars().filter(|c| !c.is_whitespace()).collect();
    format!("#{body}")
}

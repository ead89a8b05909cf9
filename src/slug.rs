//! Canonical slug form for model and comparison names.
//!
//! Names are stored lowercased with runs of non-alphanumeric characters
//! collapsed to a single hyphen, so `"My Model v2!"` and `"my-model-v2"`
//! refer to the same row.

/// Normalize `input` to its slug form. May return an empty string when the
/// input contains no alphanumeric characters; callers treat that as a
/// validation failure.
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_hyphen = false;
    for c in input.chars() {
        if c.is_alphanumeric() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            for lower in c.to_lowercase() {
                out.push(lower);
            }
        } else {
            pending_hyphen = true;
        }
    }
    out
}

//! Derive a short post title from free text.

pub const DEFAULT_TITLE_LEN: usize = 60;
const FALLBACK: &str = "Untitled Post";

/// First sentence of the first line, cut to `max_len` characters with a
/// trailing `...` when it does not fit.
pub fn smart_title(text: &str, max_len: usize) -> String {
    let first_line = text.split('\n').next().unwrap_or_default().trim();
    let sentence = first_line.split('.').next().unwrap_or_default().trim();
    let candidate = if sentence.is_empty() { first_line } else { sentence };

    let title = if candidate.chars().count() > max_len {
        let cut: String = candidate.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut.trim_end())
    } else {
        candidate.to_string()
    };

    if title.is_empty() {
        FALLBACK.to_string()
    } else {
        title
    }
}

//! Transcription text normalization.

use crate::record::NO_ANSWER;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

/// Anything that is not a Cyrillic letter (а-я, А-Я) or an ASCII digit.
static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^а-яА-Я0-9]").expect("static regex"));

/// Strip characters outside the alphabet, collapse whitespace, lower-case.
/// `None` when nothing is left.
pub fn normalize_text(raw: &str) -> Option<String> {
    let replaced = NON_WORD.replace_all(raw, " ");
    if replaced.trim().is_empty() {
        return None;
    }
    Some(
        replaced
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase(),
    )
}

/// [`normalize_text`] for fresh ASR output. Blank results become [`NO_ANSWER`].
pub fn clean_text(raw: &str) -> String {
    normalize_text(raw).unwrap_or_else(|| {
        warn!("Transcription empty after cleaning; using sentinel");
        NO_ANSWER.to_string()
    })
}

/// Remove `{` and `}` from exported categorical values (`{Сайт}` → `Сайт`).
pub fn remove_braces(value: &str) -> String {
    value.replace(['{', '}'], "")
}

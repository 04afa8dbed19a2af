//! Field-name normalization shared by the format readers.

use regex::Regex;
use std::sync::OnceLock;

/// Name given to values that have no header (extra CSV columns).
pub const EXTRA_FIELD: &str = "_smart_extra";

/// Name produced by an empty header cell.
pub const UNDEFINED_FIELD: &str = "";

/// Case folding applied after stripping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCase {
    /// Always lowercase (csv, json, excel)
    Lower,
    /// Lowercase only names without lowercase letters, preserving mixed
    /// case (jsonl)
    LowerIfAllUpper,
}

fn non_word() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s]").expect("valid regex"))
}

fn whitespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"))
}

/// Strip non-word, non-whitespace characters and replace whitespace runs
/// with `_`. Idempotent.
pub fn normalize_field_name(raw: &str, case: KeyCase) -> String {
    let stripped = non_word().replace_all(raw, "");
    let joined = whitespace().replace_all(&stripped, "_");
    match case {
        KeyCase::Lower => joined.to_lowercase(),
        KeyCase::LowerIfAllUpper if is_upper(&joined) => joined.to_lowercase(),
        KeyCase::LowerIfAllUpper => joined.into_owned(),
    }
}

/// At least one cased character and no lowercase ones.
fn is_upper(s: &str) -> bool {
    s.chars().any(char::is_uppercase) && !s.chars().any(char::is_lowercase)
}

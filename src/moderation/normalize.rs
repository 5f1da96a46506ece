//! Name canonicalisation for moderation.
//!
//! Two stages are exposed because they serve different consumers:
//!
//! - [`clean_name`] trims, truncates and strips disallowed characters. Its
//!   output is what gets submitted to dreamlo.
//! - [`normalize_name`] starts from the cleaned name, then lowercases, folds
//!   leetspeak and collapses whitespace. Its output is only ever compared
//!   against moderation rules.
//!
//! Stripping runs before folding. Symbol look-alikes such as `@` or `$` are
//! removed by the character whitelist, so the fold table only maps digits.

/// Maximum number of characters kept from a submitted name.
pub const MAX_NAME_CHARS: usize = 20;

/// Trim, truncate to [`MAX_NAME_CHARS`] characters and keep only ASCII word
/// characters, whitespace, `-` and `.`.
pub fn clean_name(raw: &str) -> String {
    raw.trim()
        .chars()
        .take(MAX_NAME_CHARS)
        .filter(|&c| is_allowed_char(c))
        .collect()
}

/// Canonical form of `raw` used for moderation comparisons.
pub fn normalize_name(raw: &str) -> String {
    let folded: String = clean_name(raw)
        .chars()
        .flat_map(char::to_lowercase)
        .map(fold_leet)
        .collect();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c.is_whitespace() || c == '-' || c == '.'
}

fn fold_leet(c: char) -> char {
    match c {
        '4' => 'a',
        '0' => 'o',
        '1' => 'i',
        '3' => 'e',
        '5' => 's',
        '7' => 't',
        other => other,
    }
}

//! Glob-style wildcard matching
//!
//! `*` matches any run of characters (including none); every other character
//! is literal. Matching is anchored at both ends. The matcher uses the
//! two-pointer backtracking walk, which is `O(n * m)` in the worst case and
//! never recurses.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// The wildcard token used for absent or "any" fields
pub const WILDCARD: &str = "*";

/// Case handling for literal characters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseSensitivity {
    /// Literal characters must match exactly
    Sensitive,
    /// Literal characters are compared after lower-casing
    #[default]
    Insensitive,
}

impl CaseSensitivity {
    /// Normalize a token for comparison or for use as an index key
    pub fn normalize<'a>(self, value: &'a str) -> Cow<'a, str> {
        match self {
            Self::Sensitive => Cow::Borrowed(value),
            Self::Insensitive if value.chars().any(char::is_uppercase) => {
                Cow::Owned(value.to_lowercase())
            }
            Self::Insensitive => Cow::Borrowed(value),
        }
    }

    /// Whether this mode ignores case
    pub fn is_insensitive(self) -> bool {
        matches!(self, Self::Insensitive)
    }
}

/// Check `candidate` against `pattern`
///
/// ```
/// use abac_authz::wildcard::{matches, CaseSensitivity};
///
/// assert!(matches("orders", "ord*", CaseSensitivity::Sensitive));
/// assert!(matches("a/b/c.txt", "a/*/*.txt", CaseSensitivity::Sensitive));
/// assert!(!matches("Orders", "orders", CaseSensitivity::Sensitive));
/// assert!(matches("Orders", "orders", CaseSensitivity::Insensitive));
/// ```
pub fn matches(candidate: &str, pattern: &str, case: CaseSensitivity) -> bool {
    if is_any(pattern) {
        return true;
    }

    let candidate = case.normalize(candidate);
    let pattern = case.normalize(pattern);

    if !pattern.contains('*') {
        return candidate == pattern;
    }

    let text: Vec<char> = candidate.chars().collect();
    let pat: Vec<char> = pattern.chars().collect();

    let (mut p_idx, mut t_idx) = (0usize, 0usize);
    let (mut star_idx, mut resume_idx) = (None, 0usize);

    while t_idx < text.len() {
        if p_idx < pat.len() && pat[p_idx] == '*' {
            star_idx = Some(p_idx);
            resume_idx = t_idx;
            p_idx += 1;
            continue;
        }

        if p_idx < pat.len() && pat[p_idx] == text[t_idx] {
            p_idx += 1;
            t_idx += 1;
            continue;
        }

        // Let the last star absorb one more character and retry
        if let Some(star) = star_idx {
            p_idx = star + 1;
            resume_idx += 1;
            t_idx = resume_idx;
            continue;
        }

        return false;
    }

    while p_idx < pat.len() && pat[p_idx] == '*' {
        p_idx += 1;
    }

    p_idx == pat.len()
}

/// True for `*`, `**`, ... (a pattern that matches every string)
pub fn is_any(pattern: &str) -> bool {
    !pattern.is_empty() && pattern.chars().all(|c| c == '*')
}

/// True when the value has no wildcard characters at all
pub fn is_literal(value: &str) -> bool {
    !value.contains('*')
}

/// True for patterns like `ord*` that are neither literal nor match-all
pub fn is_partial_glob(pattern: &str) -> bool {
    !is_literal(pattern) && !is_any(pattern)
}

/// Map absent or blank input to the wildcard token
pub fn or_wildcard(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => WILDCARD.to_string(),
    }
}

//! Shell-glob key filtering shared by every store.
//!
//! `*` matches any run of characters (including none) and `?` matches exactly
//! one character. There are no character classes and no escapes.

use wildmatch::WildMatch;

/// Compiled glob pattern.
#[derive(Debug, Clone)]
pub struct Glob(WildMatch);

impl Glob {
    pub fn new(pattern: &str) -> Self {
        Self(WildMatch::new(pattern))
    }

    pub fn matches(&self, key: &str) -> bool {
        self.0.matches(key)
    }
}

/// One-shot match of `key` against `pattern`.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    Glob::new(pattern).matches(key)
}

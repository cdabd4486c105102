//! Cache key definitions.

use std::fmt;

/// Identifies a cached read.
///
/// `AllFlags` is the sentinel for the full listing; any write to any flag
/// must drop it along with the flag's own key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// A single flag by name.
    Flag(String),
    /// The ordered listing of every flag.
    AllFlags,
}

impl CacheKey {
    pub fn flag(name: &str) -> Self {
        Self::Flag(name.to_string())
    }

    /// Metric label for the key's family.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Flag(_) => "flag",
            Self::AllFlags => "all_flags",
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(name) => write!(f, "flag_{name}"),
            Self::AllFlags => f.write_str("__all_flags__"),
        }
    }
}

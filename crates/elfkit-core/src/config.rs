//! Parse and edit options.
//!
//! The read mode can be set via the `ELFKIT_MODE` environment variable:
//! - `tolerant` (default): anomalies in symbol and relocation tables and unresolvable names are
//!   returned as warnings next to the parsed model.
//! - `strict`: the first such warning aborts the parse with [`crate::ElfError::Rejected`].
//!
//! Structural problems (bad magic, tables outside the file) are fatal in both modes.

use serde::Serialize;

/// Environment variable selecting the default [`ReadMode`].
pub const MODE_ENV: &str = "ELFKIT_MODE";

/// How parse warnings are treated.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ReadMode {
    /// Collect warnings and keep going.
    #[default]
    Tolerant,
    /// Promote the first warning to an error.
    Strict,
}

impl ReadMode {
    /// Parse from string (case-insensitive). Unknown values fall back to tolerant.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" | "pedantic" | "reject" => Self::Strict,
            _ => Self::Tolerant,
        }
    }

    #[must_use]
    pub const fn is_strict(self) -> bool {
        matches!(self, Self::Strict)
    }
}

/// Options applied while parsing and editing a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Options {
    pub read_mode: ReadMode,
    /// Reuse existing string table entries (including suffixes) when adding names.
    pub dedup_strings: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            read_mode: ReadMode::Tolerant,
            dedup_strings: true,
        }
    }
}

impl Options {
    /// Defaults, with the read mode taken from `ELFKIT_MODE` when set.
    #[must_use]
    pub fn from_env() -> Self {
        let read_mode = std::env::var(MODE_ENV)
            .map(|v| ReadMode::from_str_loose(&v))
            .unwrap_or_default();
        Self {
            read_mode,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_read_mode(mut self, read_mode: ReadMode) -> Self {
        self.read_mode = read_mode;
        self
    }

    #[must_use]
    pub fn with_dedup_strings(mut self, dedup_strings: bool) -> Self {
        self.dedup_strings = dedup_strings;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_loose() {
        assert_eq!(ReadMode::from_str_loose("strict"), ReadMode::Strict);
        assert_eq!(ReadMode::from_str_loose(" STRICT "), ReadMode::Strict);
        assert_eq!(ReadMode::from_str_loose("pedantic"), ReadMode::Strict);
        assert_eq!(ReadMode::from_str_loose("tolerant"), ReadMode::Tolerant);
        assert_eq!(ReadMode::from_str_loose("lenient"), ReadMode::Tolerant);
        assert_eq!(ReadMode::from_str_loose(""), ReadMode::Tolerant);
    }

    #[test]
    fn test_defaults() {
        let options = Options::default();
        assert_eq!(options.read_mode, ReadMode::Tolerant);
        assert!(options.dedup_strings);
        assert!(!options.read_mode.is_strict());
    }

    #[test]
    fn test_builders() {
        let options = Options::default()
            .with_read_mode(ReadMode::Strict)
            .with_dedup_strings(false);
        assert!(options.read_mode.is_strict());
        assert!(!options.dedup_strings);
    }
}

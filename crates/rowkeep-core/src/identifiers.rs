//! SQL identifier checks and default naming.
//!
//! Statement text embeds table and column names unquoted, so every name that
//! reaches the statement builder must first pass [`is_plain_identifier`].

use std::sync::OnceLock;

use regex::Regex;

const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

fn identifier_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(IDENTIFIER_PATTERN).ok())
        .as_ref()
}

/// Check that `name` is a bare SQL identifier (letters, digits, underscore,
/// not starting with a digit).
///
/// # Examples
///
/// ```
/// use rowkeep_core::is_plain_identifier;
///
/// assert!(is_plain_identifier("person"));
/// assert!(is_plain_identifier("first_name"));
/// assert!(!is_plain_identifier("person; DROP TABLE person"));
/// assert!(!is_plain_identifier("1st"));
/// ```
pub fn is_plain_identifier(name: &str) -> bool {
    identifier_pattern().is_some_and(|re| re.is_match(name))
}

/// Default table or column name for a Rust identifier: its lower-cased form.
///
/// ```
/// use rowkeep_core::default_name;
///
/// assert_eq!(default_name("Person"), "person");
/// assert_eq!(default_name("firstName"), "firstname");
/// ```
#[inline]
pub fn default_name(rust_name: &str) -> String {
    rust_name.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Identifier Checks ====================

    #[test]
    fn test_plain_identifiers() {
        assert!(is_plain_identifier("person"));
        assert!(is_plain_identifier("_hidden"));
        assert!(is_plain_identifier("Order2"));
    }

    #[test]
    fn test_rejects_empty_and_punctuation() {
        assert!(!is_plain_identifier(""));
        assert!(!is_plain_identifier("first name"));
        assert!(!is_plain_identifier("person\""));
        assert!(!is_plain_identifier("a-b"));
        assert!(!is_plain_identifier("x;--"));
    }

    #[test]
    fn test_rejects_leading_digit() {
        assert!(!is_plain_identifier("9lives"));
    }

    // ==================== Default Naming ====================

    #[test]
    fn test_default_name_lowercases() {
        assert_eq!(default_name("BlogPost"), "blogpost");
        assert_eq!(default_name("last_name"), "last_name");
    }
}

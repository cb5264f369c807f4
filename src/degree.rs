//! Interpretation of the flat `degree` column as a school/degree hierarchy.
//!
//! A degree name carries its school as the first whitespace-delimited token
//! ("ETSINF Computer Science" belongs to "ETSINF"). Filtering by school and by
//! a coarser degree name are the same operation: a case-insensitive prefix
//! match on `degree`.

/// School a degree belongs to.
pub fn school_of(degree: &str) -> &str {
    degree.split_whitespace().next().unwrap_or("")
}

/// `LIKE` pattern matching every degree starting with `name`.
///
/// Compare it against a lowercased column; the pattern itself is lowercased.
pub fn prefix_pattern(name: &str) -> String {
    format!("{}%", escape_like(&name.to_lowercase()))
}

/// `LIKE` pattern matching values containing `text` anywhere.
pub fn contains_pattern(text: &str) -> String {
    format!("%{}%", escape_like(&text.to_lowercase()))
}

/// In-process equivalent of matching against [`prefix_pattern`].
pub fn has_prefix(degree: &str, name: &str) -> bool {
    degree.to_lowercase().starts_with(&name.to_lowercase())
}

/// In-process equivalent of matching against [`contains_pattern`].
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

// Postgres uses backslash as the default LIKE escape.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn school_is_first_token() {
        assert_eq!(school_of("ETSINF Computer Science"), "ETSINF");
        assert_eq!(school_of("ETSID"), "ETSID");
        assert_eq!(school_of("  ETSID\tDesign"), "ETSID");
    }

    #[test]
    fn prefix_pattern_is_lowercased_with_wildcard() {
        assert_eq!(prefix_pattern("ETSINF"), "etsinf%");
        assert_eq!(
            prefix_pattern("ETSINF Computer Science"),
            "etsinf computer science%"
        );
    }

    #[test]
    fn like_metacharacters_are_escaped() {
        assert_eq!(prefix_pattern("100%_"), "100\\%\\_%");
        assert_eq!(contains_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn prefix_match_ignores_case() {
        assert!(has_prefix("ETSINF Telecom", "etsinf"));
        assert!(has_prefix("ETSINF Telecom", "ETSINF Telecom"));
        assert!(!has_prefix("ETSID Design", "ETSINF"));
    }

    #[test]
    fn empty_needle_is_contained_everywhere() {
        assert!(contains_ignore_case("Aula 1G", ""));
        assert!(contains_ignore_case("Aula 1G", "aula"));
    }
}

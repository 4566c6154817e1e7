//! UUID utilities

use uuid::Uuid;

/// Generate a new UUIDv4
pub fn generate() -> Uuid {
    Uuid::new_v4()
}

/// Generate a new UUIDv4 in its hyphenated text form
pub fn generate_string() -> String {
    generate().hyphenated().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_strings_round_trip() {
        let text = generate_string();
        assert_eq!(text.len(), 36);
        let parsed = Uuid::parse_str(&text).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
    }

    #[test]
    fn test_generated_values_are_distinct() {
        let ids: HashSet<String> = (0..1000).map(|_| generate_string()).collect();
        assert_eq!(ids.len(), 1000);
    }
}

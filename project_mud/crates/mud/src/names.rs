/// Decides whether a title-cased name may be used for a new character.
pub trait NameRules: Send {
    fn is_valid(&self, name: &str) -> bool;
}

/// Words that read badly as a name or collide with command keywords.
const RESERVED: &[&str] = &[
    "all", "auto", "immortal", "self", "someone", "something", "the", "you", "new", "god",
    "admin", "none",
];

/// Letters only, bounded length, not reserved.
#[derive(Debug, Clone)]
pub struct StandardNameRules {
    pub min_len: usize,
    pub max_len: usize,
}

impl Default for StandardNameRules {
    fn default() -> Self {
        Self {
            min_len: 2,
            max_len: 12,
        }
    }
}

impl NameRules for StandardNameRules {
    fn is_valid(&self, name: &str) -> bool {
        let len = name.chars().count();
        if len < self.min_len || len > self.max_len {
            return false;
        }
        if !name.chars().all(|c| c.is_ascii_alphabetic()) {
            return false;
        }
        !RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
    }
}

/// Lower-case everything, then upper-case the first letter of each word.
pub fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut at_word_start = true;
    for c in input.chars() {
        if c.is_whitespace() {
            at_word_start = true;
            out.push(c);
        } else if at_word_start {
            out.extend(c.to_uppercase());
            at_word_start = false;
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_case_normalizes() {
        assert_eq!(title_case("alice"), "Alice");
        assert_eq!(title_case("aLiCe"), "Alice");
        assert_eq!(title_case("bob the builder"), "Bob The Builder");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn standard_rules() {
        let rules = StandardNameRules::default();
        assert!(rules.is_valid("Alice"));
        assert!(rules.is_valid("Al"));
        assert!(!rules.is_valid("A"));
        assert!(!rules.is_valid("Abcdefghijklm"));
        assert!(!rules.is_valid("Al1ce"));
        assert!(!rules.is_valid("Mary Jane"));
        assert!(!rules.is_valid("Self"));
        assert!(!rules.is_valid("You"));
        assert!(!rules.is_valid(""));
    }
}

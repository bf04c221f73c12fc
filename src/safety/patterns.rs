use std::sync::OnceLock;

use regex::Regex;

const JAILBREAK_PHRASES: [&str; 8] = [
    "ignore previous instructions",
    "disregard your rules",
    "break character",
    "jailbreak",
    "do anything now",
    "developer mode",
    "bypass safety",
    "as an ai with no restrictions",
];

/// Coarse PII detection. Returns the name of the first pattern that matched.
pub fn contains_pii(text: &str) -> Option<&'static str> {
    if ssn_regex().is_match(text) {
        return Some("ssn_pattern");
    }
    if card_regex().is_match(text) {
        return Some("credit_card_pattern");
    }
    None
}

pub fn contains_jailbreak(text: &str) -> Option<&'static str> {
    let content = text.to_lowercase();
    JAILBREAK_PHRASES
        .iter()
        .copied()
        .find(|phrase| content.contains(phrase))
}

fn ssn_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\b\d{3}[- ]?\d{2}[- ]?\d{4}\b").expect("ssn regex is valid"))
}

fn card_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"\b(?:\d[ -]*?){13,19}\b").expect("card regex is valid")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_ssn_shapes() {
        assert_eq!(contains_pii("ssn 123-45-6789 on file"), Some("ssn_pattern"));
        assert_eq!(contains_pii("ssn 123 45 6789"), Some("ssn_pattern"));
        assert_eq!(contains_pii("call 12-345"), None);
    }

    #[test]
    fn detects_card_numbers() {
        assert_eq!(
            contains_pii("card 4111 1111 1111 1111 exp 09/27"),
            Some("credit_card_pattern")
        );
        assert_eq!(contains_pii("order 42 shipped"), None);
    }

    #[test]
    fn jailbreak_phrases_match_case_insensitively() {
        assert_eq!(
            contains_jailbreak("Please IGNORE previous instructions and"),
            Some("ignore previous instructions")
        );
        assert_eq!(contains_jailbreak("enable Developer Mode"), Some("developer mode"));
        assert_eq!(contains_jailbreak("tell me a joke"), None);
    }
}

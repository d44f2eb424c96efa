//! Sign-up input rules for usernames and email addresses.

use std::sync::LazyLock;

use regex::Regex;

pub const USERNAME_MIN_LEN: usize = 5;
pub const USERNAME_MAX_LEN: usize = 20;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"));

static EMOJI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"[\x{1F600}-\x{1F64F}\x{1F300}-\x{1F5FF}\x{1F680}-\x{1F6FF}\x{1F1E0}-\x{1F1FF}\x{2600}-\x{26FF}\x{2700}-\x{27BF}]",
    )
    .expect("valid regex")
});

static USERNAME_CHARS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^[a-zA-Z0-9!@#$%^&*()_+\-=\[\]{};':"\\|,.<>/? ]+$"#).expect("valid regex")
});

const SPECIAL_CHARS: &str = r#"!@#$%^&*()_+-=[]{};':"\|,.<>/?"#;

/// Validate a username, returning every rule it breaks.
pub fn validate_username(username: &str) -> Vec<String> {
    if username.is_empty() {
        return vec!["Username is required".into()];
    }

    let mut errors = Vec::new();
    let len = username.chars().count();
    if len < USERNAME_MIN_LEN {
        errors.push(format!(
            "Username must be at least {USERNAME_MIN_LEN} characters long"
        ));
    }
    if len > USERNAME_MAX_LEN {
        errors.push(format!(
            "Username must be no more than {USERNAME_MAX_LEN} characters long"
        ));
    }
    if EMOJI_RE.is_match(username) {
        errors.push("Username cannot contain emojis".into());
    }
    if username.chars().next().is_some_and(|c| SPECIAL_CHARS.contains(c)) {
        errors.push("Username cannot start with a special character".into());
    }
    if !USERNAME_CHARS_RE.is_match(username) {
        errors.push("Username contains invalid characters".into());
    }
    errors
}

/// Validate an email address, returning every rule it breaks.
pub fn validate_email(email: &str) -> Vec<String> {
    if email.is_empty() {
        return vec!["Email is required".into()];
    }
    if !EMAIL_RE.is_match(email) {
        return vec!["Please enter a valid email address".into()];
    }
    Vec::new()
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Canonical form used for lookups: trimmed and lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_usernames() {
        assert!(validate_username("alice_01").is_empty());
        assert!(validate_username("Jane Doe").is_empty());
    }

    #[test]
    fn length_bounds() {
        assert_eq!(
            validate_username("abc"),
            vec!["Username must be at least 5 characters long"]
        );
        assert_eq!(
            validate_username(&"a".repeat(21)),
            vec!["Username must be no more than 20 characters long"]
        );
    }

    #[test]
    fn emoji_and_foreign_characters_are_rejected() {
        let errors = validate_username("alice\u{1F600}x");
        assert!(errors.contains(&"Username cannot contain emojis".to_string()));
        assert!(errors.contains(&"Username contains invalid characters".to_string()));
        assert_eq!(
            validate_username("jos\u{e9}phine"),
            vec!["Username contains invalid characters"]
        );
    }

    #[test]
    fn leading_special_character_is_rejected() {
        assert_eq!(
            validate_username("_alice"),
            vec!["Username cannot start with a special character"]
        );
    }

    #[test]
    fn empty_username_short_circuits() {
        assert_eq!(validate_username(""), vec!["Username is required"]);
    }

    #[test]
    fn email_rules() {
        assert!(validate_email("a@b.co").is_empty());
        assert_eq!(validate_email(""), vec!["Email is required"]);
        assert_eq!(
            validate_email("a@b"),
            vec!["Please enter a valid email address"]
        );
        assert!(!is_valid_email("a b@c.de"));
    }

    #[test]
    fn email_is_trimmed_and_lowercased() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }
}

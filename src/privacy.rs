//! Advisory screen for payloads that should not leave the machine.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// Category of sensitive content found. Never carries the matched text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensitiveMatch {
    CardNumber,
    SocialSecurityNumber,
    PrivateKey,
    ApiKey,
}

impl SensitiveMatch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CardNumber => "credit card number",
            Self::SocialSecurityNumber => "social security number",
            Self::PrivateKey => "private key",
            Self::ApiKey => "API key",
        }
    }
}

impl fmt::Display for SensitiveMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static CARD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:\d[ -]?){12,18}\d\b").expect("valid card regex")
});
static SSN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("valid ssn regex")
});
static PRIVATE_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"-----BEGIN [A-Z ]*PRIVATE KEY-----")
        .expect("valid private key regex")
});
static API_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bsk-[A-Za-z0-9_-]{20,}|\bAKIA[0-9A-Z]{16}\b")
        .expect("valid api key regex")
});

/// Stateless predicate over outgoing text.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrivacyGate;

impl PrivacyGate {
    pub fn new() -> Self {
        Self
    }

    /// First sensitive category found in `text`, if any.
    pub fn check(&self, text: &str) -> Result<(), SensitiveMatch> {
        if PRIVATE_KEY.is_match(text) {
            return Err(SensitiveMatch::PrivateKey);
        }
        if API_KEY.is_match(text) {
            return Err(SensitiveMatch::ApiKey);
        }
        if SSN.is_match(text) {
            return Err(SensitiveMatch::SocialSecurityNumber);
        }
        if CARD.find_iter(text).any(|m| contains_card(m.as_str())) {
            return Err(SensitiveMatch::CardNumber);
        }
        Ok(())
    }
}

/// True if some 13-19 digit prefix of `candidate` passes Luhn.
///
/// The pattern is greedy, so a trailing group such as a CVV can end up in
/// the same match as the card number.
fn contains_card(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    (13..=digits.len().min(19)).any(|len| luhn_digits(&digits[..len]))
}

/// Luhn checksum over a 13-19 digit card number.
fn luhn_digits(digits: &[u32]) -> bool {
    if !(13..=19).contains(&digits.len()) {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

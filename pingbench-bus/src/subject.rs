use uuid::Uuid;

use crate::{BusError, Result};

const INBOX_PREFIX: &str = "_INBOX";

/// Returns a fresh, globally unique inbox subject.
pub fn new_inbox() -> String {
    format!("{INBOX_PREFIX}.{}", Uuid::new_v4().simple())
}

/// Returns `true` if `subject` is matched by `pattern`.
///
/// `*` matches exactly one token, `>` matches one or more trailing tokens.
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');
    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(">"), Some(_)) => return true,
            (Some("*"), Some(_)) => {}
            (Some(p), Some(s)) if p == s => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Rejects empty subjects, empty tokens and whitespace. Wildcards are only
/// accepted where a subscription pattern is expected, and `>` only as the
/// last token.
pub(crate) fn validate_subject(subject: &str, allow_wildcards: bool) -> Result<()> {
    let invalid = || BusError::InvalidSubject(subject.to_string());
    if subject.is_empty() || subject.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let tokens: Vec<&str> = subject.split('.').collect();
    for (i, token) in tokens.iter().enumerate() {
        match *token {
            "" => return Err(invalid()),
            "*" if !allow_wildcards => return Err(invalid()),
            ">" if !allow_wildcards || i + 1 != tokens.len() => return Err(invalid()),
            _ => {}
        }
    }
    Ok(())
}

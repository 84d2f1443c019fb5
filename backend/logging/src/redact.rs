//! Log Redaction
//!
//! Scrubs provider tokens, store keys, bearer headers and phone numbers before logging.

use regex::Regex;
use std::sync::LazyLock;

static TELEPHONE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?:\+?\d{1,3}[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b").unwrap());
static BEARER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Bearer\s+[a-zA-Z0-9\-\._~+/]+=*").unwrap());
// Replicate tokens
static PROVIDER_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\br8_[A-Za-z0-9]{16,}").unwrap());
// Supabase anon/service-role keys are JWTs
static JWT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\beyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+").unwrap());

/// Redacts sensitive patterns in a string.
pub fn redact_sensitive_data(input: &str) -> String {
    let mut redacted = BEARER_RE.replace_all(input, "[REDACTED_TOKEN]").to_string();
    redacted = PROVIDER_TOKEN_RE.replace_all(&redacted, "[REDACTED_TOKEN]").to_string();
    redacted = JWT_RE.replace_all(&redacted, "[REDACTED_TOKEN]").to_string();
    redacted = TELEPHONE_RE.replace_all(&redacted, "[REDACTED_PHONE]").to_string();
    redacted
}

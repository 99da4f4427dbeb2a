//! Error fingerprinting.
//!
//! Messages are normalized so that errors differing only in ids, counts
//! or quoted values group together: UUIDs become `UUID`, quoted literals
//! become `STRING`, digit runs become `N`. The first stack line that
//! names a source location is appended.

use std::sync::OnceLock;

use regex::Regex;

use crate::logging::ErrorInfo;

fn uuid_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b")
            .expect("uuid pattern is valid")
    })
}

fn quoted_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#""[^"]*"|'[^']*'|`[^`]*`"#).expect("quoted pattern is valid")
    })
}

fn digits_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("digits pattern is valid"))
}

fn location_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[\w./\\-]+\.\w+:\d+(:\d+)?").expect("location pattern is valid")
    })
}

pub fn normalize_message(message: &str) -> String {
    let message = uuid_pattern().replace_all(message, "UUID");
    let message = quoted_pattern().replace_all(&message, "STRING");
    digits_pattern().replace_all(&message, "N").into_owned()
}

/// First stack line carrying a `file.ext:line[:col]` location.
pub fn first_frame(stack: &str) -> Option<String> {
    stack
        .lines()
        .map(str::trim)
        .find(|line| location_pattern().is_match(line))
        .map(str::to_string)
}

/// Grouping key parts: the normalized message, then the first located
/// frame when there is one.
pub fn fingerprint(message: &str, error: &ErrorInfo) -> Vec<String> {
    let mut parts = vec![normalize_message(message)];
    if let Some(frame) = error.stack.as_deref().and_then(first_frame) {
        parts.push(frame);
    }
    parts
}

pub fn fingerprint_key(parts: &[String]) -> String {
    parts.join("|")
}

//! Correlation identifier generation and validation.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use rand::rngs::OsRng;
use rand::RngCore;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::{Builder, Uuid};

/// Header name used to carry the id across process boundaries.
pub const X_CORRELATION_ID: &str = "x-correlation-id";

/// Errors raised when mutating correlation state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CorrelationError {
    #[error("invalid correlation id format: {0:?}")]
    InvalidFormat(String),
}

/// A validated UUID-v4 correlation identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CorrelationId(Uuid);

fn uuid_v4_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$")
            .expect("static uuid pattern compiles")
    })
}

impl CorrelationId {
    /// Generate a fresh id.
    ///
    /// Bytes come from the OS CSPRNG; if that source is unavailable a
    /// non-cryptographic generator is used instead and a warning is logged.
    /// Never fails.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        let secure = OsRng.try_fill_bytes(&mut bytes).map(|_| bytes);
        Self::from_random(secure)
    }

    fn from_random<E: fmt::Display>(secure: Result<[u8; 16], E>) -> Self {
        let bytes = match secure {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "Secure random source unavailable, using non-cryptographic fallback for correlation id");
                let mut bytes = [0u8; 16];
                fastrand::fill(&mut bytes);
                bytes
            }
        };
        // Builder forces the version (4) and variant (RFC 4122) bits.
        Self(Builder::from_random_bytes(bytes).into_uuid())
    }

    /// Structural check for the UUID-v4 text form.
    pub fn validate(candidate: &str) -> bool {
        candidate.len() == 36 && uuid_v4_pattern().is_match(candidate)
    }

    /// Parse a string, rejecting anything `validate` rejects.
    pub fn parse(candidate: &str) -> Result<Self, CorrelationError> {
        if !Self::validate(candidate) {
            return Err(CorrelationError::InvalidFormat(candidate.to_string()));
        }
        Uuid::parse_str(candidate)
            .map(Self)
            .map_err(|_| CorrelationError::InvalidFormat(candidate.to_string()))
    }

    /// Take the id from an inbound header value, or start a new one.
    pub fn from_header(value: Option<&str>) -> Self {
        value
            .and_then(|v| Self::parse(v.trim()).ok())
            .unwrap_or_else(Self::generate)
    }

    /// A new id that shares this id's first segment, so related operations
    /// group together without a full hierarchy.
    pub fn child(&self) -> Self {
        let fresh = Self::generate();
        let mut bytes = *fresh.0.as_bytes();
        bytes[..4].copy_from_slice(&self.0.as_bytes()[..4]);
        Self(Uuid::from_bytes(bytes))
    }

    /// First hyphen-delimited segment (8 hex chars).
    pub fn prefix(&self) -> String {
        self.to_string()[..8].to_string()
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for CorrelationId {
    type Err = CorrelationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CorrelationId {
    type Error = CorrelationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CorrelationId> for String {
    fn from(id: CorrelationId) -> Self {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_generated_ids_validate() {
        for _ in 0..100 {
            let id = CorrelationId::generate();
            let text = id.to_string();
            assert!(CorrelationId::validate(&text), "{text}");
            assert_eq!(text, text.to_lowercase());
            assert_eq!(&text[14..15], "4");
        }
    }

    #[test]
    fn test_fallback_generator_still_valid() {
        let id = CorrelationId::from_random::<&str>(Err("no entropy"));
        assert!(CorrelationId::validate(&id.to_string()));
    }

    #[test]
    fn test_rejects_wrong_version_and_variant() {
        // version 1
        assert!(!CorrelationId::validate("123e4567-e89b-12d3-a456-426614174000"));
        // variant nibble 'c'
        assert!(!CorrelationId::validate("123e4567-e89b-42d3-c456-426614174000"));
        assert!(!CorrelationId::validate(""));
        assert!(!CorrelationId::validate("not-a-uuid"));
        assert!(!CorrelationId::validate("123e4567-e89b-42d3-a456-4266141740001"));
        assert!(CorrelationId::validate("123e4567-e89b-42d3-a456-426614174000"));
    }

    #[test]
    fn test_parse_error() {
        let err = CorrelationId::parse("abc").unwrap_err();
        assert_eq!(err, CorrelationError::InvalidFormat("abc".into()));
        assert!(err.to_string().contains("invalid correlation id"));
    }

    #[test]
    fn test_child_shares_prefix() {
        let parent = CorrelationId::generate();
        let child = parent.child();
        assert_ne!(parent, child);
        assert_eq!(parent.prefix(), child.prefix());
        assert!(CorrelationId::validate(&child.to_string()));
    }

    #[test]
    fn test_from_header() {
        let known = "123e4567-e89b-42d3-a456-426614174000";
        assert_eq!(CorrelationId::from_header(Some(known)).to_string(), known);
        let fresh = CorrelationId::from_header(Some("garbage"));
        assert!(CorrelationId::validate(&fresh.to_string()));
    }

    #[test]
    fn test_serde_roundtrip_rejects_invalid() {
        let id = CorrelationId::generate();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(serde_json::from_str::<CorrelationId>(&json).unwrap(), id);
        assert!(serde_json::from_str::<CorrelationId>("\"nope\"").is_err());
    }

    proptest! {
        #[test]
        fn prop_non_uuid_strings_rejected(s in "[a-z0-9-]{0,40}") {
            prop_assume!(!uuid_v4_pattern().is_match(&s));
            prop_assert!(!CorrelationId::validate(&s));
        }
    }
}

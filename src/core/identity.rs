//! Import session identity using prefixed ULIDs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use ulid::Ulid;

/// Prefix carried by every session identifier
pub const SESSION_PREFIX: &str = "IMP";

/// An opaque import session identifier (`IMP-<ULID>`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId {
    ulid: Ulid,
}

impl SessionId {
    /// Create a fresh session identifier
    pub fn new() -> Self {
        Self { ulid: Ulid::new() }
    }

    /// Create a SessionId from an existing ULID
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self { ulid }
    }

    /// Get the ULID component
    pub fn ulid(&self) -> Ulid {
        self.ulid
    }

    /// Parse a SessionId from a string
    ///
    /// The bare ULID is accepted as well as the prefixed form.
    pub fn parse(s: &str) -> Result<Self, SessionIdError> {
        s.parse()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", SESSION_PREFIX, self.ulid)
    }
}

impl FromStr for SessionId {
    type Err = SessionIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let ulid_str = match s.split_once('-') {
            Some((prefix, rest)) => {
                if !prefix.eq_ignore_ascii_case(SESSION_PREFIX) {
                    return Err(SessionIdError::InvalidPrefix(prefix.to_string()));
                }
                rest
            }
            None => s,
        };

        let ulid = Ulid::from_string(ulid_str)
            .map_err(|e| SessionIdError::InvalidUlid(ulid_str.to_string(), e.to_string()))?;

        Ok(Self { ulid })
    }
}

impl Serialize for SessionId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors that can occur when parsing session IDs
#[derive(Debug, Error)]
pub enum SessionIdError {
    #[error("invalid session prefix: '{0}' (expected {SESSION_PREFIX})")]
    InvalidPrefix(String),

    #[error("invalid ULID '{0}': {1}")]
    InvalidUlid(String, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_generation() {
        let id = SessionId::new();
        assert!(id.to_string().starts_with("IMP-"));
        assert_eq!(id.to_string().len(), 30); // IMP- (4) + ULID (26)
    }

    #[test]
    fn test_session_id_parsing() {
        let original = SessionId::new();
        let parsed = SessionId::parse(&original.to_string()).unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn test_session_id_accepts_bare_ulid() {
        let original = SessionId::new();
        let parsed = SessionId::parse(&original.ulid().to_string()).unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn test_session_id_is_case_insensitive_on_prefix() {
        let original = SessionId::new();
        let lower = original.to_string().replacen("IMP", "imp", 1);
        assert_eq!(SessionId::parse(&lower).unwrap(), original);
    }

    #[test]
    fn test_session_id_invalid_prefix() {
        let err = SessionId::parse("REQ-01HQ3K4N5M6P7R8S9T0VWXYZ12").unwrap_err();
        assert!(matches!(err, SessionIdError::InvalidPrefix(_)));
    }

    #[test]
    fn test_session_id_invalid_ulid() {
        let err = SessionId::parse("IMP-notaulid").unwrap_err();
        assert!(matches!(err, SessionIdError::InvalidUlid(_, _)));
    }

    #[test]
    fn test_session_id_serde() {
        let id = SessionId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        let back: SessionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}

//! Protocol error codes
//!
//! Codes travel as bare integers inside `error` bodies:
//! - 0..=9: transport-level conditions (timeouts, unknown nodes)
//! - 10..=19: request-level conditions (unsupported, malformed, crash)

use serde::{Deserialize, Serialize};

/// Error code carried by an `error` reply
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    /// The request timed out before a reply was produced
    Timeout = 0,

    /// The destination node does not exist
    NodeNotFound = 1,

    /// The request type is not handled by this node
    NotSupported = 10,

    /// The node cannot serve the request right now (e.g. before `init`)
    TemporarilyUnavailable = 11,

    /// The request was understood but its fields are missing or mistyped
    MalformedRequest = 12,

    /// The node hit an internal failure and cannot continue
    Crash = 13,
}

impl ErrorCode {
    /// Parse from wire integer
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(ErrorCode::Timeout),
            1 => Some(ErrorCode::NodeNotFound),
            10 => Some(ErrorCode::NotSupported),
            11 => Some(ErrorCode::TemporarilyUnavailable),
            12 => Some(ErrorCode::MalformedRequest),
            13 => Some(ErrorCode::Crash),
            _ => None,
        }
    }

    /// Convert to wire integer
    #[inline]
    pub fn to_code(self) -> u16 {
        self as u16
    }
}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> Self {
        code.to_code()
    }
}

impl TryFrom<u16> for ErrorCode {
    type Error = String;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        ErrorCode::from_code(code).ok_or_else(|| format!("unknown error code {code}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_roundtrip() {
        for code in [0u16, 1, 10, 11, 12, 13] {
            let parsed = ErrorCode::from_code(code).unwrap();
            assert_eq!(parsed.to_code(), code);
        }
    }

    #[test]
    fn test_unknown_code_rejected() {
        assert!(ErrorCode::from_code(2).is_none());
        assert!(serde_json::from_str::<ErrorCode>("99").is_err());
    }

    #[test]
    fn test_code_serializes_as_integer() {
        let json = serde_json::to_string(&ErrorCode::MalformedRequest).unwrap();
        assert_eq!(json, "12");
    }
}

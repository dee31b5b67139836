//! Wire messages exchanged with the game server and the reply classifier.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ProbeError;

/// Error code the server uses for unknown or expired session tokens.
pub const INVALID_TOKEN: &str = "INVALID_TOKEN";

/// Client → Server command envelope.
///
/// Serializes to
/// `{"kind":"cmd","type":"auth","data":{"token":"…"},"cid":"…"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandMessage {
    /// Always `"cmd"`.
    pub kind: &'static str,
    /// Command name.
    #[serde(rename = "type")]
    pub cmd_type: String,
    /// Command parameters.
    pub data: AuthData,
    /// Client correlation id, echoed back by the server.
    pub cid: String,
}

/// Parameters of the `auth` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthData {
    /// Session token to authenticate with.
    pub token: String,
}

impl CommandMessage {
    /// Builds the `auth` command.
    #[must_use]
    pub fn auth(token: impl Into<String>, cid: impl Into<String>) -> Self {
        Self {
            kind: "cmd",
            cmd_type: "auth".to_string(),
            data: AuthData {
                token: token.into(),
            },
            cid: cid.into(),
        }
    }

    /// Encodes the command as a JSON text frame payload.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Encode`] if serialization fails.
    pub fn to_json(&self) -> Result<String, ProbeError> {
        serde_json::to_string(self).map_err(ProbeError::Encode)
    }
}

/// Server → Client reply.
///
/// Only the fields the classifier looks at are lifted out; anything else the
/// server sends is ignored here and appears in the raw frame log line.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseMessage {
    /// `ack`, `err`, `evt`, or anything else the server sends.
    pub kind: Option<String>,
    /// Echo of the command type on `ack`.
    pub msg_type: Option<String>,
    /// Error classification on `err`.
    pub code: Option<String>,
    /// Correlation id, when the server echoes one.
    pub cid: Option<String>,
}

impl ResponseMessage {
    /// Parses a text frame as a JSON object.
    ///
    /// `code` is read from the top level first, then from `data.code`, which
    /// is where the server's error envelope puts it.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Parse`] if `text` is not a JSON object.
    pub fn parse(text: &str) -> Result<Self, ProbeError> {
        let fields: Map<String, Value> = serde_json::from_str(text).map_err(ProbeError::Parse)?;

        let string_field = |key: &str| fields.get(key).and_then(Value::as_str).map(str::to_owned);
        let code = string_field("code").or_else(|| {
            fields
                .get("data")
                .and_then(|data| data.get("code"))
                .and_then(Value::as_str)
                .map(str::to_owned)
        });

        Ok(Self {
            kind: string_field("kind"),
            msg_type: string_field("type"),
            code,
            cid: string_field("cid"),
        })
    }

    /// Applies the classification rules, in order.
    #[must_use]
    pub fn classify(&self) -> Option<Verdict> {
        match (self.kind.as_deref(), self.code.as_deref(), self.msg_type.as_deref()) {
            (Some("err"), Some(INVALID_TOKEN), _) => Some(Verdict::Rejected),
            (Some("ack"), _, Some("auth")) => Some(Verdict::Authenticated),
            _ => None,
        }
    }
}

/// Outcome of the authentication exchange as observed by the probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The server rejected the test token. This is the expected pass
    /// condition when probing with a placeholder credential.
    Rejected,
    /// The server accepted the token.
    Authenticated,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rejected => f.write_str("expected token rejection"),
            Self::Authenticated => f.write_str("authenticated"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn parse(text: &str) -> ResponseMessage {
        let Ok(msg) = ResponseMessage::parse(text) else {
            panic!("expected {text} to parse");
        };
        msg
    }

    #[test]
    fn auth_command_wire_shape() {
        let Ok(json) = CommandMessage::auth("test-token-123", "auth-test-1").to_json() else {
            panic!("encoding failed");
        };
        assert_eq!(
            json,
            r#"{"kind":"cmd","type":"auth","data":{"token":"test-token-123"},"cid":"auth-test-1"}"#
        );
    }

    #[test]
    fn invalid_token_is_rejection() {
        let msg = parse(r#"{"kind":"err","code":"INVALID_TOKEN"}"#);
        assert_eq!(msg.classify(), Some(Verdict::Rejected));
    }

    #[test]
    fn nested_error_code_is_rejection() {
        let msg = parse(
            r#"{"kind":"err","type":"error","cid":"auth-test-1","data":{"code":"INVALID_TOKEN","message":"expired"}}"#,
        );
        assert_eq!(msg.classify(), Some(Verdict::Rejected));
        assert_eq!(msg.cid.as_deref(), Some("auth-test-1"));
    }

    #[test]
    fn auth_ack_is_success() {
        let msg = parse(r#"{"kind":"ack","type":"auth","data":{"userId":7}}"#);
        assert_eq!(msg.classify(), Some(Verdict::Authenticated));
    }

    #[test]
    fn other_shapes_are_unclassified() {
        for text in [
            r#"{"foo":"bar"}"#,
            r#"{"kind":"err","code":"AUTH_REQUIRED"}"#,
            r#"{"kind":"ack","type":"ping"}"#,
            r#"{"kind":"evt","type":"auth"}"#,
            r#"{"type":"connected","data":{"sessionId":"s1"}}"#,
            r#"{"kind":7,"code":"INVALID_TOKEN"}"#,
        ] {
            assert_eq!(parse(text).classify(), None, "{text}");
        }
    }

    #[test]
    fn top_level_code_wins_over_nested() {
        let msg = parse(r#"{"kind":"err","code":"RATE_LIMITED","data":{"code":"INVALID_TOKEN"}}"#);
        assert_eq!(msg.code.as_deref(), Some("RATE_LIMITED"));
        assert_eq!(msg.classify(), None);
    }

    #[test]
    fn non_objects_fail_to_parse() {
        for text in ["not json", "[1,2]", "\"ack\"", ""] {
            assert!(
                matches!(ResponseMessage::parse(text), Err(ProbeError::Parse(_))),
                "{text}"
            );
        }
    }

    #[test]
    fn extra_fields_do_not_affect_classification() {
        let msg = parse(
            r#"{"kind":"ack","type":"auth","messageId":"m-1","timestamp":"2024-01-01T00:00:00","data":{"code":"INVALID_TOKEN"}}"#,
        );
        assert_eq!(msg.classify(), Some(Verdict::Authenticated));
        assert_eq!(msg.cid, None);
    }
}

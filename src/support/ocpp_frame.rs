//! OCPP-J message framing
//!
//! - **Call**       `[2, "<uniqueId>", "<action>", {<payload>}]`
//! - **CallResult** `[3, "<uniqueId>", {<payload>}]`
//! - **CallError**  `[4, "<uniqueId>", "<errorCode>", "<errorDescription>", {<errorDetails>}]`

use serde_json::{Map, Value};
use std::fmt;

// ── Message-type constants ─────────────────────────────────────

const MSG_TYPE_CALL: u64 = 2;
const MSG_TYPE_CALL_RESULT: u64 = 3;
const MSG_TYPE_CALL_ERROR: u64 = 4;

/// Every frame carries at least a type, an id and one more element.
const MIN_FRAME_LEN: usize = 3;

/// Correlation id used when none can be recovered from a broken frame.
pub const UNKNOWN_UNIQUE_ID: &str = "unknown";

// ── OcppFrame ──────────────────────────────────────────────────

/// A parsed OCPP-J frame.
#[derive(Debug, Clone, PartialEq)]
pub enum OcppFrame {
    /// `[2, uniqueId, action, payload]`
    Call {
        unique_id: String,
        action: String,
        payload: Value,
    },
    /// `[3, uniqueId, payload]`
    CallResult { unique_id: String, payload: Value },
    /// `[4, uniqueId, errorCode, errorDescription, errorDetails]`
    CallError {
        unique_id: String,
        error_code: String,
        error_description: String,
        error_details: Value,
    },
}

impl OcppFrame {
    // ── Parsing ────────────────────────────────────────────

    /// Parse a raw JSON text into an `OcppFrame`.
    pub fn parse(text: &str) -> Result<Self, OcppFrameError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| OcppFrameError::InvalidJson(e.to_string()))?;

        let arr = value.as_array().ok_or(OcppFrameError::NotAnArray)?;

        if arr.len() < MIN_FRAME_LEN {
            return Err(OcppFrameError::MissingFields {
                expected: MIN_FRAME_LEN,
                got: arr.len(),
            });
        }

        let msg_type = arr[0].as_u64().ok_or(OcppFrameError::InvalidMessageType)?;
        let unique_id = arr[1]
            .as_str()
            .ok_or(OcppFrameError::FieldTypeMismatch("uniqueId must be a string"))?
            .to_string();

        match msg_type {
            MSG_TYPE_CALL => Self::parse_call(unique_id, arr),
            MSG_TYPE_CALL_RESULT => Ok(Self::CallResult {
                unique_id,
                payload: arr[2].clone(),
            }),
            MSG_TYPE_CALL_ERROR => Ok(Self::parse_call_error(unique_id, arr)),
            _ => Err(OcppFrameError::UnknownMessageType(msg_type)),
        }
    }

    fn parse_call(unique_id: String, arr: &[Value]) -> Result<Self, OcppFrameError> {
        let action = arr[2]
            .as_str()
            .ok_or(OcppFrameError::FieldTypeMismatch("action must be a string"))?
            .to_string();

        // A CALL without payload is treated as an empty object.
        let payload = match arr.get(3) {
            None => Value::Object(Map::new()),
            Some(Value::Object(obj)) => Value::Object(obj.clone()),
            Some(_) => {
                return Err(OcppFrameError::FieldTypeMismatch(
                    "payload must be an object",
                ))
            }
        };

        Ok(Self::Call {
            unique_id,
            action,
            payload,
        })
    }

    fn parse_call_error(unique_id: String, arr: &[Value]) -> Self {
        let error_code = arr[2].as_str().unwrap_or("InternalError").to_string();
        let error_description = arr
            .get(3)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let error_details = arr
            .get(4)
            .cloned()
            .unwrap_or(Value::Object(Map::new()));

        Self::CallError {
            unique_id,
            error_code,
            error_description,
            error_details,
        }
    }

    /// Best-effort recovery of the uniqueId from text that failed to parse.
    ///
    /// Takes the second array element when it is a string or a number,
    /// otherwise [`UNKNOWN_UNIQUE_ID`].
    pub fn recover_unique_id(text: &str) -> String {
        let Ok(Value::Array(arr)) = serde_json::from_str::<Value>(text) else {
            return UNKNOWN_UNIQUE_ID.to_string();
        };

        match arr.get(1) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => UNKNOWN_UNIQUE_ID.to_string(),
        }
    }

    // ── Serialization ──────────────────────────────────────

    /// Serialize this frame to a JSON string.
    pub fn serialize(&self) -> String {
        let arr = match self {
            Self::Call {
                unique_id,
                action,
                payload,
            } => vec![
                Value::from(MSG_TYPE_CALL),
                Value::String(unique_id.clone()),
                Value::String(action.clone()),
                payload.clone(),
            ],

            Self::CallResult { unique_id, payload } => vec![
                Value::from(MSG_TYPE_CALL_RESULT),
                Value::String(unique_id.clone()),
                payload.clone(),
            ],

            Self::CallError {
                unique_id,
                error_code,
                error_description,
                error_details,
            } => vec![
                Value::from(MSG_TYPE_CALL_ERROR),
                Value::String(unique_id.clone()),
                Value::String(error_code.clone()),
                Value::String(error_description.clone()),
                error_details.clone(),
            ],
        };

        Value::Array(arr).to_string()
    }

    // ── Helpers ────────────────────────────────────────────

    /// Get the unique message ID.
    pub fn unique_id(&self) -> &str {
        match self {
            Self::Call { unique_id, .. }
            | Self::CallResult { unique_id, .. }
            | Self::CallError { unique_id, .. } => unique_id,
        }
    }

    /// Create a `CallResult` for a given unique ID.
    pub fn result(unique_id: impl Into<String>, payload: Value) -> Self {
        Self::CallResult {
            unique_id: unique_id.into(),
            payload,
        }
    }

    /// Create a `CallError` response for a given unique ID.
    pub fn error_response(
        unique_id: impl Into<String>,
        error_code: impl Into<String>,
        error_description: impl Into<String>,
    ) -> Self {
        Self::CallError {
            unique_id: unique_id.into(),
            error_code: error_code.into(),
            error_description: error_description.into(),
            error_details: Value::Object(Map::new()),
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self, Self::Call { .. })
    }
}

// ── Errors ─────────────────────────────────────────────────────

/// Errors that can occur when parsing an OCPP-J frame.
#[derive(Debug, Clone, PartialEq)]
pub enum OcppFrameError {
    InvalidJson(String),
    NotAnArray,
    InvalidMessageType,
    UnknownMessageType(u64),
    MissingFields { expected: usize, got: usize },
    FieldTypeMismatch(&'static str),
}

impl fmt::Display for OcppFrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidJson(msg) => write!(f, "Invalid JSON: {}", msg),
            Self::NotAnArray => write!(f, "OCPP message is not a JSON array"),
            Self::InvalidMessageType => write!(f, "Message type is not a number"),
            Self::UnknownMessageType(t) => write!(f, "Unknown message type: {}", t),
            Self::MissingFields { expected, got } => {
                write!(f, "Expected at least {} fields, got {}", expected, got)
            }
            Self::FieldTypeMismatch(msg) => write!(f, "Field type mismatch: {}", msg),
        }
    }
}

impl std::error::Error for OcppFrameError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_call() {
        let text = r#"[2,"abc123","BootNotification",{"chargePointVendor":"Vendor","chargePointModel":"Model"}]"#;
        match OcppFrame::parse(text).unwrap() {
            OcppFrame::Call {
                unique_id,
                action,
                payload,
            } => {
                assert_eq!(unique_id, "abc123");
                assert_eq!(action, "BootNotification");
                assert_eq!(payload["chargePointVendor"], "Vendor");
            }
            other => panic!("Expected Call frame, got {:?}", other),
        }
    }

    #[test]
    fn call_without_payload_gets_empty_object() {
        match OcppFrame::parse(r#"[2,"7","Heartbeat"]"#).unwrap() {
            OcppFrame::Call { payload, .. } => assert_eq!(payload, serde_json::json!({})),
            other => panic!("Expected Call frame, got {:?}", other),
        }
    }

    #[test]
    fn call_with_non_object_payload_is_rejected() {
        let err = OcppFrame::parse(r#"[2,"7","Heartbeat",[1,2]]"#).unwrap_err();
        assert!(matches!(err, OcppFrameError::FieldTypeMismatch(_)));
    }

    #[test]
    fn parse_call_error_with_defaults() {
        match OcppFrame::parse(r#"[4,"abc123","NotImplemented"]"#).unwrap() {
            OcppFrame::CallError {
                unique_id,
                error_code,
                error_description,
                error_details,
            } => {
                assert_eq!(unique_id, "abc123");
                assert_eq!(error_code, "NotImplemented");
                assert_eq!(error_description, "");
                assert_eq!(error_details, serde_json::json!({}));
            }
            other => panic!("Expected CallError frame, got {:?}", other),
        }
    }

    #[test]
    fn short_or_non_array_messages_fail() {
        assert!(matches!(
            OcppFrame::parse(r#"[2,"1"]"#),
            Err(OcppFrameError::MissingFields { expected: 3, got: 2 })
        ));
        assert_eq!(
            OcppFrame::parse(r#"{"a":1}"#).unwrap_err(),
            OcppFrameError::NotAnArray
        );
        assert!(matches!(
            OcppFrame::parse("not json"),
            Err(OcppFrameError::InvalidJson(_))
        ));
        assert_eq!(
            OcppFrame::parse(r#"[9,"1",{}]"#).unwrap_err(),
            OcppFrameError::UnknownMessageType(9)
        );
    }

    #[test]
    fn recover_unique_id_best_effort() {
        assert_eq!(OcppFrame::recover_unique_id(r#"[2,"42"]"#), "42");
        assert_eq!(OcppFrame::recover_unique_id(r#"[2,17,"X",{}]"#), "17");
        assert_eq!(OcppFrame::recover_unique_id(r#"[2]"#), UNKNOWN_UNIQUE_ID);
        assert_eq!(OcppFrame::recover_unique_id("garbage"), UNKNOWN_UNIQUE_ID);
        assert_eq!(OcppFrame::recover_unique_id(r#"{"id":"1"}"#), UNKNOWN_UNIQUE_ID);
    }

    #[test]
    fn serialize_call_error() {
        let frame = OcppFrame::error_response("id3", "NotSupported", "Unknown action");
        assert_eq!(
            frame.serialize(),
            r#"[4,"id3","NotSupported","Unknown action",{}]"#
        );
    }

    #[test]
    fn serialized_call_parses_back() {
        let frame = OcppFrame::Call {
            unique_id: "id1".into(),
            action: "Reset".into(),
            payload: serde_json::json!({"type": "Soft"}),
        };
        let parsed = OcppFrame::parse(&frame.serialize()).unwrap();
        assert!(parsed.is_call());
        assert_eq!(parsed, frame);
    }
}

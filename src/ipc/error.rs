//! Response lines written to stdout, one per request.

use serde::Serialize;
use serde_json::Value as JsonValue;

#[derive(Debug, Serialize)]
struct WireError<'a> {
    code: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<JsonValue>,
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<WireError<'a>>,
}

impl Envelope<'_> {
    fn into_json(self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

pub fn ok(id: &str, result: JsonValue) -> JsonValue {
    Envelope {
        id: Some(id),
        ok: true,
        result: Some(result),
        error: None,
    }
    .into_json()
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<JsonValue>,
) -> JsonValue {
    Envelope {
        id: Some(id),
        ok: false,
        result: None,
        error: Some(WireError {
            code,
            message: message.into(),
            details,
        }),
    }
    .into_json()
}

/// Answer to a line that did not parse; there is no id to echo.
pub fn bad_json(message: impl Into<String>) -> JsonValue {
    Envelope {
        id: None,
        ok: false,
        result: None,
        error: Some(WireError {
            code: "bad_json",
            message: message.into(),
            details: None,
        }),
    }
    .into_json()
}

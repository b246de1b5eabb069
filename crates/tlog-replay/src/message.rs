//! tlog message parsing and field validation.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{ReplayError, Result};
use crate::journal::MessageData;

/// Newest message format major version understood here.
pub const MAX_MAJOR_VERSION: u32 = 2;

static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\.(\d+)$").expect("version pattern is a valid regex")
});

/// One tlog log record.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Format version as (major, minor).
    pub version: (u32, u32),
    /// Message number within the session.
    pub id: u64,
    /// Milliseconds from recording start.
    pub pos: u64,
    /// Timing string.
    pub timing: String,
    /// Input text pool.
    pub in_txt: String,
    /// Output text pool.
    pub out_txt: String,
    /// Host description, passed through.
    pub host: Option<Value>,
    /// Recording ID, passed through.
    pub rec: Option<Value>,
    /// User name, passed through.
    pub user: Option<Value>,
    /// Terminal type, passed through.
    pub term: Option<Value>,
    /// Audit session ID, passed through.
    pub session: Option<Value>,
}

/// Decode a `MESSAGE` container into a JSON object.
///
/// Failures here mean the transport handed over something that is not a
/// tlog message at all, so they come back as stream errors.
pub fn parse_container(data: &MessageData) -> Result<Map<String, Value>> {
    let text = match data {
        MessageData::Text(text) => text.as_str(),
        MessageData::Bytes(bytes) => std::str::from_utf8(bytes)
            .map_err(|e| ReplayError::stream(format!("message is not valid UTF-8: {e}")))?,
    };
    match serde_json::from_str(text) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(other) => Err(ReplayError::stream(format!(
            "message is not a JSON object: {}",
            json_type(&other)
        ))),
        Err(e) => Err(ReplayError::stream(format!("message is not valid JSON: {e}"))),
    }
}

/// Name of a JSON value's type, for error messages.
#[must_use]
pub const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn field<'a>(object: &'a Map<String, Value>, name: &'static str) -> Result<&'a Value> {
    object
        .get(name)
        .ok_or(ReplayError::FieldMissing { field: name })
}

fn string_field(object: &Map<String, Value>, name: &'static str) -> Result<String> {
    match field(object, name)? {
        Value::String(s) => Ok(s.clone()),
        other => Err(ReplayError::FieldTypeMismatch {
            field: name,
            found: json_type(other),
        }),
    }
}

fn integer_field(object: &Map<String, Value>, name: &'static str) -> Result<u64> {
    let value = field(object, name)?;
    value.as_u64().ok_or(ReplayError::FieldTypeMismatch {
        field: name,
        found: json_type(value),
    })
}

/// Parse a `major.minor` version string.
pub fn parse_version(version: &str) -> Result<(u32, u32)> {
    let unsupported = || ReplayError::UnsupportedVersion {
        version: version.to_string(),
    };
    let caps = VERSION_PATTERN.captures(version).ok_or_else(unsupported)?;
    let major: u32 = caps[1].parse().map_err(|_| unsupported())?;
    let minor: u32 = caps[2].parse().map_err(|_| unsupported())?;
    if major > MAX_MAJOR_VERSION {
        return Err(unsupported());
    }
    Ok((major, minor))
}

impl Message {
    /// Validate and extract the fields of a decoded message object.
    pub fn from_object(object: &Map<String, Value>) -> Result<Self> {
        let version = parse_version(&string_field(object, "ver")?)?;
        Ok(Self {
            version,
            id: integer_field(object, "id")?,
            pos: integer_field(object, "pos")?,
            timing: string_field(object, "timing")?,
            in_txt: string_field(object, "in_txt")?,
            out_txt: string_field(object, "out_txt")?,
            host: object.get("host").cloned(),
            rec: object.get("rec").cloned(),
            user: object.get("user").cloned(),
            term: object.get("term").cloned(),
            session: object.get("session").cloned(),
        })
    }

    /// Parse a message straight from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        Self::from_object(&parse_container(&MessageData::from(text))?)
    }
}

//! Recovery of tool intent written as plain text
//!
//! Some models answer with `{"name": ..., "parameters": ...}` in the reply
//! body instead of using structured tool calls. Only that exact shape is
//! promoted, and only for a registered tool; anything else stays ordinary
//! text.

use serde_json::Value;

use crate::models::ToolCall;
use crate::tools::ToolKind;

/// Correlation id given to a recovered call.
pub const RECOVERED_CALL_ID: &str = "manual_call";

pub fn recover_tool_call(content: &str) -> Option<ToolCall> {
    let trimmed = content.trim();
    if !trimmed.starts_with('{') {
        return None;
    }

    let parsed: Value = serde_json::from_str(trimmed).ok()?;
    let fields = parsed.as_object()?;

    let name = fields.get("name")?.as_str()?.trim();
    let kind = ToolKind::from_name(name)?;

    let args = match fields.get("parameters")? {
        Value::Object(map) => Value::Object(map.clone()),
        // Parameters may arrive JSON-encoded a second time.
        Value::String(encoded) => match serde_json::from_str::<Value>(encoded).ok()? {
            decoded @ Value::Object(_) => decoded,
            _ => return None,
        },
        _ => return None,
    };

    Some(ToolCall {
        id: RECOVERED_CALL_ID.to_string(),
        name: kind.name().to_string(),
        args,
    })
}

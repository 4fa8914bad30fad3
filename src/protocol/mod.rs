//! Vendor parser/emitter pairs and the normalization tables they share.

pub mod anthropic;
pub mod gemini;
pub mod mapping;
pub mod openai_chat;
pub mod openai_responses;

use serde::{Deserialize, Serialize};

/// The JSON body carried by a STREAM_TOOL_DELTA instruction.
///
/// A fragment may carry any subset: the first fragment of a call usually has
/// `id` and `name`, later fragments append to `arguments`. `index`
/// distinguishes concurrent calls within one stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolDelta {
    #[serde(default)]
    pub index: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

impl ToolDelta {
    /// Serializes to the compact JSON carried by the instruction.
    #[must_use]
    pub fn to_json(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_else(|_| b"{}".to_vec())
    }

    /// Parses an instruction payload; malformed bodies yield `None`.
    #[must_use]
    pub fn from_json(json: &[u8]) -> Option<ToolDelta> {
        serde_json::from_slice(json).ok()
    }
}

/// The SET_META key whose value is the media-type hint consumed by the next
/// IMG_REF / AUD_REF, not a passthrough field.
pub(crate) const MEDIA_TYPE_KEY: &str = "media_type";

/// The EXT_DATA key carrying an unrecognized content block/part verbatim.
/// Parsers emit it at message scope when a structured content array holds a
/// type they do not map; emitters that build content arrays splice the
/// stored block back into the array in place instead of treating it as a
/// passthrough field.
pub(crate) const CONTENT_BLOCK_KEY: &str = "content_block";

/// The EXT_DATA key carrying an unrecognized Responses output item verbatim.
/// No response emitter exists for that style, so the item is preserved in
/// the program rather than rebuilt on a wire.
pub(crate) const OUTPUT_ITEM_KEY: &str = "output_item";

use serde_json::{Map, Value};

use crate::error::{AilError, PayloadKind};
use crate::opcode::Opcode;
use crate::program::Program;
use crate::style::Style;

/// Parses the outer JSON object of a vendor payload. The only fatal parse
/// error in the crate: everything below this level degrades gracefully.
pub(crate) fn parse_outer(
    body: &[u8],
    style: Style,
    kind: PayloadKind,
) -> Result<Map<String, Value>, AilError> {
    serde_json::from_slice(body).map_err(|source| AilError::Parse {
        style,
        kind,
        source,
    })
}

/// Removes `key` and returns its string value. Non-string values (including
/// null) are consumed and dropped, matching the tolerant-parse posture.
pub(crate) fn take_str(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.shift_remove(key)? {
        Value::String(s) => Some(s),
        _ => None,
    }
}

/// Removes `key` and returns its f64 value.
pub(crate) fn take_f64(map: &mut Map<String, Value>, key: &str) -> Option<f64> {
    map.shift_remove(key)?.as_f64()
}

/// Removes `key` and returns its value as i32, saturating out-of-range
/// numbers.
pub(crate) fn take_i32(map: &mut Map<String, Value>, key: &str) -> Option<i32> {
    let n = map.shift_remove(key)?.as_i64()?;
    Some(n.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32)
}

/// Removes `key` and returns its bool value.
pub(crate) fn take_bool(map: &mut Map<String, Value>, key: &str) -> Option<bool> {
    map.shift_remove(key)?.as_bool()
}

/// Serializes a parsed value back to compact JSON bytes.
pub(crate) fn value_to_json(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_else(|_| b"null".to_vec())
}

/// Emits every remaining field of `map` as EXT_DATA, preserving source
/// order.
pub(crate) fn passthrough_ext(prog: &mut Program, map: Map<String, Value>) {
    for (key, value) in map {
        prog.emit_kj(Opcode::ExtData, key, value_to_json(&value));
    }
}

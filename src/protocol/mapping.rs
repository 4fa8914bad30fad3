//! Normalization tables shared by the vendor pairs.
//!
//! The IR keeps finish reasons in the canonical vocabulary `stop` /
//! `tool_calls` / `length`; vendor-specific values outside the tables pass
//! through untouched in both directions. Usage lowers to
//! `{prompt_tokens, completion_tokens, total_tokens}`.

use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Finish reasons
// ---------------------------------------------------------------------------

/// Anthropic `stop_reason` to canonical.
#[must_use]
pub fn anthropic_stop_to_canonical(reason: &str) -> &str {
    match reason {
        "end_turn" => "stop",
        "tool_use" => "tool_calls",
        "max_tokens" => "length",
        other => other,
    }
}

/// Canonical finish reason to Anthropic `stop_reason`.
#[must_use]
pub fn canonical_stop_to_anthropic(reason: &str) -> &str {
    match reason {
        "stop" => "end_turn",
        "tool_calls" => "tool_use",
        "length" => "max_tokens",
        other => other,
    }
}

/// Google `finishReason` to canonical.
#[must_use]
pub fn gemini_stop_to_canonical(reason: &str) -> &str {
    match reason {
        "STOP" => "stop",
        "MAX_TOKENS" => "length",
        other => other,
    }
}

/// Canonical finish reason to Google `finishReason`.
#[must_use]
pub fn canonical_stop_to_gemini(reason: &str) -> &str {
    match reason {
        "stop" => "STOP",
        "length" => "MAX_TOKENS",
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Usage
// ---------------------------------------------------------------------------
// OpenAI Chat usage is already the canonical shape and passes through raw.

/// Anthropic `{input_tokens, output_tokens}` to canonical. Totals are the
/// sum when both sides are present.
#[must_use]
pub fn anthropic_usage_to_canonical(usage: &Value) -> Option<Value> {
    let input = usage.get("input_tokens").and_then(Value::as_u64);
    let output = usage.get("output_tokens").and_then(Value::as_u64);
    if input.is_none() && output.is_none() {
        return None;
    }
    let mut out = json!({});
    if let Some(i) = input {
        out["prompt_tokens"] = i.into();
    }
    if let Some(o) = output {
        out["completion_tokens"] = o.into();
    }
    if let (Some(i), Some(o)) = (input, output) {
        out["total_tokens"] = (i + o).into();
    }
    Some(out)
}

/// Canonical usage to Anthropic `{input_tokens, output_tokens}`.
#[must_use]
pub fn canonical_usage_to_anthropic(usage: &Value) -> Value {
    json!({
        "input_tokens": usage.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0),
        "output_tokens": usage.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0),
    })
}

/// Google `usageMetadata` to canonical.
#[must_use]
pub fn gemini_usage_to_canonical(usage: &Value) -> Value {
    json!({
        "prompt_tokens": usage.get("promptTokenCount").and_then(Value::as_u64).unwrap_or(0),
        "completion_tokens": usage.get("candidatesTokenCount").and_then(Value::as_u64).unwrap_or(0),
        "total_tokens": usage.get("totalTokenCount").and_then(Value::as_u64).unwrap_or(0),
    })
}

/// Canonical usage to Google `usageMetadata`.
#[must_use]
pub fn canonical_usage_to_gemini(usage: &Value) -> Value {
    json!({
        "promptTokenCount": usage.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0),
        "candidatesTokenCount": usage.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0),
        "totalTokenCount": usage.get("total_tokens").and_then(Value::as_u64).unwrap_or(0),
    })
}

/// Responses `{input_tokens, output_tokens, total_tokens}` to canonical.
#[must_use]
pub fn responses_usage_to_canonical(usage: &Value) -> Value {
    json!({
        "prompt_tokens": usage.get("input_tokens").and_then(Value::as_u64).unwrap_or(0),
        "completion_tokens": usage.get("output_tokens").and_then(Value::as_u64).unwrap_or(0),
        "total_tokens": usage.get("total_tokens").and_then(Value::as_u64).unwrap_or(0),
    })
}

//! Anthropic Messages stream-event parsing and emission.
//!
//! Anthropic streaming is typed: each SSE data payload is one event object
//! (`message_start`, `content_block_start`, `content_block_delta`,
//! `message_delta`, `message_stop`). The stream translator splits programs
//! so this emitter always sees at most one event-producing opcode per call.

use serde_json::{json, Map, Value};

use crate::error::PayloadKind;
use crate::opcode::Opcode;
use crate::program::Program;
use crate::protocol::mapping::{
    anthropic_stop_to_canonical, anthropic_usage_to_canonical, canonical_stop_to_anthropic,
    canonical_usage_to_anthropic,
};
use crate::protocol::{parse_outer, take_str, value_to_json, ToolDelta};
use crate::style::Style;
use crate::AilError;

/// Parses one streaming event into a (partial) program.
///
/// # Errors
///
/// Only the outer JSON parse can fail.
pub fn parse_stream_chunk(body: &[u8]) -> Result<Program, AilError> {
    let mut raw = parse_outer(body, Style::Anthropic, PayloadKind::StreamChunk)?;
    let mut prog = Program::new();

    let event_type = take_str(&mut raw, "type").unwrap_or_default();
    match event_type.as_str() {
        "message_start" => {
            prog.emit(Opcode::StreamStart);
            if let Some(message) = raw.shift_remove("message") {
                if let Some(id) = message.get("id").and_then(Value::as_str) {
                    if !id.is_empty() {
                        prog.emit_str(Opcode::RespId, id);
                    }
                }
                if let Some(model) = message.get("model").and_then(Value::as_str) {
                    if !model.is_empty() {
                        prog.emit_str(Opcode::RespModel, model);
                    }
                }
            }
        }

        "content_block_start" => {
            let index = raw.get("index").and_then(Value::as_u64).unwrap_or(0);
            if let Some(block) = raw.shift_remove("content_block") {
                match block.get("type").and_then(Value::as_str) {
                    Some("tool_use") => {
                        let delta = ToolDelta {
                            index,
                            id: block
                                .get("id")
                                .and_then(Value::as_str)
                                .map(ToString::to_string),
                            name: block
                                .get("name")
                                .and_then(Value::as_str)
                                .map(ToString::to_string),
                            arguments: None,
                        };
                        prog.emit_json(Opcode::StreamToolDelta, delta.to_json());
                    }
                    // Thinking and text block starts carry no content of
                    // their own; the deltas do.
                    _ => {}
                }
            }
        }

        "content_block_delta" => {
            let index = raw.get("index").and_then(Value::as_u64).unwrap_or(0);
            if let Some(delta) = raw.shift_remove("delta") {
                match delta.get("type").and_then(Value::as_str) {
                    Some("text_delta") => {
                        if let Some(text) = delta.get("text").and_then(Value::as_str) {
                            prog.emit_str(Opcode::StreamDelta, text);
                        }
                    }
                    Some("thinking_delta") => {
                        if let Some(thinking) = delta.get("thinking").and_then(Value::as_str) {
                            if !thinking.is_empty() {
                                prog.emit_str(Opcode::StreamThinkDelta, thinking);
                            }
                        }
                    }
                    Some("input_json_delta") => {
                        let fragment = ToolDelta {
                            index,
                            id: None,
                            name: None,
                            arguments: delta
                                .get("partial_json")
                                .and_then(Value::as_str)
                                .map(ToString::to_string),
                        };
                        prog.emit_json(Opcode::StreamToolDelta, fragment.to_json());
                    }
                    _ => {}
                }
            }
        }

        "message_delta" => {
            if let Some(delta) = raw.shift_remove("delta") {
                if let Some(stop) = delta.get("stop_reason").and_then(Value::as_str) {
                    if !stop.is_empty() {
                        prog.emit_str(Opcode::RespDone, anthropic_stop_to_canonical(stop));
                    }
                }
            }
            if let Some(usage) = raw.shift_remove("usage") {
                if let Some(canonical) = anthropic_usage_to_canonical(&usage) {
                    prog.emit_json(Opcode::Usage, value_to_json(&canonical));
                }
            }
        }

        "message_stop" => prog.emit(Opcode::StreamEnd),

        // ping and unknown event types decode to an empty program.
        _ => {}
    }

    Ok(prog)
}

/// Emits a (partial) program as one streaming event. The first
/// event-producing opcode determines the event; RESP_ID / RESP_MODEL / USAGE
/// in the same program attach to it. An empty program becomes a `ping`.
///
/// # Errors
///
/// Serialization of the assembled event is the only fallible step.
pub fn emit_stream_chunk(prog: &Program) -> Result<Option<Vec<u8>>, AilError> {
    for inst in &prog.code {
        match inst.op {
            Opcode::StreamStart => {
                let mut message = Map::new();
                message.insert("role".into(), json!("assistant"));
                for ahead in &prog.code {
                    match ahead.op {
                        Opcode::RespId => {
                            message.insert("id".into(), json!(ahead.as_str().unwrap_or("")));
                        }
                        Opcode::RespModel => {
                            message.insert("model".into(), json!(ahead.as_str().unwrap_or("")));
                        }
                        _ => {}
                    }
                }
                return Ok(Some(serde_json::to_vec(&json!({
                    "type": "message_start",
                    "message": message,
                }))?));
            }

            Opcode::StreamDelta => {
                return Ok(Some(serde_json::to_vec(&json!({
                    "type": "content_block_delta",
                    "delta": {"type": "text_delta", "text": inst.as_str().unwrap_or("")},
                }))?));
            }

            Opcode::StreamThinkDelta => {
                return Ok(Some(serde_json::to_vec(&json!({
                    "type": "content_block_delta",
                    "delta": {"type": "thinking_delta", "thinking": inst.as_str().unwrap_or("")},
                }))?));
            }

            Opcode::StreamToolDelta => {
                let Some(delta) = ToolDelta::from_json(inst.as_json().unwrap_or(b"{}")) else {
                    continue;
                };
                if delta.name.is_some() {
                    // A named fragment opens the tool-use block.
                    return Ok(Some(serde_json::to_vec(&json!({
                        "type": "content_block_start",
                        "index": delta.index,
                        "content_block": {
                            "type": "tool_use",
                            "id": delta.id.unwrap_or_default(),
                            "name": delta.name.unwrap_or_default(),
                        },
                    }))?));
                }
                if let Some(args) = delta.arguments {
                    return Ok(Some(serde_json::to_vec(&json!({
                        "type": "content_block_delta",
                        "index": delta.index,
                        "delta": {"type": "input_json_delta", "partial_json": args},
                    }))?));
                }
            }

            Opcode::RespDone => {
                let mut event = Map::new();
                event.insert("type".into(), json!("message_delta"));
                event.insert(
                    "delta".into(),
                    json!({"stop_reason": canonical_stop_to_anthropic(inst.as_str().unwrap_or(""))}),
                );
                // Usage rides in the same message_delta event.
                for ahead in &prog.code {
                    if ahead.op == Opcode::Usage {
                        if let Ok(usage) =
                            serde_json::from_slice::<Value>(ahead.as_json().unwrap_or(b"null"))
                        {
                            event.insert("usage".into(), canonical_usage_to_anthropic(&usage));
                        }
                    }
                }
                return Ok(Some(serde_json::to_vec(&Value::Object(event))?));
            }

            Opcode::StreamEnd => {
                return Ok(Some(serde_json::to_vec(&json!({"type": "message_stop"}))?));
            }

            _ => {}
        }
    }

    // Nothing event-producing in this chunk.
    Ok(Some(serde_json::to_vec(&json!({"type": "ping"}))?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> Program {
        parse_stream_chunk(body.as_bytes()).unwrap()
    }

    fn emit_value(prog: &Program) -> Value {
        serde_json::from_slice(&emit_stream_chunk(prog).unwrap().unwrap()).unwrap()
    }

    #[test]
    fn test_parse_message_start() {
        let prog = parse(r#"{"type":"message_start","message":{"id":"msg_01","model":"claude-3-opus"}}"#);
        assert!(prog.has_opcode(Opcode::StreamStart));
        assert!(prog
            .code
            .iter()
            .any(|i| i.op == Opcode::RespId && i.as_str() == Some("msg_01")));
    }

    #[test]
    fn test_parse_text_and_thinking_deltas() {
        let prog = parse(r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hello"}}"#);
        assert!(prog
            .code
            .iter()
            .any(|i| i.op == Opcode::StreamDelta && i.as_str() == Some("Hello")));

        let prog = parse(r#"{"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"hm"}}"#);
        assert!(prog.has_opcode(Opcode::StreamThinkDelta));
    }

    #[test]
    fn test_parse_tool_use_start_and_fragment() {
        let prog = parse(r#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_1","name":"search"}}"#);
        let inst = prog
            .code
            .iter()
            .find(|i| i.op == Opcode::StreamToolDelta)
            .unwrap();
        let delta = ToolDelta::from_json(inst.as_json().unwrap()).unwrap();
        assert_eq!(delta.index, 1);
        assert_eq!(delta.name.as_deref(), Some("search"));

        let prog = parse(r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"q\":"}}"#);
        let inst = prog
            .code
            .iter()
            .find(|i| i.op == Opcode::StreamToolDelta)
            .unwrap();
        let delta = ToolDelta::from_json(inst.as_json().unwrap()).unwrap();
        assert_eq!(delta.arguments.as_deref(), Some("{\"q\":"));
    }

    #[test]
    fn test_parse_message_delta_normalizes() {
        let prog = parse(r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":5}}"#);
        assert!(prog
            .code
            .iter()
            .any(|i| i.op == Opcode::RespDone && i.as_str() == Some("stop")));
        assert!(prog.has_opcode(Opcode::Usage));
    }

    #[test]
    fn test_emit_message_start_carries_metadata() {
        let mut prog = Program::new();
        prog.emit_str(Opcode::RespId, "msg_7");
        prog.emit_str(Opcode::RespModel, "claude-3-haiku");
        prog.emit(Opcode::StreamStart);
        let out = emit_value(&prog);
        assert_eq!(out["type"], "message_start");
        assert_eq!(out["message"]["id"], "msg_7");
        assert_eq!(out["message"]["model"], "claude-3-haiku");
    }

    #[test]
    fn test_emit_message_delta_with_usage() {
        let mut prog = Program::new();
        prog.emit_str(Opcode::RespDone, "stop");
        prog.emit_json(Opcode::Usage, br#"{"completion_tokens":42}"#.to_vec());
        let out = emit_value(&prog);
        assert_eq!(out["type"], "message_delta");
        assert_eq!(out["delta"]["stop_reason"], "end_turn");
        assert_eq!(out["usage"]["output_tokens"], 42);
    }

    #[test]
    fn test_emit_empty_chunk_is_ping() {
        let mut prog = Program::new();
        prog.emit_str(Opcode::RespId, "only-metadata");
        assert_eq!(emit_value(&prog)["type"], "ping");
    }

    #[test]
    fn test_emit_stream_end() {
        let mut prog = Program::new();
        prog.emit(Opcode::StreamEnd);
        assert_eq!(emit_value(&prog)["type"], "message_stop");
    }
}

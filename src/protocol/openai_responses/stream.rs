//! Responses stream-event parsing.
//!
//! The Responses API streams typed events (`response.created`,
//! `response.output_text.delta`, `response.output_item.added`, ...). There
//! is no stream emitter for this style.

use serde_json::Value;

use crate::error::PayloadKind;
use crate::opcode::Opcode;
use crate::program::Program;
use crate::protocol::mapping::responses_usage_to_canonical;
use crate::protocol::{parse_outer, take_str, value_to_json, ToolDelta};
use crate::style::Style;
use crate::AilError;

/// Parses one typed streaming event into a (partial) program. Unknown event
/// types decode to an empty program.
///
/// # Errors
///
/// Only the outer JSON parse can fail.
pub fn parse_stream_chunk(body: &[u8]) -> Result<Program, AilError> {
    let mut raw = parse_outer(body, Style::Responses, PayloadKind::StreamChunk)?;
    let mut prog = Program::new();

    let event_type = take_str(&mut raw, "type").unwrap_or_default();
    match event_type.as_str() {
        "response.created" | "response.in_progress" => {
            prog.emit(Opcode::StreamStart);
            if let Some(response) = raw.shift_remove("response") {
                if let Some(id) = response.get("id").and_then(Value::as_str) {
                    if !id.is_empty() {
                        prog.emit_str(Opcode::RespId, id);
                    }
                }
                if let Some(model) = response.get("model").and_then(Value::as_str) {
                    if !model.is_empty() {
                        prog.emit_str(Opcode::RespModel, model);
                    }
                }
            }
        }

        "response.output_text.delta" => {
            if let Some(delta) = take_str(&mut raw, "delta") {
                if !delta.is_empty() {
                    prog.emit_str(Opcode::StreamDelta, delta);
                }
            }
        }

        "response.reasoning_summary_text.delta" => {
            if let Some(delta) = take_str(&mut raw, "delta") {
                if !delta.is_empty() {
                    prog.emit_str(Opcode::StreamThinkDelta, delta);
                }
            }
        }

        "response.function_call_arguments.delta" => {
            let fragment = ToolDelta {
                index: raw.get("output_index").and_then(Value::as_u64).unwrap_or(0),
                id: take_str(&mut raw, "item_id").filter(|id| !id.is_empty()),
                name: None,
                arguments: Some(take_str(&mut raw, "delta").unwrap_or_default()),
            };
            prog.emit_json(Opcode::StreamToolDelta, fragment.to_json());
        }

        "response.output_item.added" => {
            let index = raw.get("output_index").and_then(Value::as_u64).unwrap_or(0);
            if let Some(item) = raw.shift_remove("item") {
                if item.get("type").and_then(Value::as_str) == Some("function_call") {
                    let delta = ToolDelta {
                        index,
                        id: item
                            .get("call_id")
                            .and_then(Value::as_str)
                            .map(ToString::to_string),
                        name: item
                            .get("name")
                            .and_then(Value::as_str)
                            .map(ToString::to_string),
                        arguments: None,
                    };
                    prog.emit_json(Opcode::StreamToolDelta, delta.to_json());
                }
            }
        }

        "response.output_item.done" => {
            if let Some(item) = raw.shift_remove("item") {
                if item.get("status").and_then(Value::as_str) == Some("completed") {
                    match item.get("type").and_then(Value::as_str) {
                        Some("message") => prog.emit_str(Opcode::RespDone, "stop"),
                        Some("function_call") => prog.emit_str(Opcode::RespDone, "tool_calls"),
                        _ => {}
                    }
                }
            }
        }

        "response.completed" | "response.done" => {
            if let Some(response) = raw.shift_remove("response") {
                if let Some(usage) = response.get("usage") {
                    if !usage.is_null() {
                        prog.emit_json(
                            Opcode::Usage,
                            value_to_json(&responses_usage_to_canonical(usage)),
                        );
                    }
                }
            }
            prog.emit(Opcode::StreamEnd);
        }

        _ => {}
    }

    Ok(prog)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> Program {
        parse_stream_chunk(body.as_bytes()).unwrap()
    }

    #[test]
    fn test_created_event() {
        let prog = parse(r#"{"type":"response.created","response":{"id":"resp_1","model":"gpt-4o"}}"#);
        assert!(prog.has_opcode(Opcode::StreamStart));
        assert!(prog
            .code
            .iter()
            .any(|i| i.op == Opcode::RespId && i.as_str() == Some("resp_1")));
    }

    #[test]
    fn test_text_and_reasoning_deltas() {
        let prog = parse(r#"{"type":"response.output_text.delta","delta":"Hel"}"#);
        assert!(prog
            .code
            .iter()
            .any(|i| i.op == Opcode::StreamDelta && i.as_str() == Some("Hel")));

        let prog = parse(r#"{"type":"response.reasoning_summary_text.delta","delta":"because"}"#);
        assert!(prog.has_opcode(Opcode::StreamThinkDelta));
    }

    #[test]
    fn test_function_call_item_added() {
        let prog = parse(
            r#"{"type":"response.output_item.added","output_index":1,"item":{"type":"function_call","id":"fc_1","call_id":"call_7","name":"search"}}"#,
        );
        let inst = prog
            .code
            .iter()
            .find(|i| i.op == Opcode::StreamToolDelta)
            .unwrap();
        let delta = ToolDelta::from_json(inst.as_json().unwrap()).unwrap();
        assert_eq!(delta.index, 1);
        assert_eq!(delta.id.as_deref(), Some("call_7"));
        assert_eq!(delta.name.as_deref(), Some("search"));
    }

    #[test]
    fn test_arguments_delta() {
        let prog = parse(
            r#"{"type":"response.function_call_arguments.delta","output_index":0,"item_id":"fc_1","delta":"{\"q\":"}"#,
        );
        let inst = prog
            .code
            .iter()
            .find(|i| i.op == Opcode::StreamToolDelta)
            .unwrap();
        let delta = ToolDelta::from_json(inst.as_json().unwrap()).unwrap();
        assert_eq!(delta.arguments.as_deref(), Some("{\"q\":"));
    }

    #[test]
    fn test_item_done_maps_finish_reason() {
        let prog = parse(
            r#"{"type":"response.output_item.done","item":{"type":"function_call","status":"completed"}}"#,
        );
        assert!(prog
            .code
            .iter()
            .any(|i| i.op == Opcode::RespDone && i.as_str() == Some("tool_calls")));
    }

    #[test]
    fn test_completed_carries_usage_and_end() {
        let prog = parse(
            r#"{"type":"response.completed","response":{"usage":{"input_tokens":2,"output_tokens":3,"total_tokens":5}}}"#,
        );
        assert!(prog.has_opcode(Opcode::Usage));
        assert!(prog.has_opcode(Opcode::StreamEnd));
    }

    #[test]
    fn test_unknown_event_is_empty() {
        let prog = parse(r#"{"type":"response.content_part.added"}"#);
        assert!(prog.is_empty());
    }
}

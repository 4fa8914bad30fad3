//! Responses response parsing.

use serde_json::Value;

use crate::error::PayloadKind;
use crate::opcode::Opcode;
use crate::program::Program;
use crate::protocol::mapping::responses_usage_to_canonical;
use crate::protocol::{parse_outer, passthrough_ext, take_str, value_to_json, OUTPUT_ITEM_KEY};
use crate::style::Style;
use crate::AilError;

/// Parses a Responses response body into a program. `output` items of type
/// `message` and `function_call` each become one assistant message block;
/// item-level `id`/`status` are dropped.
///
/// # Errors
///
/// Only the outer JSON parse can fail.
pub fn parse_response(body: &[u8]) -> Result<Program, AilError> {
    let mut raw = parse_outer(body, Style::Responses, PayloadKind::Response)?;
    let mut prog = Program::new();

    if let Some(id) = take_str(&mut raw, "id") {
        prog.emit_str(Opcode::RespId, id);
    }
    if let Some(model) = take_str(&mut raw, "model") {
        prog.emit_str(Opcode::RespModel, model);
    }
    if let Some(usage) = raw.shift_remove("usage") {
        if !usage.is_null() {
            prog.emit_json(
                Opcode::Usage,
                value_to_json(&responses_usage_to_canonical(&usage)),
            );
        }
    }

    if let Some(Value::Array(items)) = raw.shift_remove("output") {
        for item in items {
            let Value::Object(mut item) = item else {
                continue;
            };
            let item_type = item
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            match item_type.as_str() {
                "message" => {
                    prog.emit(Opcode::MsgStart);
                    prog.emit(Opcode::RoleAst);
                    if let Some(Value::Array(parts)) = item.shift_remove("content") {
                        for part in parts {
                            let part_type =
                                part.get("type").and_then(Value::as_str).unwrap_or("");
                            if matches!(part_type, "output_text" | "text") {
                                if let Some(text) = part.get("text").and_then(Value::as_str) {
                                    prog.emit_str(Opcode::TxtChunk, text);
                                }
                            }
                        }
                    }
                    prog.emit_str(Opcode::RespDone, "stop");
                    prog.emit(Opcode::MsgEnd);
                }
                "function_call" => {
                    prog.emit(Opcode::MsgStart);
                    prog.emit(Opcode::RoleAst);
                    let call_id = take_str(&mut item, "call_id").unwrap_or_default();
                    prog.emit_str(Opcode::CallStart, call_id);
                    let name = take_str(&mut item, "name").unwrap_or_default();
                    prog.emit_str(Opcode::CallName, name);
                    if let Some(args) = take_str(&mut item, "arguments") {
                        if !args.is_empty() {
                            prog.emit_json(Opcode::CallArgs, args.into_bytes());
                        }
                    }
                    prog.emit(Opcode::CallEnd);
                    prog.emit_str(Opcode::RespDone, "tool_calls");
                    prog.emit(Opcode::MsgEnd);
                }
                _ => {
                    // Unknown item types (reasoning, web_search_call, ...)
                    // pass through verbatim.
                    prog.emit_kj(
                        Opcode::ExtData,
                        OUTPUT_ITEM_KEY,
                        value_to_json(&Value::Object(item)),
                    );
                }
            }
        }
    }

    passthrough_ext(&mut prog, raw);
    Ok(prog)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_item() {
        let body = br#"{
            "id": "resp_1",
            "model": "gpt-4o",
            "output": [{
                "type": "message",
                "id": "msg_1",
                "status": "completed",
                "role": "assistant",
                "content": [{"type": "output_text", "text": "Hello!"}]
            }],
            "usage": {"input_tokens": 4, "output_tokens": 6, "total_tokens": 10}
        }"#;
        let prog = parse_response(body).unwrap();
        assert!(prog
            .code
            .iter()
            .any(|i| i.op == Opcode::TxtChunk && i.as_str() == Some("Hello!")));
        assert!(prog
            .code
            .iter()
            .any(|i| i.op == Opcode::RespDone && i.as_str() == Some("stop")));

        let usage = prog
            .code
            .iter()
            .find(|i| i.op == Opcode::Usage)
            .and_then(|i| i.as_json())
            .unwrap();
        let usage: Value = serde_json::from_slice(usage).unwrap();
        assert_eq!(usage["prompt_tokens"], 4);
        assert_eq!(usage["completion_tokens"], 6);
    }

    #[test]
    fn test_unknown_output_item_passthrough() {
        let body = br#"{
            "id": "resp_3",
            "model": "o3",
            "output": [
                {"type": "reasoning", "id": "rs_1", "summary": []},
                {"type": "message", "status": "completed", "role": "assistant",
                 "content": [{"type": "output_text", "text": "hi"}]}
            ]
        }"#;
        let prog = parse_response(body).unwrap();
        let item = prog
            .code
            .iter()
            .find(|i| i.op == Opcode::ExtData && i.key() == Some(OUTPUT_ITEM_KEY))
            .and_then(|i| i.as_json())
            .unwrap();
        let item: Value = serde_json::from_slice(item).unwrap();
        assert_eq!(item["type"], "reasoning");
        assert_eq!(item["id"], "rs_1");
        // The recognized item still parses as a message.
        assert_eq!(prog.count_messages(), 1);
    }

    #[test]
    fn test_function_call_item() {
        let body = br#"{
            "id": "resp_2",
            "model": "gpt-4o",
            "output": [{
                "type": "function_call",
                "call_id": "call_z",
                "name": "search",
                "arguments": "{\"q\":\"rust\"}"
            }]
        }"#;
        let prog = parse_response(body).unwrap();
        let calls = prog.tool_calls();
        assert_eq!(calls[0].call_id, "call_z");
        assert_eq!(calls[0].name, "search");
        assert!(prog
            .code
            .iter()
            .any(|i| i.op == Opcode::RespDone && i.as_str() == Some("tool_calls")));
    }
}

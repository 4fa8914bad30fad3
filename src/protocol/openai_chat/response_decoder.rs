//! Chat Completions response parsing.

use serde_json::Value;

use crate::error::PayloadKind;
use crate::opcode::Opcode;
use crate::program::Program;
use crate::protocol::{parse_outer, passthrough_ext, take_str, value_to_json};
use crate::style::Style;
use crate::AilError;

/// Parses a Chat Completions response body into a program. Each choice
/// becomes one assistant message block carrying its finish reason.
///
/// # Errors
///
/// Only the outer JSON parse can fail.
pub fn parse_response(body: &[u8]) -> Result<Program, AilError> {
    let mut raw = parse_outer(body, Style::ChatCompletions, PayloadKind::Response)?;
    let mut prog = Program::new();

    if let Some(id) = take_str(&mut raw, "id") {
        prog.emit_str(Opcode::RespId, id);
    }
    if let Some(model) = take_str(&mut raw, "model") {
        prog.emit_str(Opcode::RespModel, model);
    }
    // Chat usage is already the canonical shape; carried verbatim.
    match raw.shift_remove("usage") {
        Some(Value::Null) | None => {}
        Some(usage) => prog.emit_json(Opcode::Usage, value_to_json(&usage)),
    }

    if let Some(Value::Array(choices)) = raw.shift_remove("choices") {
        for choice in choices {
            let Value::Object(mut choice) = choice else {
                continue;
            };
            prog.emit(Opcode::MsgStart);

            if let Some(Value::Object(mut msg)) = choice.shift_remove("message") {
                if take_str(&mut msg, "role").as_deref() == Some("assistant") {
                    prog.emit(Opcode::RoleAst);
                }

                if let Some(reasoning) = take_str(&mut msg, "reasoning_content") {
                    if !reasoning.is_empty() {
                        prog.emit(Opcode::ThinkStart);
                        prog.emit_str(Opcode::ThinkChunk, reasoning);
                        prog.emit(Opcode::ThinkEnd);
                    }
                }

                if let Some(content) = take_str(&mut msg, "content") {
                    if !content.is_empty() {
                        prog.emit_str(Opcode::TxtChunk, content);
                    }
                }

                if let Some(Value::Array(tool_calls)) = msg.shift_remove("tool_calls") {
                    for call in tool_calls {
                        if let Value::Object(call) = call {
                            super::decoder::parse_tool_call(&mut prog, call);
                        }
                    }
                }

                passthrough_ext(&mut prog, msg);
            }

            if let Some(finish) = take_str(&mut choice, "finish_reason") {
                if !finish.is_empty() {
                    prog.emit_str(Opcode::RespDone, finish);
                }
            }

            // The choice index is positional; the emitter regenerates it.
            choice.shift_remove("index");
            passthrough_ext(&mut prog, choice);
            prog.emit(Opcode::MsgEnd);
        }
    }

    passthrough_ext(&mut prog, raw);
    Ok(prog)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_response() {
        let body = br#"{
            "id": "chatcmpl-abc123",
            "object": "chat.completion",
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hello! How can I help?"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 8, "total_tokens": 18}
        }"#;
        let prog = parse_response(body).unwrap();
        assert!(prog
            .code
            .iter()
            .any(|i| i.op == Opcode::RespId && i.as_str() == Some("chatcmpl-abc123")));
        assert!(prog
            .code
            .iter()
            .any(|i| i.op == Opcode::RespDone && i.as_str() == Some("stop")));
        assert_eq!(prog.count_messages(), 1);
    }

    #[test]
    fn test_tool_call_response() {
        let body = br#"{
            "id": "chatcmpl-x",
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "tool_calls": [{
                    "id": "call_9",
                    "type": "function",
                    "function": {"name": "search", "arguments": "{\"q\":\"ai\"}"}
                }]},
                "finish_reason": "tool_calls"
            }]
        }"#;
        let prog = parse_response(body).unwrap();
        let calls = prog.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "search");
    }

    #[test]
    fn test_null_usage_skipped() {
        let prog = parse_response(br#"{"id":"x","usage":null,"choices":[]}"#).unwrap();
        assert!(!prog.has_opcode(Opcode::Usage));
    }
}

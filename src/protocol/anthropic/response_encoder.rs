//! Anthropic Messages response emission.

use serde_json::{json, Map, Value};

use crate::error::AilError;
use crate::extras::ExtrasCollector;
use crate::opcode::Opcode;
use crate::program::Program;
use crate::protocol::mapping::{canonical_stop_to_anthropic, canonical_usage_to_anthropic};
use crate::protocol::{CONTENT_BLOCK_KEY, MEDIA_TYPE_KEY};

use super::encoder::last_block_of_type;

/// Emits a program as an Anthropic Messages response body.
///
/// # Errors
///
/// Serialization of the assembled document is the only fallible step.
pub fn emit_response(prog: &Program) -> Result<Vec<u8>, AilError> {
    let mut result = Map::new();
    result.insert("type".into(), json!("message"));
    result.insert("role".into(), json!("assistant"));

    let mut ec = ExtrasCollector::new();
    let mut blocks: Vec<Value> = Vec::new();
    let mut text = String::new();
    let mut in_message = false;

    let mut in_think = false;
    let mut think_text = String::new();
    let mut think_signature: Option<String> = None;

    for inst in &prog.code {
        match inst.op {
            Opcode::RespId => {
                result.insert("id".into(), json!(inst.as_str().unwrap_or("")));
            }
            Opcode::RespModel => {
                result.insert("model".into(), json!(inst.as_str().unwrap_or("")));
            }
            Opcode::Usage => {
                if let Ok(usage) =
                    serde_json::from_slice::<Value>(inst.as_json().unwrap_or(b"null"))
                {
                    result.insert("usage".into(), canonical_usage_to_anthropic(&usage));
                }
            }

            Opcode::MsgStart => {
                ec.push();
                in_message = true;
                text.clear();
            }

            Opcode::TxtChunk => {
                if in_message {
                    text.push_str(inst.as_str().unwrap_or(""));
                }
            }

            Opcode::ThinkStart => {
                in_think = true;
                think_text.clear();
                think_signature = None;
            }
            Opcode::ThinkChunk => {
                if in_think {
                    think_text.push_str(inst.as_str().unwrap_or(""));
                }
            }
            Opcode::ThinkRef => {
                if in_think {
                    let sig = prog.buffer_text(inst.as_buf_ref().unwrap_or(u32::MAX));
                    if !sig.is_empty() {
                        think_signature = Some(sig.into_owned());
                    }
                }
            }
            Opcode::ThinkEnd => {
                if in_think && in_message {
                    flush_text(&mut text, &mut blocks);
                    let mut block = Map::new();
                    block.insert("type".into(), json!("thinking"));
                    block.insert("thinking".into(), json!(std::mem::take(&mut think_text)));
                    if let Some(sig) = think_signature.take() {
                        block.insert("signature".into(), sig.into());
                    }
                    blocks.push(Value::Object(block));
                }
                in_think = false;
            }

            Opcode::CallStart => {
                ec.push();
                if in_message {
                    flush_text(&mut text, &mut blocks);
                    blocks.push(json!({"type": "tool_use", "id": inst.as_str().unwrap_or("")}));
                }
            }
            Opcode::CallName => {
                if let Some(block) = last_block_of_type(&mut blocks, "tool_use") {
                    block.insert("name".into(), json!(inst.as_str().unwrap_or("")));
                }
            }
            Opcode::CallArgs => {
                if let Some(block) = last_block_of_type(&mut blocks, "tool_use") {
                    let input = serde_json::from_slice::<Value>(inst.as_json().unwrap_or(b"{}"))
                        .unwrap_or_else(|_| json!({}));
                    block.insert("input".into(), input);
                }
            }
            Opcode::CallEnd => {
                if let Some(block) = last_block_of_type(&mut blocks, "tool_use") {
                    ec.merge_into(block);
                }
                ec.pop();
            }

            Opcode::RespDone => {
                result.insert(
                    "stop_reason".into(),
                    json!(canonical_stop_to_anthropic(inst.as_str().unwrap_or(""))),
                );
            }

            Opcode::ExtData => {
                let key = inst.key().unwrap_or("");
                if key == CONTENT_BLOCK_KEY && in_message {
                    if let Ok(block) =
                        serde_json::from_slice::<Value>(inst.as_json().unwrap_or(b"null"))
                    {
                        flush_text(&mut text, &mut blocks);
                        blocks.push(block);
                    }
                } else {
                    ec.add_json(key, inst.as_json().unwrap_or(b"null"));
                }
            }
            Opcode::SetMeta => {
                if inst.key() != Some(MEDIA_TYPE_KEY) {
                    ec.add_string(inst.key().unwrap_or(""), inst.as_str().unwrap_or(""));
                }
            }

            Opcode::MsgEnd => {
                if in_message {
                    flush_text(&mut text, &mut blocks);
                    in_message = false;
                }
                // The envelope is flat; message-level extras land on it.
                ec.merge_into(&mut result);
                ec.pop();
            }

            _ => {}
        }
    }

    result.insert("content".into(), Value::Array(blocks));
    ec.merge_into(&mut result);
    Ok(serde_json::to_vec(&Value::Object(result))?)
}

fn flush_text(text: &mut String, blocks: &mut Vec<Value>) {
    if !text.is_empty() {
        let flushed = std::mem::take(text);
        blocks.push(json!({"type": "text", "text": flushed}));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emit_value(prog: &Program) -> Value {
        serde_json::from_slice(&emit_response(prog).unwrap()).unwrap()
    }

    #[test]
    fn test_envelope() {
        let mut prog = Program::new();
        prog.emit_str(Opcode::RespId, "msg_01");
        prog.emit_str(Opcode::RespModel, "claude-3-opus");
        prog.emit_json(
            Opcode::Usage,
            br#"{"prompt_tokens":10,"completion_tokens":8,"total_tokens":18}"#.to_vec(),
        );
        prog.emit(Opcode::MsgStart);
        prog.emit(Opcode::RoleAst);
        prog.emit_str(Opcode::TxtChunk, "Hello!");
        prog.emit_str(Opcode::RespDone, "stop");
        prog.emit(Opcode::MsgEnd);

        let out = emit_value(&prog);
        assert_eq!(out["type"], "message");
        assert_eq!(out["role"], "assistant");
        assert_eq!(out["id"], "msg_01");
        assert_eq!(out["stop_reason"], "end_turn");
        assert_eq!(out["usage"], json!({"input_tokens": 10, "output_tokens": 8}));
        assert_eq!(out["content"][0], json!({"type": "text", "text": "Hello!"}));
    }

    #[test]
    fn test_tool_use_block() {
        let mut prog = Program::new();
        prog.emit(Opcode::MsgStart);
        prog.emit(Opcode::RoleAst);
        prog.emit_str(Opcode::TxtChunk, "checking");
        prog.emit_str(Opcode::CallStart, "toolu_9");
        prog.emit_str(Opcode::CallName, "get_weather");
        prog.emit_json(Opcode::CallArgs, br#"{"city":"SF"}"#.to_vec());
        prog.emit(Opcode::CallEnd);
        prog.emit_str(Opcode::RespDone, "tool_calls");
        prog.emit(Opcode::MsgEnd);

        let out = emit_value(&prog);
        assert_eq!(out["stop_reason"], "tool_use");
        assert_eq!(out["content"][0]["type"], "text");
        let tool = &out["content"][1];
        assert_eq!(tool["type"], "tool_use");
        assert_eq!(tool["id"], "toolu_9");
        assert_eq!(tool["input"], json!({"city": "SF"}));
    }

    #[test]
    fn test_empty_content_array() {
        let prog = Program::new();
        assert_eq!(emit_value(&prog)["content"], json!([]));
    }
}

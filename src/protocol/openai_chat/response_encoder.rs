//! Chat Completions response emission.

use serde_json::{json, Map, Value};

use crate::error::AilError;
use crate::extras::ExtrasCollector;
use crate::opcode::Opcode;
use crate::program::Program;
use crate::protocol::MEDIA_TYPE_KEY;

use super::encoder::function_of;

/// Emits a program as a Chat Completions response body. Each message block
/// becomes one choice.
///
/// # Errors
///
/// Serialization of the assembled document is the only fallible step.
pub fn emit_response(prog: &Program) -> Result<Vec<u8>, AilError> {
    let mut result = Map::new();
    result.insert("object".into(), json!("chat.completion"));

    let mut ec = ExtrasCollector::new();
    let mut choices: Vec<Value> = Vec::new();
    let mut message: Map<String, Value> = Map::new();
    let mut finish_reason: Option<String> = None;
    let mut text = String::new();
    let mut tool_calls: Vec<Map<String, Value>> = Vec::new();
    let mut in_message = false;

    let mut in_think = false;
    let mut think_text = String::new();

    for inst in &prog.code {
        match inst.op {
            Opcode::RespId => {
                result.insert("id".into(), json!(inst.as_str().unwrap_or("")));
            }
            Opcode::RespModel => {
                result.insert("model".into(), json!(inst.as_str().unwrap_or("")));
            }
            Opcode::Usage => {
                if let Ok(usage) = serde_json::from_slice::<Value>(inst.as_json().unwrap_or(b"null"))
                {
                    result.insert("usage".into(), usage);
                }
            }

            Opcode::MsgStart => {
                ec.push();
                in_message = true;
                message = Map::new();
                finish_reason = None;
                text.clear();
                tool_calls.clear();
            }
            Opcode::RoleAst => {
                if in_message {
                    message.insert("role".into(), json!("assistant"));
                }
            }
            Opcode::TxtChunk => {
                if in_message {
                    text.push_str(inst.as_str().unwrap_or(""));
                }
            }

            Opcode::ThinkStart => {
                in_think = true;
                think_text.clear();
            }
            Opcode::ThinkChunk => {
                if in_think {
                    think_text.push_str(inst.as_str().unwrap_or(""));
                }
            }
            Opcode::ThinkEnd => {
                if in_think && in_message && !think_text.is_empty() {
                    message.insert(
                        "reasoning_content".into(),
                        std::mem::take(&mut think_text).into(),
                    );
                }
                in_think = false;
            }

            Opcode::CallStart => {
                ec.push();
                tool_calls.push(Map::from_iter([
                    ("id".to_string(), json!(inst.as_str().unwrap_or(""))),
                    ("type".to_string(), json!("function")),
                ]));
            }
            Opcode::CallName => {
                if let Some(call) = tool_calls.last_mut() {
                    function_of(call).insert("name".into(), json!(inst.as_str().unwrap_or("")));
                }
            }
            Opcode::CallArgs => {
                if let Some(call) = tool_calls.last_mut() {
                    let args = String::from_utf8_lossy(inst.as_json().unwrap_or(b"")).into_owned();
                    function_of(call).insert("arguments".into(), args.into());
                }
            }
            Opcode::CallEnd => {
                if let Some(call) = tool_calls.last_mut() {
                    ec.merge_into(call);
                }
                ec.pop();
            }

            // Extras seen before the finish reason belong to the message
            // object; the rest of the block's extras attach to the choice.
            Opcode::RespDone => {
                if in_message {
                    ec.merge_into(&mut message);
                }
                finish_reason = Some(inst.as_str().unwrap_or("").to_string());
            }

            Opcode::ExtData => {
                ec.add_json(inst.key().unwrap_or(""), inst.as_json().unwrap_or(b"null"));
            }
            Opcode::SetMeta => {
                if inst.key() != Some(MEDIA_TYPE_KEY) {
                    ec.add_string(inst.key().unwrap_or(""), inst.as_str().unwrap_or(""));
                }
            }

            Opcode::MsgEnd => {
                if in_message {
                    if !text.is_empty() {
                        message.insert("content".into(), json!(std::mem::take(&mut text)));
                    }
                    if !tool_calls.is_empty() {
                        message.insert(
                            "tool_calls".into(),
                            Value::Array(
                                std::mem::take(&mut tool_calls)
                                    .into_iter()
                                    .map(Value::Object)
                                    .collect(),
                            ),
                        );
                    }
                    let mut choice = Map::new();
                    choice.insert("index".into(), json!(choices.len()));
                    choice.insert("message".into(), Value::Object(std::mem::take(&mut message)));
                    if let Some(reason) = finish_reason.take() {
                        choice.insert("finish_reason".into(), reason.into());
                    }
                    ec.merge_into(&mut choice);
                    choices.push(Value::Object(choice));
                    in_message = false;
                }
                ec.pop();
            }

            _ => {}
        }
    }

    if !choices.is_empty() {
        result.insert("choices".into(), Value::Array(choices));
    }
    ec.merge_into(&mut result);
    Ok(serde_json::to_vec(&Value::Object(result))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emit_value(prog: &Program) -> Value {
        serde_json::from_slice(&emit_response(prog).unwrap()).unwrap()
    }

    #[test]
    fn test_response_shape() {
        let mut prog = Program::new();
        prog.emit_str(Opcode::RespId, "chatcmpl-1");
        prog.emit_str(Opcode::RespModel, "gpt-4o");
        prog.emit_json(
            Opcode::Usage,
            br#"{"prompt_tokens":3,"completion_tokens":5,"total_tokens":8}"#.to_vec(),
        );
        prog.emit(Opcode::MsgStart);
        prog.emit(Opcode::RoleAst);
        prog.emit_str(Opcode::TxtChunk, "Hi there");
        prog.emit_str(Opcode::RespDone, "stop");
        prog.emit(Opcode::MsgEnd);

        let out = emit_value(&prog);
        assert_eq!(out["object"], "chat.completion");
        assert_eq!(out["id"], "chatcmpl-1");
        assert_eq!(out["choices"][0]["index"], 0);
        assert_eq!(out["choices"][0]["message"]["content"], "Hi there");
        assert_eq!(out["choices"][0]["finish_reason"], "stop");
        assert_eq!(out["usage"]["total_tokens"], 8);
    }

    #[test]
    fn test_reasoning_content() {
        let mut prog = Program::new();
        prog.emit(Opcode::MsgStart);
        prog.emit(Opcode::RoleAst);
        prog.emit(Opcode::ThinkStart);
        prog.emit_str(Opcode::ThinkChunk, "hmm");
        prog.emit(Opcode::ThinkEnd);
        prog.emit_str(Opcode::TxtChunk, "answer");
        prog.emit_str(Opcode::RespDone, "stop");
        prog.emit(Opcode::MsgEnd);

        let msg = &emit_value(&prog)["choices"][0]["message"];
        assert_eq!(msg["reasoning_content"], "hmm");
        assert_eq!(msg["content"], "answer");
    }

    #[test]
    fn test_multiple_choices_indexed() {
        let mut prog = Program::new();
        for text in ["a", "b"] {
            prog.emit(Opcode::MsgStart);
            prog.emit(Opcode::RoleAst);
            prog.emit_str(Opcode::TxtChunk, text);
            prog.emit_str(Opcode::RespDone, "stop");
            prog.emit(Opcode::MsgEnd);
        }
        let out = emit_value(&prog);
        assert_eq!(out["choices"][1]["index"], 1);
        assert_eq!(out["choices"][1]["message"]["content"], "b");
    }
}

//! Responses request emission.

use serde_json::{json, Map, Value};

use crate::error::AilError;
use crate::extras::ExtrasCollector;
use crate::opcode::Opcode;
use crate::program::Program;
use crate::protocol::{CONTENT_BLOCK_KEY, MEDIA_TYPE_KEY};

/// Emits a program as a Responses request body. System messages join into
/// the top-level `instructions` string; tools are flat.
///
/// # Errors
///
/// Serialization of the assembled document is the only fallible step.
pub fn emit_request(prog: &Program) -> Result<Vec<u8>, AilError> {
    let mut result = Map::new();
    let mut ec = ExtrasCollector::new();
    let mut input: Vec<Value> = Vec::new();
    let mut tools: Vec<Value> = Vec::new();
    let mut instructions = String::new();

    let mut in_message = false;
    let mut role = "";
    let mut text = String::new();
    // Content stays a plain string until an unrecognized part forces the
    // typed-parts array form.
    let mut parts: Vec<Value> = Vec::new();
    let mut multipart = false;

    let mut in_tool_defs = false;
    let mut current_tool: Option<Map<String, Value>> = None;

    for inst in &prog.code {
        match inst.op {
            Opcode::SetModel => {
                result.insert("model".into(), json!(inst.as_str().unwrap_or("")));
            }
            Opcode::SetTemp => {
                result.insert("temperature".into(), json!(inst.as_float().unwrap_or(0.0)));
            }
            Opcode::SetTopp => {
                result.insert("top_p".into(), json!(inst.as_float().unwrap_or(0.0)));
            }
            Opcode::SetMax => {
                result.insert(
                    "max_output_tokens".into(),
                    json!(inst.as_int().unwrap_or(0)),
                );
            }
            Opcode::SetStream => {
                result.insert("stream".into(), json!(true));
            }
            Opcode::SetThink => {
                if let Ok(reasoning) =
                    serde_json::from_slice::<Value>(inst.as_json().unwrap_or(b"null"))
                {
                    result.insert("reasoning".into(), reasoning);
                }
            }

            Opcode::MsgStart => {
                ec.push();
                in_message = true;
                role = "";
                text.clear();
                parts.clear();
                multipart = false;
            }
            Opcode::RoleSys => role = "system",
            Opcode::RoleUsr => role = "user",
            Opcode::RoleAst => role = "assistant",
            Opcode::RoleTool => role = "tool",

            Opcode::TxtChunk => {
                if in_message {
                    if multipart {
                        parts.push(text_part(role, inst.as_str().unwrap_or("")));
                    } else {
                        text.push_str(inst.as_str().unwrap_or(""));
                    }
                }
            }

            Opcode::MsgEnd => {
                if in_message {
                    if role == "system" {
                        if !instructions.is_empty() && !text.is_empty() {
                            instructions.push_str("\n\n");
                        }
                        instructions.push_str(&text);
                        text.clear();
                    } else {
                        let mut msg = Map::new();
                        msg.insert("role".into(), json!(role));
                        if multipart {
                            msg.insert("content".into(), Value::Array(std::mem::take(&mut parts)));
                        } else if !text.is_empty() {
                            msg.insert("content".into(), json!(std::mem::take(&mut text)));
                        }
                        ec.merge_into(&mut msg);
                        input.push(Value::Object(msg));
                    }
                    in_message = false;
                }
                ec.pop();
            }

            Opcode::DefStart => {
                ec.push();
                in_tool_defs = true;
                current_tool = None;
            }
            Opcode::DefName => {
                if in_tool_defs {
                    if let Some(mut tool) = current_tool.take() {
                        ec.merge_into(&mut tool);
                        tools.push(Value::Object(tool));
                    }
                    current_tool = Some(Map::from_iter([
                        ("type".to_string(), json!("function")),
                        ("name".to_string(), json!(inst.as_str().unwrap_or(""))),
                    ]));
                }
            }
            Opcode::DefDesc => {
                if let Some(tool) = current_tool.as_mut() {
                    tool.insert("description".into(), json!(inst.as_str().unwrap_or("")));
                }
            }
            Opcode::DefSchema => {
                if let Some(tool) = current_tool.as_mut() {
                    if let Ok(schema) =
                        serde_json::from_slice::<Value>(inst.as_json().unwrap_or(b"null"))
                    {
                        tool.insert("parameters".into(), schema);
                    }
                }
            }
            Opcode::DefEnd => {
                if in_tool_defs {
                    if let Some(mut tool) = current_tool.take() {
                        ec.merge_into(&mut tool);
                        tools.push(Value::Object(tool));
                    }
                }
                ec.pop();
                in_tool_defs = false;
            }

            Opcode::SetMeta => {
                let (key, val) = (inst.key().unwrap_or(""), inst.as_str().unwrap_or(""));
                if key == MEDIA_TYPE_KEY {
                    // consumed by media refs; no Responses equivalent
                } else if ec.depth() > 0 {
                    ec.add_string(key, val);
                } else {
                    result.insert(key.to_string(), val.into());
                }
            }
            Opcode::ExtData => {
                let key = inst.key().unwrap_or("");
                if key == CONTENT_BLOCK_KEY && in_message {
                    // An unrecognized content part forces the array form and
                    // goes back into it, not onto the message object.
                    if let Ok(part) =
                        serde_json::from_slice::<Value>(inst.as_json().unwrap_or(b"null"))
                    {
                        if !multipart {
                            multipart = true;
                            if !text.is_empty() {
                                let flushed = std::mem::take(&mut text);
                                parts.push(text_part(role, &flushed));
                            }
                        }
                        parts.push(part);
                    }
                } else {
                    ec.add_json(key, inst.as_json().unwrap_or(b"null"));
                }
            }

            _ => {}
        }
    }

    if !instructions.is_empty() {
        result.insert("instructions".into(), instructions.into());
    }
    if !input.is_empty() {
        result.insert("input".into(), Value::Array(input));
    }
    if !tools.is_empty() {
        result.insert("tools".into(), Value::Array(tools));
    }

    ec.merge_into(&mut result);
    Ok(serde_json::to_vec(&Value::Object(result))?)
}

/// A typed text part for array-form content. Assistant text streams back as
/// `output_text`, everything else as `input_text`.
fn text_part(role: &str, text: &str) -> Value {
    let part_type = if role == "assistant" {
        "output_text"
    } else {
        "input_text"
    };
    json!({"type": part_type, "text": text})
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emit_value(prog: &Program) -> Value {
        serde_json::from_slice(&emit_request(prog).unwrap()).unwrap()
    }

    #[test]
    fn test_system_joins_into_instructions() {
        let mut prog = Program::new();
        prog.emit_str(Opcode::SetModel, "gpt-4o");
        prog.emit_int(Opcode::SetMax, 100);
        prog.emit(Opcode::SetStream);
        prog.emit(Opcode::MsgStart);
        prog.emit(Opcode::RoleSys);
        prog.emit_str(Opcode::TxtChunk, "Be helpful");
        prog.emit(Opcode::MsgEnd);
        prog.emit(Opcode::MsgStart);
        prog.emit(Opcode::RoleUsr);
        prog.emit_str(Opcode::TxtChunk, "Hello");
        prog.emit(Opcode::MsgEnd);

        let out = emit_value(&prog);
        assert_eq!(out["instructions"], "Be helpful");
        assert_eq!(out["max_output_tokens"], 100);
        let input = out["input"].as_array().unwrap();
        assert_eq!(input.len(), 1);
        assert_eq!(input[0]["role"], "user");
        assert_eq!(input[0]["content"], "Hello");
    }

    #[test]
    fn test_flat_tools() {
        let mut prog = Program::new();
        prog.emit(Opcode::DefStart);
        prog.emit_str(Opcode::DefName, "search");
        prog.emit_str(Opcode::DefDesc, "Search the web");
        prog.emit_json(Opcode::DefSchema, br#"{"type":"object"}"#.to_vec());
        prog.emit(Opcode::DefEnd);

        let tool = &emit_value(&prog)["tools"][0];
        assert_eq!(tool["type"], "function");
        assert_eq!(tool["name"], "search");
        assert!(tool.get("function").is_none());
    }

    #[test]
    fn test_reasoning_restored() {
        let mut prog = Program::new();
        prog.emit_json(Opcode::SetThink, br#"{"effort":"low"}"#.to_vec());
        assert_eq!(emit_value(&prog)["reasoning"]["effort"], "low");
    }
}

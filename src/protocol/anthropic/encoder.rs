//! Anthropic Messages request emission.

use serde_json::{json, Map, Value};

use crate::error::AilError;
use crate::extras::ExtrasCollector;
use crate::opcode::Opcode;
use crate::program::Program;
use crate::protocol::{CONTENT_BLOCK_KEY, MEDIA_TYPE_KEY};

/// Default `max_tokens` when the program carries no SET_MAX; the field is
/// mandatory on the Anthropic wire.
const DEFAULT_MAX_TOKENS: i32 = 4096;

/// Emits a program as an Anthropic Messages request body.
///
/// System messages lift into the top-level `system` string (joined with
/// `"\n\n"` when stacked); tool-role messages become user messages wrapping
/// `tool_result` blocks.
///
/// # Errors
///
/// Serialization of the assembled document is the only fallible step.
pub fn emit_request(prog: &Program) -> Result<Vec<u8>, AilError> {
    let mut result = Map::new();
    let mut ec = ExtrasCollector::new();
    let mut messages: Vec<Value> = Vec::new();
    let mut tools: Vec<Value> = Vec::new();
    let mut stop_seqs: Vec<String> = Vec::new();
    let mut system_text = String::new();
    let mut saw_max_tokens = false;

    let mut in_message = false;
    let mut role = "";
    let mut blocks: Vec<Value> = Vec::new();
    let mut text = String::new();
    let mut wrap_tool_results = false;
    let mut result_call_id = String::new();
    let mut media_type: Option<String> = None;

    let mut in_tool_defs = false;
    let mut current_tool: Option<Map<String, Value>> = None;

    let mut in_think = false;
    let mut think_text = String::new();
    let mut think_signature: Option<String> = None;

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
                saw_max_tokens = true;
                result.insert("max_tokens".into(), json!(inst.as_int().unwrap_or(0)));
            }
            Opcode::SetStop => {
                stop_seqs.push(inst.as_str().unwrap_or("").to_string());
            }
            Opcode::SetStream => {
                result.insert("stream".into(), json!(true));
            }

            Opcode::MsgStart => {
                ec.push();
                in_message = true;
                role = "";
                blocks.clear();
                text.clear();
                wrap_tool_results = false;
                result_call_id.clear();
            }
            Opcode::RoleSys => role = "system",
            Opcode::RoleUsr => role = "user",
            Opcode::RoleAst => role = "assistant",
            Opcode::RoleTool => {
                // Tool results ride in a user message as tool_result blocks.
                role = "user";
                wrap_tool_results = true;
            }

            Opcode::TxtChunk => {
                if in_message {
                    text.push_str(inst.as_str().unwrap_or(""));
                }
            }

            Opcode::ImgRef => {
                if in_message {
                    flush_text(&mut text, &mut blocks);
                    let data = prog.buffer_text(inst.as_buf_ref().unwrap_or(u32::MAX));
                    let media = media_type.take().unwrap_or_else(|| "image/png".to_string());
                    blocks.push(json!({
                        "type": "image",
                        "source": {"type": "base64", "media_type": media, "data": data},
                    }));
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

            Opcode::ResultStart => {
                result_call_id = inst.as_str().unwrap_or("").to_string();
            }
            Opcode::ResultData => {
                if wrap_tool_results {
                    flush_text(&mut text, &mut blocks);
                    blocks.push(json!({
                        "type": "tool_result",
                        "tool_use_id": result_call_id,
                        "content": inst.as_str().unwrap_or(""),
                    }));
                } else {
                    text.push_str(inst.as_str().unwrap_or(""));
                }
            }
            Opcode::ResultEnd => {}

            Opcode::MsgEnd => {
                if in_message {
                    if role == "system" {
                        if !system_text.is_empty() && !text.is_empty() {
                            system_text.push_str("\n\n");
                        }
                        system_text.push_str(&text);
                        text.clear();
                    } else {
                        let mut msg = Map::new();
                        msg.insert("role".into(), json!(role));
                        if !blocks.is_empty() {
                            flush_text(&mut text, &mut blocks);
                            msg.insert("content".into(), Value::Array(std::mem::take(&mut blocks)));
                        } else if !text.is_empty() {
                            msg.insert("content".into(), json!(std::mem::take(&mut text)));
                        }
                        ec.merge_into(&mut msg);
                        messages.push(Value::Object(msg));
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
                    current_tool = Some(Map::from_iter([(
                        "name".to_string(),
                        json!(inst.as_str().unwrap_or("")),
                    )]));
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
                        tool.insert("input_schema".into(), schema);
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
                    media_type = Some(val.to_string());
                } else if ec.depth() > 0 {
                    ec.add_string(key, val);
                } else {
                    let meta = result
                        .entry("metadata")
                        .or_insert_with(|| Value::Object(Map::new()));
                    if let Value::Object(meta) = meta {
                        meta.insert(key.to_string(), val.into());
                    }
                }
            }
            Opcode::ExtData => {
                let key = inst.key().unwrap_or("");
                if key == CONTENT_BLOCK_KEY && in_message {
                    // An unrecognized content block goes back into the
                    // content array, not onto the message object.
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

            _ => {}
        }
    }

    if !system_text.is_empty() {
        result.insert("system".into(), system_text.into());
    }
    if !messages.is_empty() {
        result.insert("messages".into(), Value::Array(messages));
    }
    if !tools.is_empty() {
        result.insert("tools".into(), Value::Array(tools));
    }
    if !stop_seqs.is_empty() {
        result.insert("stop_sequences".into(), json!(stop_seqs));
    }
    if !saw_max_tokens {
        result.insert("max_tokens".into(), json!(DEFAULT_MAX_TOKENS));
    }

    ec.merge_into(&mut result);
    Ok(serde_json::to_vec(&Value::Object(result))?)
}

fn flush_text(text: &mut String, blocks: &mut Vec<Value>) {
    if !text.is_empty() {
        let flushed = std::mem::take(text);
        blocks.push(json!({"type": "text", "text": flushed}));
    }
}

pub(super) fn last_block_of_type<'a>(
    blocks: &'a mut [Value],
    block_type: &str,
) -> Option<&'a mut Map<String, Value>> {
    let block = blocks.last_mut()?.as_object_mut()?;
    if block.get("type").and_then(Value::as_str) == Some(block_type) {
        Some(block)
    } else {
        None
    }
}

//! Chat Completions request emission.

use serde_json::{json, Map, Value};

use crate::error::AilError;
use crate::extras::ExtrasCollector;
use crate::opcode::Opcode;
use crate::program::Program;
use crate::protocol::{CONTENT_BLOCK_KEY, MEDIA_TYPE_KEY};

/// Emits a program as a Chat Completions request body.
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

    let mut current: Option<MessageState> = None;

    // Tool definition state. Tools are separated by DEF_NAME, not nested
    // START/END pairs.
    let mut in_tool_defs = false;
    let mut current_tool: Option<Map<String, Value>> = None;

    // Thinking block state.
    let mut in_think = false;
    let mut think_text = String::new();

    for inst in &prog.code {
        match inst.op {
            Opcode::SetModel => {
                result.insert("model".into(), inst.as_str().unwrap_or("").into());
            }
            Opcode::SetTemp => {
                result.insert("temperature".into(), json!(inst.as_float().unwrap_or(0.0)));
            }
            Opcode::SetTopp => {
                result.insert("top_p".into(), json!(inst.as_float().unwrap_or(0.0)));
            }
            Opcode::SetMax => {
                result.insert("max_tokens".into(), json!(inst.as_int().unwrap_or(0)));
            }
            Opcode::SetStop => {
                stop_seqs.push(inst.as_str().unwrap_or("").to_string());
            }
            Opcode::SetStream => {
                result.insert("stream".into(), json!(true));
                result.insert("stream_options".into(), json!({"include_usage": true}));
            }
            Opcode::SetThink => {
                if let Some(effort) = inst
                    .as_json()
                    .and_then(|j| serde_json::from_slice::<Value>(j).ok())
                    .and_then(|v| v.get("effort").and_then(Value::as_str).map(String::from))
                {
                    result.insert("reasoning_effort".into(), effort.into());
                }
            }

            Opcode::MsgStart => {
                ec.push();
                current = Some(MessageState::default());
            }
            Opcode::RoleSys => set_role(&mut current, "system"),
            Opcode::RoleUsr => set_role(&mut current, "user"),
            Opcode::RoleAst => set_role(&mut current, "assistant"),
            Opcode::RoleTool => set_role(&mut current, "tool"),

            Opcode::TxtChunk => {
                if let Some(msg) = current.as_mut() {
                    let text = inst.as_str().unwrap_or("");
                    if msg.multimodal {
                        msg.parts.push(json!({"type": "text", "text": text}));
                    } else {
                        msg.text.push_str(text);
                    }
                }
            }

            Opcode::ImgRef => {
                if let Some(msg) = current.as_mut() {
                    msg.promote_to_multimodal();
                    let url = prog.buffer_text(inst.as_buf_ref().unwrap_or(u32::MAX));
                    msg.parts
                        .push(json!({"type": "image_url", "image_url": {"url": url}}));
                }
            }
            Opcode::AudRef => {
                if let Some(msg) = current.as_mut() {
                    msg.promote_to_multimodal();
                    let data = prog.buffer_text(inst.as_buf_ref().unwrap_or(u32::MAX));
                    let mut audio = Map::new();
                    audio.insert("data".into(), json!(data));
                    if let Some(media) = msg.media_type.take() {
                        if let Some(format) = media.strip_prefix("audio/") {
                            audio.insert("format".into(), format.into());
                        }
                    }
                    msg.parts
                        .push(json!({"type": "input_audio", "input_audio": audio}));
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
            Opcode::ThinkRef => {}
            Opcode::ThinkEnd => {
                if in_think && !think_text.is_empty() {
                    if let Some(msg) = current.as_mut() {
                        msg.reasoning = Some(std::mem::take(&mut think_text));
                    }
                }
                in_think = false;
            }

            Opcode::CallStart => {
                ec.push();
                if let Some(msg) = current.as_mut() {
                    msg.tool_calls.push(Map::from_iter([
                        ("id".to_string(), json!(inst.as_str().unwrap_or(""))),
                        ("type".to_string(), json!("function")),
                    ]));
                }
            }
            Opcode::CallName => {
                if let Some(call) = current.as_mut().and_then(|m| m.tool_calls.last_mut()) {
                    function_of(call).insert("name".into(), json!(inst.as_str().unwrap_or("")));
                }
            }
            Opcode::CallArgs => {
                if let Some(call) = current.as_mut().and_then(|m| m.tool_calls.last_mut()) {
                    let args = String::from_utf8_lossy(inst.as_json().unwrap_or(b"")).into_owned();
                    function_of(call).insert("arguments".into(), args.into());
                }
            }
            Opcode::CallEnd => {
                if let Some(call) = current.as_mut().and_then(|m| m.tool_calls.last_mut()) {
                    ec.merge_into(call);
                }
                ec.pop();
            }

            Opcode::ResultStart => {
                if let Some(msg) = current.as_mut() {
                    msg.tool_call_id = Some(inst.as_str().unwrap_or("").to_string());
                }
            }
            Opcode::ResultData => {
                if let Some(msg) = current.as_mut() {
                    msg.text = inst.as_str().unwrap_or("").to_string();
                }
            }
            Opcode::ResultEnd => {}

            Opcode::MsgEnd => {
                if let Some(msg) = current.take() {
                    messages.push(msg.finish(&mut ec));
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
                        ec.merge_into(function_of(&mut tool));
                        tools.push(Value::Object(tool));
                    }
                    current_tool = Some(Map::from_iter([
                        ("type".to_string(), json!("function")),
                        (
                            "function".to_string(),
                            json!({"name": inst.as_str().unwrap_or("")}),
                        ),
                    ]));
                }
            }
            Opcode::DefDesc => {
                if let Some(tool) = current_tool.as_mut() {
                    function_of(tool)
                        .insert("description".into(), json!(inst.as_str().unwrap_or("")));
                }
            }
            Opcode::DefSchema => {
                if let Some(tool) = current_tool.as_mut() {
                    if let Ok(schema) =
                        serde_json::from_slice::<Value>(inst.as_json().unwrap_or(b"null"))
                    {
                        function_of(tool).insert("parameters".into(), schema);
                    }
                }
            }
            Opcode::DefEnd => {
                if in_tool_defs {
                    if let Some(mut tool) = current_tool.take() {
                        ec.merge_into(function_of(&mut tool));
                        tools.push(Value::Object(tool));
                    }
                }
                ec.pop();
                in_tool_defs = false;
            }

            Opcode::SetMeta => {
                let (key, val) = (inst.key().unwrap_or(""), inst.as_str().unwrap_or(""));
                if key == MEDIA_TYPE_KEY {
                    if let Some(msg) = current.as_mut() {
                        msg.media_type = Some(val.to_string());
                    }
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
                if key == CONTENT_BLOCK_KEY && current.is_some() {
                    // An unrecognized content part goes back into the
                    // content array, not onto the message object.
                    if let (Some(msg), Ok(part)) = (
                        current.as_mut(),
                        serde_json::from_slice::<Value>(inst.as_json().unwrap_or(b"null")),
                    ) {
                        msg.promote_to_multimodal();
                        msg.parts.push(part);
                    }
                } else {
                    ec.add_json(key, inst.as_json().unwrap_or(b"null"));
                }
            }

            _ => {}
        }
    }

    if !messages.is_empty() {
        result.insert("messages".into(), Value::Array(messages));
    }
    if !tools.is_empty() {
        result.insert("tools".into(), Value::Array(tools));
    }
    match stop_seqs.len() {
        0 => {}
        1 => {
            result.insert("stop".into(), json!(stop_seqs[0]));
        }
        _ => {
            result.insert("stop".into(), json!(stop_seqs));
        }
    }

    ec.merge_into(&mut result);
    Ok(serde_json::to_vec(&Value::Object(result))?)
}

/// Per-message assembly state.
#[derive(Default)]
pub(super) struct MessageState {
    pub role: &'static str,
    pub text: String,
    pub parts: Vec<Value>,
    pub multimodal: bool,
    pub reasoning: Option<String>,
    pub tool_calls: Vec<Map<String, Value>>,
    pub tool_call_id: Option<String>,
    pub media_type: Option<String>,
}

impl MessageState {
    /// Flushes accumulated plain text into the parts list and switches the
    /// message to multimodal content.
    pub fn promote_to_multimodal(&mut self) {
        self.multimodal = true;
        if !self.text.is_empty() {
            let text = std::mem::take(&mut self.text);
            self.parts.push(json!({"type": "text", "text": text}));
        }
    }

    fn finish(self, ec: &mut ExtrasCollector) -> Value {
        let mut msg = Map::new();
        msg.insert("role".into(), self.role.into());

        if self.role == "tool" && self.tool_call_id.is_some() {
            msg.insert("tool_call_id".into(), json!(self.tool_call_id));
            msg.insert("content".into(), json!(self.text));
        } else if self.multimodal {
            msg.insert("content".into(), Value::Array(self.parts));
        } else if !self.text.is_empty() {
            msg.insert("content".into(), json!(self.text));
        }

        if let Some(reasoning) = self.reasoning {
            msg.insert("reasoning_content".into(), reasoning.into());
        }
        if !self.tool_calls.is_empty() {
            msg.insert(
                "tool_calls".into(),
                Value::Array(self.tool_calls.into_iter().map(Value::Object).collect()),
            );
        }
        ec.merge_into(&mut msg);
        Value::Object(msg)
    }
}

fn set_role(current: &mut Option<MessageState>, role: &'static str) {
    if let Some(msg) = current.as_mut() {
        msg.role = role;
    }
}

/// The `function` object of a tool or tool call, created on demand.
pub(super) fn function_of(obj: &mut Map<String, Value>) -> &mut Map<String, Value> {
    let entry = obj
        .entry("function")
        .or_insert_with(|| Value::Object(Map::new()));
    match entry {
        Value::Object(map) => map,
        other => {
            *other = Value::Object(Map::new());
            match other {
                Value::Object(map) => map,
                _ => unreachable!(),
            }
        }
    }
}

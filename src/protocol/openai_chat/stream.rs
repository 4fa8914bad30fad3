//! Chat Completions stream-chunk parsing and emission.

use serde_json::{json, Map, Value};

use crate::error::PayloadKind;
use crate::opcode::Opcode;
use crate::program::Program;
use crate::protocol::{parse_outer, passthrough_ext, take_str, value_to_json, ToolDelta};
use crate::style::Style;
use crate::AilError;

/// Parses one streaming chunk into a (partial) program.
///
/// # Errors
///
/// Only the outer JSON parse can fail.
pub fn parse_stream_chunk(body: &[u8]) -> Result<Program, AilError> {
    let mut raw = parse_outer(body, Style::ChatCompletions, PayloadKind::StreamChunk)?;
    let mut prog = Program::new();

    if let Some(id) = take_str(&mut raw, "id") {
        prog.emit_str(Opcode::RespId, id);
    }
    if let Some(model) = take_str(&mut raw, "model") {
        prog.emit_str(Opcode::RespModel, model);
    }
    // Usage appears in the final chunk when stream_options.include_usage is
    // set; it is null on earlier chunks.
    match raw.shift_remove("usage") {
        Some(Value::Null) | None => {}
        Some(usage) => prog.emit_json(Opcode::Usage, value_to_json(&usage)),
    }

    if let Some(Value::Array(choices)) = raw.shift_remove("choices") {
        for choice in choices {
            let Value::Object(mut choice) = choice else {
                continue;
            };
            if let Some(Value::Object(mut delta)) = choice.shift_remove("delta") {
                if take_str(&mut delta, "role").is_some_and(|r| !r.is_empty()) {
                    prog.emit(Opcode::StreamStart);
                }
                if let Some(content) = take_str(&mut delta, "content") {
                    if !content.is_empty() {
                        prog.emit_str(Opcode::StreamDelta, content);
                    }
                }
                if let Some(reasoning) = take_str(&mut delta, "reasoning_content") {
                    if !reasoning.is_empty() {
                        prog.emit_str(Opcode::StreamThinkDelta, reasoning);
                    }
                }
                if let Some(Value::Array(tool_calls)) = delta.shift_remove("tool_calls") {
                    for call in tool_calls {
                        if let Some(delta) = tool_call_fragment(&call) {
                            prog.emit_json(Opcode::StreamToolDelta, delta.to_json());
                        }
                    }
                }
            }
            if let Some(finish) = take_str(&mut choice, "finish_reason") {
                if !finish.is_empty() {
                    prog.emit_str(Opcode::RespDone, finish);
                    prog.emit(Opcode::StreamEnd);
                }
            }
        }
    }

    passthrough_ext(&mut prog, raw);
    Ok(prog)
}

fn tool_call_fragment(call: &Value) -> Option<ToolDelta> {
    let call = call.as_object()?;
    let mut delta = ToolDelta {
        index: call.get("index").and_then(Value::as_u64).unwrap_or(0),
        ..ToolDelta::default()
    };
    if let Some(id) = call.get("id").and_then(Value::as_str) {
        if !id.is_empty() {
            delta.id = Some(id.to_string());
        }
    }
    if let Some(func) = call.get("function").and_then(Value::as_object) {
        if let Some(name) = func.get("name").and_then(Value::as_str) {
            if !name.is_empty() {
                delta.name = Some(name.to_string());
            }
        }
        if let Some(args) = func.get("arguments").and_then(Value::as_str) {
            if !args.is_empty() {
                delta.arguments = Some(args.to_string());
            }
        }
    }
    Some(delta)
}

/// Emits a (partial) program as one streaming chunk.
///
/// # Errors
///
/// Serialization of the assembled document is the only fallible step.
pub fn emit_stream_chunk(prog: &Program) -> Result<Option<Vec<u8>>, AilError> {
    let mut result = Map::new();
    result.insert("object".into(), json!("chat.completion.chunk"));

    let mut choices: Vec<Value> = Vec::new();
    let mut delta: Option<Map<String, Value>> = None;

    fn delta_mut<'a>(delta: &'a mut Option<Map<String, Value>>) -> &'a mut Map<String, Value> {
        delta.get_or_insert_with(Map::new)
    }

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

            Opcode::StreamStart => {
                delta_mut(&mut delta).insert("role".into(), json!("assistant"));
            }
            Opcode::StreamDelta => {
                let map = delta_mut(&mut delta);
                match map.get_mut("content") {
                    Some(Value::String(existing)) => {
                        existing.push_str(inst.as_str().unwrap_or(""));
                    }
                    _ => {
                        map.insert("content".into(), json!(inst.as_str().unwrap_or("")));
                    }
                }
            }
            Opcode::StreamThinkDelta => {
                let map = delta_mut(&mut delta);
                match map.get_mut("reasoning_content") {
                    Some(Value::String(existing)) => {
                        existing.push_str(inst.as_str().unwrap_or(""));
                    }
                    _ => {
                        map.insert("reasoning_content".into(), json!(inst.as_str().unwrap_or("")));
                    }
                }
            }
            Opcode::StreamToolDelta => {
                if let Some(fragment) = ToolDelta::from_json(inst.as_json().unwrap_or(b"{}")) {
                    let mut call = Map::new();
                    call.insert("index".into(), json!(fragment.index));
                    call.insert("type".into(), json!("function"));
                    if let Some(id) = fragment.id {
                        call.insert("id".into(), id.into());
                    }
                    let mut func = Map::new();
                    if let Some(name) = fragment.name {
                        func.insert("name".into(), name.into());
                    }
                    if let Some(args) = fragment.arguments {
                        func.insert("arguments".into(), args.into());
                    }
                    if !func.is_empty() {
                        call.insert("function".into(), Value::Object(func));
                    }
                    let map = delta_mut(&mut delta);
                    match map.get_mut("tool_calls") {
                        Some(Value::Array(calls)) => calls.push(Value::Object(call)),
                        _ => {
                            map.insert("tool_calls".into(), json!([call]));
                        }
                    }
                }
            }

            Opcode::RespDone => {
                if let Some(open) = delta.take() {
                    choices.push(json!({"index": 0, "delta": open}));
                }
                choices.push(json!({
                    "index": 0,
                    "delta": {},
                    "finish_reason": inst.as_str().unwrap_or(""),
                }));
            }

            Opcode::ExtData => {
                if let Ok(value) =
                    serde_json::from_slice::<Value>(inst.as_json().unwrap_or(b"null"))
                {
                    result.insert(inst.key().unwrap_or("").to_string(), value);
                }
            }

            // End marker carries no data of its own.
            Opcode::StreamEnd => {}
            _ => {}
        }
    }

    if let Some(open) = delta.take() {
        choices.push(json!({"index": 0, "delta": open}));
    }

    // Structural no-ops (a bare STREAM_END, metadata-only chunks) have no
    // representation in this framing; the translator elides them.
    let only_metadata = result
        .keys()
        .all(|k| matches!(k.as_str(), "object" | "id" | "model"));
    if choices.is_empty() && only_metadata {
        return Ok(None);
    }
    result.insert("choices".into(), Value::Array(choices));

    Ok(Some(serde_json::to_vec(&Value::Object(result))?))
}

//! Chat Completions request parsing.

use serde_json::{Map, Value};

use crate::error::PayloadKind;
use crate::opcode::Opcode;
use crate::program::Program;
use crate::protocol::{
    parse_outer, passthrough_ext, take_bool, take_f64, take_i32, take_str, value_to_json,
    CONTENT_BLOCK_KEY, MEDIA_TYPE_KEY,
};
use crate::style::Style;
use crate::AilError;

/// Parses a Chat Completions request body into a program.
///
/// # Errors
///
/// Only the outer JSON parse can fail; malformed substructure is skipped or
/// routed through EXT_DATA.
pub fn parse_request(body: &[u8]) -> Result<Program, AilError> {
    let mut raw = parse_outer(body, Style::ChatCompletions, PayloadKind::Request)?;
    let mut prog = Program::new();

    if let Some(model) = take_str(&mut raw, "model") {
        prog.emit_str(Opcode::SetModel, model);
    }
    if let Some(temp) = take_f64(&mut raw, "temperature") {
        prog.emit_float(Opcode::SetTemp, temp);
    }
    if let Some(top_p) = take_f64(&mut raw, "top_p") {
        prog.emit_float(Opcode::SetTopp, top_p);
    }
    if let Some(max) = take_i32(&mut raw, "max_tokens") {
        prog.emit_int(Opcode::SetMax, max);
    } else if let Some(max) = take_i32(&mut raw, "max_completion_tokens") {
        prog.emit_int(Opcode::SetMax, max);
    }

    // stop can be a single string or an array of strings.
    match raw.shift_remove("stop") {
        Some(Value::String(s)) => prog.emit_str(Opcode::SetStop, s),
        Some(Value::Array(items)) => {
            for item in items {
                if let Value::String(s) = item {
                    prog.emit_str(Opcode::SetStop, s);
                }
            }
        }
        _ => {}
    }

    if take_bool(&mut raw, "stream") == Some(true) {
        prog.emit(Opcode::SetStream);
    }

    if let Some(effort) = take_str(&mut raw, "reasoning_effort") {
        if !effort.is_empty() {
            prog.emit_json(
                Opcode::SetThink,
                value_to_json(&serde_json::json!({ "effort": effort })),
            );
        }
    }

    if let Some(Value::Array(tools)) = raw.shift_remove("tools") {
        if !tools.is_empty() {
            prog.emit(Opcode::DefStart);
            for tool in tools {
                let Value::Object(mut tool) = tool else {
                    continue;
                };
                let Some(Value::Object(mut func)) = tool.shift_remove("function") else {
                    continue;
                };
                // "type" is always "function"; the emitter reconstructs it.
                tool.shift_remove("type");

                if let Some(name) = take_str(&mut func, "name") {
                    prog.emit_str(Opcode::DefName, name);
                }
                if let Some(desc) = take_str(&mut func, "description") {
                    if !desc.is_empty() {
                        prog.emit_str(Opcode::DefDesc, desc);
                    }
                }
                if let Some(params) = func.shift_remove("parameters") {
                    prog.emit_json(Opcode::DefSchema, value_to_json(&params));
                }
                // Remaining function-level fields (e.g. strict), then
                // tool-level fields, scoped to this definition.
                passthrough_ext(&mut prog, func);
                passthrough_ext(&mut prog, tool);
            }
            prog.emit(Opcode::DefEnd);
        }
    }

    if let Some(Value::Array(messages)) = raw.shift_remove("messages") {
        for message in messages {
            let Value::Object(msg) = message else {
                continue;
            };
            parse_message(&mut prog, msg);
        }
    }

    // Reconstructed by the emitter from SET_STREAM.
    raw.shift_remove("stream_options");
    passthrough_ext(&mut prog, raw);

    Ok(prog)
}

fn parse_message(prog: &mut Program, mut msg: Map<String, Value>) {
    prog.emit(Opcode::MsgStart);

    let role = take_str(&mut msg, "role").unwrap_or_default();
    let mut in_result = false;
    match role.as_str() {
        "system" | "developer" => prog.emit(Opcode::RoleSys),
        "user" => prog.emit(Opcode::RoleUsr),
        "assistant" => prog.emit(Opcode::RoleAst),
        "tool" => {
            prog.emit(Opcode::RoleTool);
            if let Some(call_id) = take_str(&mut msg, "tool_call_id") {
                if !call_id.is_empty() {
                    prog.emit_str(Opcode::ResultStart, call_id);
                    in_result = true;
                }
            }
        }
        _ => {}
    }

    match msg.shift_remove("content") {
        Some(Value::String(content)) => {
            if in_result {
                prog.emit_str(Opcode::ResultData, content);
            } else {
                prog.emit_str(Opcode::TxtChunk, content);
            }
        }
        Some(Value::Array(parts)) => {
            for part in parts {
                if let Value::Object(part) = part {
                    parse_content_part(prog, part);
                }
            }
        }
        _ => {}
    }

    // Reasoning text exposed by open models (DeepSeek, QwQ, ...).
    if let Some(reasoning) = take_str(&mut msg, "reasoning_content") {
        if !reasoning.is_empty() {
            prog.emit(Opcode::ThinkStart);
            prog.emit_str(Opcode::ThinkChunk, reasoning);
            prog.emit(Opcode::ThinkEnd);
        }
    }

    if let Some(Value::Array(tool_calls)) = msg.shift_remove("tool_calls") {
        for call in tool_calls {
            if let Value::Object(call) = call {
                parse_tool_call(prog, call);
            }
        }
    }

    if in_result {
        prog.emit(Opcode::ResultEnd);
    }

    // Remaining per-message fields (name, refusal, ...) scoped here.
    passthrough_ext(prog, msg);
    prog.emit(Opcode::MsgEnd);
}

fn parse_content_part(prog: &mut Program, mut part: Map<String, Value>) {
    let part_type = part
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    match part_type.as_str() {
        "text" => {
            let text = take_str(&mut part, "text").unwrap_or_default();
            prog.emit_str(Opcode::TxtChunk, text);
        }
        "image_url" => {
            if let Some(image) = part.get("image_url") {
                if let Some(url) = image.get("url").and_then(Value::as_str) {
                    let buf = prog.add_buffer(url.as_bytes().to_vec());
                    prog.emit_ref(Opcode::ImgRef, buf);
                }
            }
        }
        "input_audio" => {
            if let Some(audio) = part.get("input_audio") {
                let data = audio.get("data").and_then(Value::as_str).unwrap_or("");
                let buf = prog.add_buffer(data.as_bytes().to_vec());
                if let Some(format) = audio.get("format").and_then(Value::as_str) {
                    if !format.is_empty() {
                        prog.emit_kv(Opcode::SetMeta, MEDIA_TYPE_KEY, format!("audio/{format}"));
                    }
                }
                prog.emit_ref(Opcode::AudRef, buf);
            }
        }
        _ => {
            // Unknown part types pass through at block scope; the emitter
            // splices them back into the content array.
            prog.emit_kj(
                Opcode::ExtData,
                CONTENT_BLOCK_KEY,
                value_to_json(&Value::Object(part)),
            );
        }
    }
}

pub(super) fn parse_tool_call(prog: &mut Program, mut call: Map<String, Value>) {
    let id = take_str(&mut call, "id").unwrap_or_default();
    prog.emit_str(Opcode::CallStart, id);
    if let Some(Value::Object(mut func)) = call.shift_remove("function") {
        if let Some(name) = take_str(&mut func, "name") {
            prog.emit_str(Opcode::CallName, name);
        }
        // Arguments arrive as an already-serialized JSON string; its content
        // becomes the CALL_ARGS payload.
        if let Some(args) = take_str(&mut func, "arguments") {
            if !args.is_empty() {
                prog.emit_json(Opcode::CallArgs, args.into_bytes());
            }
        }
    }
    prog.emit(Opcode::CallEnd);
}

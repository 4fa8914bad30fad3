//! Anthropic Messages request parsing.

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

/// Parses an Anthropic Messages request body into a program.
///
/// # Errors
///
/// Only the outer JSON parse can fail.
pub fn parse_request(body: &[u8]) -> Result<Program, AilError> {
    let mut raw = parse_outer(body, Style::Anthropic, PayloadKind::Request)?;
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
    // Mandatory on the Anthropic wire; the emitter restores it.
    if let Some(max) = take_i32(&mut raw, "max_tokens") {
        prog.emit_int(Opcode::SetMax, max);
    }
    if let Some(Value::Array(stops)) = raw.shift_remove("stop_sequences") {
        for stop in stops {
            if let Value::String(s) = stop {
                prog.emit_str(Opcode::SetStop, s);
            }
        }
    }
    if take_bool(&mut raw, "stream") == Some(true) {
        prog.emit(Opcode::SetStream);
    }

    // System prompt is top-level, not a message. Non-string forms keep their
    // original shape through EXT_DATA.
    match raw.shift_remove("system") {
        Some(Value::String(system)) => {
            if !system.is_empty() {
                prog.emit(Opcode::MsgStart);
                prog.emit(Opcode::RoleSys);
                prog.emit_str(Opcode::TxtChunk, system);
                prog.emit(Opcode::MsgEnd);
            }
        }
        Some(Value::Null) | None => {}
        Some(other) => prog.emit_kj(Opcode::ExtData, "system", value_to_json(&other)),
    }

    if let Some(Value::Array(tools)) = raw.shift_remove("tools") {
        if !tools.is_empty() {
            prog.emit(Opcode::DefStart);
            for tool in tools {
                let Value::Object(mut tool) = tool else {
                    continue;
                };
                if let Some(name) = take_str(&mut tool, "name") {
                    prog.emit_str(Opcode::DefName, name);
                }
                if let Some(desc) = take_str(&mut tool, "description") {
                    if !desc.is_empty() {
                        prog.emit_str(Opcode::DefDesc, desc);
                    }
                }
                if let Some(schema) = tool.shift_remove("input_schema") {
                    prog.emit_json(Opcode::DefSchema, value_to_json(&schema));
                }
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

    passthrough_ext(&mut prog, raw);
    Ok(prog)
}

fn parse_message(prog: &mut Program, mut msg: Map<String, Value>) {
    prog.emit(Opcode::MsgStart);

    let role = take_str(&mut msg, "role").unwrap_or_default();
    let content = msg.shift_remove("content");

    // User messages carrying tool_result blocks are tool-result turns.
    let has_tool_result = matches!(&content, Some(Value::Array(blocks)) if blocks
        .iter()
        .any(|b| b.get("type").and_then(Value::as_str) == Some("tool_result")));

    match role.as_str() {
        "assistant" => prog.emit(Opcode::RoleAst),
        _ if has_tool_result => prog.emit(Opcode::RoleTool),
        _ => prog.emit(Opcode::RoleUsr),
    }

    match content {
        Some(Value::String(text)) => prog.emit_str(Opcode::TxtChunk, text),
        Some(Value::Array(blocks)) => {
            for block in blocks {
                if let Value::Object(block) = block {
                    parse_content_block(prog, block);
                }
            }
        }
        _ => {}
    }

    passthrough_ext(prog, msg);
    prog.emit(Opcode::MsgEnd);
}

pub(super) fn parse_content_block(prog: &mut Program, mut block: Map<String, Value>) {
    let block_type = block
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("text")
        .to_string();
    match block_type.as_str() {
        "text" => {
            let text = take_str(&mut block, "text").unwrap_or_default();
            prog.emit_str(Opcode::TxtChunk, text);
        }
        "image" => {
            if let Some(source) = block.get("source").and_then(Value::as_object) {
                let data = source.get("data").and_then(Value::as_str).unwrap_or("");
                let buf = prog.add_buffer(data.as_bytes().to_vec());
                if let Some(media) = source.get("media_type").and_then(Value::as_str) {
                    if !media.is_empty() {
                        prog.emit_kv(Opcode::SetMeta, MEDIA_TYPE_KEY, media);
                    }
                }
                prog.emit_ref(Opcode::ImgRef, buf);
            }
        }
        "tool_use" => {
            let id = take_str(&mut block, "id").unwrap_or_default();
            let name = take_str(&mut block, "name").unwrap_or_default();
            prog.emit_str(Opcode::CallStart, id);
            prog.emit_str(Opcode::CallName, name);
            match block.shift_remove("input") {
                Some(Value::Null) | None => {}
                Some(input) => prog.emit_json(Opcode::CallArgs, value_to_json(&input)),
            }
            prog.emit(Opcode::CallEnd);
        }
        "tool_result" => {
            let call_id = take_str(&mut block, "tool_use_id").unwrap_or_default();
            prog.emit_str(Opcode::ResultStart, call_id);
            match block.shift_remove("content") {
                Some(Value::String(text)) => prog.emit_str(Opcode::ResultData, text),
                Some(Value::Array(items)) => {
                    // Concatenate the text blocks of a structured result.
                    let texts: Vec<&str> = items
                        .iter()
                        .filter(|i| i.get("type").and_then(Value::as_str) == Some("text"))
                        .filter_map(|i| i.get("text").and_then(Value::as_str))
                        .collect();
                    prog.emit_str(Opcode::ResultData, texts.join("\n"));
                }
                _ => {}
            }
            prog.emit(Opcode::ResultEnd);
        }
        "thinking" => {
            let thinking = take_str(&mut block, "thinking").unwrap_or_default();
            prog.emit(Opcode::ThinkStart);
            prog.emit_str(Opcode::ThinkChunk, thinking);
            if let Some(signature) = take_str(&mut block, "signature") {
                if !signature.is_empty() {
                    let buf = prog.add_buffer(signature.into_bytes());
                    prog.emit_ref(Opcode::ThinkRef, buf);
                }
            }
            prog.emit(Opcode::ThinkEnd);
        }
        _ => {
            // Unknown block types pass through at block scope; emitters
            // splice them back into the content array.
            prog.emit_kj(
                Opcode::ExtData,
                CONTENT_BLOCK_KEY,
                value_to_json(&Value::Object(block)),
            );
        }
    }
}

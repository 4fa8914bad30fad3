//! Responses request parsing.

use serde_json::Value;

use crate::error::PayloadKind;
use crate::opcode::Opcode;
use crate::program::Program;
use crate::protocol::{
    parse_outer, passthrough_ext, take_bool, take_f64, take_i32, take_str, value_to_json,
    CONTENT_BLOCK_KEY,
};
use crate::style::Style;
use crate::AilError;

/// Parses a Responses request body into a program.
///
/// `instructions` becomes a leading system message; `input` may be a bare
/// string (one user message) or an array of role-tagged items.
///
/// # Errors
///
/// Only the outer JSON parse can fail.
pub fn parse_request(body: &[u8]) -> Result<Program, AilError> {
    let mut raw = parse_outer(body, Style::Responses, PayloadKind::Request)?;
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
    if let Some(max) = take_i32(&mut raw, "max_output_tokens") {
        prog.emit_int(Opcode::SetMax, max);
    }
    if take_bool(&mut raw, "stream") == Some(true) {
        prog.emit(Opcode::SetStream);
    }
    if let Some(reasoning) = raw.shift_remove("reasoning") {
        if !reasoning.is_null() {
            prog.emit_json(Opcode::SetThink, value_to_json(&reasoning));
        }
    }

    if let Some(instructions) = take_str(&mut raw, "instructions") {
        if !instructions.is_empty() {
            prog.emit(Opcode::MsgStart);
            prog.emit(Opcode::RoleSys);
            prog.emit_str(Opcode::TxtChunk, instructions);
            prog.emit(Opcode::MsgEnd);
        }
    }

    // Responses tools are flat: no nested `function` object.
    if let Some(Value::Array(tools)) = raw.shift_remove("tools") {
        if !tools.is_empty() {
            prog.emit(Opcode::DefStart);
            for tool in tools {
                let Value::Object(mut tool) = tool else {
                    continue;
                };
                if let Some(name) = take_str(&mut tool, "name") {
                    if !name.is_empty() {
                        prog.emit_str(Opcode::DefName, name);
                    }
                }
                if let Some(desc) = take_str(&mut tool, "description") {
                    if !desc.is_empty() {
                        prog.emit_str(Opcode::DefDesc, desc);
                    }
                }
                if let Some(params) = tool.shift_remove("parameters") {
                    prog.emit_json(Opcode::DefSchema, value_to_json(&params));
                }
                // "type" is always "function"; reconstructed by the emitter.
                tool.shift_remove("type");
                passthrough_ext(&mut prog, tool);
            }
            prog.emit(Opcode::DefEnd);
        }
    }

    match raw.shift_remove("input") {
        Some(Value::String(input)) => {
            prog.emit(Opcode::MsgStart);
            prog.emit(Opcode::RoleUsr);
            prog.emit_str(Opcode::TxtChunk, input);
            prog.emit(Opcode::MsgEnd);
        }
        Some(Value::Array(items)) => {
            for item in items {
                let Value::Object(mut item) = item else {
                    continue;
                };
                prog.emit(Opcode::MsgStart);
                match take_str(&mut item, "role").as_deref() {
                    Some("system") | Some("developer") => prog.emit(Opcode::RoleSys),
                    Some("user") => prog.emit(Opcode::RoleUsr),
                    Some("assistant") => prog.emit(Opcode::RoleAst),
                    _ => {}
                }
                match item.shift_remove("content") {
                    Some(Value::String(content)) => prog.emit_str(Opcode::TxtChunk, content),
                    Some(Value::Array(parts)) => {
                        for part in parts {
                            let part_type =
                                part.get("type").and_then(Value::as_str).unwrap_or("");
                            if matches!(part_type, "input_text" | "output_text" | "text") {
                                if let Some(text) = part.get("text").and_then(Value::as_str) {
                                    prog.emit_str(Opcode::TxtChunk, text);
                                }
                            } else {
                                // Unknown part types pass through at block
                                // scope; the emitter splices them back into
                                // the content array.
                                prog.emit_kj(
                                    Opcode::ExtData,
                                    CONTENT_BLOCK_KEY,
                                    value_to_json(&part),
                                );
                            }
                        }
                    }
                    _ => {}
                }
                passthrough_ext(&mut prog, item);
                prog.emit(Opcode::MsgEnd);
            }
        }
        _ => {}
    }

    passthrough_ext(&mut prog, raw);
    Ok(prog)
}

//! Anthropic Messages response parsing.

use serde_json::Value;

use crate::error::PayloadKind;
use crate::opcode::Opcode;
use crate::program::Program;
use crate::protocol::mapping::{anthropic_stop_to_canonical, anthropic_usage_to_canonical};
use crate::protocol::{parse_outer, passthrough_ext, take_str, value_to_json};
use crate::style::Style;
use crate::AilError;

/// Parses an Anthropic Messages response body into a program: one assistant
/// message block holding the content and the normalized stop reason.
///
/// # Errors
///
/// Only the outer JSON parse can fail.
pub fn parse_response(body: &[u8]) -> Result<Program, AilError> {
    let mut raw = parse_outer(body, Style::Anthropic, PayloadKind::Response)?;
    let mut prog = Program::new();

    if let Some(id) = take_str(&mut raw, "id") {
        prog.emit_str(Opcode::RespId, id);
    }
    if let Some(model) = take_str(&mut raw, "model") {
        prog.emit_str(Opcode::RespModel, model);
    }
    if let Some(usage) = raw.shift_remove("usage") {
        if let Some(canonical) = anthropic_usage_to_canonical(&usage) {
            prog.emit_json(Opcode::Usage, value_to_json(&canonical));
        }
    }

    // The envelope is always a single assistant message.
    raw.shift_remove("type");
    raw.shift_remove("role");

    prog.emit(Opcode::MsgStart);
    prog.emit(Opcode::RoleAst);

    if let Some(Value::Array(blocks)) = raw.shift_remove("content") {
        for block in blocks {
            if let Value::Object(block) = block {
                super::decoder::parse_content_block(&mut prog, block);
            }
        }
    }

    if let Some(stop) = take_str(&mut raw, "stop_reason") {
        if !stop.is_empty() {
            prog.emit_str(Opcode::RespDone, anthropic_stop_to_canonical(&stop));
        }
    }
    prog.emit(Opcode::MsgEnd);

    passthrough_ext(&mut prog, raw);
    Ok(prog)
}

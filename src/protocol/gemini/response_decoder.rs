//! Google GenAI response parsing.

use serde_json::Value;

use crate::error::PayloadKind;
use crate::opcode::Opcode;
use crate::program::Program;
use crate::protocol::mapping::{gemini_stop_to_canonical, gemini_usage_to_canonical};
use crate::protocol::{parse_outer, passthrough_ext, take_str, value_to_json};
use crate::style::Style;
use crate::AilError;

/// Parses a Google GenAI response body into a program. Each candidate
/// becomes one assistant message block.
///
/// # Errors
///
/// Only the outer JSON parse can fail.
pub fn parse_response(body: &[u8]) -> Result<Program, AilError> {
    let mut raw = parse_outer(body, Style::GoogleGenAi, PayloadKind::Response)?;
    let mut prog = Program::new();

    if let Some(model) = take_str(&mut raw, "modelVersion") {
        prog.emit_str(Opcode::RespModel, model);
    }
    if let Some(usage) = raw.shift_remove("usageMetadata") {
        prog.emit_json(
            Opcode::Usage,
            value_to_json(&gemini_usage_to_canonical(&usage)),
        );
    }

    if let Some(Value::Array(candidates)) = raw.shift_remove("candidates") {
        for candidate in candidates {
            let Value::Object(mut candidate) = candidate else {
                continue;
            };
            prog.emit(Opcode::MsgStart);
            prog.emit(Opcode::RoleAst);

            if let Some(Value::Object(mut content)) = candidate.shift_remove("content") {
                if let Some(Value::Array(parts)) = content.shift_remove("parts") {
                    for part in parts {
                        if let Value::Object(part) = part {
                            super::decoder::parse_part(&mut prog, part);
                        }
                    }
                }
            }

            if let Some(finish) = take_str(&mut candidate, "finishReason") {
                if !finish.is_empty() {
                    prog.emit_str(Opcode::RespDone, gemini_stop_to_canonical(&finish));
                }
            }

            // Candidate index is positional; the emitter regenerates it.
            candidate.shift_remove("index");
            passthrough_ext(&mut prog, candidate);
            prog.emit(Opcode::MsgEnd);
        }
    }

    passthrough_ext(&mut prog, raw);
    Ok(prog)
}

//! Google GenAI request parsing.

use serde_json::{Map, Value};

use crate::error::PayloadKind;
use crate::opcode::Opcode;
use crate::program::Program;
use crate::protocol::{
    parse_outer, passthrough_ext, take_str, value_to_json, CONTENT_BLOCK_KEY, MEDIA_TYPE_KEY,
};
use crate::style::Style;
use crate::AilError;

/// Parses a Google GenAI request body into a program.
///
/// Both `generationConfig` and `generation_config` spellings are accepted;
/// the emitter writes `generation_config`. The model is usually a URL
/// parameter on this API and only lands in the program when present in the
/// body.
///
/// # Errors
///
/// Only the outer JSON parse can fail.
pub fn parse_request(body: &[u8]) -> Result<Program, AilError> {
    let mut raw = parse_outer(body, Style::GoogleGenAi, PayloadKind::Request)?;
    let mut prog = Program::new();

    if let Some(model) = take_str(&mut raw, "model") {
        prog.emit_str(Opcode::SetModel, model);
    }

    let gen_config = raw
        .shift_remove("generationConfig")
        .or_else(|| raw.shift_remove("generation_config"));
    if let Some(Value::Object(mut config)) = gen_config {
        if let Some(temp) = config.get("temperature").and_then(Value::as_f64) {
            prog.emit_float(Opcode::SetTemp, temp);
        }
        if let Some(top_p) = config.get("topP").and_then(Value::as_f64) {
            prog.emit_float(Opcode::SetTopp, top_p);
        }
        if let Some(max) = config.get("maxOutputTokens").and_then(Value::as_i64) {
            prog.emit_int(Opcode::SetMax, max.clamp(0, i64::from(i32::MAX)) as i32);
        }
        if let Some(Value::Array(stops)) = config.get("stopSequences") {
            for stop in stops {
                if let Some(s) = stop.as_str() {
                    prog.emit_str(Opcode::SetStop, s);
                }
            }
        }
        if let Some(thinking) = config.shift_remove("thinking_config") {
            prog.emit_json(Opcode::SetThink, value_to_json(&thinking));
        }
    }

    if let Some(Value::Object(mut system)) = raw.shift_remove("system_instruction") {
        if let Some(Value::Array(parts)) = system.shift_remove("parts") {
            for part in parts {
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    prog.emit(Opcode::MsgStart);
                    prog.emit(Opcode::RoleSys);
                    prog.emit_str(Opcode::TxtChunk, text);
                    prog.emit(Opcode::MsgEnd);
                }
            }
        }
    }

    if let Some(Value::Array(tool_sets)) = raw.shift_remove("tools") {
        prog.emit(Opcode::DefStart);
        for set in tool_sets {
            let Value::Object(mut set) = set else {
                continue;
            };
            let decls = set
                .shift_remove("functionDeclarations")
                .or_else(|| set.shift_remove("function_declarations"));
            if let Some(Value::Array(decls)) = decls {
                for decl in decls {
                    let Value::Object(mut decl) = decl else {
                        continue;
                    };
                    if let Some(name) = take_str(&mut decl, "name") {
                        prog.emit_str(Opcode::DefName, name);
                    }
                    if let Some(desc) = take_str(&mut decl, "description") {
                        if !desc.is_empty() {
                            prog.emit_str(Opcode::DefDesc, desc);
                        }
                    }
                    if let Some(params) = decl.shift_remove("parameters") {
                        prog.emit_json(Opcode::DefSchema, value_to_json(&params));
                    }
                    passthrough_ext(&mut prog, decl);
                }
            }
        }
        prog.emit(Opcode::DefEnd);
    }

    if let Some(Value::Array(contents)) = raw.shift_remove("contents") {
        for content in contents {
            let Value::Object(mut content) = content else {
                continue;
            };
            prog.emit(Opcode::MsgStart);
            match take_str(&mut content, "role").as_deref() {
                Some("user") => prog.emit(Opcode::RoleUsr),
                Some("model") => prog.emit(Opcode::RoleAst),
                Some("function") => prog.emit(Opcode::RoleTool),
                _ => {}
            }
            if let Some(Value::Array(parts)) = content.shift_remove("parts") {
                for part in parts {
                    if let Value::Object(part) = part {
                        parse_part(&mut prog, part);
                    }
                }
            }
            passthrough_ext(&mut prog, content);
            prog.emit(Opcode::MsgEnd);
        }
    }

    passthrough_ext(&mut prog, raw);
    Ok(prog)
}

pub(super) fn parse_part(prog: &mut Program, mut part: Map<String, Value>) {
    // Thought parts are reasoning, not regular text.
    if part.get("thought").and_then(Value::as_bool) == Some(true) {
        let text = take_str(&mut part, "text").unwrap_or_default();
        prog.emit(Opcode::ThinkStart);
        prog.emit_str(Opcode::ThinkChunk, text);
        if let Some(signature) = take_str(&mut part, "thoughtSignature") {
            if !signature.is_empty() {
                let buf = prog.add_buffer(signature.into_bytes());
                prog.emit_ref(Opcode::ThinkRef, buf);
            }
        }
        prog.emit(Opcode::ThinkEnd);
        return;
    }

    let recognized = ["text", "functionCall", "functionResponse", "inlineData"]
        .iter()
        .any(|key| part.contains_key(*key));
    if !recognized {
        // Unknown part shapes pass through at block scope; the emitter
        // splices them back into the parts array.
        prog.emit_kj(
            Opcode::ExtData,
            CONTENT_BLOCK_KEY,
            value_to_json(&Value::Object(part)),
        );
        return;
    }

    if let Some(text) = part.get("text").and_then(Value::as_str) {
        if !text.is_empty() {
            prog.emit_str(Opcode::TxtChunk, text);
        }
    }
    if let Some(call) = part.get("functionCall") {
        // Google function calls carry no id.
        prog.emit_str(Opcode::CallStart, "");
        let name = call.get("name").and_then(Value::as_str).unwrap_or("");
        prog.emit_str(Opcode::CallName, name);
        match call.get("args") {
            Some(Value::Null) | None => {}
            Some(args) => prog.emit_json(Opcode::CallArgs, value_to_json(args)),
        }
        prog.emit(Opcode::CallEnd);
    }
    if let Some(response) = part.get("functionResponse") {
        // Results are keyed by function name; the payload stays raw JSON.
        let name = response.get("name").and_then(Value::as_str).unwrap_or("");
        prog.emit_str(Opcode::ResultStart, name);
        if let Some(data) = response.get("response") {
            prog.emit_str(
                Opcode::ResultData,
                String::from_utf8_lossy(&value_to_json(data)).into_owned(),
            );
        }
        prog.emit(Opcode::ResultEnd);
    }
    if let Some(inline) = part.get("inlineData") {
        let data = inline.get("data").and_then(Value::as_str).unwrap_or("");
        let buf = prog.add_buffer(data.as_bytes().to_vec());
        let mime = inline.get("mimeType").and_then(Value::as_str).unwrap_or("");
        if !mime.is_empty() {
            prog.emit_kv(Opcode::SetMeta, MEDIA_TYPE_KEY, mime);
        }
        if mime.starts_with("audio/") {
            prog.emit_ref(Opcode::AudRef, buf);
        } else {
            prog.emit_ref(Opcode::ImgRef, buf);
        }
    }
}

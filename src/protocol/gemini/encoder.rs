//! Google GenAI request emission.

use serde_json::{json, Map, Value};

use crate::error::AilError;
use crate::extras::ExtrasCollector;
use crate::opcode::Opcode;
use crate::program::Program;
use crate::protocol::{CONTENT_BLOCK_KEY, MEDIA_TYPE_KEY};

/// Emits a program as a Google GenAI request body. System messages become
/// `system_instruction` parts; generation parameters collect under
/// `generation_config`.
///
/// # Errors
///
/// Serialization of the assembled document is the only fallible step.
pub fn emit_request(prog: &Program) -> Result<Vec<u8>, AilError> {
    let mut result = Map::new();
    let mut ec = ExtrasCollector::new();
    let mut contents: Vec<Value> = Vec::new();
    let mut system_parts: Vec<Value> = Vec::new();
    let mut gen_config = Map::new();
    let mut stop_seqs: Vec<String> = Vec::new();

    let mut in_message = false;
    let mut role = "";
    let mut parts: Vec<Value> = Vec::new();
    let mut media_type: Option<String> = None;

    let mut in_tool_defs = false;
    let mut func_decls: Vec<Value> = Vec::new();

    let mut in_think = false;
    let mut think_text = String::new();
    let mut think_signature: Option<String> = None;

    for inst in &prog.code {
        match inst.op {
            Opcode::SetModel => {
                result.insert("model".into(), json!(inst.as_str().unwrap_or("")));
            }
            Opcode::SetTemp => {
                gen_config.insert("temperature".into(), json!(inst.as_float().unwrap_or(0.0)));
            }
            Opcode::SetTopp => {
                gen_config.insert("topP".into(), json!(inst.as_float().unwrap_or(0.0)));
            }
            Opcode::SetMax => {
                gen_config.insert("maxOutputTokens".into(), json!(inst.as_int().unwrap_or(0)));
            }
            Opcode::SetStop => {
                stop_seqs.push(inst.as_str().unwrap_or("").to_string());
            }
            Opcode::SetThink => {
                if let Ok(thinking) =
                    serde_json::from_slice::<Value>(inst.as_json().unwrap_or(b"null"))
                {
                    gen_config.insert("thinking_config".into(), thinking);
                }
            }

            Opcode::MsgStart => {
                ec.push();
                in_message = true;
                role = "";
                parts.clear();
            }
            Opcode::RoleSys => role = "system",
            Opcode::RoleUsr => role = "user",
            Opcode::RoleAst => role = "model",
            Opcode::RoleTool => role = "function",

            Opcode::TxtChunk => {
                if in_message {
                    parts.push(json!({"text": inst.as_str().unwrap_or("")}));
                }
            }

            Opcode::ImgRef | Opcode::AudRef => {
                if in_message {
                    let data = prog.buffer_text(inst.as_buf_ref().unwrap_or(u32::MAX));
                    let fallback = if inst.op == Opcode::AudRef {
                        "audio/wav"
                    } else {
                        "image/png"
                    };
                    let mime = media_type.take().unwrap_or_else(|| fallback.to_string());
                    parts.push(json!({"inlineData": {"mimeType": mime, "data": data}}));
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
                    let mut part = Map::new();
                    part.insert("thought".into(), json!(true));
                    part.insert("text".into(), json!(std::mem::take(&mut think_text)));
                    if let Some(sig) = think_signature.take() {
                        part.insert("thoughtSignature".into(), sig.into());
                    }
                    parts.push(Value::Object(part));
                }
                in_think = false;
            }

            Opcode::CallStart => {
                ec.push();
                if in_message {
                    parts.push(json!({"functionCall": {}}));
                }
            }
            Opcode::CallName => {
                if let Some(call) = last_function_call(&mut parts) {
                    call.insert("name".into(), json!(inst.as_str().unwrap_or("")));
                }
            }
            Opcode::CallArgs => {
                if let Some(call) = last_function_call(&mut parts) {
                    if let Ok(args) =
                        serde_json::from_slice::<Value>(inst.as_json().unwrap_or(b"{}"))
                    {
                        call.insert("args".into(), args);
                    }
                }
            }
            Opcode::CallEnd => {
                if let Some(call) = last_function_call(&mut parts) {
                    ec.merge_into(call);
                }
                ec.pop();
            }

            Opcode::ResultStart => {
                if in_message {
                    parts.push(json!({
                        "functionResponse": {"name": inst.as_str().unwrap_or("")}
                    }));
                }
            }
            Opcode::ResultData => {
                if let Some(part) = parts.last_mut().and_then(Value::as_object_mut) {
                    if let Some(Value::Object(response)) = part.get_mut("functionResponse") {
                        // RESULT_DATA holds raw JSON text; degrade to a
                        // string when it does not parse.
                        let data = inst.as_str().unwrap_or("");
                        let value = serde_json::from_str::<Value>(data)
                            .unwrap_or_else(|_| Value::String(data.to_string()));
                        response.insert("response".into(), value);
                    }
                }
            }
            Opcode::ResultEnd => {}

            Opcode::MsgEnd => {
                if in_message {
                    if role == "system" {
                        system_parts.append(&mut parts);
                    } else if !parts.is_empty() {
                        let mut content = Map::new();
                        content.insert("role".into(), json!(role));
                        content.insert("parts".into(), Value::Array(std::mem::take(&mut parts)));
                        ec.merge_into(&mut content);
                        contents.push(Value::Object(content));
                    }
                    in_message = false;
                }
                ec.pop();
            }

            Opcode::DefStart => {
                ec.push();
                in_tool_defs = true;
                func_decls.clear();
            }
            Opcode::DefName => {
                if in_tool_defs {
                    if let Some(last) = func_decls.last_mut().and_then(Value::as_object_mut) {
                        ec.merge_into(last);
                    }
                    func_decls.push(json!({"name": inst.as_str().unwrap_or("")}));
                }
            }
            Opcode::DefDesc => {
                if let Some(last) = func_decls.last_mut().and_then(Value::as_object_mut) {
                    last.insert("description".into(), json!(inst.as_str().unwrap_or("")));
                }
            }
            Opcode::DefSchema => {
                if let Some(last) = func_decls.last_mut().and_then(Value::as_object_mut) {
                    if let Ok(schema) =
                        serde_json::from_slice::<Value>(inst.as_json().unwrap_or(b"null"))
                    {
                        last.insert("parameters".into(), schema);
                    }
                }
            }
            Opcode::DefEnd => {
                if in_tool_defs && !func_decls.is_empty() {
                    if let Some(last) = func_decls.last_mut().and_then(Value::as_object_mut) {
                        ec.merge_into(last);
                    }
                    result.insert(
                        "tools".into(),
                        json!([{"functionDeclarations": std::mem::take(&mut func_decls)}]),
                    );
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
                    result.insert(key.to_string(), val.into());
                }
            }
            Opcode::ExtData => {
                let key = inst.key().unwrap_or("");
                if key == CONTENT_BLOCK_KEY && in_message {
                    // An unrecognized part goes back into the parts array,
                    // not onto the content object.
                    if let Ok(part) =
                        serde_json::from_slice::<Value>(inst.as_json().unwrap_or(b"null"))
                    {
                        parts.push(part);
                    }
                } else {
                    ec.add_json(key, inst.as_json().unwrap_or(b"null"));
                }
            }

            _ => {}
        }
    }

    if !system_parts.is_empty() {
        result.insert(
            "system_instruction".into(),
            json!({"parts": system_parts}),
        );
    }
    if !contents.is_empty() {
        result.insert("contents".into(), Value::Array(contents));
    }
    if !stop_seqs.is_empty() {
        gen_config.insert("stopSequences".into(), json!(stop_seqs));
    }
    if !gen_config.is_empty() {
        result.insert("generation_config".into(), Value::Object(gen_config));
    }

    ec.merge_into(&mut result);
    Ok(serde_json::to_vec(&Value::Object(result))?)
}

/// The `functionCall` object of the most recent part, if that is what the
/// part is.
pub(super) fn last_function_call(parts: &mut [Value]) -> Option<&mut Map<String, Value>> {
    parts
        .last_mut()?
        .as_object_mut()?
        .get_mut("functionCall")?
        .as_object_mut()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emit_value(prog: &Program) -> Value {
        serde_json::from_slice(&emit_request(prog).unwrap()).unwrap()
    }

    #[test]
    fn test_system_instruction_and_config() {
        let mut prog = Program::new();
        prog.emit_float(Opcode::SetTemp, 0.3);
        prog.emit_int(Opcode::SetMax, 512);
        prog.emit(Opcode::MsgStart);
        prog.emit(Opcode::RoleSys);
        prog.emit_str(Opcode::TxtChunk, "Be concise.");
        prog.emit(Opcode::MsgEnd);
        prog.emit(Opcode::MsgStart);
        prog.emit(Opcode::RoleUsr);
        prog.emit_str(Opcode::TxtChunk, "Hello!");
        prog.emit(Opcode::MsgEnd);

        let out = emit_value(&prog);
        assert_eq!(out["system_instruction"]["parts"][0]["text"], "Be concise.");
        assert_eq!(out["generation_config"]["temperature"], 0.3);
        assert_eq!(out["generation_config"]["maxOutputTokens"], 512);
        let contents = out["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0]["role"], "user");
    }

    #[test]
    fn test_roles_map_to_gemini_vocabulary() {
        let mut prog = Program::new();
        for (role, _) in [(Opcode::RoleAst, "model"), (Opcode::RoleTool, "function")] {
            prog.emit(Opcode::MsgStart);
            prog.emit(role);
            prog.emit_str(Opcode::TxtChunk, "x");
            prog.emit(Opcode::MsgEnd);
        }
        let contents = emit_value(&prog)["contents"].clone();
        assert_eq!(contents[0]["role"], "model");
        assert_eq!(contents[1]["role"], "function");
    }

    #[test]
    fn test_function_call_and_response() {
        let mut prog = Program::new();
        prog.emit(Opcode::MsgStart);
        prog.emit(Opcode::RoleAst);
        prog.emit_str(Opcode::CallStart, "");
        prog.emit_str(Opcode::CallName, "get_weather");
        prog.emit_json(Opcode::CallArgs, br#"{"city":"SF"}"#.to_vec());
        prog.emit(Opcode::CallEnd);
        prog.emit(Opcode::MsgEnd);
        prog.emit(Opcode::MsgStart);
        prog.emit(Opcode::RoleTool);
        prog.emit_str(Opcode::ResultStart, "get_weather");
        prog.emit_str(Opcode::ResultData, r#"{"temp":72}"#);
        prog.emit(Opcode::ResultEnd);
        prog.emit(Opcode::MsgEnd);

        let contents = emit_value(&prog)["contents"].clone();
        let call = &contents[0]["parts"][0]["functionCall"];
        assert_eq!(call["name"], "get_weather");
        assert_eq!(call["args"]["city"], "SF");
        let response = &contents[1]["parts"][0]["functionResponse"];
        assert_eq!(response["name"], "get_weather");
        assert_eq!(response["response"]["temp"], 72);
    }

    #[test]
    fn test_tool_declarations() {
        let mut prog = Program::new();
        prog.emit(Opcode::DefStart);
        prog.emit_str(Opcode::DefName, "calc");
        prog.emit_str(Opcode::DefDesc, "Do math");
        prog.emit_json(Opcode::DefSchema, br#"{"type":"object"}"#.to_vec());
        prog.emit(Opcode::DefEnd);

        let tools = emit_value(&prog)["tools"].clone();
        let decl = &tools[0]["functionDeclarations"][0];
        assert_eq!(decl["name"], "calc");
        assert_eq!(decl["description"], "Do math");
    }

    #[test]
    fn test_thought_part_roundtrips() {
        let mut prog = Program::new();
        let sig = prog.add_buffer(&b"c2ln"[..]);
        prog.emit(Opcode::MsgStart);
        prog.emit(Opcode::RoleAst);
        prog.emit(Opcode::ThinkStart);
        prog.emit_str(Opcode::ThinkChunk, "pondering");
        prog.emit_ref(Opcode::ThinkRef, sig);
        prog.emit(Opcode::ThinkEnd);
        prog.emit_str(Opcode::TxtChunk, "answer");
        prog.emit(Opcode::MsgEnd);

        let parts = emit_value(&prog)["contents"][0]["parts"].clone();
        assert_eq!(parts[0]["thought"], true);
        assert_eq!(parts[0]["text"], "pondering");
        assert_eq!(parts[0]["thoughtSignature"], "c2ln");
        assert_eq!(parts[1]["text"], "answer");
    }

    #[test]
    fn test_audio_fallback_mime() {
        let mut prog = Program::new();
        let audio = prog.add_buffer(&b"QUJD"[..]);
        prog.emit(Opcode::MsgStart);
        prog.emit(Opcode::RoleUsr);
        prog.emit_ref(Opcode::AudRef, audio);
        prog.emit(Opcode::MsgEnd);
        let part = &emit_value(&prog)["contents"][0]["parts"][0];
        assert_eq!(part["inlineData"]["mimeType"], "audio/wav");
    }
}

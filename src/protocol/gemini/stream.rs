//! Google GenAI stream-chunk parsing and emission.
//!
//! Google streams complete JSON objects shaped like responses; function
//! calls arrive whole, never as argument fragments. The stream translator
//! therefore buffers tool deltas from fragmenting sources before they reach
//! this emitter.

use serde_json::{json, Map, Value};

use crate::error::PayloadKind;
use crate::opcode::Opcode;
use crate::program::Program;
use crate::protocol::mapping::{
    canonical_stop_to_gemini, canonical_usage_to_gemini, gemini_stop_to_canonical,
    gemini_usage_to_canonical,
};
use crate::protocol::{parse_outer, passthrough_ext, take_str, value_to_json, ToolDelta};
use crate::style::Style;
use crate::AilError;

/// Parses one streaming chunk into a (partial) program.
///
/// # Errors
///
/// Only the outer JSON parse can fail.
pub fn parse_stream_chunk(body: &[u8]) -> Result<Program, AilError> {
    let mut raw = parse_outer(body, Style::GoogleGenAi, PayloadKind::StreamChunk)?;
    let mut prog = Program::new();

    if let Some(model) = take_str(&mut raw, "modelVersion") {
        prog.emit_str(Opcode::RespModel, model);
    }

    if let Some(Value::Array(candidates)) = raw.shift_remove("candidates") {
        for candidate in candidates {
            let Value::Object(mut candidate) = candidate else {
                continue;
            };
            if let Some(Value::Object(mut content)) = candidate.shift_remove("content") {
                if let Some(Value::Array(parts)) = content.shift_remove("parts") {
                    for part in parts {
                        let Value::Object(part) = part else {
                            continue;
                        };
                        parse_stream_part(&mut prog, part);
                    }
                }
            }
            if let Some(finish) = take_str(&mut candidate, "finishReason") {
                if !finish.is_empty() {
                    prog.emit_str(Opcode::RespDone, gemini_stop_to_canonical(&finish));
                    prog.emit(Opcode::StreamEnd);
                }
            }
        }
    }

    // The terminal chunk carries usage metadata.
    if let Some(usage) = raw.shift_remove("usageMetadata") {
        prog.emit_json(
            Opcode::Usage,
            value_to_json(&gemini_usage_to_canonical(&usage)),
        );
    }

    passthrough_ext(&mut prog, raw);
    Ok(prog)
}

fn parse_stream_part(prog: &mut Program, part: Map<String, Value>) {
    if part.get("thought").and_then(Value::as_bool) == Some(true) {
        if let Some(text) = part.get("text").and_then(Value::as_str) {
            if !text.is_empty() {
                prog.emit_str(Opcode::StreamThinkDelta, text);
            }
        }
        return;
    }
    if let Some(text) = part.get("text").and_then(Value::as_str) {
        if !text.is_empty() {
            prog.emit_str(Opcode::StreamDelta, text);
        }
    }
    if let Some(call) = part.get("functionCall") {
        let delta = ToolDelta {
            index: 0,
            id: None,
            name: call
                .get("name")
                .and_then(Value::as_str)
                .map(ToString::to_string),
            arguments: call
                .get("args")
                .filter(|a| !a.is_null())
                .map(|a| String::from_utf8_lossy(&value_to_json(a)).into_owned()),
        };
        prog.emit_json(Opcode::StreamToolDelta, delta.to_json());
    }
}

/// Emits a (partial) program as one streaming chunk.
///
/// # Errors
///
/// Serialization of the assembled document is the only fallible step.
pub fn emit_stream_chunk(prog: &Program) -> Result<Option<Vec<u8>>, AilError> {
    let mut result = Map::new();
    let mut ec = crate::extras::ExtrasCollector::new();
    let mut parts: Vec<Value> = Vec::new();
    let mut finish_reason: Option<String> = None;

    for inst in &prog.code {
        match inst.op {
            Opcode::RespModel => {
                result.insert("modelVersion".into(), json!(inst.as_str().unwrap_or("")));
            }

            Opcode::StreamDelta => {
                parts.push(json!({"text": inst.as_str().unwrap_or("")}));
            }
            Opcode::StreamThinkDelta => {
                parts.push(json!({"text": inst.as_str().unwrap_or(""), "thought": true}));
            }

            Opcode::StreamToolDelta => {
                if let Some(delta) = ToolDelta::from_json(inst.as_json().unwrap_or(b"{}")) {
                    let mut call = Map::new();
                    if let Some(name) = delta.name {
                        call.insert("name".into(), name.into());
                    }
                    // Arguments are the accumulated fragment text; anything
                    // that is not complete JSON at this point is dropped.
                    if let Some(args) = delta.arguments {
                        if let Ok(args) = serde_json::from_str::<Value>(&args) {
                            call.insert("args".into(), args);
                        }
                    }
                    parts.push(json!({"functionCall": call}));
                }
            }

            Opcode::RespDone => {
                finish_reason =
                    Some(canonical_stop_to_gemini(inst.as_str().unwrap_or("")).to_string());
            }

            Opcode::Usage => {
                if let Ok(usage) =
                    serde_json::from_slice::<Value>(inst.as_json().unwrap_or(b"null"))
                {
                    result.insert("usageMetadata".into(), canonical_usage_to_gemini(&usage));
                }
            }

            Opcode::ExtData => {
                ec.add_json(inst.key().unwrap_or(""), inst.as_json().unwrap_or(b"null"));
            }
            Opcode::SetMeta => {
                if inst.key() != Some(crate::protocol::MEDIA_TYPE_KEY) {
                    ec.add_string(inst.key().unwrap_or(""), inst.as_str().unwrap_or(""));
                }
            }

            _ => {}
        }
    }

    let mut candidate = Map::new();
    candidate.insert("index".into(), json!(0));
    if !parts.is_empty() {
        candidate.insert("content".into(), json!({"role": "model", "parts": parts}));
    }
    if let Some(reason) = finish_reason {
        candidate.insert("finishReason".into(), reason.into());
    }
    result.insert("candidates".into(), json!([candidate]));

    ec.merge_into(&mut result);
    Ok(Some(serde_json::to_vec(&Value::Object(result))?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emit_value(prog: &Program) -> Value {
        serde_json::from_slice(&emit_stream_chunk(prog).unwrap().unwrap()).unwrap()
    }

    #[test]
    fn test_parse_text_chunk() {
        let body = br#"{"candidates":[{"content":{"parts":[{"text":"Hello"}],"role":"model"}}],"modelVersion":"gemini-1.5-pro"}"#;
        let prog = parse_stream_chunk(body).unwrap();
        assert!(prog
            .code
            .iter()
            .any(|i| i.op == Opcode::StreamDelta && i.as_str() == Some("Hello")));
        assert!(prog
            .code
            .iter()
            .any(|i| i.op == Opcode::RespModel && i.as_str() == Some("gemini-1.5-pro")));
    }

    #[test]
    fn test_parse_terminal_chunk() {
        let body = br#"{"candidates":[{"content":{"parts":[]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":3,"candidatesTokenCount":7,"totalTokenCount":10}}"#;
        let prog = parse_stream_chunk(body).unwrap();
        assert!(prog
            .code
            .iter()
            .any(|i| i.op == Opcode::RespDone && i.as_str() == Some("stop")));
        assert!(prog.has_opcode(Opcode::StreamEnd));
        assert!(prog.has_opcode(Opcode::Usage));
    }

    #[test]
    fn test_parse_whole_function_call() {
        let body = br#"{"candidates":[{"content":{"parts":[{"functionCall":{"name":"search","args":{"q":"ai"}}}]}}]}"#;
        let prog = parse_stream_chunk(body).unwrap();
        let inst = prog
            .code
            .iter()
            .find(|i| i.op == Opcode::StreamToolDelta)
            .unwrap();
        let delta = ToolDelta::from_json(inst.as_json().unwrap()).unwrap();
        assert_eq!(delta.name.as_deref(), Some("search"));
        assert_eq!(delta.arguments.as_deref(), Some(r#"{"q":"ai"}"#));
    }

    #[test]
    fn test_emit_complete_function_call() {
        let mut prog = Program::new();
        let delta = ToolDelta {
            index: 0,
            id: Some("call_1".into()),
            name: Some("get_weather".into()),
            arguments: Some(r#"{"location":"NYC"}"#.into()),
        };
        prog.emit_json(Opcode::StreamToolDelta, delta.to_json());

        let part = &emit_value(&prog)["candidates"][0]["content"]["parts"][0];
        assert_eq!(part["functionCall"]["name"], "get_weather");
        assert_eq!(part["functionCall"]["args"]["location"], "NYC");
    }

    #[test]
    fn test_emit_drops_incomplete_arguments() {
        let mut prog = Program::new();
        let delta = ToolDelta {
            index: 0,
            id: None,
            name: Some("get_weather".into()),
            arguments: Some(r#"{"location":"#.into()),
        };
        prog.emit_json(Opcode::StreamToolDelta, delta.to_json());

        let part = &emit_value(&prog)["candidates"][0]["content"]["parts"][0];
        assert_eq!(part["functionCall"]["name"], "get_weather");
        assert!(part["functionCall"].get("args").is_none());
    }

    #[test]
    fn test_emit_finish_and_usage() {
        let mut prog = Program::new();
        prog.emit_str(Opcode::RespDone, "stop");
        prog.emit_json(
            Opcode::Usage,
            br#"{"prompt_tokens":1,"completion_tokens":2,"total_tokens":3}"#.to_vec(),
        );
        let out = emit_value(&prog);
        assert_eq!(out["candidates"][0]["finishReason"], "STOP");
        assert_eq!(out["usageMetadata"]["candidatesTokenCount"], 2);
    }
}

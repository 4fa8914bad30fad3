//! Google GenAI response emission.

use serde_json::{json, Map, Value};

use crate::error::AilError;
use crate::extras::ExtrasCollector;
use crate::opcode::Opcode;
use crate::program::Program;
use crate::protocol::mapping::{canonical_stop_to_gemini, canonical_usage_to_gemini};
use crate::protocol::{CONTENT_BLOCK_KEY, MEDIA_TYPE_KEY};

use super::encoder::last_function_call;

/// Emits a program as a Google GenAI response body. Each message block
/// becomes one candidate.
///
/// # Errors
///
/// Serialization of the assembled document is the only fallible step.
pub fn emit_response(prog: &Program) -> Result<Vec<u8>, AilError> {
    let mut result = Map::new();
    let mut ec = ExtrasCollector::new();
    let mut candidates: Vec<Value> = Vec::new();
    let mut parts: Vec<Value> = Vec::new();
    let mut finish_reason: Option<String> = None;
    let mut in_message = false;

    let mut in_think = false;
    let mut think_text = String::new();
    let mut think_signature: Option<String> = None;

    for inst in &prog.code {
        match inst.op {
            Opcode::RespModel => {
                result.insert("modelVersion".into(), json!(inst.as_str().unwrap_or("")));
            }
            Opcode::Usage => {
                if let Ok(usage) =
                    serde_json::from_slice::<Value>(inst.as_json().unwrap_or(b"null"))
                {
                    result.insert("usageMetadata".into(), canonical_usage_to_gemini(&usage));
                }
            }

            Opcode::MsgStart => {
                ec.push();
                in_message = true;
                parts.clear();
                finish_reason = None;
            }

            Opcode::TxtChunk => {
                if in_message {
                    parts.push(json!({"text": inst.as_str().unwrap_or("")}));
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

            Opcode::RespDone => {
                finish_reason = Some(
                    canonical_stop_to_gemini(inst.as_str().unwrap_or("")).to_string(),
                );
            }

            Opcode::ExtData => {
                let key = inst.key().unwrap_or("");
                if key == CONTENT_BLOCK_KEY && in_message {
                    if let Ok(part) =
                        serde_json::from_slice::<Value>(inst.as_json().unwrap_or(b"null"))
                    {
                        parts.push(part);
                    }
                } else {
                    ec.add_json(key, inst.as_json().unwrap_or(b"null"));
                }
            }
            Opcode::SetMeta => {
                if inst.key() != Some(MEDIA_TYPE_KEY) {
                    ec.add_string(inst.key().unwrap_or(""), inst.as_str().unwrap_or(""));
                }
            }

            Opcode::MsgEnd => {
                if in_message {
                    let mut candidate = Map::new();
                    candidate.insert(
                        "content".into(),
                        json!({"role": "model", "parts": std::mem::take(&mut parts)}),
                    );
                    candidate.insert("index".into(), json!(candidates.len()));
                    if let Some(reason) = finish_reason.take() {
                        candidate.insert("finishReason".into(), reason.into());
                    }
                    ec.merge_into(&mut candidate);
                    candidates.push(Value::Object(candidate));
                    in_message = false;
                }
                ec.pop();
            }

            _ => {}
        }
    }

    if !candidates.is_empty() {
        result.insert("candidates".into(), Value::Array(candidates));
    }
    ec.merge_into(&mut result);
    Ok(serde_json::to_vec(&Value::Object(result))?)
}

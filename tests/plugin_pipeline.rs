//! Programs are the plugin surface: anything sitting between a parser and an
//! emitter may inspect and rebuild them, never mutate in place.

use ail::{get_emitter, get_parser, Emitter, Opcode, Parser, Program, Style};
use serde_json::Value;

fn parse_chat(body: &str) -> Program {
    get_parser(Style::ChatCompletions)
        .unwrap()
        .parse_request(body.as_bytes())
        .unwrap()
}

fn emit(style: Style, prog: &Program) -> Value {
    let out = get_emitter(style).unwrap().emit_request(prog).unwrap();
    serde_json::from_slice(&out).unwrap()
}

const BODY: &str = r#"{
    "model": "gpt-4o",
    "messages": [
        {"role": "system", "content": "Original rules."},
        {"role": "user", "content": "First question"},
        {"role": "assistant", "content": "First answer"},
        {"role": "user", "content": "Second question"}
    ]
}"#;

#[test]
fn test_system_prompt_injection_into_anthropic() {
    let prog = parse_chat(BODY);
    let injected = prog.prepend_system_prompt("Injected policy.");

    // The source program is untouched.
    assert_eq!(prog.count_messages(), 4);
    assert_eq!(injected.count_messages(), 5);

    // Stacked system prompts merge with a blank line on the Anthropic side.
    let out = emit(Style::Anthropic, &injected);
    assert_eq!(out["system"], "Injected policy.\n\nOriginal rules.");
    assert_eq!(out["messages"].as_array().unwrap().len(), 3);
}

#[test]
fn test_truncation_between_parse_and_emit() {
    let prog = parse_chat(BODY);
    let truncated = prog.truncate_messages(1);

    let out = emit(Style::ChatCompletions, &truncated);
    let messages = out["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["content"], "Second question");
    assert_eq!(out["model"], "gpt-4o");
}

#[test]
fn test_replace_system_prompt() {
    let prog = parse_chat(BODY);
    let replaced = prog.replace_system_prompt("Only rule.");
    let out = emit(Style::ChatCompletions, &replaced);
    assert_eq!(out["messages"][0]["role"], "system");
    assert_eq!(out["messages"][0]["content"], "Only rule.");
}

#[test]
fn test_set_model_override() {
    let mut prog = parse_chat(BODY);
    prog.set_model("gpt-4o-mini");
    let out = emit(Style::ChatCompletions, &prog);
    assert_eq!(out["model"], "gpt-4o-mini");
}

#[test]
fn test_append_programs_rebases_buffers() {
    let with_image = parse_chat(
        r#"{
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": [
                {"type": "image_url", "image_url": {"url": "https://a/1.png"}}
            ]}]
        }"#,
    );
    let joined = with_image.append(&with_image);
    assert_eq!(joined.buffers.len(), 2);

    let out = emit(Style::ChatCompletions, &joined);
    let urls: Vec<&str> = out["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"][0]["image_url"]["url"].as_str().unwrap())
        .collect();
    assert_eq!(urls, ["https://a/1.png", "https://a/1.png"]);
}

#[test]
fn test_last_user_message_inspection() {
    let prog = parse_chat(BODY);
    let span = prog.last_user_message().unwrap();
    assert_eq!(prog.message_text(&span), "Second question");
    assert_eq!(prog.system_prompt(), "Original rules.");
    assert!(!prog.has_opcode(Opcode::SetStream));
}

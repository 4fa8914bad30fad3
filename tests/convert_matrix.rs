//! Cross-vendor conversions through the IR.

use ail::{convert_request, convert_response, get_emitter, get_parser, Emitter, Parser, Style};
use serde_json::Value;

const CHAT_REQUEST: &str = r#"{
    "model": "claude-3-opus",
    "temperature": 0.5,
    "max_tokens": 2048,
    "messages": [
        {"role": "system", "content": "You are a scientist."},
        {"role": "user", "content": "Explain quantum physics."}
    ],
    "tools": [{
        "type": "function",
        "function": {
            "name": "search",
            "description": "Search the web",
            "parameters": {"type": "object", "properties": {"query": {"type": "string"}}}
        }
    }]
}"#;

fn convert_value(body: &str, from: Style, to: Style) -> Value {
    let out = convert_request(body.as_bytes(), from, to).unwrap();
    serde_json::from_slice(&out).unwrap()
}

#[test]
fn test_chat_to_anthropic_system_placement() {
    let out = convert_value(CHAT_REQUEST, Style::ChatCompletions, Style::Anthropic);

    assert_eq!(out["system"], "You are a scientist.");
    assert_eq!(out["max_tokens"], 2048);

    let messages = out["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["role"], "user");

    let tools = out["tools"].as_array().unwrap();
    assert_eq!(tools[0]["name"], "search");
    assert!(tools[0].get("input_schema").is_some());
    assert!(tools[0].get("parameters").is_none());
}

#[test]
fn test_chat_to_google() {
    let out = convert_value(CHAT_REQUEST, Style::ChatCompletions, Style::GoogleGenAi);

    assert!(out.get("system_instruction").is_some());
    let contents = out["contents"].as_array().unwrap();
    assert_eq!(contents.len(), 1);
    assert_eq!(contents[0]["role"], "user");
    assert_eq!(out["generation_config"]["temperature"], 0.5);
    assert_eq!(out["generation_config"]["maxOutputTokens"], 2048);
    assert_eq!(
        out["tools"][0]["functionDeclarations"][0]["name"],
        "search"
    );
}

#[test]
fn test_chat_to_responses() {
    let out = convert_value(CHAT_REQUEST, Style::ChatCompletions, Style::Responses);

    assert_eq!(out["instructions"], "You are a scientist.");
    assert_eq!(out["max_output_tokens"], 2048);
    let input = out["input"].as_array().unwrap();
    assert_eq!(input.len(), 1);
    assert_eq!(input[0]["role"], "user");
    // Responses tools are flat.
    assert_eq!(out["tools"][0]["name"], "search");
    assert!(out["tools"][0].get("function").is_none());
}

#[test]
fn test_anthropic_to_chat_tool_conversation() {
    let body = r#"{
        "model": "claude-3",
        "max_tokens": 512,
        "messages": [
            {"role": "user", "content": "Weather in NYC?"},
            {"role": "assistant", "content": [
                {"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {"location": "NYC"}}
            ]},
            {"role": "user", "content": [
                {"type": "tool_result", "tool_use_id": "toolu_1", "content": "72F, sunny"}
            ]}
        ]
    }"#;
    let out = convert_value(body, Style::Anthropic, Style::ChatCompletions);

    let messages = out["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 3);

    let assistant = &messages[1];
    assert_eq!(assistant["role"], "assistant");
    let call = &assistant["tool_calls"][0];
    assert_eq!(call["id"], "toolu_1");
    assert_eq!(call["function"]["name"], "get_weather");
    // Arguments become a serialized JSON string on the OpenAI wire.
    let args: Value =
        serde_json::from_str(call["function"]["arguments"].as_str().unwrap()).unwrap();
    assert_eq!(args["location"], "NYC");

    let tool = &messages[2];
    assert_eq!(tool["role"], "tool");
    assert_eq!(tool["tool_call_id"], "toolu_1");
    assert_eq!(tool["content"], "72F, sunny");
}

#[test]
fn test_tool_call_roundtrip_preserves_ids() {
    // S2: parse + emit keeps the call id binding between call and result.
    let body = r#"{
        "model": "gpt-4",
        "messages": [
            {"role": "user", "content": "Weather?"},
            {"role": "assistant", "content": null, "tool_calls": [{
                "id": "call_abc123",
                "type": "function",
                "function": {"name": "get_weather", "arguments": "{\"location\":\"NYC\"}"}
            }]},
            {"role": "tool", "tool_call_id": "call_abc123", "content": "72F, sunny"}
        ]
    }"#;
    let out = convert_value(body, Style::ChatCompletions, Style::ChatCompletions);
    let tool_msg = &out["messages"][2];
    assert_eq!(tool_msg["tool_call_id"], "call_abc123");
    assert_eq!(tool_msg["content"], "72F, sunny");
}

#[test]
fn test_request_matrix_preserves_tool_semantics() {
    let prog = get_parser(Style::ChatCompletions)
        .unwrap()
        .parse_request(CHAT_REQUEST.as_bytes())
        .unwrap();

    for target in [
        Style::ChatCompletions,
        Style::Responses,
        Style::Anthropic,
        Style::GoogleGenAi,
    ] {
        let wire = get_emitter(target).unwrap().emit_request(&prog).unwrap();
        let text = String::from_utf8(wire).unwrap();
        assert!(text.contains("search"), "{target}: tool name lost");
        assert!(
            text.contains("You are a scientist."),
            "{target}: system prompt lost"
        );
        assert!(
            text.contains("Explain quantum physics."),
            "{target}: user text lost"
        );
    }
}

#[test]
fn test_response_anthropic_to_chat() {
    let body = r#"{
        "id": "msg_01abc",
        "type": "message",
        "role": "assistant",
        "model": "claude-3-opus-20240229",
        "content": [{"type": "text", "text": "Hello!"}],
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 10, "output_tokens": 3}
    }"#;
    let out = convert_response(body.as_bytes(), Style::Anthropic, Style::ChatCompletions).unwrap();
    let v: Value = serde_json::from_slice(&out).unwrap();

    assert_eq!(v["object"], "chat.completion");
    assert_eq!(v["id"], "msg_01abc");
    assert_eq!(v["choices"][0]["message"]["content"], "Hello!");
    assert_eq!(v["choices"][0]["finish_reason"], "stop");
    assert_eq!(v["usage"]["prompt_tokens"], 10);
    assert_eq!(v["usage"]["total_tokens"], 13);
}

#[test]
fn test_response_chat_to_gemini() {
    let body = r#"{
        "id": "chatcmpl-1",
        "model": "gpt-4o",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "Hi"},
            "finish_reason": "length"
        }],
        "usage": {"prompt_tokens": 4, "completion_tokens": 2, "total_tokens": 6}
    }"#;
    let out =
        convert_response(body.as_bytes(), Style::ChatCompletions, Style::GoogleGenAi).unwrap();
    let v: Value = serde_json::from_slice(&out).unwrap();

    assert_eq!(v["candidates"][0]["finishReason"], "MAX_TOKENS");
    assert_eq!(v["candidates"][0]["content"]["parts"][0]["text"], "Hi");
    assert_eq!(v["usageMetadata"]["totalTokenCount"], 6);
}

#[test]
fn test_media_type_survives_chat_to_google() {
    let body = r#"{
        "model": "gpt-4o",
        "messages": [{"role": "user", "content": [
            {"type": "text", "text": "this sound"},
            {"type": "input_audio", "input_audio": {"data": "QUJD", "format": "mp3"}}
        ]}]
    }"#;
    let out = convert_value(body, Style::ChatCompletions, Style::GoogleGenAi);
    let parts = out["contents"][0]["parts"].as_array().unwrap();
    assert_eq!(parts[1]["inlineData"]["mimeType"], "audio/mp3");
    assert_eq!(parts[1]["inlineData"]["data"], "QUJD");
}

#[test]
fn test_same_vendor_passthrough_normalizes() {
    // Same-style conversion is a parse + emit, not a byte copy.
    let body = r#"{"model":"gpt-4","messages":[{"role":"user","content":"Hi"}]}"#;
    let out = convert_request(body.as_bytes(), Style::ChatCompletions, Style::ChatCompletions)
        .unwrap();
    let v: Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(v["model"], "gpt-4");
    assert_eq!(v["messages"][0]["content"], "Hi");
}

#[test]
fn test_unknown_style_and_unsupported_pairs() {
    let err = "not-a-style".parse::<Style>().unwrap_err();
    assert!(matches!(err, ail::AilError::UnknownStyle(_)));

    assert!(ail::get_response_emitter(Style::Responses).is_err());
    assert!(ail::get_stream_chunk_emitter(Style::Responses).is_err());
    assert!(ail::get_response_emitter(Style::Anthropic).is_ok());
}

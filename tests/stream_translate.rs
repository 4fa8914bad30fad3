//! Stateful streaming translation scenarios.

use ail::{convert_stream_chunk, StreamTranslator, Style};
use serde_json::Value;

fn value(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

#[test]
fn test_anthropic_stream_to_openai_chat() {
    // S3: every output carries the id/model seen in message_start; the last
    // chunk carries finish_reason "stop".
    let mut tr = StreamTranslator::new(Style::Anthropic, Style::ChatCompletions).unwrap();

    let chunks: [&[u8]; 5] = [
        br#"{"type":"message_start","message":{"id":"msg_01","model":"claude-3-opus"}}"#,
        br#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hello"}}"#,
        br#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":" world"}}"#,
        br#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":5}}"#,
        br#"{"type":"message_stop"}"#,
    ];

    let mut outputs = Vec::new();
    for chunk in chunks {
        outputs.extend(tr.push(chunk).unwrap());
    }

    assert!(outputs.len() >= 4, "want >= 4 chunks, got {}", outputs.len());
    for out in &outputs {
        let v = value(out);
        assert_eq!(v["id"], "msg_01");
        assert_eq!(v["model"], "claude-3-opus");
    }

    let texts: String = outputs
        .iter()
        .filter_map(|o| {
            value(o)["choices"][0]["delta"]["content"]
                .as_str()
                .map(String::from)
        })
        .collect();
    assert_eq!(texts, "Hello world");

    let last = value(outputs.last().unwrap());
    assert_eq!(last["choices"][0]["finish_reason"], "stop");
}

#[test]
fn test_openai_tool_fragments_to_google_buffered() {
    // S4: no functionCall may surface before the finish chunk; the finish
    // chunk drains the buffer with fully concatenated arguments.
    let mut tr = StreamTranslator::new(Style::ChatCompletions, Style::GoogleGenAi).unwrap();

    let fragments: [&[u8]; 3] = [
        br#"{"id":"c1","model":"gpt-4o","choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"get_weather","arguments":""}}]},"finish_reason":null}]}"#,
        br#"{"id":"c1","model":"gpt-4o","choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"location\":"}}]},"finish_reason":null}]}"#,
        br#"{"id":"c1","model":"gpt-4o","choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"NYC\"}"}}]},"finish_reason":null}]}"#,
    ];
    for fragment in fragments {
        for out in tr.push(fragment).unwrap() {
            assert!(
                !String::from_utf8_lossy(&out).contains("functionCall"),
                "buffered call emitted early"
            );
        }
    }

    let finish = br#"{"id":"c1","model":"gpt-4o","choices":[{"index":0,"delta":{},"finish_reason":"tool_calls"}]}"#;
    let outputs = tr.push(finish).unwrap();

    let call = outputs
        .iter()
        .map(|o| value(o))
        .find_map(|v| {
            let part = &v["candidates"][0]["content"]["parts"][0];
            part.get("functionCall").cloned()
        })
        .expect("flushed functionCall");
    assert_eq!(call["name"], "get_weather");
    assert_eq!(call["args"]["location"], "NYC");

    // Every buffered tool emitted exactly once.
    assert!(tr.flush().unwrap().is_empty());
}

#[test]
fn test_multi_tool_flush_single_chunk_in_order() {
    // S5: two buffered calls drain into one chunk, insertion order.
    let mut tr = StreamTranslator::new(Style::ChatCompletions, Style::GoogleGenAi).unwrap();

    let chunks: [&[u8]; 2] = [
        br#"{"id":"c","model":"m","choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_a","type":"function","function":{"name":"search","arguments":"{\"q\":\"x\"}"}}]},"finish_reason":null}]}"#,
        br#"{"id":"c","model":"m","choices":[{"index":0,"delta":{"tool_calls":[{"index":1,"id":"call_b","type":"function","function":{"name":"fetch","arguments":"{\"url\":\"y\"}"}}]},"finish_reason":null}]}"#,
    ];
    for chunk in chunks {
        tr.push(chunk).unwrap();
    }

    let flushed = tr.flush().unwrap();
    assert_eq!(flushed.len(), 1);
    let v = value(&flushed[0]);
    let parts = v["candidates"][0]["content"]["parts"].as_array().unwrap();
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0]["functionCall"]["name"], "search");
    assert_eq!(parts[1]["functionCall"]["name"], "fetch");
}

#[test]
fn test_openai_to_anthropic_tool_streaming_unbuffered() {
    // Anthropic targets stream fragments as their own typed events.
    let mut tr = StreamTranslator::new(Style::ChatCompletions, Style::Anthropic).unwrap();

    let start = br#"{"id":"c","model":"m","choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"get_weather","arguments":""}}]},"finish_reason":null}]}"#;
    let outputs = tr.push(start).unwrap();
    assert_eq!(outputs.len(), 1);
    let v = value(&outputs[0]);
    assert_eq!(v["type"], "content_block_start");
    assert_eq!(v["content_block"]["name"], "get_weather");

    let args = br#"{"id":"c","model":"m","choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"l\":1}"}}]},"finish_reason":null}]}"#;
    let outputs = tr.push(args).unwrap();
    let v = value(&outputs[0]);
    assert_eq!(v["type"], "content_block_delta");
    assert_eq!(v["delta"]["type"], "input_json_delta");
    assert_eq!(v["delta"]["partial_json"], "{\"l\":1}");

    let finish = br#"{"id":"c","model":"m","choices":[{"index":0,"delta":{},"finish_reason":"tool_calls"}]}"#;
    let outputs = tr.push(finish).unwrap();
    assert_eq!(outputs.len(), 2);
    assert_eq!(value(&outputs[0])["type"], "message_delta");
    assert_eq!(value(&outputs[0])["delta"]["stop_reason"], "tool_use");
    assert_eq!(value(&outputs[1])["type"], "message_stop");
}

#[test]
fn test_google_stream_to_openai_chat() {
    let mut tr = StreamTranslator::new(Style::GoogleGenAi, Style::ChatCompletions).unwrap();

    let text = br#"{"candidates":[{"content":{"parts":[{"text":"Hi"}],"role":"model"},"index":0}],"modelVersion":"gemini-1.5-pro"}"#;
    let outputs = tr.push(text).unwrap();
    assert_eq!(outputs.len(), 1);
    let v = value(&outputs[0]);
    assert_eq!(v["model"], "gemini-1.5-pro");
    assert_eq!(v["choices"][0]["delta"]["content"], "Hi");

    let terminal = br#"{"candidates":[{"content":{"parts":[]},"finishReason":"STOP","index":0}],"usageMetadata":{"promptTokenCount":1,"candidatesTokenCount":2,"totalTokenCount":3}}"#;
    let outputs = tr.push(terminal).unwrap();
    let v = value(&outputs[0]);
    assert_eq!(v["choices"][0]["finish_reason"], "stop");
    assert_eq!(v["usage"]["total_tokens"], 3);
}

#[test]
fn test_responses_stream_to_openai_chat() {
    let mut tr = StreamTranslator::new(Style::Responses, Style::ChatCompletions).unwrap();

    let created = br#"{"type":"response.created","response":{"id":"resp_1","model":"gpt-4o"}}"#;
    let outputs = tr.push(created).unwrap();
    assert_eq!(outputs.len(), 1);
    let v = value(&outputs[0]);
    assert_eq!(v["id"], "resp_1");
    assert_eq!(v["choices"][0]["delta"]["role"], "assistant");

    let delta = br#"{"type":"response.output_text.delta","delta":"Hey"}"#;
    let outputs = tr.push(delta).unwrap();
    let v = value(&outputs[0]);
    assert_eq!(v["id"], "resp_1");
    assert_eq!(v["choices"][0]["delta"]["content"], "Hey");
}

#[test]
fn test_stateless_convert_stream_chunk() {
    let chunk = br#"{"id":"chatcmpl-s","model":"gpt-4o","choices":[{"index":0,"delta":{"content":"Hello"},"finish_reason":null}]}"#;
    let out = convert_stream_chunk(chunk, Style::ChatCompletions, Style::Anthropic).unwrap();
    let v: Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(v["type"], "content_block_delta");
    assert_eq!(v["delta"]["text"], "Hello");
}

#[test]
fn test_metadata_retained_after_flush() {
    let mut tr = StreamTranslator::new(Style::Anthropic, Style::ChatCompletions).unwrap();
    tr.push(br#"{"type":"message_start","message":{"id":"msg_9","model":"claude-3"}}"#)
        .unwrap();
    tr.flush().unwrap();

    // A later push on the same stream still carries the remembered id.
    let outputs = tr
        .push(br#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"x"}}"#)
        .unwrap();
    assert_eq!(value(&outputs[0])["id"], "msg_9");
}

#[test]
fn test_thinking_deltas_cross_vendor() {
    let mut tr = StreamTranslator::new(Style::Anthropic, Style::ChatCompletions).unwrap();
    let chunk = br#"{"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"let me think"}}"#;
    let outputs = tr.push(chunk).unwrap();
    let v = value(&outputs[0]);
    assert_eq!(v["choices"][0]["delta"]["reasoning_content"], "let me think");
}

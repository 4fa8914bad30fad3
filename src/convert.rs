//! Style registry and any-to-any conversion entry points.
//!
//! A conversion pipeline is always: vendor parser → [`Program`] → vendor
//! emitter. The program in the middle is the plugin surface: callers may
//! inspect, slice, or rebuild it between the two halves.

use tracing::debug;

use crate::error::AilError;
use crate::program::Program;
use crate::protocol::{anthropic, gemini, openai_chat, openai_responses};
use crate::style::Style;

/// Converts a provider-specific JSON request into a program.
pub trait Parser {
    /// # Errors
    ///
    /// Returns [`AilError::Parse`] when the body is not valid JSON.
    fn parse_request(&self, body: &[u8]) -> Result<Program, AilError>;
}

/// Converts a program into a provider-specific JSON request.
pub trait Emitter {
    /// # Errors
    ///
    /// Emission itself is tolerant; errors surface only from JSON
    /// serialization, which is expected to succeed.
    fn emit_request(&self, prog: &Program) -> Result<Vec<u8>, AilError>;
}

/// Converts a provider-specific JSON response into a program.
pub trait ResponseParser {
    /// # Errors
    ///
    /// Returns [`AilError::Parse`] when the body is not valid JSON.
    fn parse_response(&self, body: &[u8]) -> Result<Program, AilError>;
}

/// Converts a program into a provider-specific JSON response.
pub trait ResponseEmitter {
    /// # Errors
    ///
    /// See [`Emitter::emit_request`].
    fn emit_response(&self, prog: &Program) -> Result<Vec<u8>, AilError>;
}

/// Converts one provider-specific streaming chunk into a (partial) program.
pub trait StreamChunkParser {
    /// # Errors
    ///
    /// Returns [`AilError::Parse`] when the chunk is not valid JSON.
    fn parse_stream_chunk(&self, body: &[u8]) -> Result<Program, AilError>;
}

/// Converts a (partial) program from a stream chunk into provider JSON.
pub trait StreamChunkEmitter {
    /// Returns `None` when the program has no representation in the target's
    /// stream framing; callers elide such chunks.
    ///
    /// # Errors
    ///
    /// See [`Emitter::emit_request`].
    fn emit_stream_chunk(&self, prog: &Program) -> Result<Option<Vec<u8>>, AilError>;
}

/// The request parser for a style.
///
/// # Errors
///
/// Infallible for the built-in styles; the `Result` mirrors the other
/// registry lookups.
pub fn get_parser(style: Style) -> Result<Box<dyn Parser>, AilError> {
    Ok(match style {
        Style::ChatCompletions => Box::new(openai_chat::ChatCompletionsParser),
        Style::Responses => Box::new(openai_responses::ResponsesParser),
        Style::Anthropic => Box::new(anthropic::AnthropicParser),
        Style::GoogleGenAi => Box::new(gemini::GoogleGenAiParser),
    })
}

/// The request emitter for a style.
///
/// # Errors
///
/// Infallible for the built-in styles.
pub fn get_emitter(style: Style) -> Result<Box<dyn Emitter>, AilError> {
    Ok(match style {
        Style::ChatCompletions => Box::new(openai_chat::ChatCompletionsEmitter),
        Style::Responses => Box::new(openai_responses::ResponsesEmitter),
        Style::Anthropic => Box::new(anthropic::AnthropicEmitter),
        Style::GoogleGenAi => Box::new(gemini::GoogleGenAiEmitter),
    })
}

/// The response parser for a style.
///
/// # Errors
///
/// Infallible for the built-in styles.
pub fn get_response_parser(style: Style) -> Result<Box<dyn ResponseParser>, AilError> {
    Ok(match style {
        Style::ChatCompletions => Box::new(openai_chat::ChatCompletionsParser),
        Style::Responses => Box::new(openai_responses::ResponsesParser),
        Style::Anthropic => Box::new(anthropic::AnthropicParser),
        Style::GoogleGenAi => Box::new(gemini::GoogleGenAiParser),
    })
}

/// The response emitter for a style.
///
/// # Errors
///
/// Returns [`AilError::Unsupported`] for `openai-responses`, which is a
/// request-only target.
pub fn get_response_emitter(style: Style) -> Result<Box<dyn ResponseEmitter>, AilError> {
    match style {
        Style::ChatCompletions => Ok(Box::new(openai_chat::ChatCompletionsEmitter)),
        Style::Anthropic => Ok(Box::new(anthropic::AnthropicEmitter)),
        Style::GoogleGenAi => Ok(Box::new(gemini::GoogleGenAiEmitter)),
        Style::Responses => Err(AilError::Unsupported {
            style,
            op: "response emitter",
        }),
    }
}

/// The stream-chunk parser for a style.
///
/// # Errors
///
/// Infallible for the built-in styles.
pub fn get_stream_chunk_parser(style: Style) -> Result<Box<dyn StreamChunkParser>, AilError> {
    Ok(match style {
        Style::ChatCompletions => Box::new(openai_chat::ChatCompletionsParser),
        Style::Responses => Box::new(openai_responses::ResponsesParser),
        Style::Anthropic => Box::new(anthropic::AnthropicParser),
        Style::GoogleGenAi => Box::new(gemini::GoogleGenAiParser),
    })
}

/// The stream-chunk emitter for a style.
///
/// # Errors
///
/// Returns [`AilError::Unsupported`] for `openai-responses`.
pub fn get_stream_chunk_emitter(style: Style) -> Result<Box<dyn StreamChunkEmitter>, AilError> {
    match style {
        Style::ChatCompletions => Ok(Box::new(openai_chat::ChatCompletionsEmitter)),
        Style::Anthropic => Ok(Box::new(anthropic::AnthropicEmitter)),
        Style::GoogleGenAi => Ok(Box::new(gemini::GoogleGenAiEmitter)),
        Style::Responses => Err(AilError::Unsupported {
            style,
            op: "stream chunk emitter",
        }),
    }
}

/// Converts a request body from one style to another via the IR.
///
/// `from == to` is not a no-op: the body still round-trips through the IR,
/// which may reorder keys or normalize whitespace.
///
/// # Errors
///
/// Propagates parse and registry errors.
pub fn convert_request(body: &[u8], from: Style, to: Style) -> Result<Vec<u8>, AilError> {
    let (_, out) = convert_request_program(body, from, to)?;
    Ok(out)
}

/// Like [`convert_request`] but also returns the intermediate program for
/// plugin inspection.
///
/// # Errors
///
/// Propagates parse and registry errors.
pub fn convert_request_program(
    body: &[u8],
    from: Style,
    to: Style,
) -> Result<(Program, Vec<u8>), AilError> {
    debug!(%from, %to, "convert request");
    let prog = get_parser(from)?.parse_request(body)?;
    let out = get_emitter(to)?.emit_request(&prog)?;
    Ok((prog, out))
}

/// Converts a response body from one style to another via the IR.
///
/// # Errors
///
/// Propagates parse and registry errors.
pub fn convert_response(body: &[u8], from: Style, to: Style) -> Result<Vec<u8>, AilError> {
    debug!(%from, %to, "convert response");
    let prog = get_response_parser(from)?.parse_response(body)?;
    get_response_emitter(to)?.emit_response(&prog)
}

/// Stateless single-chunk stream conversion.
///
/// Convenient for text-only streams and same-style passthrough. Streams with
/// multi-chunk tool calls or cross-chunk metadata need the stateful
/// [`StreamTranslator`](crate::stream::StreamTranslator).
///
/// # Errors
///
/// Propagates parse and registry errors.
pub fn convert_stream_chunk(body: &[u8], from: Style, to: Style) -> Result<Vec<u8>, AilError> {
    let prog = get_stream_chunk_parser(from)?.parse_stream_chunk(body)?;
    let out = get_stream_chunk_emitter(to)?.emit_stream_chunk(&prog)?;
    Ok(out.unwrap_or_default())
}

//! OpenAI Chat Completions (`/v1/chat/completions`).

pub mod decoder;
pub mod encoder;
pub mod response_decoder;
pub mod response_encoder;
pub mod stream;

use crate::convert::{
    Emitter, Parser, ResponseEmitter, ResponseParser, StreamChunkEmitter, StreamChunkParser,
};
use crate::error::AilError;
use crate::program::Program;

/// Parses OpenAI Chat Completions JSON into the IR.
pub struct ChatCompletionsParser;

/// Emits the IR as OpenAI Chat Completions JSON.
pub struct ChatCompletionsEmitter;

impl Parser for ChatCompletionsParser {
    fn parse_request(&self, body: &[u8]) -> Result<Program, AilError> {
        decoder::parse_request(body)
    }
}

impl ResponseParser for ChatCompletionsParser {
    fn parse_response(&self, body: &[u8]) -> Result<Program, AilError> {
        response_decoder::parse_response(body)
    }
}

impl StreamChunkParser for ChatCompletionsParser {
    fn parse_stream_chunk(&self, body: &[u8]) -> Result<Program, AilError> {
        stream::parse_stream_chunk(body)
    }
}

impl Emitter for ChatCompletionsEmitter {
    fn emit_request(&self, prog: &Program) -> Result<Vec<u8>, AilError> {
        encoder::emit_request(prog)
    }
}

impl ResponseEmitter for ChatCompletionsEmitter {
    fn emit_response(&self, prog: &Program) -> Result<Vec<u8>, AilError> {
        response_encoder::emit_response(prog)
    }
}

impl StreamChunkEmitter for ChatCompletionsEmitter {
    fn emit_stream_chunk(&self, prog: &Program) -> Result<Option<Vec<u8>>, AilError> {
        stream::emit_stream_chunk(prog)
    }
}

//! Anthropic Messages (`/v1/messages`).

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

/// Parses Anthropic Messages JSON into the IR.
pub struct AnthropicParser;

/// Emits the IR as Anthropic Messages JSON.
pub struct AnthropicEmitter;

impl Parser for AnthropicParser {
    fn parse_request(&self, body: &[u8]) -> Result<Program, AilError> {
        decoder::parse_request(body)
    }
}

impl ResponseParser for AnthropicParser {
    fn parse_response(&self, body: &[u8]) -> Result<Program, AilError> {
        response_decoder::parse_response(body)
    }
}

impl StreamChunkParser for AnthropicParser {
    fn parse_stream_chunk(&self, body: &[u8]) -> Result<Program, AilError> {
        stream::parse_stream_chunk(body)
    }
}

impl Emitter for AnthropicEmitter {
    fn emit_request(&self, prog: &Program) -> Result<Vec<u8>, AilError> {
        encoder::emit_request(prog)
    }
}

impl ResponseEmitter for AnthropicEmitter {
    fn emit_response(&self, prog: &Program) -> Result<Vec<u8>, AilError> {
        response_encoder::emit_response(prog)
    }
}

impl StreamChunkEmitter for AnthropicEmitter {
    fn emit_stream_chunk(&self, prog: &Program) -> Result<Option<Vec<u8>>, AilError> {
        stream::emit_stream_chunk(prog)
    }
}

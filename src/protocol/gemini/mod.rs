//! Google GenAI (`:generateContent` / `:streamGenerateContent`).

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

/// Parses Google GenAI JSON into the IR.
pub struct GoogleGenAiParser;

/// Emits the IR as Google GenAI JSON.
pub struct GoogleGenAiEmitter;

impl Parser for GoogleGenAiParser {
    fn parse_request(&self, body: &[u8]) -> Result<Program, AilError> {
        decoder::parse_request(body)
    }
}

impl ResponseParser for GoogleGenAiParser {
    fn parse_response(&self, body: &[u8]) -> Result<Program, AilError> {
        response_decoder::parse_response(body)
    }
}

impl StreamChunkParser for GoogleGenAiParser {
    fn parse_stream_chunk(&self, body: &[u8]) -> Result<Program, AilError> {
        stream::parse_stream_chunk(body)
    }
}

impl Emitter for GoogleGenAiEmitter {
    fn emit_request(&self, prog: &Program) -> Result<Vec<u8>, AilError> {
        encoder::emit_request(prog)
    }
}

impl ResponseEmitter for GoogleGenAiEmitter {
    fn emit_response(&self, prog: &Program) -> Result<Vec<u8>, AilError> {
        response_encoder::emit_response(prog)
    }
}

impl StreamChunkEmitter for GoogleGenAiEmitter {
    fn emit_stream_chunk(&self, prog: &Program) -> Result<Option<Vec<u8>>, AilError> {
        stream::emit_stream_chunk(prog)
    }
}

//! OpenAI Responses (`/v1/responses`).
//!
//! Request-only target: the response and stream-chunk emitters do not exist
//! for this style, and the registry reports them as unsupported.

pub mod decoder;
pub mod encoder;
pub mod response_decoder;
pub mod stream;

use crate::convert::{Emitter, Parser, ResponseParser, StreamChunkParser};
use crate::error::AilError;
use crate::program::Program;

/// Parses OpenAI Responses JSON into the IR.
pub struct ResponsesParser;

/// Emits the IR as an OpenAI Responses request.
pub struct ResponsesEmitter;

impl Parser for ResponsesParser {
    fn parse_request(&self, body: &[u8]) -> Result<Program, AilError> {
        decoder::parse_request(body)
    }
}

impl ResponseParser for ResponsesParser {
    fn parse_response(&self, body: &[u8]) -> Result<Program, AilError> {
        response_decoder::parse_response(body)
    }
}

impl StreamChunkParser for ResponsesParser {
    fn parse_stream_chunk(&self, body: &[u8]) -> Result<Program, AilError> {
        stream::parse_stream_chunk(body)
    }
}

impl Emitter for ResponsesEmitter {
    fn emit_request(&self, prog: &Program) -> Result<Vec<u8>, AilError> {
        encoder::emit_request(prog)
    }
}

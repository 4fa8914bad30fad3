//! AI Intermediate Language: a provider-agnostic IR for LLM provider APIs.
//!
//! A request or response in one vendor's JSON schema lowers into a linear
//! opcode stream (the [`Program`]) and raises back into any other vendor's
//! schema, decoupling parsing from emission so any-to-any conversion needs
//! one parser and one emitter per format rather than one translator per
//! pair. The same machinery covers non-streaming bodies and live streaming
//! events; [`StreamTranslator`] carries the cross-chunk state.

pub mod asm;
pub mod binary;
pub mod convert;
pub mod disasm;
pub mod error;
pub mod extras;
pub mod manip;
pub mod opcode;
pub mod program;
pub mod protocol;
pub mod stream;
pub mod style;

pub(crate) mod json_scan;

pub use asm::asm;
pub use convert::{
    convert_request, convert_request_program, convert_response, convert_stream_chunk, get_emitter,
    get_parser, get_response_emitter, get_response_parser, get_stream_chunk_emitter,
    get_stream_chunk_parser, Emitter, Parser, ResponseEmitter, ResponseParser, StreamChunkEmitter,
    StreamChunkParser,
};
pub use error::{AilError, PayloadKind};
pub use extras::ExtrasCollector;
pub use manip::{MessageSpan, ToolCallSpan, ToolDefSpan, ToolResultSpan};
pub use opcode::{ArgShape, Opcode};
pub use program::{Arg, Instruction, JsonBytes, Program};
pub use stream::StreamTranslator;
pub use style::Style;

//! Stateful chunk-by-chunk stream translation between provider formats.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::convert::{get_stream_chunk_emitter, get_stream_chunk_parser};
use crate::convert::{StreamChunkEmitter, StreamChunkParser};
use crate::error::AilError;
use crate::opcode::Opcode;
use crate::program::{Instruction, Program};
use crate::protocol::ToolDelta;
use crate::style::Style;

/// Translates a live stream chunk-by-chunk from one provider framing to
/// another, bridging structural mismatches:
///
/// - Text deltas convert and forward 1:1.
/// - Tool-call fragments forward immediately to targets that stream them
///   (OpenAI, Anthropic) and buffer until complete for targets that need
///   whole function calls per chunk (Google GenAI).
/// - Response ID and model are remembered and injected into every emitted
///   chunk, since some formats require them on every event while others send
///   them once.
/// - One source event may expand into several target events (an OpenAI
///   finish chunk becomes Anthropic's `message_delta` + `message_stop`).
///
/// A translator instance belongs to exactly one logical stream; `push` and
/// `flush` take `&mut self`, so per-stream exclusive ownership is enforced
/// by the borrow checker.
pub struct StreamTranslator {
    parser: Box<dyn StreamChunkParser>,
    emitter: Box<dyn StreamChunkEmitter>,
    target: Style,

    resp_id: String,
    resp_model: String,

    // Tool-call buffering for targets needing complete function calls.
    buffer_tools: bool,
    pending_tools: FxHashMap<u64, PendingToolCall>,
    tool_order: Vec<u64>,
}

impl std::fmt::Debug for StreamTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTranslator")
            .field("target", &self.target)
            .field("resp_id", &self.resp_id)
            .field("resp_model", &self.resp_model)
            .field("buffer_tools", &self.buffer_tools)
            .finish()
    }
}

/// Accumulates tool-call fragments for buffered emission.
#[derive(Default)]
struct PendingToolCall {
    id: String,
    name: String,
    args: String,
}

impl StreamTranslator {
    /// Creates a translator from one style to another.
    ///
    /// # Errors
    ///
    /// Returns [`AilError::Unsupported`] when the target style has no
    /// stream-chunk emitter.
    pub fn new(from: Style, to: Style) -> Result<Self, AilError> {
        let parser = get_stream_chunk_parser(from)?;
        let emitter = get_stream_chunk_emitter(to)?;
        debug!(%from, %to, "stream translator created");
        Ok(StreamTranslator {
            parser,
            emitter,
            target: to,
            resp_id: String::new(),
            resp_model: String::new(),
            // Google GenAI needs complete function calls in one chunk.
            buffer_tools: to == Style::GoogleGenAi,
            pending_tools: FxHashMap::default(),
            tool_order: Vec::new(),
        })
    }

    /// Processes one source chunk and returns zero or more converted output
    /// chunks, each a complete JSON object suitable for an SSE `data:` line.
    ///
    /// # Errors
    ///
    /// Returns the source parser's error for invalid JSON and the target
    /// emitter's error when serialization fails.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Vec<u8>>, AilError> {
        let parsed = self.parser.parse_stream_chunk(chunk)?;
        self.push_parsed(&parsed)
    }

    /// Like [`StreamTranslator::push`] for an already-parsed program, e.g.
    /// after plugin transformation.
    ///
    /// # Errors
    ///
    /// Returns the target emitter's error when serialization fails.
    pub fn push_program(&mut self, prog: &Program) -> Result<Vec<Vec<u8>>, AilError> {
        self.push_parsed(prog)
    }

    /// Forces emission of any buffered tool-call fragments. Call when the
    /// source stream ends. Idempotent: later calls return nothing. The
    /// remembered ID/model survive for further pushes on the same stream.
    ///
    /// # Errors
    ///
    /// Returns the target emitter's error when serialization fails.
    pub fn flush(&mut self) -> Result<Vec<Vec<u8>>, AilError> {
        let Some(tools) = self.drain_pending_tools() else {
            return Ok(Vec::new());
        };
        trace!(count = tools.len(), "flushing buffered tool calls");
        let mut unit = Program::new();
        unit.code = tools.into_vec();
        self.inject_metadata(&mut unit);
        match self.emitter.emit_stream_chunk(&unit)? {
            Some(out) => Ok(vec![out]),
            None => Ok(Vec::new()),
        }
    }

    fn push_parsed(&mut self, parsed: &Program) -> Result<Vec<Vec<u8>>, AilError> {
        if parsed.is_empty() {
            return Ok(Vec::new());
        }

        self.track_metadata(parsed);
        let units = self.split_units(parsed);

        let mut outputs = Vec::with_capacity(units.len());
        for unit in units {
            let mut unit_prog = Program {
                code: unit.into_vec(),
                buffers: parsed.buffers.clone(),
            };
            self.inject_metadata(&mut unit_prog);
            if let Some(out) = self.emitter.emit_stream_chunk(&unit_prog)? {
                outputs.push(out);
            }
        }
        Ok(outputs)
    }

    /// Remembers RESP_ID and RESP_MODEL for injection into later chunks.
    fn track_metadata(&mut self, prog: &Program) {
        for inst in &prog.code {
            match inst.op {
                Opcode::RespId => {
                    self.resp_id = inst.as_str().unwrap_or("").to_string();
                }
                Opcode::RespModel => {
                    self.resp_model = inst.as_str().unwrap_or("").to_string();
                }
                _ => {}
            }
        }
    }

    /// Prepends remembered RESP_ID / RESP_MODEL when the unit lacks them.
    fn inject_metadata(&self, prog: &mut Program) {
        let has_id = prog.has_opcode(Opcode::RespId);
        let has_model = prog.has_opcode(Opcode::RespModel);

        let mut prepend: SmallVec<[Instruction; 2]> = SmallVec::new();
        if !has_id && !self.resp_id.is_empty() {
            prepend.push(Instruction::str(Opcode::RespId, self.resp_id.clone()));
        }
        if !has_model && !self.resp_model.is_empty() {
            prepend.push(Instruction::str(Opcode::RespModel, self.resp_model.clone()));
        }
        if !prepend.is_empty() {
            prog.code.splice(0..0, prepend);
        }
    }

    /// Splits a parsed program into emittable units per the target strategy.
    fn split_units(&mut self, prog: &Program) -> Vec<Unit> {
        if self.target == Style::Anthropic {
            return self.split_per_event(prog);
        }
        if self.buffer_tools {
            return self.split_with_buffering(prog);
        }
        // Passthrough: the whole program is one unit.
        vec![Unit::from_iter(prog.code.iter().cloned())]
    }

    /// Anthropic targets frame every event as its own JSON object, so each
    /// event-producing opcode becomes a unit. ID/model attach to the
    /// STREAM_START unit (or the first unit); USAGE attaches to the most
    /// recent RESP_DONE unit so `message_delta` carries stop reason and
    /// usage together.
    fn split_per_event(&self, prog: &Program) -> Vec<Unit> {
        let mut meta: Unit = SmallVec::new();
        let mut events: Vec<Unit> = Vec::new();

        for inst in &prog.code {
            match inst.op {
                Opcode::RespId | Opcode::RespModel => meta.push(inst.clone()),
                Opcode::StreamStart
                | Opcode::StreamDelta
                | Opcode::StreamThinkDelta
                | Opcode::StreamToolDelta
                | Opcode::RespDone
                | Opcode::StreamEnd => events.push(SmallVec::from_iter([inst.clone()])),
                Opcode::Usage => {
                    let done = events
                        .iter_mut()
                        .rev()
                        .find(|unit| unit.first().is_some_and(|i| i.op == Opcode::RespDone));
                    match done {
                        Some(unit) => unit.push(inst.clone()),
                        // No RESP_DONE yet: carried like id/model.
                        None => meta.push(inst.clone()),
                    }
                }
                _ => {}
            }
        }

        if events.is_empty() {
            if meta.is_empty() {
                return Vec::new();
            }
            return vec![meta];
        }

        let target = events
            .iter()
            .position(|unit| unit.first().is_some_and(|i| i.op == Opcode::StreamStart))
            .unwrap_or(0);
        let tail = std::mem::take(&mut events[target]);
        meta.extend(tail);
        events[target] = meta;
        events
    }

    /// Google targets need whole function calls: non-tool instructions flush
    /// as encountered, tool deltas accumulate by index, and a terminal
    /// opcode drains the buffer ahead of itself.
    fn split_with_buffering(&mut self, prog: &Program) -> Vec<Unit> {
        let mut units: Vec<Unit> = Vec::new();
        let mut current: Unit = SmallVec::new();

        for inst in &prog.code {
            match inst.op {
                Opcode::StreamToolDelta => {
                    if let Some(delta) = ToolDelta::from_json(inst.as_json().unwrap_or(b"{}")) {
                        self.buffer_tool_delta(&delta);
                    }
                }
                Opcode::RespDone | Opcode::StreamEnd => {
                    if !current.is_empty() {
                        units.push(std::mem::take(&mut current));
                    }
                    if let Some(tools) = self.drain_pending_tools() {
                        units.push(tools);
                    }
                    units.push(SmallVec::from_iter([inst.clone()]));
                }
                _ => current.push(inst.clone()),
            }
        }

        if !current.is_empty() {
            units.push(current);
        }
        units
    }

    /// Merges a fragment into the pending table. First-seen index order is
    /// preserved for the drain.
    fn buffer_tool_delta(&mut self, delta: &ToolDelta) {
        let entry = match self.pending_tools.entry(delta.index) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(e) => {
                self.tool_order.push(delta.index);
                e.insert(PendingToolCall::default())
            }
        };
        if let Some(id) = &delta.id {
            if !id.is_empty() {
                entry.id = id.clone();
            }
        }
        if let Some(name) = &delta.name {
            if !name.is_empty() {
                entry.name = name.clone();
            }
        }
        if let Some(args) = &delta.arguments {
            entry.args.push_str(args);
        }
    }

    /// Converts the pending table into one unit of complete tool deltas, in
    /// insertion order, then clears it. `None` when nothing is pending.
    fn drain_pending_tools(&mut self) -> Option<Unit> {
        if self.tool_order.is_empty() {
            return None;
        }
        let mut unit: Unit = SmallVec::new();
        for index in std::mem::take(&mut self.tool_order) {
            let Some(tool) = self.pending_tools.remove(&index) else {
                continue;
            };
            let delta = ToolDelta {
                index,
                id: (!tool.id.is_empty()).then_some(tool.id),
                name: (!tool.name.is_empty()).then_some(tool.name),
                arguments: (!tool.args.is_empty()).then_some(tool.args),
            };
            unit.push(Instruction::json(Opcode::StreamToolDelta, delta.to_json()));
        }
        self.pending_tools.clear();
        Some(unit)
    }
}

type Unit = SmallVec<[Instruction; 4]>;

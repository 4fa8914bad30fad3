//! The AIL program: an ordered instruction sequence plus indexed side-buffers.

use std::borrow::Cow;

use bytes::Bytes;

use crate::opcode::{ArgShape, Opcode};

/// Owned raw bytes of a self-contained JSON value.
///
/// Instructions own their JSON payloads; anything copied out of a parser's
/// input buffer is deep-copied on the way in, so clones can never alias the
/// original input.
pub type JsonBytes = Vec<u8>;

/// The typed argument of an instruction, one variant per [`ArgShape`].
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    None,
    Str(String),
    Float(f64),
    Int(i32),
    Json(JsonBytes),
    Ref(u32),
    KeyStr { key: String, val: String },
    KeyJson { key: String, json: JsonBytes },
}

/// A single AIL instruction: an opcode plus exactly the argument its shape
/// requires.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub op: Opcode,
    pub arg: Arg,
}

impl Instruction {
    #[must_use]
    pub fn nullary(op: Opcode) -> Self {
        Instruction { op, arg: Arg::None }
    }

    #[must_use]
    pub fn str(op: Opcode, s: impl Into<String>) -> Self {
        Instruction {
            op,
            arg: Arg::Str(s.into()),
        }
    }

    #[must_use]
    pub fn float(op: Opcode, f: f64) -> Self {
        Instruction {
            op,
            arg: Arg::Float(f),
        }
    }

    #[must_use]
    pub fn int(op: Opcode, i: i32) -> Self {
        Instruction {
            op,
            arg: Arg::Int(i),
        }
    }

    #[must_use]
    pub fn json(op: Opcode, json: impl Into<JsonBytes>) -> Self {
        Instruction {
            op,
            arg: Arg::Json(json.into()),
        }
    }

    #[must_use]
    pub fn buf_ref(op: Opcode, idx: u32) -> Self {
        Instruction {
            op,
            arg: Arg::Ref(idx),
        }
    }

    #[must_use]
    pub fn key_str(op: Opcode, key: impl Into<String>, val: impl Into<String>) -> Self {
        Instruction {
            op,
            arg: Arg::KeyStr {
                key: key.into(),
                val: val.into(),
            },
        }
    }

    #[must_use]
    pub fn key_json(op: Opcode, key: impl Into<String>, json: impl Into<JsonBytes>) -> Self {
        Instruction {
            op,
            arg: Arg::KeyJson {
                key: key.into(),
                json: json.into(),
            },
        }
    }

    /// The string argument, for string-shaped and key+string instructions.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match &self.arg {
            Arg::Str(s) => Some(s),
            Arg::KeyStr { val, .. } => Some(val),
            _ => None,
        }
    }

    /// The JSON payload, for json-shaped and key+json instructions.
    #[must_use]
    pub fn as_json(&self) -> Option<&[u8]> {
        match &self.arg {
            Arg::Json(j) => Some(j),
            Arg::KeyJson { json, .. } => Some(json),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self.arg {
            Arg::Float(f) => Some(f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i32> {
        match self.arg {
            Arg::Int(i) => Some(i),
            _ => None,
        }
    }

    /// The buffer index, for ref-shaped instructions.
    #[must_use]
    pub fn as_buf_ref(&self) -> Option<u32> {
        match self.arg {
            Arg::Ref(n) => Some(n),
            _ => None,
        }
    }

    /// The key, for key+string and key+json instructions.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match &self.arg {
            Arg::KeyStr { key, .. } | Arg::KeyJson { key, .. } => Some(key),
            _ => None,
        }
    }
}

/// An ordered instruction sequence plus a side-buffer table for large blobs
/// (image data, audio data, URLs, reasoning signatures).
///
/// Programs are built append-only by parsers, optionally transformed into
/// fresh programs by plugins, and walked read-only by emitters. `Clone` is a
/// deep copy of the instruction stream; side-buffer storage is shared between
/// clones but never observed as mutable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub code: Vec<Instruction>,
    pub buffers: Vec<Bytes>,
}

impl Program {
    /// Creates an empty program.
    #[must_use]
    pub fn new() -> Self {
        Program {
            code: Vec::with_capacity(32),
            buffers: Vec::new(),
        }
    }

    /// Appends a bare opcode with no argument.
    pub fn emit(&mut self, op: Opcode) {
        self.code.push(Instruction::nullary(op));
    }

    /// Appends an opcode with a string argument.
    pub fn emit_str(&mut self, op: Opcode, s: impl Into<String>) {
        self.code.push(Instruction::str(op, s));
    }

    /// Appends an opcode with a float argument.
    pub fn emit_float(&mut self, op: Opcode, f: f64) {
        self.code.push(Instruction::float(op, f));
    }

    /// Appends an opcode with an int32 argument.
    pub fn emit_int(&mut self, op: Opcode, i: i32) {
        self.code.push(Instruction::int(op, i));
    }

    /// Appends an opcode with a raw JSON argument.
    pub fn emit_json(&mut self, op: Opcode, json: impl Into<JsonBytes>) {
        self.code.push(Instruction::json(op, json));
    }

    /// Appends an opcode with a side-buffer reference.
    pub fn emit_ref(&mut self, op: Opcode, idx: u32) {
        self.code.push(Instruction::buf_ref(op, idx));
    }

    /// Appends an opcode with key + string-value arguments (SET_META).
    pub fn emit_kv(&mut self, op: Opcode, key: impl Into<String>, val: impl Into<String>) {
        self.code.push(Instruction::key_str(op, key, val));
    }

    /// Appends an opcode with key + JSON-value arguments (EXT_DATA).
    pub fn emit_kj(&mut self, op: Opcode, key: impl Into<String>, json: impl Into<JsonBytes>) {
        self.code.push(Instruction::key_json(op, key, json));
    }

    /// Appends data to the side-buffer table and returns its index.
    pub fn add_buffer(&mut self, data: impl Into<Bytes>) -> u32 {
        let idx = self.buffers.len() as u32;
        self.buffers.push(data.into());
        idx
    }

    /// The side-buffer at `idx`, or `None` when the index is out of range.
    #[must_use]
    pub fn buffer(&self, idx: u32) -> Option<&[u8]> {
        self.buffers.get(idx as usize).map(|b| b.as_ref())
    }

    /// The side-buffer at `idx` as text. Out-of-range indices and invalid
    /// UTF-8 degrade to the empty string / replacement characters; emitters
    /// tolerate both.
    #[must_use]
    pub fn buffer_text(&self, idx: u32) -> Cow<'_, str> {
        match self.buffers.get(idx as usize) {
            Some(b) => String::from_utf8_lossy(b),
            None => Cow::Borrowed(""),
        }
    }

    /// The number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Creates a new program by concatenating this program's code with
    /// `other`'s. Buffer references in the appended code are re-based by this
    /// program's buffer count.
    #[must_use]
    pub fn append(&self, other: &Program) -> Program {
        let mut out = self.clone();
        let base = out.buffers.len() as u32;
        out.code.reserve(other.code.len());
        for inst in &other.code {
            let mut inst = inst.clone();
            if inst.op.shape() == ArgShape::Ref {
                if let Arg::Ref(n) = &mut inst.arg {
                    *n += base;
                }
            }
            out.code.push(inst);
        }
        out.buffers.extend(other.buffers.iter().cloned());
        out
    }

    /// The first SET_MODEL value, or the empty string.
    #[must_use]
    pub fn get_model(&self) -> &str {
        self.code
            .iter()
            .find(|inst| inst.op == Opcode::SetModel)
            .and_then(Instruction::as_str)
            .unwrap_or("")
    }

    /// True if SET_STREAM is present.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.has_opcode(Opcode::SetStream)
    }

    /// Replaces the first SET_MODEL value in place, or prepends one so it
    /// sits at the top of the config section.
    pub fn set_model(&mut self, model: impl Into<String>) {
        let model = model.into();
        for inst in &mut self.code {
            if inst.op == Opcode::SetModel {
                inst.arg = Arg::Str(model);
                return;
            }
        }
        self.code.insert(0, Instruction::str(Opcode::SetModel, model));
    }

    /// The indices of every instruction whose opcode matches `op`.
    #[must_use]
    pub fn find_all(&self, op: Opcode) -> Vec<usize> {
        self.code
            .iter()
            .enumerate()
            .filter(|(_, inst)| inst.op == op)
            .map(|(i, _)| i)
            .collect()
    }

    /// True if any instruction matches `op`.
    #[must_use]
    pub fn has_opcode(&self, op: Opcode) -> bool {
        self.code.iter().any(|inst| inst.op == op)
    }

    /// All SET_META key-value pairs, last write wins.
    #[must_use]
    pub fn config(&self) -> rustc_hash::FxHashMap<String, String> {
        let mut out = rustc_hash::FxHashMap::default();
        for inst in &self.code {
            if inst.op == Opcode::SetMeta {
                if let Arg::KeyStr { key, val } = &inst.arg {
                    out.insert(key.clone(), val.clone());
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_and_query() {
        let mut prog = Program::new();
        prog.emit_str(Opcode::SetModel, "gpt-4o");
        prog.emit(Opcode::SetStream);
        prog.emit_float(Opcode::SetTemp, 0.7);
        prog.emit_int(Opcode::SetMax, 1024);

        assert_eq!(prog.len(), 4);
        assert_eq!(prog.get_model(), "gpt-4o");
        assert!(prog.is_streaming());
    }

    #[test]
    fn test_set_model_replaces_or_prepends() {
        let mut prog = Program::new();
        prog.emit(Opcode::MsgStart);
        prog.emit(Opcode::MsgEnd);
        prog.set_model("a");
        assert_eq!(prog.code[0].op, Opcode::SetModel);
        assert_eq!(prog.get_model(), "a");

        prog.set_model("b");
        assert_eq!(prog.len(), 3);
        assert_eq!(prog.get_model(), "b");
    }

    #[test]
    fn test_clone_isolation() {
        let mut prog = Program::new();
        prog.emit_json(Opcode::CallArgs, b"{\"x\":1}".to_vec());
        prog.add_buffer(&b"payload"[..]);

        let mut copy = prog.clone();
        if let Arg::Json(j) = &mut copy.code[0].arg {
            j[1] = b'y';
        }
        copy.buffers[0] = Bytes::from_static(b"other");

        assert_eq!(prog.code[0].as_json().unwrap(), b"{\"x\":1}");
        assert_eq!(prog.buffer(0).unwrap(), b"payload");
    }

    #[test]
    fn test_append_renumbers_refs() {
        let mut a = Program::new();
        let ra = a.add_buffer(&b"img-a"[..]);
        a.emit_ref(Opcode::ImgRef, ra);

        let mut b = Program::new();
        let rb = b.add_buffer(&b"img-b"[..]);
        b.emit_ref(Opcode::ImgRef, rb);
        b.emit_ref(Opcode::ThinkRef, rb);
        b.emit_str(Opcode::TxtChunk, "hi");

        let joined = a.append(&b);
        assert_eq!(joined.buffers.len(), 2);
        assert_eq!(joined.code[0].as_buf_ref(), Some(0));
        assert_eq!(joined.code[1].as_buf_ref(), Some(1));
        assert_eq!(joined.code[2].as_buf_ref(), Some(1));
        assert_eq!(joined.buffer(1).unwrap(), b"img-b");
        // Source programs are untouched.
        assert_eq!(b.code[0].as_buf_ref(), Some(0));
    }

    #[test]
    fn test_buffer_out_of_range() {
        let prog = Program::new();
        assert!(prog.buffer(3).is_none());
        assert_eq!(prog.buffer_text(3), "");
    }
}

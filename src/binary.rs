//! Binary serialization of programs.
//!
//! Wire layout, little-endian throughout:
//!
//! ```text
//! [magic "AIL\0"][version 0x01][buffer count u32]
//! { length u32 + bytes } x buffer count
//! { opcode u8 + shape-encoded args }*   until end of input
//! ```
//!
//! String and JSON arguments are length-prefixed; floats are IEEE 754
//! binary64; ints are i32; refs are u32; two-part arguments are two
//! length-prefixed payloads in order. Decoding validates magic and version
//! exactly: there is no forward compatibility.

use std::io::Write;

use crate::error::AilError;
use crate::opcode::{ArgShape, Opcode};
use crate::program::{Arg, Instruction, Program};

const MAGIC: [u8; 4] = [b'A', b'I', b'L', 0x00];
const VERSION: u8 = 0x01;

impl Program {
    /// Encodes the program into AIL binary format. Deterministic: equal
    /// programs produce identical bytes.
    #[must_use]
    pub fn to_binary(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64 + self.code.len() * 8);
        out.extend_from_slice(&MAGIC);
        out.push(VERSION);

        write_u32(&mut out, self.buffers.len() as u32);
        for buf in &self.buffers {
            write_bytes(&mut out, buf);
        }

        for inst in &self.code {
            out.push(inst.op as u8);
            match &inst.arg {
                Arg::None => {}
                Arg::Str(s) => write_bytes(&mut out, s.as_bytes()),
                Arg::Float(f) => out.extend_from_slice(&f.to_le_bytes()),
                Arg::Int(i) => out.extend_from_slice(&i.to_le_bytes()),
                Arg::Json(j) => write_bytes(&mut out, j),
                Arg::Ref(n) => write_u32(&mut out, *n),
                Arg::KeyStr { key, val } => {
                    write_bytes(&mut out, key.as_bytes());
                    write_bytes(&mut out, val.as_bytes());
                }
                Arg::KeyJson { key, json } => {
                    write_bytes(&mut out, key.as_bytes());
                    write_bytes(&mut out, json);
                }
            }
        }
        out
    }

    /// Encodes the program to a writer.
    ///
    /// # Errors
    ///
    /// Returns [`AilError::EncodeIo`] when the writer fails.
    pub fn encode_to<W: Write>(&self, mut w: W) -> Result<(), AilError> {
        w.write_all(&self.to_binary())?;
        Ok(())
    }

    /// Decodes a program from AIL binary format.
    ///
    /// # Errors
    ///
    /// Returns [`AilError::Decode`] on bad magic, unsupported version, short
    /// reads, length prefixes past the end of input, or unknown opcodes.
    pub fn decode(data: &[u8]) -> Result<Program, AilError> {
        let mut r = Reader { data, pos: 0 };

        let magic = r.take(4, "magic")?;
        if magic != MAGIC {
            return Err(AilError::decode(format!(
                "invalid magic bytes {:?}",
                &magic[..magic.len().min(4)]
            )));
        }
        let version = r.take(1, "version")?[0];
        if version != VERSION {
            return Err(AilError::decode(format!(
                "unsupported version {version} (want {VERSION})"
            )));
        }

        let mut prog = Program::new();
        let buf_count = r.u32("buffer count")?;
        for i in 0..buf_count {
            let buf = r.length_prefixed(&format!("buffer {i}"))?;
            prog.buffers.push(bytes::Bytes::copy_from_slice(buf));
        }

        while let Some(op_byte) = r.next_byte() {
            let op = Opcode::from_byte(op_byte)
                .ok_or_else(|| AilError::decode(format!("unknown opcode 0x{op_byte:02X}")))?;
            let arg = match op.shape() {
                ArgShape::Nullary => Arg::None,
                ArgShape::Str => Arg::Str(r.string(op.mnemonic())?),
                ArgShape::Float => {
                    let raw = r.take(8, op.mnemonic())?;
                    let mut buf = [0u8; 8];
                    buf.copy_from_slice(raw);
                    Arg::Float(f64::from_le_bytes(buf))
                }
                ArgShape::Int => {
                    let raw = r.take(4, op.mnemonic())?;
                    let mut buf = [0u8; 4];
                    buf.copy_from_slice(raw);
                    Arg::Int(i32::from_le_bytes(buf))
                }
                ArgShape::Json => Arg::Json(r.length_prefixed(op.mnemonic())?.to_vec()),
                ArgShape::Ref => Arg::Ref(r.u32(op.mnemonic())?),
                ArgShape::KeyStr => {
                    let key = r.string("SET_META key")?;
                    let val = r.string("SET_META val")?;
                    Arg::KeyStr { key, val }
                }
                ArgShape::KeyJson => {
                    let key = r.string("EXT_DATA key")?;
                    let json = r.length_prefixed("EXT_DATA json")?.to_vec();
                    Arg::KeyJson { key, json }
                }
            };
            prog.code.push(Instruction { op, arg });
        }

        Ok(prog)
    }
}

fn write_u32(out: &mut Vec<u8>, n: u32) {
    out.extend_from_slice(&n.to_le_bytes());
}

fn write_bytes(out: &mut Vec<u8>, b: &[u8]) {
    write_u32(out, b.len() as u32);
    out.extend_from_slice(b);
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8], AilError> {
        let remaining = self.data.len() - self.pos;
        if remaining < n {
            return Err(AilError::decode(format!(
                "short read: {what} needs {n} bytes, {remaining} left"
            )));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn next_byte(&mut self) -> Option<u8> {
        let b = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    fn u32(&mut self, what: &str) -> Result<u32, AilError> {
        let raw = self.take(4, what)?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(raw);
        Ok(u32::from_le_bytes(buf))
    }

    fn length_prefixed(&mut self, what: &str) -> Result<&'a [u8], AilError> {
        let len = self.u32(what)? as usize;
        let remaining = self.data.len() - self.pos;
        if len > remaining {
            return Err(AilError::decode(format!(
                "{what}: length prefix {len} exceeds remaining input {remaining}"
            )));
        }
        self.take(len, what)
    }

    fn string(&mut self, what: &str) -> Result<String, AilError> {
        let raw = self.length_prefixed(what)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| AilError::decode(format!("{what}: string argument is not UTF-8")))
    }
}

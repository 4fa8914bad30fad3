//! Human-readable assembly listing of a program.

use std::fmt::Write as _;

use base64::Engine as _;

use crate::json_scan::compact_json;
use crate::program::{Arg, Program};

impl Program {
    /// Renders the program as a textual listing.
    ///
    /// Side-buffers come first as base64 `.ref N` directives, followed by a
    /// blank line. Instructions are indented two spaces per open block.
    /// String arguments that contain a newline use a `<<<` heredoc so the
    /// [`asm`](crate::asm::asm) round-trip is lossless; JSON arguments are
    /// compacted to one line.
    #[must_use]
    pub fn disasm(&self) -> String {
        let mut out = String::new();

        if !self.buffers.is_empty() {
            for (i, buf) in self.buffers.iter().enumerate() {
                let _ = writeln!(
                    out,
                    ".ref {i} {}",
                    base64::engine::general_purpose::STANDARD.encode(buf)
                );
            }
            out.push('\n');
        }

        let mut indent = 0usize;
        for inst in &self.code {
            if inst.op.closes_block() {
                indent = indent.saturating_sub(1);
            }
            for _ in 0..indent {
                out.push_str("  ");
            }

            out.push_str(inst.op.mnemonic());

            match &inst.arg {
                Arg::None => {}
                Arg::Str(s) => write_str(&mut out, s),
                Arg::Float(f) => {
                    let _ = write!(out, " {f:.4}");
                }
                Arg::Int(i) => {
                    let _ = write!(out, " {i}");
                }
                Arg::Ref(n) => {
                    let _ = write!(out, " ref:{n}");
                }
                Arg::Json(j) => write_json(&mut out, j),
                Arg::KeyStr { key, val } => {
                    out.push(' ');
                    out.push_str(key);
                    out.push(' ');
                    out.push_str(val);
                }
                Arg::KeyJson { key, json } => {
                    out.push(' ');
                    out.push_str(key);
                    write_json(&mut out, json);
                }
            }

            out.push('\n');

            if inst.op.opens_block() {
                indent += 1;
            }
        }
        out
    }
}

/// Writes a string argument, as a heredoc block when it contains newlines.
fn write_str(out: &mut String, s: &str) {
    if s.contains('\n') {
        out.push_str(" <<<\n");
        out.push_str(s);
        out.push_str("\n>>>");
    } else {
        out.push(' ');
        out.push_str(s);
    }
}

/// Writes a JSON argument compacted to a single line. Payloads the compactor
/// rejects are written as-is (should not happen for valid programs).
fn write_json(out: &mut String, json: &[u8]) {
    out.push(' ');
    match compact_json(json) {
        Some(compact) => out.push_str(&String::from_utf8_lossy(&compact)),
        None => out.push_str(&String::from_utf8_lossy(json)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Opcode;

    #[test]
    fn test_listing_shape() {
        let mut prog = Program::new();
        prog.emit_str(Opcode::SetModel, "gpt-4o");
        prog.emit(Opcode::MsgStart);
        prog.emit(Opcode::RoleUsr);
        prog.emit_str(Opcode::TxtChunk, "hello");
        prog.emit(Opcode::MsgEnd);

        let listing = prog.disasm();
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines[0], "SET_MODEL gpt-4o");
        assert_eq!(lines[1], "MSG_START");
        assert_eq!(lines[2], "  ROLE_USR");
        assert_eq!(lines[3], "  TXT_CHUNK hello");
        assert_eq!(lines[4], "MSG_END");
    }

    #[test]
    fn test_ref_directives_first() {
        let mut prog = Program::new();
        let idx = prog.add_buffer(&b"abc"[..]);
        prog.emit_ref(Opcode::ImgRef, idx);
        let listing = prog.disasm();
        assert!(listing.starts_with(".ref 0 YWJj\n\n"), "{listing}");
        assert!(listing.contains("IMG_REF ref:0"));
    }

    #[test]
    fn test_multiline_string_heredoc() {
        let mut prog = Program::new();
        prog.emit_str(Opcode::TxtChunk, "line one\nline two");
        let listing = prog.disasm();
        assert_eq!(listing, "TXT_CHUNK <<<\nline one\nline two\n>>>\n");
    }

    #[test]
    fn test_json_compacted() {
        let mut prog = Program::new();
        prog.emit_json(Opcode::DefSchema, b"{ \"type\" : \"object\" }".to_vec());
        assert_eq!(prog.disasm(), "DEF_SCHEMA {\"type\":\"object\"}\n");
    }

    #[test]
    fn test_float_and_meta_rendering() {
        let mut prog = Program::new();
        prog.emit_float(Opcode::SetTemp, 0.5);
        prog.emit_kv(Opcode::SetMeta, "media_type", "image/png");
        prog.emit_kj(Opcode::ExtData, "seed", b"42".to_vec());
        let listing = prog.disasm();
        assert_eq!(
            listing,
            "SET_TEMP 0.5000\nSET_META media_type image/png\nEXT_DATA seed 42\n"
        );
    }
}

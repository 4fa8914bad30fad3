//! The inverse of [`Program::disasm`]: parses a textual listing back into a
//! program.

use base64::Engine as _;
use memchr::memchr;

use crate::error::AilError;
use crate::json_scan::{compact_json, is_valid_json};
use crate::opcode::{ArgShape, Opcode};
use crate::program::Program;

/// Parses an assembly listing into a program.
///
/// Blank lines are ignored; lines starting with `;` are comments. Leading
/// indentation on any non-heredoc line is cosmetic. `.ref N <base64>`
/// directives populate the side-buffer table, growing it with empty buffers
/// as needed. Multiline string and JSON values use heredoc blocks:
///
/// ```text
/// TXT_CHUNK <<<
/// line one
/// line two
/// >>>
/// ```
///
/// Heredoc bodies are taken verbatim; indentation is NOT stripped, so the
/// value preserves exactly the bytes between the markers.
///
/// # Errors
///
/// Returns [`AilError::Asm`] with a 1-based line number for unknown
/// mnemonics, malformed directives, invalid numbers, unterminated heredocs,
/// and invalid JSON payloads.
pub fn asm(text: &str) -> Result<Program, AilError> {
    let mut prog = Program::new();
    let lines: Vec<&str> = text.split('\n').collect();

    let mut i = 0;
    while i < lines.len() {
        let line_no = i + 1;
        let line = lines[i].trim();
        if line.is_empty() || line.starts_with(';') {
            i += 1;
            continue;
        }

        if let Some(rest) = line.strip_prefix(".ref ") {
            parse_ref_directive(&mut prog, rest, line_no)?;
            i += 1;
            continue;
        }

        let (mnemonic, rest) = split_first(line);
        let op = Opcode::from_mnemonic(mnemonic)
            .ok_or_else(|| AilError::asm(line_no, format!("unknown opcode {mnemonic:?}")))?;

        match op.shape() {
            ArgShape::Str => {
                let val = if rest.trim() == "<<<" {
                    let (body, end) = collect_heredoc(&lines, i)?;
                    i = end;
                    body
                } else {
                    rest.to_string()
                };
                prog.emit_str(op, val);
            }
            ArgShape::Float => {
                let f: f64 = rest.trim().parse().map_err(|_| {
                    AilError::asm(line_no, format!("invalid float {:?}", rest.trim()))
                })?;
                prog.emit_float(op, f);
            }
            ArgShape::Int => {
                let n: i32 = rest.trim().parse().map_err(|_| {
                    AilError::asm(line_no, format!("invalid int {:?}", rest.trim()))
                })?;
                prog.emit_int(op, n);
            }
            ArgShape::Json => {
                let raw = if rest.trim() == "<<<" {
                    let (body, end) = collect_heredoc(&lines, i)?;
                    i = end;
                    body.trim().to_string()
                } else {
                    rest.trim().to_string()
                };
                let json = checked_json(&raw, op.mnemonic(), line_no)?;
                prog.emit_json(op, json);
            }
            ArgShape::Ref => {
                prog.emit_ref(op, parse_ref_arg(rest, line_no)?);
            }
            ArgShape::KeyStr => {
                let (key, val) = split_first(rest);
                if key.is_empty() {
                    return Err(AilError::asm(line_no, "SET_META requires key and value"));
                }
                prog.emit_kv(op, key, val);
            }
            ArgShape::KeyJson => {
                let (key, rest) = split_first(rest);
                if key.is_empty() {
                    return Err(AilError::asm(line_no, "EXT_DATA requires key and JSON"));
                }
                let raw = if rest.trim() == "<<<" {
                    let (body, end) = collect_heredoc(&lines, i)?;
                    i = end;
                    body.trim().to_string()
                } else {
                    rest.trim().to_string()
                };
                if raw.is_empty() {
                    return Err(AilError::asm(line_no, "EXT_DATA requires key and JSON"));
                }
                let json = checked_json(&raw, op.mnemonic(), line_no)?;
                prog.emit_kj(op, key, json);
            }
            ArgShape::Nullary => prog.emit(op),
        }

        i += 1;
    }

    Ok(prog)
}

/// Parses `.ref N <base64>`, growing the buffer table to fit index N.
fn parse_ref_directive(prog: &mut Program, rest: &str, line_no: usize) -> Result<(), AilError> {
    let (idx_str, data_str) = split_first(rest.trim());
    if data_str.trim().is_empty() {
        return Err(AilError::asm(line_no, ".ref requires index and base64 data"));
    }
    let idx: u32 = idx_str
        .parse()
        .map_err(|_| AilError::asm(line_no, format!(".ref invalid index {idx_str:?}")))?;
    let data = base64::engine::general_purpose::STANDARD
        .decode(data_str.trim())
        .map_err(|e| AilError::asm(line_no, format!(".ref invalid base64: {e}")))?;
    while prog.buffers.len() <= idx as usize {
        prog.buffers.push(bytes::Bytes::new());
    }
    prog.buffers[idx as usize] = bytes::Bytes::from(data);
    Ok(())
}

/// Collects heredoc lines after `start` until a line whose trimmed content is
/// `>>>`. Returns the verbatim body and the index of the `>>>` line.
fn collect_heredoc(lines: &[&str], start: usize) -> Result<(String, usize), AilError> {
    let mut parts = Vec::new();
    for (j, line) in lines.iter().enumerate().skip(start + 1) {
        if line.trim() == ">>>" {
            return Ok((parts.join("\n"), j));
        }
        parts.push(*line);
    }
    Err(AilError::asm(
        start + 1,
        "heredoc block started with <<< but never closed with >>>",
    ))
}

/// Compacts and validates a JSON payload.
fn checked_json(raw: &str, mnemonic: &str, line_no: usize) -> Result<Vec<u8>, AilError> {
    let compact = compact_json(raw.as_bytes()).unwrap_or_else(|| raw.as_bytes().to_vec());
    if !is_valid_json(&compact) {
        return Err(AilError::asm(
            line_no,
            format!("invalid JSON for {mnemonic}: {raw}"),
        ));
    }
    Ok(compact)
}

/// Parses a `ref:N` argument.
fn parse_ref_arg(rest: &str, line_no: usize) -> Result<u32, AilError> {
    let rest = rest.trim();
    let digits = rest
        .strip_prefix("ref:")
        .ok_or_else(|| AilError::asm(line_no, format!("expected ref:N, got {rest:?}")))?;
    digits
        .parse()
        .map_err(|_| AilError::asm(line_no, format!("invalid ref number {digits:?}")))
}

/// Splits on the first space. The remainder may be empty.
fn split_first(s: &str) -> (&str, &str) {
    match memchr(b' ', s.as_bytes()) {
        Some(idx) => (&s[..idx], &s[idx + 1..]),
        None => (s, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_program() {
        let text = "\
SET_MODEL gpt-4o
SET_TEMP 0.7000
SET_MAX 1024
MSG_START
  ROLE_USR
  TXT_CHUNK hello world
MSG_END
";
        let prog = asm(text).unwrap();
        assert_eq!(prog.get_model(), "gpt-4o");
        assert_eq!(prog.len(), 7);
        assert_eq!(prog.code[5].as_str(), Some("hello world"));
    }

    #[test]
    fn test_comments_and_blank_lines() {
        let text = "; a comment\n\nSET_STREAM\n   ; indented comment\n";
        let prog = asm(text).unwrap();
        assert_eq!(prog.len(), 1);
        assert!(prog.is_streaming());
    }

    #[test]
    fn test_heredoc_verbatim_body() {
        let text = "TXT_CHUNK <<<\n  indented line\nsecond\n>>>\n";
        let prog = asm(text).unwrap();
        assert_eq!(prog.code[0].as_str(), Some("  indented line\nsecond"));
    }

    #[test]
    fn test_unterminated_heredoc() {
        let err = asm("TXT_CHUNK <<<\nbody\n").unwrap_err();
        assert!(matches!(err, AilError::Asm { .. }), "{err}");
    }

    #[test]
    fn test_ref_directive_grows_buffers() {
        let text = ".ref 2 YWJj\nIMG_REF ref:2\n";
        let prog = asm(text).unwrap();
        assert_eq!(prog.buffers.len(), 3);
        assert_eq!(prog.buffer(2).unwrap(), b"abc");
        assert_eq!(prog.buffer(0).unwrap(), b"");
    }

    #[test]
    fn test_unknown_mnemonic_line_number() {
        let err = asm("SET_STREAM\nBOGUS_OP x\n").unwrap_err();
        match err {
            AilError::Asm { line, reason } => {
                assert_eq!(line, 2);
                assert!(reason.contains("BOGUS_OP"));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_invalid_json_rejected() {
        let err = asm("CALL_ARGS {not json}\n").unwrap_err();
        assert!(matches!(err, AilError::Asm { line: 1, .. }), "{err}");
    }

    #[test]
    fn test_ext_data_split() {
        let prog = asm("EXT_DATA seed 42\nSET_META media_type image/png\n").unwrap();
        assert_eq!(prog.code[0].key(), Some("seed"));
        assert_eq!(prog.code[0].as_json(), Some(&b"42"[..]));
        assert_eq!(prog.code[1].key(), Some("media_type"));
        assert_eq!(prog.code[1].as_str(), Some("image/png"));
    }

    #[test]
    fn test_ref_arg_requires_prefix() {
        let err = asm("IMG_REF 3\n").unwrap_err();
        assert!(err.to_string().contains("ref:N"), "{err}");
    }
}

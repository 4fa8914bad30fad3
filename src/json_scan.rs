//! Minimal byte-level JSON scanning for the textual format.
//!
//! The disassembler and assembler compact JSON payloads to a single line.
//! `serde_json` round-trips through `Value` would reorder object keys and
//! re-format number tokens, which breaks the binary-level round-trip
//! guarantee, so compaction here only strips inter-token whitespace and
//! leaves every other byte untouched.

use memchr::memchr2;

/// Strips whitespace outside string literals. Returns `None` when the input
/// is structurally broken in a way the scanner can detect (an unterminated
/// string); full validation is the caller's job.
pub(crate) fn compact_json(input: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        match input[i] {
            b' ' | b'\t' | b'\n' | b'\r' => i += 1,
            b'"' => {
                let end = string_end(input, i)?;
                out.extend_from_slice(&input[i..end]);
                i = end;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    Some(out)
}

/// True when `input` parses as exactly one JSON value.
pub(crate) fn is_valid_json(input: &[u8]) -> bool {
    serde_json::from_slice::<serde::de::IgnoredAny>(input).is_ok()
}

/// Index one past the closing quote of the string starting at `start`.
fn string_end(bytes: &[u8], start: usize) -> Option<usize> {
    debug_assert_eq!(bytes.get(start), Some(&b'"'));
    let mut i = start + 1;
    while i < bytes.len() {
        match memchr2(b'"', b'\\', &bytes[i..]) {
            Some(rel) => {
                let pos = i + rel;
                if bytes[pos] == b'"' {
                    return Some(pos + 1);
                }
                // Escape: skip the escaped byte.
                i = pos + 2;
            }
            None => return None,
        }
    }
    None
}

//! Span discovery, content queries, and non-destructive program surgery.
//!
//! Spans are contiguous instruction ranges delimited by START/END opcodes,
//! with indices into `Program::code` inclusive on both ends. Every mutation
//! helper returns a fresh program; the receiver is never modified.

use crate::opcode::Opcode;
use crate::program::{Instruction, Program};

/// Locates a MSG_START..MSG_END block and its role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageSpan {
    /// Index of MSG_START.
    pub start: usize,
    /// Index of MSG_END.
    pub end: usize,
    /// First role opcode inside the block, if any.
    pub role: Option<Opcode>,
}

/// Locates a DEF_START..DEF_END block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDefSpan {
    pub start: usize,
    pub end: usize,
    /// First DEF_NAME value within the span.
    pub name: String,
}

/// Locates a CALL_START..CALL_END block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallSpan {
    pub start: usize,
    pub end: usize,
    /// CALL_START string argument (the call ID).
    pub call_id: String,
    /// First CALL_NAME value within the span.
    pub name: String,
}

/// Locates a RESULT_START..RESULT_END block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResultSpan {
    pub start: usize,
    pub end: usize,
    /// RESULT_START string argument (the call ID).
    pub call_id: String,
}

impl Program {
    /// All message spans in instruction order. Blocks without a matching
    /// MSG_END are skipped.
    #[must_use]
    pub fn messages(&self) -> Vec<MessageSpan> {
        let mut spans = Vec::new();
        let mut i = 0;
        while i < self.code.len() {
            if self.code[i].op != Opcode::MsgStart {
                i += 1;
                continue;
            }
            let mut role = None;
            let mut j = i + 1;
            while j < self.code.len() {
                let op = self.code[j].op;
                if op.is_role() && role.is_none() {
                    role = Some(op);
                } else if op == Opcode::MsgEnd {
                    spans.push(MessageSpan {
                        start: i,
                        end: j,
                        role,
                    });
                    i = j;
                    break;
                }
                j += 1;
            }
            i += 1;
        }
        spans
    }

    /// All tool definition spans.
    #[must_use]
    pub fn tool_defs(&self) -> Vec<ToolDefSpan> {
        let mut spans = Vec::new();
        let mut i = 0;
        while i < self.code.len() {
            if self.code[i].op != Opcode::DefStart {
                i += 1;
                continue;
            }
            let mut name = String::new();
            let mut j = i + 1;
            while j < self.code.len() {
                match self.code[j].op {
                    Opcode::DefName if name.is_empty() => {
                        name = self.code[j].as_str().unwrap_or_default().to_string();
                    }
                    Opcode::DefEnd => {
                        spans.push(ToolDefSpan {
                            start: i,
                            end: j,
                            name,
                        });
                        i = j;
                        break;
                    }
                    _ => {}
                }
                j += 1;
            }
            i += 1;
        }
        spans
    }

    /// All tool call spans.
    #[must_use]
    pub fn tool_calls(&self) -> Vec<ToolCallSpan> {
        let mut spans = Vec::new();
        let mut i = 0;
        while i < self.code.len() {
            if self.code[i].op != Opcode::CallStart {
                i += 1;
                continue;
            }
            let call_id = self.code[i].as_str().unwrap_or_default().to_string();
            let mut name = String::new();
            let mut j = i + 1;
            while j < self.code.len() {
                match self.code[j].op {
                    Opcode::CallName if name.is_empty() => {
                        name = self.code[j].as_str().unwrap_or_default().to_string();
                    }
                    Opcode::CallEnd => {
                        spans.push(ToolCallSpan {
                            start: i,
                            end: j,
                            call_id,
                            name,
                        });
                        i = j;
                        break;
                    }
                    _ => {}
                }
                j += 1;
            }
            i += 1;
        }
        spans
    }

    /// All tool result spans.
    #[must_use]
    pub fn tool_results(&self) -> Vec<ToolResultSpan> {
        let mut spans = Vec::new();
        let mut i = 0;
        while i < self.code.len() {
            if self.code[i].op != Opcode::ResultStart {
                i += 1;
                continue;
            }
            let call_id = self.code[i].as_str().unwrap_or_default().to_string();
            for j in i + 1..self.code.len() {
                if self.code[j].op == Opcode::ResultEnd {
                    spans.push(ToolResultSpan {
                        start: i,
                        end: j,
                        call_id,
                    });
                    i = j;
                    break;
                }
            }
            i += 1;
        }
        spans
    }

    /// The concatenated TXT_CHUNK content within a message span.
    #[must_use]
    pub fn message_text(&self, span: &MessageSpan) -> String {
        let mut out = String::new();
        for inst in self
            .code
            .iter()
            .take(span.end + 1)
            .skip(span.start)
            .filter(|inst| inst.op == Opcode::TxtChunk)
        {
            out.push_str(inst.as_str().unwrap_or_default());
        }
        out
    }

    /// The concatenated text of all leading system messages, joined by
    /// `"\n\n"`. Empty when no leading system messages exist.
    #[must_use]
    pub fn system_prompt(&self) -> String {
        let mut parts = Vec::new();
        for span in self.messages() {
            if span.role != Some(Opcode::RoleSys) {
                break;
            }
            let text = self.message_text(&span);
            if !text.is_empty() {
                parts.push(text);
            }
        }
        parts.join("\n\n")
    }

    /// The spans of all consecutive system messages at the start of the
    /// message sequence.
    #[must_use]
    pub fn system_prompts(&self) -> Vec<MessageSpan> {
        self.messages()
            .into_iter()
            .take_while(|span| span.role == Some(Opcode::RoleSys))
            .collect()
    }

    /// The span of the trailing user message, if any.
    #[must_use]
    pub fn last_user_message(&self) -> Option<MessageSpan> {
        self.messages()
            .into_iter()
            .rev()
            .find(|span| span.role == Some(Opcode::RoleUsr))
    }

    /// Only the messages matching `role`.
    #[must_use]
    pub fn messages_by_role(&self, role: Opcode) -> Vec<MessageSpan> {
        self.messages()
            .into_iter()
            .filter(|span| span.role == Some(role))
            .collect()
    }

    /// The total number of messages.
    #[must_use]
    pub fn count_messages(&self) -> usize {
        self.messages().len()
    }

    /// A new program containing instructions `[start, end]` inclusive.
    /// Out-of-range bounds are clamped. Buffers are shared so refs stay valid.
    #[must_use]
    pub fn slice(&self, start: usize, end: usize) -> Program {
        let end = end.min(self.code.len().saturating_sub(1));
        let mut out = Program::new();
        if start <= end && !self.code.is_empty() {
            out.code.extend(self.code[start..=end].iter().cloned());
        }
        out.buffers = self.buffers.clone();
        out
    }

    /// A minimal program holding just one message block.
    #[must_use]
    pub fn extract_message(&self, span: &MessageSpan) -> Program {
        self.slice(span.start, span.end)
    }

    /// A new program with instructions `[start, end]` inclusive removed.
    #[must_use]
    pub fn remove_range(&self, start: usize, end: usize) -> Program {
        let mut out = Program::new();
        for (i, inst) in self.code.iter().enumerate() {
            if i >= start && i <= end {
                continue;
            }
            out.code.push(inst.clone());
        }
        out.buffers = self.buffers.clone();
        out
    }

    /// A new program with the given message spans removed. Spans should come
    /// from [`Program::messages`] and be non-overlapping.
    #[must_use]
    pub fn remove_messages(&self, spans: &[MessageSpan]) -> Program {
        let mut remove = vec![false; self.code.len()];
        for span in spans {
            for flag in remove
                .iter_mut()
                .take(span.end.min(self.code.len().saturating_sub(1)) + 1)
                .skip(span.start)
            {
                *flag = true;
            }
        }
        let mut out = Program::new();
        for (i, inst) in self.code.iter().enumerate() {
            if !remove[i] {
                out.code.push(inst.clone());
            }
        }
        out.buffers = self.buffers.clone();
        out
    }

    /// A new program where `[start, end]` inclusive is replaced with the
    /// given instructions.
    #[must_use]
    pub fn replace_range(&self, start: usize, end: usize, replacement: &[Instruction]) -> Program {
        let mut out = Program::new();
        for (i, inst) in self.code.iter().enumerate() {
            if i == start {
                out.code.extend(replacement.iter().cloned());
            }
            if i >= start && i <= end {
                continue;
            }
            out.code.push(inst.clone());
        }
        out.buffers = self.buffers.clone();
        out
    }

    /// A new program with instructions inserted immediately before `index`.
    #[must_use]
    pub fn insert_before(&self, index: usize, instructions: &[Instruction]) -> Program {
        let mut out = Program::new();
        for (i, inst) in self.code.iter().enumerate() {
            if i == index {
                out.code.extend(instructions.iter().cloned());
            }
            out.code.push(inst.clone());
        }
        out.buffers = self.buffers.clone();
        out
    }

    /// A new program with instructions inserted immediately after `index`.
    #[must_use]
    pub fn insert_after(&self, index: usize, instructions: &[Instruction]) -> Program {
        let mut out = Program::new();
        for (i, inst) in self.code.iter().enumerate() {
            out.code.push(inst.clone());
            if i == index {
                out.code.extend(instructions.iter().cloned());
            }
        }
        out.buffers = self.buffers.clone();
        out
    }

    /// A new program keeping config and tool defs but only the last `n`
    /// messages. Useful for context-window management.
    #[must_use]
    pub fn truncate_messages(&self, n: usize) -> Program {
        let msgs = self.messages();
        if n >= msgs.len() {
            return self.clone();
        }
        let dropped = &msgs[..msgs.len() - n];
        self.remove_messages(dropped)
    }

    /// A new program with a system message inserted before all existing
    /// messages (including other system messages). Stacked system prompts
    /// merge with `"\n\n"` for providers that need a single string.
    #[must_use]
    pub fn prepend_system_prompt(&self, text: &str) -> Program {
        let sys = system_message(text);
        match self.messages().first() {
            Some(first) => self.insert_before(first.start, &sys),
            None => {
                let mut out = self.clone();
                out.code.extend(sys);
                out
            }
        }
    }

    /// A new program with all leading system messages replaced by a single
    /// system message carrying `text`.
    #[must_use]
    pub fn replace_system_prompt(&self, text: &str) -> Program {
        let sys_msgs = self.system_prompts();
        match (sys_msgs.first(), sys_msgs.last()) {
            (Some(first), Some(last)) => {
                self.replace_range(first.start, last.end, &system_message(text))
            }
            _ => self.prepend_system_prompt(text),
        }
    }

    /// A new program with a user message appended at the end.
    #[must_use]
    pub fn append_user_message(&self, text: &str) -> Program {
        let mut out = self.clone();
        out.emit(Opcode::MsgStart);
        out.emit(Opcode::RoleUsr);
        out.emit_str(Opcode::TxtChunk, text);
        out.emit(Opcode::MsgEnd);
        out
    }
}

impl Program {
    /// Structural checks a well-formed program must pass: lexically paired
    /// START/END opcodes, at most one role right after MSG_START, and
    /// in-range buffer references. Emitters tolerate violations (treating a
    /// bad ref as empty data, for instance); this surfaces them.
    ///
    /// Returns one message per violation; an empty list means valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();
        let mut stack: Vec<(Opcode, usize)> = Vec::new();

        for (i, inst) in self.code.iter().enumerate() {
            if inst.op.opens_block() {
                stack.push((inst.op, i));
            } else if inst.op.closes_block() {
                match stack.pop() {
                    Some((open, _)) if closes(open) == inst.op => {}
                    Some((open, at)) => {
                        violations.push(format!(
                            "{} at {i} closes {open} opened at {at}",
                            inst.op
                        ));
                        stack.push((open, at));
                    }
                    None => violations.push(format!("{} at {i} has no open block", inst.op)),
                }
            }

            if let Some(buf_ref) = inst.as_buf_ref() {
                if buf_ref as usize >= self.buffers.len() {
                    violations.push(format!(
                        "{} at {i} references buffer {buf_ref}, only {} exist",
                        inst.op,
                        self.buffers.len()
                    ));
                }
            }
        }

        for (open, at) in stack {
            violations.push(format!("{open} at {at} is never closed"));
        }

        for span in self.messages() {
            let roles = self.code[span.start..=span.end]
                .iter()
                .filter(|inst| inst.op.is_role())
                .count();
            if roles > 1 {
                violations.push(format!(
                    "message at {} carries {roles} role opcodes",
                    span.start
                ));
            }
        }

        violations
    }
}

fn closes(open: Opcode) -> Opcode {
    match open {
        Opcode::MsgStart => Opcode::MsgEnd,
        Opcode::DefStart => Opcode::DefEnd,
        Opcode::CallStart => Opcode::CallEnd,
        Opcode::ResultStart => Opcode::ResultEnd,
        Opcode::StreamStart => Opcode::StreamEnd,
        _ => Opcode::ThinkEnd,
    }
}

fn system_message(text: &str) -> [Instruction; 4] {
    [
        Instruction::nullary(Opcode::MsgStart),
        Instruction::nullary(Opcode::RoleSys),
        Instruction::str(Opcode::TxtChunk, text),
        Instruction::nullary(Opcode::MsgEnd),
    ]
}

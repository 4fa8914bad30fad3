//! The AIL instruction set.
//!
//! Opcodes are single-byte identifiers drawn from a gap-reserved numbering
//! scheme grouped by purpose. [`Opcode::shape`] is the authoritative
//! argument-type table shared by the binary codec and the assembler.

/// A single-byte instruction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    // ── Structure (0x10-0x1F) ──
    /// Begin message block.
    MsgStart = 0x10,
    /// End message block.
    MsgEnd = 0x11,
    /// role = system
    RoleSys = 0x12,
    /// role = user
    RoleUsr = 0x13,
    /// role = assistant
    RoleAst = 0x14,
    /// role = tool / function-result
    RoleTool = 0x15,

    // ── Content (0x20-0x2F) ──
    /// arg: string — text content
    TxtChunk = 0x20,
    /// arg: ref — image buffer reference
    ImgRef = 0x21,
    /// arg: ref — audio buffer reference
    AudRef = 0x22,
    /// arg: ref — large text buffer reference
    TxtRef = 0x23,

    // ── Reasoning (0x28-0x2B) ──
    /// Begin thinking block within a message.
    ThinkStart = 0x28,
    /// arg: string — reasoning text content
    ThinkChunk = 0x29,
    /// End thinking block.
    ThinkEnd = 0x2A,
    /// arg: ref — opaque provider-signed thought blob
    ThinkRef = 0x2B,

    // ── Tool definition (0x30-0x3F) ──
    DefStart = 0x30,
    /// arg: string — function name
    DefName = 0x31,
    /// arg: string — description
    DefDesc = 0x32,
    /// arg: json — parameter schema
    DefSchema = 0x33,
    DefEnd = 0x34,

    // ── Tool call (0x40-0x4F) ──
    /// arg: string — call ID
    CallStart = 0x40,
    /// arg: string — function name
    CallName = 0x41,
    /// arg: json — arguments
    CallArgs = 0x42,
    CallEnd = 0x43,

    // ── Tool result (0x48-0x4A) ──
    /// arg: string — call ID
    ResultStart = 0x48,
    /// arg: string — result content
    ResultData = 0x49,
    ResultEnd = 0x4A,

    // ── Response metadata (0x50-0x5F) ──
    /// arg: string — response ID
    RespId = 0x50,
    /// arg: string — model that generated the response
    RespModel = 0x51,
    /// arg: string — normalized finish reason
    RespDone = 0x52,
    /// arg: json — usage statistics in canonical form
    Usage = 0x53,

    // ── Stream events (0x60-0x6F) ──
    StreamStart = 0x60,
    /// arg: string — text delta
    StreamDelta = 0x61,
    /// arg: json — tool call delta
    StreamToolDelta = 0x62,
    StreamEnd = 0x63,
    /// arg: string — thinking text delta
    StreamThinkDelta = 0x64,

    // ── Configuration (0xF0-0xFF) ──
    SetModel = 0xF0,
    SetTemp = 0xF1,
    SetTopp = 0xF2,
    SetStop = 0xF3,
    SetMax = 0xF4,
    /// No arg — presence means streaming.
    SetStream = 0xF5,
    /// arg: json — thinking/reasoning configuration
    SetThink = 0xF6,
    /// arg: json — output format configuration. Reserved: carried by the
    /// binary and textual codecs, consumed by no vendor pair yet.
    SetFmt = 0xF7,
    /// arg: key + json — provider-specific extension data
    ExtData = 0xFE,
    /// arg: key + string
    SetMeta = 0xFF,
}

/// The argument shape an opcode's instruction carries. Eight shapes, no more.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgShape {
    Nullary,
    Str,
    Float,
    Int,
    Json,
    Ref,
    KeyStr,
    KeyJson,
}

impl Opcode {
    /// Look up an opcode by its wire byte.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Opcode> {
        use Opcode::*;
        Some(match b {
            0x10 => MsgStart,
            0x11 => MsgEnd,
            0x12 => RoleSys,
            0x13 => RoleUsr,
            0x14 => RoleAst,
            0x15 => RoleTool,
            0x20 => TxtChunk,
            0x21 => ImgRef,
            0x22 => AudRef,
            0x23 => TxtRef,
            0x28 => ThinkStart,
            0x29 => ThinkChunk,
            0x2A => ThinkEnd,
            0x2B => ThinkRef,
            0x30 => DefStart,
            0x31 => DefName,
            0x32 => DefDesc,
            0x33 => DefSchema,
            0x34 => DefEnd,
            0x40 => CallStart,
            0x41 => CallName,
            0x42 => CallArgs,
            0x43 => CallEnd,
            0x48 => ResultStart,
            0x49 => ResultData,
            0x4A => ResultEnd,
            0x50 => RespId,
            0x51 => RespModel,
            0x52 => RespDone,
            0x53 => Usage,
            0x60 => StreamStart,
            0x61 => StreamDelta,
            0x62 => StreamToolDelta,
            0x63 => StreamEnd,
            0x64 => StreamThinkDelta,
            0xF0 => SetModel,
            0xF1 => SetTemp,
            0xF2 => SetTopp,
            0xF3 => SetStop,
            0xF4 => SetMax,
            0xF5 => SetStream,
            0xF6 => SetThink,
            0xF7 => SetFmt,
            0xFE => ExtData,
            0xFF => SetMeta,
            _ => return None,
        })
    }

    /// The argument shape this opcode's instructions carry.
    #[must_use]
    pub fn shape(self) -> ArgShape {
        use Opcode::*;
        match self {
            MsgStart | MsgEnd | RoleSys | RoleUsr | RoleAst | RoleTool | ThinkStart | ThinkEnd
            | DefStart | DefEnd | CallEnd | ResultEnd | SetStream | StreamStart | StreamEnd => {
                ArgShape::Nullary
            }
            TxtChunk | ThinkChunk | DefName | DefDesc | CallStart | CallName | ResultStart
            | ResultData | RespId | RespModel | RespDone | StreamDelta | StreamThinkDelta
            | SetModel | SetStop => ArgShape::Str,
            SetTemp | SetTopp => ArgShape::Float,
            SetMax => ArgShape::Int,
            DefSchema | CallArgs | Usage | StreamToolDelta | SetThink | SetFmt => ArgShape::Json,
            ImgRef | AudRef | TxtRef | ThinkRef => ArgShape::Ref,
            SetMeta => ArgShape::KeyStr,
            ExtData => ArgShape::KeyJson,
        }
    }

    /// The human-readable mnemonic used by the textual format.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            MsgStart => "MSG_START",
            MsgEnd => "MSG_END",
            RoleSys => "ROLE_SYS",
            RoleUsr => "ROLE_USR",
            RoleAst => "ROLE_AST",
            RoleTool => "ROLE_TOOL",
            TxtChunk => "TXT_CHUNK",
            ImgRef => "IMG_REF",
            AudRef => "AUD_REF",
            TxtRef => "TXT_REF",
            ThinkStart => "THINK_START",
            ThinkChunk => "THINK_CHUNK",
            ThinkEnd => "THINK_END",
            ThinkRef => "THINK_REF",
            DefStart => "DEF_START",
            DefName => "DEF_NAME",
            DefDesc => "DEF_DESC",
            DefSchema => "DEF_SCHEMA",
            DefEnd => "DEF_END",
            CallStart => "CALL_START",
            CallName => "CALL_NAME",
            CallArgs => "CALL_ARGS",
            CallEnd => "CALL_END",
            ResultStart => "RESULT_START",
            ResultData => "RESULT_DATA",
            ResultEnd => "RESULT_END",
            RespId => "RESP_ID",
            RespModel => "RESP_MODEL",
            RespDone => "RESP_DONE",
            Usage => "USAGE",
            StreamStart => "STREAM_START",
            StreamDelta => "STREAM_DELTA",
            StreamToolDelta => "STREAM_TOOL_DELTA",
            StreamEnd => "STREAM_END",
            StreamThinkDelta => "STREAM_THINK_DELTA",
            SetModel => "SET_MODEL",
            SetTemp => "SET_TEMP",
            SetTopp => "SET_TOPP",
            SetStop => "SET_STOP",
            SetMax => "SET_MAX",
            SetStream => "SET_STREAM",
            SetThink => "SET_THINK",
            SetFmt => "SET_FMT",
            ExtData => "EXT_DATA",
            SetMeta => "SET_META",
        }
    }

    /// Reverse lookup of [`Opcode::mnemonic`].
    #[must_use]
    pub fn from_mnemonic(name: &str) -> Option<Opcode> {
        use Opcode::*;
        Some(match name {
            "MSG_START" => MsgStart,
            "MSG_END" => MsgEnd,
            "ROLE_SYS" => RoleSys,
            "ROLE_USR" => RoleUsr,
            "ROLE_AST" => RoleAst,
            "ROLE_TOOL" => RoleTool,
            "TXT_CHUNK" => TxtChunk,
            "IMG_REF" => ImgRef,
            "AUD_REF" => AudRef,
            "TXT_REF" => TxtRef,
            "THINK_START" => ThinkStart,
            "THINK_CHUNK" => ThinkChunk,
            "THINK_END" => ThinkEnd,
            "THINK_REF" => ThinkRef,
            "DEF_START" => DefStart,
            "DEF_NAME" => DefName,
            "DEF_DESC" => DefDesc,
            "DEF_SCHEMA" => DefSchema,
            "DEF_END" => DefEnd,
            "CALL_START" => CallStart,
            "CALL_NAME" => CallName,
            "CALL_ARGS" => CallArgs,
            "CALL_END" => CallEnd,
            "RESULT_START" => ResultStart,
            "RESULT_DATA" => ResultData,
            "RESULT_END" => ResultEnd,
            "RESP_ID" => RespId,
            "RESP_MODEL" => RespModel,
            "RESP_DONE" => RespDone,
            "USAGE" => Usage,
            "STREAM_START" => StreamStart,
            "STREAM_DELTA" => StreamDelta,
            "STREAM_TOOL_DELTA" => StreamToolDelta,
            "STREAM_END" => StreamEnd,
            "STREAM_THINK_DELTA" => StreamThinkDelta,
            "SET_MODEL" => SetModel,
            "SET_TEMP" => SetTemp,
            "SET_TOPP" => SetTopp,
            "SET_STOP" => SetStop,
            "SET_MAX" => SetMax,
            "SET_STREAM" => SetStream,
            "SET_THINK" => SetThink,
            "SET_FMT" => SetFmt,
            "EXT_DATA" => ExtData,
            "SET_META" => SetMeta,
            _ => return None,
        })
    }

    /// True for opcodes that open an indented block in the textual format.
    #[must_use]
    pub fn opens_block(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            MsgStart | DefStart | CallStart | ResultStart | StreamStart | ThinkStart
        )
    }

    /// True for opcodes that close an indented block in the textual format.
    #[must_use]
    pub fn closes_block(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            MsgEnd | DefEnd | CallEnd | ResultEnd | StreamEnd | ThinkEnd
        )
    }

    /// True for the four role markers.
    #[must_use]
    pub fn is_role(self) -> bool {
        use Opcode::*;
        matches!(self, RoleSys | RoleUsr | RoleAst | RoleTool)
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

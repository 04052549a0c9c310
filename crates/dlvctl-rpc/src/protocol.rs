//! Delve API v2 message types.
//!
//! Field names follow the JSON tags of Delve's `service/api` package. Every
//! struct tolerates missing fields so that older and newer servers decode.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Snapshot of the debugger and target process.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DebuggerState {
    /// Target process id.
    #[serde(rename = "Pid")]
    pub pid: i64,
    /// Whether the target is currently running.
    #[serde(rename = "Running")]
    pub running: bool,
    /// The thread that caused the last stop.
    #[serde(rename = "currentThread", skip_serializing_if = "Option::is_none")]
    pub current_thread: Option<Thread>,
    /// Whether the target has exited.
    pub exited: bool,
    /// Exit status, meaningful only when `exited` is set.
    #[serde(rename = "exitStatus")]
    pub exit_status: i64,
}

/// An OS thread of the target.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Thread {
    /// Thread id.
    pub id: i64,
    /// Current source file.
    pub file: String,
    /// Current source line.
    pub line: i64,
    /// Function containing the current pc.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<Function>,
    /// Goroutine running on this thread (0 if none).
    #[serde(rename = "goroutineID")]
    pub goroutine_id: i64,
    /// Breakpoint this thread is stopped at, if any.
    #[serde(rename = "breakPoint", skip_serializing_if = "Option::is_none")]
    pub breakpoint: Option<Breakpoint>,
}

/// A function symbol.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Function {
    /// Fully qualified function name.
    pub name: String,
}

// ---------------------------------------------------------------------------
// Breakpoints
// ---------------------------------------------------------------------------

/// A breakpoint as reported by the server.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Breakpoint {
    /// Server-assigned id. Negative ids are internal breakpoints.
    pub id: i64,
    /// Name of internal breakpoints (`unrecovered-panic`, ...).
    pub name: String,
    /// Resolved source file.
    pub file: String,
    /// Resolved source line.
    pub line: i64,
    /// Function containing the breakpoint.
    #[serde(rename = "functionName")]
    pub function_name: String,
    /// Condition expression, empty when unconditional.
    #[serde(rename = "Cond")]
    pub cond: String,
    /// Total number of times the breakpoint was hit.
    #[serde(rename = "totalHitCount")]
    pub total_hit_count: u64,
    /// Whether the breakpoint is disabled.
    pub disabled: bool,
}

/// Name of the internal breakpoint hit on an unrecovered panic.
pub const UNRECOVERED_PANIC: &str = "unrecovered-panic";

/// Name of the internal breakpoint hit on a fatal runtime throw.
pub const FATAL_THROW: &str = "runtime-fatal-throw";

/// Location for a new breakpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakpointSpec {
    /// Source file.
    pub file: String,
    /// Source line (1-based).
    pub line: i64,
    /// Condition evaluated by the server at hit time.
    #[serde(rename = "Cond", skip_serializing_if = "String::is_empty")]
    pub cond: String,
}

// ---------------------------------------------------------------------------
// Variables
// ---------------------------------------------------------------------------

/// Variable is a function argument.
pub const VARIABLE_ARGUMENT: u32 = 1 << 3;

/// A value read from the target.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Variable {
    /// Variable or field name.
    pub name: String,
    /// Address of the value in target memory, 0 for nil.
    pub addr: u64,
    /// Go type name.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Bit set of `Variable*` flags.
    pub flags: u32,
    /// Go `reflect.Kind` number.
    pub kind: u32,
    /// Textual value for scalars.
    pub value: String,
    /// Length of strings, slices, arrays, maps and channels.
    pub len: i64,
    /// Capacity of slices and channels.
    pub cap: i64,
    /// Loaded children: struct fields, elements, map key/value pairs, or the
    /// pointee of a pointer.
    pub children: Vec<Variable>,
    /// Reason the value could not be read.
    pub unreadable: String,
}

/// Go `reflect.Kind` values relevant to formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Invalid,
    Bool,
    Int,
    Uint,
    Float,
    Complex,
    Array,
    Chan,
    Func,
    Interface,
    Map,
    Pointer,
    Slice,
    String,
    Struct,
    UnsafePointer,
}

impl Kind {
    /// Map a `reflect.Kind` number.
    pub fn from_reflect(kind: u32) -> Self {
        match kind {
            1 => Kind::Bool,
            2..=6 => Kind::Int,
            7..=12 => Kind::Uint,
            13 | 14 => Kind::Float,
            15 | 16 => Kind::Complex,
            17 => Kind::Array,
            18 => Kind::Chan,
            19 => Kind::Func,
            20 => Kind::Interface,
            21 => Kind::Map,
            22 => Kind::Pointer,
            23 => Kind::Slice,
            24 => Kind::String,
            25 => Kind::Struct,
            26 => Kind::UnsafePointer,
            _ => Kind::Invalid,
        }
    }

    /// Lower-case kind name.
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Invalid => "invalid",
            Kind::Bool => "bool",
            Kind::Int => "int",
            Kind::Uint => "uint",
            Kind::Float => "float",
            Kind::Complex => "complex",
            Kind::Array => "array",
            Kind::Chan => "chan",
            Kind::Func => "func",
            Kind::Interface => "interface",
            Kind::Map => "map",
            Kind::Pointer => "pointer",
            Kind::Slice => "slice",
            Kind::String => "string",
            Kind::Struct => "struct",
            Kind::UnsafePointer => "unsafe.Pointer",
        }
    }

    /// Whether values of this kind carry children.
    pub fn is_composite(self) -> bool {
        matches!(
            self,
            Kind::Array | Kind::Map | Kind::Slice | Kind::Struct | Kind::Interface
        )
    }
}

impl Variable {
    /// The decoded kind.
    pub fn kind(&self) -> Kind {
        Kind::from_reflect(self.kind)
    }

    /// Whether the variable is a function argument.
    pub fn is_argument(&self) -> bool {
        self.flags & VARIABLE_ARGUMENT != 0
    }
}

/// Limits on how much of a value the server loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoadConfig {
    /// Dereference pointers while loading.
    pub follow_pointers: bool,
    /// Depth of nested composites to load.
    pub max_variable_recurse: i64,
    /// Longest string to read.
    pub max_string_len: i64,
    /// Most elements to read from arrays, slices and maps.
    pub max_array_values: i64,
    /// Most struct fields to read (-1 for all).
    pub max_struct_fields: i64,
}

impl LoadConfig {
    /// Load configuration for an expansion `depth` levels deep.
    pub fn with_depth(depth: u32) -> Self {
        Self {
            follow_pointers: true,
            max_variable_recurse: i64::from(depth),
            max_string_len: 256,
            max_array_values: 64,
            max_struct_fields: -1,
        }
    }
}

/// Goroutine and frame an expression is evaluated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EvalScope {
    /// Goroutine id, -1 for the current one.
    #[serde(rename = "GoroutineID")]
    pub goroutine_id: i64,
    /// Frame index, 0 for the innermost.
    pub frame: i64,
}

impl EvalScope {
    /// Innermost frame of the given goroutine.
    pub fn top(goroutine_id: i64) -> Self {
        Self {
            goroutine_id,
            frame: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Execution commands accepted by `RPCServer.Command`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebuggerCommand {
    Continue,
    Step,
    Next,
    StepOut,
    Halt,
}

impl DebuggerCommand {
    /// Wire name of the command.
    pub fn as_str(self) -> &'static str {
        match self {
            DebuggerCommand::Continue => "continue",
            DebuggerCommand::Step => "step",
            DebuggerCommand::Next => "next",
            DebuggerCommand::StepOut => "stepOut",
            DebuggerCommand::Halt => "halt",
        }
    }
}

//! The tagged value union crossing the script boundary.
//!
//! [`ScriptValue`] is the only value representation the bridge traffics in.
//! Primitives carry their payload inline; objects and functions are carried
//! as generational handles into the runtime's heap. Handles are inert `Copy`
//! identifiers: they can ride inside queued closures across threads, but
//! dereferencing one requires the [`Runtime`](crate::runtime::Runtime),
//! which never leaves its owning thread.

use std::fmt;

/// A value as seen by script code.
///
/// Note: `PartialEq` on `Number` follows IEEE 754, so `NaN != NaN`. That
/// matches script semantics and is relied on by the marshaling tests.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    /// The absent value.
    Undefined,
    /// Boolean value.
    Bool(bool),
    /// Numeric value. All script numbers are 64-bit floats.
    Number(f64),
    /// String value (owned, any valid UTF-8 including embedded NULs).
    String(String),
    /// Handle to a heap-allocated object.
    Object(ObjectHandle),
    /// Handle to a callable function object.
    Function(FunctionHandle),
}

impl ScriptValue {
    /// Get a human-readable name for this value's type.
    ///
    /// Used to build `TypeMismatch` diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            ScriptValue::Undefined => "undefined",
            ScriptValue::Bool(_) => "bool",
            ScriptValue::Number(_) => "number",
            ScriptValue::String(_) => "string",
            ScriptValue::Object(_) => "object",
            ScriptValue::Function(_) => "function",
        }
    }

    /// Check if this value is undefined.
    pub fn is_undefined(&self) -> bool {
        matches!(self, ScriptValue::Undefined)
    }
}

impl From<bool> for ScriptValue {
    fn from(v: bool) -> Self {
        ScriptValue::Bool(v)
    }
}

impl From<f64> for ScriptValue {
    fn from(v: f64) -> Self {
        ScriptValue::Number(v)
    }
}

impl From<String> for ScriptValue {
    fn from(v: String) -> Self {
        ScriptValue::String(v)
    }
}

impl From<&str> for ScriptValue {
    fn from(v: &str) -> Self {
        ScriptValue::String(v.to_string())
    }
}

/// Handle to a heap-allocated script object.
///
/// The generational index detects use-after-free: a freed slot bumps its
/// generation, invalidating every outstanding handle to it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    /// Index into the runtime's object heap.
    pub index: u32,
    /// Generation for use-after-free detection.
    pub generation: u32,
}

impl ObjectHandle {
    /// Create a new object handle.
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectHandle({}v{})", self.index, self.generation)
    }
}

/// Handle to a callable function object.
///
/// Distinct from [`ObjectHandle`] so a function can never be mistaken for
/// a plain object at the type level.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionHandle {
    /// Index into the runtime's function heap.
    pub index: u32,
    /// Generation for use-after-free detection.
    pub generation: u32,
}

impl FunctionHandle {
    /// Create a new function handle.
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl fmt::Debug for FunctionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FunctionHandle({}v{})", self.index, self.generation)
    }
}

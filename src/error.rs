//! Error types for the bridge.
//!
//! Two layers are distinguished here:
//!
//! - [`BridgeError`] is the host-side error type. It covers everything that
//!   can go wrong on either side of the boundary: marshaling failures,
//!   arity violations, native operation failures, and install-time misuse.
//! - [`ScriptException`] is the script-visible projection of a failure. Raw
//!   native error types never cross the boundary; they are flattened into a
//!   stable numeric [`ErrorCode`] plus a message string.
//!
//! Host-only variants (install-time misuse such as [`BridgeError::AlreadyInstalled`])
//! still map to a code so the projection is total, but script code is never
//! expected to observe them.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;

pub type BridgeResult<T> = anyhow::Result<T, BridgeError>;

// ============================================================================
// Bridge Errors
// ============================================================================

/// The unified error type for all bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A value did not have the type a conversion or call required.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The expected type.
        expected: &'static str,
        /// The actual type.
        actual: &'static str,
    },

    /// A binding was invoked with fewer arguments than it declares.
    #[error("{name} expects {required} argument(s), got {supplied}")]
    ArityMismatch {
        /// The binding name.
        name: String,
        /// Declared argument count.
        required: usize,
        /// Arguments actually supplied.
        supplied: usize,
    },

    /// A native operation failed after marshaling succeeded.
    #[error("native call failed: {0}")]
    Native(#[from] anyhow::Error),

    /// A native function panicked while running on the runtime thread.
    #[error("native function panicked: {message}")]
    NativePanic {
        /// The panic payload, rendered as text.
        message: String,
    },

    /// The runtime side of the dispatcher is gone.
    #[error("runtime unavailable: dispatch queue is closed")]
    RuntimeUnavailable,

    /// A handle was used after its object was freed.
    #[error("stale handle: slot {index} has been freed")]
    StaleHandle {
        /// Heap slot index of the freed object.
        index: u32,
    },

    /// A non-function value was invoked.
    #[error("value of type {actual} is not callable")]
    NotCallable {
        /// The type that was invoked.
        actual: &'static str,
    },

    /// Assignment to a property installed as read-only.
    #[error("cannot assign to read-only property '{name}'")]
    ReadOnlyProperty {
        /// The property name.
        name: String,
    },

    /// A second install was attempted on the same runtime.
    #[error("bridge bindings already installed in this runtime")]
    AlreadyInstalled,

    /// Two bindings with the same name were registered into one installer.
    #[error("duplicate binding: '{name}' is already registered")]
    DuplicateBinding {
        /// The duplicated binding name.
        name: String,
    },
}

impl BridgeError {
    /// The numeric code a script caller observes for this error.
    ///
    /// Every variant maps to a code so the projection into
    /// [`ScriptException`] is total. Handle misuse (stale handles,
    /// calling non-functions, read-only assignment) surfaces as
    /// [`ErrorCode::TypeMismatch`]; host-only install errors surface as
    /// [`ErrorCode::NativeFailure`] in the unlikely event they reach script.
    pub fn code(&self) -> ErrorCode {
        match self {
            BridgeError::TypeMismatch { .. } => ErrorCode::TypeMismatch,
            BridgeError::ArityMismatch { .. } => ErrorCode::ArityMismatch,
            BridgeError::Native(_) => ErrorCode::NativeFailure,
            BridgeError::NativePanic { .. } => ErrorCode::NativeFailure,
            BridgeError::RuntimeUnavailable => ErrorCode::RuntimeUnavailable,
            BridgeError::StaleHandle { .. } => ErrorCode::TypeMismatch,
            BridgeError::NotCallable { .. } => ErrorCode::TypeMismatch,
            BridgeError::ReadOnlyProperty { .. } => ErrorCode::TypeMismatch,
            BridgeError::AlreadyInstalled => ErrorCode::NativeFailure,
            BridgeError::DuplicateBinding { .. } => ErrorCode::NativeFailure,
        }
    }
}

// ============================================================================
// Script-Visible Codes
// ============================================================================

/// Stable numeric error codes observable from script.
///
/// The discriminants are part of the wire contract between native and
/// script code and must not be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum ErrorCode {
    /// A value had the wrong type for a conversion or call.
    TypeMismatch = 1,
    /// A binding was called with too few arguments.
    ArityMismatch = 2,
    /// The native operation itself failed (or panicked).
    NativeFailure = 3,
    /// The runtime was torn down before the operation could run.
    RuntimeUnavailable = 4,
}

impl ErrorCode {
    /// Returns a human-readable name for this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::TypeMismatch => "type mismatch",
            ErrorCode::ArityMismatch => "arity mismatch",
            ErrorCode::NativeFailure => "native failure",
            ErrorCode::RuntimeUnavailable => "runtime unavailable",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Script Exceptions
// ============================================================================

/// The script-visible record of a failed operation.
///
/// This is what a script caller can catch: a numeric code and a message.
/// Native error chains are flattened into the message at conversion time,
/// so no host types leak across the boundary.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ScriptException {
    /// The stable numeric code.
    pub code: ErrorCode,
    /// The rendered error message.
    pub message: String,
}

impl ScriptException {
    /// Create an exception from a code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<BridgeError> for ScriptException {
    fn from(err: BridgeError) -> Self {
        let code = err.code();
        // The alternate format renders the full anyhow chain, which the
        // Display impl alone would truncate to the outermost message.
        let message = match &err {
            BridgeError::Native(e) => format!("native call failed: {e:#}"),
            _ => err.to_string(),
        };
        Self { code, message }
    }
}

//! A typed bridge between native Rust and an embedded script runtime.
//!
//! Script code sees native capabilities as plain functions on a single
//! namespace object (`host` by default). Native code sees script values as
//! [`ScriptValue`]s and converts them at the boundary with the strict
//! [`marshal`] functions. Work that finishes on some other thread re-enters
//! the runtime through the dispatcher, never directly.
//!
//! Three load-bearing pieces:
//!
//! - **Marshaling** ([`marshal`]): conversion without coercion. A string
//!   of digits is not a number; a stale handle is reported as stale, not as
//!   the wrong type.
//! - **Bindings** ([`Binding`], [`Installer`]): named native functions
//!   with a declared arity, built through a factory and installed as
//!   read-only properties of a read-only namespace global. The built-in
//!   catalog covers clock reads, RFC 3339 formatting/parsing, and timers.
//! - **Dispatch** ([`CallDispatcher`], [`DispatchHandle`]): an MPSC
//!   channel back onto the runtime thread. FIFO per handle, exactly-once
//!   execution, and a silent no-op after teardown.
//!
//! The [`Runtime`] itself is deliberately small: a global table, a
//! generational heap of objects and functions, and deferred placeholders
//! for async results. It is `!Send`; the dispatcher is the only cross-
//! thread doorway.
//!
//! # Quick start
//!
//! ```
//! use hostbridge::{Binding, CallDispatcher, Installer, Runtime, ScriptValue, marshal};
//!
//! let (handle, queue) = CallDispatcher::new();
//! let mut rt = Runtime::new();
//!
//! let mut installer = Installer::new(handle);
//! installer.register(Binding::new("greet", 1, |rt, args| {
//!     let name = marshal::to_text(rt, &args[0])?;
//!     Ok(ScriptValue::from(format!("hello, {name}")))
//! }))?;
//! installer.install(&mut rt)?;
//!
//! let reply = rt.call("host.greet", &[ScriptValue::from("bridge")])?;
//! assert_eq!(reply, ScriptValue::from("hello, bridge"));
//!
//! // Completions scheduled from worker threads run here, in order.
//! queue.run_pending(&mut rt);
//! # Ok::<(), hostbridge::BridgeError>(())
//! ```

pub mod binding;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod installer;
pub mod marshal;
pub mod runtime;
pub mod script_value;

pub use binding::{Binding, BindingId, HostFn};
pub use config::{BridgeConfig, ClockSource};
pub use dispatch::{CallDispatcher, DispatchHandle, PendingInvocation};
pub use error::{BridgeError, BridgeResult, ErrorCode, ScriptException};
pub use installer::Installer;
pub use runtime::{DeferredState, PropertyFlags, Runtime, ScriptFn};
pub use script_value::{FunctionHandle, ObjectHandle, ScriptValue};

/// Common imports for embedders.
pub mod prelude {
    pub use crate::binding::{Binding, BindingId};
    pub use crate::config::BridgeConfig;
    pub use crate::dispatch::{CallDispatcher, DispatchHandle, PendingInvocation};
    pub use crate::error::{BridgeError, BridgeResult, ErrorCode, ScriptException};
    pub use crate::installer::Installer;
    pub use crate::marshal;
    pub use crate::runtime::{DeferredState, PropertyFlags, Runtime};
    pub use crate::script_value::{FunctionHandle, ObjectHandle, ScriptValue};
}

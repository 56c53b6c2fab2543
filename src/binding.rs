//! Host function bindings.
//!
//! A [`Binding`] couples a script-visible name with a required argument
//! count and the native closure that does the work. Construction goes
//! through the [`Binding::new`] factory so every binding picks up the same
//! arity gate and identity hash; there is no registration macro to expand
//! and nothing to generate at compile time.
//!
//! The closure receives `&mut Runtime` plus exactly `arity` arguments.
//! Surplus arguments are dropped before the closure runs; missing ones are
//! an [`ArityMismatch`](crate::error::BridgeError::ArityMismatch) before the
//! closure runs.

use std::fmt;
use std::sync::Arc;

use xxhash_rust::xxh64::xxh64;

use crate::error::{BridgeError, BridgeResult};
use crate::runtime::Runtime;
use crate::script_value::ScriptValue;

/// Native closure signature shared by every binding.
///
/// `Send + Sync` so bindings can be assembled on one thread and installed
/// on the runtime's; the closure still only ever *runs* on the runtime
/// thread, which is what `&mut Runtime` enforces.
pub type HostFn =
    Arc<dyn Fn(&mut Runtime, &[ScriptValue]) -> BridgeResult<ScriptValue> + Send + Sync>;

/// Domain separator so a binding id never collides with hashes of the same
/// name computed for other purposes.
const BINDING_DOMAIN: u64 = 0x62b0_a9e3_5d94_c471;

/// Stable identity of a binding, derived from its name.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(pub u64);

impl BindingId {
    /// Hash a binding name into its id. Deterministic across runs and
    /// platforms.
    pub fn from_name(name: &str) -> Self {
        Self(xxh64(name.as_bytes(), 0) ^ BINDING_DOMAIN)
    }
}

impl fmt::Debug for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BindingId({:#018x})", self.0)
    }
}

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// A named native function ready to be installed into a runtime.
#[derive(Clone)]
pub struct Binding {
    name: String,
    arity: usize,
    id: BindingId,
    host: HostFn,
}

impl Binding {
    /// Build a binding from a name, a required argument count, and the
    /// native closure.
    ///
    /// # Examples
    ///
    /// ```
    /// use hostbridge::{Binding, Runtime, ScriptValue, marshal};
    ///
    /// let upper = Binding::new("upper", 1, |rt, args| {
    ///     let text = marshal::to_text(rt, &args[0])?;
    ///     Ok(ScriptValue::from(text.to_uppercase()))
    /// });
    /// assert_eq!(upper.name(), "upper");
    /// assert_eq!(upper.arity(), 1);
    ///
    /// let mut rt = Runtime::new();
    /// let shout = upper.invoke(&mut rt, &[ScriptValue::from("hey")]).unwrap();
    /// assert_eq!(shout, ScriptValue::from("HEY"));
    /// ```
    pub fn new<N, F>(name: N, arity: usize, host: F) -> Self
    where
        N: Into<String>,
        F: Fn(&mut Runtime, &[ScriptValue]) -> BridgeResult<ScriptValue> + Send + Sync + 'static,
    {
        let name = name.into();
        let id = BindingId::from_name(&name);
        Self {
            name,
            arity,
            id,
            host: Arc::new(host),
        }
    }

    /// Script-visible name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of arguments the closure requires.
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Stable identity derived from the name.
    pub fn id(&self) -> BindingId {
        self.id
    }

    /// Run the binding against `args`, enforcing arity first.
    ///
    /// Fewer arguments than `arity` fail without running the closure;
    /// surplus arguments are cut off so the closure always sees exactly
    /// `arity` values.
    pub fn invoke(&self, rt: &mut Runtime, args: &[ScriptValue]) -> BridgeResult<ScriptValue> {
        if args.len() < self.arity {
            return Err(BridgeError::ArityMismatch {
                name: self.name.clone(),
                required: self.arity,
                supplied: args.len(),
            });
        }
        (self.host)(rt, &args[..self.arity])
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

//! The owning-thread model of the embedded script runtime.
//!
//! [`Runtime`] is the bridge's concrete contract with the script engine: a
//! global namespace, a generational heap for objects and function objects,
//! deferred placeholders for in-flight asynchronous work, and a list of
//! uncaught exceptions.
//!
//! # Thread ownership
//!
//! A `Runtime` belongs to exactly one thread. The struct is `!Send`, so
//! handing it to another thread is a compile error rather than a data race.
//! Work produced on other threads re-enters through the
//! [`dispatch`](crate::dispatch) queue, which runs invocations here,
//! serially, with `&mut Runtime`.
//!
//! Handles ([`ObjectHandle`], [`FunctionHandle`]) are plain generational
//! indices. They may travel anywhere, but every dereference goes through a
//! `Runtime` method, which checks the generation and reports stale use
//! instead of touching freed state.

use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::sync::Arc;

use bitflags::bitflags;
use rustc_hash::FxHashMap;

use crate::error::{BridgeError, BridgeResult, ScriptException};
use crate::script_value::{FunctionHandle, ObjectHandle, ScriptValue};

/// Type-erased function body stored in the runtime.
///
/// Bodies run on the runtime thread only, so `Send`/`Sync` bounds are not
/// required here; host bindings (which are `Send + Sync`) coerce into this.
pub type ScriptFn = Arc<dyn Fn(&mut Runtime, &[ScriptValue]) -> BridgeResult<ScriptValue>>;

bitflags! {
    /// Attributes of a global or object property.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PropertyFlags: u8 {
        /// Assignment to this property is rejected.
        const READ_ONLY = 1;
    }
}

/// Settlement state of a deferred placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum DeferredState {
    /// The native work has not completed yet.
    Pending,
    /// The work completed with a value.
    Resolved(ScriptValue),
    /// The work failed with a script-visible exception.
    Rejected(ScriptException),
}

// ============================================================================
// Heap
// ============================================================================

/// Generational slot storage.
///
/// Freed slots are reused with a bumped generation, so outstanding handles
/// to the old occupant are detected instead of reading the new one.
struct Heap<T> {
    slots: Vec<HeapSlot<T>>,
    free_list: Vec<u32>,
}

struct HeapSlot<T> {
    generation: u32,
    value: Option<T>,
}

impl<T> Heap<T> {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
        }
    }

    fn insert(&mut self, value: T) -> (u32, u32) {
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            (index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(HeapSlot {
                generation: 0,
                value: Some(value),
            });
            (index, 0)
        }
    }

    fn get(&self, index: u32, generation: u32) -> Option<&T> {
        let slot = self.slots.get(index as usize)?;
        if slot.generation != generation {
            return None;
        }
        slot.value.as_ref()
    }

    fn get_mut(&mut self, index: u32, generation: u32) -> Option<&mut T> {
        let slot = self.slots.get_mut(index as usize)?;
        if slot.generation != generation {
            return None;
        }
        slot.value.as_mut()
    }

    fn free(&mut self, index: u32, generation: u32) -> bool {
        if let Some(slot) = self.slots.get_mut(index as usize)
            && slot.generation == generation
            && slot.value.is_some()
        {
            slot.value = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free_list.push(index);
            return true;
        }
        false
    }

    fn is_live(&self, index: u32, generation: u32) -> bool {
        if let Some(slot) = self.slots.get(index as usize)
            && slot.generation == generation
        {
            return slot.value.is_some();
        }
        false
    }

    fn live_count(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }
}

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct PropertyCell {
    value: ScriptValue,
    flags: PropertyFlags,
}

struct ObjectRecord {
    properties: FxHashMap<String, PropertyCell>,
    /// Present when this object is a deferred placeholder.
    deferred: Option<DeferredRecord>,
}

struct DeferredRecord {
    state: DeferredState,
    on_resolved: Vec<FunctionHandle>,
    on_rejected: Vec<FunctionHandle>,
}

struct FunctionRecord {
    name: Option<String>,
    body: ScriptFn,
}

// ============================================================================
// Runtime
// ============================================================================

/// The script runtime as the bridge sees it.
///
/// See the [module docs](self) for the ownership model.
pub struct Runtime {
    globals: FxHashMap<String, PropertyCell>,
    objects: Heap<ObjectRecord>,
    functions: Heap<FunctionRecord>,
    uncaught: Vec<ScriptException>,
    // Raw pointer marker makes Runtime !Send and !Sync.
    _owner: PhantomData<*const ()>,
}

impl Runtime {
    /// Create an empty runtime owned by the calling thread.
    pub fn new() -> Self {
        Self {
            globals: FxHashMap::default(),
            objects: Heap::new(),
            functions: Heap::new(),
            uncaught: Vec::new(),
            _owner: PhantomData,
        }
    }

    // ===== Globals =====

    /// Look up a global by name.
    pub fn global(&self, name: &str) -> Option<&ScriptValue> {
        self.globals.get(name).map(|cell| &cell.value)
    }

    /// Assign a global, respecting the read-only attribute.
    ///
    /// Creating a new global leaves it writable; use
    /// [`define_global`](Self::define_global) to set attributes.
    pub fn set_global(&mut self, name: &str, value: ScriptValue) -> BridgeResult<()> {
        if let Some(cell) = self.globals.get_mut(name) {
            if cell.flags.contains(PropertyFlags::READ_ONLY) {
                return Err(BridgeError::ReadOnlyProperty {
                    name: name.to_string(),
                });
            }
            cell.value = value;
            return Ok(());
        }
        self.globals.insert(
            name.to_string(),
            PropertyCell {
                value,
                flags: PropertyFlags::empty(),
            },
        );
        Ok(())
    }

    /// Define a global with explicit attributes.
    ///
    /// Redefining an existing read-only global is rejected.
    pub fn define_global(
        &mut self,
        name: &str,
        value: ScriptValue,
        flags: PropertyFlags,
    ) -> BridgeResult<()> {
        if let Some(cell) = self.globals.get(name)
            && cell.flags.contains(PropertyFlags::READ_ONLY)
        {
            return Err(BridgeError::ReadOnlyProperty {
                name: name.to_string(),
            });
        }
        self.globals
            .insert(name.to_string(), PropertyCell { value, flags });
        Ok(())
    }

    // ===== Objects =====

    /// Allocate an empty object.
    pub fn create_object(&mut self) -> ObjectHandle {
        let (index, generation) = self.objects.insert(ObjectRecord {
            properties: FxHashMap::default(),
            deferred: None,
        });
        ObjectHandle::new(index, generation)
    }

    /// Read a property. Missing properties read as `Undefined`.
    pub fn get_property(&self, handle: ObjectHandle, name: &str) -> BridgeResult<ScriptValue> {
        let record = self
            .objects
            .get(handle.index, handle.generation)
            .ok_or(BridgeError::StaleHandle {
                index: handle.index,
            })?;
        Ok(record
            .properties
            .get(name)
            .map(|cell| cell.value.clone())
            .unwrap_or(ScriptValue::Undefined))
    }

    /// Assign a property, respecting the read-only attribute.
    pub fn set_property(
        &mut self,
        handle: ObjectHandle,
        name: &str,
        value: ScriptValue,
    ) -> BridgeResult<()> {
        let record = self
            .objects
            .get_mut(handle.index, handle.generation)
            .ok_or(BridgeError::StaleHandle {
                index: handle.index,
            })?;
        if let Some(cell) = record.properties.get_mut(name) {
            if cell.flags.contains(PropertyFlags::READ_ONLY) {
                return Err(BridgeError::ReadOnlyProperty {
                    name: name.to_string(),
                });
            }
            cell.value = value;
            return Ok(());
        }
        record.properties.insert(
            name.to_string(),
            PropertyCell {
                value,
                flags: PropertyFlags::empty(),
            },
        );
        Ok(())
    }

    /// Define a property with explicit attributes.
    pub fn define_property(
        &mut self,
        handle: ObjectHandle,
        name: &str,
        value: ScriptValue,
        flags: PropertyFlags,
    ) -> BridgeResult<()> {
        let record = self
            .objects
            .get_mut(handle.index, handle.generation)
            .ok_or(BridgeError::StaleHandle {
                index: handle.index,
            })?;
        if let Some(cell) = record.properties.get(name)
            && cell.flags.contains(PropertyFlags::READ_ONLY)
        {
            return Err(BridgeError::ReadOnlyProperty {
                name: name.to_string(),
            });
        }
        record
            .properties
            .insert(name.to_string(), PropertyCell { value, flags });
        Ok(())
    }

    /// Free an object immediately. Outstanding handles become stale.
    pub fn free_object(&mut self, handle: ObjectHandle) -> bool {
        self.objects.free(handle.index, handle.generation)
    }

    /// Check whether an object handle still refers to a live object.
    pub fn object_is_live(&self, handle: ObjectHandle) -> bool {
        self.objects.is_live(handle.index, handle.generation)
    }

    // ===== Functions =====

    /// Allocate an anonymous function object.
    pub fn create_function<F>(&mut self, body: F) -> FunctionHandle
    where
        F: Fn(&mut Runtime, &[ScriptValue]) -> BridgeResult<ScriptValue> + 'static,
    {
        self.insert_function(None, Arc::new(body))
    }

    /// Allocate a named function object. The name shows up in diagnostics.
    pub fn create_named_function<F>(&mut self, name: impl Into<String>, body: F) -> FunctionHandle
    where
        F: Fn(&mut Runtime, &[ScriptValue]) -> BridgeResult<ScriptValue> + 'static,
    {
        self.insert_function(Some(name.into()), Arc::new(body))
    }

    fn insert_function(&mut self, name: Option<String>, body: ScriptFn) -> FunctionHandle {
        let (index, generation) = self.functions.insert(FunctionRecord { name, body });
        FunctionHandle::new(index, generation)
    }

    /// Invoke a function object with the given arguments.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn call_function(
        &mut self,
        handle: FunctionHandle,
        args: &[ScriptValue],
    ) -> BridgeResult<ScriptValue> {
        // Clone the body out so the heap borrow ends before re-entering self.
        let body = self
            .functions
            .get(handle.index, handle.generation)
            .map(|record| Arc::clone(&record.body))
            .ok_or(BridgeError::StaleHandle {
                index: handle.index,
            })?;
        body(self, args)
    }

    /// Free a function object. Outstanding handles become stale.
    pub fn free_function(&mut self, handle: FunctionHandle) -> bool {
        self.functions.free(handle.index, handle.generation)
    }

    /// Check whether a function handle still refers to a live function.
    pub fn function_is_live(&self, handle: FunctionHandle) -> bool {
        self.functions.is_live(handle.index, handle.generation)
    }

    /// The diagnostic name of a function object, if it has one.
    pub fn function_name(&self, handle: FunctionHandle) -> Option<&str> {
        self.functions
            .get(handle.index, handle.generation)
            .and_then(|record| record.name.as_deref())
    }

    /// Resolve a dotted path through globals and object properties and
    /// invoke the function found there.
    ///
    /// `call("host.now", &[])` reads the `host` global, reads its `now`
    /// property, and calls it. Missing names read as `Undefined`; stepping
    /// through a non-object fails as a type mismatch and invoking a
    /// non-function as [`BridgeError::NotCallable`], the same way a script
    /// caller would see it.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn call(&mut self, path: &str, args: &[ScriptValue]) -> BridgeResult<ScriptValue> {
        let mut segments = path.split('.');
        let first = segments.next().unwrap_or_default();
        let mut current = self
            .global(first)
            .cloned()
            .unwrap_or(ScriptValue::Undefined);
        for segment in segments {
            match current {
                ScriptValue::Object(handle) => {
                    current = self.get_property(handle, segment)?;
                }
                other => {
                    return Err(BridgeError::TypeMismatch {
                        expected: "object",
                        actual: other.type_name(),
                    });
                }
            }
        }
        match current {
            ScriptValue::Function(handle) => self.call_function(handle, args),
            other => Err(BridgeError::NotCallable {
                actual: other.type_name(),
            }),
        }
    }

    // ===== Deferred placeholders =====

    /// Allocate a deferred placeholder in the pending state.
    ///
    /// The handle is an ordinary object handle, so the placeholder can be
    /// returned to script as a value and carry properties like any object.
    pub fn create_deferred(&mut self) -> ObjectHandle {
        let (index, generation) = self.objects.insert(ObjectRecord {
            properties: FxHashMap::default(),
            deferred: Some(DeferredRecord {
                state: DeferredState::Pending,
                on_resolved: Vec::new(),
                on_rejected: Vec::new(),
            }),
        });
        ObjectHandle::new(index, generation)
    }

    /// The current settlement state of a placeholder.
    pub fn deferred_state(&self, handle: ObjectHandle) -> BridgeResult<DeferredState> {
        let record = self
            .objects
            .get(handle.index, handle.generation)
            .ok_or(BridgeError::StaleHandle {
                index: handle.index,
            })?;
        match &record.deferred {
            Some(def) => Ok(def.state.clone()),
            None => Err(BridgeError::TypeMismatch {
                expected: "deferred",
                actual: "object",
            }),
        }
    }

    /// Resolve a pending placeholder with a value.
    ///
    /// Returns `Ok(false)` without side effects if the placeholder has
    /// already settled; settlement happens at most once.
    pub fn resolve_deferred(
        &mut self,
        handle: ObjectHandle,
        value: ScriptValue,
    ) -> BridgeResult<bool> {
        let reactions = {
            let def = self.deferred_mut(handle)?;
            if !matches!(def.state, DeferredState::Pending) {
                return Ok(false);
            }
            def.state = DeferredState::Resolved(value.clone());
            def.on_rejected.clear();
            mem::take(&mut def.on_resolved)
        };
        for reaction in reactions {
            self.run_reaction(reaction, &[value.clone()]);
        }
        Ok(true)
    }

    /// Reject a pending placeholder with an exception.
    ///
    /// Returns `Ok(false)` without side effects if the placeholder has
    /// already settled. Rejection reactions receive a script error object
    /// with `code` and `message` properties.
    pub fn reject_deferred(
        &mut self,
        handle: ObjectHandle,
        exception: ScriptException,
    ) -> BridgeResult<bool> {
        let reactions = {
            let def = self.deferred_mut(handle)?;
            if !matches!(def.state, DeferredState::Pending) {
                return Ok(false);
            }
            def.state = DeferredState::Rejected(exception.clone());
            def.on_resolved.clear();
            mem::take(&mut def.on_rejected)
        };
        if !reactions.is_empty() {
            let error = self.exception_object(&exception);
            for reaction in reactions {
                self.run_reaction(reaction, &[ScriptValue::Object(error)]);
            }
        }
        Ok(true)
    }

    /// Register a callback to run when the placeholder resolves.
    ///
    /// If it already resolved, the callback runs immediately with the
    /// settled value. If it was rejected, the callback is discarded.
    pub fn on_resolved(
        &mut self,
        handle: ObjectHandle,
        reaction: FunctionHandle,
    ) -> BridgeResult<()> {
        let settled = {
            let def = self.deferred_mut(handle)?;
            match &def.state {
                DeferredState::Pending => {
                    def.on_resolved.push(reaction);
                    None
                }
                DeferredState::Resolved(value) => Some(value.clone()),
                DeferredState::Rejected(_) => return Ok(()),
            }
        };
        if let Some(value) = settled {
            self.run_reaction(reaction, &[value]);
        }
        Ok(())
    }

    /// Register a callback to run when the placeholder is rejected.
    ///
    /// If it was already rejected, the callback runs immediately with the
    /// error object. If it resolved, the callback is discarded.
    pub fn on_rejected(
        &mut self,
        handle: ObjectHandle,
        reaction: FunctionHandle,
    ) -> BridgeResult<()> {
        let settled = {
            let def = self.deferred_mut(handle)?;
            match &def.state {
                DeferredState::Pending => {
                    def.on_rejected.push(reaction);
                    None
                }
                DeferredState::Rejected(exception) => Some(exception.clone()),
                DeferredState::Resolved(_) => return Ok(()),
            }
        };
        if let Some(exception) = settled {
            let error = self.exception_object(&exception);
            self.run_reaction(reaction, &[ScriptValue::Object(error)]);
        }
        Ok(())
    }

    fn deferred_mut(&mut self, handle: ObjectHandle) -> BridgeResult<&mut DeferredRecord> {
        let record = self
            .objects
            .get_mut(handle.index, handle.generation)
            .ok_or(BridgeError::StaleHandle {
                index: handle.index,
            })?;
        record.deferred.as_mut().ok_or(BridgeError::TypeMismatch {
            expected: "deferred",
            actual: "object",
        })
    }

    /// Materialize an exception as a script error object.
    fn exception_object(&mut self, exception: &ScriptException) -> ObjectHandle {
        let handle = self.create_object();
        // Freshly created object; property writes cannot fail.
        let _ = self.set_property(
            handle,
            "code",
            ScriptValue::Number(u32::from(exception.code) as f64),
        );
        let _ = self.set_property(
            handle,
            "message",
            ScriptValue::String(exception.message.clone()),
        );
        handle
    }

    /// Run a settlement reaction. A throwing reaction becomes an uncaught
    /// exception rather than unwinding into the settle path.
    fn run_reaction(&mut self, reaction: FunctionHandle, args: &[ScriptValue]) {
        if let Err(err) = self.call_function(reaction, args) {
            self.report_uncaught(err.into());
        }
    }

    // ===== Uncaught exceptions =====

    /// Record a script-visible exception nobody caught.
    pub fn report_uncaught(&mut self, exception: ScriptException) {
        tracing::error!(
            code = u32::from(exception.code),
            message = %exception.message,
            "uncaught script exception"
        );
        self.uncaught.push(exception);
    }

    /// Drain the recorded uncaught exceptions.
    pub fn take_uncaught(&mut self) -> Vec<ScriptException> {
        mem::take(&mut self.uncaught)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("globals", &self.globals.len())
            .field("objects", &self.objects.live_count())
            .field("functions", &self.functions.live_count())
            .field("uncaught", &self.uncaught.len())
            .finish()
    }
}

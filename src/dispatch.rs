//! Cross-thread re-entry into the runtime.
//!
//! Native work that completes on an arbitrary thread cannot touch the
//! [`Runtime`] directly; it packages its completion as a
//! [`PendingInvocation`] and hands it to a [`DispatchHandle`]. The runtime
//! thread drains the paired [`CallDispatcher`], running each invocation
//! exactly once with `&mut Runtime`.
//!
//! Guarantees:
//!
//! - Invocations scheduled through the same handle (or clones of it) run in
//!   the order they were scheduled, regardless of which underlying native
//!   operation finished first.
//! - After teardown ([`CallDispatcher::close`] or drop), scheduling becomes
//!   a silent no-op: [`DispatchHandle::schedule`] reports `false` and never
//!   panics, blocks, or wakes a dead runtime.
//! - A failing or panicking invocation is contained: it becomes an uncaught
//!   script exception on the runtime and the pump keeps going.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::error::{BridgeError, BridgeResult};
use crate::runtime::Runtime;

/// A unit of work waiting to run on the runtime thread.
pub struct PendingInvocation {
    label: &'static str,
    run: Box<dyn FnOnce(&mut Runtime) -> BridgeResult<()> + Send>,
}

impl PendingInvocation {
    /// Package a closure for the runtime thread.
    ///
    /// The label identifies the invocation in log output; it should name
    /// the operation, not the call site.
    pub fn new<F>(label: &'static str, run: F) -> Self
    where
        F: FnOnce(&mut Runtime) -> BridgeResult<()> + Send + 'static,
    {
        Self {
            label,
            run: Box::new(run),
        }
    }

    /// The diagnostic label this invocation was created with.
    pub fn label(&self) -> &'static str {
        self.label
    }
}

impl fmt::Debug for PendingInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingInvocation")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Cloneable, thread-safe scheduling side of the dispatcher.
#[derive(Clone)]
pub struct DispatchHandle {
    tx: Sender<PendingInvocation>,
    alive: Arc<AtomicBool>,
}

impl DispatchHandle {
    /// Queue an invocation for the runtime thread.
    ///
    /// Returns `true` if the invocation was queued. Returns `false` when
    /// the runtime side has been torn down; the invocation is dropped
    /// without running. Never panics, never blocks.
    pub fn schedule(&self, invocation: PendingInvocation) -> bool {
        if !self.alive.load(Ordering::Acquire) {
            tracing::debug!(
                label = invocation.label(),
                "invocation dropped, runtime is gone"
            );
            return false;
        }
        match self.tx.send(invocation) {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(label = err.0.label(), "invocation dropped, queue closed");
                false
            }
        }
    }
}

impl fmt::Debug for DispatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchHandle")
            .field("alive", &self.alive.load(Ordering::Acquire))
            .finish()
    }
}

/// Runtime-thread side of the dispatcher: drains and executes invocations.
///
/// Lives with the [`Runtime`] on its owning thread. Dropping it is
/// teardown: queued invocations are discarded and later schedules fail.
pub struct CallDispatcher {
    rx: Receiver<PendingInvocation>,
    alive: Arc<AtomicBool>,
}

impl CallDispatcher {
    /// Create a connected handle/dispatcher pair.
    pub fn new() -> (DispatchHandle, CallDispatcher) {
        let (tx, rx) = unbounded();
        let alive = Arc::new(AtomicBool::new(true));
        (
            DispatchHandle {
                tx,
                alive: Arc::clone(&alive),
            },
            CallDispatcher { rx, alive },
        )
    }

    /// Run everything queued at the moment of the call. Returns the number
    /// of invocations executed.
    ///
    /// An invocation that schedules a follow-up through its own handle does
    /// not extend the drain; the follow-up waits for the next pump, so a
    /// single call always returns to the event loop.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn run_pending(&self, rt: &mut Runtime) -> usize {
        if !self.alive.load(Ordering::Acquire) {
            return 0;
        }
        // Snapshot the backlog; work scheduled during the drain stays queued.
        let backlog = self.rx.len();
        let mut ran = 0;
        for _ in 0..backlog {
            let Ok(invocation) = self.rx.try_recv() else {
                break;
            };
            execute(rt, invocation);
            ran += 1;
        }
        ran
    }

    /// Block up to `timeout` for a single invocation and run it.
    ///
    /// Returns `false` if the timeout elapsed with nothing queued. This is
    /// the embedder's pump primitive for event-loop integration and tests.
    pub fn run_one(&self, rt: &mut Runtime, timeout: Duration) -> bool {
        if !self.alive.load(Ordering::Acquire) {
            return false;
        }
        match self.rx.recv_timeout(timeout) {
            Ok(invocation) => {
                execute(rt, invocation);
                true
            }
            Err(_) => false,
        }
    }

    /// Tear down the dispatcher. Queued invocations are dropped unrun and
    /// every later [`DispatchHandle::schedule`] reports `false`.
    ///
    /// Idempotent; also invoked on drop.
    pub fn close(&self) {
        if self.alive.swap(false, Ordering::AcqRel) {
            let mut dropped = 0usize;
            while self.rx.try_recv().is_ok() {
                dropped += 1;
            }
            tracing::debug!(dropped, "dispatch queue closed");
        }
    }
}

impl Drop for CallDispatcher {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for CallDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallDispatcher")
            .field("alive", &self.alive.load(Ordering::Acquire))
            .field("queued", &self.rx.len())
            .finish()
    }
}

/// Run one invocation, containing failures and panics.
fn execute(rt: &mut Runtime, invocation: PendingInvocation) {
    let label = invocation.label();
    let run = invocation.run;
    match panic::catch_unwind(AssertUnwindSafe(|| run(rt))) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            tracing::debug!(label, error = %err, "invocation failed");
            rt.report_uncaught(err.into());
        }
        Err(payload) => {
            let message = panic_message(payload);
            tracing::error!(label, message = %message, "invocation panicked");
            rt.report_uncaught(BridgeError::NativePanic { message }.into());
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

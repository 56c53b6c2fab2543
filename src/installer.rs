//! Binding registration and installation into a runtime.
//!
//! The [`Installer`] collects [`Binding`]s ahead of time, then
//! [`install`](Installer::install)s them all at once: every binding becomes
//! a read-only function property on a single exports object, and that object
//! becomes a read-only global named by
//! [`BridgeConfig::namespace`](crate::config::BridgeConfig) (`"host"` by
//! default). Script code then reaches native work as `host.now()`,
//! `host.delay(250)` and so on.
//!
//! A fresh installer already carries the built-in catalog:
//!
//! | name         | arity | result                                         |
//! |--------------|-------|------------------------------------------------|
//! | `now`        | 0     | epoch-milliseconds from the configured clock   |
//! | `formatDate` | 1     | RFC 3339 string (UTC, millisecond precision)   |
//! | `parseDate`  | 1     | epoch-milliseconds parsed from RFC 3339 text   |
//! | `delay`      | 1     | deferred placeholder, resolved after `ms`      |
//!
//! Installation is once per runtime; a second install attempt is refused
//! rather than merged or replaced.

use std::fmt;
use std::time::Duration;

use anyhow::Context as _;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::binding::Binding;
use crate::config::BridgeConfig;
use crate::dispatch::{DispatchHandle, PendingInvocation};
use crate::error::{BridgeError, BridgeResult};
use crate::marshal;
use crate::runtime::{PropertyFlags, Runtime};
use crate::script_value::ScriptValue;

/// Collects bindings and installs them into a [`Runtime`].
///
/// The dispatch handle is not retained; the catalog bindings that need one
/// (`delay`) clone it into their closures at construction time. Application
/// bindings that schedule completions capture their own clone the same way.
pub struct Installer {
    config: BridgeConfig,
    bindings: Vec<Binding>,
}

impl Installer {
    /// An installer with the default configuration and the built-in
    /// catalog.
    pub fn new(dispatch: DispatchHandle) -> Self {
        Self::with_config(dispatch, BridgeConfig::default())
    }

    /// An installer with an explicit configuration. The catalog picks up
    /// the configured clock, so tests can freeze `now`.
    pub fn with_config(dispatch: DispatchHandle, config: BridgeConfig) -> Self {
        let bindings = catalog(&dispatch, &config);
        Self { config, bindings }
    }

    /// The bindings registered so far, catalog included.
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Register an application binding.
    ///
    /// Names are unique across the whole installer; colliding with another
    /// registration or with a catalog built-in is refused.
    pub fn register(&mut self, binding: Binding) -> BridgeResult<()> {
        if self.bindings.iter().any(|b| b.name() == binding.name()) {
            return Err(BridgeError::DuplicateBinding {
                name: binding.name().to_string(),
            });
        }
        tracing::debug!(
            name = binding.name(),
            arity = binding.arity(),
            id = %binding.id(),
            "binding registered"
        );
        self.bindings.push(binding);
        Ok(())
    }

    /// Install every binding into `rt`, consuming the installer.
    ///
    /// Creates one exports object with a read-only function property per
    /// binding and publishes it as a read-only global under the configured
    /// namespace. Fails with
    /// [`AlreadyInstalled`](BridgeError::AlreadyInstalled) if that global
    /// already exists, leaving the runtime untouched.
    pub fn install(self, rt: &mut Runtime) -> BridgeResult<()> {
        let namespace = self.config.namespace();
        if rt.global(namespace).is_some() {
            return Err(BridgeError::AlreadyInstalled);
        }

        let exports = rt.create_object();
        for binding in &self.bindings {
            let gate = binding.clone();
            let function =
                rt.create_named_function(binding.name(), move |rt, args| gate.invoke(rt, args));
            rt.define_property(
                exports,
                binding.name(),
                ScriptValue::Function(function),
                PropertyFlags::READ_ONLY,
            )?;
        }
        rt.define_global(
            namespace,
            ScriptValue::Object(exports),
            PropertyFlags::READ_ONLY,
        )?;

        tracing::debug!(
            namespace,
            bindings = self.bindings.len(),
            "bridge installed"
        );
        Ok(())
    }
}

impl fmt::Debug for Installer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Installer")
            .field("namespace", &self.config.namespace())
            .field("bindings", &self.bindings.len())
            .finish_non_exhaustive()
    }
}

// ===== Built-in catalog =====

fn catalog(dispatch: &DispatchHandle, config: &BridgeConfig) -> Vec<Binding> {
    let clock = config.clock();
    let now = Binding::new("now", 0, move |_rt, _args| {
        Ok(marshal::from_timestamp(clock()))
    });

    let format_date = Binding::new("formatDate", 1, |rt, args| {
        let at = marshal::to_timestamp(rt, &args[0])?;
        Ok(ScriptValue::from(
            at.to_rfc3339_opts(SecondsFormat::Millis, true),
        ))
    });

    let parse_date = Binding::new("parseDate", 1, |rt, args| {
        let text = marshal::to_text(rt, &args[0])?;
        let parsed = DateTime::parse_from_rfc3339(&text)
            .with_context(|| format!("invalid RFC 3339 timestamp '{text}'"))?;
        Ok(marshal::from_timestamp(parsed.with_timezone(&Utc)))
    });

    let handle = dispatch.clone();
    let delay = Binding::new("delay", 1, move |rt, args| {
        let ms = marshal::to_number(rt, &args[0])?;
        if !ms.is_finite() {
            return Err(BridgeError::TypeMismatch {
                expected: "finite number",
                actual: "number",
            });
        }
        // Timers cannot fire in the past; a negative wait is an immediate one.
        let wait = Duration::from_millis(ms.max(0.0) as u64);
        let deferred = rt.create_deferred();
        let handle = handle.clone();
        std::thread::spawn(move || {
            std::thread::sleep(wait);
            handle.schedule(PendingInvocation::new("delay", move |rt| {
                rt.resolve_deferred(deferred, ScriptValue::Undefined)?;
                Ok(())
            }));
        });
        Ok(ScriptValue::Object(deferred))
    });

    vec![now, format_date, parse_date, delay]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::CallDispatcher;
    use crate::error::ErrorCode;
    use crate::runtime::DeferredState;
    use chrono::TimeZone;

    fn fixed_clock_config(ms: i64) -> BridgeConfig {
        let at = Utc.timestamp_millis_opt(ms).unwrap();
        BridgeConfig::new().with_clock(move || at)
    }

    #[test]
    fn the_catalog_is_preloaded() {
        let (handle, _queue) = CallDispatcher::new();
        let installer = Installer::new(handle);
        let names: Vec<_> = installer.bindings().iter().map(|b| b.name()).collect();
        assert_eq!(names, ["now", "formatDate", "parseDate", "delay"]);
    }

    #[test]
    fn duplicate_names_are_refused() {
        let (handle, _queue) = CallDispatcher::new();
        let mut installer = Installer::new(handle);

        installer
            .register(Binding::new("greet", 1, |_rt, _args| {
                Ok(ScriptValue::Undefined)
            }))
            .unwrap();
        let err = installer
            .register(Binding::new("greet", 2, |_rt, _args| {
                Ok(ScriptValue::Undefined)
            }))
            .unwrap_err();
        assert!(matches!(err, BridgeError::DuplicateBinding { name } if name == "greet"));
    }

    #[test]
    fn catalog_names_are_reserved() {
        let (handle, _queue) = CallDispatcher::new();
        let mut installer = Installer::new(handle);
        let err = installer
            .register(Binding::new("now", 0, |_rt, _args| Ok(ScriptValue::Undefined)))
            .unwrap_err();
        assert!(matches!(err, BridgeError::DuplicateBinding { name } if name == "now"));
    }

    #[test]
    fn install_publishes_a_read_only_namespace() {
        let (handle, _queue) = CallDispatcher::new();
        let mut rt = Runtime::new();
        Installer::new(handle).install(&mut rt).unwrap();

        let exports = match rt.global("host") {
            Some(ScriptValue::Object(h)) => *h,
            other => panic!("expected host object, got {other:?}"),
        };
        assert!(matches!(
            rt.get_property(exports, "now").unwrap(),
            ScriptValue::Function(_)
        ));

        let err = rt
            .set_global("host", ScriptValue::Undefined)
            .unwrap_err();
        assert!(matches!(err, BridgeError::ReadOnlyProperty { .. }));

        let err = rt
            .set_property(exports, "delay", ScriptValue::Undefined)
            .unwrap_err();
        assert!(matches!(err, BridgeError::ReadOnlyProperty { .. }));
    }

    #[test]
    fn a_second_install_is_refused() {
        let (handle, _queue) = CallDispatcher::new();
        let mut rt = Runtime::new();
        Installer::new(handle.clone()).install(&mut rt).unwrap();
        let err = Installer::new(handle).install(&mut rt).unwrap_err();
        assert!(matches!(err, BridgeError::AlreadyInstalled));
    }

    #[test]
    fn custom_namespaces_are_honored() {
        let (handle, _queue) = CallDispatcher::new();
        let mut rt = Runtime::new();
        let config = BridgeConfig::new().with_namespace("native");
        Installer::with_config(handle, config).install(&mut rt).unwrap();

        assert!(rt.global("host").is_none());
        assert!(matches!(rt.global("native"), Some(ScriptValue::Object(_))));
        assert!(matches!(
            rt.call("native.now", &[]).unwrap(),
            ScriptValue::Number(_)
        ));
    }

    #[test]
    fn now_reads_the_configured_clock() {
        let (handle, _queue) = CallDispatcher::new();
        let mut rt = Runtime::new();
        Installer::with_config(handle, fixed_clock_config(1_700_000_000_000))
            .install(&mut rt)
            .unwrap();

        assert_eq!(
            rt.call("host.now", &[]).unwrap(),
            ScriptValue::Number(1_700_000_000_000.0)
        );
        // Surplus arguments are dropped, not an error.
        assert_eq!(
            rt.call("host.now", &[ScriptValue::Bool(true)]).unwrap(),
            ScriptValue::Number(1_700_000_000_000.0)
        );
    }

    #[test]
    fn format_date_produces_rfc3339_millis() {
        let (handle, _queue) = CallDispatcher::new();
        let mut rt = Runtime::new();
        Installer::new(handle).install(&mut rt).unwrap();

        let formatted = rt
            .call("host.formatDate", &[ScriptValue::Number(0.0)])
            .unwrap();
        assert_eq!(formatted, ScriptValue::from("1970-01-01T00:00:00.000Z"));
    }

    #[test]
    fn format_date_refuses_strings() {
        let (handle, _queue) = CallDispatcher::new();
        let mut rt = Runtime::new();
        Installer::new(handle).install(&mut rt).unwrap();

        let err = rt
            .call("host.formatDate", &[ScriptValue::from("yesterday")])
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::TypeMismatch);
    }

    #[test]
    fn parse_date_inverts_format_date() {
        let (handle, _queue) = CallDispatcher::new();
        let mut rt = Runtime::new();
        Installer::new(handle).install(&mut rt).unwrap();

        let ms = 1_715_941_800_123.0;
        let formatted = rt
            .call("host.formatDate", &[ScriptValue::Number(ms)])
            .unwrap();
        assert_eq!(
            rt.call("host.parseDate", &[formatted]).unwrap(),
            ScriptValue::Number(ms)
        );
    }

    #[test]
    fn parse_date_accepts_offsets_and_normalizes_to_utc() {
        let (handle, _queue) = CallDispatcher::new();
        let mut rt = Runtime::new();
        Installer::new(handle).install(&mut rt).unwrap();

        let parsed = rt
            .call(
                "host.parseDate",
                &[ScriptValue::from("1970-01-01T01:00:00.000+01:00")],
            )
            .unwrap();
        assert_eq!(parsed, ScriptValue::Number(0.0));
    }

    #[test]
    fn parse_date_reports_bad_input_as_native_failure() {
        let (handle, _queue) = CallDispatcher::new();
        let mut rt = Runtime::new();
        Installer::new(handle).install(&mut rt).unwrap();

        let err = rt
            .call("host.parseDate", &[ScriptValue::from("not a date")])
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NativeFailure);
        assert!(err.to_string().contains("not a date"));
    }

    #[test]
    fn missing_arguments_surface_the_binding_name() {
        let (handle, _queue) = CallDispatcher::new();
        let mut rt = Runtime::new();
        Installer::new(handle).install(&mut rt).unwrap();

        let err = rt.call("host.formatDate", &[]).unwrap_err();
        match err {
            BridgeError::ArityMismatch {
                name,
                required,
                supplied,
            } => {
                assert_eq!(name, "formatDate");
                assert_eq!(required, 1);
                assert_eq!(supplied, 0);
            }
            other => panic!("expected ArityMismatch, got {other:?}"),
        }
    }

    #[test]
    fn delay_returns_a_pending_placeholder() {
        let (handle, _queue) = CallDispatcher::new();
        let mut rt = Runtime::new();
        Installer::new(handle).install(&mut rt).unwrap();

        let placeholder = rt
            .call("host.delay", &[ScriptValue::Number(10_000.0)])
            .unwrap();
        let deferred = match placeholder {
            ScriptValue::Object(h) => h,
            other => panic!("expected a placeholder object, got {other:?}"),
        };
        assert_eq!(
            rt.deferred_state(deferred).unwrap(),
            DeferredState::Pending
        );
    }

    #[test]
    fn delay_refuses_non_finite_waits() {
        let (handle, _queue) = CallDispatcher::new();
        let mut rt = Runtime::new();
        Installer::new(handle).install(&mut rt).unwrap();

        let err = rt
            .call("host.delay", &[ScriptValue::Number(f64::NAN)])
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::TypeMismatch);
    }
}

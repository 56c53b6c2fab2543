//! Value marshaling at the native/script boundary.
//!
//! Conversions are strict: each `to_*` function accepts exactly the script
//! type it names and refuses everything else with a typed error. A `String`
//! holding digits is not a number, a `Bool` is not `0`/`1`, and `Undefined`
//! converts to nothing. Non-finite numbers pass through `to_number`
//! unchanged; only `to_timestamp` insists on a finite, in-range value.
//!
//! Timestamps cross the boundary as `Number` milliseconds since the Unix
//! epoch (fractional part = sub-millisecond), the script-side date encoding.
//! On the native side they are [`DateTime<Utc>`].

use chrono::{DateTime, Utc};

use crate::error::{BridgeError, BridgeResult};
use crate::runtime::Runtime;
use crate::script_value::ScriptValue;

/// Extract a `String` payload.
pub fn to_text(rt: &Runtime, value: &ScriptValue) -> BridgeResult<String> {
    match value {
        ScriptValue::String(text) => Ok(text.clone()),
        other => Err(mismatch(rt, other, "string")),
    }
}

/// Extract an `f64` payload. NaN and the infinities are legitimate script
/// numbers and pass through unchanged.
pub fn to_number(rt: &Runtime, value: &ScriptValue) -> BridgeResult<f64> {
    match value {
        ScriptValue::Number(n) => Ok(*n),
        other => Err(mismatch(rt, other, "number")),
    }
}

/// Interpret a `Number` as epoch-milliseconds and convert to a UTC instant.
///
/// Fractional milliseconds are kept to microsecond precision. Values before
/// the epoch are valid instants; non-finite values and values outside the
/// representable calendar range are refused.
pub fn to_timestamp(rt: &Runtime, value: &ScriptValue) -> BridgeResult<DateTime<Utc>> {
    let ms = to_number(rt, value)?;
    if !ms.is_finite() {
        return Err(BridgeError::TypeMismatch {
            expected: "finite number",
            actual: "number",
        });
    }
    let micros = (ms * 1_000.0).round();
    if micros < i64::MIN as f64 || micros > i64::MAX as f64 {
        return Err(BridgeError::TypeMismatch {
            expected: "epoch milliseconds in range",
            actual: "number",
        });
    }
    DateTime::from_timestamp_micros(micros as i64).ok_or(BridgeError::TypeMismatch {
        expected: "epoch milliseconds in range",
        actual: "number",
    })
}

/// Encode a UTC instant as a `Number` of epoch-milliseconds.
pub fn from_timestamp(at: DateTime<Utc>) -> ScriptValue {
    ScriptValue::Number(at.timestamp_micros() as f64 / 1_000.0)
}

/// Wrap native text as a script `String`.
pub fn from_text(text: &str) -> ScriptValue {
    ScriptValue::String(text.to_string())
}

/// Classify a refused value. A dead handle is a staleness error, not a type
/// error: the caller held the right kind of value and lost the race with a
/// free, and the message should say so.
fn mismatch(rt: &Runtime, value: &ScriptValue, expected: &'static str) -> BridgeError {
    match value {
        ScriptValue::Object(h) if !rt.object_is_live(*h) => {
            BridgeError::StaleHandle { index: h.index }
        }
        ScriptValue::Function(h) if !rt.function_is_live(*h) => {
            BridgeError::StaleHandle { index: h.index }
        }
        other => BridgeError::TypeMismatch {
            expected,
            actual: other.type_name(),
        },
    }
}

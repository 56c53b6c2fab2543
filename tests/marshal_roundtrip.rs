//! Boundary fidelity: payloads cross unchanged, cross-type conversion is
//! refused, and timestamps survive the epoch-milliseconds encoding.

use hostbridge::{ErrorCode, Runtime, ScriptValue, marshal};

#[test]
fn test_text_crosses_byte_for_byte() {
    let rt = Runtime::new();
    let long = "x".repeat(64 * 1024);
    let cases = [
        "",
        "plain ascii",
        "üñïçødé ≠ ascii",
        "🦀🦀🦀",
        "tab\tand\r\nnewline",
        "nul\0in the middle",
        long.as_str(),
    ];
    for case in cases {
        let out = marshal::to_text(&rt, &marshal::from_text(case)).unwrap();
        assert_eq!(out, case);
    }
}

#[test]
fn test_numbers_cross_bit_for_bit() {
    let rt = Runtime::new();
    let cases = [
        0.0,
        -0.0,
        0.1 + 0.2,
        f64::MAX,
        f64::MIN_POSITIVE,
        f64::EPSILON,
        -12_345.678_9,
        f64::INFINITY,
        f64::NEG_INFINITY,
    ];
    for n in cases {
        let out = marshal::to_number(&rt, &ScriptValue::Number(n)).unwrap();
        assert_eq!(out.to_bits(), n.to_bits());
    }
    let nan = marshal::to_number(&rt, &ScriptValue::Number(f64::NAN)).unwrap();
    assert!(nan.is_nan());
}

#[test]
fn test_cross_type_conversion_is_refused() {
    let rt = Runtime::new();

    assert!(marshal::to_number(&rt, &ScriptValue::from("42")).is_err());
    assert!(marshal::to_number(&rt, &ScriptValue::Bool(true)).is_err());
    assert!(marshal::to_number(&rt, &ScriptValue::Undefined).is_err());

    assert!(marshal::to_text(&rt, &ScriptValue::Number(42.0)).is_err());
    assert!(marshal::to_text(&rt, &ScriptValue::Bool(false)).is_err());
    assert!(marshal::to_text(&rt, &ScriptValue::Undefined).is_err());

    // A date string is text until something parses it on purpose.
    assert!(marshal::to_timestamp(&rt, &ScriptValue::from("2024-05-17T10:30:00Z")).is_err());
}

#[test]
fn test_refusals_classify_as_type_mismatch() {
    let rt = Runtime::new();
    let err = marshal::to_number(&rt, &ScriptValue::from("42")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::TypeMismatch);
    assert_eq!(
        err.to_string(),
        "type mismatch: expected number, got string"
    );
}

#[test]
fn test_timestamps_round_trip_at_millisecond_precision() {
    let rt = Runtime::new();
    let cases = [
        -86_400_000.0,
        -1.0,
        0.0,
        1.0,
        1_715_941_800_123.0,
        // 9999-12-31T23:59:59.999Z
        253_402_300_799_999.0,
    ];
    for ms in cases {
        let at = marshal::to_timestamp(&rt, &ScriptValue::Number(ms)).unwrap();
        assert_eq!(marshal::from_timestamp(at), ScriptValue::Number(ms));
    }
}

#[test]
fn test_error_codes_are_wire_stable() {
    assert_eq!(u32::from(ErrorCode::TypeMismatch), 1);
    assert_eq!(u32::from(ErrorCode::ArityMismatch), 2);
    assert_eq!(u32::from(ErrorCode::NativeFailure), 3);
    assert_eq!(u32::from(ErrorCode::RuntimeUnavailable), 4);

    assert_eq!(ErrorCode::try_from(3u32).unwrap(), ErrorCode::NativeFailure);
    assert!(ErrorCode::try_from(0u32).is_err());
    assert!(ErrorCode::try_from(9u32).is_err());
}

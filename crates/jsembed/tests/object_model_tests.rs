//! Integration tests for the value and object model
//!
//! Tests cover:
//! - Property idempotence and key enumeration
//! - Loose vs strict equality
//! - Script re-entry from property access
//! - Calls, constructors and `instanceof`

use jsembed::{Array, Context, ContextOptions, Error, JsString, JsType, Object, RuntimeError, Value};

fn ctx() -> Context {
    Context::new(ContextOptions::default()).unwrap()
}

// ────────────────────────────────────────────────────────────────────────────
// Properties
// ────────────────────────────────────────────────────────────────────────────

#[test]
fn test_property_set_is_idempotent() {
    let ctx = ctx();
    let obj = Object::new(&ctx).unwrap();
    for round in 0..3 {
        for i in 0..10 {
            obj.set(&format!("k{}", i), &Value::int(&ctx, i * round)).unwrap();
        }
    }
    let keys = obj.keys().unwrap();
    assert_eq!(keys.len().unwrap(), 10);
    assert_eq!(obj.get("k7").unwrap().as_int().unwrap(), 14);
    assert!(!obj.has("k10").unwrap());
}

#[test]
fn test_keys_are_strings_in_engine_order() {
    let ctx = ctx();
    let obj = ctx
        .evaluate("order.js", "({ b: 1, 2: 'two', a: 3, 1: 'one' })")
        .unwrap()
        .as_object()
        .unwrap();
    // integer-like keys enumerate first, ascending
    assert_eq!(obj.key_names().unwrap(), vec!["1", "2", "b", "a"]);
    for key in obj.keys().unwrap().to_vec().unwrap() {
        assert_eq!(key.get_type(), JsType::String);
    }
}

#[test]
fn test_setter_runs_script() {
    let ctx = ctx();
    let obj = ctx
        .evaluate(
            "setter.js",
            "var log = []; ({ set v(x) { log.push(x * 2); } })",
        )
        .unwrap()
        .as_object()
        .unwrap();
    obj.set("v", &Value::int(&ctx, 21)).unwrap();
    let logged = ctx.evaluate("log.js", "log[0]").unwrap();
    assert_eq!(logged.as_int().unwrap(), 42);
}

#[test]
fn test_throwing_setter_surfaces_exception() {
    let ctx = ctx();
    let proxy = ctx
        .evaluate(
            "proxy.js",
            "new Proxy({}, { set: function () { throw new Error('read only'); } })",
        )
        .unwrap()
        .as_object()
        .unwrap();
    match proxy.set("x", &Value::int(&ctx, 1)) {
        Err(Error::Script(e)) => assert!(e.message().contains("read only")),
        other => panic!("expected script exception, got {:?}", other),
    };
}

// ────────────────────────────────────────────────────────────────────────────
// Equality
// ────────────────────────────────────────────────────────────────────────────

#[test]
fn test_object_equality() {
    let ctx = ctx();
    let a = Object::new(&ctx).unwrap();
    let b = Object::new(&ctx).unwrap();
    assert!(a.strict_equals(&a));
    assert!(a.equals(&a).unwrap());
    assert!(!a.strict_equals(&b));
    assert!(!a.equals(&b).unwrap());
}

#[test]
fn test_loose_equality_runs_value_of() {
    let ctx = ctx();
    let obj = ctx
        .evaluate("valueof.js", "({ valueOf: function () { return 5; } })")
        .unwrap();
    let five = Value::int(&ctx, 5);
    assert!(obj.equals(&five).unwrap());
    assert!(!obj.strict_equals(&five));
}

#[test]
fn test_null_and_undefined() {
    let ctx = ctx();
    let null = Value::null(&ctx);
    let undefined = Value::undefined(&ctx);
    assert!(null.equals(&undefined).unwrap());
    assert!(!null.strict_equals(&undefined));
    assert_eq!(undefined.get_type(), JsType::Null);
}

// ────────────────────────────────────────────────────────────────────────────
// Arrays
// ────────────────────────────────────────────────────────────────────────────

#[test]
fn test_array_from_script() {
    let ctx = ctx();
    let array = ctx
        .evaluate("arr.js", "[10, 'x', [1, 2], null]")
        .unwrap()
        .as_array()
        .unwrap();
    assert_eq!(array.len().unwrap(), 4);
    assert_eq!(array.get(0).unwrap().as_int().unwrap(), 10);
    assert_eq!(array.get(2).unwrap().get_type(), JsType::Array);
    assert_eq!(array.get(99).unwrap().get_type(), JsType::Null);
}

#[test]
fn test_array_visible_to_script() {
    let ctx = ctx();
    let array = Array::new(&ctx).unwrap();
    for word in ["alpha", "beta", "gamma"] {
        array.push(&JsString::new(&ctx, word).unwrap()).unwrap();
    }
    ctx.global_object().set("words", &array).unwrap();
    let joined = ctx.evaluate("join.js", "words.join('-')").unwrap();
    assert_eq!(
        joined.as_string().unwrap().to_rust_string().unwrap(),
        "alpha-beta-gamma"
    );
}

// ────────────────────────────────────────────────────────────────────────────
// Functions
// ────────────────────────────────────────────────────────────────────────────

#[test]
fn test_iife_result() {
    let ctx = ctx();
    let v = ctx
        .evaluate("iife.js", "(function (x, y) { return x + y; })(3, 4)")
        .unwrap();
    assert_eq!(v.as_int().unwrap(), 7);
}

#[test]
fn test_construct_and_instance_of() {
    let ctx = ctx();
    let global = ctx.global_object();
    let date = global.get("Date").unwrap().as_function().unwrap();
    let array_ctor = global.get("Array").unwrap().as_function().unwrap();

    let d = date.construct(&[Value::int(&ctx, 0)]).unwrap();
    assert!(d.instance_of(&date).unwrap());
    assert!(!d.instance_of(&array_ctor).unwrap());
    let year = d.call_method("getUTCFullYear", &[]).unwrap();
    assert_eq!(year.as_int().unwrap(), 1970);
}

#[test]
fn test_wrong_downcast_is_not_thrown() {
    let ctx = ctx();
    let s = JsString::new(&ctx, "text").unwrap();
    assert!(matches!(
        s.as_function(),
        Err(RuntimeError::InvalidCast {
            expected: JsType::Function,
            actual: JsType::String
        })
    ));
    assert!(s.downcast::<Object>().is_none());
    // context still usable
    assert_eq!(ctx.evaluate("ok.js", "1").unwrap().as_int().unwrap(), 1);
}

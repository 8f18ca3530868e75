//! Unicode round-trip tests
//!
//! Text crossing the boundary in either direction must come back exactly:
//! - host UTF-8 into the engine and back
//! - host UTF-16 into the engine and back
//! - script-produced strings, including surrogate pairs built in script

use jsembed::{Context, ContextOptions, JsString, JsType, Value};

const SAMPLES: &[&str] = &[
    "Hello, world",
    "Grüße aus Köln",
    "Ça va? Très bien.",
    "¿Dónde está la biblioteca?",
    "Zażółć gęślą jaźń",
    "Příliš žluťoučký kůň",
    "Ελληνικά γράμματα",
    "Русский текст",
    "Українська мова",
    "Հայերեն",
    "ქართული",
    "עברית מימין לשמאל",
    "العربية من اليمين",
    "فارسی",
    "اردو",
    "हिन्दी भाषा",
    "বাংলা",
    "ਪੰਜਾਬੀ",
    "தமிழ்",
    "తెలుగు",
    "ไทย",
    "ລາວ",
    "ភាសាខ្មែរ",
    "မြန်မာ",
    "中文字符",
    "日本語のテキスト",
    "한국어 텍스트",
    "ᠮᠣᠩᠭᠣᠯ",
    "አማርኛ",
    "ᏣᎳᎩ",
    "😀🎉👍🏽👨‍👩‍👧",
    "𝄞𝕳𝖊𝖑𝖑𝖔 𐍈",
    "e\u{301} a\u{308} n\u{303}",
    "mixed ASCII, עברית, and 中文 🌍",
    "\u{200F}rtl mark\u{200E}",
    "tab\tnewline\ncarriage\r",
];

fn ctx() -> Context {
    Context::new(ContextOptions::default()).unwrap()
}

// ============================================================================
// Host to engine and back
// ============================================================================

#[test]
fn test_utf8_round_trip() {
    let ctx = ctx();
    for sample in SAMPLES {
        let s = JsString::new(&ctx, sample).unwrap();
        assert_eq!(s.to_rust_string().unwrap(), *sample);
        assert_eq!(s.utf16_len().unwrap(), sample.encode_utf16().count(), "{}", sample);
    }
}

#[test]
fn test_utf16_round_trip() {
    let ctx = ctx();
    for sample in SAMPLES {
        let units: Vec<u16> = sample.encode_utf16().collect();
        let s = JsString::from_utf16(&ctx, &units).unwrap();
        assert_eq!(s.to_utf16().unwrap(), units, "{}", sample);
    }
}

#[test]
fn test_round_trip_through_script_identity() {
    let ctx = ctx();
    let identity = ctx
        .evaluate("id.js", "(function (s) { return s; })")
        .unwrap()
        .as_function()
        .unwrap();
    for sample in SAMPLES {
        let arg = JsString::new(&ctx, sample).unwrap().into_value();
        let back = identity.call(None, &[arg]).unwrap();
        assert_eq!(back.get_type(), JsType::String);
        assert_eq!(back.as_string().unwrap().to_rust_string().unwrap(), *sample);
    }
}

#[test]
fn test_script_length_matches_utf16() {
    let ctx = ctx();
    let global = ctx.global_object();
    for sample in SAMPLES {
        global
            .set("sample", &JsString::new(&ctx, sample).unwrap())
            .unwrap();
        let len = ctx.evaluate("len.js", "sample.length").unwrap();
        assert_eq!(len.as_int().unwrap() as usize, sample.encode_utf16().count(), "{}", sample);
    }
}

// ============================================================================
// Engine-produced strings
// ============================================================================

#[test]
fn test_surrogate_pair_built_in_script() {
    let ctx = ctx();
    let s = ctx
        .evaluate("pair.js", "String.fromCharCode(0xD83D, 0xDE00)")
        .unwrap();
    assert_eq!(s.as_string().unwrap().to_rust_string().unwrap(), "😀");
}

#[test]
fn test_lone_surrogate_survives_to_utf16() {
    let ctx = ctx();
    let s = ctx
        .evaluate("lone.js", "'a' + String.fromCharCode(0xDC00) + 'b'")
        .unwrap();
    let units = s.as_string().unwrap().to_utf16().unwrap();
    assert_eq!(units, vec![0x61, 0xDC00, 0x62]);
}

// ============================================================================
// Primitive round trips
// ============================================================================

#[test]
fn test_numbers_and_bools_round_trip() {
    let ctx = ctx();
    let identity = ctx
        .evaluate("id.js", "(function (x) { return x; })")
        .unwrap()
        .as_function()
        .unwrap();

    for i in [0, 1, -1, 42, i32::MIN, i32::MAX] {
        let back = identity.call(None, &[Value::int(&ctx, i)]).unwrap();
        assert_eq!(back.as_int().unwrap(), i);
    }
    for d in [0.5, -2.25, 1e300, f64::MIN_POSITIVE, std::f64::consts::PI] {
        let back = identity.call(None, &[Value::double(&ctx, d)]).unwrap();
        assert_eq!(back.as_double().unwrap(), d);
    }
    for b in [true, false] {
        let back = identity.call(None, &[Value::bool(&ctx, b)]).unwrap();
        assert_eq!(back.as_bool().unwrap(), b);
    }
}

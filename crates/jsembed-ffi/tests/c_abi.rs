//! Integration tests for the C ABI
//!
//! Drives the exported functions the way a C host would: raw pointers,
//! out-parameters and `extern "C"` handlers.

use std::cell::RefCell;
use std::ffi::{c_void, CStr, CString};
use std::os::raw::{c_char, c_int};
use std::ptr;

use jsembed_ffi::*;

unsafe fn eval(ctx: *mut JSContext, code: &str) -> *mut JSValue {
    let file = CString::new("abi.js").unwrap();
    let code = CString::new(code).unwrap();
    JSContextEvaluateCreate(ctx, file.as_ptr(), code.as_ptr(), ptr::null_mut(), ptr::null_mut())
}

thread_local! {
    static EVENTS: RefCell<Vec<String>> = RefCell::new(Vec::new());
}

fn events() -> Vec<String> {
    EVENTS.with(|e| e.borrow().clone())
}

fn clear_events() {
    EVENTS.with(|e| e.borrow_mut().clear());
}

fn push(event: String) {
    EVENTS.with(|e| e.borrow_mut().push(event));
}

// ============================================================================
// Externals and buffers
// ============================================================================

unsafe extern "C" fn free_external(pointer: *mut c_void) {
    push(format!("external:{}", pointer as usize));
}

unsafe extern "C" fn free_buffer(data: *mut u8, len: usize) {
    push(format!("buffer:{}", len));
    libc::free(data.cast::<c_void>());
}

#[test]
fn test_external_identity_and_single_free() {
    clear_events();
    unsafe {
        let ctx = CreateJSContext(None, Some(free_external));
        let external = CreateJSExternal(ctx, 0x40 as *mut c_void, ptr::null_mut());
        assert_eq!(GetJSValueType(external), JSType::External);

        let identity = eval(ctx, "(function (x) { return x; })");
        let args = [external];
        let back = CallJSFunctionCreate(
            ctx,
            identity,
            ptr::null_mut(),
            args.as_ptr(),
            1,
            ptr::null_mut(),
            ptr::null_mut(),
        );
        assert_eq!(GetJSExternalValue(ctx, back, ptr::null_mut()) as usize, 0x40);
        assert!(JSValueStrictEquals(ctx, back, external, ptr::null_mut()));

        for v in [external, identity, back] {
            ReleaseJSValue(v);
        }
        JSContextIdleNotificationDeadline(ctx, 1.0);
        ReleaseJSContext(ctx);
    }
    assert_eq!(events(), vec!["external:64".to_owned()]);
}

#[test]
fn test_buffer_mutation_and_finalizer() {
    clear_events();
    unsafe {
        let ctx = CreateJSContext(None, None);
        let data = libc::calloc(8, 1).cast::<u8>();
        assert!(!data.is_null());
        let buffer = CreateExternalJSArrayBuffer(ctx, data, 8, Some(free_buffer), ptr::null_mut());
        assert_eq!(GetJSValueType(buffer), JSType::Object);

        let fill = eval(ctx, "(function (b) { new Uint8Array(b)[2] = 9; })");
        let args = [buffer];
        let done = CallJSFunctionCreate(
            ctx,
            fill,
            ptr::null_mut(),
            args.as_ptr(),
            1,
            ptr::null_mut(),
            ptr::null_mut(),
        );
        ReleaseJSValue(done);

        let mut len = 0usize;
        let seen = GetJSObjectArrayBufferData(ctx, buffer, &mut len, ptr::null_mut());
        assert_eq!(seen, data);
        assert_eq!(len, 8);
        assert_eq!(*seen.add(2), 9);

        let plain = CreateJSObject(ctx, ptr::null_mut());
        assert!(GetJSObjectArrayBufferData(ctx, plain, &mut len, ptr::null_mut()).is_null());
        assert_eq!(len, 0);

        let copy = eval(ctx, "(function (b) { return b.slice(0); })");
        let args = [buffer];
        let sliced = CallJSFunctionCreate(
            ctx,
            copy,
            ptr::null_mut(),
            args.as_ptr(),
            1,
            ptr::null_mut(),
            ptr::null_mut(),
        );
        len = 1;
        assert!(GetJSObjectArrayBufferData(ctx, sliced, &mut len, ptr::null_mut()).is_null());
        assert_eq!(len, 0);

        for v in [fill, plain, copy, sliced] {
            ReleaseJSValue(v);
        }
        assert!(events().is_empty());
        // the last reference goes away here
        ReleaseJSValue(buffer);
        assert_eq!(events(), vec!["buffer:8".to_owned()]);
        ReleaseJSContext(ctx);
    }
    assert_eq!(events(), vec!["buffer:8".to_owned()]);
}

// ============================================================================
// Handlers
// ============================================================================

unsafe extern "C" fn on_exception(_ctx: *mut JSContext, exception: *mut JSScriptException) {
    let message = CopyJSScriptExceptionMessage(exception);
    let text = CStr::from_ptr(message).to_string_lossy().into_owned();
    FreeJSCString(message);
    push(format!("{}@{}", text, GetJSScriptExceptionLineNumber(exception)));
    ReleaseJSScriptException(exception);
}

unsafe extern "C" fn on_runtime_error(
    _ctx: *mut JSContext,
    code: JSRuntimeError,
    _message: *const c_char,
) {
    push(format!("runtime:{:?}", code));
}

#[test]
fn test_exception_handler_takes_ownership() {
    clear_events();
    unsafe {
        let ctx = CreateJSContext(None, None);
        SetJSScriptExceptionHandler(ctx, Some(on_exception));

        let mut exception: *mut JSScriptException = ptr::null_mut();
        let file = CString::new("h.js").unwrap();
        let code = CString::new("1;\nthrow new Error('boom');").unwrap();
        let value =
            JSContextEvaluateCreate(ctx, file.as_ptr(), code.as_ptr(), &mut exception, ptr::null_mut());
        assert!(value.is_null());
        assert!(exception.is_null());
        assert_eq!(events(), vec!["Error: boom@2".to_owned()]);

        SetJSScriptExceptionHandler(ctx, None);
        let value =
            JSContextEvaluateCreate(ctx, file.as_ptr(), code.as_ptr(), &mut exception, ptr::null_mut());
        assert!(value.is_null());
        assert!(!exception.is_null());
        ReleaseJSScriptException(exception);
        ReleaseJSContext(ctx);
    }
}

#[test]
fn test_runtime_error_handler() {
    clear_events();
    unsafe {
        let ctx = CreateJSContext(None, None);
        SetJSRuntimeErrorHandler(ctx, Some(on_runtime_error));
        let number = CreateJSInt(ctx, 5);
        let mut err = JSRuntimeError::NoError;
        assert!(JSValueAsStringCopy(ctx, number, &mut err).is_null());
        assert_eq!(err, JSRuntimeError::NoError);
        assert_eq!(events(), vec!["runtime:InvalidCast".to_owned()]);

        SetJSRuntimeErrorHandler(ctx, None);
        assert!(JSValueAsStringCopy(ctx, number, &mut err).is_null());
        assert_eq!(err, JSRuntimeError::InvalidCast);
        ReleaseJSValue(number);
        ReleaseJSContext(ctx);
    }
}

// ============================================================================
// Debug channel
// ============================================================================

unsafe extern "C" fn on_debug(data: *mut c_void, message: *const c_char) {
    assert_eq!(data as usize, 7);
    push(CStr::from_ptr(message).to_string_lossy().into_owned());
}

#[test]
fn test_debug_roundtrip() {
    clear_events();
    unsafe {
        let ctx = CreateJSContext(None, None);
        SetJSDebugMessageHandler(ctx, 7 as *mut c_void, Some(on_debug));
        let command =
            CString::new(r#"{"id":1,"method":"Runtime.evaluate","params":{"expression":"40+2"}}"#)
                .unwrap();
        assert_eq!(SendJSDebugCommand(ctx, command.as_ptr()), 0);
        assert_eq!(ProcessJSDebugMessages(ctx), 1);

        let replies = events();
        assert_eq!(replies.len(), 1);
        assert!(replies[0].contains("\"id\":1"), "{}", replies[0]);
        assert!(replies[0].contains("42"), "{}", replies[0]);
        ReleaseJSContext(ctx);
    }
}

// ============================================================================
// Arrays and stale handles
// ============================================================================

#[test]
fn test_array_access() {
    unsafe {
        let ctx = CreateJSContext(None, None);
        let array = CreateJSArray(ctx, ptr::null_mut());
        for i in 0..3 {
            let v = CreateJSInt(ctx, i * 10);
            assert_eq!(
                SetJSArrayPropertyAtIndex(ctx, array, i, v, ptr::null_mut(), ptr::null_mut()),
                0
            );
            ReleaseJSValue(v);
        }
        assert_eq!(JSArrayLength(ctx, array, ptr::null_mut(), ptr::null_mut()), 3);
        let second = CopyJSArrayPropertyAtIndex(ctx, array, 2, ptr::null_mut(), ptr::null_mut());
        assert_eq!(JSValueAsInt(ctx, second, ptr::null_mut()), 20);

        let mut err = JSRuntimeError::NoError;
        let bad = CopyJSArrayPropertyAtIndex(ctx, array, -1, ptr::null_mut(), &mut err);
        assert!(bad.is_null());
        assert_eq!(err, JSRuntimeError::TypeError);

        ReleaseJSValue(second);
        ReleaseJSValue(array);
        ReleaseJSContext(ctx);
    }
}

#[test]
fn test_released_context_rejected() {
    unsafe {
        let ctx = CreateJSContext(None, None);
        ReleaseJSContext(ctx);
        let mut err = JSRuntimeError::NoError;
        assert!(CreateJSObject(ctx, &mut err).is_null());
        assert_eq!(err, JSRuntimeError::TypeError);
        assert_eq!(ProcessJSDebugMessages(ctx), -1);
        let _: c_int = JSValueAsInt(ptr::null_mut(), ptr::null_mut(), &mut err);
        assert_eq!(err, JSRuntimeError::TypeError);
    }
}

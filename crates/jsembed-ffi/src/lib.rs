//! C ABI bindings for jsembed
//!
//! This module exposes contexts, values and callbacks to C callers.
//! The API follows these principles:
//! - ABI-stable (uses only C-compatible types)
//! - Reference-counted opaque handles (`Retain*` / `Release*`)
//! - Errors via out-parameters or registered handlers
//! - Single-threaded: a context and everything created from it stay on the
//!   thread that created the context
//!
//! Every `Create*` and `Copy*` function returns a handle with a count of
//! one that the caller must release. Value handles are shared by all value
//! kinds; the typed `JSValueAs*Copy` functions only check the kind.

#![allow(non_snake_case)]

use jsembed::{
    Array, BufferFreer, Callback, CallbackError, CallbackResult, Context, ContextOptions, Error,
    External, Function, Handle, JsString, JsType, Object, Result, RuntimeError, ScriptException,
    Value,
};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::cell::Cell;
use std::ffi::{c_void, CStr, CString};
use std::os::raw::{c_char, c_int};
use std::ptr;
use std::slice;

// ============================================================================
// Opaque Types
// ============================================================================

/// Opaque handle to an execution context
#[repr(C)]
pub struct JSContext {
    _private: [u8; 0],
}

/// Opaque handle to a value of any kind
#[repr(C)]
pub struct JSValue {
    _private: [u8; 0],
}

/// Opaque handle to a captured script exception
#[repr(C)]
pub struct JSScriptException {
    _private: [u8; 0],
}

/// Variant tag of a value
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JSType {
    Null = 0,
    Int = 1,
    Double = 2,
    String = 3,
    Bool = 4,
    Object = 5,
    Array = 6,
    Function = 7,
    External = 8,
}

impl From<JsType> for JSType {
    fn from(kind: JsType) -> Self {
        match kind {
            JsType::Null => JSType::Null,
            JsType::Int => JSType::Int,
            JsType::Double => JSType::Double,
            JsType::String => JSType::String,
            JsType::Bool => JSType::Bool,
            JsType::Object => JSType::Object,
            JsType::Array => JSType::Array,
            JsType::Function => JSType::Function,
            JsType::External => JSType::External,
        }
    }
}

/// Host-side error code
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JSRuntimeError {
    NoError = 0,
    InvalidCast = 1,
    StringTooLong = 2,
    TypeError = 3,
}

impl From<&RuntimeError> for JSRuntimeError {
    fn from(error: &RuntimeError) -> Self {
        match error {
            RuntimeError::InvalidCast { .. } => JSRuntimeError::InvalidCast,
            RuntimeError::StringTooLong { .. } => JSRuntimeError::StringTooLong,
            RuntimeError::TypeError(_) => JSRuntimeError::TypeError,
        }
    }
}

// ============================================================================
// Function Pointer Types
// ============================================================================

/// Host function called from script
///
/// `args` holds `argc` borrowed handles that are valid for the duration of
/// the call; retain any that must outlive it. Return an owned handle (or
/// null for `undefined`). Storing an owned handle in `*error` throws it.
pub type JSCallback = unsafe extern "C" fn(
    ctx: *mut JSContext,
    data: *mut c_void,
    args: *const *mut JSValue,
    argc: c_int,
    error: *mut *mut JSValue,
) -> *mut JSValue;

/// Called once with a callback's `data` when the engine no longer needs it
pub type JSCallbackFinalizer = unsafe extern "C" fn(data: *mut c_void);

/// Called once with an external's pointer when its wrapper is collected
pub type JSExternalFinalizer = unsafe extern "C" fn(pointer: *mut c_void);

/// Called once with a buffer's original range when it is collected
pub type JSBufferFinalizer = unsafe extern "C" fn(data: *mut u8, len: usize);

/// Receives ownership of the exception handle
pub type JSScriptExceptionHandler =
    unsafe extern "C" fn(ctx: *mut JSContext, exception: *mut JSScriptException);

/// `message` is only valid during the call
pub type JSRuntimeErrorHandler =
    unsafe extern "C" fn(ctx: *mut JSContext, code: JSRuntimeError, message: *const c_char);

/// `message` is only valid during the call
pub type JSDebugMessageHandler = unsafe extern "C" fn(data: *mut c_void, message: *const c_char);

// ============================================================================
// Internal Handles
// ============================================================================

// Internal representation of a context (not exposed to C)
struct ContextHandle {
    ctx: Context,
    refs: Cell<usize>,
    callback_finalizer: Option<JSCallbackFinalizer>,
    runtime_error_handler: Cell<Option<JSRuntimeErrorHandler>>,
    // number of C callbacks currently running
    depth: Cell<usize>,
}

// Internal representation of a value (not exposed to C)
struct ValueHandle {
    value: Handle,
    refs: Cell<usize>,
}

// Internal representation of an exception (not exposed to C)
struct ExceptionHandle {
    value: Handle,
    message: String,
    file_name: Option<String>,
    line_number: Option<u32>,
    stack_trace: Option<String>,
    source_line: Option<String>,
    refs: Cell<usize>,
}

// Addresses of contexts that have not been released. Used only to reject
// stale context pointers; owns nothing.
static LIVE_CONTEXTS: Lazy<Mutex<FxHashSet<usize>>> = Lazy::new(Default::default);

static ENGINE_VERSION: Lazy<CString> =
    Lazy::new(|| CString::new(jsembed::engine_version()).unwrap_or_default());

impl ContextHandle {
    /// Deliver a failure to the out-parameters or the registered handlers
    unsafe fn fail(
        &self,
        ctx: *mut JSContext,
        error: Error<'_>,
        exception: *mut *mut JSScriptException,
        err: *mut JSRuntimeError,
    ) {
        match error {
            Error::Script(e) => {
                if !exception.is_null() {
                    *exception = new_exception(&e);
                }
            }
            Error::Runtime(e) => self.report(ctx, &e, err),
            Error::Marshal(e) => self.report(ctx, &RuntimeError::TypeError(e.to_string()), err),
            Error::Handled => {}
        }
    }

    /// Runtime errors raised at the ABI boundary itself
    unsafe fn report(&self, ctx: *mut JSContext, error: &RuntimeError, err: *mut JSRuntimeError) {
        match self.runtime_error_handler.get() {
            Some(handler) if self.depth.get() == 0 => call_runtime_error_handler(handler, ctx, error),
            _ => set_error(err, error.into()),
        }
    }
}

unsafe fn call_runtime_error_handler(
    handler: JSRuntimeErrorHandler,
    ctx: *mut JSContext,
    error: &RuntimeError,
) {
    let message = rust_to_c_string(&error.to_string());
    handler(ctx, error.into(), message);
    FreeJSCString(message);
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert Rust string to C string (caller must free)
fn rust_to_c_string(s: &str) -> *mut c_char {
    let owned = if s.contains('\0') {
        s.replace('\0', "\u{FFFD}")
    } else {
        s.to_owned()
    };
    match CString::new(owned) {
        Ok(c) => c.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

unsafe fn set_error(err: *mut JSRuntimeError, code: JSRuntimeError) {
    if !err.is_null() {
        *err = code;
    }
}

fn type_error<'c>(message: &str) -> Error<'c> {
    Error::Runtime(RuntimeError::TypeError(message.to_owned()))
}

unsafe fn text<'a, 'c>(s: *const c_char, what: &str) -> Result<'c, &'a str> {
    if s.is_null() {
        return Err(type_error(&format!("{} is null", what)));
    }
    CStr::from_ptr(s)
        .to_str()
        .map_err(|_| type_error(&format!("{} is not valid UTF-8", what)))
}

unsafe fn context_ref<'a>(ctx: *mut JSContext) -> Option<&'a ContextHandle> {
    if ctx.is_null() || !LIVE_CONTEXTS.lock().contains(&(ctx as usize)) {
        return None;
    }
    Some(&*(ctx as *const ContextHandle))
}

unsafe fn value_ref<'a>(value: *mut JSValue) -> Option<&'a ValueHandle> {
    if value.is_null() {
        None
    } else {
        Some(&*(value as *const ValueHandle))
    }
}

unsafe fn exception_ref<'a>(exception: *mut JSScriptException) -> Option<&'a ExceptionHandle> {
    if exception.is_null() {
        None
    } else {
        Some(&*(exception as *const ExceptionHandle))
    }
}

fn new_value(value: &Value<'_>) -> *mut JSValue {
    let handle = Box::new(ValueHandle {
        value: Handle::new(value),
        refs: Cell::new(1),
    });
    Box::into_raw(handle) as *mut JSValue
}

fn new_exception(exception: &ScriptException<'_>) -> *mut JSScriptException {
    let handle = Box::new(ExceptionHandle {
        value: Handle::new(exception.value()),
        message: exception.message().to_owned(),
        file_name: exception.file_name().map(str::to_owned),
        line_number: exception.line_number(),
        stack_trace: exception.stack_trace().map(str::to_owned),
        source_line: exception.source_line().map(str::to_owned),
        refs: Cell::new(1),
    });
    Box::into_raw(handle) as *mut JSScriptException
}

/// A fresh value for a handle, checked against the context
unsafe fn restore<'c>(handle: &'c ContextHandle, value: *mut JSValue) -> Result<'c, Value<'c>> {
    let Some(value) = value_ref(value) else {
        return Err(type_error("value handle is null"));
    };
    Ok(value.value.restore(&handle.ctx)?)
}

unsafe fn restore_args<'c>(
    handle: &'c ContextHandle,
    args: *const *mut JSValue,
    argc: c_int,
) -> Result<'c, Vec<Value<'c>>> {
    if argc <= 0 {
        return Ok(Vec::new());
    }
    if args.is_null() {
        return Err(type_error("argument array is null"));
    }
    slice::from_raw_parts(args, argc as usize)
        .iter()
        .map(|&arg| restore(handle, arg))
        .collect()
}

/// Run `f` against a live context, routing any failure
///
/// Clears the out-parameters first. A stale or null context reports
/// `TypeError` and returns `fallback`.
unsafe fn guarded<T>(
    ctx: *mut JSContext,
    exception: *mut *mut JSScriptException,
    err: *mut JSRuntimeError,
    fallback: T,
    f: impl for<'c> FnOnce(&'c ContextHandle) -> Result<'c, T>,
) -> T {
    set_error(err, JSRuntimeError::NoError);
    if !exception.is_null() {
        *exception = ptr::null_mut();
    }
    let Some(handle) = context_ref(ctx) else {
        set_error(err, JSRuntimeError::TypeError);
        return fallback;
    };
    match f(handle) {
        Ok(result) => result,
        Err(error) => {
            handle.fail(ctx, error, exception, err);
            fallback
        }
    }
}

fn clamp_len(len: usize) -> c_int {
    c_int::try_from(len).unwrap_or(c_int::MAX)
}

// ============================================================================
// Callback Bridge
// ============================================================================

struct ForeignCallback {
    context: *mut JSContext,
    data: *mut c_void,
    callback: JSCallback,
    finalizer: Option<JSCallbackFinalizer>,
}

/// Consume an owned handle returned by C code
unsafe fn take_value<'c>(ctx: &'c Context, value: *mut JSValue) -> CallbackResult<'c> {
    let restored = match value_ref(value) {
        Some(handle) => handle.value.restore(ctx),
        None => return Ok(None),
    };
    ReleaseJSValue(value);
    Ok(Some(restored?))
}

impl Callback for ForeignCallback {
    fn call<'c>(&self, ctx: &'c Context, args: &[Value<'c>]) -> CallbackResult<'c> {
        let Some(handle) = (unsafe { context_ref(self.context) }) else {
            return Err(RuntimeError::TypeError("callback context was released".into()).into());
        };

        let argv: Vec<*mut JSValue> = args.iter().map(new_value).collect();
        let mut error: *mut JSValue = ptr::null_mut();

        handle.depth.set(handle.depth.get() + 1);
        let result = unsafe {
            (self.callback)(
                self.context,
                self.data,
                argv.as_ptr(),
                clamp_len(argv.len()),
                &mut error,
            )
        };
        handle.depth.set(handle.depth.get() - 1);

        for arg in argv {
            unsafe { ReleaseJSValue(arg) };
        }

        if !error.is_null() {
            unsafe { ReleaseJSValue(result) };
            return match unsafe { take_value(ctx, error) }? {
                Some(thrown) => Err(CallbackError::Throw(thrown)),
                None => Ok(None),
            };
        }
        unsafe { take_value(ctx, result) }
    }

    fn release(&self) {
        if let Some(finalizer) = self.finalizer {
            unsafe { finalizer(self.data) };
        }
    }
}

// ============================================================================
// Context Management
// ============================================================================

/// Create a new execution context
///
/// # Arguments
/// * `callback_finalizer` - Called with each callback's `data` when the
///   callback is released. May be null.
/// * `external_finalizer` - Called with each external's pointer when it is
///   collected. May be null.
///
/// # Returns
/// * Pointer to the context with a count of one, or null on failure
///
/// # Safety
/// - The returned context must be released with `ReleaseJSContext`
/// - The context must only be used from the creating thread
///
/// # Example (C)
/// ```c
/// JSContext* ctx = CreateJSContext(free_callback_data, NULL);
/// if (ctx == NULL) {
///     return -1;
/// }
/// ReleaseJSContext(ctx);
/// ```
#[no_mangle]
pub unsafe extern "C" fn CreateJSContext(
    callback_finalizer: Option<JSCallbackFinalizer>,
    external_finalizer: Option<JSExternalFinalizer>,
) -> *mut JSContext {
    let ctx = match Context::new(ContextOptions::default()) {
        Ok(ctx) => ctx,
        Err(_) => return ptr::null_mut(),
    };
    if let Some(free) = external_finalizer {
        ctx.set_external_freer(move |pointer| unsafe { free(pointer) });
    }

    let handle = Box::new(ContextHandle {
        ctx,
        refs: Cell::new(1),
        callback_finalizer,
        runtime_error_handler: Cell::new(None),
        depth: Cell::new(0),
    });
    let raw = Box::into_raw(handle);
    LIVE_CONTEXTS.lock().insert(raw as usize);
    raw as *mut JSContext
}

/// Increment a context's count
///
/// # Safety
/// - `ctx` must be null or a context returned by `CreateJSContext`
#[no_mangle]
pub unsafe extern "C" fn RetainJSContext(ctx: *mut JSContext) {
    if let Some(handle) = context_ref(ctx) {
        handle.refs.set(handle.refs.get() + 1);
    }
}

/// Decrement a context's count, destroying it at zero
///
/// Destroying the context releases every callback (running the callback
/// finalizer) and frees every external and buffer. Value handles that
/// outlive it fail with `TypeError`.
///
/// # Safety
/// - `ctx` must be null or a context returned by `CreateJSContext`
/// - Must not be called from inside a callback of the same context
#[no_mangle]
pub unsafe extern "C" fn ReleaseJSContext(ctx: *mut JSContext) {
    let Some(handle) = context_ref(ctx) else {
        return;
    };
    let refs = handle.refs.get();
    if refs > 1 {
        handle.refs.set(refs - 1);
        return;
    }
    LIVE_CONTEXTS.lock().remove(&(ctx as usize));
    drop(Box::from_raw(ctx as *mut ContextHandle));
}

/// Compile and run `code`, naming it `file_name` in stack traces
///
/// # Arguments
/// * `ctx` - Context
/// * `file_name` - Null-terminated UTF-8 name
/// * `code` - Null-terminated UTF-8 source
/// * `exception` - Receives an owned exception if the script throws and no
///   exception handler is set. May be null.
/// * `err` - Receives the runtime error code. May be null.
///
/// # Returns
/// * Owned completion value, or null on failure
///
/// # Safety
/// - `file_name` and `code` must be null or valid null-terminated strings
#[no_mangle]
pub unsafe extern "C" fn JSContextEvaluateCreate(
    ctx: *mut JSContext,
    file_name: *const c_char,
    code: *const c_char,
    exception: *mut *mut JSScriptException,
    err: *mut JSRuntimeError,
) -> *mut JSValue {
    guarded(ctx, exception, err, ptr::null_mut(), |h| {
        let file_name = text(file_name, "file name")?;
        let code = text(code, "code")?;
        let value = h.ctx.evaluate(file_name, code)?;
        Ok(new_value(&value))
    })
}

/// Owned handle to the context's global object
///
/// # Safety
/// - `ctx` must be null or a context returned by `CreateJSContext`
#[no_mangle]
pub unsafe extern "C" fn JSContextCopyGlobalObject(
    ctx: *mut JSContext,
    err: *mut JSRuntimeError,
) -> *mut JSValue {
    guarded(ctx, ptr::null_mut(), err, ptr::null_mut(), |h| {
        Ok(new_value(h.ctx.global_object().as_value()))
    })
}

/// Hint that the host is idle for `deadline_ms`
///
/// # Returns
/// * `true` when no more idle work is pending; `false` for a bad context
///
/// # Safety
/// - `ctx` must be null or a context returned by `CreateJSContext`
#[no_mangle]
pub unsafe extern "C" fn JSContextIdleNotificationDeadline(
    ctx: *mut JSContext,
    deadline_ms: f64,
) -> bool {
    match context_ref(ctx) {
        Some(handle) => handle.ctx.idle_notification_deadline(deadline_ms),
        None => false,
    }
}

/// Run queued promise jobs
///
/// # Returns
/// * Number of jobs run, or -1 on failure
///
/// # Safety
/// - `ctx` must be null or a context returned by `CreateJSContext`
#[no_mangle]
pub unsafe extern "C" fn JSContextExecutePendingJobs(
    ctx: *mut JSContext,
    exception: *mut *mut JSScriptException,
    err: *mut JSRuntimeError,
) -> c_int {
    guarded(ctx, exception, err, -1, |h| {
        Ok(clamp_len(h.ctx.execute_pending_jobs()?))
    })
}

/// Deliver script exceptions to `handler` instead of the out-parameter
///
/// The handler receives ownership of the exception. Exceptions raised
/// while a callback runs are still returned so they can be rethrown. Pass
/// null to restore the default path.
///
/// # Safety
/// - `ctx` must be null or a context returned by `CreateJSContext`
#[no_mangle]
pub unsafe extern "C" fn SetJSScriptExceptionHandler(
    ctx: *mut JSContext,
    handler: Option<JSScriptExceptionHandler>,
) {
    let Some(handle) = context_ref(ctx) else {
        return;
    };
    match handler {
        Some(handler) => handle
            .ctx
            .set_exception_handler(move |_, exception| unsafe { handler(ctx, new_exception(&exception)) }),
        None => handle.ctx.clear_exception_handler(),
    }
}

/// Deliver runtime errors to `handler` instead of the `err` out-parameter
///
/// # Safety
/// - `ctx` must be null or a context returned by `CreateJSContext`
#[no_mangle]
pub unsafe extern "C" fn SetJSRuntimeErrorHandler(
    ctx: *mut JSContext,
    handler: Option<JSRuntimeErrorHandler>,
) {
    let Some(handle) = context_ref(ctx) else {
        return;
    };
    handle.runtime_error_handler.set(handler);
    match handler {
        Some(handler) => handle.ctx.set_runtime_error_handler(move |_, error| unsafe {
            call_runtime_error_handler(handler, ctx, error)
        }),
        None => handle.ctx.clear_runtime_error_handler(),
    }
}

// ============================================================================
// Debug Channel
// ============================================================================

/// Deliver debug replies and events to `handler`
///
/// # Safety
/// - `ctx` must be null or a context returned by `CreateJSContext`
/// - `data` must stay valid while the handler is installed
#[no_mangle]
pub unsafe extern "C" fn SetJSDebugMessageHandler(
    ctx: *mut JSContext,
    data: *mut c_void,
    handler: Option<JSDebugMessageHandler>,
) {
    let Some(handle) = context_ref(ctx) else {
        return;
    };
    match handler {
        Some(handler) => handle.ctx.set_debug_message_handler(move |message| unsafe {
            let message = rust_to_c_string(message);
            handler(data, message);
            FreeJSCString(message);
        }),
        None => handle.ctx.clear_debug_message_handler(),
    }
}

/// Queue a raw debug command
///
/// # Returns
/// * 0 on success, -1 on a bad context or command
///
/// # Safety
/// - `command` must be null or a valid null-terminated string
#[no_mangle]
pub unsafe extern "C" fn SendJSDebugCommand(ctx: *mut JSContext, command: *const c_char) -> c_int {
    guarded(ctx, ptr::null_mut(), ptr::null_mut(), -1, |h| {
        h.ctx.send_debug_command(text(command, "debug command")?);
        Ok(0)
    })
}

/// Process queued debug commands
///
/// # Returns
/// * Number of messages delivered, or -1 for a bad context
///
/// # Safety
/// - `ctx` must be null or a context returned by `CreateJSContext`
#[no_mangle]
pub unsafe extern "C" fn ProcessJSDebugMessages(ctx: *mut JSContext) -> c_int {
    match context_ref(ctx) {
        Some(handle) => clamp_len(handle.ctx.process_debug_messages()),
        None => -1,
    }
}

// ============================================================================
// Version
// ============================================================================

/// Engine version string
///
/// # Safety
/// - The returned string is static and must not be freed
#[no_mangle]
pub unsafe extern "C" fn GetJSEngineVersion() -> *const c_char {
    ENGINE_VERSION.as_ptr()
}

// ============================================================================
// Values
// ============================================================================

/// Variant of a value; `Null` for a null handle
///
/// # Safety
/// - `value` must be null or a live value handle
#[no_mangle]
pub unsafe extern "C" fn GetJSValueType(value: *mut JSValue) -> JSType {
    match value_ref(value) {
        Some(handle) => handle.value.js_type().into(),
        None => JSType::Null,
    }
}

/// # Safety
/// - `value` must be null or a live value handle
#[no_mangle]
pub unsafe extern "C" fn RetainJSValue(value: *mut JSValue) {
    if let Some(handle) = value_ref(value) {
        handle.refs.set(handle.refs.get() + 1);
    }
}

/// Decrement a value's count, freeing it at zero
///
/// Safe to call after the owning context was released.
///
/// # Safety
/// - `value` must be null or a live value handle
#[no_mangle]
pub unsafe extern "C" fn ReleaseJSValue(value: *mut JSValue) {
    let Some(handle) = value_ref(value) else {
        return;
    };
    let refs = handle.refs.get();
    if refs > 1 {
        handle.refs.set(refs - 1);
    } else {
        drop(Box::from_raw(value as *mut ValueHandle));
    }
}

/// # Safety
/// - `value` must be null or a live value handle
#[no_mangle]
pub unsafe extern "C" fn JSValueAsInt(
    ctx: *mut JSContext,
    value: *mut JSValue,
    err: *mut JSRuntimeError,
) -> c_int {
    guarded(ctx, ptr::null_mut(), err, 0, |h| Ok(restore(h, value)?.as_int()?))
}

/// # Safety
/// - `value` must be null or a live value handle
#[no_mangle]
pub unsafe extern "C" fn JSValueAsDouble(
    ctx: *mut JSContext,
    value: *mut JSValue,
    err: *mut JSRuntimeError,
) -> f64 {
    guarded(ctx, ptr::null_mut(), err, 0.0, |h| Ok(restore(h, value)?.as_double()?))
}

/// # Safety
/// - `value` must be null or a live value handle
#[no_mangle]
pub unsafe extern "C" fn JSValueAsBool(
    ctx: *mut JSContext,
    value: *mut JSValue,
    err: *mut JSRuntimeError,
) -> bool {
    guarded(ctx, ptr::null_mut(), err, false, |h| Ok(restore(h, value)?.as_bool()?))
}

/// Owned handle to the same value if it is a string; `InvalidCast` otherwise
///
/// # Safety
/// - `value` must be null or a live value handle
#[no_mangle]
pub unsafe extern "C" fn JSValueAsStringCopy(
    ctx: *mut JSContext,
    value: *mut JSValue,
    err: *mut JSRuntimeError,
) -> *mut JSValue {
    guarded(ctx, ptr::null_mut(), err, ptr::null_mut(), |h| {
        Ok(new_value(restore(h, value)?.as_string()?.as_value()))
    })
}

/// Owned handle to the same value if it is object-like
///
/// # Safety
/// - `value` must be null or a live value handle
#[no_mangle]
pub unsafe extern "C" fn JSValueAsObjectCopy(
    ctx: *mut JSContext,
    value: *mut JSValue,
    err: *mut JSRuntimeError,
) -> *mut JSValue {
    guarded(ctx, ptr::null_mut(), err, ptr::null_mut(), |h| {
        Ok(new_value(restore(h, value)?.as_object()?.as_value()))
    })
}

/// # Safety
/// - `value` must be null or a live value handle
#[no_mangle]
pub unsafe extern "C" fn JSValueAsArrayCopy(
    ctx: *mut JSContext,
    value: *mut JSValue,
    err: *mut JSRuntimeError,
) -> *mut JSValue {
    guarded(ctx, ptr::null_mut(), err, ptr::null_mut(), |h| {
        Ok(new_value(restore(h, value)?.as_array()?.as_object().as_value()))
    })
}

/// # Safety
/// - `value` must be null or a live value handle
#[no_mangle]
pub unsafe extern "C" fn JSValueAsFunctionCopy(
    ctx: *mut JSContext,
    value: *mut JSValue,
    err: *mut JSRuntimeError,
) -> *mut JSValue {
    guarded(ctx, ptr::null_mut(), err, ptr::null_mut(), |h| {
        Ok(new_value(restore(h, value)?.as_function()?.as_object().as_value()))
    })
}

/// # Safety
/// - `value` must be null or a live value handle
#[no_mangle]
pub unsafe extern "C" fn JSValueAsExternalCopy(
    ctx: *mut JSContext,
    value: *mut JSValue,
    err: *mut JSRuntimeError,
) -> *mut JSValue {
    guarded(ctx, ptr::null_mut(), err, ptr::null_mut(), |h| {
        Ok(new_value(restore(h, value)?.as_external()?.as_object().as_value()))
    })
}

/// Identity / `===` comparison; never runs script
///
/// # Safety
/// - `a` and `b` must be null or live value handles
#[no_mangle]
pub unsafe extern "C" fn JSValueStrictEquals(
    ctx: *mut JSContext,
    a: *mut JSValue,
    b: *mut JSValue,
    err: *mut JSRuntimeError,
) -> bool {
    guarded(ctx, ptr::null_mut(), err, false, |h| {
        Ok(restore(h, a)?.strict_equals(&restore(h, b)?))
    })
}

/// Script `==` comparison; may run `valueOf`/`toString` and throw
///
/// # Safety
/// - `a` and `b` must be null or live value handles
#[no_mangle]
pub unsafe extern "C" fn JSValueEquals(
    ctx: *mut JSContext,
    a: *mut JSValue,
    b: *mut JSValue,
    exception: *mut *mut JSScriptException,
    err: *mut JSRuntimeError,
) -> bool {
    guarded(ctx, exception, err, false, |h| {
        restore(h, a)?.equals(&restore(h, b)?)
    })
}

/// # Safety
/// - `ctx` must be null or a context returned by `CreateJSContext`
#[no_mangle]
pub unsafe extern "C" fn JSNull(ctx: *mut JSContext) -> *mut JSValue {
    guarded(ctx, ptr::null_mut(), ptr::null_mut(), ptr::null_mut(), |h| {
        Ok(new_value(&Value::null(&h.ctx)))
    })
}

/// # Safety
/// - `ctx` must be null or a context returned by `CreateJSContext`
#[no_mangle]
pub unsafe extern "C" fn CreateJSInt(ctx: *mut JSContext, value: c_int) -> *mut JSValue {
    guarded(ctx, ptr::null_mut(), ptr::null_mut(), ptr::null_mut(), |h| {
        Ok(new_value(&Value::int(&h.ctx, value)))
    })
}

/// # Safety
/// - `ctx` must be null or a context returned by `CreateJSContext`
#[no_mangle]
pub unsafe extern "C" fn CreateJSDouble(ctx: *mut JSContext, value: f64) -> *mut JSValue {
    guarded(ctx, ptr::null_mut(), ptr::null_mut(), ptr::null_mut(), |h| {
        Ok(new_value(&Value::double(&h.ctx, value)))
    })
}

/// # Safety
/// - `ctx` must be null or a context returned by `CreateJSContext`
#[no_mangle]
pub unsafe extern "C" fn CreateJSBool(ctx: *mut JSContext, value: bool) -> *mut JSValue {
    guarded(ctx, ptr::null_mut(), ptr::null_mut(), ptr::null_mut(), |h| {
        Ok(new_value(&Value::bool(&h.ctx, value)))
    })
}

// ============================================================================
// Strings
// ============================================================================

/// Create a string from `len` UTF-16 code units
///
/// Unpaired surrogates fail with `TypeError`; oversized input fails with
/// `StringTooLong`.
///
/// # Safety
/// - `utf16` must be valid for reads of `len` units (may be null when `len`
///   is zero)
#[no_mangle]
pub unsafe extern "C" fn CreateJSString(
    ctx: *mut JSContext,
    utf16: *const u16,
    len: c_int,
    err: *mut JSRuntimeError,
) -> *mut JSValue {
    guarded(ctx, ptr::null_mut(), err, ptr::null_mut(), |h| {
        if len < 0 || (utf16.is_null() && len > 0) {
            return Err(type_error("invalid UTF-16 buffer"));
        }
        let units: &[u16] = if len == 0 {
            &[]
        } else {
            slice::from_raw_parts(utf16, len as usize)
        };
        let string = JsString::from_utf16(&h.ctx, units)?;
        Ok(new_value(string.as_value()))
    })
}

/// Length of a string in UTF-16 code units, or -1 on failure
///
/// # Safety
/// - `string` must be null or a live value handle
#[no_mangle]
pub unsafe extern "C" fn JSStringLength(
    ctx: *mut JSContext,
    string: *mut JSValue,
    err: *mut JSRuntimeError,
) -> c_int {
    guarded(ctx, ptr::null_mut(), err, -1, |h| {
        Ok(clamp_len(restore(h, string)?.as_string()?.utf16_len()?))
    })
}

/// Copy up to `len` UTF-16 code units into `buffer`
///
/// # Returns
/// * Number of units written, or -1 on failure
///
/// # Safety
/// - `buffer` must be valid for writes of `len` units
#[no_mangle]
pub unsafe extern "C" fn WriteJSStringBuffer(
    ctx: *mut JSContext,
    string: *mut JSValue,
    buffer: *mut u16,
    len: c_int,
    err: *mut JSRuntimeError,
) -> c_int {
    guarded(ctx, ptr::null_mut(), err, -1, |h| {
        if len < 0 || (buffer.is_null() && len > 0) {
            return Err(type_error("invalid output buffer"));
        }
        let string = restore(h, string)?.as_string()?;
        if len == 0 {
            return Ok(0);
        }
        let out = slice::from_raw_parts_mut(buffer, len as usize);
        Ok(clamp_len(string.write_utf16(out)?))
    })
}

// ============================================================================
// Objects
// ============================================================================

/// Owned handle to `object[key]`; a missing property yields `undefined`
///
/// # Safety
/// - `key` must be null or a valid null-terminated string
#[no_mangle]
pub unsafe extern "C" fn CopyJSObjectProperty(
    ctx: *mut JSContext,
    object: *mut JSValue,
    key: *const c_char,
    exception: *mut *mut JSScriptException,
    err: *mut JSRuntimeError,
) -> *mut JSValue {
    guarded(ctx, exception, err, ptr::null_mut(), |h| {
        let object = restore(h, object)?.as_object()?;
        Ok(new_value(&object.get(text(key, "key")?)?))
    })
}

/// Set `object[key] = value`
///
/// # Returns
/// * 0 on success, -1 on failure
///
/// # Safety
/// - `key` must be null or a valid null-terminated string
#[no_mangle]
pub unsafe extern "C" fn SetJSObjectProperty(
    ctx: *mut JSContext,
    object: *mut JSValue,
    key: *const c_char,
    value: *mut JSValue,
    exception: *mut *mut JSScriptException,
    err: *mut JSRuntimeError,
) -> c_int {
    guarded(ctx, exception, err, -1, |h| {
        let object = restore(h, object)?.as_object()?;
        object.set(text(key, "key")?, &restore(h, value)?)?;
        Ok(0)
    })
}

/// Owned array of the object's own enumerable string keys
///
/// # Safety
/// - `object` must be null or a live value handle
#[no_mangle]
pub unsafe extern "C" fn CopyJSObjectOwnPropertyNames(
    ctx: *mut JSContext,
    object: *mut JSValue,
    exception: *mut *mut JSScriptException,
    err: *mut JSRuntimeError,
) -> *mut JSValue {
    guarded(ctx, exception, err, ptr::null_mut(), |h| {
        let keys = restore(h, object)?.as_object()?.keys()?;
        Ok(new_value(keys.as_object().as_value()))
    })
}

/// # Safety
/// - `key` must be null or a valid null-terminated string
#[no_mangle]
pub unsafe extern "C" fn JSObjectHasProperty(
    ctx: *mut JSContext,
    object: *mut JSValue,
    key: *const c_char,
    exception: *mut *mut JSScriptException,
    err: *mut JSRuntimeError,
) -> bool {
    guarded(ctx, exception, err, false, |h| {
        restore(h, object)?.as_object()?.has(text(key, "key")?)
    })
}

/// `object instanceof constructor`
///
/// # Safety
/// - `object` and `constructor` must be null or live value handles
#[no_mangle]
pub unsafe extern "C" fn JSObjectInstanceOf(
    ctx: *mut JSContext,
    object: *mut JSValue,
    constructor: *mut JSValue,
    exception: *mut *mut JSScriptException,
    err: *mut JSRuntimeError,
) -> bool {
    guarded(ctx, exception, err, false, |h| {
        let constructor = restore(h, constructor)?.as_function()?;
        restore(h, object)?.as_object()?.instance_of(&constructor)
    })
}

/// Call `object[name](...args)` with `this` bound to `object`
///
/// # Safety
/// - `args` must hold `argc` live value handles
#[no_mangle]
pub unsafe extern "C" fn CallJSObjectMethodCreate(
    ctx: *mut JSContext,
    object: *mut JSValue,
    name: *const c_char,
    args: *const *mut JSValue,
    argc: c_int,
    exception: *mut *mut JSScriptException,
    err: *mut JSRuntimeError,
) -> *mut JSValue {
    guarded(ctx, exception, err, ptr::null_mut(), |h| {
        let object = restore(h, object)?.as_object()?;
        let args = restore_args(h, args, argc)?;
        Ok(new_value(&object.call_method(text(name, "method name")?, &args)?))
    })
}

/// # Safety
/// - `ctx` must be null or a context returned by `CreateJSContext`
#[no_mangle]
pub unsafe extern "C" fn CreateJSObject(
    ctx: *mut JSContext,
    err: *mut JSRuntimeError,
) -> *mut JSValue {
    guarded(ctx, ptr::null_mut(), err, ptr::null_mut(), |h| {
        Ok(new_value(Object::new(&h.ctx)?.as_value()))
    })
}

// ============================================================================
// Arrays
// ============================================================================

/// # Safety
/// - `array` must be null or a live value handle
#[no_mangle]
pub unsafe extern "C" fn CopyJSArrayPropertyAtIndex(
    ctx: *mut JSContext,
    array: *mut JSValue,
    index: c_int,
    exception: *mut *mut JSScriptException,
    err: *mut JSRuntimeError,
) -> *mut JSValue {
    guarded(ctx, exception, err, ptr::null_mut(), |h| {
        let index = u32::try_from(index).map_err(|_| type_error("negative array index"))?;
        Ok(new_value(&restore(h, array)?.as_array()?.get(index)?))
    })
}

/// # Returns
/// * 0 on success, -1 on failure
///
/// # Safety
/// - `array` and `value` must be null or live value handles
#[no_mangle]
pub unsafe extern "C" fn SetJSArrayPropertyAtIndex(
    ctx: *mut JSContext,
    array: *mut JSValue,
    index: c_int,
    value: *mut JSValue,
    exception: *mut *mut JSScriptException,
    err: *mut JSRuntimeError,
) -> c_int {
    guarded(ctx, exception, err, -1, |h| {
        let index = u32::try_from(index).map_err(|_| type_error("negative array index"))?;
        let array = restore(h, array)?.as_array()?;
        array.set(index, &restore(h, value)?)?;
        Ok(0)
    })
}

/// Array length, or -1 on failure
///
/// # Safety
/// - `array` must be null or a live value handle
#[no_mangle]
pub unsafe extern "C" fn JSArrayLength(
    ctx: *mut JSContext,
    array: *mut JSValue,
    exception: *mut *mut JSScriptException,
    err: *mut JSRuntimeError,
) -> c_int {
    guarded(ctx, exception, err, -1, |h| {
        let len = restore(h, array)?.as_array()?.len()?;
        Ok(clamp_len(len as usize))
    })
}

/// # Safety
/// - `ctx` must be null or a context returned by `CreateJSContext`
#[no_mangle]
pub unsafe extern "C" fn CreateJSArray(
    ctx: *mut JSContext,
    err: *mut JSRuntimeError,
) -> *mut JSValue {
    guarded(ctx, ptr::null_mut(), err, ptr::null_mut(), |h| {
        Ok(new_value(Array::new(&h.ctx)?.as_object().as_value()))
    })
}

// ============================================================================
// Functions
// ============================================================================

/// Call a function
///
/// # Arguments
/// * `this_object` - Receiver, or null for `undefined`
/// * `args` / `argc` - Borrowed argument handles
///
/// # Safety
/// - `args` must hold `argc` live value handles
#[no_mangle]
pub unsafe extern "C" fn CallJSFunctionCreate(
    ctx: *mut JSContext,
    function: *mut JSValue,
    this_object: *mut JSValue,
    args: *const *mut JSValue,
    argc: c_int,
    exception: *mut *mut JSScriptException,
    err: *mut JSRuntimeError,
) -> *mut JSValue {
    guarded(ctx, exception, err, ptr::null_mut(), |h| {
        let function = restore(h, function)?.as_function()?;
        let receiver = if this_object.is_null() {
            None
        } else {
            Some(restore(h, this_object)?.as_object()?)
        };
        let args = restore_args(h, args, argc)?;
        Ok(new_value(&function.call(receiver.as_ref(), &args)?))
    })
}

/// `new function(...args)`
///
/// # Safety
/// - `args` must hold `argc` live value handles
#[no_mangle]
pub unsafe extern "C" fn ConstructJSFunctionCreate(
    ctx: *mut JSContext,
    function: *mut JSValue,
    args: *const *mut JSValue,
    argc: c_int,
    exception: *mut *mut JSScriptException,
    err: *mut JSRuntimeError,
) -> *mut JSValue {
    guarded(ctx, exception, err, ptr::null_mut(), |h| {
        let function = restore(h, function)?.as_function()?;
        let args = restore_args(h, args, argc)?;
        Ok(new_value(function.construct(&args)?.as_value()))
    })
}

/// Wrap a C function as a script-callable function
///
/// The context's callback finalizer runs with `data` once the function is
/// unreachable or the context is released. If creation fails, `data` stays
/// owned by the caller.
///
/// # Safety
/// - `callback` must be safe to call with `data` until the finalizer runs
#[no_mangle]
pub unsafe extern "C" fn CreateJSCallback(
    ctx: *mut JSContext,
    data: *mut c_void,
    callback: Option<JSCallback>,
    err: *mut JSRuntimeError,
) -> *mut JSValue {
    guarded(ctx, ptr::null_mut(), err, ptr::null_mut(), |h| {
        let callback = callback.ok_or_else(|| type_error("callback is null"))?;
        let foreign = ForeignCallback {
            context: ctx,
            data,
            callback,
            finalizer: h.callback_finalizer,
        };
        let function = Function::from_callback(&h.ctx, Box::new(foreign))?;
        Ok(new_value(function.as_object().as_value()))
    })
}

// ============================================================================
// Externals and Buffers
// ============================================================================

/// Wrap a host pointer; the external finalizer frees it once collected
///
/// # Safety
/// - `ctx` must be null or a context returned by `CreateJSContext`
#[no_mangle]
pub unsafe extern "C" fn CreateJSExternal(
    ctx: *mut JSContext,
    pointer: *mut c_void,
    err: *mut JSRuntimeError,
) -> *mut JSValue {
    guarded(ctx, ptr::null_mut(), err, ptr::null_mut(), |h| {
        Ok(new_value(External::new(&h.ctx, pointer)?.as_object().as_value()))
    })
}

/// Pointer wrapped by an external
///
/// # Safety
/// - `external` must be null or a live value handle
#[no_mangle]
pub unsafe extern "C" fn GetJSExternalValue(
    ctx: *mut JSContext,
    external: *mut JSValue,
    err: *mut JSRuntimeError,
) -> *mut c_void {
    guarded(ctx, ptr::null_mut(), err, ptr::null_mut(), |h| {
        Ok(restore(h, external)?.as_external()?.value())
    })
}

/// Expose `len` bytes at `data` to script as an `ArrayBuffer` without copying
///
/// # Safety
/// - `data` must be valid for reads and writes of `len` bytes until
///   `finalizer` runs, or until the context is released when it is null
#[no_mangle]
pub unsafe extern "C" fn CreateExternalJSArrayBuffer(
    ctx: *mut JSContext,
    data: *mut u8,
    len: usize,
    finalizer: Option<JSBufferFinalizer>,
    err: *mut JSRuntimeError,
) -> *mut JSValue {
    guarded(ctx, ptr::null_mut(), err, ptr::null_mut(), |h| {
        if data.is_null() && len > 0 {
            return Err(type_error("buffer data is null"));
        }
        let freer = finalizer.map(|free| -> BufferFreer {
            Box::new(move |data, len| unsafe { free(data, len) })
        });
        let buffer = Object::new_external_array_buffer(&h.ctx, data, len, freer)?;
        Ok(new_value(buffer.as_value()))
    })
}

/// Backing store of an `ArrayBuffer` created over host memory
///
/// Returns null (and writes 0 to `len`) for anything else, including
/// buffers the engine allocated; this is not an error.
///
/// # Safety
/// - `len` must be null or valid for writes
#[no_mangle]
pub unsafe extern "C" fn GetJSObjectArrayBufferData(
    ctx: *mut JSContext,
    object: *mut JSValue,
    len: *mut usize,
    err: *mut JSRuntimeError,
) -> *mut u8 {
    if !len.is_null() {
        *len = 0;
    }
    guarded(ctx, ptr::null_mut(), err, ptr::null_mut(), |h| {
        let data = restore(h, object)?
            .downcast::<Object>()
            .and_then(|object| object.array_buffer_data());
        Ok(match data {
            Some((data, size)) => {
                if !len.is_null() {
                    *len = size;
                }
                data
            }
            None => ptr::null_mut(),
        })
    })
}

// ============================================================================
// Script Exceptions
// ============================================================================

/// # Safety
/// - `exception` must be null or a live exception handle
#[no_mangle]
pub unsafe extern "C" fn RetainJSScriptException(exception: *mut JSScriptException) {
    if let Some(handle) = exception_ref(exception) {
        handle.refs.set(handle.refs.get() + 1);
    }
}

/// # Safety
/// - `exception` must be null or a live exception handle
#[no_mangle]
pub unsafe extern "C" fn ReleaseJSScriptException(exception: *mut JSScriptException) {
    let Some(handle) = exception_ref(exception) else {
        return;
    };
    let refs = handle.refs.get();
    if refs > 1 {
        handle.refs.set(refs - 1);
    } else {
        drop(Box::from_raw(exception as *mut ExceptionHandle));
    }
}

/// Owned handle to the thrown value
///
/// # Safety
/// - `exception` must be null or a live exception handle
#[no_mangle]
pub unsafe extern "C" fn CopyJSScriptExceptionValue(
    exception: *mut JSScriptException,
) -> *mut JSValue {
    let Some(handle) = exception_ref(exception) else {
        return ptr::null_mut();
    };
    let value = Box::new(ValueHandle {
        value: handle.value.clone(),
        refs: Cell::new(1),
    });
    Box::into_raw(value) as *mut JSValue
}

/// Message text; free with `FreeJSCString`
///
/// # Safety
/// - `exception` must be null or a live exception handle
#[no_mangle]
pub unsafe extern "C" fn CopyJSScriptExceptionMessage(
    exception: *mut JSScriptException,
) -> *mut c_char {
    match exception_ref(exception) {
        Some(handle) => rust_to_c_string(&handle.message),
        None => ptr::null_mut(),
    }
}

/// File name, or null when unknown; free with `FreeJSCString`
///
/// # Safety
/// - `exception` must be null or a live exception handle
#[no_mangle]
pub unsafe extern "C" fn CopyJSScriptExceptionFileName(
    exception: *mut JSScriptException,
) -> *mut c_char {
    match exception_ref(exception).and_then(|h| h.file_name.as_deref()) {
        Some(name) => rust_to_c_string(name),
        None => ptr::null_mut(),
    }
}

/// Stack trace, or null when unknown; free with `FreeJSCString`
///
/// # Safety
/// - `exception` must be null or a live exception handle
#[no_mangle]
pub unsafe extern "C" fn CopyJSScriptExceptionStackTrace(
    exception: *mut JSScriptException,
) -> *mut c_char {
    match exception_ref(exception).and_then(|h| h.stack_trace.as_deref()) {
        Some(stack) => rust_to_c_string(stack),
        None => ptr::null_mut(),
    }
}

/// Offending source line, or null when unknown; free with `FreeJSCString`
///
/// # Safety
/// - `exception` must be null or a live exception handle
#[no_mangle]
pub unsafe extern "C" fn CopyJSScriptExceptionSourceLine(
    exception: *mut JSScriptException,
) -> *mut c_char {
    match exception_ref(exception).and_then(|h| h.source_line.as_deref()) {
        Some(line) => rust_to_c_string(line),
        None => ptr::null_mut(),
    }
}

/// One-based line number, or -1 when unknown
///
/// # Safety
/// - `exception` must be null or a live exception handle
#[no_mangle]
pub unsafe extern "C" fn GetJSScriptExceptionLineNumber(exception: *mut JSScriptException) -> c_int {
    exception_ref(exception)
        .and_then(|h| h.line_number)
        .and_then(|line| c_int::try_from(line).ok())
        .unwrap_or(-1)
}

/// Free a string returned by a `Copy*` function
///
/// # Safety
/// - `s` must be null or a string returned by this library, freed once
#[no_mangle]
pub unsafe extern "C" fn FreeJSCString(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn c(s: &str) -> CString {
        CString::new(s).unwrap()
    }

    unsafe fn eval(ctx: *mut JSContext, code: &str) -> *mut JSValue {
        let file = c("test.js");
        let code = c(code);
        let mut exception: *mut JSScriptException = ptr::null_mut();
        let mut err = JSRuntimeError::NoError;
        let value = JSContextEvaluateCreate(ctx, file.as_ptr(), code.as_ptr(), &mut exception, &mut err);
        assert!(exception.is_null(), "unexpected exception");
        assert_eq!(err, JSRuntimeError::NoError);
        value
    }

    unsafe fn take_string(s: *mut c_char) -> String {
        assert!(!s.is_null());
        let owned = CStr::from_ptr(s).to_string_lossy().into_owned();
        FreeJSCString(s);
        owned
    }

    #[test]
    fn test_context_lifecycle() {
        unsafe {
            let ctx = CreateJSContext(None, None);
            assert!(!ctx.is_null());
            RetainJSContext(ctx);
            ReleaseJSContext(ctx);
            assert!(context_ref(ctx).is_some());
            ReleaseJSContext(ctx);
            assert!(context_ref(ctx).is_none());
        }
    }

    #[test]
    fn test_evaluate_and_read_int() {
        unsafe {
            let ctx = CreateJSContext(None, None);
            let value = eval(ctx, "(function(x, y) { return x + y; })(3, 4)");
            assert_eq!(GetJSValueType(value), JSType::Int);
            let mut err = JSRuntimeError::NoError;
            assert_eq!(JSValueAsInt(ctx, value, &mut err), 7);
            assert_eq!(err, JSRuntimeError::NoError);

            JSValueAsBool(ctx, value, &mut err);
            assert_eq!(err, JSRuntimeError::InvalidCast);
            ReleaseJSValue(value);
            ReleaseJSContext(ctx);
        }
    }

    #[test]
    fn test_syntax_error_exception() {
        unsafe {
            let ctx = CreateJSContext(None, None);
            let file = c("bad.js");
            let code = c("a...");
            let mut exception: *mut JSScriptException = ptr::null_mut();
            let mut err = JSRuntimeError::NoError;
            let value =
                JSContextEvaluateCreate(ctx, file.as_ptr(), code.as_ptr(), &mut exception, &mut err);
            assert!(value.is_null());
            assert!(!exception.is_null());
            let message = take_string(CopyJSScriptExceptionMessage(exception));
            assert!(!message.is_empty());
            ReleaseJSScriptException(exception);
            ReleaseJSContext(ctx);
        }
    }

    #[test]
    fn test_null_code_is_type_error() {
        unsafe {
            let ctx = CreateJSContext(None, None);
            let file = c("null.js");
            let mut err = JSRuntimeError::NoError;
            let value =
                JSContextEvaluateCreate(ctx, file.as_ptr(), ptr::null(), ptr::null_mut(), &mut err);
            assert!(value.is_null());
            assert_eq!(err, JSRuntimeError::TypeError);
            ReleaseJSContext(ctx);
        }
    }

    #[test]
    fn test_utf16_string_roundtrip() {
        unsafe {
            let ctx = CreateJSContext(None, None);
            let units: Vec<u16> = "héllo 🌍".encode_utf16().collect();
            let mut err = JSRuntimeError::NoError;
            let s = CreateJSString(ctx, units.as_ptr(), units.len() as c_int, &mut err);
            assert_eq!(GetJSValueType(s), JSType::String);
            assert_eq!(JSStringLength(ctx, s, &mut err), units.len() as c_int);

            let mut out = vec![0u16; units.len()];
            let written = WriteJSStringBuffer(ctx, s, out.as_mut_ptr(), out.len() as c_int, &mut err);
            assert_eq!(written as usize, units.len());
            assert_eq!(out, units);
            ReleaseJSValue(s);

            let lone = [0xD800u16];
            let bad = CreateJSString(ctx, lone.as_ptr(), 1, &mut err);
            assert!(bad.is_null());
            assert_eq!(err, JSRuntimeError::TypeError);
            ReleaseJSContext(ctx);
        }
    }

    #[test]
    fn test_object_properties() {
        unsafe {
            let ctx = CreateJSContext(None, None);
            let mut err = JSRuntimeError::NoError;
            let obj = CreateJSObject(ctx, &mut err);
            let one = CreateJSInt(ctx, 1);
            let key = c("answer");
            assert_eq!(SetJSObjectProperty(ctx, obj, key.as_ptr(), one, ptr::null_mut(), &mut err), 0);
            assert!(JSObjectHasProperty(ctx, obj, key.as_ptr(), ptr::null_mut(), &mut err));

            let back = CopyJSObjectProperty(ctx, obj, key.as_ptr(), ptr::null_mut(), &mut err);
            assert!(JSValueStrictEquals(ctx, back, one, &mut err));

            let names = CopyJSObjectOwnPropertyNames(ctx, obj, ptr::null_mut(), &mut err);
            assert_eq!(GetJSValueType(names), JSType::Array);
            assert_eq!(JSArrayLength(ctx, names, ptr::null_mut(), &mut err), 1);

            for v in [obj, one, back, names] {
                ReleaseJSValue(v);
            }
            ReleaseJSContext(ctx);
        }
    }

    thread_local! {
        static FINALIZED: RefCell<Vec<usize>> = RefCell::new(Vec::new());
    }

    unsafe extern "C" fn record_finalized(data: *mut c_void) {
        FINALIZED.with(|f| f.borrow_mut().push(data as usize));
    }

    unsafe extern "C" fn add_callback(
        ctx: *mut JSContext,
        _data: *mut c_void,
        args: *const *mut JSValue,
        argc: c_int,
        _error: *mut *mut JSValue,
    ) -> *mut JSValue {
        let args = slice::from_raw_parts(args, argc as usize);
        let mut sum = 0;
        for &arg in args {
            sum += JSValueAsInt(ctx, arg, ptr::null_mut());
        }
        CreateJSInt(ctx, sum)
    }

    unsafe extern "C" fn throwing_callback(
        ctx: *mut JSContext,
        _data: *mut c_void,
        _args: *const *mut JSValue,
        _argc: c_int,
        error: *mut *mut JSValue,
    ) -> *mut JSValue {
        *error = CreateJSInt(ctx, 99);
        ptr::null_mut()
    }

    #[test]
    fn test_callback_called_and_finalized() {
        unsafe {
            let ctx = CreateJSContext(Some(record_finalized), None);
            let mut err = JSRuntimeError::NoError;
            let add = CreateJSCallback(ctx, 0x51 as *mut c_void, Some(add_callback), &mut err);
            assert_eq!(GetJSValueType(add), JSType::Function);

            let args = [CreateJSInt(ctx, 3), CreateJSInt(ctx, 4)];
            let result = CallJSFunctionCreate(
                ctx,
                add,
                ptr::null_mut(),
                args.as_ptr(),
                2,
                ptr::null_mut(),
                &mut err,
            );
            assert_eq!(JSValueAsInt(ctx, result, &mut err), 7);
            for v in args {
                ReleaseJSValue(v);
            }
            ReleaseJSValue(result);
            ReleaseJSValue(add);

            ReleaseJSContext(ctx);
            FINALIZED.with(|f| assert!(f.borrow().contains(&0x51)));
        }
    }

    #[test]
    fn test_callback_error_is_thrown() {
        unsafe {
            let ctx = CreateJSContext(None, None);
            let mut err = JSRuntimeError::NoError;
            let thrower = CreateJSCallback(ctx, ptr::null_mut(), Some(throwing_callback), &mut err);
            let global = JSContextCopyGlobalObject(ctx, &mut err);
            let name = c("thrower");
            SetJSObjectProperty(ctx, global, name.as_ptr(), thrower, ptr::null_mut(), &mut err);

            let caught = eval(ctx, "try { thrower(); 0 } catch (e) { e + 1 }");
            assert_eq!(JSValueAsInt(ctx, caught, &mut err), 100);
            for v in [thrower, global, caught] {
                ReleaseJSValue(v);
            }
            ReleaseJSContext(ctx);
        }
    }

    #[test]
    fn test_value_after_context_release() {
        unsafe {
            let ctx = CreateJSContext(None, None);
            let value = eval(ctx, "({})");
            ReleaseJSContext(ctx);

            let mut err = JSRuntimeError::NoError;
            assert!(JSValueAsObjectCopy(ctx, value, &mut err).is_null());
            assert_eq!(err, JSRuntimeError::TypeError);

            let other = CreateJSContext(None, None);
            assert!(JSValueAsObjectCopy(other, value, &mut err).is_null());
            assert_eq!(err, JSRuntimeError::TypeError);
            ReleaseJSValue(value);
            ReleaseJSContext(other);
        }
    }

    #[test]
    fn test_version_is_static() {
        unsafe {
            let version = CStr::from_ptr(GetJSEngineVersion()).to_str().unwrap();
            assert!(version.starts_with("QuickJS"));
        }
    }
}

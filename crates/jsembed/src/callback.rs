//! Host callbacks callable from script
//!
//! The engine's collector cannot see host references, so every bound
//! callback lives in the runtime's retain table under an integer token.
//! The engine object only stores the token. `retain` fires when the token
//! is allocated and `release` fires from the engine finalizer, once the
//! function object is unreachable or the context is released.

use std::cell::{Cell, RefCell};
use std::ffi::{c_int, c_void};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::rc::Rc;

use rquickjs_sys as qjs;
use rustc_hash::FxHashMap;

use crate::context::Context;
use crate::error::{Error, Result, RuntimeError};
use crate::exception::ScriptException;
use crate::function::Function;
use crate::raw;
use crate::store::RuntimeStore;
use crate::value::Value;

// ============================================================================
// Public API
// ============================================================================

/// Outcome of a host callback: `Ok(None)` returns `undefined` to script
pub type CallbackResult<'c> = std::result::Result<Option<Value<'c>>, CallbackError<'c>>;

/// Failure raised by a host callback; script sees it as a thrown value
#[derive(Debug)]
pub enum CallbackError<'c> {
    /// Throw this value as is
    Throw(Value<'c>),
    /// Throw a new `Error` with this message
    Message(String),
    /// Throw a `TypeError` describing a marshaling failure
    Runtime(RuntimeError),
}

impl<'c> CallbackError<'c> {
    /// Throw a new `Error` with `message`
    pub fn message(message: impl Into<String>) -> Self {
        CallbackError::Message(message.into())
    }
}

impl fmt::Display for CallbackError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackError::Throw(value) => write!(f, "thrown {:?}", value),
            CallbackError::Message(message) => f.write_str(message),
            CallbackError::Runtime(error) => write!(f, "{}", error),
        }
    }
}

impl<'c> From<RuntimeError> for CallbackError<'c> {
    fn from(error: RuntimeError) -> Self {
        CallbackError::Runtime(error)
    }
}

impl<'c> From<ScriptException<'c>> for CallbackError<'c> {
    fn from(exception: ScriptException<'c>) -> Self {
        CallbackError::Throw(exception.into_value())
    }
}

impl<'c> From<Error<'c>> for CallbackError<'c> {
    /// Script exceptions from nested calls are rethrown unchanged
    fn from(error: Error<'c>) -> Self {
        match error {
            Error::Script(exception) => CallbackError::Throw(exception.into_value()),
            Error::Runtime(error) => CallbackError::Runtime(error),
            Error::Marshal(error) => CallbackError::Message(error.to_string()),
            Error::Handled => CallbackError::message("nested failure was delivered to a handler"),
        }
    }
}

/// A host capability callable from script
///
/// `retain` and `release` bracket the period in which script can reach
/// the callback. Hosts with their own reference counting use them to keep
/// the underlying object alive; the default implementations do nothing.
pub trait Callback {
    /// Handle one invocation. `args` are valid only for this call.
    fn call<'c>(&self, ctx: &'c Context, args: &[Value<'c>]) -> CallbackResult<'c>;

    /// The engine took a reference reachable from script
    fn retain(&self) {}

    /// The engine dropped its last reference
    fn release(&self) {}
}

// ============================================================================
// Retain table
// ============================================================================

type ClosureFn = dyn for<'a> Fn(&'a Context, &[Value<'a>]) -> CallbackResult<'a>;

pub(crate) enum CallbackKind {
    Closure(Box<ClosureFn>),
    Host(Box<dyn Callback>),
}

impl CallbackKind {
    fn call<'c>(&self, ctx: &'c Context, args: &[Value<'c>]) -> CallbackResult<'c> {
        match self {
            CallbackKind::Closure(f) => f(ctx, args),
            CallbackKind::Host(callback) => callback.call(ctx, args),
        }
    }

    fn retain(&self) {
        if let CallbackKind::Host(callback) = self {
            callback.retain();
        }
    }

    fn release(&self) {
        if let CallbackKind::Host(callback) = self {
            callback.release();
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            CallbackKind::Closure(_) => "closure",
            CallbackKind::Host(_) => "host",
        }
    }
}

/// Token-keyed set of callbacks reachable from script
#[derive(Default)]
pub(crate) struct RetainTable {
    entries: RefCell<FxHashMap<u64, Rc<CallbackKind>>>,
    last_token: Cell<u64>,
}

impl RetainTable {
    /// Retain `kind` and return its token (never zero)
    fn insert(&self, kind: CallbackKind) -> u64 {
        let token = self.last_token.get() + 1;
        self.last_token.set(token);
        kind.retain();
        self.entries.borrow_mut().insert(token, Rc::new(kind));
        token
    }

    fn get(&self, token: u64) -> Option<Rc<CallbackKind>> {
        self.entries.borrow().get(&token).cloned()
    }

    fn remove(&self, token: u64) -> Option<Rc<CallbackKind>> {
        self.entries.borrow_mut().remove(&token)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }
}

// ============================================================================
// Engine class
// ============================================================================

pub(crate) fn class_def() -> qjs::JSClassDef {
    qjs::JSClassDef {
        class_name: c"Callback".as_ptr(),
        finalizer: Some(finalize),
        gc_mark: None,
        call: Some(trampoline),
        exotic: ptr::null_mut(),
    }
}

/// Bind `kind` to a new callable engine object
pub(crate) fn bind(ctx: &Context, kind: CallbackKind) -> Result<'_, Function<'_>> {
    // the intrinsic prototype, whatever script did to the global `Function`
    let proto = unsafe { Value::from_raw(ctx, qjs::JS_GetFunctionProto(ctx.raw())) };

    let store = ctx.store();
    let raw = unsafe {
        qjs::JS_NewObjectProtoClass(ctx.raw(), proto.as_raw(), store.classes.callback as _)
    };
    let object = ctx.wrap(raw)?;

    let kind_name = kind.kind_name();
    let token = store.callbacks.insert(kind);
    unsafe { qjs::JS_SetOpaque(object.as_raw(), token as usize as *mut c_void) };

    tracing::debug!(
        target: "jsembed::callback",
        context = %ctx.id(),
        token,
        kind = kind_name,
        "callback bound"
    );
    Ok(Function::from_value_unchecked(object))
}

unsafe fn token_of(value: qjs::JSValue, store: &RuntimeStore) -> u64 {
    qjs::JS_GetOpaque(value, store.classes.callback) as usize as u64
}

unsafe extern "C" fn finalize(rt: *mut qjs::JSRuntime, value: qjs::JSValue) {
    let Some(store) = RuntimeStore::from_runtime(rt) else {
        return;
    };
    let token = token_of(value, store);
    let Some(kind) = store.callbacks.remove(token) else {
        return;
    };
    let outcome = panic::catch_unwind(AssertUnwindSafe(move || {
        kind.release();
        drop(kind);
    }));
    match outcome {
        Ok(()) => tracing::debug!(target: "jsembed::callback", token, "callback released"),
        Err(_) => tracing::error!(target: "jsembed::callback", token, "callback release panicked"),
    }
}

unsafe extern "C" fn trampoline(
    ctx: *mut qjs::JSContext,
    func_obj: qjs::JSValue,
    _this: qjs::JSValue,
    argc: c_int,
    argv: *mut qjs::JSValue,
    _flags: c_int,
) -> qjs::JSValue {
    let Some(store) = RuntimeStore::from_runtime(qjs::JS_GetRuntime(ctx)) else {
        return raw::throw_internal_error(ctx, "callback invoked on a runtime without a host store");
    };
    let token = token_of(func_obj, store);
    let Some(kind) = store.callbacks.get(token) else {
        return raw::throw_internal_error(ctx, "callback invoked after release");
    };
    let Some(core) = store.core() else {
        return raw::throw_internal_error(ctx, "callback invoked while the context is released");
    };

    let context = Context::from_core(core);
    let args: &[qjs::JSValue] = if argc > 0 && !argv.is_null() {
        std::slice::from_raw_parts(argv, argc as usize)
    } else {
        &[]
    };
    invoke(&context, &kind, args)
}

fn invoke(ctx: &Context, kind: &CallbackKind, raw_args: &[qjs::JSValue]) -> qjs::JSValue {
    // per-call copies; the engine keeps its own references to argv
    let args: Vec<Value<'_>> = raw_args
        .iter()
        .map(|&raw| unsafe { Value::from_raw(ctx, qjs::JS_DupValueRT(ctx.runtime(), raw)) })
        .collect();

    let _depth = ctx.enter_callback();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| kind.call(ctx, &args)));

    match outcome {
        Ok(Ok(None)) => qjs::JS_UNDEFINED,
        Ok(Ok(Some(value))) => match foreign(ctx, &value) {
            Some(message) => unsafe { raw::throw_type_error(ctx.raw(), &message) },
            None => value.into_raw(),
        },
        Ok(Err(CallbackError::Throw(value))) => match foreign(ctx, &value) {
            Some(message) => unsafe { raw::throw_type_error(ctx.raw(), &message) },
            None => unsafe { qjs::JS_Throw(ctx.raw(), value.into_raw()) },
        },
        Ok(Err(CallbackError::Message(message))) => unsafe { raw::throw_error(ctx.raw(), &message) },
        Ok(Err(CallbackError::Runtime(error))) => unsafe {
            raw::throw_type_error(ctx.raw(), &error.to_string())
        },
        Err(_) => {
            tracing::error!(target: "jsembed::callback", context = %ctx.id(), "host callback panicked");
            unsafe { raw::throw_internal_error(ctx.raw(), "host callback panicked") }
        }
    }
}

fn foreign(ctx: &Context, value: &Value<'_>) -> Option<String> {
    let owner = value.context().id();
    (owner != ctx.id()).then(|| format!("callback returned a value from {}", owner))
}

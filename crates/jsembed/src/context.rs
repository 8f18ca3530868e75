//! Execution contexts
//!
//! A [`Context`] owns one isolated engine runtime and everything created
//! under it. Values borrow their context, so using a value after its
//! context is released does not compile. Persistent [`Handle`]s outlive
//! that borrow and detect a released context at runtime instead.
//!
//! [`Handle`]: crate::Handle

use std::cell::{Cell, RefCell};
use std::ffi::{c_void, CString};
use std::fmt;
use std::ptr::{self, NonNull};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use rquickjs_sys as qjs;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::debug::DebugChannel;
use crate::error::{ContextError, Error, Result, RuntimeError};
use crate::exception::ScriptException;
use crate::handle::HandleTable;
use crate::object::Object;
use crate::raw;
use crate::store::{ExternalFreer, RuntimeStore};
use crate::value::Value;

// ============================================================================
// Context Identity
// ============================================================================

/// Unique identifier for a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        ContextId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric id
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

// ============================================================================
// Options
// ============================================================================

/// Engine limits and bookkeeping switches for a new context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextOptions {
    /// Heap limit in bytes (None = unlimited)
    pub memory_limit: Option<usize>,

    /// Native stack budget for script recursion in bytes (None = engine default)
    pub max_stack_size: Option<usize>,

    /// Allocation volume that triggers a collection (None = engine default)
    pub gc_threshold: Option<usize>,

    /// Keep evaluated sources so exceptions can report the offending line
    pub record_sources: bool,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            memory_limit: None,
            max_stack_size: None,
            gc_threshold: None,
            record_sources: true,
        }
    }
}

impl ContextOptions {
    /// Limit the heap to `bytes`
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    /// Limit the native stack used by script to `bytes`
    pub fn with_max_stack_size(mut self, bytes: usize) -> Self {
        self.max_stack_size = Some(bytes);
        self
    }

    /// Set the collection trigger threshold
    pub fn with_gc_threshold(mut self, bytes: usize) -> Self {
        self.gc_threshold = Some(bytes);
        self
    }

    /// Do not keep evaluated sources around
    pub fn without_source_records(mut self) -> Self {
        self.record_sources = false;
        self
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Receives script exceptions raised outside any host callback
pub type ExceptionHandler = dyn for<'c> Fn(&'c Context, ScriptException<'c>);

/// Receives host-side precondition violations
pub type RuntimeErrorHandler = dyn Fn(&Context, &RuntimeError);

// ============================================================================
// Context
// ============================================================================

/// A script on the evaluation stack
struct Evaluation {
    file_name: String,
    source: Option<Rc<str>>,
}

pub(crate) struct ContextCore {
    pub(crate) id: ContextId,
    pub(crate) rt: NonNull<qjs::JSRuntime>,
    pub(crate) ctx: NonNull<qjs::JSContext>,
    store: NonNull<RuntimeStore>,
    options: ContextOptions,
    exception_handler: RefCell<Option<Rc<ExceptionHandler>>>,
    runtime_error_handler: RefCell<Option<Rc<RuntimeErrorHandler>>>,
    pub(crate) handles: HandleTable,
    // first source evaluated under each file name
    sources: RefCell<FxHashMap<String, Rc<str>>>,
    evaluating: RefCell<Vec<Evaluation>>,
    callback_depth: Cell<u32>,
    pub(crate) debug: DebugChannel,
}

impl Drop for ContextCore {
    fn drop(&mut self) {
        let released = unsafe { self.handles.clear(self.rt.as_ptr()) };
        unsafe {
            qjs::JS_FreeContext(self.ctx.as_ptr());
            // runs the remaining finalizers: callback releases, external freers
            qjs::JS_FreeRuntime(self.rt.as_ptr());
            RuntimeStore::destroy(self.store);
        }
        tracing::debug!(context = %self.id, handles = released, "context released");
    }
}

/// One isolated script execution environment
///
/// Dropping the context is the explicit release: every engine object
/// created under it is freed, pending finalizers run, and persistent
/// handles stop resolving.
///
/// # Example
///
/// ```ignore
/// let ctx = Context::new(ContextOptions::default())?;
/// let sum = ctx.evaluate("sum.js", "12 + 13")?;
/// assert_eq!(sum.as_int()?, 25);
/// ```
pub struct Context {
    core: Rc<ContextCore>,
}

impl Context {
    /// Create a context with its own engine runtime
    pub fn new(options: ContextOptions) -> std::result::Result<Self, ContextError> {
        let id = ContextId::next();

        unsafe {
            let rt = NonNull::new(qjs::JS_NewRuntime()).ok_or(ContextError::RuntimeAllocation)?;
            if let Some(limit) = options.memory_limit {
                qjs::JS_SetMemoryLimit(rt.as_ptr(), limit as _);
            }
            if let Some(size) = options.max_stack_size {
                qjs::JS_SetMaxStackSize(rt.as_ptr(), size as _);
            }
            if let Some(threshold) = options.gc_threshold {
                qjs::JS_SetGCThreshold(rt.as_ptr(), threshold as _);
            }

            let store = match RuntimeStore::install(rt.as_ptr()) {
                Ok(store) => store,
                Err(e) => {
                    qjs::JS_FreeRuntime(rt.as_ptr());
                    return Err(e);
                }
            };

            let ctx = match NonNull::new(qjs::JS_NewContext(rt.as_ptr())) {
                Some(ctx) => ctx,
                None => {
                    qjs::JS_FreeRuntime(rt.as_ptr());
                    RuntimeStore::destroy(store);
                    return Err(ContextError::ContextAllocation);
                }
            };

            let core = Rc::new(ContextCore {
                id,
                rt,
                ctx,
                store,
                options,
                exception_handler: RefCell::new(None),
                runtime_error_handler: RefCell::new(None),
                handles: HandleTable::default(),
                sources: RefCell::new(FxHashMap::default()),
                evaluating: RefCell::new(Vec::new()),
                callback_depth: Cell::new(0),
                debug: DebugChannel::default(),
            });
            store.as_ref().bind(Rc::downgrade(&core));

            tracing::debug!(context = %id, "context created");
            Ok(Context { core })
        }
    }

    /// View of a live core, used while the engine calls back into the host
    pub(crate) fn from_core(core: Rc<ContextCore>) -> Self {
        Context { core }
    }

    /// Identifier of this context
    pub fn id(&self) -> ContextId {
        self.core.id
    }

    /// Options the context was created with
    pub fn options(&self) -> &ContextOptions {
        &self.core.options
    }

    pub(crate) fn core(&self) -> &Rc<ContextCore> {
        &self.core
    }

    pub(crate) fn raw(&self) -> *mut qjs::JSContext {
        self.core.ctx.as_ptr()
    }

    pub(crate) fn runtime(&self) -> *mut qjs::JSRuntime {
        self.core.rt.as_ptr()
    }

    pub(crate) fn store(&self) -> &RuntimeStore {
        unsafe { self.core.store.as_ref() }
    }

    // ========================================================================
    // Evaluation
    // ========================================================================

    /// Compile and run `source` as a top-level script
    ///
    /// Parse errors and uncaught throws both surface as
    /// [`Error::Script`]. A file name containing a NUL byte is a
    /// [`RuntimeError::TypeError`] routed to the runtime-error handler.
    pub fn evaluate(&self, file_name: &str, source: &str) -> Result<'_, Value<'_>> {
        self.evaluate_script(file_name, source, true)
    }

    /// Evaluate without keeping `source` once the call returns
    ///
    /// Exceptions thrown by the script itself still report source lines.
    pub(crate) fn evaluate_transient(&self, file_name: &str, source: &str) -> Result<'_, Value<'_>> {
        self.evaluate_script(file_name, source, false)
    }

    fn evaluate_script(&self, file_name: &str, source: &str, keep: bool) -> Result<'_, Value<'_>> {
        let file = CString::new(file_name).map_err(|_| {
            self.runtime_error(RuntimeError::type_error("file name contains a NUL byte"))
        })?;
        let mut code = Vec::with_capacity(source.len() + 1);
        code.extend_from_slice(source.as_bytes());
        code.push(0);

        let recorded: Option<Rc<str>> = self.core.options.record_sources.then(|| Rc::from(source));
        if let Some(text) = recorded.as_ref().filter(|_| keep) {
            self.core
                .sources
                .borrow_mut()
                .entry(file_name.to_owned())
                .or_insert_with(|| text.clone());
        }

        self.core.evaluating.borrow_mut().push(Evaluation {
            file_name: file_name.to_owned(),
            source: recorded,
        });
        let raw = unsafe {
            qjs::JS_Eval(
                self.raw(),
                code.as_ptr().cast(),
                source.len() as _,
                file.as_ptr(),
                qjs::JS_EVAL_TYPE_GLOBAL as _,
            )
        };
        let result = self.wrap(raw);
        self.core.evaluating.borrow_mut().pop();
        result
    }

    /// The global object
    pub fn global_object(&self) -> Object<'_> {
        let raw = unsafe { qjs::JS_GetGlobalObject(self.raw()) };
        Object::from_value_unchecked(unsafe { Value::from_raw(self, raw) })
    }

    // ========================================================================
    // Collector cooperation
    // ========================================================================

    /// Give the collector a chance to run
    ///
    /// This is a hint. The engine runs one collection pass and reports
    /// whether it considers the heap settled; hosts that need steady
    /// progress call this once per host-side collection.
    pub fn idle_notification_deadline(&self, deadline_ms: f64) -> bool {
        let started = Instant::now();
        unsafe { qjs::JS_RunGC(self.runtime()) };
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        tracing::trace!(
            context = %self.core.id,
            deadline_ms,
            elapsed_ms,
            "idle collection pass"
        );
        true
    }

    /// Run queued promise jobs until the queue is empty
    ///
    /// Returns the number of jobs executed. A job that throws stops the
    /// drain and surfaces through the script-exception channel.
    pub fn execute_pending_jobs(&self) -> Result<'_, usize> {
        let mut executed = 0;
        loop {
            let mut job_ctx: *mut qjs::JSContext = ptr::null_mut();
            let ret = unsafe { qjs::JS_ExecutePendingJob(self.runtime(), &mut job_ctx) };
            if ret == 0 {
                break;
            }
            if ret < 0 {
                return Err(self.take_exception());
            }
            executed += 1;
        }
        if executed > 0 {
            tracing::trace!(context = %self.core.id, executed, "pending jobs drained");
        }
        Ok(executed)
    }

    // ========================================================================
    // Handlers
    // ========================================================================

    /// Deliver script exceptions to `handler` instead of returning them
    ///
    /// Only failures raised while no host callback is running are
    /// delivered; inside a callback the exception is returned so it can be
    /// rethrown into script. The failing call returns [`Error::Handled`].
    pub fn set_exception_handler<F>(&self, handler: F)
    where
        F: for<'c> Fn(&'c Context, ScriptException<'c>) + 'static,
    {
        *self.core.exception_handler.borrow_mut() = Some(Rc::new(handler));
    }

    /// Return script exceptions to the caller again
    pub fn clear_exception_handler(&self) {
        self.core.exception_handler.borrow_mut().take();
    }

    /// Deliver host-side precondition violations to `handler`
    pub fn set_runtime_error_handler<F>(&self, handler: F)
    where
        F: Fn(&Context, &RuntimeError) + 'static,
    {
        *self.core.runtime_error_handler.borrow_mut() = Some(Rc::new(handler));
    }

    /// Return runtime errors to the caller again
    pub fn clear_runtime_error_handler(&self) {
        self.core.runtime_error_handler.borrow_mut().take();
    }

    /// Free host pointers wrapped by [`External`](crate::External) values
    ///
    /// The freer runs exactly once per external, when the engine collects
    /// the wrapping object or when the context is released.
    pub fn set_external_freer<F>(&self, freer: F)
    where
        F: Fn(*mut c_void) + 'static,
    {
        let freer: Rc<ExternalFreer> = Rc::new(freer);
        self.store().set_external_freer(Some(freer));
    }

    /// Stop freeing external pointers
    pub fn clear_external_freer(&self) {
        self.store().set_external_freer(None);
    }

    /// Number of host callbacks currently retained by the engine
    pub fn retained_callbacks(&self) -> usize {
        self.store().callbacks.len()
    }

    /// Number of live persistent handles
    pub fn live_handles(&self) -> usize {
        self.core.handles.len()
    }

    // ========================================================================
    // Internal plumbing
    // ========================================================================

    /// Take ownership of `raw`, or capture the pending exception
    pub(crate) fn wrap(&self, raw: qjs::JSValue) -> Result<'_, Value<'_>> {
        if raw::is_exception(raw) {
            Err(self.take_exception())
        } else {
            Ok(unsafe { Value::from_raw(self, raw) })
        }
    }

    /// Map a negative engine status to the pending exception
    pub(crate) fn check(&self, status: i32) -> Result<'_, i32> {
        if status < 0 {
            Err(self.take_exception())
        } else {
            Ok(status)
        }
    }

    /// Capture the pending exception and route it
    pub(crate) fn take_exception(&self) -> Error<'_> {
        let exception = ScriptException::capture(self);
        self.route_exception(exception)
    }

    fn route_exception<'c>(&'c self, exception: ScriptException<'c>) -> Error<'c> {
        if self.core.callback_depth.get() == 0 {
            let handler = self.core.exception_handler.borrow().clone();
            if let Some(handler) = handler {
                tracing::debug!(
                    context = %self.core.id,
                    message = exception.message(),
                    "script exception delivered to handler"
                );
                handler(self, exception);
                return Error::Handled;
            }
        }
        Error::Script(exception)
    }

    /// Route a precondition violation
    pub(crate) fn runtime_error(&self, error: RuntimeError) -> Error<'_> {
        if self.core.callback_depth.get() == 0 {
            let handler = self.core.runtime_error_handler.borrow().clone();
            if let Some(handler) = handler {
                handler(self, &error);
                return Error::Handled;
            }
        }
        Error::Runtime(error)
    }

    /// Reject values that belong to another context
    pub(crate) fn ensure_owned(&self, value: &Value<'_>) -> Result<'_, ()> {
        if value.context().id() == self.id() {
            Ok(())
        } else {
            Err(self.runtime_error(RuntimeError::type_error(format!(
                "value from {} used with {}",
                value.context().id(),
                self.id()
            ))))
        }
    }

    /// Mark host code as running on the engine's stack
    pub(crate) fn enter_callback(&self) -> CallbackDepthGuard<'_> {
        self.core.callback_depth.set(self.core.callback_depth.get() + 1);
        CallbackDepthGuard { core: &self.core }
    }

    /// File name of the innermost script being evaluated
    pub(crate) fn current_file(&self) -> Option<String> {
        self.core.evaluating.borrow().last().map(|e| e.file_name.clone())
    }

    /// Literal text of `line` (1-based) in a recorded source
    ///
    /// The innermost running evaluation answers for its own file name;
    /// anything else is looked up in the first source recorded under it.
    pub(crate) fn source_line(&self, file_name: &str, line: u32) -> Option<String> {
        let running = self
            .core
            .evaluating
            .borrow()
            .last()
            .filter(|e| e.file_name == file_name)
            .and_then(|e| e.source.clone());
        let source = match running {
            Some(source) => source,
            None => self.core.sources.borrow().get(file_name)?.clone(),
        };
        source
            .lines()
            .nth(line.checked_sub(1)? as usize)
            .map(str::to_owned)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.core.id)
            .field("handles", &self.core.handles.len())
            .finish()
    }
}

pub(crate) struct CallbackDepthGuard<'a> {
    core: &'a ContextCore,
}

impl Drop for CallbackDepthGuard<'_> {
    fn drop(&mut self) {
        self.core
            .callback_depth
            .set(self.core.callback_depth.get().saturating_sub(1));
    }
}

//! Per-runtime state reachable from engine finalizers.
//!
//! The store is boxed into the runtime's opaque slot when a context is
//! created and freed only after the runtime itself, so finalizers that run
//! during teardown still find the retain table and the external freer.

use std::cell::RefCell;
use std::ffi::c_void;
use std::ptr::NonNull;
use std::rc::{Rc, Weak};

use rquickjs_sys as qjs;
use rustc_hash::FxHashMap;

use crate::callback::{self, RetainTable};
use crate::context::ContextCore;
use crate::error::ContextError;
use crate::external;

/// Host-side freer for [`External`](crate::External) pointers
pub type ExternalFreer = dyn Fn(*mut c_void);

/// Class ids of the host classes registered on a runtime
#[derive(Debug, Clone, Copy)]
pub(crate) struct ClassIds {
    pub(crate) callback: qjs::JSClassID,
    pub(crate) external: qjs::JSClassID,
}

impl ClassIds {
    unsafe fn register(rt: *mut qjs::JSRuntime) -> Result<Self, ContextError> {
        let mut callback_id: qjs::JSClassID = 0;
        let mut external_id: qjs::JSClassID = 0;
        let callback_id = qjs::JS_NewClassID(rt, &mut callback_id);
        let external_id = qjs::JS_NewClassID(rt, &mut external_id);

        if qjs::JS_NewClass(rt, callback_id, &callback::class_def()) != 0 {
            return Err(ContextError::ClassRegistration("Callback"));
        }
        if qjs::JS_NewClass(rt, external_id, &external::class_def()) != 0 {
            return Err(ContextError::ClassRegistration("External"));
        }

        Ok(ClassIds {
            callback: callback_id,
            external: external_id,
        })
    }
}

pub(crate) struct RuntimeStore {
    pub(crate) classes: ClassIds,
    pub(crate) callbacks: RetainTable,
    external_freer: RefCell<Option<Rc<ExternalFreer>>>,
    // host-owned ArrayBuffer backing stores, counted per address
    host_buffers: RefCell<FxHashMap<usize, usize>>,
    core: RefCell<Weak<ContextCore>>,
}

impl RuntimeStore {
    /// Register host classes on `rt` and attach a fresh store to it.
    pub(crate) unsafe fn install(rt: *mut qjs::JSRuntime) -> Result<NonNull<RuntimeStore>, ContextError> {
        let classes = ClassIds::register(rt)?;
        let store = Box::new(RuntimeStore {
            classes,
            callbacks: RetainTable::default(),
            external_freer: RefCell::new(None),
            host_buffers: RefCell::new(FxHashMap::default()),
            core: RefCell::new(Weak::new()),
        });
        let ptr = NonNull::from(Box::leak(store));
        qjs::JS_SetRuntimeOpaque(rt, ptr.as_ptr().cast::<c_void>());
        Ok(ptr)
    }

    /// Store attached to `rt`, if any.
    pub(crate) unsafe fn from_runtime<'a>(rt: *mut qjs::JSRuntime) -> Option<&'a RuntimeStore> {
        (qjs::JS_GetRuntimeOpaque(rt) as *const RuntimeStore).as_ref()
    }

    /// Detach from `rt` and free. Call only after the runtime is gone.
    pub(crate) unsafe fn destroy(store: NonNull<RuntimeStore>) {
        drop(Box::from_raw(store.as_ptr()));
    }

    pub(crate) fn bind(&self, core: Weak<ContextCore>) {
        *self.core.borrow_mut() = core;
    }

    /// The live context core, or `None` while it is being torn down.
    pub(crate) fn core(&self) -> Option<Rc<ContextCore>> {
        self.core.borrow().upgrade()
    }

    pub(crate) fn set_external_freer(&self, freer: Option<Rc<ExternalFreer>>) {
        *self.external_freer.borrow_mut() = freer;
    }

    pub(crate) fn external_freer(&self) -> Option<Rc<ExternalFreer>> {
        self.external_freer.borrow().clone()
    }

    pub(crate) fn add_host_buffer(&self, data: *mut u8) {
        *self.host_buffers.borrow_mut().entry(data as usize).or_insert(0) += 1;
    }

    pub(crate) fn remove_host_buffer(&self, data: *mut u8) {
        let mut buffers = self.host_buffers.borrow_mut();
        if let Some(count) = buffers.get_mut(&(data as usize)) {
            *count -= 1;
            if *count == 0 {
                buffers.remove(&(data as usize));
            }
        }
    }

    /// True while a buffer created over host memory at `data` is alive
    pub(crate) fn is_host_buffer(&self, data: *mut u8) -> bool {
        self.host_buffers.borrow().contains_key(&(data as usize))
    }
}

//! Opaque host pointers visible to script
//!
//! An external is an engine object of a dedicated class whose opaque slot
//! holds the host pointer. Script can pass it around and store it but
//! cannot look inside. The context's external freer runs exactly once per
//! external, from the class finalizer.

use std::ffi::c_void;
use std::fmt;
use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use rquickjs_sys as qjs;

use crate::context::Context;
use crate::error::Result;
use crate::object::Object;
use crate::store::RuntimeStore;
use crate::value::Value;

/// Host pointer wrapped for script
#[derive(Clone)]
pub struct External<'c> {
    object: Object<'c>,
}

impl<'c> External<'c> {
    pub(crate) fn from_value_unchecked(value: Value<'c>) -> Self {
        External {
            object: Object::from_value_unchecked(value),
        }
    }

    /// Wrap `pointer`
    ///
    /// Ownership of whatever `pointer` refers to passes to the context's
    /// external freer, if one is set.
    pub fn new(ctx: &'c Context, pointer: *mut c_void) -> Result<'c, External<'c>> {
        let class = ctx.store().classes.external;
        let raw = unsafe { qjs::JS_NewObjectClass(ctx.raw(), class as _) };
        let value = ctx.wrap(raw)?;
        unsafe { qjs::JS_SetOpaque(value.as_raw(), pointer) };
        Ok(External::from_value_unchecked(value))
    }

    /// The wrapped pointer, unchanged
    pub fn value(&self) -> *mut c_void {
        let class = self.context().store().classes.external;
        unsafe { qjs::JS_GetOpaque(self.as_raw(), class) }
    }

    /// The external as an object
    pub fn as_object(&self) -> &Object<'c> {
        &self.object
    }

    /// Unwrap into a plain value
    pub fn into_value(self) -> Value<'c> {
        self.object.into_value()
    }
}

impl<'c> Deref for External<'c> {
    type Target = Object<'c>;

    fn deref(&self) -> &Object<'c> {
        &self.object
    }
}

impl fmt::Debug for External<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "External({:p})", self.value())
    }
}

pub(crate) fn class_def() -> qjs::JSClassDef {
    qjs::JSClassDef {
        class_name: c"External".as_ptr(),
        finalizer: Some(finalize),
        gc_mark: None,
        call: None,
        exotic: ptr::null_mut(),
    }
}

unsafe extern "C" fn finalize(rt: *mut qjs::JSRuntime, value: qjs::JSValue) {
    let Some(store) = RuntimeStore::from_runtime(rt) else {
        return;
    };
    let pointer = qjs::JS_GetOpaque(value, store.classes.external);
    qjs::JS_SetOpaque(value, ptr::null_mut());

    let Some(freer) = store.external_freer() else {
        tracing::trace!(target: "jsembed::external", pointer = ?pointer, "external collected without a freer");
        return;
    };
    match panic::catch_unwind(AssertUnwindSafe(|| freer(pointer))) {
        Ok(()) => tracing::trace!(target: "jsembed::external", pointer = ?pointer, "external freed"),
        Err(_) => tracing::error!(target: "jsembed::external", pointer = ?pointer, "external freer panicked"),
    }
}

//! Zero-copy `ArrayBuffer` interop
//!
//! Host memory is handed to the engine as the backing store of an
//! `ArrayBuffer`. Script reads and writes it in place; the host sees the
//! same bytes through [`Object::array_buffer_data`]. Buffers the engine
//! allocated itself expose no data to the host.

use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};

use rquickjs_sys as qjs;

use crate::context::Context;
use crate::error::Result;
use crate::object::Object;
use crate::raw;
use crate::store::RuntimeStore;
use crate::value::Value;

/// Frees host memory once the buffer that exposed it is collected
pub type BufferFreer = Box<dyn FnOnce(*mut u8, usize)>;

struct BufferRecord {
    len: usize,
    freer: Option<BufferFreer>,
    // keeps storage handed over by `array_buffer_from_vec` alive
    _owned: Option<Vec<u8>>,
}

unsafe extern "C" fn free_buffer(rt: *mut qjs::JSRuntime, opaque: *mut c_void, data: *mut c_void) {
    if let Some(store) = RuntimeStore::from_runtime(rt) {
        store.remove_host_buffer(data.cast::<u8>());
    }
    let record = Box::from_raw(opaque.cast::<BufferRecord>());
    let BufferRecord { len, freer, _owned } = *record;
    if let Some(freer) = freer {
        if panic::catch_unwind(AssertUnwindSafe(|| freer(data.cast::<u8>(), len))).is_err() {
            tracing::error!(target: "jsembed::external", len, "buffer freer panicked");
        }
    }
}

unsafe fn new_buffer<'c>(
    ctx: &'c Context,
    data: *mut u8,
    record: BufferRecord,
) -> Result<'c, Object<'c>> {
    let len = record.len;
    let opaque = Box::into_raw(Box::new(record));
    let raw = qjs::JS_NewArrayBuffer(
        ctx.raw(),
        data,
        len as _,
        Some(free_buffer),
        opaque.cast::<c_void>(),
        false,
    );
    if raw::is_exception(raw) {
        // the engine never took ownership; the freer must not run
        drop(Box::from_raw(opaque));
        return Err(ctx.take_exception());
    }
    if let Some(store) = RuntimeStore::from_runtime(qjs::JS_GetRuntime(ctx.raw())) {
        store.add_host_buffer(data);
    }
    Ok(Object::from_value_unchecked(Value::from_raw(ctx, raw)))
}

impl<'c> Object<'c> {
    /// Expose `len` bytes at `data` to script as an `ArrayBuffer`
    ///
    /// `freer` runs exactly once, after the engine collects the buffer. When
    /// it is `None` the memory is never freed by the engine.
    ///
    /// # Safety
    ///
    /// `data` must be valid for reads and writes of `len` bytes until the
    /// freer runs (or, without a freer, until the context is released), and
    /// must not be accessed mutably by the host while script can run.
    pub unsafe fn new_external_array_buffer(
        ctx: &'c Context,
        data: *mut u8,
        len: usize,
        freer: Option<BufferFreer>,
    ) -> Result<'c, Object<'c>> {
        new_buffer(
            ctx,
            data,
            BufferRecord {
                len,
                freer,
                _owned: None,
            },
        )
    }

    /// Move `bytes` into a new `ArrayBuffer` without copying
    pub fn array_buffer_from_vec(ctx: &'c Context, mut bytes: Vec<u8>) -> Result<'c, Object<'c>> {
        let data = bytes.as_mut_ptr();
        let len = bytes.len();
        // moving the Vec into the record keeps its heap block in place
        unsafe {
            new_buffer(
                ctx,
                data,
                BufferRecord {
                    len,
                    freer: None,
                    _owned: Some(bytes),
                },
            )
        }
    }

    /// True for `ArrayBuffer` objects
    pub fn is_array_buffer(&self) -> bool {
        unsafe { qjs::JS_IsArrayBuffer(self.as_raw()) as i32 != 0 }
    }

    /// Backing store of an `ArrayBuffer` created over host memory
    ///
    /// `None` for other objects, for detached buffers and for buffers the
    /// engine allocated itself.
    pub fn array_buffer_data(&self) -> Option<(*mut u8, usize)> {
        if !self.is_array_buffer() {
            return None;
        }
        let ctx = self.context();
        let mut len = 0;
        let data = unsafe { qjs::JS_GetArrayBuffer(ctx.raw(), &mut len, self.as_raw()) };
        if data.is_null() {
            // detached buffers raise; reading a detached buffer is not a script failure
            unsafe { raw::discard_exception(ctx.raw()) };
            return None;
        }
        let rt = unsafe { qjs::JS_GetRuntime(ctx.raw()) };
        match unsafe { RuntimeStore::from_runtime(rt) } {
            Some(store) if store.is_host_buffer(data) => Some((data, len as usize)),
            _ => None,
        }
    }
}

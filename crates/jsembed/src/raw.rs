//! Small helpers over the raw engine bindings shared by the wrapper types.

use rquickjs_sys as qjs;
use std::ffi::{c_char, CString};

pub(crate) const TAG_INT: i32 = qjs::JS_TAG_INT as i32;
pub(crate) const TAG_BOOL: i32 = qjs::JS_TAG_BOOL as i32;
pub(crate) const TAG_NULL: i32 = qjs::JS_TAG_NULL as i32;
pub(crate) const TAG_UNDEFINED: i32 = qjs::JS_TAG_UNDEFINED as i32;
pub(crate) const TAG_UNINITIALIZED: i32 = qjs::JS_TAG_UNINITIALIZED as i32;
pub(crate) const TAG_FLOAT64: i32 = qjs::JS_TAG_FLOAT64 as i32;
pub(crate) const TAG_STRING: i32 = qjs::JS_TAG_STRING as i32;
pub(crate) const TAG_OBJECT: i32 = qjs::JS_TAG_OBJECT as i32;
pub(crate) const TAG_EXCEPTION: i32 = qjs::JS_TAG_EXCEPTION as i32;

/// Normalized tag of a raw value
#[inline]
pub(crate) fn tag(value: qjs::JSValue) -> i32 {
    unsafe { qjs::JS_VALUE_GET_NORM_TAG(value) as i32 }
}

#[inline]
pub(crate) fn is_exception(value: qjs::JSValue) -> bool {
    tag(value) == TAG_EXCEPTION
}

/// Owned property atom, freed on drop
pub(crate) struct Atom {
    rt: *mut qjs::JSRuntime,
    raw: qjs::JSAtom,
}

impl Atom {
    /// Intern `name`. `None` means the engine raised (out of memory).
    pub(crate) unsafe fn new(ctx: *mut qjs::JSContext, name: &str) -> Option<Atom> {
        let raw = qjs::JS_NewAtomLen(ctx, name.as_ptr().cast::<c_char>(), name.len() as _);
        if raw == qjs::JS_ATOM_NULL {
            None
        } else {
            Some(Atom {
                rt: qjs::JS_GetRuntime(ctx),
                raw,
            })
        }
    }

    pub(crate) fn raw(&self) -> qjs::JSAtom {
        self.raw
    }
}

impl Drop for Atom {
    fn drop(&mut self) {
        unsafe { qjs::JS_FreeAtomRT(self.rt, self.raw) }
    }
}

/// Engine ToString of `value` as raw UTF-8 bytes.
///
/// Lone surrogates come back as three-byte sequences, so the bytes are
/// WTF-8 rather than strict UTF-8. `None` means the conversion raised and
/// the exception is still pending.
pub(crate) unsafe fn to_text(ctx: *mut qjs::JSContext, value: qjs::JSValue) -> Option<Vec<u8>> {
    let mut len = 0;
    let ptr = qjs::JS_ToCStringLen2(ctx, &mut len, value, false);
    if ptr.is_null() {
        return None;
    }
    let bytes = std::slice::from_raw_parts(ptr.cast::<u8>(), len as usize).to_vec();
    qjs::JS_FreeCString(ctx, ptr);
    Some(bytes)
}

/// Drop whatever exception is pending on `ctx`
pub(crate) unsafe fn discard_exception(ctx: *mut qjs::JSContext) {
    let pending = qjs::JS_GetException(ctx);
    qjs::JS_FreeValueRT(qjs::JS_GetRuntime(ctx), pending);
}

/// Drop the pending exception, if there is one
pub(crate) unsafe fn clear_pending(ctx: *mut qjs::JSContext) {
    if qjs::JS_HasException(ctx) {
        discard_exception(ctx);
    }
}

fn c_message(message: &str) -> CString {
    // interior NULs cannot cross into the engine's printf-style formatter
    CString::new(message.replace('\0', " ")).unwrap_or_default()
}

/// Throw a `TypeError`; returns the exception marker for the caller to return
pub(crate) unsafe fn throw_type_error(ctx: *mut qjs::JSContext, message: &str) -> qjs::JSValue {
    let text = c_message(message);
    qjs::JS_ThrowTypeError(ctx, c"%s".as_ptr(), text.as_ptr())
}

/// Throw an `InternalError`
pub(crate) unsafe fn throw_internal_error(ctx: *mut qjs::JSContext, message: &str) -> qjs::JSValue {
    let text = c_message(message);
    qjs::JS_ThrowInternalError(ctx, c"%s".as_ptr(), text.as_ptr())
}

/// Throw a plain `Error` whose `message` is `message`
pub(crate) unsafe fn throw_error(ctx: *mut qjs::JSContext, message: &str) -> qjs::JSValue {
    let error = qjs::JS_NewError(ctx);
    if is_exception(error) {
        return error;
    }
    let text = qjs::JS_NewStringLen(ctx, message.as_ptr().cast::<c_char>(), message.len() as _);
    if is_exception(text) {
        qjs::JS_FreeValueRT(qjs::JS_GetRuntime(ctx), error);
        return text;
    }
    // the engine consumes `text` whether or not the store succeeds
    qjs::JS_SetPropertyStr(ctx, error, c"message".as_ptr(), text);
    qjs::JS_Throw(ctx, error)
}

/// Decode WTF-8 into UTF-16 code units, keeping lone surrogates intact.
pub(crate) fn wtf8_to_utf16(bytes: &[u8]) -> Vec<u16> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    let cont = |b: u8| (b & 0x3F) as u32;

    while i < bytes.len() {
        let b0 = bytes[i];
        let remaining = bytes.len() - i;
        let (code_point, width) = if b0 < 0x80 {
            (b0 as u32, 1)
        } else if b0 & 0xE0 == 0xC0 && remaining >= 2 {
            ((((b0 & 0x1F) as u32) << 6) | cont(bytes[i + 1]), 2)
        } else if b0 & 0xF0 == 0xE0 && remaining >= 3 {
            (
                (((b0 & 0x0F) as u32) << 12) | (cont(bytes[i + 1]) << 6) | cont(bytes[i + 2]),
                3,
            )
        } else if b0 & 0xF8 == 0xF0 && remaining >= 4 {
            (
                (((b0 & 0x07) as u32) << 18)
                    | (cont(bytes[i + 1]) << 12)
                    | (cont(bytes[i + 2]) << 6)
                    | cont(bytes[i + 3]),
                4,
            )
        } else {
            (0xFFFD, 1)
        };
        i += width;

        if code_point >= 0x10000 {
            let offset = code_point - 0x10000;
            units.push(0xD800 | (offset >> 10) as u16);
            units.push(0xDC00 | (offset & 0x3FF) as u16);
        } else {
            units.push(code_point as u16);
        }
    }

    units
}

//! Engine strings
//!
//! Text crosses the boundary as UTF-8 going in and WTF-8 coming out, so
//! every valid Unicode string round-trips exactly, astral-plane code points
//! and right-to-left text included.

use std::ffi::c_char;
use std::fmt;
use std::ops::Deref;

use rquickjs_sys as qjs;

use crate::context::Context;
use crate::error::{Result, RuntimeError};
use crate::raw;
use crate::value::Value;

/// Longest string the engine can hold, in UTF-16 code units
pub const MAX_STRING_LEN: usize = (1 << 30) - 1;

/// String value
#[derive(Clone)]
pub struct JsString<'c> {
    value: Value<'c>,
}

impl<'c> JsString<'c> {
    pub(crate) fn from_value_unchecked(value: Value<'c>) -> Self {
        JsString { value }
    }

    /// Create from UTF-8 text
    pub fn new(ctx: &'c Context, text: &str) -> Result<'c, JsString<'c>> {
        // UTF-16 length never exceeds the UTF-8 byte length
        if text.len() > MAX_STRING_LEN {
            let len = text.encode_utf16().count();
            if len > MAX_STRING_LEN {
                return Err(ctx.runtime_error(RuntimeError::StringTooLong {
                    len,
                    max: MAX_STRING_LEN,
                }));
            }
        }

        let raw = unsafe {
            qjs::JS_NewStringLen(ctx.raw(), text.as_ptr().cast::<c_char>(), text.len() as _)
        };
        ctx.wrap(raw).map(JsString::from_value_unchecked)
    }

    /// Create from UTF-16 code units
    ///
    /// Unpaired surrogates are rejected with [`RuntimeError::TypeError`].
    pub fn from_utf16(ctx: &'c Context, units: &[u16]) -> Result<'c, JsString<'c>> {
        if units.len() > MAX_STRING_LEN {
            return Err(ctx.runtime_error(RuntimeError::StringTooLong {
                len: units.len(),
                max: MAX_STRING_LEN,
            }));
        }
        let text = String::from_utf16(units).map_err(|_| {
            ctx.runtime_error(RuntimeError::type_error("text contains an unpaired surrogate"))
        })?;
        JsString::new(ctx, &text)
    }

    /// Contents as Rust text; unpaired surrogates become U+FFFD
    pub fn to_rust_string(&self) -> Result<'c, String> {
        Ok(String::from_utf8_lossy(&self.bytes()?).into_owned())
    }

    /// Contents as UTF-16 code units, exactly as the engine holds them
    pub fn to_utf16(&self) -> Result<'c, Vec<u16>> {
        Ok(raw::wtf8_to_utf16(&self.bytes()?))
    }

    /// Length in UTF-16 code units (the script-visible `length`)
    pub fn utf16_len(&self) -> Result<'c, usize> {
        Ok(self.to_utf16()?.len())
    }

    /// Copy up to `buffer.len()` code units into `buffer`
    ///
    /// Returns the number of units written.
    pub fn write_utf16(&self, buffer: &mut [u16]) -> Result<'c, usize> {
        let units = self.to_utf16()?;
        let n = units.len().min(buffer.len());
        buffer[..n].copy_from_slice(&units[..n]);
        Ok(n)
    }

    /// The string as a plain value
    pub fn as_value(&self) -> &Value<'c> {
        &self.value
    }

    /// Unwrap into a plain value
    pub fn into_value(self) -> Value<'c> {
        self.value
    }

    fn bytes(&self) -> Result<'c, Vec<u8>> {
        let ctx = self.value.context();
        unsafe { raw::to_text(ctx.raw(), self.value.as_raw()) }.ok_or_else(|| ctx.take_exception())
    }
}

impl<'c> Deref for JsString<'c> {
    type Target = Value<'c>;

    fn deref(&self) -> &Value<'c> {
        &self.value
    }
}

impl fmt::Debug for JsString<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_rust_string() {
            Ok(text) => write!(f, "JsString({:?})", text),
            Err(_) => f.write_str("JsString(<unreadable>)"),
        }
    }
}

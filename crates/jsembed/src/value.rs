//! Engine values
//!
//! A [`Value`] owns exactly one engine reference and borrows the
//! [`Context`] that produced it. `Clone` retains, `Drop` releases.

use std::fmt;
use std::mem::ManuallyDrop;

use rquickjs_sys as qjs;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::{Result, RuntimeError};
use crate::external::External;
use crate::function::Function;
use crate::object::{Array, Object};
use crate::raw::{self, TAG_BOOL, TAG_FLOAT64, TAG_INT, TAG_NULL, TAG_OBJECT, TAG_STRING, TAG_UNDEFINED, TAG_UNINITIALIZED};
use crate::string::JsString;

// ============================================================================
// Type Tags
// ============================================================================

/// Variant of a [`Value`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsType {
    /// `null` or `undefined`
    Null,
    /// 32-bit integer
    Int,
    /// Double-precision number
    Double,
    /// Text
    String,
    /// Boolean
    Bool,
    /// Plain object (also symbols and bigints, which script auto-boxes)
    Object,
    /// Array
    Array,
    /// Callable object
    Function,
    /// Host pointer wrapped for script
    External,
}

impl JsType {
    /// Lowercase name used in messages
    pub fn name(&self) -> &'static str {
        match self {
            JsType::Null => "null",
            JsType::Int => "int",
            JsType::Double => "double",
            JsType::String => "string",
            JsType::Bool => "bool",
            JsType::Object => "object",
            JsType::Array => "array",
            JsType::Function => "function",
            JsType::External => "external",
        }
    }

    /// True for the variants that are engine objects
    pub fn is_object_like(&self) -> bool {
        matches!(
            self,
            JsType::Object | JsType::Array | JsType::Function | JsType::External
        )
    }
}

impl fmt::Display for JsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Value
// ============================================================================

/// Owned reference to one script-visible datum
pub struct Value<'c> {
    ctx: &'c Context,
    raw: qjs::JSValue,
}

impl<'c> Value<'c> {
    /// Take ownership of one reference to `raw`
    pub(crate) unsafe fn from_raw(ctx: &'c Context, raw: qjs::JSValue) -> Self {
        Value { ctx, raw }
    }

    pub(crate) fn as_raw(&self) -> qjs::JSValue {
        self.raw
    }

    /// Give the reference back to the engine
    pub(crate) fn into_raw(self) -> qjs::JSValue {
        let this = ManuallyDrop::new(self);
        this.raw
    }

    /// Context this value belongs to
    pub fn context(&self) -> &'c Context {
        self.ctx
    }

    // ------------------------------------------------------------------------
    // Primitive constructors
    // ------------------------------------------------------------------------

    /// `null`
    pub fn null(ctx: &'c Context) -> Self {
        unsafe { Value::from_raw(ctx, qjs::JS_NULL) }
    }

    /// `undefined` (reports as [`JsType::Null`])
    pub fn undefined(ctx: &'c Context) -> Self {
        unsafe { Value::from_raw(ctx, qjs::JS_UNDEFINED) }
    }

    /// 32-bit integer
    pub fn int(ctx: &'c Context, value: i32) -> Self {
        unsafe { Value::from_raw(ctx, qjs::JS_MKVAL(qjs::JS_TAG_INT, value)) }
    }

    /// Double-precision number
    pub fn double(ctx: &'c Context, value: f64) -> Self {
        unsafe { Value::from_raw(ctx, qjs::__JS_NewFloat64(value)) }
    }

    /// Boolean
    pub fn bool(ctx: &'c Context, value: bool) -> Self {
        unsafe { Value::from_raw(ctx, qjs::JS_MKVAL(qjs::JS_TAG_BOOL, value as i32)) }
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    /// Variant of this value
    pub fn get_type(&self) -> JsType {
        match raw::tag(self.raw) {
            TAG_NULL | TAG_UNDEFINED | TAG_UNINITIALIZED => JsType::Null,
            TAG_INT => JsType::Int,
            TAG_FLOAT64 => JsType::Double,
            TAG_STRING => JsType::String,
            TAG_BOOL => JsType::Bool,
            TAG_OBJECT => self.object_type(),
            _ => JsType::Object,
        }
    }

    fn object_type(&self) -> JsType {
        let ctx = self.ctx.raw();
        unsafe {
            if qjs::JS_GetClassID(self.raw) == self.ctx.store().classes.external {
                return JsType::External;
            }
            if qjs::JS_IsFunction(ctx, self.raw) as i32 != 0 {
                return JsType::Function;
            }
            let is_array = qjs::JS_IsArray(ctx, self.raw) as i32;
            if is_array < 0 {
                // revoked proxy; classification must not throw
                raw::discard_exception(ctx);
            }
            if is_array > 0 {
                JsType::Array
            } else {
                JsType::Object
            }
        }
    }

    /// True for `null` and `undefined`
    pub fn is_null(&self) -> bool {
        self.get_type() == JsType::Null
    }

    /// True for `undefined` only
    pub fn is_undefined(&self) -> bool {
        raw::tag(self.raw) == TAG_UNDEFINED
    }

    // ------------------------------------------------------------------------
    // Fallible conversions
    // ------------------------------------------------------------------------

    /// Integer value; integral doubles in range convert
    pub fn as_int(&self) -> std::result::Result<i32, RuntimeError> {
        match self.get_type() {
            JsType::Int => Ok(unsafe { qjs::JS_VALUE_GET_INT(self.raw) }),
            JsType::Double => {
                let d = unsafe { qjs::JS_VALUE_GET_FLOAT64(self.raw) };
                let negative_zero = d == 0.0 && d.is_sign_negative();
                if !negative_zero
                    && d.fract() == 0.0
                    && d >= i32::MIN as f64
                    && d <= i32::MAX as f64
                {
                    Ok(d as i32)
                } else {
                    Err(RuntimeError::invalid_cast(JsType::Int, JsType::Double))
                }
            }
            other => Err(RuntimeError::invalid_cast(JsType::Int, other)),
        }
    }

    /// Numeric value; integers widen
    pub fn as_double(&self) -> std::result::Result<f64, RuntimeError> {
        match self.get_type() {
            JsType::Int => Ok(unsafe { qjs::JS_VALUE_GET_INT(self.raw) } as f64),
            JsType::Double => Ok(unsafe { qjs::JS_VALUE_GET_FLOAT64(self.raw) }),
            other => Err(RuntimeError::invalid_cast(JsType::Double, other)),
        }
    }

    /// Boolean value
    pub fn as_bool(&self) -> std::result::Result<bool, RuntimeError> {
        match self.get_type() {
            JsType::Bool => Ok(unsafe { qjs::JS_VALUE_GET_BOOL(self.raw) as i32 != 0 }),
            other => Err(RuntimeError::invalid_cast(JsType::Bool, other)),
        }
    }

    /// String value
    pub fn as_string(&self) -> std::result::Result<JsString<'c>, RuntimeError> {
        match self.get_type() {
            JsType::String => Ok(JsString::from_value_unchecked(self.clone())),
            other => Err(RuntimeError::invalid_cast(JsType::String, other)),
        }
    }

    /// Object view; arrays, functions and externals are objects too
    pub fn as_object(&self) -> std::result::Result<Object<'c>, RuntimeError> {
        let actual = self.get_type();
        if actual.is_object_like() {
            Ok(Object::from_value_unchecked(self.clone()))
        } else {
            Err(RuntimeError::invalid_cast(JsType::Object, actual))
        }
    }

    /// Array value
    pub fn as_array(&self) -> std::result::Result<Array<'c>, RuntimeError> {
        match self.get_type() {
            JsType::Array => Ok(Array::from_value_unchecked(self.clone())),
            other => Err(RuntimeError::invalid_cast(JsType::Array, other)),
        }
    }

    /// Function value
    pub fn as_function(&self) -> std::result::Result<Function<'c>, RuntimeError> {
        match self.get_type() {
            JsType::Function => Ok(Function::from_value_unchecked(self.clone())),
            other => Err(RuntimeError::invalid_cast(JsType::Function, other)),
        }
    }

    /// External value
    pub fn as_external(&self) -> std::result::Result<External<'c>, RuntimeError> {
        match self.get_type() {
            JsType::External => Ok(External::from_value_unchecked(self.clone())),
            other => Err(RuntimeError::invalid_cast(JsType::External, other)),
        }
    }

    /// Exact variant match without conversion
    ///
    /// `downcast::<i32>()` is `None` for a double even when it is integral,
    /// and `downcast::<Object>()` is `None` for an array.
    pub fn downcast<T: FromValue<'c>>(&self) -> Option<T> {
        if self.get_type() == T::TYPE {
            Some(T::from_value(self))
        } else {
            None
        }
    }

    // ------------------------------------------------------------------------
    // Equality
    // ------------------------------------------------------------------------

    /// Strict (type and value) equality
    pub fn strict_equals(&self, other: &Value<'_>) -> bool {
        if other.context().id() != self.ctx.id() {
            return false;
        }
        unsafe { qjs::JS_IsStrictEqual(self.ctx.raw(), self.raw, other.raw) as i32 != 0 }
    }

    /// Loose equality; may run script through `valueOf`/`toString`
    pub fn equals(&self, other: &Value<'_>) -> Result<'c, bool> {
        self.ctx.ensure_owned(other)?;
        let status = unsafe { qjs::JS_IsEqual(self.ctx.raw(), self.raw, other.raw) as i32 };
        Ok(self.ctx.check(status)? != 0)
    }

    /// Engine string conversion (`String(value)`)
    pub fn to_display_string(&self) -> Result<'c, String> {
        match unsafe { raw::to_text(self.ctx.raw(), self.raw) } {
            Some(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            None => Err(self.ctx.take_exception()),
        }
    }
}

impl Clone for Value<'_> {
    fn clone(&self) -> Self {
        let raw = unsafe { qjs::JS_DupValueRT(self.ctx.runtime(), self.raw) };
        Value { ctx: self.ctx, raw }
    }
}

impl Drop for Value<'_> {
    fn drop(&mut self) {
        unsafe { qjs::JS_FreeValueRT(self.ctx.runtime(), self.raw) }
    }
}

impl fmt::Debug for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ty = self.get_type();
        match ty {
            JsType::Int => write!(f, "Value::Int({})", unsafe { qjs::JS_VALUE_GET_INT(self.raw) }),
            JsType::Double => write!(f, "Value::Double({})", unsafe {
                qjs::JS_VALUE_GET_FLOAT64(self.raw)
            }),
            JsType::Bool => write!(f, "Value::Bool({})", unsafe {
                qjs::JS_VALUE_GET_BOOL(self.raw) as i32 != 0
            }),
            other => write!(f, "Value::{:?}", other),
        }
    }
}

// ============================================================================
// Exact downcasts
// ============================================================================

/// Types a [`Value`] can be downcast to without conversion
pub trait FromValue<'c>: Sized {
    /// Variant that must match exactly
    const TYPE: JsType;

    /// Build from a value already known to have variant [`Self::TYPE`]
    fn from_value(value: &Value<'c>) -> Self;
}

impl<'c> FromValue<'c> for i32 {
    const TYPE: JsType = JsType::Int;

    fn from_value(value: &Value<'c>) -> Self {
        unsafe { qjs::JS_VALUE_GET_INT(value.raw) }
    }
}

impl<'c> FromValue<'c> for f64 {
    const TYPE: JsType = JsType::Double;

    fn from_value(value: &Value<'c>) -> Self {
        unsafe { qjs::JS_VALUE_GET_FLOAT64(value.raw) }
    }
}

impl<'c> FromValue<'c> for bool {
    const TYPE: JsType = JsType::Bool;

    fn from_value(value: &Value<'c>) -> Self {
        unsafe { qjs::JS_VALUE_GET_BOOL(value.raw) as i32 != 0 }
    }
}

impl<'c> FromValue<'c> for JsString<'c> {
    const TYPE: JsType = JsType::String;

    fn from_value(value: &Value<'c>) -> Self {
        JsString::from_value_unchecked(value.clone())
    }
}

impl<'c> FromValue<'c> for Object<'c> {
    const TYPE: JsType = JsType::Object;

    fn from_value(value: &Value<'c>) -> Self {
        Object::from_value_unchecked(value.clone())
    }
}

impl<'c> FromValue<'c> for Array<'c> {
    const TYPE: JsType = JsType::Array;

    fn from_value(value: &Value<'c>) -> Self {
        Array::from_value_unchecked(value.clone())
    }
}

impl<'c> FromValue<'c> for Function<'c> {
    const TYPE: JsType = JsType::Function;

    fn from_value(value: &Value<'c>) -> Self {
        Function::from_value_unchecked(value.clone())
    }
}

impl<'c> FromValue<'c> for External<'c> {
    const TYPE: JsType = JsType::External;

    fn from_value(value: &Value<'c>) -> Self {
        External::from_value_unchecked(value.clone())
    }
}

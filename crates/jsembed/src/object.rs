//! Objects and arrays
//!
//! Property access is not a pure data access: getters, setters and proxies
//! run script, so every operation here can surface a script exception.

use std::fmt;
use std::ops::Deref;
use std::ptr;

use rquickjs_sys as qjs;

use crate::context::Context;
use crate::error::{Result, RuntimeError};
use crate::function::Function;
use crate::raw::{self, Atom};
use crate::value::Value;

// ============================================================================
// Object
// ============================================================================

/// Object value (arrays, functions and externals view as objects too)
#[derive(Clone)]
pub struct Object<'c> {
    value: Value<'c>,
}

impl<'c> Object<'c> {
    pub(crate) fn from_value_unchecked(value: Value<'c>) -> Self {
        Object { value }
    }

    /// Create an empty plain object
    pub fn new(ctx: &'c Context) -> Result<'c, Object<'c>> {
        let raw = unsafe { qjs::JS_NewObject(ctx.raw()) };
        ctx.wrap(raw).map(Object::from_value_unchecked)
    }

    /// The object as a plain value
    pub fn as_value(&self) -> &Value<'c> {
        &self.value
    }

    /// Unwrap into a plain value
    pub fn into_value(self) -> Value<'c> {
        self.value
    }

    fn ctx(&self) -> &'c Context {
        self.value.context()
    }

    fn atom(&self, key: &str) -> Result<'c, Atom> {
        let ctx = self.ctx();
        unsafe { Atom::new(ctx.raw(), key) }.ok_or_else(|| ctx.take_exception())
    }

    /// Read property `key` (absent properties read as `undefined`)
    pub fn get(&self, key: &str) -> Result<'c, Value<'c>> {
        let ctx = self.ctx();
        let atom = self.atom(key)?;
        let raw = unsafe { qjs::JS_GetProperty(ctx.raw(), self.value.as_raw(), atom.raw()) };
        ctx.wrap(raw)
    }

    /// Write property `key`
    pub fn set(&self, key: &str, value: &Value<'c>) -> Result<'c, ()> {
        let ctx = self.ctx();
        ctx.ensure_owned(value)?;
        let atom = self.atom(key)?;
        // the engine consumes the stored reference
        let status = unsafe {
            qjs::JS_SetProperty(ctx.raw(), self.value.as_raw(), atom.raw(), value.clone().into_raw())
        };
        ctx.check(status)?;
        Ok(())
    }

    /// Whether `key` is present on the object or its prototype chain
    pub fn has(&self, key: &str) -> Result<'c, bool> {
        let ctx = self.ctx();
        let atom = self.atom(key)?;
        let status = unsafe { qjs::JS_HasProperty(ctx.raw(), self.value.as_raw(), atom.raw()) };
        Ok(ctx.check(status as i32)? != 0)
    }

    /// Own enumerable string keys, in the engine's enumeration order
    pub fn keys(&self) -> Result<'c, Array<'c>> {
        let ctx = self.ctx();
        let names = Array::new(ctx)?;

        let mut tab: *mut qjs::JSPropertyEnum = ptr::null_mut();
        let mut len = 0;
        let flags = (qjs::JS_GPN_STRING_MASK | qjs::JS_GPN_ENUM_ONLY) as _;
        let status = unsafe {
            qjs::JS_GetOwnPropertyNames(ctx.raw(), &mut tab, &mut len, self.value.as_raw(), flags)
        };
        ctx.check(status)?;

        let mut failed = false;
        for i in 0..len {
            unsafe {
                let atom = (*tab.add(i as usize)).atom;
                let name = qjs::JS_AtomToString(ctx.raw(), atom);
                if raw::is_exception(name) {
                    failed = true;
                    break;
                }
                if qjs::JS_SetPropertyUint32(ctx.raw(), names.as_raw(), i as u32, name) < 0 {
                    failed = true;
                    break;
                }
            }
        }
        unsafe { qjs::JS_FreePropertyEnum(ctx.raw(), tab, len) };

        if failed {
            Err(ctx.take_exception())
        } else {
            Ok(names)
        }
    }

    /// Own enumerable string keys as Rust strings
    pub fn key_names(&self) -> Result<'c, Vec<String>> {
        let keys = self.keys()?;
        let len = keys.len()?;
        let mut names = Vec::with_capacity(len as usize);
        for i in 0..len {
            names.push(keys.get(i)?.to_display_string()?);
        }
        Ok(names)
    }

    /// `this instanceof constructor`
    pub fn instance_of(&self, constructor: &Function<'c>) -> Result<'c, bool> {
        let ctx = self.ctx();
        ctx.ensure_owned(constructor.as_value())?;
        let status = unsafe {
            qjs::JS_IsInstanceOf(ctx.raw(), self.value.as_raw(), constructor.as_value().as_raw())
        };
        Ok(ctx.check(status as i32)? != 0)
    }

    /// Call the function stored under `name` with this object as `this`
    ///
    /// A property that is not a function is a [`RuntimeError::InvalidCast`].
    pub fn call_method(&self, name: &str, args: &[Value<'c>]) -> Result<'c, Value<'c>> {
        let ctx = self.ctx();
        let method = self.get(name)?;
        let function = method.as_function().map_err(|e| ctx.runtime_error(e))?;
        function.call(Some(self), args)
    }
}

impl<'c> Deref for Object<'c> {
    type Target = Value<'c>;

    fn deref(&self) -> &Value<'c> {
        &self.value
    }
}

impl fmt::Debug for Object<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object({})", self.value.get_type())
    }
}

// ============================================================================
// Array
// ============================================================================

/// Array value
#[derive(Clone)]
pub struct Array<'c> {
    object: Object<'c>,
}

impl<'c> Array<'c> {
    pub(crate) fn from_value_unchecked(value: Value<'c>) -> Self {
        Array {
            object: Object::from_value_unchecked(value),
        }
    }

    /// Create an empty array
    pub fn new(ctx: &'c Context) -> Result<'c, Array<'c>> {
        let raw = unsafe { qjs::JS_NewArray(ctx.raw()) };
        ctx.wrap(raw).map(Array::from_value_unchecked)
    }

    /// Create an array holding `values` in order
    pub fn from_values(ctx: &'c Context, values: &[Value<'c>]) -> Result<'c, Array<'c>> {
        let array = Array::new(ctx)?;
        for (i, value) in values.iter().enumerate() {
            let index = u32::try_from(i)
                .map_err(|_| ctx.runtime_error(RuntimeError::type_error("array index out of range")))?;
            array.set(index, value)?;
        }
        Ok(array)
    }

    /// Element at `index`
    pub fn get(&self, index: u32) -> Result<'c, Value<'c>> {
        let ctx = self.ctx();
        let raw = unsafe { qjs::JS_GetPropertyUint32(ctx.raw(), self.as_raw(), index) };
        ctx.wrap(raw)
    }

    /// Store `value` at `index`
    pub fn set(&self, index: u32, value: &Value<'c>) -> Result<'c, ()> {
        let ctx = self.ctx();
        ctx.ensure_owned(value)?;
        let status = unsafe {
            qjs::JS_SetPropertyUint32(ctx.raw(), self.as_raw(), index, value.clone().into_raw())
        };
        ctx.check(status)?;
        Ok(())
    }

    /// Script-visible `length`
    pub fn len(&self) -> Result<'c, u32> {
        let ctx = self.ctx();
        let length = self
            .object
            .get("length")?
            .as_double()
            .map_err(|e| ctx.runtime_error(e))?;
        Ok(length.clamp(0.0, u32::MAX as f64) as u32)
    }

    /// True when `length` is zero
    pub fn is_empty(&self) -> Result<'c, bool> {
        Ok(self.len()? == 0)
    }

    /// Append `value`
    pub fn push(&self, value: &Value<'c>) -> Result<'c, ()> {
        let len = self.len()?;
        self.set(len, value)
    }

    /// Copy the elements out in order
    pub fn to_vec(&self) -> Result<'c, Vec<Value<'c>>> {
        let len = self.len()?;
        (0..len).map(|i| self.get(i)).collect()
    }

    /// The array as an object
    pub fn as_object(&self) -> &Object<'c> {
        &self.object
    }

    /// Unwrap into a plain value
    pub fn into_value(self) -> Value<'c> {
        self.object.into_value()
    }

    fn ctx(&self) -> &'c Context {
        self.object.value.context()
    }
}

impl<'c> Deref for Array<'c> {
    type Target = Object<'c>;

    fn deref(&self) -> &Object<'c> {
        &self.object
    }
}

impl fmt::Debug for Array<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.len() {
            Ok(len) => write!(f, "Array(len = {})", len),
            Err(_) => f.write_str("Array(<unreadable>)"),
        }
    }
}

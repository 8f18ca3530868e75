//! Callable values

use std::fmt;
use std::ops::Deref;

use rquickjs_sys as qjs;

use crate::callback::{self, Callback, CallbackKind, CallbackResult};
use crate::context::Context;
use crate::error::{Result, RuntimeError};
use crate::object::Object;
use crate::value::{JsType, Value};

/// Function value, script-defined or host-defined
#[derive(Clone)]
pub struct Function<'c> {
    object: Object<'c>,
}

impl<'c> Function<'c> {
    pub(crate) fn from_value_unchecked(value: Value<'c>) -> Self {
        Function {
            object: Object::from_value_unchecked(value),
        }
    }

    /// Expose a Rust closure to script
    ///
    /// # Example
    ///
    /// ```ignore
    /// let add = Function::new(&ctx, |ctx, args| {
    ///     let sum = args.iter().map(|a| a.as_int().unwrap_or(0)).sum();
    ///     Ok(Some(Value::int(ctx, sum)))
    /// })?;
    /// ctx.global_object().set("add", &add)?;
    /// ```
    pub fn new<F>(ctx: &'c Context, f: F) -> Result<'c, Function<'c>>
    where
        F: for<'a> Fn(&'a Context, &[Value<'a>]) -> CallbackResult<'a> + 'static,
    {
        callback::bind(ctx, CallbackKind::Closure(Box::new(f)))
    }

    /// Expose a host [`Callback`] to script
    ///
    /// `retain` is called before this returns; `release` is called once the
    /// engine has collected the function object or the context is released.
    pub fn from_callback(ctx: &'c Context, callback: Box<dyn Callback>) -> Result<'c, Function<'c>> {
        callback::bind(ctx, CallbackKind::Host(callback))
    }

    /// Call with `this` bound to `this` (or `undefined`)
    pub fn call(&self, this: Option<&Object<'c>>, args: &[Value<'c>]) -> Result<'c, Value<'c>> {
        let ctx = self.ctx();
        if let Some(this) = this {
            ctx.ensure_owned(this.as_value())?;
        }
        for arg in args {
            ctx.ensure_owned(arg)?;
        }
        let argv: Vec<qjs::JSValue> = args.iter().map(Value::as_raw).collect();
        let this_raw = this.map_or(qjs::JS_UNDEFINED, |t| t.as_raw());

        let raw = unsafe {
            qjs::JS_Call(
                ctx.raw(),
                self.as_raw(),
                this_raw,
                argv.len() as _,
                argv.as_ptr().cast_mut(),
            )
        };
        ctx.wrap(raw)
    }

    /// Call as a constructor (`new f(...args)`)
    pub fn construct(&self, args: &[Value<'c>]) -> Result<'c, Object<'c>> {
        let ctx = self.ctx();
        for arg in args {
            ctx.ensure_owned(arg)?;
        }
        let argv: Vec<qjs::JSValue> = args.iter().map(Value::as_raw).collect();

        let raw = unsafe {
            qjs::JS_CallConstructor2(
                ctx.raw(),
                self.as_raw(),
                self.as_raw(),
                argv.len() as _,
                argv.as_ptr().cast_mut(),
            )
        };
        let value = ctx.wrap(raw)?;
        let actual = value.get_type();
        if actual.is_object_like() {
            Ok(Object::from_value_unchecked(value))
        } else {
            Err(ctx.runtime_error(RuntimeError::invalid_cast(JsType::Object, actual)))
        }
    }

    /// The function as an object
    pub fn as_object(&self) -> &Object<'c> {
        &self.object
    }

    /// Unwrap into a plain value
    pub fn into_value(self) -> Value<'c> {
        self.object.into_value()
    }

    fn ctx(&self) -> &'c Context {
        self.object.as_value().context()
    }
}

impl<'c> Deref for Function<'c> {
    type Target = Object<'c>;

    fn deref(&self) -> &Object<'c> {
        &self.object
    }
}

impl fmt::Debug for Function<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Function")
    }
}

//! jsembed - Embedding layer for a JavaScript engine
//!
//! This crate exposes engine values, isolated execution contexts, and
//! script-defined and host-defined functions through an ownership-checked
//! API. The engine itself (QuickJS, through `rquickjs-sys`) is an opaque
//! dependency: parsing, compilation and collection belong to it.
//!
//! Ownership follows two rules:
//! - every owned wrapper ([`Value`], [`Object`], [`ScriptException`], ...)
//!   holds exactly one engine reference, retained by `Clone` and released
//!   by `Drop`;
//! - values borrow their [`Context`], and [`Handle`]s that outlive the
//!   borrow detect a released context at runtime.
//!
//! Failures travel on two channels. Script-visible failures are
//! [`ScriptException`]s; host-side precondition violations are
//! [`RuntimeError`]s and never reach script.
//!
//! # Example
//!
//! ```ignore
//! use jsembed::{Context, ContextOptions, Function, Value};
//!
//! let ctx = Context::new(ContextOptions::default())?;
//! let greet = Function::new(&ctx, |ctx, args| {
//!     let name = args[0].as_string()?.to_rust_string()?;
//!     Ok(Some(jsembed::JsString::new(ctx, &format!("hello, {}", name))?.into_value()))
//! })?;
//! ctx.global_object().set("greet", &greet)?;
//! let text = ctx.evaluate("main.js", "greet('world')")?;
//! ```

#![warn(missing_docs)]

mod buffer;
mod callback;
mod context;
mod debug;
mod error;
mod exception;
mod external;
mod function;
mod handle;
mod marshal;
mod object;
mod raw;
mod store;
mod string;
mod value;

pub use buffer::BufferFreer;
pub use callback::{Callback, CallbackError, CallbackResult};
pub use context::{Context, ContextId, ContextOptions, ExceptionHandler, RuntimeErrorHandler};
pub use debug::{DebugAgent, DebugMessageHandler, JsonDebugAgent};
pub use error::{ContextError, Error, Result, RuntimeError};
pub use exception::ScriptException;
pub use external::External;
pub use function::Function;
pub use handle::Handle;
pub use marshal::{HostValue, MarshalError, MAX_DEPTH};
pub use object::{Array, Object};
pub use store::ExternalFreer;
pub use string::{JsString, MAX_STRING_LEN};
pub use value::{FromValue, JsType, Value};

/// Engine and binding version, e.g. `QuickJS (jsembed 0.2.0)`
pub fn engine_version() -> &'static str {
    concat!("QuickJS (jsembed ", env!("CARGO_PKG_VERSION"), ")")
}

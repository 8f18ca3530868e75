//! Script exceptions and their diagnostics

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use rquickjs_sys as qjs;

use crate::context::Context;
use crate::object::Object;
use crate::raw::{self, Atom};
use crate::value::{JsType, Value};

/// Stack frame location, e.g. `    at add (math.js:3:9)` or `at math.js:3`
static FRAME_LOCATION: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^\s*at\s+(?:.*?\()?(?P<file>[^\s()]+?):(?P<line>\d+)(?::(?P<col>\d+))?\)?\s*$").ok()
});

/// A value raised by script, with the diagnostics the engine attached to it
///
/// The exception owns one reference to the thrown value; dropping it
/// releases that reference. Cloning retains.
#[derive(Clone)]
pub struct ScriptException<'c> {
    value: Value<'c>,
    message: String,
    file_name: Option<String>,
    line_number: Option<u32>,
    stack_trace: Option<String>,
    source_line: Option<String>,
}

impl<'c> ScriptException<'c> {
    /// Take the pending exception off `ctx`
    pub(crate) fn capture(ctx: &'c Context) -> Self {
        let raw = unsafe { qjs::JS_GetException(ctx.raw()) };
        let value = unsafe { Value::from_raw(ctx, raw) };

        let message = match unsafe { raw::to_text(ctx.raw(), value.as_raw()) } {
            Some(bytes) if !bytes.is_empty() => String::from_utf8_lossy(&bytes).into_owned(),
            _ => "unknown exception".to_owned(),
        };
        // a throwing toString must not replace the original failure
        unsafe { raw::clear_pending(ctx.raw()) };

        let (mut file_name, mut line_number, stack_trace) = if !value.get_type().is_object_like() {
            (None, None, None)
        } else {
            let object = Object::from_value_unchecked(value.clone());
            (
                quiet_string(&object, "fileName"),
                quiet_line(&object),
                quiet_string(&object, "stack"),
            )
        };

        if file_name.is_none() || line_number.is_none() {
            if let Some((file, line)) = stack_trace.as_deref().and_then(first_frame) {
                file_name.get_or_insert(file);
                line_number.get_or_insert(line);
            }
        }
        if file_name.is_none() {
            file_name = ctx.current_file();
        }
        unsafe { raw::clear_pending(ctx.raw()) };

        let source_line = match (&file_name, line_number) {
            (Some(file), Some(line)) => ctx.source_line(file, line),
            _ => None,
        };

        ScriptException {
            value,
            message,
            file_name,
            line_number,
            stack_trace,
            source_line,
        }
    }

    /// The thrown value
    pub fn value(&self) -> &Value<'c> {
        &self.value
    }

    /// Take the thrown value, e.g. to rethrow it from a callback
    pub fn into_value(self) -> Value<'c> {
        self.value
    }

    /// Engine string conversion of the thrown value
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Script file that raised, when known
    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    /// 1-based line that raised, when known
    pub fn line_number(&self) -> Option<u32> {
        self.line_number
    }

    /// Engine stack trace text
    pub fn stack_trace(&self) -> Option<&str> {
        self.stack_trace.as_deref()
    }

    /// Literal text of the line that raised
    pub fn source_line(&self) -> Option<&str> {
        self.source_line.as_deref()
    }
}

/// Read a string property without letting a throwing getter escape
fn quiet_string(object: &Object<'_>, key: &str) -> Option<String> {
    let ctx = object.context();
    let atom = unsafe { Atom::new(ctx.raw(), key) }?;
    let raw = unsafe { qjs::JS_GetProperty(ctx.raw(), object.as_raw(), atom.raw()) };
    if raw::is_exception(raw) {
        unsafe { raw::discard_exception(ctx.raw()) };
        return None;
    }
    let value = unsafe { Value::from_raw(ctx, raw) };
    if value.get_type() != JsType::String {
        return None;
    }
    let text = value.as_string().ok()?.to_rust_string().ok()?;
    (!text.is_empty()).then_some(text)
}

fn quiet_line(object: &Object<'_>) -> Option<u32> {
    let ctx = object.context();
    let atom = unsafe { Atom::new(ctx.raw(), "lineNumber") }?;
    let raw = unsafe { qjs::JS_GetProperty(ctx.raw(), object.as_raw(), atom.raw()) };
    if raw::is_exception(raw) {
        unsafe { raw::discard_exception(ctx.raw()) };
        return None;
    }
    let value = unsafe { Value::from_raw(ctx, raw) };
    value.as_int().ok().and_then(|n| u32::try_from(n).ok()).filter(|&n| n > 0)
}

/// File and line of the first stack frame that has a location
fn first_frame(stack: &str) -> Option<(String, u32)> {
    let pattern = FRAME_LOCATION.as_ref()?;
    stack.lines().find_map(|frame| {
        let caps = pattern.captures(frame)?;
        let line = caps.name("line")?.as_str().parse().ok()?;
        Some((caps.name("file")?.as_str().to_owned(), line))
    })
}

impl fmt::Display for ScriptException<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        match (&self.file_name, self.line_number) {
            (Some(file), Some(line)) => write!(f, " at {}:{}", file, line),
            (Some(file), None) => write!(f, " at {}", file),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for ScriptException<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptException")
            .field("message", &self.message)
            .field("file_name", &self.file_name)
            .field("line_number", &self.line_number)
            .finish_non_exhaustive()
    }
}

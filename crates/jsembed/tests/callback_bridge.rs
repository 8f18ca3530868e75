//! Integration tests for the callback bridge
//!
//! Tests cover:
//! - Retain before first call, release only after unreachable
//! - Argument marshaling (order, count, tags)
//! - Errors raised by host code seen as throws in script
//! - Nested re-entry: script -> host -> script -> host

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use jsembed::{
    Callback, CallbackError, CallbackResult, Context, ContextOptions, Function, JsString, JsType,
    Value,
};

fn ctx() -> Context {
    Context::new(ContextOptions::default()).unwrap()
}

#[derive(Default)]
struct Events {
    log: RefCell<Vec<&'static str>>,
    live: Cell<i32>,
}

struct Tracked {
    events: Rc<Events>,
}

impl Callback for Tracked {
    fn call<'c>(&self, ctx: &'c Context, _args: &[Value<'c>]) -> CallbackResult<'c> {
        assert!(self.events.live.get() > 0, "called while not retained");
        self.events.log.borrow_mut().push("call");
        Ok(Some(Value::bool(ctx, true)))
    }

    fn retain(&self) {
        self.events.live.set(self.events.live.get() + 1);
        self.events.log.borrow_mut().push("retain");
    }

    fn release(&self) {
        self.events.live.set(self.events.live.get() - 1);
        self.events.log.borrow_mut().push("release");
    }
}

// ============================================================================
// Lifetime
// ============================================================================

#[test]
fn test_retain_call_release_order() {
    let events = Rc::new(Events::default());
    let ctx = ctx();
    {
        let f = Function::from_callback(&ctx, Box::new(Tracked { events: events.clone() })).unwrap();
        ctx.global_object().set("tracked", &f).unwrap();
    }
    ctx.evaluate("calls.js", "tracked(); tracked();").unwrap();
    assert_eq!(*events.log.borrow(), vec!["retain", "call", "call"]);

    ctx.evaluate("unbind.js", "tracked = undefined;").unwrap();
    ctx.idle_notification_deadline(1.0);
    assert_eq!(*events.log.borrow(), vec!["retain", "call", "call", "release"]);
    assert_eq!(events.live.get(), 0);
    assert_eq!(ctx.retained_callbacks(), 0);
}

#[test]
fn test_callback_kept_alive_by_script_closure() {
    let events = Rc::new(Events::default());
    let ctx = ctx();
    let f = Function::from_callback(&ctx, Box::new(Tracked { events: events.clone() })).unwrap();
    let make = ctx
        .evaluate("closure.js", "(function (cb) { return function () { return cb(); }; })")
        .unwrap()
        .as_function()
        .unwrap();
    let wrapper = make.call(None, &[f.into_value()]).unwrap().as_function().unwrap();

    ctx.idle_notification_deadline(1.0);
    assert_eq!(events.live.get(), 1);
    assert!(wrapper.call(None, &[]).unwrap().as_bool().unwrap());

    drop(wrapper);
    ctx.idle_notification_deadline(1.0);
    assert_eq!(events.live.get(), 0);
}

#[test]
fn test_release_on_context_drop() {
    let events = Rc::new(Events::default());
    {
        let ctx = ctx();
        let f = Function::from_callback(&ctx, Box::new(Tracked { events: events.clone() })).unwrap();
        ctx.global_object().set("kept", &f).unwrap();
    }
    assert_eq!(*events.log.borrow(), vec!["retain", "release"]);
}

// ============================================================================
// Arguments and results
// ============================================================================

#[test]
fn test_arguments_exact_order_and_tags() {
    let ctx = ctx();
    let seen: Rc<RefCell<Vec<(JsType, String)>>> = Rc::default();
    let sink = seen.clone();
    let f = Function::new(&ctx, move |_, args| {
        for arg in args {
            sink.borrow_mut().push((arg.get_type(), arg.to_display_string()?));
        }
        Ok(Some(Value::int(args[0].context(), args.len() as i32)))
    })
    .unwrap();
    ctx.global_object().set("record", &f).unwrap();

    let count = ctx
        .evaluate("args.js", "record(7, 'seven', 7.5, false, null)")
        .unwrap();
    assert_eq!(count.as_int().unwrap(), 5);
    assert_eq!(
        *seen.borrow(),
        vec![
            (JsType::Int, "7".to_owned()),
            (JsType::String, "seven".to_owned()),
            (JsType::Double, "7.5".to_owned()),
            (JsType::Bool, "false".to_owned()),
            (JsType::Null, "null".to_owned()),
        ]
    );
}

#[test]
fn test_host_function_called_from_host() {
    let ctx = ctx();
    let concat = Function::new(&ctx, |ctx, args| {
        let mut out = String::new();
        for arg in args {
            out.push_str(&arg.as_string()?.to_rust_string()?);
        }
        Ok(Some(JsString::new(ctx, &out)?.into_value()))
    })
    .unwrap();
    let result = concat
        .call(
            None,
            &[
                JsString::new(&ctx, "שלום ").unwrap().into_value(),
                JsString::new(&ctx, "🌍").unwrap().into_value(),
            ],
        )
        .unwrap();
    assert_eq!(result.as_string().unwrap().to_rust_string().unwrap(), "שלום 🌍");
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_throwing_callback_caught_by_script() {
    let ctx = ctx();
    let f = Function::new(&ctx, |ctx, _| {
        Err(CallbackError::Throw(JsString::new(ctx, "custom payload")?.into_value()))
    })
    .unwrap();
    ctx.global_object().set("thrower", &f).unwrap();
    let caught = ctx
        .evaluate("catch.js", "try { thrower(); 'not thrown' } catch (e) { e }")
        .unwrap();
    assert_eq!(
        caught.as_string().unwrap().to_rust_string().unwrap(),
        "custom payload"
    );
}

#[test]
fn test_uncaught_callback_error_reaches_host() {
    let ctx = ctx();
    let f = Function::new(&ctx, |_, _| Err(CallbackError::message("escaped"))).unwrap();
    ctx.global_object().set("escape", &f).unwrap();
    let err = ctx.evaluate("uncaught.js", "escape()").unwrap_err();
    let exception = err.as_script().expect("script exception");
    assert_eq!(exception.message(), "Error: escaped");
}

// ============================================================================
// Re-entry
// ============================================================================

#[test]
fn test_nested_reentry() {
    let ctx = ctx();
    let depth = Rc::new(Cell::new(0));
    let max_depth = Rc::new(Cell::new(0));
    let (d, m) = (depth.clone(), max_depth.clone());
    let f = Function::new(&ctx, move |ctx, args| {
        d.set(d.get() + 1);
        m.set(m.get().max(d.get()));
        let n = args[0].as_int()?;
        let result = if n > 0 {
            let next = ctx
                .global_object()
                .get("down")?
                .as_function()?
                .call(None, &[Value::int(ctx, n - 1)])?;
            next.as_int()? + 1
        } else {
            0
        };
        d.set(d.get() - 1);
        Ok(Some(Value::int(ctx, result)))
    })
    .unwrap();
    ctx.global_object().set("host", &f).unwrap();
    ctx.evaluate("down.js", "function down(n) { return host(n); }")
        .unwrap();

    let v = ctx.evaluate("go.js", "down(5)").unwrap();
    assert_eq!(v.as_int().unwrap(), 5);
    assert_eq!(max_depth.get(), 6);
    assert_eq!(depth.get(), 0);
}

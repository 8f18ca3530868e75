//! Persistent handles
//!
//! A [`Value`] cannot outlive the borrow of its context. A [`Handle`] can:
//! it keeps the engine reference in the context's handle table and holds
//! only a weak link to the context, so it notices when the context has been
//! released instead of touching freed engine memory.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use rquickjs_sys as qjs;
use rustc_hash::FxHashMap;

use crate::context::{Context, ContextCore, ContextId};
use crate::error::RuntimeError;
use crate::value::{JsType, Value};

// ============================================================================
// Handle table
// ============================================================================

/// Engine references held on behalf of persistent handles
#[derive(Default)]
pub(crate) struct HandleTable {
    slots: RefCell<FxHashMap<u64, qjs::JSValue>>,
    last_slot: Cell<u64>,
}

impl HandleTable {
    /// Store one owned reference
    fn insert(&self, raw: qjs::JSValue) -> u64 {
        let slot = self.last_slot.get() + 1;
        self.last_slot.set(slot);
        self.slots.borrow_mut().insert(slot, raw);
        slot
    }

    fn get(&self, slot: u64) -> Option<qjs::JSValue> {
        self.slots.borrow().get(&slot).copied()
    }

    fn remove(&self, slot: u64) -> Option<qjs::JSValue> {
        self.slots.borrow_mut().remove(&slot)
    }

    /// Free every stored reference; returns how many there were
    pub(crate) unsafe fn clear(&self, rt: *mut qjs::JSRuntime) -> usize {
        let drained: Vec<qjs::JSValue> = self.slots.borrow_mut().drain().map(|(_, v)| v).collect();
        let count = drained.len();
        for raw in drained {
            qjs::JS_FreeValueRT(rt, raw);
        }
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.borrow().len()
    }
}

// ============================================================================
// Handle
// ============================================================================

struct HandleInner {
    core: Weak<ContextCore>,
    context: ContextId,
    slot: u64,
    kind: JsType,
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        // a released context already freed every slot
        if let Some(core) = self.core.upgrade() {
            if let Some(raw) = core.handles.remove(self.slot) {
                unsafe { qjs::JS_FreeValueRT(core.rt.as_ptr(), raw) };
            }
        }
    }
}

/// Persistent, reference-counted token for a value
///
/// `Clone` shares the same slot; the engine reference is released when the
/// last clone is dropped. Equality is identity of the slot, not value
/// equality.
#[derive(Clone)]
pub struct Handle {
    inner: Rc<HandleInner>,
}

impl Handle {
    /// Keep `value` alive beyond the current borrow of its context
    pub fn new(value: &Value<'_>) -> Handle {
        let ctx = value.context();
        let raw = value.clone().into_raw();
        let slot = ctx.core().handles.insert(raw);
        Handle {
            inner: Rc::new(HandleInner {
                core: Rc::downgrade(ctx.core()),
                context: ctx.id(),
                slot,
                kind: value.get_type(),
            }),
        }
    }

    /// A fresh owned value for the handle's referent
    ///
    /// Fails with [`RuntimeError::TypeError`] when the owning context was
    /// released or `ctx` is a different context.
    pub fn restore<'c>(&self, ctx: &'c Context) -> Result<Value<'c>, RuntimeError> {
        if !self.is_alive() {
            return Err(RuntimeError::type_error(format!(
                "handle used after {} was released",
                self.inner.context
            )));
        }
        if ctx.id() != self.inner.context {
            return Err(RuntimeError::type_error(format!(
                "handle from {} used with {}",
                self.inner.context,
                ctx.id()
            )));
        }
        let raw = ctx
            .core()
            .handles
            .get(self.inner.slot)
            .ok_or_else(|| RuntimeError::type_error("handle slot was already freed"))?;
        Ok(unsafe { Value::from_raw(ctx, qjs::JS_DupValueRT(ctx.runtime(), raw)) })
    }

    /// Context the handle belongs to
    pub fn context_id(&self) -> ContextId {
        self.inner.context
    }

    /// Variant of the referent when the handle was created
    pub fn js_type(&self) -> JsType {
        self.inner.kind
    }

    /// Whether the owning context still exists
    pub fn is_alive(&self) -> bool {
        self.inner.core.strong_count() > 0
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Handle {}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("context", &self.inner.context)
            .field("slot", &self.inner.slot)
            .field("kind", &self.inner.kind)
            .field("alive", &self.is_alive())
            .finish()
    }
}

//! Debug message pipe
//!
//! The context treats debugger traffic as opaque text: commands are queued
//! by [`Context::send_debug_command`] and handed to a [`DebugAgent`] when
//! the host calls [`Context::process_debug_messages`]. Whatever the agent
//! produces goes to the registered message handler.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};

use crate::context::Context;
use crate::error::Error;

/// Receives messages produced by the debug agent
pub type DebugMessageHandler = dyn Fn(&str);

/// Interprets debug commands for one context
pub trait DebugAgent {
    /// Handle one raw command; returns the messages to deliver, in order
    fn handle_command(&mut self, ctx: &Context, command: &str) -> Vec<String>;
}

pub(crate) struct DebugChannel {
    handler: RefCell<Option<Rc<DebugMessageHandler>>>,
    pending: RefCell<VecDeque<String>>,
    agent: RefCell<Box<dyn DebugAgent>>,
}

impl Default for DebugChannel {
    fn default() -> Self {
        DebugChannel {
            handler: RefCell::new(None),
            pending: RefCell::new(VecDeque::new()),
            agent: RefCell::new(Box::new(JsonDebugAgent::default())),
        }
    }
}

impl Context {
    /// Deliver debug messages to `handler`
    pub fn set_debug_message_handler<F>(&self, handler: F)
    where
        F: Fn(&str) + 'static,
    {
        *self.core().debug.handler.borrow_mut() = Some(Rc::new(handler));
    }

    /// Stop delivering debug messages; later messages are dropped
    pub fn clear_debug_message_handler(&self) {
        self.core().debug.handler.borrow_mut().take();
    }

    /// Queue a raw command for the next [`Context::process_debug_messages`]
    pub fn send_debug_command(&self, command: &str) {
        let mut pending = self.core().debug.pending.borrow_mut();
        pending.push_back(command.to_owned());
        tracing::trace!(target: "jsembed::debug", context = %self.id(), queued = pending.len(), "debug command queued");
    }

    /// Replace the agent that interprets commands
    pub fn set_debug_agent(&self, agent: Box<dyn DebugAgent>) {
        match self.core().debug.agent.try_borrow_mut() {
            Ok(mut slot) => *slot = agent,
            Err(_) => tracing::warn!(
                target: "jsembed::debug",
                context = %self.id(),
                "debug agent replaced while processing; ignored"
            ),
        }
    }

    /// Run every queued command through the agent
    ///
    /// Returns the number of messages delivered to the handler. A nested
    /// call made while commands are being processed does nothing.
    pub fn process_debug_messages(&self) -> usize {
        let channel = &self.core().debug;
        let Ok(mut agent) = channel.agent.try_borrow_mut() else {
            return 0;
        };

        let mut delivered = 0;
        loop {
            let next = channel.pending.borrow_mut().pop_front();
            let Some(command) = next else {
                break;
            };
            let messages = agent.handle_command(self, &command);
            let handler = channel.handler.borrow().clone();
            match handler {
                Some(handler) => {
                    for message in &messages {
                        handler(message);
                        delivered += 1;
                    }
                }
                None => tracing::debug!(
                    target: "jsembed::debug",
                    context = %self.id(),
                    dropped = messages.len(),
                    "no debug message handler"
                ),
            }
        }
        delivered
    }
}

// ============================================================================
// JSON agent
// ============================================================================

const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Json,
    method: String,
    #[serde(default)]
    params: Json,
}

#[derive(Debug, Serialize)]
struct Response {
    id: Json,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Json>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ResponseError>,
}

#[derive(Debug, Serialize)]
struct ResponseError {
    code: i64,
    message: String,
}

impl Response {
    fn ok(id: Json, result: Json) -> Self {
        Response {
            id,
            result: Some(result),
            error: None,
        }
    }

    fn err(id: Json, code: i64, message: impl Into<String>) -> Self {
        Response {
            id,
            result: None,
            error: Some(ResponseError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Default agent speaking a small JSON request/response envelope
///
/// Requests look like `{"id": 1, "method": "Runtime.evaluate",
/// "params": {"expression": "1 + 1"}}`. Supported methods are
/// `Runtime.evaluate`, `Runtime.getVersion` and
/// `HeapProfiler.collectGarbage`.
#[derive(Debug, Default)]
pub struct JsonDebugAgent {
    evaluations: u64,
}

impl JsonDebugAgent {
    fn dispatch(&mut self, ctx: &Context, request: Request) -> Response {
        match request.method.as_str() {
            "Runtime.evaluate" => {
                let Some(expression) = request.params.get("expression").and_then(Json::as_str) else {
                    return Response::err(request.id, INVALID_PARAMS, "missing params.expression");
                };
                self.evaluations += 1;
                let file = format!("<debug:{}>", self.evaluations);
                Response::ok(request.id, evaluate(ctx, &file, expression))
            }
            "Runtime.getVersion" => Response::ok(
                request.id,
                json!({ "product": crate::engine_version(), "protocolVersion": "1.0" }),
            ),
            "HeapProfiler.collectGarbage" => {
                ctx.idle_notification_deadline(0.0);
                Response::ok(request.id, json!({}))
            }
            other => Response::err(request.id, METHOD_NOT_FOUND, format!("method not found: {}", other)),
        }
    }
}

fn evaluate(ctx: &Context, file: &str, expression: &str) -> Json {
    let outcome = ctx
        .evaluate_transient(file, expression)
        .and_then(|value| Ok((value.get_type(), value.to_host()?)));
    match outcome {
        Ok((kind, host)) => json!({
            "result": { "type": kind.name(), "value": host.to_json(), "description": host.to_string() }
        }),
        Err(Error::Script(e)) => json!({
            "exceptionDetails": {
                "text": e.message(),
                "url": e.file_name(),
                "lineNumber": e.line_number(),
                "stackTrace": e.stack_trace(),
            }
        }),
        Err(other) => json!({ "exceptionDetails": { "text": other.to_string() } }),
    }
}

impl DebugAgent for JsonDebugAgent {
    fn handle_command(&mut self, ctx: &Context, command: &str) -> Vec<String> {
        let response = match serde_json::from_str::<Request>(command) {
            Ok(request) => self.dispatch(ctx, request),
            Err(e) => Response::err(Json::Null, PARSE_ERROR, format!("parse error: {}", e)),
        };
        match serde_json::to_string(&response) {
            Ok(text) => vec![text],
            Err(e) => {
                tracing::error!(target: "jsembed::debug", error = %e, "debug response not serializable");
                Vec::new()
            }
        }
    }
}

//! `jsembed debug`: Run a script, then drive the debug channel.
//!
//! Each command is sent verbatim; every message the agent produces is
//! printed on its own line, in order.

use super::{engine_error, EngineArgs};
use crate::output::StyledOutput;
use anyhow::Context as _;
use jsembed::{Context, ContextOptions};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub struct DebugArgs {
    pub file: PathBuf,
    pub commands: Vec<String>,
}

/// Evaluate `path`, send `commands`, and collect the replies
pub fn run_debug(
    path: &Path,
    commands: &[String],
    options: ContextOptions,
) -> anyhow::Result<Vec<String>> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let ctx = Context::new(options)?;
    let replies: Rc<RefCell<Vec<String>>> = Rc::default();
    let sink = replies.clone();
    ctx.set_debug_message_handler(move |message| sink.borrow_mut().push(message.to_owned()));

    ctx.evaluate(&path.display().to_string(), &source)
        .map_err(engine_error)?;
    for command in commands {
        ctx.send_debug_command(command);
    }
    let delivered = ctx.process_debug_messages();
    tracing::debug!(context = %ctx.id(), sent = commands.len(), delivered, "debug session finished");

    let collected = replies.borrow().clone();
    Ok(collected)
}

pub fn execute(args: DebugArgs, engine: &EngineArgs, out: &mut StyledOutput) -> anyhow::Result<()> {
    for reply in run_debug(&args.file, &args.commands, engine.to_options()?)? {
        out.debug_reply(&reply);
    }
    Ok(())
}

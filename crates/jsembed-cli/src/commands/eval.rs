//! `jsembed eval`: Evaluate an inline script.

use super::{describe, engine_error, EngineArgs};
use crate::output::StyledOutput;
use jsembed::{Context, ContextOptions};

/// File name reported for inline code
pub const EVAL_FILE_NAME: &str = "<eval>";

/// Evaluate `code` in a fresh context and drain its promise jobs
pub fn evaluate(code: &str, options: ContextOptions) -> anyhow::Result<Option<String>> {
    let ctx = Context::new(options)?;
    let value = ctx.evaluate(EVAL_FILE_NAME, code).map_err(engine_error)?;
    ctx.execute_pending_jobs().map_err(engine_error)?;
    let text = describe(&value)?;
    Ok(text)
}

pub fn execute(code: String, engine: &EngineArgs, out: &mut StyledOutput) -> anyhow::Result<()> {
    if let Some(text) = evaluate(&code, engine.to_options()?)? {
        out.result(&text);
    }
    Ok(())
}

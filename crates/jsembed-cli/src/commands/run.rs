//! `jsembed run`: Execute a script file.

use super::{describe, engine_error, EngineArgs};
use crate::output::StyledOutput;
use anyhow::Context as _;
use jsembed::{Context, ContextOptions};
use std::path::{Path, PathBuf};

pub struct RunArgs {
    pub file: PathBuf,
    pub print_json: bool,
}

/// Run the script at `path` and render its completion value
///
/// With `print_json` the value is deep-copied into host data and printed
/// as pretty JSON (`null` for `undefined`).
pub fn run_file(
    path: &Path,
    print_json: bool,
    options: ContextOptions,
) -> anyhow::Result<Option<String>> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let name = path.display().to_string();

    let ctx = Context::new(options)?;
    let value = ctx.evaluate(&name, &source).map_err(engine_error)?;
    let jobs = ctx.execute_pending_jobs().map_err(engine_error)?;
    tracing::debug!(file = %name, context = %ctx.id(), jobs, "script finished");

    let text = if print_json {
        let host = value.to_host().map_err(engine_error)?;
        Some(serde_json::to_string_pretty(&host.to_json())?)
    } else {
        describe(&value)?
    };
    Ok(text)
}

pub fn execute(args: RunArgs, engine: &EngineArgs, out: &mut StyledOutput) -> anyhow::Result<()> {
    if !args.file.exists() {
        anyhow::bail!("File not found: {}", args.file.display());
    }
    if let Some(text) = run_file(&args.file, args.print_json, engine.to_options()?)? {
        out.result(&text);
    }
    Ok(())
}

//! Subcommands and the engine flags they share.

pub mod debug;
pub mod eval;
pub mod run;
pub mod version;

use anyhow::{anyhow, Context as _};
use clap::Args;
use jsembed::{ContextOptions, Error, JsType, ScriptException, Value};
use std::fmt::Write as _;
use std::path::PathBuf;

/// Engine limits applied to the context a command creates
#[derive(Args, Debug, Clone, Default)]
pub struct EngineArgs {
    /// Heap limit in bytes
    #[arg(long, global = true)]
    pub memory_limit: Option<usize>,

    /// Native stack limit for script recursion, in bytes
    #[arg(long = "stack-size", global = true)]
    pub stack_size: Option<usize>,

    /// Allocation volume between collections, in bytes
    #[arg(long, global = true)]
    pub gc_threshold: Option<usize>,

    /// JSON file with context options; flags override its fields
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

impl EngineArgs {
    /// Resolve the config file and flags into context options
    pub fn to_options(&self) -> anyhow::Result<ContextOptions> {
        let mut options = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("invalid config {}", path.display()))?
            }
            None => ContextOptions::default(),
        };
        if let Some(bytes) = self.memory_limit {
            options = options.with_memory_limit(bytes);
        }
        if let Some(bytes) = self.stack_size {
            options = options.with_max_stack_size(bytes);
        }
        if let Some(bytes) = self.gc_threshold {
            options = options.with_gc_threshold(bytes);
        }
        Ok(options)
    }
}

/// Detach an engine error from its context
pub fn engine_error(error: Error<'_>) -> anyhow::Error {
    match error {
        Error::Script(exception) => anyhow!(format_exception(&exception)),
        other => anyhow!(other.to_string()),
    }
}

/// `Uncaught <message>` followed by the location and offending line
pub fn format_exception(exception: &ScriptException<'_>) -> String {
    let mut text = format!("Uncaught {}", exception.message());
    if let (Some(file), Some(line)) = (exception.file_name(), exception.line_number()) {
        let _ = write!(text, "\n    at {}:{}", file, line);
    }
    if let Some(source) = exception.source_line() {
        let _ = write!(text, "\n    {}", source.trim());
    }
    text
}

/// Printable form of a completion value; `None` for `undefined`
pub fn describe(value: &Value<'_>) -> anyhow::Result<Option<String>> {
    if value.is_undefined() {
        return Ok(None);
    }
    let text = match value.get_type() {
        JsType::String => value.as_string()?.to_rust_string().map_err(engine_error)?,
        JsType::Function => "[Function]".to_owned(),
        JsType::External => format!("[External {:p}]", value.as_external()?.value()),
        JsType::Object | JsType::Array => match value.to_host() {
            Ok(host) => host.to_json().to_string(),
            Err(_) => value.to_display_string().map_err(engine_error)?,
        },
        _ => value.to_display_string().map_err(engine_error)?,
    };
    Ok(Some(text))
}

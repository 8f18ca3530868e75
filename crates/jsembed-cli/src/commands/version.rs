//! `jsembed version`: Show tool and engine versions.

use crate::output::StyledOutput;

pub fn version_info() -> (String, String) {
    (
        format!("jsembed {}", env!("CARGO_PKG_VERSION")),
        jsembed::engine_version().to_owned(),
    )
}

pub fn execute(out: &mut StyledOutput) -> anyhow::Result<()> {
    let (tool, engine) = version_info();
    out.bold(&tool);
    out.newline();
    out.dim("engine: ");
    out.plain(&engine);
    out.newline();
    Ok(())
}

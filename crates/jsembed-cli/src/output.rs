//! Colored terminal output for command results and errors.
//!
//! Uses `termcolor`. Respects the `NO_COLOR` environment variable and the
//! `--color` flag.

use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Resolve `ColorChoice` from the `--color` flag and environment.
///
/// Priority: `NO_COLOR` env > `--color` flag > auto-detect TTY.
pub fn resolve_color_choice(flag: Option<&str>) -> ColorChoice {
    if std::env::var_os("NO_COLOR").is_some() {
        return ColorChoice::Never;
    }
    match flag {
        Some("always") => ColorChoice::Always,
        Some("never") => ColorChoice::Never,
        _ => ColorChoice::Auto,
    }
}

/// Styled writer over stdout and stderr.
pub struct StyledOutput {
    stdout: StandardStream,
    stderr: StandardStream,
}

impl StyledOutput {
    pub fn new(choice: ColorChoice) -> Self {
        Self {
            stdout: StandardStream::stdout(choice),
            stderr: StandardStream::stderr(choice),
        }
    }

    fn styled(stream: &mut StandardStream, text: &str, color: Option<Color>, bold: bool) {
        let mut spec = ColorSpec::new();
        spec.set_fg(color).set_bold(bold);
        let _ = stream.set_color(&spec);
        let _ = write!(stream, "{}", text);
        let _ = stream.reset();
    }

    // ── Results (stdout) ─────────────────────────────────────────────

    /// A completion value on its own line.
    pub fn result(&mut self, text: &str) {
        Self::styled(&mut self.stdout, text, Some(Color::Green), false);
        let _ = writeln!(self.stdout);
    }

    /// One debug channel message on its own line.
    pub fn debug_reply(&mut self, text: &str) {
        Self::styled(&mut self.stdout, text, Some(Color::Cyan), false);
        let _ = writeln!(self.stdout);
    }

    pub fn bold(&mut self, text: &str) {
        Self::styled(&mut self.stdout, text, None, true);
    }

    pub fn dim(&mut self, text: &str) {
        Self::styled(&mut self.stdout, text, Some(Color::White), false);
    }

    pub fn plain(&mut self, text: &str) {
        let _ = write!(self.stdout, "{}", text);
    }

    pub fn newline(&mut self) {
        let _ = writeln!(self.stdout);
    }

    // ── Errors (stderr) ──────────────────────────────────────────────

    /// `error:` label followed by the message.
    pub fn error(&mut self, text: &str) {
        let _ = self.stdout.flush();
        Self::styled(&mut self.stderr, "error: ", Some(Color::Red), true);
        let _ = writeln!(self.stderr, "{}", text);
    }
}

use crate::error::Result;
use std::io::{self, Write};

/// Central output coordinator that respects json/quiet modes.
///
/// Command results go to stdout. Diagnostics go through `tracing` on stderr.
#[derive(Debug, Clone, Copy)]
pub struct OutputContext {
    mode: OutputMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Plain text lines
    Plain,
    /// JSON output only
    Json,
    /// Minimal output (quiet mode)
    Quiet,
}

impl OutputContext {
    /// Create from CLI-style flags. `--json` wins over `--quiet`.
    #[must_use]
    pub const fn from_flags(json: bool, quiet: bool) -> Self {
        let mode = if json {
            OutputMode::Json
        } else if quiet {
            OutputMode::Quiet
        } else {
            OutputMode::Plain
        };
        Self { mode }
    }

    pub const fn mode(&self) -> OutputMode {
        self.mode
    }
    pub fn is_json(&self) -> bool {
        self.mode == OutputMode::Json
    }

    /// Print a line in plain mode only.
    pub fn print(&self, content: &str) {
        if self.mode == OutputMode::Plain {
            println!("{content}");
        }
    }

    /// Print pretty JSON in json mode only.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the stdout write fails.
    pub fn json_pretty<T: serde::Serialize>(&self, value: &T) -> Result<()> {
        if self.is_json() {
            let mut stdout = io::stdout().lock();
            serde_json::to_writer_pretty(&mut stdout, value)?;
            writeln!(stdout)?;
        }
        Ok(())
    }

    /// Print a success line in plain mode.
    pub fn success(&self, message: &str) {
        if self.mode == OutputMode::Plain {
            println!("✓ {message}");
        }
    }
}

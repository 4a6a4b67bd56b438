//! Console renderer using crossterm
//!
//! Presents a shell session in the current console: output is appended as
//! it arrives, status goes to the window title. No screen model, no cursor
//! addressing; the console scrolls on its own.

use std::io::{self, Stdout, Write};

use crossterm::{
    cursor::{SetCursorStyle, Show},
    event::{DisableBracketedPaste, EnableBracketedPaste},
    execute, queue,
    style::{Attribute, Print, ResetColor, SetAttribute},
    terminal::{self, SetTitle},
};
use tracing::warn;

use crate::core::sink::{OutputChunk, Presentation, StreamKind};

/// Console renderer
pub struct Renderer<W: Write = Stdout> {
    out: W,
    /// Whether raw mode has been enabled
    initialized: bool,
    /// Per stream: last appended text ended in `\r`
    pending_cr: [bool; 3],
    status: String,
}

impl Default for Renderer<Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer<Stdout> {
    pub fn new() -> Self {
        Self::with_writer(io::stdout())
    }
}

impl<W: Write> Renderer<W> {
    pub fn with_writer(out: W) -> Self {
        Self {
            out,
            initialized: false,
            pending_cr: [false; 3],
            status: String::new(),
        }
    }

    /// Initialize the console: raw input, bracketed paste
    pub fn init(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;
        execute!(self.out, EnableBracketedPaste)?;
        self.initialized = true;
        Ok(())
    }

    /// Restore the console
    pub fn cleanup(&mut self) -> io::Result<()> {
        if !self.initialized {
            return Ok(());
        }
        self.initialized = false;

        let _ = execute!(
            self.out,
            DisableBracketedPaste,
            ResetColor,
            SetAttribute(Attribute::Reset),
            SetCursorStyle::DefaultUserShape,
            Show
        );
        terminal::disable_raw_mode()?;

        // Leave the prompt on a fresh line
        writeln!(self.out)?;
        self.out.flush()
    }

    /// Last status shown
    pub fn status(&self) -> &str {
        &self.status
    }

    fn write_output(&mut self, stream: StreamKind, text: &str) -> io::Result<()> {
        let slot = match stream {
            StreamKind::Stdout => 0,
            StreamKind::Stderr => 1,
            StreamKind::Diagnostic => 2,
        };
        let text = normalize_newlines(text, &mut self.pending_cr[slot]);
        queue!(self.out, Print(text))?;
        self.out.flush()
    }
}

impl<W: Write> Presentation for Renderer<W> {
    fn append_output(&mut self, text: &str) {
        if let Err(e) = self.write_output(StreamKind::Stdout, text) {
            warn!("Failed to write output: {}", e);
        }
    }

    fn append_chunk(&mut self, chunk: &OutputChunk) {
        if let Err(e) = self.write_output(chunk.stream, &chunk.text) {
            warn!("Failed to write output: {}", e);
        }
    }

    fn set_status(&mut self, text: &str) {
        self.status = text.to_string();
        let title = format!("spongeshell - {}", text);
        if let Err(e) = execute!(self.out, SetTitle(title)) {
            warn!("Failed to set title: {}", e);
        }
    }

    fn request_focus(&mut self) {
        if let Err(e) = execute!(self.out, Show, SetCursorStyle::BlinkingBlock) {
            warn!("Failed to show cursor: {}", e);
        }
    }
}

/// Turn bare `\n` into `\r\n`, as raw mode does not return the carriage
///
/// `pending_cr` carries a trailing `\r` over to the next chunk so a `\r\n`
/// split across two reads is not doubled.
pub fn normalize_newlines(text: &str, pending_cr: &mut bool) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for ch in text.chars() {
        if ch == '\n' && !*pending_cr {
            out.push('\r');
        }
        out.push(ch);
        *pending_cr = ch == '\r';
    }
    out
}

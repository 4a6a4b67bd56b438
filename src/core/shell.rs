//! Shell process spawning
//!
//! Builds the child command: interactive shell, all three standard streams
//! piped, UTF-8 on the wire, started in the user's home directory.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use serde::{Deserialize, Serialize};

/// Line ending the shell expects after a command
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    /// Write bytes verbatim (`\r\n` from Enter)
    Crlf,
    /// Collapse `\r\n` to `\n` before writing
    Lf,
}

impl LineEnding {
    pub fn platform_default() -> Self {
        if cfg!(windows) {
            LineEnding::Crlf
        } else {
            LineEnding::Lf
        }
    }

    /// Rewrite outgoing input for this line ending
    pub fn apply(self, bytes: &[u8]) -> Vec<u8> {
        match self {
            LineEnding::Crlf => bytes.to_vec(),
            LineEnding::Lf => {
                let mut out = Vec::with_capacity(bytes.len());
                let mut iter = bytes.iter().peekable();
                while let Some(&b) = iter.next() {
                    if b == b'\r' && iter.peek() == Some(&&b'\n') {
                        continue;
                    }
                    out.push(b);
                }
                out
            }
        }
    }

    /// Rewrite pasted text for this line ending
    ///
    /// Terminals separate pasted lines with a bare `\r`. Under `Lf` every
    /// `\r\n` and every bare `\r` becomes `\n`.
    pub fn normalize_paste(self, bytes: &[u8]) -> Vec<u8> {
        match self {
            LineEnding::Crlf => bytes.to_vec(),
            LineEnding::Lf => {
                let mut out = Vec::with_capacity(bytes.len());
                let mut iter = bytes.iter().peekable();
                while let Some(&b) = iter.next() {
                    if b == b'\r' {
                        if iter.peek() == Some(&&b'\n') {
                            iter.next();
                        }
                        out.push(b'\n');
                    } else {
                        out.push(b);
                    }
                }
                out
            }
        }
    }
}

/// Everything needed to launch the shell
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShellCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub line_ending: LineEnding,
}

impl Default for ShellCommand {
    fn default() -> Self {
        Self::platform_default()
    }
}

impl ShellCommand {
    /// `cmd.exe` kept open in the UTF-8 code page on Windows, `$SHELL -i` elsewhere
    pub fn platform_default() -> Self {
        let program = default_program();
        let args = default_args(&program);
        Self {
            program,
            args,
            working_dir: home_dir(),
            line_ending: LineEnding::platform_default(),
        }
    }

    /// Use a different shell program with its default arguments
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self.args = default_args(&self.program);
        self
    }

    /// Human readable command line, for logs and status
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }

    /// Spawn the child with piped stdin, stdout and stderr
    pub fn spawn(&self) -> std::io::Result<Child> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("SPONGESHELL", "1")
            .env("SPONGESHELL_VERSION", env!("CARGO_PKG_VERSION"));

        if let Some(dir) = self.working_dir.as_ref().filter(|dir| dir.is_dir()) {
            command.current_dir(dir);
        }

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            use windows::Win32::System::Threading::CREATE_NO_WINDOW;

            command.creation_flags(CREATE_NO_WINDOW.0);
        }

        command.spawn()
    }
}

fn default_program() -> String {
    if cfg!(windows) {
        "cmd.exe".to_string()
    } else {
        std::env::var("SHELL")
            .ok()
            .filter(|shell| !shell.is_empty())
            .unwrap_or_else(|| "/bin/sh".to_string())
    }
}

/// Arguments that keep the shell alive and reading from stdin
fn default_args(program: &str) -> Vec<String> {
    let lower = program.to_lowercase();
    let name = lower
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(lower.as_str());

    if name == "cmd.exe" || name == "cmd" {
        // Switch the console to UTF-8 before the first prompt
        vec!["/K".to_string(), "chcp 65001 >nul".to_string()]
    } else if name.contains("powershell") || name.contains("pwsh") {
        vec![
            "-NoExit".to_string(),
            "-Command".to_string(),
            "[Console]::OutputEncoding = [System.Text.Encoding]::UTF8".to_string(),
        ]
    } else if cfg!(windows) {
        Vec::new()
    } else {
        vec!["-i".to_string()]
    }
}

/// User's home directory
pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .filter(|dir: &OsString| !dir.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lf_collapses_crlf() {
        assert_eq!(LineEnding::Lf.apply(b"dir\r\n"), b"dir\n".to_vec());
        assert_eq!(LineEnding::Lf.apply(b"a\rb\r\n\r\n"), b"a\rb\n\n".to_vec());
        assert_eq!(LineEnding::Lf.apply(b"\x1b[A"), b"\x1b[A".to_vec());
    }

    #[test]
    fn test_crlf_is_verbatim() {
        assert_eq!(LineEnding::Crlf.apply(b"dir\r\n"), b"dir\r\n".to_vec());
        assert_eq!(LineEnding::Crlf.normalize_paste(b"a\rb\r\n"), b"a\rb\r\n".to_vec());
    }

    #[test]
    fn test_paste_lines_become_lf() {
        assert_eq!(
            LineEnding::Lf.normalize_paste(b"echo one\recho two\r"),
            b"echo one\necho two\n".to_vec()
        );
        assert_eq!(
            LineEnding::Lf.normalize_paste(b"a\r\nb\nc\r\r"),
            b"a\nb\nc\n\n".to_vec()
        );
    }

    #[test]
    fn test_default_args() {
        assert_eq!(default_args("cmd.exe"), vec!["/K", "chcp 65001 >nul"]);
        assert_eq!(default_args(r"C:\Windows\System32\CMD.EXE"), vec!["/K", "chcp 65001 >nul"]);
        assert_eq!(default_args("pwsh.exe")[0], "-NoExit");
        if cfg!(unix) {
            assert_eq!(default_args("/bin/bash"), vec!["-i"]);
        }
    }

    #[test]
    fn test_display() {
        let command = ShellCommand {
            program: "/bin/sh".to_string(),
            args: vec!["-i".to_string()],
            working_dir: None,
            line_ending: LineEnding::Lf,
        };
        assert_eq!(command.display(), "/bin/sh -i");
        assert_eq!(command.with_program("cmd.exe").display(), "cmd.exe /K chcp 65001 >nul");
    }

    #[test]
    #[cfg(unix)]
    fn test_spawn_missing_program() {
        let command = ShellCommand::default().with_program("/nonexistent/spongeshell-shell");
        assert!(command.spawn().is_err());
    }
}

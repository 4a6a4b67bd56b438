//! Shell session bridge.
//!
//! Everything between a key press and the shell, and between the shell and
//! the text on screen:
//!
//! - **keys**: key identifiers and modifier snapshots
//! - **encoder**: key events to the bytes the shell expects
//! - **shell**: building and spawning the child shell process
//! - **pump**: blocking read loops draining stdout and stderr
//! - **sink**: the event channel between pumps and the presentation layer
//! - **session**: lifecycle of one shell and the manager that restarts it
//!
//! # Architecture
//!
//! ```text
//! SessionManager
//! └── ShellSession
//!     ├── Child
//!     ├── stdin writer <── send (queued)
//!     ├── OutputPump (stdout) ─┐
//!     ├── OutputPump (stderr) ─┼─> OutputSink ─> Receiver (UI thread)
//!     └── exit watcher ────────┘
//! ```

pub mod encoder;
pub mod keys;
pub mod pump;
pub mod session;
pub mod shell;
pub mod sink;

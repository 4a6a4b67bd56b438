//! Console presentation layer.
//!
//! - **renderer**: implements `Presentation` on top of the current console
//! - **keymapper**: console key events to bridge key events and hotkeys

pub mod keymapper;
pub mod renderer;

pub use keymapper::*;
pub use renderer::*;

//! Console front end: wires the session manager to the renderer and the
//! keyboard.

use std::sync::mpsc::Receiver;
use std::time::Duration;

use crossterm::event::{self, Event};
use tracing::info;

use crate::core::session::SessionManager;
use crate::core::shell::ShellCommand;
use crate::core::sink::{dispatch, OutputSink, Presentation, SessionEvent};
use crate::ui::{Hotkey, Input, KeyMapper, Renderer};

/// Resolved run settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub command: ShellCommand,
    /// Quit when the shell exits instead of waiting for Ctrl+R or Ctrl+Q
    pub close_on_exit: bool,
}

/// Run the console front end until the user quits
pub fn run(settings: Settings) -> anyhow::Result<()> {
    let (sink, events) = OutputSink::channel();
    let mut manager = SessionManager::new(settings.command, sink);
    info!(
        "Shell: {} (close on exit: {})",
        manager.command().display(),
        settings.close_on_exit
    );

    let mut renderer = Renderer::new();
    renderer.init()?;

    let result = run_main_loop(&mut manager, &events, &mut renderer, settings.close_on_exit);

    manager.stop();
    // Flush the final status and ended marker before restoring the console
    deliver(&events, &mut renderer);
    let _ = renderer.cleanup();
    info!("Closed: {}", renderer.status());

    result
}

fn run_main_loop(
    manager: &mut SessionManager,
    events: &Receiver<SessionEvent>,
    renderer: &mut Renderer,
    close_on_exit: bool,
) -> anyhow::Result<()> {
    let poll_timeout = Duration::from_millis(10);

    manager.start();

    loop {
        if deliver(events, renderer) && close_on_exit {
            info!("Shell exited, closing");
            break;
        }

        if !event::poll(poll_timeout)? {
            continue;
        }

        match event::read()? {
            Event::Key(key_event) => match KeyMapper::map(&key_event) {
                Input::Hotkey(Hotkey::Quit) => {
                    info!("Quit requested");
                    break;
                }
                Input::Hotkey(Hotkey::Restart) => manager.start(),
                Input::Key(key) => {
                    manager.send_key(&key);
                }
                Input::Ignored => {}
            },
            Event::Paste(text) => manager.paste(&text),
            _ => {}
        }
    }

    Ok(())
}

/// Apply every pending event to `surface`, returning whether the shell exited
pub fn deliver<P: Presentation + ?Sized>(events: &Receiver<SessionEvent>, surface: &mut P) -> bool {
    let mut exited = false;
    for event in events.try_iter() {
        if matches!(event, SessionEvent::Exited { .. }) {
            exited = true;
        }
        dispatch(event, surface);
    }
    exited
}

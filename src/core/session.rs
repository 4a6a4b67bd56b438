//! Session management
//!
//! A [`ShellSession`] owns one child shell: its process handle, the input
//! writer thread, the two output pumps and the exit watcher. It goes through
//! `NotStarted → Starting → Running → Exited` once and is never reused;
//! [`SessionManager`] replaces it with a fresh one on the next start.

use std::io::{self, Write};
use std::process::{Child, ChildStdin};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::encoder;
use super::keys::KeyEvent;
use super::pump::{CancelToken, OutputPump};
use super::shell::{LineEnding, ShellCommand};
use super::sink::{OutputSink, StreamKind};

/// How often the watcher checks whether the child exited
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

pub const STATUS_STARTING: &str = "Starting shell...";
pub const STATUS_RUNNING: &str = "Shell running, type commands";
pub const STATUS_FAILED: &str = "Shell failed to start";
pub const STATUS_CLOSED: &str = "Shell closed";

/// Terminal chunk appended once per session
pub const SESSION_ENDED_MESSAGE: &str = "\r\n[Shell session ended]\r\n";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Child process has no {0} pipe")]
    MissingPipe(&'static str),

    #[error("Failed to start worker thread: {0}")]
    Thread(#[source] io::Error),

    #[error("Session is not running")]
    NotRunning,

    #[error("Input writer has stopped")]
    WriterClosed,

    #[error("Failed to write to shell: {0}")]
    Write(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Session lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    Starting,
    Running,
    Exited,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared with the watcher thread
struct Shared {
    state: Mutex<SessionState>,
    /// Mirrors `state == Running`; only written while `state` is locked
    running: Arc<AtomicBool>,
    cancel: CancelToken,
    child: Mutex<Option<Child>>,
    /// Feeds the writer thread; dropping it closes the shell's stdin
    input: Mutex<Option<Sender<Vec<u8>>>>,
    sink: OutputSink,
}

impl Shared {
    fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    fn set_state(&self, next: SessionState) {
        let mut state = lock(&self.state);
        *state = next;
        self.running
            .store(next == SessionState::Running, Ordering::SeqCst);
    }

    /// Kill the child and reap it
    fn terminate(&self) -> Option<i32> {
        let mut child = lock(&self.child);
        let child = child.as_mut()?;
        if let Err(e) = child.kill() {
            debug!("kill failed: {}", e);
        }
        match child.wait() {
            Ok(status) => status.code(),
            Err(e) => {
                warn!("wait failed: {}", e);
                None
            }
        }
    }

    /// Move to `Exited` and report it. Returns false if already exited.
    fn finish(&self, code: Option<i32>) -> bool {
        {
            let mut state = lock(&self.state);
            if *state == SessionState::Exited {
                return false;
            }
            *state = SessionState::Exited;
            self.running.store(false, Ordering::SeqCst);
        }

        self.cancel.cancel();
        lock(&self.input).take();

        info!("Shell exited (code {:?})", code);
        self.sink.status(STATUS_CLOSED);
        self.sink.diagnostic(SESSION_ENDED_MESSAGE);
        self.sink.exited(code);
        true
    }
}

/// Poll the child until it exits or the session is cancelled
fn watch_exit(shared: Arc<Shared>) {
    loop {
        if shared.cancel.is_cancelled() {
            return;
        }

        let status = match lock(&shared.child).as_mut() {
            Some(child) => child.try_wait(),
            None => return,
        };

        match status {
            Ok(Some(status)) => {
                shared.finish(status.code());
                return;
            }
            Ok(None) => thread::sleep(EXIT_POLL_INTERVAL),
            Err(e) => {
                warn!("Failed to query shell status: {}", e);
                shared.finish(None);
                return;
            }
        }
    }
}

/// Write queued input to the shell until the sender is dropped
fn write_input(mut stdin: ChildStdin, input: Receiver<Vec<u8>>) -> Result<()> {
    for bytes in input {
        stdin
            .write_all(&bytes)
            .and_then(|_| stdin.flush())
            .map_err(SessionError::Write)?;
    }
    Ok(())
}

/// One spawned shell instance
pub struct ShellSession {
    shared: Arc<Shared>,
    line_ending: LineEnding,
    pid: Option<u32>,
    /// Taken by the writer thread once workers start
    stdin: Option<ChildStdin>,
    watcher: Option<JoinHandle<()>>,
}

impl ShellSession {
    fn new(line_ending: LineEnding, sink: OutputSink) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SessionState::NotStarted),
                running: Arc::new(AtomicBool::new(false)),
                cancel: CancelToken::new(),
                child: Mutex::new(None),
                input: Mutex::new(None),
                sink,
            }),
            line_ending,
            pid: None,
            stdin: None,
            watcher: None,
        }
    }

    /// Spawn the shell and its pumps
    ///
    /// Never fails: a spawn error is reported through the sink and leaves
    /// the session `Exited`.
    pub fn launch(command: &ShellCommand, sink: OutputSink) -> Self {
        let mut session = Self::new(command.line_ending, sink);
        session.start(command);
        session
    }

    fn start(&mut self, command: &ShellCommand) {
        self.shared.set_state(SessionState::Starting);
        self.shared.sink.status(STATUS_STARTING);
        info!("Starting shell: {}", command.display());

        match self.spawn_child(command) {
            Ok(()) => {
                self.shared.sink.status(STATUS_RUNNING);
                self.shared.sink.focus();
                if let Err(e) = self.spawn_workers() {
                    error!("{}", e);
                    self.shared
                        .sink
                        .diagnostic(format!("\r\n[Error] {}\r\n", e));
                    self.stop();
                }
            }
            Err(e) => {
                error!("Failed to start shell: {}", e);
                self.shared.set_state(SessionState::Exited);
                self.shared
                    .sink
                    .diagnostic(format!("\r\n[Error] Failed to start shell: {}\r\n", e));
                self.shared.sink.status(STATUS_FAILED);
            }
        }
    }

    fn spawn_child(&mut self, command: &ShellCommand) -> Result<()> {
        let mut child = command.spawn().map_err(|source| SessionError::Spawn {
            program: command.program.clone(),
            source,
        })?;

        let (Some(stdin), true, true) = (
            child.stdin.take(),
            child.stdout.is_some(),
            child.stderr.is_some(),
        ) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SessionError::MissingPipe("stdio"));
        };

        self.pid = Some(child.id());
        self.stdin = Some(stdin);
        *lock(&self.shared.child) = Some(child);
        self.shared.set_state(SessionState::Running);
        info!("Shell running (pid {})", self.pid.unwrap_or_default());
        Ok(())
    }

    fn spawn_workers(&mut self) -> Result<()> {
        let (stdout, stderr) = {
            let mut child = lock(&self.shared.child);
            let child = child.as_mut().ok_or(SessionError::NotRunning)?;
            (
                child.stdout.take().ok_or(SessionError::MissingPipe("stdout"))?,
                child.stderr.take().ok_or(SessionError::MissingPipe("stderr"))?,
            )
        };

        let stdout = OutputPump::new(
            stdout,
            StreamKind::Stdout,
            self.shared.sink.clone(),
            self.shared.cancel.clone(),
            self.shared.running.clone(),
        );
        let stderr = OutputPump::new(
            stderr,
            StreamKind::Stderr,
            self.shared.sink.clone(),
            self.shared.cancel.clone(),
            self.shared.running.clone(),
        );
        // Pumps end by themselves once the pipes close
        stdout.spawn().map_err(SessionError::Thread)?;
        stderr.spawn().map_err(SessionError::Thread)?;

        let stdin = self.stdin.take().ok_or(SessionError::MissingPipe("stdin"))?;
        let (tx, rx) = mpsc::channel::<Vec<u8>>();
        thread::Builder::new()
            .name("stdin-writer".to_string())
            .spawn(move || {
                if let Err(e) = write_input(stdin, rx) {
                    debug!("Input writer stopped: {}", e);
                }
            })
            .map_err(SessionError::Thread)?;
        *lock(&self.shared.input) = Some(tx);

        let shared = self.shared.clone();
        let watcher = thread::Builder::new()
            .name("exit-watcher".to_string())
            .spawn(move || watch_exit(shared))
            .map_err(SessionError::Thread)?;
        self.watcher = Some(watcher);
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Process id of the shell, once spawned
    #[allow(dead_code)]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Write input to the shell, dropping it on failure
    pub fn send(&self, bytes: &[u8]) {
        if let Err(e) = self.try_send(bytes) {
            debug!("Input dropped: {}", e);
        }
    }

    /// Queue input for the writer thread. Never waits on the pipe.
    pub fn try_send(&self, bytes: &[u8]) -> Result<()> {
        if !self.is_running() {
            return Err(SessionError::NotRunning);
        }
        let bytes = self.line_ending.apply(bytes);
        let input = lock(&self.shared.input);
        let tx = input.as_ref().ok_or(SessionError::NotRunning)?;
        tx.send(bytes).map_err(|_| SessionError::WriterClosed)
    }

    /// Queue pasted text, with line breaks rewritten for the shell
    pub fn paste(&self, text: &str) {
        self.send(&self.line_ending.normalize_paste(text.as_bytes()));
    }

    /// Kill the shell. Reports the exit once, however often it is called.
    pub fn stop(&self) {
        if self.state() != SessionState::Running {
            return;
        }
        let code = self.shared.terminate();
        self.shared.finish(code);
    }
}

impl Drop for ShellSession {
    fn drop(&mut self) {
        self.stop();
        self.shared.cancel.cancel();

        if let Some(handle) = self.watcher.take() {
            let _ = handle.join();
        }
    }
}

/// Owns the current session and starts a new one on request
pub struct SessionManager {
    command: ShellCommand,
    sink: OutputSink,
    session: Option<ShellSession>,
    spawn_attempts: usize,
}

impl SessionManager {
    pub fn new(command: ShellCommand, sink: OutputSink) -> Self {
        Self {
            command,
            sink,
            session: None,
            spawn_attempts: 0,
        }
    }

    /// Start a shell unless one is already running
    pub fn start(&mut self) {
        if self.is_running() {
            debug!("Shell already running, start ignored");
            return;
        }

        // The previous session is already exited; dropping it joins its watcher
        self.session = None;
        self.spawn_attempts += 1;
        self.session = Some(ShellSession::launch(&self.command, self.sink.clone()));
    }

    /// Write raw input to the running shell
    pub fn send(&self, bytes: &[u8]) {
        match &self.session {
            Some(session) => session.send(bytes),
            None => debug!("Input dropped: no session"),
        }
    }

    /// Send pasted text to the running shell
    pub fn paste(&self, text: &str) {
        match &self.session {
            Some(session) => session.paste(text),
            None => debug!("Paste dropped: no session"),
        }
    }

    /// Encode a key event and send it. Returns false for unmapped keys.
    pub fn send_key(&self, event: &KeyEvent) -> bool {
        match encoder::encode_event(event) {
            Some(bytes) => {
                self.send(&bytes);
                true
            }
            None => {
                debug!("Unmapped key: {:?}", event.key);
                false
            }
        }
    }

    pub fn stop(&self) {
        if let Some(session) = &self.session {
            session.stop();
        }
    }

    #[allow(dead_code)]
    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map_or(SessionState::NotStarted, ShellSession::state)
    }

    pub fn is_running(&self) -> bool {
        self.session.as_ref().is_some_and(ShellSession::is_running)
    }

    #[allow(dead_code)]
    pub fn pid(&self) -> Option<u32> {
        self.session.as_ref().and_then(ShellSession::pid)
    }

    /// Number of processes this manager tried to spawn
    #[allow(dead_code)]
    pub fn spawn_attempts(&self) -> usize {
        self.spawn_attempts
    }

    pub fn command(&self) -> &ShellCommand {
        &self.command
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::keys::{Key, Modifiers};
    use crate::core::sink::SessionEvent;
    use std::sync::mpsc::Receiver;
    use std::time::Instant;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn sh() -> ShellCommand {
        ShellCommand {
            program: "/bin/sh".to_string(),
            args: Vec::new(),
            working_dir: None,
            line_ending: LineEnding::Lf,
        }
    }

    /// Collect events until `done` matches one of them or the timeout hits
    fn collect_until(
        rx: &Receiver<SessionEvent>,
        mut done: impl FnMut(&SessionEvent) -> bool,
    ) -> Vec<SessionEvent> {
        let deadline = Instant::now() + TIMEOUT;
        let mut events = Vec::new();
        while let Some(left) = deadline.checked_duration_since(Instant::now()) {
            match rx.recv_timeout(left) {
                Ok(event) => {
                    let stop = done(&event);
                    events.push(event);
                    if stop {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
        events
    }

    fn output_text(events: &[SessionEvent], stream: StreamKind) -> String {
        events
            .iter()
            .filter_map(|event| match event {
                SessionEvent::Output(chunk) if chunk.stream == stream => Some(chunk.text.as_str()),
                _ => None,
            })
            .collect()
    }

    fn count_ended(events: &[SessionEvent]) -> usize {
        events
            .iter()
            .filter(|event| {
                matches!(event, SessionEvent::Output(chunk) if chunk.text == SESSION_ENDED_MESSAGE)
            })
            .count()
    }

    fn count_exited(events: &[SessionEvent]) -> usize {
        events
            .iter()
            .filter(|event| matches!(event, SessionEvent::Exited { .. }))
            .count()
    }

    #[test]
    fn test_not_started() {
        let (sink, _rx) = OutputSink::channel();
        let manager = SessionManager::new(sh(), sink);
        assert_eq!(manager.state(), SessionState::NotStarted);
        assert!(!manager.is_running());
        manager.send(b"ignored\n");
    }

    #[test]
    fn test_spawn_failure() {
        let (sink, rx) = OutputSink::channel();
        let mut command = sh();
        command.program = "/nonexistent/spongeshell-shell".to_string();
        let mut manager = SessionManager::new(command, sink);

        manager.start();

        assert_eq!(manager.state(), SessionState::Exited);
        assert!(!manager.is_running());
        assert_eq!(manager.pid(), None);

        drop(manager);
        let events: Vec<_> = rx.try_iter().collect();
        let chunks: Vec<_> = events
            .iter()
            .filter_map(|event| match event {
                SessionEvent::Output(chunk) => Some(chunk),
                _ => None,
            })
            .collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].stream, StreamKind::Diagnostic);
        assert!(chunks[0].text.contains("Failed to start shell"));
        assert!(chunks[0].text.contains("/nonexistent/spongeshell-shell"));
        assert_eq!(count_exited(&events), 0);
        assert_eq!(
            events.last(),
            Some(&SessionEvent::Status(STATUS_FAILED.to_string()))
        );
    }

    #[test]
    fn test_start_is_idempotent() {
        let (sink, rx) = OutputSink::channel();
        let mut manager = SessionManager::new(sh(), sink);

        manager.start();
        let pid = manager.pid();
        assert!(pid.is_some());
        assert_eq!(manager.state(), SessionState::Running);

        manager.start();
        assert_eq!(manager.pid(), pid);
        assert_eq!(manager.spawn_attempts(), 1);

        manager.stop();
        let events = collect_until(&rx, |e| matches!(e, SessionEvent::Exited { .. }));
        let running = events
            .iter()
            .filter(|e| **e == SessionEvent::Status(STATUS_RUNNING.to_string()))
            .count();
        assert_eq!(running, 1);
    }

    #[test]
    fn test_round_trip() {
        let (sink, rx) = OutputSink::channel();
        let mut manager = SessionManager::new(sh(), sink);
        manager.start();

        for ch in "echo hello".chars() {
            let key = match ch {
                ' ' => Key::Space,
                c => Key::Letter(c),
            };
            assert!(manager.send_key(&KeyEvent::new(key, Modifiers::empty())));
        }
        assert!(manager.send_key(&KeyEvent::new(Key::Enter, Modifiers::empty())));

        let mut seen = String::new();
        collect_until(&rx, |event| {
            if let SessionEvent::Output(chunk) = event {
                if chunk.stream == StreamKind::Stdout {
                    seen.push_str(&chunk.text);
                }
            }
            seen.contains("hello")
        });
        assert!(seen.contains("hello"), "got {:?}", seen);
    }

    #[test]
    fn test_stderr_is_pumped() {
        let (sink, rx) = OutputSink::channel();
        let mut manager = SessionManager::new(sh(), sink);
        manager.start();

        manager.send(b"echo oops 1>&2\r\n");
        let events = collect_until(&rx, |event| {
            matches!(event, SessionEvent::Output(chunk)
                if chunk.stream == StreamKind::Stderr && chunk.text.contains("oops"))
        });
        assert!(output_text(&events, StreamKind::Stderr).contains("oops"));
    }

    #[test]
    fn test_send_does_not_wait_for_busy_shell() {
        let (sink, _rx) = OutputSink::channel();
        let mut manager = SessionManager::new(sh(), sink);
        manager.start();

        // Far more than a pipe buffer, while the shell is not reading
        manager.send(b"sleep 3\n");
        thread::sleep(Duration::from_millis(100));
        let started = Instant::now();
        manager.send(&[b'#'; 512 * 1024]);
        let elapsed = started.elapsed();

        assert!(elapsed < Duration::from_secs(1), "send took {:?}", elapsed);
        assert!(manager.is_running());
    }

    #[test]
    fn test_paste_runs_each_line() {
        let (sink, rx) = OutputSink::channel();
        let mut manager = SessionManager::new(sh(), sink);
        manager.start();

        manager.paste("echo one\recho two\r");
        let mut seen = String::new();
        collect_until(&rx, |event| {
            if let SessionEvent::Output(chunk) = event {
                if chunk.stream == StreamKind::Stdout {
                    seen.push_str(&chunk.text);
                }
            }
            seen.contains("two")
        });
        assert!(seen.contains("one\n"), "got {:?}", seen);
        assert!(seen.contains("two\n"), "got {:?}", seen);
    }

    #[test]
    fn test_unmapped_key_sends_nothing() {
        let (sink, _rx) = OutputSink::channel();
        let mut manager = SessionManager::new(sh(), sink);
        manager.start();
        assert!(!manager.send_key(&KeyEvent::new(Key::Other, Modifiers::empty())));
    }

    #[test]
    fn test_explicit_stop_reports_once() {
        let (sink, rx) = OutputSink::channel();
        let mut manager = SessionManager::new(sh(), sink);
        manager.start();

        manager.stop();
        manager.stop();
        assert_eq!(manager.state(), SessionState::Exited);
        assert!(!manager.is_running());

        // Give a racing watcher time to report as well, if it were going to
        thread::sleep(EXIT_POLL_INTERVAL * 5);
        manager.stop();
        drop(manager);

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(count_ended(&events), 1);
        assert_eq!(count_exited(&events), 1);
    }

    #[test]
    fn test_spontaneous_exit_reports_once() {
        let (sink, rx) = OutputSink::channel();
        let mut manager = SessionManager::new(sh(), sink);
        manager.start();

        manager.send(b"exit 3\r\n");
        let mut events = collect_until(&rx, |e| matches!(e, SessionEvent::Exited { .. }));
        assert_eq!(events.last(), Some(&SessionEvent::Exited { code: Some(3) }));
        assert_eq!(manager.state(), SessionState::Exited);

        manager.stop();
        manager.send(b"echo too late\r\n");
        drop(manager);
        events.extend(rx.try_iter());

        assert_eq!(count_ended(&events), 1);
        assert_eq!(count_exited(&events), 1);
    }

    #[test]
    fn test_restart_after_exit() {
        let (sink, rx) = OutputSink::channel();
        let mut manager = SessionManager::new(sh(), sink);
        manager.start();
        let first = manager.pid();

        manager.stop();
        collect_until(&rx, |e| matches!(e, SessionEvent::Exited { .. }));

        manager.start();
        assert!(manager.is_running());
        assert_eq!(manager.spawn_attempts(), 2);
        assert_ne!(manager.pid(), first);
    }

    #[test]
    fn test_send_after_exit_is_rejected() {
        let (sink, _rx) = OutputSink::channel();
        let session = ShellSession::launch(&sh(), sink);
        assert!(session.try_send(b"true\n").is_ok());

        session.stop();
        assert!(matches!(
            session.try_send(b"true\n"),
            Err(SessionError::NotRunning)
        ));
    }
}

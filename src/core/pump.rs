//! Output pumps
//!
//! One blocking read loop per child stream. Stdout and stderr each get
//! their own thread; reading only one of them would let the other fill its
//! pipe and stall the shell.

use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use super::sink::{OutputSink, StreamKind};

/// Bytes requested per read
pub const READ_BUFFER_SIZE: usize = 4096;

/// Appended when a stream fails while the session is still up
pub const STREAM_ENDED_MESSAGE: &str = "\r\n[Output stream ended]\r\n";

/// Shared one-shot cancellation flag
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Incremental UTF-8 decoder
///
/// A read can end in the middle of a multi-byte sequence; the partial tail
/// is held back until the next read completes it.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `bytes` as possible
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::with_capacity(self.pending.len());
        let mut rest: &[u8] = &self.pending;

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            // Incomplete sequence at the end, keep it
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        self.pending = rest.to_vec();
        out
    }

    /// Flush whatever is left at end of stream
    pub fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }
}

/// Remove NUL characters, keeping everything else in order
pub fn strip_nulls(text: &str) -> String {
    text.chars().filter(|&c| c != '\0').collect()
}

/// Why a pump stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    EndOfStream,
    Cancelled,
    SessionEnded,
    ReadFailed,
}

/// Read loop for one child stream
pub struct OutputPump<R> {
    reader: R,
    stream: StreamKind,
    sink: OutputSink,
    cancel: CancelToken,
    running: Arc<AtomicBool>,
}

impl<R: Read> OutputPump<R> {
    /// `running` mirrors the owning session's running flag
    pub fn new(
        reader: R,
        stream: StreamKind,
        sink: OutputSink,
        cancel: CancelToken,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            reader,
            stream,
            sink,
            cancel,
            running,
        }
    }

    /// Pump until EOF, cancellation, session end or a read error
    pub fn run(mut self) -> PumpExit {
        let mut buffer = [0u8; READ_BUFFER_SIZE];
        let mut decoder = Utf8Decoder::new();

        let exit = loop {
            if self.cancel.is_cancelled() {
                break PumpExit::Cancelled;
            }
            if !self.running.load(Ordering::SeqCst) {
                break PumpExit::SessionEnded;
            }

            match self.reader.read(&mut buffer) {
                Ok(0) => {
                    self.forward(&decoder.finish());
                    break PumpExit::EndOfStream;
                }
                Ok(n) => {
                    let text = decoder.decode(&buffer[..n]);
                    self.forward(&text);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    if self.cancel.is_cancelled() {
                        break PumpExit::Cancelled;
                    }
                    if self.running.load(Ordering::SeqCst) {
                        warn!("{:?} read failed: {}", self.stream, e);
                        self.sink.diagnostic(STREAM_ENDED_MESSAGE);
                    }
                    break PumpExit::ReadFailed;
                }
            }
        };

        debug!("{:?} pump finished: {:?}", self.stream, exit);
        exit
    }

    fn forward(&self, text: &str) {
        let text = strip_nulls(text);
        if !text.is_empty() {
            self.sink.output(self.stream, text);
        }
    }
}

impl<R: Read + Send + 'static> OutputPump<R> {
    /// Run the pump on its own named thread
    pub fn spawn(self) -> std::io::Result<JoinHandle<PumpExit>> {
        let name = match self.stream {
            StreamKind::Stdout => "stdout-pump",
            StreamKind::Stderr => "stderr-pump",
            StreamKind::Diagnostic => "pump",
        };
        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || self.run())
    }
}

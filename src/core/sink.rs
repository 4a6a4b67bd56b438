//! Output delivery
//!
//! Pumps and the session manager never touch the presentation surface.
//! They post [`SessionEvent`]s into a single-consumer channel; whoever owns
//! the receiver (the UI thread) applies them one at a time with
//! [`dispatch`]. One chunk is one message, so a chunk is always appended
//! whole before the next one starts.

use std::sync::mpsc::{self, Receiver, Sender};

/// Where a chunk came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
    /// Message produced by the bridge itself
    Diagnostic,
}

/// Decoded text from one read on one stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputChunk {
    pub stream: StreamKind,
    pub text: String,
}

/// Session events
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// Text to append to the output view
    Output(OutputChunk),
    /// Status line changed
    Status(String),
    /// Input surface should take focus
    Focus,
    /// Shell process is gone
    Exited { code: Option<i32> },
}

/// Capability interface implemented by every presentation layer
pub trait Presentation {
    fn append_output(&mut self, text: &str);

    /// Append one chunk; surfaces that track per-stream state override this
    fn append_chunk(&mut self, chunk: &OutputChunk) {
        self.append_output(&chunk.text);
    }

    fn set_status(&mut self, text: &str);

    fn request_focus(&mut self);

    /// Called once per session after the terminal chunk was appended
    fn session_exited(&mut self, _code: Option<i32>) {}
}

/// Apply one event to a presentation surface
pub fn dispatch<P: Presentation + ?Sized>(event: SessionEvent, surface: &mut P) {
    match event {
        SessionEvent::Output(chunk) => surface.append_chunk(&chunk),
        SessionEvent::Status(text) => surface.set_status(&text),
        SessionEvent::Focus => surface.request_focus(),
        SessionEvent::Exited { code } => surface.session_exited(code),
    }
}

/// Sending half of the delivery channel
///
/// Cloned into every pump. Sends never block; if the receiver is gone the
/// event is dropped, since there is nobody left to show it to.
#[derive(Clone, Debug)]
pub struct OutputSink {
    tx: Sender<SessionEvent>,
}

impl OutputSink {
    /// Create a sink and the receiver the UI thread drains
    pub fn channel() -> (Self, Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }

    pub fn output(&self, stream: StreamKind, text: impl Into<String>) {
        self.send(SessionEvent::Output(OutputChunk {
            stream,
            text: text.into(),
        }));
    }

    pub fn diagnostic(&self, text: impl Into<String>) {
        self.output(StreamKind::Diagnostic, text);
    }

    pub fn status(&self, text: impl Into<String>) {
        self.send(SessionEvent::Status(text.into()));
    }

    pub fn focus(&self) {
        self.send(SessionEvent::Focus);
    }

    pub fn exited(&self, code: Option<i32>) {
        self.send(SessionEvent::Exited { code });
    }

    fn send(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("event receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[derive(Default)]
    struct Recorder {
        output: Vec<String>,
        status: Vec<String>,
        focus: usize,
        exits: Vec<Option<i32>>,
    }

    impl Presentation for Recorder {
        fn append_output(&mut self, text: &str) {
            self.output.push(text.to_string());
        }

        fn set_status(&mut self, text: &str) {
            self.status.push(text.to_string());
        }

        fn request_focus(&mut self) {
            self.focus += 1;
        }

        fn session_exited(&mut self, code: Option<i32>) {
            self.exits.push(code);
        }
    }

    #[test]
    fn test_dispatch_routes_events() {
        let (sink, rx) = OutputSink::channel();
        sink.status("Starting shell...");
        sink.output(StreamKind::Stdout, "hello");
        sink.focus();
        sink.exited(Some(0));
        drop(sink);

        let mut recorder = Recorder::default();
        for event in rx {
            dispatch(event, &mut recorder);
        }

        assert_eq!(recorder.output, vec!["hello"]);
        assert_eq!(recorder.status, vec!["Starting shell..."]);
        assert_eq!(recorder.focus, 1);
        assert_eq!(recorder.exits, vec![Some(0)]);
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (sink, rx) = OutputSink::channel();
        drop(rx);
        sink.diagnostic("nobody listening");
    }

    #[test]
    fn test_concurrent_chunks_arrive_whole() {
        let (sink, rx) = OutputSink::channel();
        let producers: Vec<_> = [(StreamKind::Stdout, 'o'), (StreamKind::Stderr, 'e')]
            .into_iter()
            .map(|(stream, fill)| {
                let sink = sink.clone();
                thread::spawn(move || {
                    for i in 0..500 {
                        let text = format!("{}:{}", i, fill.to_string().repeat(64));
                        sink.output(stream, text);
                    }
                })
            })
            .collect();
        drop(sink);
        for producer in producers {
            producer.join().unwrap();
        }

        let mut next = [0usize; 2];
        for event in rx {
            let SessionEvent::Output(chunk) = event else {
                panic!("unexpected event");
            };
            let (slot, fill) = match chunk.stream {
                StreamKind::Stdout => (0, 'o'),
                StreamKind::Stderr => (1, 'e'),
                StreamKind::Diagnostic => panic!("unexpected diagnostic"),
            };
            assert_eq!(chunk.text, format!("{}:{}", next[slot], fill.to_string().repeat(64)));
            next[slot] += 1;
        }
        assert_eq!(next, [500, 500]);
    }
}

//! Native bridge command protocol
//!
//! Every interaction with the platform speech service is an asynchronous
//! request answered by zero or more completions. Bridges deliver completions
//! through a [`CompletionSender`]; the client drains them on its own thread.

pub mod backends;
pub mod recording;

use crate::{BridgeError, Result};
use serde_json::{json, Value};
use std::fmt;
use std::sync::mpsc::{Receiver, Sender};

/// Identifies one request for the lifetime of the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Commands understood by the native speech service
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Prime the native subsystem and report its voices
    Startup,
    /// List installed engines
    GetEngines,
    /// Report the engine the platform uses by default
    GetDefaultEngine,
    /// Speak an utterance payload; events stream back on the same request
    Speak(Value),
    /// Silence and drop everything queued
    Cancel,
    /// Pause the current utterance
    Pause,
    /// Resume a paused utterance
    Resume,
    /// Switch engine by name and report its voices
    SetEngine(String),
}

impl Command {
    /// Wire action name
    pub fn action(&self) -> &'static str {
        match self {
            Command::Startup => "startup",
            Command::GetEngines => "getEngines",
            Command::GetDefaultEngine => "getDefaultEngine",
            Command::Speak(_) => "speak",
            Command::Cancel => "cancel",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::SetEngine(_) => "setEngine",
        }
    }

    /// Positional arguments as sent on the wire
    pub fn args(&self) -> Value {
        match self {
            Command::Speak(utterance) => json!([utterance]),
            Command::SetEngine(name) => json!([name]),
            _ => json!([]),
        }
    }
}

/// One dispatch to the native layer
#[derive(Debug, Clone)]
pub struct Request {
    pub id: RequestId,
    /// Service the command is addressed to
    pub service: String,
    pub command: Command,
    /// False for fire-and-forget commands; bridges may skip replying
    pub expects_reply: bool,
}

/// A reply to a request
#[derive(Debug)]
pub struct Completion {
    pub id: RequestId,
    pub outcome: std::result::Result<Value, BridgeError>,
    /// More completions will follow for the same request
    pub keep_callback: bool,
}

impl Completion {
    /// Final successful reply
    pub fn success(id: RequestId, payload: Value) -> Self {
        Self {
            id,
            outcome: Ok(payload),
            keep_callback: false,
        }
    }

    /// Successful reply that keeps the request open for further events
    pub fn event(id: RequestId, payload: Value) -> Self {
        Self {
            id,
            outcome: Ok(payload),
            keep_callback: true,
        }
    }

    /// Final failure
    pub fn failure(id: RequestId, error: BridgeError) -> Self {
        Self {
            id,
            outcome: Err(error),
            keep_callback: false,
        }
    }
}

/// Cloneable handle bridges use to deliver completions, from any thread
#[derive(Debug, Clone)]
pub struct CompletionSender {
    tx: Sender<Completion>,
}

impl CompletionSender {
    /// Create a sender and the receiving end the client drains
    pub fn channel() -> (Self, Receiver<Completion>) {
        let (tx, rx) = std::sync::mpsc::channel();
        (Self { tx }, rx)
    }

    /// Deliver a completion
    ///
    /// Fails only when the client has been dropped.
    pub fn send(&self, completion: Completion) -> Result<()> {
        self.tx.send(completion).map_err(|_| BridgeError::Detached)
    }
}

/// Native speech service transport
///
/// The client calls [`attach`](NativeBridge::attach) once before any request.
pub trait NativeBridge {
    /// Receive the sender used for all later completions
    fn attach(&mut self, completions: CompletionSender);

    /// Dispatch a request
    ///
    /// An `Err` here is handled as if the native layer had reported a failure.
    fn exec(&mut self, request: Request) -> Result<()>;

    /// Called at the start of every client turn, on the client's thread
    fn poll(&mut self) {}
}

impl<B: NativeBridge + ?Sized> NativeBridge for Box<B> {
    fn attach(&mut self, completions: CompletionSender) {
        (**self).attach(completions)
    }

    fn exec(&mut self, request: Request) -> Result<()> {
        (**self).exec(request)
    }

    fn poll(&mut self) {
        (**self).poll()
    }
}

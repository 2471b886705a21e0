//! In-process bridge that records requests
//!
//! Used by tests and by hosts that answer native commands themselves. The
//! bridge half is handed to the client; the [`RecordingHandle`] half stays
//! with the caller to inspect requests and deliver replies.

use super::{Command, Completion, CompletionSender, NativeBridge, Request, RequestId};
use crate::{BridgeError, Result};
use log::debug;
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Default)]
struct Inner {
    sender: Option<CompletionSender>,
    requests: Vec<Request>,
    /// Actions whose `exec` should fail synchronously
    refused: Vec<String>,
}

/// Bridge half, owned by the client
pub struct RecordingBridge {
    inner: Rc<RefCell<Inner>>,
}

/// Caller half
#[derive(Clone)]
pub struct RecordingHandle {
    inner: Rc<RefCell<Inner>>,
}

impl RecordingBridge {
    /// Create a connected bridge/handle pair
    pub fn new() -> (Self, RecordingHandle) {
        let inner = Rc::new(RefCell::new(Inner::default()));
        (
            Self {
                inner: Rc::clone(&inner),
            },
            RecordingHandle { inner },
        )
    }
}

impl NativeBridge for RecordingBridge {
    fn attach(&mut self, completions: CompletionSender) {
        self.inner.borrow_mut().sender = Some(completions);
    }

    fn exec(&mut self, request: Request) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        debug!(
            "Recorded {} {}.{}",
            request.id,
            request.service,
            request.command.action()
        );
        let action = request.command.action();
        let refused = inner.refused.iter().any(|a| a == action);
        inner.requests.push(request);
        if refused {
            return Err(BridgeError::native(action, "refused"));
        }
        Ok(())
    }
}

impl RecordingHandle {
    /// Every request seen so far, in dispatch order
    pub fn requests(&self) -> Vec<Request> {
        self.inner.borrow().requests.clone()
    }

    /// Action names of every request seen so far
    pub fn actions(&self) -> Vec<&'static str> {
        self.inner
            .borrow()
            .requests
            .iter()
            .map(|r| r.command.action())
            .collect()
    }

    /// Most recent request for an action
    pub fn last(&self, action: &str) -> Option<Request> {
        self.inner
            .borrow()
            .requests
            .iter()
            .rev()
            .find(|r| r.command.action() == action)
            .cloned()
    }

    /// Id of the most recent request for an action
    pub fn last_id(&self, action: &str) -> Option<RequestId> {
        self.last(action).map(|r| r.id)
    }

    /// Make `exec` fail synchronously for an action
    pub fn refuse(&self, action: &str) {
        self.inner.borrow_mut().refused.push(action.to_string());
    }

    /// Deliver a completion to the client
    pub fn complete(&self, completion: Completion) -> Result<()> {
        let sender = self
            .inner
            .borrow()
            .sender
            .clone()
            .ok_or(BridgeError::Detached)?;
        sender.send(completion)
    }

    /// Final success for the latest request of `action`
    pub fn reply(&self, action: &str, payload: Value) -> Result<()> {
        let id = self.pending_id(action)?;
        self.complete(Completion::success(id, payload))
    }

    /// Event for the latest request of `action`, keeping it open
    pub fn event(&self, action: &str, payload: Value) -> Result<()> {
        let id = self.pending_id(action)?;
        self.complete(Completion::event(id, payload))
    }

    /// Final failure for the latest request of `action`
    pub fn fail(&self, action: &str, message: &str) -> Result<()> {
        let id = self.pending_id(action)?;
        self.complete(Completion::failure(id, BridgeError::native(action, message)))
    }

    fn pending_id(&self, action: &str) -> Result<RequestId> {
        self.last_id(action)
            .ok_or_else(|| BridgeError::Other(format!("No {} request recorded", action)))
    }

    /// Whether the given command has been dispatched
    pub fn saw(&self, command: &Command) -> bool {
        self.inner
            .borrow()
            .requests
            .iter()
            .any(|r| &r.command == command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(id: u64, command: Command) -> Request {
        Request {
            id: RequestId(id),
            service: "SpeechSynthesis".to_string(),
            command,
            expects_reply: true,
        }
    }

    #[test]
    fn test_records_and_replies() {
        let (mut bridge, handle) = RecordingBridge::new();
        let (sender, rx) = CompletionSender::channel();
        bridge.attach(sender);

        bridge.exec(request(7, Command::Startup)).unwrap();
        assert_eq!(handle.actions(), vec!["startup"]);

        handle.reply("startup", json!([])).unwrap();
        let completion = rx.try_recv().unwrap();
        assert_eq!(completion.id, RequestId(7));
        assert!(!completion.keep_callback);
    }

    #[test]
    fn test_refused_action_fails_synchronously() {
        let (mut bridge, handle) = RecordingBridge::new();
        handle.refuse("pause");
        assert!(bridge.exec(request(1, Command::Pause)).is_err());
        assert!(bridge.exec(request(2, Command::Resume)).is_ok());
        assert!(handle.saw(&Command::Pause));
    }

    #[test]
    fn test_reply_before_attach() {
        let (mut bridge, handle) = RecordingBridge::new();
        bridge.exec(request(1, Command::Startup)).unwrap();
        assert!(matches!(
            handle.reply("startup", json!([])),
            Err(BridgeError::Detached)
        ));
    }
}

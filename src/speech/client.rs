//! Speech synthesis client
//!
//! The application's single point of contact with the native speech service.
//! It caches the voice, engine and default-engine snapshots, forwards commands
//! over the bridge, and turns native replies into handler calls.
//!
//! The client is single-threaded. Nothing happens between calls except inside
//! [`SynthesisClient::turn`], which runs deferred tasks and dispatches every
//! completion the bridge has delivered.

use super::list::{EngineList, VoiceList};
use super::scheduler::Scheduler;
use super::utterance::{SpeechEvent, SpeechEventKind, Utterance};
use super::voice::Engine;
use crate::bridge::{Command, Completion, CompletionSender, NativeBridge, Request, RequestId};
use crate::config::Config;
use crate::BridgeError;
use log::{debug, error, info, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

/// The only event type listeners can subscribe to
pub const VOICES_CHANGED: &str = "voiceschanged";

/// Upper bound on turns taken by [`SynthesisClient::run_until_idle`]
const MAX_IDLE_TURNS: usize = 256;

/// Longest single wait inside [`SynthesisClient::turn_blocking`]
const POLL_SLICE: Duration = Duration::from_millis(20);

/// Listener for voice-changed notifications
///
/// Identity is the `Rc` allocation: adding the same `Rc` twice registers it
/// twice, and removal matches with `Rc::ptr_eq`.
pub type VoicesChangedListener = Rc<dyn Fn(&VoiceList) -> anyhow::Result<()>>;

/// Called with the raw voice payload once an engine switch succeeds
pub type ReadyCallback = Box<dyn FnOnce(&Value)>;

/// Called when an engine switch fails
pub type EngineErrorCallback = Box<dyn FnOnce(&BridgeError)>;

/// What to do with the reply to an outstanding request
enum Reply {
    Startup,
    Engines,
    DefaultEngine,
    Speak {
        utterance: Utterance,
        /// A `start` event has been seen for this utterance
        started: bool,
    },
    SetEngine {
        on_ready: Option<ReadyCallback>,
        on_error: Option<EngineErrorCallback>,
    },
}

/// Work queued for the next turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deferred {
    VoicesChanged,
}

/// Client for the native speech synthesis service
pub struct SynthesisClient {
    bridge: Box<dyn NativeBridge>,
    config: Config,

    /// Service name stamped on every request
    service: String,

    completions: Receiver<Completion>,

    /// Used to report synchronous dispatch failures through the normal path
    loopback: CompletionSender,

    replies: HashMap<RequestId, Reply>,
    scheduler: Scheduler<Deferred>,
    next_id: u64,

    /// Speak requests sent that have neither started nor finished
    queued: usize,
    speaking: bool,
    paused: bool,

    voices: Option<VoiceList>,
    engines: Option<EngineList>,
    default_engine: Option<Engine>,

    on_voices_changed: Option<VoicesChangedListener>,
    voices_changed_listeners: Vec<VoicesChangedListener>,
}

impl SynthesisClient {
    /// Attach to a bridge and issue `startup`
    ///
    /// Voices, engines and the default engine populate as replies arrive in
    /// later turns. The first voice-changed notification fires on the turn
    /// after the startup reply, so listeners added right after construction
    /// receive it.
    pub fn new<B: NativeBridge + 'static>(bridge: B, config: Config) -> Self {
        let (sender, completions) = CompletionSender::channel();
        let mut bridge: Box<dyn NativeBridge> = Box::new(bridge);
        bridge.attach(sender.clone());

        let service = config.service();
        info!("Creating synthesis client for service {}", service);

        let mut client = Self {
            bridge,
            config,
            service,
            completions,
            loopback: sender,
            replies: HashMap::new(),
            scheduler: Scheduler::new(),
            next_id: 1,
            queued: 0,
            speaking: false,
            paused: false,
            voices: None,
            engines: None,
            default_engine: None,
            on_voices_changed: None,
            voices_changed_listeners: Vec::new(),
        };

        client.send(Command::Startup, Some(Reply::Startup));
        client
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Speak an utterance
    ///
    /// Unset `lang`, `rate`, `pitch` and `volume` are filled from config.
    /// Events reported for it are dispatched to its handlers until the native
    /// layer closes the request.
    pub fn speak(&mut self, mut utterance: Utterance) {
        if utterance.lang.is_none() {
            utterance.lang = self.config.lang();
        }
        if utterance.rate.is_none() {
            utterance.rate = self.config.rate();
        }
        if utterance.pitch.is_none() {
            utterance.pitch = self.config.pitch();
        }
        if utterance.volume.is_none() {
            utterance.volume = self.config.volume();
        }

        let payload = match serde_json::to_value(utterance.payload()) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode utterance: {}", e);
                utterance.fail();
                return;
            }
        };

        debug!("Speaking: {}", utterance.text);
        self.queued += 1;
        self.send(
            Command::Speak(payload),
            Some(Reply::Speak {
                utterance,
                started: false,
            }),
        );
    }

    /// Stop speaking and drop queued utterances
    pub fn cancel(&mut self) {
        self.send(Command::Cancel, None);
    }

    pub fn pause(&mut self) {
        self.send(Command::Pause, None);
    }

    pub fn resume(&mut self) {
        self.send(Command::Resume, None);
    }

    /// Most recent engine snapshot, `None` until `getEngines` has replied
    pub fn get_engines(&self) -> Option<&EngineList> {
        self.engines.as_ref()
    }

    /// Most recent default engine, `None` until `getDefaultEngine` has replied
    pub fn get_default_engine(&self) -> Option<&Engine> {
        self.default_engine.as_ref()
    }

    /// Most recent voice snapshot; empty before the first reply
    pub fn get_voices(&self) -> VoiceList {
        self.voices.clone().unwrap_or_default()
    }

    /// Switch engine
    ///
    /// On success the voice snapshot is replaced, voice-changed listeners run
    /// immediately, then `on_ready` receives the raw voice payload. Failures
    /// are only logged.
    pub fn set_engine(&mut self, engine_name: &str, on_ready: Option<ReadyCallback>) {
        self.set_engine_with_handlers(engine_name, on_ready, None);
    }

    /// [`set_engine`](Self::set_engine) with a failure callback
    pub fn set_engine_with_handlers(
        &mut self,
        engine_name: &str,
        on_ready: Option<ReadyCallback>,
        on_error: Option<EngineErrorCallback>,
    ) {
        info!("Switching engine to {}", engine_name);
        self.send(
            Command::SetEngine(engine_name.to_string()),
            Some(Reply::SetEngine { on_ready, on_error }),
        );
    }

    /// Subscribe to an event; only [`VOICES_CHANGED`] is supported
    pub fn add_event_listener(&mut self, event_type: &str, listener: VoicesChangedListener) {
        if event_type == VOICES_CHANGED {
            self.voices_changed_listeners.push(listener);
        } else {
            debug!("Ignoring listener for unsupported event {:?}", event_type);
        }
    }

    /// Remove the first registration of `listener`, if any
    pub fn remove_event_listener(&mut self, event_type: &str, listener: &VoicesChangedListener) {
        if event_type != VOICES_CHANGED {
            return;
        }
        if let Some(index) = self
            .voices_changed_listeners
            .iter()
            .position(|l| Rc::ptr_eq(l, listener))
        {
            self.voices_changed_listeners.remove(index);
        }
    }

    /// Set or clear the `onvoiceschanged` slot, which runs before listeners
    pub fn set_on_voices_changed(&mut self, listener: Option<VoicesChangedListener>) {
        self.on_voices_changed = listener;
    }

    /// Whether any spoken utterance is still waiting to start
    pub fn pending(&self) -> bool {
        self.queued > 0
    }

    pub fn speaking(&self) -> bool {
        self.speaking
    }

    pub fn paused(&self) -> bool {
        self.paused
    }

    /// Number of requests still waiting for a reply
    pub fn outstanding(&self) -> usize {
        self.replies.len()
    }

    /// Run one turn of the event loop
    ///
    /// Deferred tasks queued before this call run first, then every completion
    /// already delivered. Returns whether anything ran.
    pub fn turn(&mut self) -> bool {
        self.bridge.poll();

        let mut worked = false;
        for task in self.scheduler.take_ready() {
            worked = true;
            self.run_deferred(task);
        }

        while let Ok(completion) = self.completions.try_recv() {
            worked = true;
            self.dispatch(completion);
        }

        worked
    }

    /// Take turns until one does nothing
    pub fn run_until_idle(&mut self) {
        for _ in 0..MAX_IDLE_TURNS {
            if !self.turn() {
                return;
            }
        }
        warn!("Event loop still busy after {} turns", MAX_IDLE_TURNS);
    }

    /// Take a turn, waiting up to `timeout` for a completion if none is ready
    pub fn turn_blocking(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.turn() {
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                return false;
            }

            match self.completions.recv_timeout((deadline - now).min(POLL_SLICE)) {
                Ok(completion) => {
                    self.dispatch(completion);
                    return true;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return false,
            }
        }
    }

    fn send(&mut self, command: Command, reply: Option<Reply>) {
        let id = RequestId(self.next_id);
        self.next_id += 1;

        let action = command.action();
        let expects_reply = reply.is_some();
        debug!("-> {} {}.{}", id, self.service, action);

        if let Some(reply) = reply {
            self.replies.insert(id, reply);
        }

        let request = Request {
            id,
            service: self.service.clone(),
            command,
            expects_reply,
        };

        if let Err(e) = self.bridge.exec(request) {
            if expects_reply {
                // Delivered next turn, like any native failure
                let _ = self.loopback.send(Completion::failure(id, e));
            } else {
                debug!("Dropping failure of {}: {}", action, e);
            }
        }
    }

    fn dispatch(&mut self, completion: Completion) {
        let Completion {
            id,
            outcome,
            keep_callback,
        } = completion;

        let Some(reply) = self.replies.remove(&id) else {
            debug!("<- {} has no outstanding request", id);
            return;
        };
        debug!("<- {} (keep: {})", id, keep_callback);

        let keep = match reply {
            Reply::Startup => {
                self.handle_startup(outcome);
                None
            }
            Reply::Engines => {
                self.handle_engines(outcome);
                None
            }
            Reply::DefaultEngine => {
                self.handle_default_engine(outcome);
                None
            }
            Reply::Speak {
                mut utterance,
                mut started,
            } => {
                self.handle_speak(&mut utterance, &mut started, outcome);
                if !keep_callback && !started {
                    // Closed without ever starting
                    self.queued = self.queued.saturating_sub(1);
                }
                Some(Reply::Speak { utterance, started })
            }
            Reply::SetEngine { on_ready, on_error } => {
                self.handle_set_engine(outcome, on_ready, on_error);
                None
            }
        };

        if keep_callback {
            if let Some(reply) = keep {
                self.replies.insert(id, reply);
            }
        }
    }

    fn run_deferred(&mut self, task: Deferred) {
        match task {
            Deferred::VoicesChanged => self.fire_voices_changed(),
        }
    }

    fn handle_startup(&mut self, outcome: Result<Value, BridgeError>) {
        let payload = match outcome {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Startup failed: {}", e);
                return;
            }
        };

        let voices = VoiceList::from_payload(&payload);
        info!("Startup reported {} voices", voices.len());
        self.voices = Some(voices);
        self.scheduler.defer(Deferred::VoicesChanged);

        self.send(Command::GetEngines, Some(Reply::Engines));
        self.send(Command::GetDefaultEngine, Some(Reply::DefaultEngine));

        if let Some(engine) = self.config.preferred_engine() {
            self.set_engine(&engine, None);
        }
    }

    fn handle_engines(&mut self, outcome: Result<Value, BridgeError>) {
        match outcome {
            Ok(payload) => {
                let engines = EngineList::from_payload(&payload);
                debug!("Cached {} engines", engines.len());
                self.engines = Some(engines);
            }
            Err(e) => debug!("getEngines failed: {}", e),
        }
    }

    fn handle_default_engine(&mut self, outcome: Result<Value, BridgeError>) {
        match outcome.and_then(|payload| Ok(serde_json::from_value::<Engine>(payload)?)) {
            Ok(engine) => {
                debug!("Default engine is {}", engine.name);
                self.default_engine = Some(engine);
            }
            Err(e) => warn!("No default engine: {}", e),
        }
    }

    fn handle_speak(
        &mut self,
        utterance: &mut Utterance,
        started: &mut bool,
        outcome: Result<Value, BridgeError>,
    ) {
        match outcome {
            Ok(payload) => {
                let event = SpeechEvent::from_payload(payload);
                match event.kind {
                    Some(SpeechEventKind::Start) if !*started => {
                        *started = true;
                        self.queued = self.queued.saturating_sub(1);
                        self.track_session(SpeechEventKind::Start);
                    }
                    Some(kind) => self.track_session(kind),
                    None => debug!("Ignoring speech event {}", event.raw),
                }
                utterance.dispatch(&event);
            }
            Err(e) => {
                debug!("Speak failed: {}", e);
                self.speaking = false;
                utterance.fail();
            }
        }
    }

    fn track_session(&mut self, kind: SpeechEventKind) {
        match kind {
            SpeechEventKind::Start => self.speaking = true,
            SpeechEventKind::End => {
                self.speaking = false;
                self.paused = false;
            }
            SpeechEventKind::Pause => self.paused = true,
            SpeechEventKind::Resume => self.paused = false,
            SpeechEventKind::Mark | SpeechEventKind::Boundary => {}
        }
    }

    fn handle_set_engine(
        &mut self,
        outcome: Result<Value, BridgeError>,
        on_ready: Option<ReadyCallback>,
        on_error: Option<EngineErrorCallback>,
    ) {
        match outcome {
            Ok(payload) => {
                let voices = VoiceList::from_payload(&payload);
                info!("Engine switched, {} voices", voices.len());
                self.voices = Some(voices);
                self.fire_voices_changed();

                if let Some(on_ready) = on_ready {
                    on_ready(&payload);
                }
            }
            Err(e) => {
                warn!("Engine switch failed: {}", e);
                if let Some(on_error) = on_error {
                    on_error(&e);
                }
            }
        }
    }

    /// Notify the slot, then every listener in registration order
    fn fire_voices_changed(&self) {
        let voices = self.get_voices();
        debug!(
            "Firing voiceschanged ({} voices, {} listeners)",
            voices.len(),
            self.voices_changed_listeners.len()
        );

        if let Some(listener) = &self.on_voices_changed {
            invoke_isolated(listener, &voices);
        }
        for listener in &self.voices_changed_listeners {
            invoke_isolated(listener, &voices);
        }
    }
}

/// Run a listener, logging an error return or a panic instead of propagating it
fn invoke_isolated(listener: &VoicesChangedListener, voices: &VoiceList) {
    match panic::catch_unwind(AssertUnwindSafe(|| listener(voices))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Error in voiceschanged listener: {:#}", e),
        Err(_) => error!("voiceschanged listener panicked"),
    }
}

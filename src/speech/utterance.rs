//! Utterances and the playback events reported for them

use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;

/// Handler for playback events
pub type EventHandler = Box<dyn FnMut(&SpeechEvent)>;

/// Handler for a failed utterance; no detail is forwarded
pub type ErrorHandler = Box<dyn FnMut()>;

/// Playback event kinds the native layer reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpeechEventKind {
    Start,
    End,
    Pause,
    Resume,
    Mark,
    Boundary,
}

impl SpeechEventKind {
    /// Name on the wire
    ///
    /// The native layer spells the boundary event `boundry`; it is kept as-is.
    pub fn wire_name(self) -> &'static str {
        match self {
            SpeechEventKind::Start => "start",
            SpeechEventKind::End => "end",
            SpeechEventKind::Pause => "pause",
            SpeechEventKind::Resume => "resume",
            SpeechEventKind::Mark => "mark",
            SpeechEventKind::Boundary => "boundry",
        }
    }

    /// Parse a wire name, `None` for types this crate does not dispatch
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "start" => Some(SpeechEventKind::Start),
            "end" => Some(SpeechEventKind::End),
            "pause" => Some(SpeechEventKind::Pause),
            "resume" => Some(SpeechEventKind::Resume),
            "mark" => Some(SpeechEventKind::Mark),
            "boundry" | "boundary" => Some(SpeechEventKind::Boundary),
            _ => None,
        }
    }
}

impl fmt::Display for SpeechEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// An event record delivered for an utterance
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechEvent {
    /// Parsed `type` field, `None` when unrecognized
    pub kind: Option<SpeechEventKind>,
    /// The record exactly as the native layer sent it
    pub raw: Value,
}

impl SpeechEvent {
    pub fn from_payload(raw: Value) -> Self {
        let kind = raw
            .get("type")
            .and_then(Value::as_str)
            .and_then(SpeechEventKind::from_wire);
        Self { kind, raw }
    }

    /// Build the record a native bridge would send for `kind`
    pub fn payload(kind: SpeechEventKind) -> Value {
        json!({ "type": kind.wire_name() })
    }

    /// Character offset into the text, for mark and boundary events
    pub fn char_index(&self) -> Option<u64> {
        self.raw.get("charIndex").and_then(Value::as_u64)
    }

    /// Mark name, for mark events
    pub fn name(&self) -> Option<&str> {
        self.raw.get("name").and_then(Value::as_str)
    }
}

/// Wire form of an utterance sent with `speak`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UtterancePayload {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f32>,
}

/// Text submitted for synthesis plus its playback handlers
///
/// All handlers are optional; an event with no matching handler is dropped.
pub struct Utterance {
    pub text: String,
    pub lang: Option<String>,
    /// Voice name, as listed in the current voice snapshot
    pub voice: Option<String>,
    pub rate: Option<f32>,
    pub pitch: Option<f32>,
    pub volume: Option<f32>,

    pub on_start: Option<EventHandler>,
    pub on_end: Option<EventHandler>,
    pub on_pause: Option<EventHandler>,
    pub on_resume: Option<EventHandler>,
    pub on_mark: Option<EventHandler>,
    pub on_boundary: Option<EventHandler>,
    pub on_error: Option<ErrorHandler>,
}

impl Utterance {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            lang: None,
            voice: None,
            rate: None,
            pitch: None,
            volume: None,
            on_start: None,
            on_end: None,
            on_pause: None,
            on_resume: None,
            on_mark: None,
            on_boundary: None,
            on_error: None,
        }
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn with_rate(mut self, rate: f32) -> Self {
        self.rate = Some(rate);
        self
    }

    pub fn with_pitch(mut self, pitch: f32) -> Self {
        self.pitch = Some(pitch);
        self
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = Some(volume);
        self
    }

    /// Install the handler for one event kind, replacing any previous one
    pub fn on<F>(mut self, kind: SpeechEventKind, handler: F) -> Self
    where
        F: FnMut(&SpeechEvent) + 'static,
    {
        *self.handler_slot(kind) = Some(Box::new(handler));
        self
    }

    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: FnMut() + 'static,
    {
        self.on_error = Some(Box::new(handler));
        self
    }

    fn handler_slot(&mut self, kind: SpeechEventKind) -> &mut Option<EventHandler> {
        match kind {
            SpeechEventKind::Start => &mut self.on_start,
            SpeechEventKind::End => &mut self.on_end,
            SpeechEventKind::Pause => &mut self.on_pause,
            SpeechEventKind::Resume => &mut self.on_resume,
            SpeechEventKind::Mark => &mut self.on_mark,
            SpeechEventKind::Boundary => &mut self.on_boundary,
        }
    }

    /// Invoke the handler matching the event's kind, if both exist
    ///
    /// Returns whether a handler ran.
    pub fn dispatch(&mut self, event: &SpeechEvent) -> bool {
        let Some(kind) = event.kind else {
            return false;
        };
        match self.handler_slot(kind) {
            Some(handler) => {
                handler(event);
                true
            }
            None => false,
        }
    }

    /// Invoke the error handler, if any
    pub fn fail(&mut self) {
        if let Some(handler) = self.on_error.as_mut() {
            handler();
        }
    }

    pub fn payload(&self) -> UtterancePayload {
        UtterancePayload {
            text: self.text.clone(),
            lang: self.lang.clone(),
            voice: self.voice.clone(),
            rate: self.rate,
            pitch: self.pitch,
            volume: self.volume,
        }
    }
}

impl fmt::Debug for Utterance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Utterance")
            .field("text", &self.text)
            .field("lang", &self.lang)
            .field("voice", &self.voice)
            .field("rate", &self.rate)
            .field("pitch", &self.pitch)
            .field("volume", &self.volume)
            .finish_non_exhaustive()
    }
}

//! Native bridge backed by the tts crate
//!
//! The `tts` crate gives a unified interface to:
//! - Speech Dispatcher on Linux
//! - AVFoundation / AppKit on macOS
//! - WinRT on Windows
//!
//! Each compiled-in platform backend is reported as an engine. Utterance
//! callbacks arrive on native threads; they are queued as signals and turned
//! into completions in [`NativeBridge::poll`] on the client's thread.

use crate::bridge::{Command, Completion, CompletionSender, NativeBridge, Request, RequestId};
use crate::speech::utterance::{SpeechEvent, SpeechEventKind};
use crate::speech::voice::{Engine, Voice};
use crate::{BridgeError, Result};
use log::{debug, error, info, warn};
use serde::Deserialize;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::mpsc::{self, Receiver, Sender};
use tts::{Backends, Tts, UtteranceId};

/// Utterance progress reported by native callbacks
#[derive(Debug)]
enum Signal<U = UtteranceId> {
    Begin(U),
    End(U),
}

/// Turn a native signal into the completion for its request.
///
/// `End` closes the request and removes it from `in_flight`. Signals for
/// utterances we are not tracking yield `None`.
fn signal_completion<U: PartialEq + Debug>(
    in_flight: &mut Vec<(U, RequestId)>,
    signal: Signal<U>,
) -> Option<Completion> {
    let (utterance, kind) = match signal {
        Signal::Begin(u) => (u, SpeechEventKind::Start),
        Signal::End(u) => (u, SpeechEventKind::End),
    };

    let Some(index) = in_flight.iter().position(|(u, _)| *u == utterance) else {
        debug!("Signal for unknown utterance: {:?}", utterance);
        return None;
    };

    let completion = if kind == SpeechEventKind::End {
        let (_, id) = in_flight.remove(index);
        Completion::success(id, SpeechEvent::payload(kind))
    } else {
        Completion::event(in_flight[index].1, SpeechEvent::payload(kind))
    };
    Some(completion)
}

/// Close every tracked utterance with a failure
fn abandon_in_flight<U>(in_flight: &mut Vec<(U, RequestId)>, reason: &str) -> Vec<Completion> {
    in_flight
        .drain(..)
        .map(|(_, id)| Completion::failure(id, BridgeError::native("speak", reason)))
        .collect()
}

/// Arguments of a `speak` command
#[derive(Debug, Deserialize)]
struct SpeakArgs {
    text: String,
    #[serde(default)]
    lang: Option<String>,
    #[serde(default)]
    voice: Option<String>,
    #[serde(default)]
    rate: Option<f32>,
    #[serde(default)]
    pitch: Option<f32>,
    #[serde(default)]
    volume: Option<f32>,
}

/// Engines this build can drive, platform default first
fn available_engines() -> Vec<Engine> {
    let mut engines = Vec::new();
    #[cfg(target_os = "linux")]
    engines.push(Engine::new(
        "speech-dispatcher",
        Some("Speech Dispatcher".to_string()),
    ));
    #[cfg(any(target_os = "macos", target_os = "ios"))]
    engines.push(Engine::new("av-foundation", Some("AVFoundation".to_string())));
    #[cfg(target_os = "macos")]
    engines.push(Engine::new("appkit", Some("AppKit".to_string())));
    #[cfg(windows)]
    engines.push(Engine::new("winrt", Some("Windows Runtime".to_string())));
    engines
}

fn backend_for(engine_name: &str) -> Option<Backends> {
    match engine_name {
        #[cfg(target_os = "linux")]
        "speech-dispatcher" => Some(Backends::SpeechDispatcher),
        #[cfg(any(target_os = "macos", target_os = "ios"))]
        "av-foundation" => Some(Backends::AvFoundation),
        #[cfg(target_os = "macos")]
        "appkit" => Some(Backends::AppKit),
        #[cfg(windows)]
        "winrt" => Some(Backends::WinRt),
        _ => None,
    }
}

/// Map a relative factor (1.0 = normal) onto the backend's range
fn scale(normal: f32, min: f32, max: f32, factor: f32) -> f32 {
    (normal * factor).clamp(min, max)
}

fn tts_error(action: &str, e: tts::Error) -> BridgeError {
    BridgeError::native(action, e.to_string())
}

/// Bridge to the platform speech service
pub struct TtsBridge {
    tts: Tts,

    /// Name of the active engine
    engine: String,

    completions: Option<CompletionSender>,

    signal_tx: Sender<Signal>,
    signal_rx: Receiver<Signal>,

    /// Utterances waiting for native callbacks
    in_flight: Vec<(UtteranceId, RequestId)>,

    /// Whether the active backend reports utterance begin/end
    callbacks: bool,
}

impl TtsBridge {
    /// Open the platform default backend
    pub fn new() -> Result<Self> {
        debug!("Creating native TTS bridge");
        let tts = Tts::default().map_err(|e| tts_error("startup", e))?;
        let engine = available_engines()
            .first()
            .map(|e| e.name.clone())
            .unwrap_or_else(|| "default".to_string());

        let (signal_tx, signal_rx) = mpsc::channel();
        let mut bridge = Self {
            tts,
            engine,
            completions: None,
            signal_tx,
            signal_rx,
            in_flight: Vec::new(),
            callbacks: false,
        };
        bridge.register_callbacks();
        info!("Native TTS bridge ready on {}", bridge.engine);
        Ok(bridge)
    }

    /// Name of the active engine
    pub fn engine(&self) -> &str {
        &self.engine
    }

    fn register_callbacks(&mut self) {
        self.callbacks = false;
        if !self.tts.supported_features().utterance_callbacks {
            debug!("Backend has no utterance callbacks, events will be synthesized");
            return;
        }

        let begin_tx = self.signal_tx.clone();
        let end_tx = self.signal_tx.clone();
        let stop_tx = self.signal_tx.clone();

        let registered = self
            .tts
            .on_utterance_begin(Some(Box::new(move |id| {
                let _ = begin_tx.send(Signal::Begin(id));
            })))
            .and_then(|_| {
                self.tts.on_utterance_end(Some(Box::new(move |id| {
                    let _ = end_tx.send(Signal::End(id));
                })))
            })
            .and_then(|_| {
                self.tts.on_utterance_stop(Some(Box::new(move |id| {
                    let _ = stop_tx.send(Signal::End(id));
                })))
            });

        match registered {
            Ok(()) => self.callbacks = true,
            Err(e) => warn!("Failed to register utterance callbacks: {}", e),
        }
    }

    fn send(&self, completion: Completion) -> Result<()> {
        self.completions
            .as_ref()
            .ok_or(BridgeError::Detached)?
            .send(completion)
    }

    fn voices_payload(&self) -> Result<Value> {
        if !self.tts.supported_features().voice {
            debug!("Voice listing not supported on this backend");
            return Ok(Value::Array(Vec::new()));
        }

        let voices: Vec<Voice> = self
            .tts
            .voices()
            .map_err(|e| tts_error("voices", e))?
            .into_iter()
            .map(|v| {
                let mut voice = Voice::new(v.name(), v.language().to_string());
                voice.voice_uri = Some(v.id());
                voice
            })
            .collect();
        debug!("Backend reports {} voices", voices.len());
        Ok(serde_json::to_value(voices)?)
    }

    fn select_voice(&mut self, name: Option<&str>, lang: Option<&str>) -> Result<()> {
        if name.is_none() && lang.is_none() {
            return Ok(());
        }
        if !self.tts.supported_features().voice {
            warn!("Voice selection not supported on this platform");
            return Ok(());
        }

        let voices = self.tts.voices().map_err(|e| tts_error("speak", e))?;
        let chosen = match name {
            Some(name) => voices.iter().find(|v| v.name() == name),
            None => lang.and_then(|lang| {
                voices
                    .iter()
                    .find(|v| v.language().to_string().starts_with(lang))
            }),
        };

        match chosen {
            Some(voice) => {
                debug!("Selecting voice: {}", voice.name());
                self.tts
                    .set_voice(voice)
                    .map_err(|e| tts_error("speak", e))?;
            }
            None => warn!("No voice matches name {:?} / lang {:?}", name, lang),
        }
        Ok(())
    }

    fn apply_prosody(&mut self, args: &SpeakArgs) -> Result<()> {
        let features = self.tts.supported_features();

        if let Some(rate) = args.rate {
            if features.rate {
                let value = scale(
                    self.tts.normal_rate(),
                    self.tts.min_rate(),
                    self.tts.max_rate(),
                    rate,
                );
                self.tts
                    .set_rate(value)
                    .map_err(|e| tts_error("speak", e))?;
            } else {
                warn!("Rate control not supported on this platform");
            }
        }

        if let Some(pitch) = args.pitch {
            if features.pitch {
                let value = scale(
                    self.tts.normal_pitch(),
                    self.tts.min_pitch(),
                    self.tts.max_pitch(),
                    pitch,
                );
                self.tts
                    .set_pitch(value)
                    .map_err(|e| tts_error("speak", e))?;
            } else {
                warn!("Pitch control not supported on this platform");
            }
        }

        if let Some(volume) = args.volume {
            if features.volume {
                let (min, max) = (self.tts.min_volume(), self.tts.max_volume());
                let value = min + volume.clamp(0.0, 1.0) * (max - min);
                self.tts
                    .set_volume(value)
                    .map_err(|e| tts_error("speak", e))?;
            } else {
                warn!("Volume control not supported on this platform");
            }
        }

        Ok(())
    }

    fn speak(&mut self, id: RequestId, payload: Value) -> Result<()> {
        let args: SpeakArgs = serde_json::from_value(payload)?;
        self.select_voice(args.voice.as_deref(), args.lang.as_deref())?;
        self.apply_prosody(&args)?;

        debug!("Speaking: {}", args.text);
        let utterance = self.tts.speak(args.text.as_str(), false).map_err(|e| {
            error!("Failed to speak: {}", e);
            tts_error("speak", e)
        })?;

        match utterance {
            Some(utterance) if self.callbacks => {
                self.in_flight.push((utterance, id));
                Ok(())
            }
            _ => {
                // No progress reporting: queued counts as started and finished
                self.send(Completion::event(
                    id,
                    SpeechEvent::payload(SpeechEventKind::Start),
                ))?;
                self.send(Completion::success(
                    id,
                    SpeechEvent::payload(SpeechEventKind::End),
                ))
            }
        }
    }

    fn set_engine(&mut self, name: &str) -> Result<Value> {
        let backend = backend_for(name)
            .ok_or_else(|| BridgeError::native("setEngine", format!("Unknown engine {}", name)))?;
        self.tts = Tts::new(backend).map_err(|e| tts_error("setEngine", e))?;
        self.engine = name.to_string();

        // Callbacks from the old backend are gone with it
        for completion in abandon_in_flight(&mut self.in_flight, "engine switched") {
            let id = completion.id;
            if let Err(e) = self.send(completion) {
                warn!("Dropping abandoned utterance {}: {}", id, e);
            }
        }
        self.register_callbacks();
        info!("Switched to engine {}", name);
        self.voices_payload()
    }
}

impl NativeBridge for TtsBridge {
    fn attach(&mut self, completions: CompletionSender) {
        self.completions = Some(completions);
    }

    fn exec(&mut self, request: Request) -> Result<()> {
        let Request {
            id,
            command,
            expects_reply,
            ..
        } = request;
        debug!("Executing {} {}", id, command.action());

        match command {
            Command::Startup => {
                let voices = self.voices_payload()?;
                self.send(Completion::success(id, voices))
            }
            Command::GetEngines => {
                let engines = serde_json::to_value(available_engines())?;
                self.send(Completion::success(id, engines))
            }
            Command::GetDefaultEngine => {
                let engine = available_engines()
                    .into_iter()
                    .next()
                    .ok_or_else(|| BridgeError::native("getDefaultEngine", "No engine available"))?;
                self.send(Completion::success(id, serde_json::to_value(engine)?))
            }
            Command::Speak(payload) => self.speak(id, payload),
            Command::Cancel => {
                self.tts.stop().map_err(|e| tts_error("cancel", e))?;
                if expects_reply {
                    self.send(Completion::success(id, Value::Null))?;
                }
                Ok(())
            }
            Command::Pause | Command::Resume => {
                Err(BridgeError::Unsupported(command.action().to_string()))
            }
            Command::SetEngine(name) => {
                let voices = self.set_engine(&name)?;
                self.send(Completion::success(id, voices))
            }
        }
    }

    fn poll(&mut self) {
        while let Ok(signal) = self.signal_rx.try_recv() {
            let Some(completion) = signal_completion(&mut self.in_flight, signal) else {
                continue;
            };
            let id = completion.id;
            if let Err(e) = self.send(completion) {
                warn!("Dropping event for {}: {}", id, e);
            }
        }
    }
}

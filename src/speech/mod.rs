//! Speech synthesis client and the values it exchanges

pub mod client;
pub mod list;
pub mod scheduler;
pub mod utterance;
pub mod voice;

pub use client::{
    EngineErrorCallback, ReadyCallback, SynthesisClient, VoicesChangedListener, VOICES_CHANGED,
};
pub use list::{EngineList, SnapshotList, VoiceList};
pub use utterance::{SpeechEvent, SpeechEventKind, Utterance};
pub use voice::{Engine, Voice};

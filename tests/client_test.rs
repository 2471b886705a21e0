//! Synthesis client tests
//!
//! Drive the client through a recording bridge and check caching,
//! notification ordering and utterance event dispatch.

use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use synthbridge::bridge::recording::{RecordingBridge, RecordingHandle};
use synthbridge::bridge::Command;
use synthbridge::config::Config;
use synthbridge::speech::{
    SpeechEvent, SpeechEventKind, SynthesisClient, Utterance, VoiceList, VoicesChangedListener,
    VOICES_CHANGED,
};
use synthbridge::BridgeError;

fn new_client() -> (SynthesisClient, RecordingHandle) {
    let (bridge, handle) = RecordingBridge::new();
    let client = SynthesisClient::new(bridge, Config::default());
    (client, handle)
}

/// Listener that appends `tag` to a shared log
fn recording_listener(
    log: &Rc<RefCell<Vec<&'static str>>>,
    tag: &'static str,
) -> VoicesChangedListener {
    let log = Rc::clone(log);
    Rc::new(move |_: &VoiceList| -> anyhow::Result<()> {
        log.borrow_mut().push(tag);
        Ok(())
    })
}

#[test]
fn test_startup_scenario() {
    let (mut client, handle) = new_client();
    let fired = Rc::new(Cell::new(0));
    let counter = Rc::clone(&fired);
    client.set_on_voices_changed(Some(Rc::new(move |_: &VoiceList| -> anyhow::Result<()> {
        counter.set(counter.get() + 1);
        Ok(())
    })));

    handle.reply("startup", json!([{"name": "v1"}])).unwrap();
    client.run_until_idle();

    assert_eq!(fired.get(), 1);
    let voices = client.get_voices();
    assert_eq!(voices.len(), 1);
    assert_eq!(voices.item(0).unwrap().name, "v1");
}

#[test]
fn test_malformed_startup_payload() {
    for payload in [
        Value::Null,
        json!({"voices": []}),
        json!("v1"),
        json!([{"lang": "en-US"}]),
        json!([1, 2, 3]),
    ] {
        let (mut client, handle) = new_client();
        handle.reply("startup", payload).unwrap();
        client.run_until_idle();

        let voices = client.get_voices();
        assert_eq!(voices.len(), 0);
        assert!(voices.item(0).is_none());
        // Startup still continues with the engine queries
        assert!(handle.saw(&Command::GetEngines));
        assert!(handle.saw(&Command::GetDefaultEngine));
    }
}

#[test]
fn test_get_voices_before_any_reply() {
    let (client, _handle) = new_client();
    assert_eq!(client.get_voices().len(), 0);
    assert!(client.get_engines().is_none());
    assert!(client.get_default_engine().is_none());
}

#[test]
fn test_listener_registered_after_construction_gets_first_notification() {
    let (bridge, handle) = RecordingBridge::new();
    // Native side answers before the caller has even registered
    let mut client = SynthesisClient::new(bridge, Config::default());
    handle.reply("startup", json!([{"name": "v1"}])).unwrap();

    let log = Rc::new(RefCell::new(Vec::new()));
    client.add_event_listener(VOICES_CHANGED, recording_listener(&log, "late"));

    client.run_until_idle();
    assert_eq!(*log.borrow(), vec!["late"]);
}

#[test]
fn test_listener_after_notification_misses_it() {
    let (mut client, handle) = new_client();
    handle.reply("startup", json!([])).unwrap();
    client.run_until_idle();

    let log = Rc::new(RefCell::new(Vec::new()));
    client.add_event_listener(VOICES_CHANGED, recording_listener(&log, "too-late"));
    client.run_until_idle();
    assert!(log.borrow().is_empty());
}

#[test]
fn test_slot_runs_before_listeners_in_order() {
    let (mut client, handle) = new_client();
    let log = Rc::new(RefCell::new(Vec::new()));

    let first = recording_listener(&log, "first");
    client.add_event_listener(VOICES_CHANGED, Rc::clone(&first));
    client.add_event_listener(VOICES_CHANGED, recording_listener(&log, "second"));
    client.add_event_listener(VOICES_CHANGED, first);
    client.set_on_voices_changed(Some(recording_listener(&log, "slot")));

    handle.reply("startup", json!([])).unwrap();
    client.run_until_idle();
    assert_eq!(*log.borrow(), vec!["slot", "first", "second", "first"]);
}

#[test]
fn test_unsupported_event_type_ignored() {
    let (mut client, handle) = new_client();
    let log = Rc::new(RefCell::new(Vec::new()));
    client.add_event_listener("voicechanged", recording_listener(&log, "typo"));
    client.add_event_listener("end", recording_listener(&log, "end"));

    handle.reply("startup", json!([])).unwrap();
    client.run_until_idle();
    assert!(log.borrow().is_empty());
}

#[test]
fn test_remove_listener_is_idempotent() {
    let (mut client, handle) = new_client();
    let log = Rc::new(RefCell::new(Vec::new()));
    let listener = recording_listener(&log, "removed");
    let other = recording_listener(&log, "kept");

    client.add_event_listener(VOICES_CHANGED, Rc::clone(&listener));
    client.add_event_listener(VOICES_CHANGED, other);
    client.remove_event_listener(VOICES_CHANGED, &listener);
    client.remove_event_listener(VOICES_CHANGED, &listener);
    // Never registered
    client.remove_event_listener(VOICES_CHANGED, &recording_listener(&log, "stranger"));

    handle.reply("startup", json!([])).unwrap();
    client.run_until_idle();
    assert_eq!(*log.borrow(), vec!["kept"]);
}

#[test]
fn test_remove_drops_one_duplicate() {
    let (mut client, handle) = new_client();
    let log = Rc::new(RefCell::new(Vec::new()));
    let listener = recording_listener(&log, "dup");

    client.add_event_listener(VOICES_CHANGED, Rc::clone(&listener));
    client.add_event_listener(VOICES_CHANGED, Rc::clone(&listener));
    client.remove_event_listener(VOICES_CHANGED, &listener);

    handle.reply("startup", json!([])).unwrap();
    client.run_until_idle();
    assert_eq!(*log.borrow(), vec!["dup"]);
}

#[test]
fn test_failing_listener_does_not_stop_others() {
    let (mut client, handle) = new_client();
    let log = Rc::new(RefCell::new(Vec::new()));

    client.set_on_voices_changed(Some(Rc::new(|_: &VoiceList| -> anyhow::Result<()> {
        anyhow::bail!("slot failed")
    })));
    client.add_event_listener(
        VOICES_CHANGED,
        Rc::new(|_: &VoiceList| -> anyhow::Result<()> { anyhow::bail!("listener failed") }),
    );
    client.add_event_listener(
        VOICES_CHANGED,
        Rc::new(|_: &VoiceList| -> anyhow::Result<()> { panic!("listener panicked") }),
    );
    client.add_event_listener(VOICES_CHANGED, recording_listener(&log, "survivor"));

    handle.reply("startup", json!([])).unwrap();
    client.run_until_idle();
    assert_eq!(*log.borrow(), vec!["survivor"]);
}

#[test]
fn test_engine_caches() {
    let (mut client, handle) = new_client();
    handle.reply("startup", json!([])).unwrap();
    client.turn();

    // Replies arrive in either order
    handle
        .reply("getDefaultEngine", json!({"name": "com.svox.pico"}))
        .unwrap();
    client.turn();
    assert_eq!(client.get_default_engine().unwrap().name, "com.svox.pico");
    assert!(client.get_engines().is_none());

    handle
        .reply(
            "getEngines",
            json!([
                {"name": "com.google.android.tts", "label": "Speech Services"},
                {"name": "com.svox.pico", "label": "Pico TTS"}
            ]),
        )
        .unwrap();
    client.turn();
    let engines = client.get_engines().unwrap();
    assert_eq!(engines.len(), 2);
    assert_eq!(engines.item(0).unwrap().label.as_deref(), Some("Speech Services"));
    assert!(engines.item(2).is_none());
}

#[test]
fn test_set_engine_scenario() {
    let (mut client, handle) = new_client();
    handle.reply("startup", json!([{"name": "v1"}])).unwrap();
    client.run_until_idle();

    let log = Rc::new(RefCell::new(Vec::new()));
    client.add_event_listener(VOICES_CHANGED, recording_listener(&log, "changed"));

    let ready: Rc<RefCell<Option<Value>>> = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&ready);
    client.set_engine(
        "engine-b",
        Some(Box::new(move |data: &Value| {
            *sink.borrow_mut() = Some(data.clone());
        })),
    );
    assert_eq!(
        handle.last("setEngine").unwrap().command,
        Command::SetEngine("engine-b".to_string())
    );

    handle.reply("setEngine", json!([{"name": "v2"}])).unwrap();
    // One turn: no deferral for engine switches
    client.turn();

    let voices = client.get_voices();
    assert_eq!(voices.len(), 1);
    assert_eq!(voices.item(0).unwrap().name, "v2");
    assert_eq!(*log.borrow(), vec!["changed"]);
    assert_eq!(*ready.borrow(), Some(json!([{"name": "v2"}])));
}

#[test]
fn test_set_engine_failure() {
    let (mut client, handle) = new_client();
    handle.reply("startup", json!([{"name": "v1"}])).unwrap();
    client.run_until_idle();

    let ready = Rc::new(Cell::new(false));
    let failed = Rc::new(Cell::new(false));
    let ready_flag = Rc::clone(&ready);
    let failed_flag = Rc::clone(&failed);
    client.set_engine_with_handlers(
        "missing",
        Some(Box::new(move |_: &Value| ready_flag.set(true))),
        Some(Box::new(move |e: &BridgeError| {
            assert!(e.to_string().contains("no such engine"));
            failed_flag.set(true);
        })),
    );

    handle.fail("setEngine", "no such engine").unwrap();
    client.run_until_idle();
    assert!(failed.get());
    assert!(!ready.get());
    // Voices untouched
    assert_eq!(client.get_voices().item(0).unwrap().name, "v1");
}

#[test]
fn test_speak_dispatches_mark_only_to_onmark() {
    let (mut client, handle) = new_client();
    let calls = Rc::new(RefCell::new(Vec::new()));
    let mut utterance = Utterance::new("Hello world");
    for kind in [
        SpeechEventKind::Start,
        SpeechEventKind::End,
        SpeechEventKind::Pause,
        SpeechEventKind::Resume,
        SpeechEventKind::Mark,
        SpeechEventKind::Boundary,
    ] {
        let calls = Rc::clone(&calls);
        utterance = utterance.on(kind, move |event: &SpeechEvent| {
            calls.borrow_mut().push((kind, event.name().map(str::to_string)));
        });
    }
    client.speak(utterance);

    handle
        .event("speak", json!({"type": "mark", "name": "m1", "charIndex": 6}))
        .unwrap();
    client.turn();
    assert_eq!(
        *calls.borrow(),
        vec![(SpeechEventKind::Mark, Some("m1".to_string()))]
    );
}

#[test]
fn test_speak_event_sequence() {
    let (mut client, handle) = new_client();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let mut utterance = Utterance::new("One two");
    for kind in [SpeechEventKind::Start, SpeechEventKind::Boundary, SpeechEventKind::End] {
        let seen = Rc::clone(&seen);
        utterance = utterance.on(kind, move |event: &SpeechEvent| {
            seen.borrow_mut().push((kind, event.char_index()))
        });
    }
    client.speak(utterance);

    let request = handle.last("speak").unwrap();
    assert_eq!(request.command, Command::Speak(json!({"text": "One two"})));
    assert!(request.expects_reply);

    handle.event("speak", json!({"type": "start"})).unwrap();
    handle.event("speak", json!({"type": "boundry", "charIndex": 4})).unwrap();
    handle.event("speak", json!({"type": "word"})).unwrap();
    handle.event("speak", json!({"charIndex": 4})).unwrap();
    handle.reply("speak", json!({"type": "end"})).unwrap();
    client.run_until_idle();

    assert_eq!(
        *seen.borrow(),
        vec![
            (SpeechEventKind::Start, None),
            (SpeechEventKind::Boundary, Some(4)),
            (SpeechEventKind::End, None)
        ]
    );
}

#[test]
fn test_speak_without_handlers() {
    let (mut client, handle) = new_client();
    client.speak(Utterance::new("quiet"));
    handle.event("speak", json!({"type": "start"})).unwrap();
    handle.fail("speak", "synthesis failed").unwrap();
    client.run_until_idle();
    assert!(!client.speaking());
}

#[test]
fn test_speak_failure_calls_onerror() {
    let (mut client, handle) = new_client();
    let errors = Rc::new(Cell::new(0));
    let ended = Rc::new(Cell::new(false));
    let errors_seen = Rc::clone(&errors);
    let ended_seen = Rc::clone(&ended);

    client.speak(
        Utterance::new("broken")
            .on(SpeechEventKind::End, move |_: &SpeechEvent| ended_seen.set(true))
            .on_error(move || errors_seen.set(errors_seen.get() + 1)),
    );
    handle.fail("speak", "engine died").unwrap();
    client.run_until_idle();

    assert_eq!(errors.get(), 1);
    assert!(!ended.get());
    assert_eq!(client.outstanding(), 1);
}

#[test]
fn test_fire_and_forget_commands() {
    let (mut client, handle) = new_client();
    client.pause();
    client.resume();
    client.cancel();

    assert_eq!(handle.actions(), vec!["startup", "pause", "resume", "cancel"]);
    for request in &handle.requests()[1..] {
        assert!(!request.expects_reply);
        assert_eq!(request.service, "SpeechSynthesis");
    }
}

#[test]
fn test_custom_service_name() {
    let mut config = Config::default();
    config.set("bridge", "service", "Tts");
    let (bridge, handle) = RecordingBridge::new();
    let _client = SynthesisClient::new(bridge, config);
    assert_eq!(handle.last("startup").unwrap().service, "Tts");
}

//! synthbridge command line entry point
//!
//! Drives the synthesis client over the platform TTS bridge:
//! lists voices and engines, optionally switches engine, and speaks text.

use anyhow::{bail, Context};
use log::{debug, error, info};
use serde_json::Value;
use std::cell::Cell;
use std::process;
use std::rc::Rc;
use std::time::{Duration, Instant};
use synthbridge::bridge::backends::TtsBridge;
use synthbridge::config::Config;
use synthbridge::speech::{
    SpeechEventKind, SynthesisClient, Utterance, VoiceList, VOICES_CHANGED,
};
use synthbridge::BridgeError;

/// How long to wait for the native layer to answer startup
const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

/// How long an utterance may take before we give up waiting
const SPEAK_TIMEOUT: Duration = Duration::from_secs(60);

/// Parsed command line
struct Args {
    debug: bool,
    engine: Option<String>,
    list_voices: bool,
    list_engines: bool,
    text: Vec<String>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        debug: false,
        engine: None,
        list_voices: false,
        list_engines: false,
        text: Vec::new(),
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--debug" | "-d" => args.debug = true,
            "--voices" => args.list_voices = true,
            "--engines" => args.list_engines = true,
            "--engine" => {
                let name = iter.next().context("--engine needs an engine name")?;
                args.engine = Some(name);
            }
            other if other.starts_with("--") => bail!("Unknown option {}", other),
            _ => args.text.push(arg),
        }
    }

    Ok(args)
}

fn init_logging(debug_mode: bool) {
    if debug_mode {
        // Debug mode: write to synthbridge.log
        use std::fs::OpenOptions;
        match OpenOptions::new()
            .create(true)
            .append(true)
            .open("synthbridge.log")
        {
            Ok(log_file) => {
                env_logger::Builder::new()
                    .filter_level(log::LevelFilter::Debug)
                    .target(env_logger::Target::Pipe(Box::new(log_file)))
                    .init();
            }
            Err(e) => {
                eprintln!("Warning: Failed to open synthbridge.log for debug logging: {}", e);
                env_logger::Builder::new()
                    .filter_level(log::LevelFilter::Warn)
                    .init();
            }
        }

        info!(
            "synthbridge version {} starting (debug mode, logging to synthbridge.log)",
            synthbridge::VERSION
        );
    } else {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Error)
            .init();
    }
}

fn main() {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!(
                "Usage: synthbridge [--debug] [--engine NAME] [--voices] [--engines] [TEXT...]"
            );
            process::exit(2);
        }
    };

    init_logging(args.debug);

    if let Err(e) = run(args) {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let bridge = TtsBridge::new().context("No speech backend available")?;
    let mut client = SynthesisClient::new(bridge, config);

    let voices_ready = Rc::new(Cell::new(false));
    let flag = Rc::clone(&voices_ready);
    client.add_event_listener(
        VOICES_CHANGED,
        Rc::new(move |voices: &VoiceList| -> anyhow::Result<()> {
            debug!("Voices changed: {} available", voices.len());
            flag.set(true);
            Ok(())
        }),
    );

    pump_until(&mut client, STARTUP_TIMEOUT, || voices_ready.get());
    if !voices_ready.get() {
        bail!("Native speech service did not answer startup");
    }

    if let Some(engine) = &args.engine {
        let switched = Rc::new(Cell::new(None));
        let ok = Rc::clone(&switched);
        let failed = Rc::clone(&switched);
        client.set_engine_with_handlers(
            engine,
            Some(Box::new(move |_: &Value| ok.set(Some(true)))),
            Some(Box::new(move |e: &BridgeError| {
                error!("Engine switch failed: {}", e);
                failed.set(Some(false));
            })),
        );
        pump_until(&mut client, STARTUP_TIMEOUT, || switched.get().is_some());
        if switched.get() != Some(true) {
            bail!("Could not switch to engine {}", engine);
        }
    }

    // Engines and the default engine arrive independently of the voices
    client.run_until_idle();

    if args.list_engines {
        let default = client.get_default_engine().map(|e| e.name.clone());
        match client.get_engines() {
            Some(engines) => {
                for engine in engines {
                    let marker = if Some(&engine.name) == default.as_ref() { "*" } else { " " };
                    println!(
                        "{} {}{}",
                        marker,
                        engine.name,
                        engine.label.as_deref().map(|l| format!(" ({})", l)).unwrap_or_default()
                    );
                }
            }
            None => println!("No engine list reported"),
        }
    }

    if args.list_voices {
        for (index, voice) in client.get_voices().iter().enumerate() {
            println!("{:3} {} [{}]", index, voice.name, voice.lang);
        }
    }

    if !args.text.is_empty() {
        let text = args.text.join(" ");
        let done = Rc::new(Cell::new(false));
        let ended = Rc::clone(&done);
        let failed = Rc::clone(&done);

        client.speak(
            Utterance::new(text)
                .on(SpeechEventKind::End, move |_| ended.set(true))
                .on_error(move || {
                    error!("Speech failed");
                    failed.set(true);
                }),
        );

        pump_until(&mut client, SPEAK_TIMEOUT, || done.get());
        if !done.get() {
            info!("Timed out waiting for speech to finish");
            client.cancel();
        }
    }

    Ok(())
}

/// Run the client's event loop until `done` holds or `timeout` passes
fn pump_until(client: &mut SynthesisClient, timeout: Duration, done: impl Fn() -> bool) {
    let deadline = Instant::now() + timeout;
    while !done() {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        client.turn_blocking(deadline - now);
    }
}

//! Mouthpiece - speak typed text or your own transcribed voice through
//! one or two output devices, one of which is typically a virtual
//! microphone cable.

mod audio;
mod cli;
mod error;
mod pipeline;
mod settings;
mod speech;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::info;

use audio::AudioStore;
use cli::Command;
use pipeline::{Outcome, Pipeline};
use settings::Settings;
use speech::{OpenAiRewrite, OpenAiSynthesis, OpenAiTranscription};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    cli::init_logging(&args);

    match args.command {
        Command::Devices => list_devices(),
        Command::Speak { text, voice } => {
            let mut settings = Settings::load()?;
            if let Some(voice) = voice {
                settings.voice = voice;
            }
            let pipeline = build_pipeline(settings, true)?;
            let _guard = spawn_cancel_on_ctrl_c(&pipeline);
            match pipeline.speak(&text).await? {
                Outcome::Completed => Ok(()),
                Outcome::Cancelled => {
                    println!("Cancelled.");
                    Ok(())
                }
            }
        }
        Command::Record { discard, play } => {
            let settings = Settings::load()?;
            let pipeline = build_pipeline(settings, true)?;
            record(&pipeline, discard, play).await
        }
        Command::Replay => {
            let settings = Settings::load()?;
            // Replay never talks to the network, so a missing key is fine
            let pipeline = build_pipeline(settings, false)?;
            let _guard = spawn_cancel_on_ctrl_c(&pipeline);
            pipeline.replay_last().await?;
            Ok(())
        }
        Command::Rewrite { text } => {
            let settings = Settings::load()?;
            let pipeline = build_pipeline(settings, true)?;
            let _guard = spawn_cancel_on_ctrl_c(&pipeline);
            if let Some(rewritten) = pipeline.rewrite_text(&text).await? {
                println!("{}", rewritten);
            }
            Ok(())
        }
    }
}

fn list_devices() -> anyhow::Result<()> {
    let outputs = audio::device::list_output_devices().context("listing output devices")?;
    let inputs = audio::device::list_input_devices().context("listing input devices")?;

    println!("Output devices:");
    if outputs.is_empty() {
        println!("  (none)");
    }
    for d in &outputs {
        println!("  {} ({} Hz, {} ch)", d.name, d.sample_rate, d.channels);
    }

    println!("Input devices:");
    if inputs.is_empty() {
        println!("  (none)");
    }
    for d in &inputs {
        println!("  {} ({} Hz, {} ch)", d.name, d.sample_rate, d.channels);
    }
    Ok(())
}

fn build_pipeline(settings: Settings, require_key: bool) -> anyhow::Result<Arc<Pipeline>> {
    let api_key = if require_key {
        settings::api_key()?
    } else {
        settings::api_key().unwrap_or_default()
    };

    let client = speech::http_client()?;
    let synthesis = Arc::new(OpenAiSynthesis::new(
        client.clone(),
        api_key.clone(),
        settings.tts_model.clone(),
    ));
    let transcription = Arc::new(OpenAiTranscription::new(
        client.clone(),
        api_key.clone(),
        settings.transcription_model.clone(),
    ));
    let rewrite = Arc::new(OpenAiRewrite::new(
        client,
        api_key,
        settings.rewrite.model.clone(),
        settings.rewrite.prompt.clone(),
        settings.rewrite.max_tokens,
    ));

    let store = AudioStore::open()?;
    Ok(Arc::new(Pipeline::new(
        settings,
        store,
        synthesis,
        transcription,
        rewrite,
    )))
}

/// Ctrl-C cancels whatever the pipeline is doing. The watcher dies with
/// the returned handle.
fn spawn_cancel_on_ctrl_c(pipeline: &Arc<Pipeline>) -> CtrlCGuard {
    let pipeline = pipeline.clone();
    let handle = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
            pipeline.cancel();
        }
    });
    CtrlCGuard(handle)
}

struct CtrlCGuard(tokio::task::JoinHandle<()>);

impl Drop for CtrlCGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn record(pipeline: &Arc<Pipeline>, discard: bool, play: bool) -> anyhow::Result<()> {
    pipeline.start_recording().await?;
    println!("Recording... press Enter to stop, Ctrl-C to cancel.");

    let wait_for_enter = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
    });

    tokio::select! {
        _ = wait_for_enter => {}
        _ = tokio::signal::ctrl_c() => {
            pipeline.cancel();
            println!("Cancelled.");
            return Ok(());
        }
    }

    let _guard = spawn_cancel_on_ctrl_c(pipeline);
    match pipeline.stop_recording(discard, play).await? {
        Some(transcript) => println!("{}", transcript),
        None => println!("Recording discarded."),
    }
    Ok(())
}

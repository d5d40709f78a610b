mod app;
mod bridge;
mod config;
mod library;
mod player;

use std::io::{self, BufRead};
use std::sync::mpsc;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use engine::{Command, DirectoryExport, Engine, Event, Session};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use app::{AppState, HELP, Message};
use config::{Cli, StudioConfig};
use library::ClipLibraryBackend;
use player::PlayerSurface;

fn main() -> Result<()> {
    let config = StudioConfig::from_cli(Cli::parse())?;
    init_tracing(config.verbose);

    let backend = ClipLibraryBackend::open(&config.library)?;
    let engine = Engine::with_session(
        backend.clone(),
        DirectoryExport::new(&config.export_dir),
        Session::with_aspect_ratio(config.aspect_ratio),
    );
    info!(
        library = %backend.dir().display(),
        export_dir = %config.export_dir.display(),
        aspect_ratio = %config.aspect_ratio,
        "studio started"
    );

    let (command_tx, event_rx) = bridge::spawn_engine_bridge(engine);
    let (message_tx, message_rx) = mpsc::channel();
    bridge::forward_events(event_rx, message_tx.clone());
    spawn_input_reader(message_tx.clone());

    let mut player = PlayerSurface::new(config.player.as_deref(), message_tx);
    let mut app = AppState::new();

    println!("veo studio: clips from {}", backend.dir().display());
    println!("{HELP}");
    if !player.is_external() {
        println!("no player configured; type `ended` when a clip has finished");
    }

    while let Ok(message) = message_rx.recv() {
        let mut commands = Vec::new();
        match &message {
            Message::Engine(Event::PlayClip {
                index,
                cue,
                entry_id,
                bytes,
                ..
            }) => {
                if let Err(err) = player.play(*index, *cue, *entry_id, &bytes[..]) {
                    error!(index, error = %err, "player failed");
                    println!("error: {err:#}");
                    commands.push(Command::StopPlayback);
                }
            }
            Message::Engine(Event::PlaybackStopped) => player.stop(),
            _ => {}
        }

        commands.extend(app.update(message));
        for line in app.take_notices() {
            println!("{line}");
        }
        for command in commands {
            command_tx
                .send(command)
                .context("engine thread is no longer running")?;
        }
        if app.should_quit() {
            break;
        }
    }

    player.stop();
    Ok(())
}

fn spawn_input_reader(message_tx: mpsc::Sender<Message>) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if message_tx.send(Message::Line(line)).is_err() {
                return;
            }
        }
        let _ = message_tx.send(Message::InputClosed);
    });
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

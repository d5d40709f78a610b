use std::sync::mpsc;
use std::thread;

use engine::{Command, Engine, EngineErrorEvent, Event, GenerationBackend, LocalExport};
use tracing::debug;

use crate::app::Message;

const COMMAND_CHANNEL_CAPACITY: usize = 32;
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Sender used by the front end to dispatch commands to the engine thread.
pub type EngineCommandSender = mpsc::SyncSender<Command>;

/// Receiver used by the front end to read events emitted by the engine thread.
pub type EngineEventReceiver = mpsc::Receiver<Event>;

/// Spawns the engine on its own thread.
///
/// Commands are applied strictly in arrival order, which makes the engine
/// thread the only writer of session and playback state. A failed command is
/// reported as [`Event::Error`].
pub fn spawn_engine_bridge<G, X>(
    mut engine: Engine<G, X>,
) -> (EngineCommandSender, EngineEventReceiver)
where
    G: GenerationBackend + Send + 'static,
    X: LocalExport + Send + 'static,
{
    let (command_tx, command_rx) = mpsc::sync_channel::<Command>(COMMAND_CHANNEL_CAPACITY);
    let (event_tx, event_rx) = mpsc::sync_channel::<Event>(EVENT_CHANNEL_CAPACITY);

    thread::spawn(move || {
        while let Ok(command) = command_rx.recv() {
            debug!(?command, "engine command");
            match engine.handle_command(command) {
                Ok(events) => {
                    for event in events {
                        if event_tx.send(event).is_err() {
                            return;
                        }
                    }
                }
                Err(error) => {
                    if event_tx
                        .send(Event::Error(EngineErrorEvent::from_error(&error)))
                        .is_err()
                    {
                        return;
                    }
                }
            }
        }
    });

    (command_tx, event_rx)
}

/// Forwards engine events into the front end's message queue.
///
/// Sends [`Message::EngineDisconnected`] once the engine thread is gone.
pub fn forward_events(event_rx: EngineEventReceiver, message_tx: mpsc::Sender<Message>) {
    thread::spawn(move || {
        while let Ok(event) = event_rx.recv() {
            if message_tx.send(Message::Engine(event)).is_err() {
                return;
            }
        }
        let _ = message_tx.send(Message::EngineDisconnected);
    });
}

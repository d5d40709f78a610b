use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::export::{DirectoryExport, LocalExport, download_file_name};
use crate::generation::{AspectRatio, GenerationBackend, GenerationFailure};
use crate::history::Phase;
use crate::media::PlayableHandle;
use crate::playback::PlaybackState;
use crate::session::{PlayTarget, Session, SubmitResolution};

/// Commands accepted by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Replaces the prompt draft without submitting it.
    SetPrompt {
        text: String,
    },
    /// Changes the aspect ratio of the first clip. Rejected once the
    /// sequence has started.
    SetAspectRatio {
        aspect_ratio: AspectRatio,
    },
    /// Generates a base clip, or extends the last clip when the history is
    /// not empty.
    ///
    /// # Example
    /// ```ignore
    /// use engine::{Command, DirectoryExport, Engine};
    ///
    /// let mut engine = Engine::new(my_backend, DirectoryExport::new("."));
    /// let _ = engine.handle_command(Command::Submit {
    ///     prompt: String::from("a cat walking"),
    /// });
    /// let _ = engine.handle_command(Command::Submit {
    ///     prompt: String::from("the cat jumps onto a wall"),
    /// });
    /// ```
    Submit {
        prompt: String,
    },
    /// Removes the last clip. Callers confirm with the user first.
    Undo,
    /// Clears the whole project. Callers confirm with the user first.
    ResetProject,
    Download {
        entry_id: Uuid,
    },
    StartPlayback {
        from_index: usize,
    },
    /// Reported by the playback surface when clip `index` finished playing.
    /// `cue` is the one carried by the [`Event::PlayClip`] that started it.
    ClipEnded {
        index: usize,
        cue: u64,
    },
    StopPlayback,
}

/// Events emitted by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    SessionChanged(SessionSnapshot),
    PhaseChanged {
        phase: Phase,
    },
    GenerationFailed {
        message: String,
    },
    /// Instructs the playback surface to load and play one clip.
    PlayClip {
        index: usize,
        cue: u64,
        entry_id: Uuid,
        media: PlayableHandle,
        bytes: Arc<[u8]>,
    },
    PlaybackStopped,
    MediaReleased {
        media: Vec<PlayableHandle>,
    },
    ClipDownloaded {
        entry_id: Uuid,
        path: PathBuf,
    },
    Error(EngineErrorEvent),
}

/// User-facing error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    Validation,
    Busy,
    HistoryEmpty,
    Playback,
    Generation,
    Export,
    Other,
}

impl From<&EngineError> for EngineErrorKind {
    fn from(value: &EngineError) -> Self {
        match value {
            EngineError::EmptyPrompt
            | EngineError::AspectRatioLocked
            | EngineError::EntryIndexOutOfRange { .. } => Self::Validation,
            EngineError::GenerationInFlight { .. } | EngineError::RequestOutstanding => {
                Self::Busy
            }
            EngineError::HistoryEmpty => Self::HistoryEmpty,
            EngineError::PlaybackNotActive | EngineError::StaleClipEnded { .. } => Self::Playback,
            EngineError::Generation(_) => Self::Generation,
            EngineError::ExportIo { .. } | EngineError::InvalidFileName { .. } => Self::Export,
            _ => Self::Other,
        }
    }
}

/// User-facing error payload emitted as an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineErrorEvent {
    pub kind: EngineErrorKind,
    pub message: String,
}

impl EngineErrorEvent {
    pub fn from_error(error: &EngineError) -> Self {
        Self {
            kind: EngineErrorKind::from(error),
            message: error.to_string(),
        }
    }
}

/// Immutable session snapshot consumed by front ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub prompt: String,
    pub aspect_ratio: AspectRatio,
    pub aspect_ratio_editable: bool,
    pub phase: Phase,
    pub last_error: Option<String>,
    pub entries: Vec<EntrySummary>,
    pub playback: PlaybackState,
    pub playback_index: usize,
}

/// Snapshot representation of one history entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySummary {
    pub id: Uuid,
    pub prompt: String,
    pub created_at: DateTime<Utc>,
    pub is_extension: bool,
    pub media: PlayableHandle,
}

impl SessionSnapshot {
    pub fn from_session(session: &Session) -> Self {
        Self {
            prompt: session.prompt().to_owned(),
            aspect_ratio: session.aspect_ratio(),
            aspect_ratio_editable: session.history().is_empty(),
            phase: session.phase(),
            last_error: session.last_error().map(str::to_owned),
            entries: session
                .history()
                .entries()
                .iter()
                .map(|entry| EntrySummary {
                    id: entry.id,
                    prompt: entry.prompt.clone(),
                    created_at: entry.created_at,
                    is_extension: entry.is_extension,
                    media: entry.media,
                })
                .collect(),
            playback: session.playback(),
            playback_index: session.playback_index(),
        }
    }
}

/// Studio engine: one session, one generation backend, one exporter.
///
/// Commands are applied one at a time, so a single writer owns the session
/// and the playback state.
#[derive(Debug)]
pub struct Engine<G, X = DirectoryExport> {
    generator: G,
    exporter: X,
    session: Session,
}

impl<G, X> Engine<G, X>
where
    G: GenerationBackend,
    X: LocalExport,
{
    /// Creates an engine with an empty session.
    pub fn new(generator: G, exporter: X) -> Self {
        Self::with_session(generator, exporter, Session::new())
    }

    pub fn with_session(generator: G, exporter: X, session: Session) -> Self {
        Self {
            generator,
            exporter,
            session,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::from_session(&self.session)
    }

    /// Applies one command and returns emitted events.
    pub fn handle_command(&mut self, command: Command) -> Result<Vec<Event>> {
        match command {
            Command::SetPrompt { text } => {
                self.session.set_prompt(text);
                Ok(vec![self.session_changed()])
            }
            Command::SetAspectRatio { aspect_ratio } => {
                self.session.set_aspect_ratio(aspect_ratio)?;
                Ok(vec![self.session_changed()])
            }
            Command::Submit { prompt } => self.submit(prompt),
            Command::Undo => self.undo(),
            Command::ResetProject => Ok(self.reset_project()),
            Command::Download { entry_id } => self.download(entry_id),
            Command::StartPlayback { from_index } => self.start_playback(from_index),
            Command::ClipEnded { index, cue } => self.clip_ended(index, cue),
            Command::StopPlayback => {
                self.session.stop_playback()?;
                Ok(vec![Event::PlaybackStopped, self.session_changed()])
            }
        }
    }

    fn submit(&mut self, prompt: String) -> Result<Vec<Event>> {
        let request = self.session.begin_submit_with(prompt)?;
        let mut events = vec![Event::PhaseChanged {
            phase: self.session.phase(),
        }];

        debug!(
            extension = request.is_extension(),
            prompt = request.prompt(),
            "dispatching generation request"
        );
        let outcome = request.dispatch(&self.generator);

        match self.session.finish_submit(request, outcome)? {
            SubmitResolution::Appended { index, entry_id } => {
                info!(index, %entry_id, "clip appended to sequence");
            }
            SubmitResolution::Failed { message } => {
                let error = EngineError::Generation(GenerationFailure::new(message.clone()));
                events.push(Event::GenerationFailed { message });
                events.push(Event::Error(EngineErrorEvent::from_error(&error)));
            }
            SubmitResolution::Discarded => {}
        }

        events.push(Event::PhaseChanged {
            phase: self.session.phase(),
        });
        events.push(self.session_changed());
        Ok(events)
    }

    fn undo(&mut self) -> Result<Vec<Event>> {
        let undone = self.session.undo()?;
        let mut events = Vec::with_capacity(3);
        if undone.playback_stopped {
            events.push(Event::PlaybackStopped);
        }
        events.push(Event::MediaReleased {
            media: vec![undone.released],
        });
        events.push(self.session_changed());
        Ok(events)
    }

    fn reset_project(&mut self) -> Vec<Event> {
        let reset = self.session.reset();
        let mut events = Vec::with_capacity(3);
        if reset.playback_stopped {
            events.push(Event::PlaybackStopped);
        }
        if !reset.released.is_empty() {
            events.push(Event::MediaReleased {
                media: reset.released,
            });
        }
        events.push(self.session_changed());
        events
    }

    fn download(&mut self, entry_id: Uuid) -> Result<Vec<Event>> {
        let (entry, bytes) = self.session.entry_media(entry_id)?;
        let path = self
            .exporter
            .save(&download_file_name(entry.id), &bytes)?;
        Ok(vec![Event::ClipDownloaded { entry_id, path }])
    }

    fn start_playback(&mut self, from_index: usize) -> Result<Vec<Event>> {
        let target = self.session.start_playback(from_index)?;
        Ok(vec![play_clip(target), self.session_changed()])
    }

    fn clip_ended(&mut self, index: usize, cue: u64) -> Result<Vec<Event>> {
        let next = self.session.clip_ended(index, cue)?;
        let first = match next {
            Some(target) => play_clip(target),
            None => Event::PlaybackStopped,
        };
        Ok(vec![first, self.session_changed()])
    }

    fn session_changed(&self) -> Event {
        Event::SessionChanged(self.snapshot())
    }
}

fn play_clip(target: PlayTarget) -> Event {
    Event::PlayClip {
        index: target.index,
        cue: target.cue,
        entry_id: target.entry_id,
        media: target.media,
        bytes: target.bytes,
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::{Command, Engine, EngineErrorKind, Event};
    use crate::error::{EngineError, Result};
    use crate::export::LocalExport;
    use crate::generation::{
        AspectRatio, ClipAsset, GeneratedClip, GenerationBackend, GenerationFailure,
        GenerationOutcome,
    };
    use crate::history::Phase;
    use crate::playback::PlaybackState;

    #[test]
    fn first_submit_emits_generating_then_idle_with_one_entry() {
        let mut engine = Engine::new(MockBackend::default(), MockExport::default());

        let events = engine
            .handle_command(Command::Submit {
                prompt: String::from("a cat walking"),
            })
            .expect("submit should succeed");

        assert_eq!(
            events[0],
            Event::PhaseChanged {
                phase: Phase::Generating
            }
        );
        assert_eq!(events[1], Event::PhaseChanged { phase: Phase::Idle });
        let Event::SessionChanged(snapshot) = &events[2] else {
            panic!("last event must be SessionChanged");
        };
        assert_eq!(snapshot.entries.len(), 1);
        assert_eq!(snapshot.entries[0].prompt, "a cat walking");
        assert!(!snapshot.entries[0].is_extension);
        assert!(!snapshot.aspect_ratio_editable);
        assert_eq!(snapshot.prompt, "");
    }

    #[test]
    fn second_submit_extends_with_the_first_clip_asset() {
        let backend = MockBackend::default();
        let calls = backend.calls();
        let mut engine = Engine::new(backend, MockExport::default());
        submit(&mut engine, "a cat walking");

        let events = engine
            .handle_command(Command::Submit {
                prompt: String::from("cat jumps"),
            })
            .expect("extension should succeed");

        assert_eq!(
            events[0],
            Event::PhaseChanged {
                phase: Phase::Extending
            }
        );
        let calls = calls.lock().expect("lock calls");
        assert_eq!(
            calls.as_slice(),
            [
                String::from("new 16:9 a cat walking"),
                String::from("extend clip-1 cat jumps"),
            ]
        );
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.entries.len(), 2);
        assert!(snapshot.entries[1].is_extension);
    }

    #[test]
    fn failed_submit_reports_message_and_keeps_history() {
        let backend = MockBackend::default();
        backend.fail_next("video generation blocked by policy");
        let mut engine = Engine::new(backend, MockExport::default());

        let events = engine
            .handle_command(Command::Submit {
                prompt: String::from("a cat walking"),
            })
            .expect("failure is reported through events");

        assert!(events.contains(&Event::GenerationFailed {
            message: String::from("video generation blocked by policy")
        }));
        let error = events
            .iter()
            .find_map(|event| match event {
                Event::Error(error) => Some(error),
                _ => None,
            })
            .expect("error event");
        assert_eq!(error.kind, EngineErrorKind::Generation);
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.phase, Phase::Error);
        assert!(snapshot.entries.is_empty());
        assert_eq!(snapshot.prompt, "a cat walking");
        assert_eq!(
            snapshot.last_error.as_deref(),
            Some("video generation blocked by policy")
        );
    }

    #[test]
    fn empty_prompt_is_rejected_before_calling_the_backend() {
        let backend = MockBackend::default();
        let calls = backend.calls();
        let mut engine = Engine::new(backend, MockExport::default());

        let result = engine.handle_command(Command::Submit {
            prompt: String::from("  "),
        });

        let error = result.expect_err("empty prompt must be rejected");
        assert_eq!(EngineErrorKind::from(&error), EngineErrorKind::Validation);
        assert!(calls.lock().expect("lock calls").is_empty());
        assert_eq!(engine.snapshot().phase, Phase::Idle);
    }

    #[test]
    fn aspect_ratio_is_forwarded_and_then_locked() {
        let backend = MockBackend::default();
        let calls = backend.calls();
        let mut engine = Engine::new(backend, MockExport::default());
        engine
            .handle_command(Command::SetAspectRatio {
                aspect_ratio: AspectRatio::Portrait,
            })
            .expect("editable while empty");
        submit(&mut engine, "tall");

        let result = engine.handle_command(Command::SetAspectRatio {
            aspect_ratio: AspectRatio::Landscape,
        });

        assert!(matches!(result, Err(EngineError::AspectRatioLocked)));
        assert_eq!(calls.lock().expect("lock calls")[0], "new 9:16 tall");
    }

    #[test]
    fn undo_removes_tail_and_announces_released_media() {
        let mut engine = Engine::new(MockBackend::default(), MockExport::default());
        submit(&mut engine, "one");
        submit(&mut engine, "two");
        let tail_media = engine.snapshot().entries[1].media;

        let events = engine.handle_command(Command::Undo).expect("undo");

        assert_eq!(
            events[0],
            Event::MediaReleased {
                media: vec![tail_media]
            }
        );
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.entries.len(), 1);
        assert_eq!(snapshot.entries[0].prompt, "one");
    }

    #[test]
    fn reset_project_returns_to_empty_idle() {
        let mut engine = Engine::new(MockBackend::default(), MockExport::default());
        submit(&mut engine, "one");
        submit(&mut engine, "two");
        engine
            .handle_command(Command::StartPlayback { from_index: 0 })
            .expect("start playback");

        let events = engine
            .handle_command(Command::ResetProject)
            .expect("reset never fails");

        assert_eq!(events[0], Event::PlaybackStopped);
        assert!(matches!(&events[1], Event::MediaReleased { media } if media.len() == 2));
        let snapshot = engine.snapshot();
        assert!(snapshot.entries.is_empty());
        assert_eq!(snapshot.phase, Phase::Idle);
        assert_eq!(snapshot.last_error, None);
        assert_eq!(snapshot.prompt, "");
        assert!(snapshot.aspect_ratio_editable);
        assert_eq!(snapshot.playback, PlaybackState::Stopped);
    }

    #[test]
    fn playback_walks_the_sequence_and_stops_after_the_last_clip() {
        let mut engine = Engine::new(MockBackend::default(), MockExport::default());
        for prompt in ["one", "two", "three"] {
            submit(&mut engine, prompt);
        }

        let events = engine
            .handle_command(Command::StartPlayback { from_index: 0 })
            .expect("start");
        let mut current = cue_of(&events[0]);
        let mut played = vec![current.map(|(index, _)| index)];
        while let Some((index, cue)) = current {
            let events = engine
                .handle_command(Command::ClipEnded { index, cue })
                .expect("clip ended");
            current = cue_of(&events[0]);
            match &events[0] {
                Event::PlayClip { index, .. } => played.push(Some(*index)),
                Event::PlaybackStopped => played.push(None),
                other => panic!("unexpected event {other:?}"),
            }
        }

        assert_eq!(played, vec![Some(0), Some(1), Some(2), None]);
        assert_eq!(engine.snapshot().playback, PlaybackState::Stopped);
    }

    #[test]
    fn play_clip_carries_the_entry_bytes() {
        let mut engine = Engine::new(MockBackend::default(), MockExport::default());
        submit(&mut engine, "one");
        let entry_id = engine.snapshot().entries[0].id;

        let events = engine
            .handle_command(Command::StartPlayback { from_index: 0 })
            .expect("start");

        let Event::PlayClip {
            entry_id: played,
            bytes,
            ..
        } = &events[0]
        else {
            panic!("first event must be PlayClip");
        };
        assert_eq!(*played, entry_id);
        assert_eq!(&bytes[..], b"clip-1");
    }

    #[test]
    fn clip_ended_after_stop_is_a_playback_error() {
        let mut engine = Engine::new(MockBackend::default(), MockExport::default());
        submit(&mut engine, "one");
        submit(&mut engine, "two");
        let events = engine
            .handle_command(Command::StartPlayback { from_index: 0 })
            .expect("start");
        let (index, cue) = cue_of(&events[0]).expect("clip 0 plays");
        engine
            .handle_command(Command::StopPlayback)
            .expect("stop");

        let error = engine
            .handle_command(Command::ClipEnded { index, cue })
            .expect_err("stale report");

        assert_eq!(EngineErrorKind::from(&error), EngineErrorKind::Playback);
        assert_eq!(engine.snapshot().playback, PlaybackState::Stopped);
    }

    #[test]
    fn restarted_clip_is_not_cut_short_by_the_previous_run_ending() {
        let mut engine = Engine::new(MockBackend::default(), MockExport::default());
        for prompt in ["one", "two", "three"] {
            submit(&mut engine, prompt);
        }
        let events = engine
            .handle_command(Command::StartPlayback { from_index: 1 })
            .expect("first run");
        let (_, earlier_cue) = cue_of(&events[0]).expect("clip 1 plays");
        let events = engine
            .handle_command(Command::StartPlayback { from_index: 1 })
            .expect("restart");
        let (_, restarted_cue) = cue_of(&events[0]).expect("clip 1 plays again");
        let before = engine.snapshot();

        let error = engine
            .handle_command(Command::ClipEnded {
                index: 1,
                cue: earlier_cue,
            })
            .expect_err("report from the earlier run");

        assert!(matches!(error, EngineError::StaleClipEnded { index: 1, .. }));
        assert_eq!(engine.snapshot(), before);

        let events = engine
            .handle_command(Command::ClipEnded {
                index: 1,
                cue: restarted_cue,
            })
            .expect("report from the current run");
        assert!(matches!(cue_of(&events[0]), Some((2, _))));
    }

    #[test]
    fn rejected_submit_leaves_the_snapshot_unchanged() {
        let backend = MockBackend::default();
        backend.fail_next("quota exceeded");
        let mut engine = Engine::new(backend, MockExport::default());
        engine
            .handle_command(Command::Submit {
                prompt: String::from("a cat walking"),
            })
            .expect("failure is reported through events");
        let before = engine.snapshot();
        assert_eq!(before.phase, Phase::Error);

        let result = engine.handle_command(Command::Submit {
            prompt: String::from("   "),
        });

        assert!(matches!(result, Err(EngineError::EmptyPrompt)));
        assert_eq!(engine.snapshot(), before);
        assert_eq!(engine.snapshot().prompt, "a cat walking");
    }

    #[test]
    fn download_saves_entry_bytes_under_its_id() {
        let export = MockExport::default();
        let saved = export.saved();
        let mut engine = Engine::new(MockBackend::default(), export);
        submit(&mut engine, "one");
        let entry_id = engine.snapshot().entries[0].id;

        let events = engine
            .handle_command(Command::Download { entry_id })
            .expect("download");

        let expected_name = format!("veo-studio-{entry_id}.mp4");
        assert_eq!(
            events,
            vec![Event::ClipDownloaded {
                entry_id,
                path: PathBuf::from(&expected_name),
            }]
        );
        let saved = saved.lock().expect("lock saved");
        assert_eq!(saved.as_slice(), [(expected_name, b"clip-1".to_vec())]);
    }

    #[test]
    fn download_of_unknown_entry_fails() {
        let mut engine = Engine::new(MockBackend::default(), MockExport::default());

        let result = engine.handle_command(Command::Download {
            entry_id: uuid::Uuid::new_v4(),
        });

        assert!(matches!(result, Err(EngineError::EntryNotFound { .. })));
    }

    fn submit(engine: &mut Engine<MockBackend, MockExport>, prompt: &str) {
        engine
            .handle_command(Command::Submit {
                prompt: prompt.to_owned(),
            })
            .expect("submit should succeed");
    }

    fn cue_of(event: &Event) -> Option<(usize, u64)> {
        match event {
            Event::PlayClip { index, cue, .. } => Some((*index, *cue)),
            _ => None,
        }
    }

    #[derive(Debug, Default)]
    struct MockBackend {
        calls: Arc<Mutex<Vec<String>>>,
        fail_next: Mutex<Option<String>>,
        issued: Mutex<u32>,
    }

    impl MockBackend {
        fn calls(&self) -> Arc<Mutex<Vec<String>>> {
            Arc::clone(&self.calls)
        }

        fn fail_next(&self, message: &str) {
            *self.fail_next.lock().expect("lock failure") = Some(message.to_owned());
        }

        fn respond(&self) -> GenerationOutcome {
            if let Some(message) = self.fail_next.lock().expect("lock failure").take() {
                return Err(GenerationFailure::new(message));
            }
            let mut issued = self.issued.lock().expect("lock counter");
            *issued += 1;
            let name = format!("clip-{issued}");
            Ok(GeneratedClip {
                media: Arc::from(name.as_bytes()),
                asset: ClipAsset::new(json!(name)),
            })
        }
    }

    impl GenerationBackend for MockBackend {
        fn request_new_clip(&self, prompt: &str, aspect_ratio: AspectRatio) -> GenerationOutcome {
            self.calls
                .lock()
                .expect("lock calls")
                .push(format!("new {aspect_ratio} {prompt}"));
            self.respond()
        }

        fn request_extension(&self, asset: &ClipAsset, prompt: &str) -> GenerationOutcome {
            let name = asset.as_value().as_str().unwrap_or_default().to_owned();
            self.calls
                .lock()
                .expect("lock calls")
                .push(format!("extend {name} {prompt}"));
            self.respond()
        }
    }

    #[derive(Debug, Default)]
    struct MockExport {
        saved: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    }

    impl MockExport {
        fn saved(&self) -> Arc<Mutex<Vec<(String, Vec<u8>)>>> {
            Arc::clone(&self.saved)
        }
    }

    impl LocalExport for MockExport {
        fn save(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
            self.saved
                .lock()
                .expect("lock saved")
                .push((file_name.to_owned(), bytes.to_vec()));
            Ok(PathBuf::from(file_name))
        }
    }
}

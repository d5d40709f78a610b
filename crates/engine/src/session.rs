use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::generation::{AspectRatio, GenerationKind, GenerationOutcome, GenerationRequest};
use crate::history::{History, HistoryEntry, Phase};
use crate::media::{MediaStore, PlayableHandle};
use crate::playback::{PlaybackController, PlaybackState, PlaybackStep};

/// How a finished generation request was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitResolution {
    Appended { index: usize, entry_id: Uuid },
    Failed { message: String },
    /// The request belonged to a project that has since been reset.
    Discarded,
}

/// Result of removing the tail entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Undone {
    pub entry: HistoryEntry,
    pub released: PlayableHandle,
    pub playback_stopped: bool,
}

/// Result of starting a new project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectReset {
    pub released: Vec<PlayableHandle>,
    pub playback_stopped: bool,
}

/// Clip the playback surface should show next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayTarget {
    pub index: usize,
    /// Must come back with the clip-ended report for this clip.
    pub cue: u64,
    pub entry_id: Uuid,
    pub media: PlayableHandle,
    pub bytes: Arc<[u8]>,
}

/// Single active studio session.
///
/// Holds the prompt draft, the aspect ratio, the generation phase, the last
/// error, the clip history with its media, and the playback state. Nothing
/// here is persisted.
#[derive(Debug, Default)]
pub struct Session {
    prompt: String,
    aspect_ratio: AspectRatio,
    phase: Phase,
    last_error: Option<String>,
    history: History,
    media: MediaStore,
    playback: PlaybackController,
    epoch: u64,
    /// Epoch of the request still awaiting `finish_submit`, kept across resets.
    outstanding: Option<u64>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty session that starts new sequences at `aspect_ratio`.
    pub fn with_aspect_ratio(aspect_ratio: AspectRatio) -> Self {
        Self {
            aspect_ratio,
            ..Self::default()
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn aspect_ratio(&self) -> AspectRatio {
        self.aspect_ratio
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn playback(&self) -> PlaybackState {
        self.playback.state()
    }

    pub fn playback_index(&self) -> usize {
        self.playback.index()
    }

    pub fn media(&self) -> &MediaStore {
        &self.media
    }

    pub fn set_prompt(&mut self, text: impl Into<String>) {
        self.prompt = text.into();
    }

    /// Changes the aspect ratio used for the first clip.
    pub fn set_aspect_ratio(&mut self, aspect_ratio: AspectRatio) -> Result<()> {
        if self.phase.is_in_flight() {
            return Err(EngineError::GenerationInFlight { phase: self.phase });
        }
        if !self.history.is_empty() {
            return Err(EngineError::AspectRatioLocked);
        }
        self.aspect_ratio = aspect_ratio;
        Ok(())
    }

    /// Submits the current prompt draft. See [`Session::begin_submit_with`].
    pub fn begin_submit(&mut self) -> Result<GenerationRequest> {
        let prompt = self.prompt.clone();
        self.begin_submit_with(prompt)
    }

    /// Validates `prompt` and moves into `Generating` or `Extending`.
    ///
    /// `Idle` and `Error` are the resting phases. Submitting from `Error` is
    /// the retry edge and takes the same transitions as a first attempt; only
    /// `Generating` and `Extending` reject. A rejected submit leaves the
    /// session untouched, including the prompt draft. The returned request
    /// must be handed back to [`Session::finish_submit`].
    pub fn begin_submit_with(&mut self, prompt: impl Into<String>) -> Result<GenerationRequest> {
        if self.phase.is_in_flight() {
            warn!(phase = %self.phase, "submit rejected: request in flight");
            return Err(EngineError::GenerationInFlight { phase: self.phase });
        }
        if let Some(epoch) = self.outstanding {
            warn!(
                request_epoch = epoch,
                "submit rejected: request from a reset project outstanding"
            );
            return Err(EngineError::RequestOutstanding);
        }
        let draft = prompt.into();
        let trimmed = draft.trim();
        if trimmed.is_empty() {
            return Err(EngineError::EmptyPrompt);
        }
        let prompt = trimmed.to_owned();
        self.prompt = draft;

        let kind = match self.history.last() {
            None => GenerationKind::NewClip {
                aspect_ratio: self.aspect_ratio,
            },
            Some(tail) => GenerationKind::Extension {
                asset: tail.asset.clone(),
            },
        };
        let request = GenerationRequest {
            epoch: self.epoch,
            prompt,
            kind,
        };
        self.outstanding = Some(self.epoch);

        self.phase = if request.is_extension() {
            Phase::Extending
        } else {
            Phase::Generating
        };
        info!(
            phase = %self.phase,
            history_len = self.history.len(),
            "generation request issued"
        );
        Ok(request)
    }

    /// Applies the outcome of a request issued by [`Session::begin_submit`].
    pub fn finish_submit(
        &mut self,
        request: GenerationRequest,
        outcome: GenerationOutcome,
    ) -> Result<SubmitResolution> {
        if request.epoch != self.epoch {
            if self.outstanding == Some(request.epoch) {
                self.outstanding = None;
            }
            warn!(
                request_epoch = request.epoch,
                epoch = self.epoch,
                "generation result discarded: project was reset"
            );
            return Ok(SubmitResolution::Discarded);
        }
        if !self.phase.is_in_flight() {
            return Err(EngineError::NoGenerationInFlight);
        }
        self.outstanding = None;

        match outcome {
            Ok(clip) => {
                debug_assert_eq!(
                    request.is_extension(),
                    !self.history.is_empty(),
                    "history changed while a request was in flight"
                );
                let media = self.media.register(clip.media);
                let entry_id = self.history.append(media, request.prompt, clip.asset).id;
                let index = self.history.len() - 1;
                self.prompt.clear();
                self.last_error = None;
                self.phase = Phase::Idle;
                info!(%entry_id, index, "generation succeeded");
                Ok(SubmitResolution::Appended { index, entry_id })
            }
            Err(failure) => {
                let message = failure.message().to_owned();
                warn!(%message, "generation failed");
                self.last_error = Some(message.clone());
                self.phase = Phase::Error;
                Ok(SubmitResolution::Failed { message })
            }
        }
    }

    /// Removes the tail entry and releases its media.
    ///
    /// Rejected while a request is in flight, since that request extends the
    /// tail.
    pub fn undo(&mut self) -> Result<Undone> {
        if self.phase.is_in_flight() {
            return Err(EngineError::GenerationInFlight { phase: self.phase });
        }
        let entry = self.history.pop_last().ok_or(EngineError::HistoryEmpty)?;
        self.media.release(entry.media);
        let playback_stopped = self.playback.on_history_truncated(self.history.len());
        info!(
            entry_id = %entry.id,
            history_len = self.history.len(),
            playback_stopped,
            "undo applied"
        );
        Ok(Undone {
            released: entry.media,
            entry,
            playback_stopped,
        })
    }

    /// Returns the session to the empty/idle configuration.
    ///
    /// The aspect ratio is kept and becomes editable again.
    pub fn reset(&mut self) -> ProjectReset {
        let removed = self.history.clear();
        let released = self.media.release_all();
        let playback_stopped = self.playback.is_playing();
        self.playback.reset();
        self.prompt.clear();
        self.last_error = None;
        self.phase = Phase::Idle;
        self.epoch += 1;
        info!(
            removed = removed.len(),
            epoch = self.epoch,
            "project reset"
        );
        ProjectReset {
            released,
            playback_stopped,
        }
    }

    /// Looks up an entry together with its live media bytes.
    pub fn entry_media(&self, entry_id: Uuid) -> Result<(&HistoryEntry, Arc<[u8]>)> {
        let entry = self
            .history
            .find(entry_id)
            .ok_or(EngineError::EntryNotFound { entry_id })?;
        let bytes = self
            .media
            .resolve(entry.media)
            .ok_or(EngineError::MediaReleased { entry_id })?;
        Ok((entry, bytes))
    }

    /// Starts sequence playback at `from_index`.
    pub fn start_playback(&mut self, from_index: usize) -> Result<PlayTarget> {
        let index = self.playback.start(from_index, self.history.len())?;
        self.play_target(index)
    }

    /// Handles the surface's report that clip `index`, shown under `cue`,
    /// finished.
    ///
    /// Returns the next clip to play, or `None` once the sequence is done.
    pub fn clip_ended(&mut self, index: usize, cue: u64) -> Result<Option<PlayTarget>> {
        if !self.playback.is_playing() {
            return Err(EngineError::PlaybackNotActive);
        }
        if !self.playback.is_current(index, cue) {
            debug!(index, cue, current = self.playback.cue(), "stale clip-ended report");
            return Err(EngineError::StaleClipEnded { index, cue });
        }

        match self.playback.on_clip_ended(self.history.len())? {
            PlaybackStep::Advanced { index } => self.play_target(index).map(Some),
            PlaybackStep::Finished => Ok(None),
        }
    }

    pub fn stop_playback(&mut self) -> Result<()> {
        self.playback.stop()
    }

    fn play_target(&mut self, index: usize) -> Result<PlayTarget> {
        let len = self.history.len();
        let Some(entry) = self.history.get(index) else {
            self.playback.reset();
            return Err(EngineError::EntryIndexOutOfRange { index, len });
        };
        let Some(bytes) = self.media.resolve(entry.media) else {
            self.playback.reset();
            return Err(EngineError::MediaReleased { entry_id: entry.id });
        };
        Ok(PlayTarget {
            index,
            cue: self.playback.cue(),
            entry_id: entry.id,
            media: entry.media,
            bytes,
        })
    }
}

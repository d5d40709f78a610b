use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{EngineError, Result};

/// Sequence playback state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing {
        index: usize,
    },
}

/// Transition taken when the current clip finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStep {
    Advanced { index: usize },
    Finished,
}

/// Plays history entries back to back.
///
/// The controller only tracks an index; the caller passes the current
/// history length on every transition and never lets the controller mutate
/// the history itself.
///
/// Every clip handed to the surface gets a fresh cue number. A clip-ended
/// report is current only when it names both the playing index and the
/// latest cue, so a report left over from an earlier run of the same index
/// is told apart from the clip now showing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackController {
    state: PlaybackState,
    cue: u64,
}

impl PlaybackController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state, PlaybackState::Playing { .. })
    }

    /// Index of the current clip, reported as 0 while stopped.
    pub fn index(&self) -> usize {
        match self.state {
            PlaybackState::Stopped => 0,
            PlaybackState::Playing { index } => index,
        }
    }

    /// Cue number of the clip most recently handed to the surface.
    pub fn cue(&self) -> u64 {
        self.cue
    }

    /// Whether a clip-ended report for `index` under `cue` is for the clip
    /// now playing.
    pub fn is_current(&self, index: usize, cue: u64) -> bool {
        self.state == PlaybackState::Playing { index } && self.cue == cue
    }

    /// Enters `Playing(from_index)`.
    ///
    /// Restarting while already playing jumps to `from_index`.
    pub fn start(&mut self, from_index: usize, len: usize) -> Result<usize> {
        if len == 0 {
            return Err(EngineError::HistoryEmpty);
        }
        if from_index >= len {
            return Err(EngineError::EntryIndexOutOfRange {
                index: from_index,
                len,
            });
        }

        self.state = PlaybackState::Playing { index: from_index };
        self.cue += 1;
        info!(from_index, len, cue = self.cue, "sequence playback started");
        Ok(from_index)
    }

    /// Advances past the clip that just finished.
    pub fn on_clip_ended(&mut self, len: usize) -> Result<PlaybackStep> {
        let PlaybackState::Playing { index } = self.state else {
            return Err(EngineError::PlaybackNotActive);
        };

        let next = index + 1;
        if next >= len {
            self.state = PlaybackState::Stopped;
            info!(last_index = index, "sequence playback finished");
            return Ok(PlaybackStep::Finished);
        }

        self.state = PlaybackState::Playing { index: next };
        self.cue += 1;
        debug!(index = next, cue = self.cue, "sequence playback advanced");
        Ok(PlaybackStep::Advanced { index: next })
    }

    /// Stops immediately, whether or not the current clip has finished.
    pub fn stop(&mut self) -> Result<()> {
        if !self.is_playing() {
            return Err(EngineError::PlaybackNotActive);
        }
        self.state = PlaybackState::Stopped;
        info!("sequence playback stopped");
        Ok(())
    }

    /// Reconciles playback with a history that shrank to `len` entries.
    ///
    /// Playback stops when the clip it was showing is gone; otherwise it keeps
    /// playing and the shorter tail applies when the current clip ends.
    /// Returns true when playback was stopped.
    pub fn on_history_truncated(&mut self, len: usize) -> bool {
        match self.state {
            PlaybackState::Playing { index } if index >= len => {
                self.state = PlaybackState::Stopped;
                info!(index, len, "sequence playback stopped: clip removed");
                true
            }
            _ => false,
        }
    }

    /// Forces `Stopped` without validation.
    pub fn reset(&mut self) {
        self.state = PlaybackState::Stopped;
    }
}

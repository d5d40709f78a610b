use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use uuid::Uuid;

use crate::generation::GenerationFailure;
use crate::history::Phase;

/// Result type used by the engine crate.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors produced by engine commands and session transitions.
#[derive(Debug)]
pub enum EngineError {
    EmptyPrompt,
    GenerationInFlight {
        phase: Phase,
    },
    NoGenerationInFlight,
    /// A request issued before a reset has not resolved yet.
    RequestOutstanding,
    AspectRatioLocked,
    HistoryEmpty,
    EntryNotFound {
        entry_id: Uuid,
    },
    EntryIndexOutOfRange {
        index: usize,
        len: usize,
    },
    MediaReleased {
        entry_id: Uuid,
    },
    PlaybackNotActive,
    StaleClipEnded {
        index: usize,
        cue: u64,
    },
    Generation(GenerationFailure),
    ExportIo {
        context: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    InvalidFileName {
        file_name: String,
    },
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyPrompt => write!(f, "prompt is empty"),
            Self::GenerationInFlight { phase } => {
                write!(f, "a request is already in flight ({phase})")
            }
            Self::NoGenerationInFlight => write!(f, "no generation request is in flight"),
            Self::RequestOutstanding => {
                write!(f, "a request from the previous project has not resolved yet")
            }
            Self::AspectRatioLocked => {
                write!(f, "aspect ratio is fixed once the sequence has started")
            }
            Self::HistoryEmpty => write!(f, "history is empty"),
            Self::EntryNotFound { entry_id } => write!(f, "history entry not found: {entry_id}"),
            Self::EntryIndexOutOfRange { index, len } => {
                write!(f, "history index {index} is out of range (length {len})")
            }
            Self::MediaReleased { entry_id } => {
                write!(f, "media for entry {entry_id} has been released")
            }
            Self::PlaybackNotActive => write!(f, "sequence playback is not active"),
            Self::StaleClipEnded { index, cue } => write!(
                f,
                "clip-ended report for index {index} (cue {cue}) does not match playback"
            ),
            Self::Generation(failure) => write!(f, "generation failed: {failure}"),
            Self::ExportIo {
                context,
                path,
                source,
            } => write!(f, "{context}: {} ({source})", path.display()),
            Self::InvalidFileName { file_name } => {
                write!(f, "invalid export file name: {file_name:?}")
            }
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ExportIo { source, .. } => Some(source),
            Self::Generation(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<GenerationFailure> for EngineError {
    fn from(value: GenerationFailure) -> Self {
        Self::Generation(value)
    }
}

//! UI-agnostic core of Veo Studio: clip history, generation phases and
//! sequence playback.

pub mod api;
pub mod error;
pub mod export;
pub mod generation;
pub mod history;
pub mod media;
pub mod playback;
pub mod session;

pub use api::{
    Command, Engine, EngineErrorEvent, EngineErrorKind, EntrySummary, Event, SessionSnapshot,
};
pub use error::{EngineError, Result};
pub use export::{DirectoryExport, LocalExport, download_file_name};
pub use generation::{
    AspectRatio, ClipAsset, GeneratedClip, GenerationBackend, GenerationFailure,
    GenerationOutcome,
};
pub use history::{HistoryEntry, Phase};
pub use media::PlayableHandle;
pub use playback::PlaybackState;
pub use session::Session;

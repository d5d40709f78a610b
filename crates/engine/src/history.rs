use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::generation::ClipAsset;
use crate::media::PlayableHandle;

/// Generation phase of the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    Idle,
    Generating,
    Extending,
    Error,
}

impl Phase {
    /// Returns true while a generation request is outstanding.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Generating | Self::Extending)
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Generating => "generating",
            Self::Extending => "extending",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// One completed clip in the sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub media: PlayableHandle,
    pub prompt: String,
    pub created_at: DateTime<Utc>,
    pub asset: ClipAsset,
    pub is_extension: bool,
}

/// Ordered chain of generated clips.
///
/// Entry `i > 0` always extends entry `i - 1`, so entries only ever join or
/// leave at the tail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a clip to the tail and returns the new entry.
    ///
    /// The extension flag is derived from the chain position.
    pub fn append(
        &mut self,
        media: PlayableHandle,
        prompt: String,
        asset: ClipAsset,
    ) -> &HistoryEntry {
        let entry = HistoryEntry {
            id: Uuid::new_v4(),
            media,
            prompt,
            created_at: Utc::now(),
            asset,
            is_extension: !self.entries.is_empty(),
        };
        debug!(
            entry_id = %entry.id,
            index = self.entries.len(),
            is_extension = entry.is_extension,
            "history entry appended"
        );
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    /// Removes the tail entry.
    pub fn pop_last(&mut self) -> Option<HistoryEntry> {
        self.entries.pop()
    }

    /// Removes every entry, oldest first.
    pub fn clear(&mut self) -> Vec<HistoryEntry> {
        std::mem::take(&mut self.entries)
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    pub fn get(&self, index: usize) -> Option<&HistoryEntry> {
        self.entries.get(index)
    }

    pub fn find(&self, entry_id: Uuid) -> Option<&HistoryEntry> {
        self.entries.iter().find(|entry| entry.id == entry_id)
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

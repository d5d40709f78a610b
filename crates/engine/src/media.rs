use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Locally resolvable reference to one clip's media bytes.
///
/// A handle stays valid until it is released from the [`MediaStore`] that
/// issued it. Handles are never reused within a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayableHandle(u64);

impl Display for PlayableHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "media:{}", self.0)
    }
}

/// Owner of the clip bytes referenced by history entries.
///
/// # Example
/// ```
/// use std::sync::Arc;
///
/// use engine::media::MediaStore;
///
/// let mut store = MediaStore::new();
/// let handle = store.register(Arc::from(vec![0_u8; 16]));
///
/// assert_eq!(store.resolve(handle).map(|bytes| bytes.len()), Some(16));
/// assert!(store.release(handle));
/// assert!(store.resolve(handle).is_none());
/// ```
#[derive(Debug)]
pub struct MediaStore {
    next_handle: u64,
    entries: HashMap<PlayableHandle, Arc<[u8]>>,
}

impl Default for MediaStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaStore {
    pub fn new() -> Self {
        Self {
            next_handle: 1,
            entries: HashMap::new(),
        }
    }

    /// Stores `bytes` and returns a fresh handle for them.
    pub fn register(&mut self, bytes: Arc<[u8]>) -> PlayableHandle {
        let handle = PlayableHandle(self.next_handle);
        self.next_handle += 1;
        self.entries.insert(handle, bytes);
        handle
    }

    /// Returns the bytes behind `handle` while it is still live.
    pub fn resolve(&self, handle: PlayableHandle) -> Option<Arc<[u8]>> {
        self.entries.get(&handle).cloned()
    }

    /// Releases one handle. Returns false when it was already released.
    pub fn release(&mut self, handle: PlayableHandle) -> bool {
        self.entries.remove(&handle).is_some()
    }

    /// Releases every live handle and returns them in issue order.
    pub fn release_all(&mut self) -> Vec<PlayableHandle> {
        let mut released: Vec<_> = self.entries.drain().map(|(handle, _)| handle).collect();
        released.sort_unstable();
        released
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::MediaStore;

    #[test]
    fn released_handles_are_not_reissued() {
        let mut store = MediaStore::new();
        let first = store.register(sample_bytes(1));
        assert!(store.release(first));

        let second = store.register(sample_bytes(2));

        assert_ne!(first, second);
        assert!(store.resolve(first).is_none());
        assert_eq!(store.resolve(second).expect("second is live")[0], 2);
    }

    #[test]
    fn release_all_returns_live_handles_in_issue_order() {
        let mut store = MediaStore::new();
        let a = store.register(sample_bytes(1));
        let b = store.register(sample_bytes(2));
        let c = store.register(sample_bytes(3));
        store.release(b);

        let released = store.release_all();

        assert_eq!(released, vec![a, c]);
        assert!(store.is_empty());
        assert!(!store.release(a));
    }

    fn sample_bytes(value: u8) -> Arc<[u8]> {
        Arc::from(vec![value; 4])
    }
}

//! Shared, lazily rebuilt snapshot.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::core::snapshot::Snapshot;
use crate::core::storage::Storage;
use crate::Result;

#[derive(Debug, Default)]
struct CacheState {
    current: Option<Arc<Snapshot>>,
    stale: bool,
    /// Bumped by every invalidation.
    generation: u64,
}

impl CacheState {
    fn fresh(&self) -> Option<Arc<Snapshot>> {
        match &self.current {
            Some(snapshot) if !self.stale => Some(Arc::clone(snapshot)),
            _ => None,
        }
    }
}

/// Holds the current [`Snapshot`] of one notes database.
///
/// Readers get an `Arc` and keep using it for as long as they like; a rebuild
/// swaps in a new snapshot without disturbing them. Only one rebuild runs at
/// a time, and a failed rebuild leaves the previous snapshot in place.
#[derive(Debug)]
pub struct SnapshotCache {
    path: PathBuf,
    state: RwLock<CacheState>,
    rebuild: Mutex<()>,
}

impl SnapshotCache {
    /// Creates an empty cache. Nothing is read until the first [`get`](Self::get).
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            state: RwLock::new(CacheState::default()),
            rebuild: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the current snapshot, building it first if there is none or
    /// it has been invalidated.
    ///
    /// # Errors
    ///
    /// Returns the storage error that stopped the rebuild. The previous
    /// snapshot, if any, stays available through [`current`](Self::current).
    pub fn get(&self) -> Result<Arc<Snapshot>> {
        self.get_or_build_with(|| self.build())
    }

    fn get_or_build_with<F>(&self, build: F) -> Result<Arc<Snapshot>>
    where
        F: FnOnce() -> Result<Snapshot>,
    {
        if let Some(snapshot) = self.read_state().fresh() {
            return Ok(snapshot);
        }

        let _rebuilding = self.rebuild.lock().unwrap_or_else(PoisonError::into_inner);
        // another caller may have finished a rebuild while we waited
        let started_at = {
            let state = self.read_state();
            if let Some(snapshot) = state.fresh() {
                return Ok(snapshot);
            }
            state.generation
        };

        let snapshot = match build() {
            Ok(snapshot) => Arc::new(snapshot),
            Err(e) => {
                log::error!("snapshot rebuild of {} failed: {e}", self.path.display());
                return Err(e);
            }
        };
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.current = Some(Arc::clone(&snapshot));
        // an invalidation during the build may not be reflected in it
        if state.generation == started_at {
            state.stale = false;
        } else {
            log::debug!("snapshot of {} invalidated during rebuild", self.path.display());
        }
        Ok(snapshot)
    }

    /// Marks the snapshot stale; the next [`get`](Self::get) rebuilds it.
    pub fn invalidate(&self) {
        log::debug!("invalidating snapshot of {}", self.path.display());
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.stale = true;
        state.generation = state.generation.wrapping_add(1);
    }

    /// Invalidates and rebuilds immediately.
    pub fn refresh(&self) -> Result<Arc<Snapshot>> {
        self.invalidate();
        self.get()
    }

    /// The last successfully built snapshot, stale or not.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.read_state().current.clone()
    }

    pub fn is_stale(&self) -> bool {
        let state = self.read_state();
        state.stale || state.current.is_none()
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn build(&self) -> Result<Snapshot> {
        let storage = Storage::open(&self.path)?;
        Snapshot::build(&storage)
    }
}

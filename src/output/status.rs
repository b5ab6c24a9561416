//! Persisted per-job episode state machine

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use tracing::{debug, info, warn};

use crate::domain::model::{EpisodeKey, EpisodeState};
use crate::error::{IndexerError, IndexerResult};
use crate::library::LibraryWalker;
use crate::output::layout::JobWorkspace;
use crate::output::writer::OutputWriter;

/// `season -> episode -> state`, the on-disk shape of `status.json`
pub type StatusMap = BTreeMap<u32, BTreeMap<u32, EpisodeState>>;

/// State of `key` in a snapshot; absent entries are pending
pub fn state_in(map: &StatusMap, key: EpisodeKey) -> EpisodeState {
    map.get(&key.season)
        .and_then(|episodes| episodes.get(&key.episode))
        .copied()
        .unwrap_or_default()
}

enum Loaded {
    Present(StatusMap),
    Missing,
    Corrupt,
}

/// Status store backed by `<job>/status.json`
#[derive(Debug, Clone)]
pub struct StatusStore {
    workspace: JobWorkspace,
    writer: OutputWriter,
}

impl StatusStore {
    pub fn new(workspace: JobWorkspace) -> Self {
        Self {
            workspace,
            writer: OutputWriter::new(),
        }
    }

    async fn load(&self) -> Loaded {
        let path = self.workspace.status_path();
        let bytes = match self.writer.read_optional(&path).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Loaded::Missing,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Status file unreadable, treating as empty");
                return Loaded::Corrupt;
            }
        };

        match serde_json::from_slice::<StatusMap>(&bytes) {
            Ok(map) => Loaded::Present(map),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Status file corrupt, treating as empty");
                Loaded::Corrupt
            }
        }
    }

    async fn load_map(&self) -> StatusMap {
        match self.load().await {
            Loaded::Present(map) => map,
            Loaded::Missing | Loaded::Corrupt => StatusMap::new(),
        }
    }

    async fn save(&self, map: &StatusMap) -> IndexerResult<()> {
        let json = serde_json::to_vec_pretty(map)?;
        self.writer.write_atomic(&self.workspace.status_path(), json).await
    }

    /// Insert `pending` for every key not yet tracked.
    ///
    /// Writes only when something was inserted or the file was missing or
    /// corrupt. Returns the number of inserted keys.
    pub async fn seed<I>(&self, keys: I) -> IndexerResult<usize>
    where
        I: IntoIterator<Item = EpisodeKey>,
    {
        let _guard = self.workspace.lock().lock().await;

        let (mut map, needs_write) = match self.load().await {
            Loaded::Present(map) => (map, false),
            Loaded::Missing | Loaded::Corrupt => (StatusMap::new(), true),
        };

        let mut inserted = 0;
        for key in keys {
            let episodes = map.entry(key.season).or_default();
            if !episodes.contains_key(&key.episode) {
                episodes.insert(key.episode, EpisodeState::Pending);
                inserted += 1;
            }
        }

        if inserted > 0 || needs_write {
            self.save(&map).await?;
        }
        debug!(job_id = %self.workspace.job_id(), inserted, "Status store seeded");
        Ok(inserted)
    }

    /// Seed from every classified file under `root`
    pub async fn seed_from_root(&self, root: &Path) -> IndexerResult<usize> {
        let root = root.to_path_buf();
        let keys: BTreeSet<EpisodeKey> = tokio::task::spawn_blocking(move || {
            LibraryWalker::new(root).and_then(|walker| walker.scan())
        })
        .await
        .map_err(|e| IndexerError::Traversal {
            path: self.workspace.dir().to_path_buf(),
            message: e.to_string(),
        })??
        .episode_keys();

        self.seed(keys).await
    }

    /// Current state of an episode. Never fails: anything unknown is pending.
    pub async fn get(&self, key: EpisodeKey) -> EpisodeState {
        let _guard = self.workspace.lock().lock().await;
        state_in(&self.load_map().await, key)
    }

    /// Move an episode forward. Backward requests are ignored.
    ///
    /// Returns the state the episode is in afterwards.
    pub async fn set(&self, key: EpisodeKey, state: EpisodeState) -> IndexerResult<EpisodeState> {
        let _guard = self.workspace.lock().lock().await;

        let mut map = self.load_map().await;
        let current = state_in(&map, key);
        if !current.can_transition_to(state) {
            info!(
                job_id = %self.workspace.job_id(),
                episode = %key,
                from = %current,
                to = %state,
                "Ignoring backward status transition"
            );
            return Ok(current);
        }

        map.entry(key.season).or_default().insert(key.episode, state);
        self.save(&map).await?;
        debug!(job_id = %self.workspace.job_id(), episode = %key, %state, "Status updated");
        Ok(state)
    }

    /// Copy of the whole store
    pub async fn snapshot(&self) -> StatusMap {
        let _guard = self.workspace.lock().lock().await;
        self.load_map().await
    }
}

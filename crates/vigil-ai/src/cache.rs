use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;
use vigil_sched::SpinMutex;

use crate::ambient::AmbientBehaviour;
use crate::error::{AiError, AiResult};

/// Slow external source of ambient lines, keyed by lowercase body name.
pub trait BehaviourStore: Send + Sync {
    /// Every line for bodies named `name`.
    fn load(&self, name: &str) -> AiResult<Vec<AmbientBehaviour>>;
}

/// Name-keyed, lazily filled cache in front of a [`BehaviourStore`].
///
/// Lookups are case-insensitive and return a fresh copy, so callers may
/// mutate what they get. The store is queried outside the lock; when two
/// threads miss on the same name at once, both query, the first insert
/// wins, and each caller still gets its own result.
pub struct BehaviourCache {
    store: Box<dyn BehaviourStore>,
    entries: SpinMutex<HashMap<String, Arc<Vec<AmbientBehaviour>>>>,
}

impl fmt::Debug for BehaviourCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviourCache")
            .field("cached", &self.len())
            .finish()
    }
}

impl BehaviourCache {
    /// An empty cache over `store`.
    pub fn new(store: impl BehaviourStore + 'static) -> Self {
        Self {
            store: Box::new(store),
            entries: SpinMutex::new(HashMap::new()),
        }
    }

    /// A cache that never finds anything.
    pub fn empty() -> Self {
        Self::new(StaticBehaviourStore::default())
    }

    /// Lines for `name`, querying the store on first access.
    pub fn get(&self, name: &str) -> AiResult<Vec<AmbientBehaviour>> {
        let key = name.to_lowercase();
        let hit = self.entries.lock().get(&key).cloned();
        if let Some(lines) = hit {
            return Ok(lines.as_ref().clone());
        }

        let loaded = self.store.load(&key)?;
        let mine = loaded.clone();
        let raced = {
            let mut entries = self.entries.lock();
            let raced = entries.contains_key(&key);
            if !raced {
                entries.insert(key.clone(), Arc::new(loaded));
            }
            raced
        };
        debug!(name = %key, lines = mine.len(), raced, "behaviour_cache_filled");
        Ok(mine)
    }

    /// True if `name` is cached.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.lock().contains_key(&name.to_lowercase())
    }

    /// Number of cached names.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget `name` so the next lookup queries the store again.
    pub fn invalidate(&self, name: &str) -> bool {
        self.entries.lock().remove(&name.to_lowercase()).is_some()
    }

    /// Forget everything.
    pub fn clear(&self) {
        let old = std::mem::take(&mut *self.entries.lock());
        drop(old);
    }
}

/// A fixed in-memory list of lines. Counts its queries.
#[derive(Debug, Default)]
pub struct StaticBehaviourStore {
    lines: Vec<AmbientBehaviour>,
    queries: AtomicUsize,
}

impl StaticBehaviourStore {
    /// A store serving `lines`.
    pub fn new(lines: Vec<AmbientBehaviour>) -> Self {
        Self {
            lines,
            queries: AtomicUsize::new(0),
        }
    }

    /// How many times the store has been queried.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }
}

impl BehaviourStore for StaticBehaviourStore {
    fn load(&self, name: &str) -> AiResult<Vec<AmbientBehaviour>> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        Ok(matching(&self.lines, name))
    }
}

impl<T: BehaviourStore> BehaviourStore for Arc<T> {
    fn load(&self, name: &str) -> AiResult<Vec<AmbientBehaviour>> {
        self.as_ref().load(name)
    }
}

/// Lines stored as a JSON array in a file, read on every query.
#[derive(Debug, Clone)]
pub struct JsonBehaviourStore {
    path: PathBuf,
}

impl JsonBehaviourStore {
    /// A store reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> AiResult<Vec<AmbientBehaviour>> {
        let json = std::fs::read_to_string(&self.path).map_err(|source| AiError::Io {
            path: self.path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|e| AiError::Store(format!("{}: {e}", self.path.display())))
    }
}

impl BehaviourStore for JsonBehaviourStore {
    fn load(&self, name: &str) -> AiResult<Vec<AmbientBehaviour>> {
        Ok(matching(&self.read_all()?, name))
    }
}

/// Lines whose source matches `name`, compared the same way cache keys are
/// folded.
fn matching(lines: &[AmbientBehaviour], name: &str) -> Vec<AmbientBehaviour> {
    let name = name.to_lowercase();
    lines
        .iter()
        .filter(|line| line.source.to_lowercase() == name)
        .cloned()
        .collect()
}

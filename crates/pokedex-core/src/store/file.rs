use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, trace, warn};

use super::lock::{FileLock, LockMode};
use super::StoreError;

/// Maximum time to wait for the save file lock.
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between lock attempts.
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Suffix of the sidecar lock file.
const LOCK_SUFFIX: &str = ".lock";

/// Where a save is in its lifecycle. Every save starts and ends at `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SaveStage {
    Idle,
    LockAcquiring,
    Writing,
    Renaming,
    Failed,
}

impl fmt::Display for SaveStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SaveStage::Idle => "idle",
            SaveStage::LockAcquiring => "lock-acquiring",
            SaveStage::Writing => "writing",
            SaveStage::Renaming => "renaming",
            SaveStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// JSON document store at a single path.
///
/// The store holds no in-memory copy of the document and never retries;
/// both are the caller's business.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    lock_path: PathBuf,
    lock_timeout: Duration,
    retry_interval: Duration,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock_path = lock_path_for(&path);
        Self {
            path,
            lock_path,
            lock_timeout: LOCK_TIMEOUT,
            retry_interval: LOCK_RETRY_INTERVAL,
        }
    }

    /// Override the bounded wait used for both shared and exclusive locks.
    pub fn with_lock_timeout(mut self, timeout: Duration, retry_interval: Duration) -> Self {
        self.lock_timeout = timeout;
        self.retry_interval = retry_interval;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Atomically replace the save file with `document`.
    ///
    /// On error the previous save file is left as it was.
    pub fn save<T: Serialize>(&self, document: &T) -> Result<(), StoreError> {
        let mut stage = SaveStage::Idle;
        let result = self.save_locked(document, &mut stage);

        match &result {
            Ok(()) => debug!(path = %self.path.display(), "Save file written"),
            Err(e) => {
                warn!(path = %self.path.display(), %stage, error = %e, "Save failed");
                advance(&mut stage, SaveStage::Failed);
            }
        }
        advance(&mut stage, SaveStage::Idle);
        result
    }

    fn save_locked<T: Serialize>(
        &self,
        document: &T,
        stage: &mut SaveStage,
    ) -> Result<(), StoreError> {
        advance(stage, SaveStage::LockAcquiring);
        if let Some(parent) = parent_dir(&self.path) {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let _lock = FileLock::acquire(
            &self.lock_path,
            LockMode::Exclusive,
            self.lock_timeout,
            self.retry_interval,
        )?;

        advance(stage, SaveStage::Writing);
        let contents = serde_json::to_vec_pretty(document).map_err(StoreError::Encode)?;
        let tmp_path = self.write_temp(&contents)?;

        advance(stage, SaveStage::Renaming);
        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(StoreError::io(&self.path, e));
        }
        sync_parent(&self.path);

        Ok(())
    }

    /// Write `contents` to a fresh temporary file next to the save file.
    fn write_temp(&self, contents: &[u8]) -> Result<PathBuf, StoreError> {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp_path = self
            .path
            .with_file_name(format!("{}.tmp-{}-{}", file_name, std::process::id(), seq));

        let written = File::create(&tmp_path).and_then(|mut file| {
            file.write_all(contents)?;
            file.sync_all()
        });
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(StoreError::io(&tmp_path, e));
        }
        Ok(tmp_path)
    }

    /// Load the save file, or `T::default()` if there is none yet.
    ///
    /// A file that exists but does not parse is an error, never a reset.
    pub fn load<T: DeserializeOwned + Default>(&self) -> Result<T, StoreError> {
        // Only a file that is really absent counts as a first run.
        match fs::metadata(&self.path) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No save file, starting empty");
                return Ok(T::default());
            }
            Err(e) => return Err(StoreError::io(&self.path, e)),
        }

        let _lock = FileLock::acquire(
            &self.lock_path,
            LockMode::Shared,
            self.lock_timeout,
            self.retry_interval,
        )?;

        let contents = match fs::read(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(T::default()),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        let document = serde_json::from_slice(&contents).map_err(|e| StoreError::Decode {
            path: self.path.clone(),
            source: e,
        })?;
        debug!(path = %self.path.display(), bytes = contents.len(), "Save file loaded");
        Ok(document)
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut lock = path.as_os_str().to_owned();
    lock.push(LOCK_SUFFIX);
    PathBuf::from(lock)
}

fn parent_dir(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| !p.as_os_str().is_empty())
}

fn advance(stage: &mut SaveStage, next: SaveStage) {
    trace!(from = %stage, to = %next, "Save stage");
    *stage = next;
}

/// Persist the rename itself. Best effort.
#[cfg(unix)]
fn sync_parent(path: &Path) {
    if let Some(parent) = parent_dir(path) {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) {}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::thread;
    use tempfile::TempDir;

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    struct Doc {
        #[serde(default)]
        items: BTreeMap<String, serde_json::Value>,
    }

    fn doc(entries: &[(&str, serde_json::Value)]) -> Doc {
        Doc {
            items: entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }

    fn store_in(dir: &TempDir) -> FileStore {
        FileStore::new(dir.path().join("save.json"))
            .with_lock_timeout(Duration::from_millis(200), Duration::from_millis(10))
    }

    fn dir_names(dir: &TempDir) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_lock_path_is_sidecar() {
        let store = FileStore::new("/home/ash/.pokedexcli_save.json");
        assert_eq!(
            store.lock_path(),
            Path::new("/home/ash/.pokedexcli_save.json.lock")
        );
    }

    #[test]
    fn test_load_missing_returns_default() {
        let dir = TempDir::new().unwrap();
        let loaded: Doc = store_in(&dir).load().unwrap();
        assert_eq!(loaded, Doc::default());
        assert!(dir_names(&dir).is_empty(), "load must not create files");
    }

    #[test]
    fn test_save_then_load_pikachu() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let blob = json!({"name": "pikachu", "height": 4, "weight": 60, "stats": [{"base_stat": 35}]});

        store.save(&doc(&[("pikachu", blob.clone())])).unwrap();
        let loaded: Doc = store.load().unwrap();

        assert_eq!(loaded.items.len(), 1);
        assert_eq!(loaded.items["pikachu"], blob);
    }

    #[test]
    fn test_save_leaves_only_save_and_lock_files() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.save(&doc(&[("bulbasaur", json!(1))])).unwrap();
        store.save(&doc(&[("ivysaur", json!(2))])).unwrap();

        assert_eq!(dir_names(&dir), vec!["save.json", "save.json.lock"]);
        let loaded: Doc = store.load().unwrap();
        assert_eq!(loaded, doc(&[("ivysaur", json!(2))]));
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("nested").join("deeper").join("save.json"));

        store.save(&doc(&[("mew", json!(151))])).unwrap();

        let loaded: Doc = store.load().unwrap();
        assert_eq!(loaded, doc(&[("mew", json!(151))]));
    }

    #[test]
    fn test_interrupted_save_keeps_previous_document() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let previous = doc(&[("charmander", json!({"name": "charmander"}))]);
        store.save(&previous).unwrap();

        // A crash between write and rename leaves a half-written temp file.
        fs::write(dir.path().join("save.json.tmp-4242-0"), b"{\"items\": {\"char").unwrap();

        let loaded: Doc = store.load().unwrap();
        assert_eq!(loaded, previous);
    }

    #[test]
    fn test_interrupted_first_save_loads_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("save.json.tmp-4242-0"), b"{\"it").unwrap();

        let loaded: Doc = store_in(&dir).load().unwrap();
        assert_eq!(loaded, Doc::default());
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_path_is_io_error_not_empty() {
        let dir = TempDir::new().unwrap();
        // A regular file where the save file's directory should be makes
        // stat fail with something other than NotFound.
        fs::write(dir.path().join("blocker"), b"").unwrap();
        let store = FileStore::new(dir.path().join("blocker").join("save.json"));

        let err = store.load::<Doc>().unwrap_err();

        assert!(matches!(err, StoreError::Io { .. }), "got {err:?}");
    }

    #[test]
    fn test_corrupt_file_is_decode_error_and_untouched() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), b"not json at all").unwrap();

        let err = store.load::<Doc>().unwrap_err();

        assert!(matches!(err, StoreError::Decode { .. }), "got {err:?}");
        assert_eq!(fs::read(store.path()).unwrap(), b"not json at all");
    }

    #[test]
    fn test_save_times_out_while_lock_held() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let _held = FileLock::acquire(
            store.lock_path(),
            LockMode::Exclusive,
            Duration::ZERO,
            Duration::ZERO,
        )
        .unwrap();

        let err = store.save(&doc(&[("eevee", json!(133))])).unwrap_err();

        assert!(matches!(err, StoreError::LockTimeout { .. }), "got {err:?}");
        assert!(!store.path().exists());
    }

    #[test]
    fn test_load_waits_for_writer_but_not_for_readers() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&doc(&[("snorlax", json!(143))])).unwrap();

        {
            let _reader = FileLock::acquire(
                store.lock_path(),
                LockMode::Shared,
                Duration::ZERO,
                Duration::ZERO,
            )
            .unwrap();
            assert!(store.load::<Doc>().is_ok());
        }

        let _writer = FileLock::acquire(
            store.lock_path(),
            LockMode::Exclusive,
            Duration::ZERO,
            Duration::ZERO,
        )
        .unwrap();
        let err = store.load::<Doc>().unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_failed_rename_releases_lock_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        // A non-empty directory at the target path makes the rename fail.
        let target = dir.path().join("save.json");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("occupant"), b"x").unwrap();
        let store = FileStore::new(&target);

        let err = store.save(&doc(&[("ditto", json!(132))])).unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }), "got {err:?}");

        assert_eq!(dir_names(&dir), vec!["save.json", "save.json.lock"]);
        FileLock::acquire(
            store.lock_path(),
            LockMode::Exclusive,
            Duration::ZERO,
            Duration::ZERO,
        )
        .expect("lock must be released after a failed save");
    }

    #[test]
    fn test_concurrent_saves_never_interleave() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("save.json");

        let candidates: Vec<Doc> = (0..4)
            .map(|writer| {
                let items = (0..200)
                    .map(|i| (format!("mon-{i}"), json!({"writer": writer, "filler": "x".repeat(64)})))
                    .collect();
                Doc { items }
            })
            .collect();

        let handles: Vec<_> = candidates
            .iter()
            .cloned()
            .map(|candidate| {
                let store = FileStore::new(&path)
                    .with_lock_timeout(Duration::from_secs(10), Duration::from_millis(1));
                thread::spawn(move || {
                    for _ in 0..10 {
                        store.save(&candidate).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let loaded: Doc = FileStore::new(&path).load().unwrap();
        assert!(candidates.contains(&loaded), "final file is a mixture");
    }
}

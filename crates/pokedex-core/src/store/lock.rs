use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::{trace, warn};

use super::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Any number of readers at once.
    Shared,
    /// One writer, no readers.
    Exclusive,
}

/// An advisory lock on a lock file, released when dropped.
///
/// The lock only constrains processes that also take it; the lock file itself
/// is never deleted so every process agrees on which inode it locks.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
    mode: LockMode,
}

impl FileLock {
    /// Poll for the lock every `retry_interval` until `timeout` has elapsed.
    ///
    /// At least one attempt is always made, so a zero timeout means "try once".
    pub fn acquire(
        path: &Path,
        mode: LockMode,
        timeout: Duration,
        retry_interval: Duration,
    ) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| StoreError::io(path, e))?;

        let start = Instant::now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            // Qualified calls: std::fs::File has inherent lock methods with
            // different signatures.
            let attempt = match mode {
                LockMode::Shared => FileExt::try_lock_shared(&file),
                LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
            };

            match attempt {
                Ok(()) => {
                    trace!(path = %path.display(), ?mode, attempts, "Lock acquired");
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                        mode,
                    });
                }
                Err(e) if is_contended(&e) => {}
                Err(e) => return Err(StoreError::io(path, e)),
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(StoreError::LockTimeout {
                    path: path.to_path_buf(),
                    waited: elapsed,
                });
            }
            thread::sleep(retry_interval.min(timeout - elapsed));
        }
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        match FileExt::unlock(&self.file) {
            Ok(()) => trace!(path = %self.path.display(), "Lock released"),
            // Closing the file descriptor releases the lock anyway.
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to unlock"),
        }
    }
}

fn is_contended(error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::WouldBlock
        || error.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SHORT: Duration = Duration::from_millis(50);
    const POLL: Duration = Duration::from_millis(5);

    #[test]
    fn test_exclusive_blocks_exclusive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("save.json.lock");

        let held = FileLock::acquire(&path, LockMode::Exclusive, SHORT, POLL).unwrap();
        let err = FileLock::acquire(&path, LockMode::Exclusive, SHORT, POLL).unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout { .. }));

        drop(held);
        FileLock::acquire(&path, LockMode::Exclusive, SHORT, POLL).unwrap();
    }

    #[test]
    fn test_shared_locks_coexist() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("save.json.lock");

        let first = FileLock::acquire(&path, LockMode::Shared, SHORT, POLL).unwrap();
        let second = FileLock::acquire(&path, LockMode::Shared, SHORT, POLL).unwrap();
        assert_eq!(first.mode(), LockMode::Shared);
        assert_eq!(second.mode(), LockMode::Shared);

        let err = FileLock::acquire(&path, LockMode::Exclusive, SHORT, POLL).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_zero_timeout_tries_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("save.json.lock");

        FileLock::acquire(&path, LockMode::Exclusive, Duration::ZERO, POLL).unwrap();
    }

    #[test]
    fn test_waiter_gets_lock_when_holder_releases() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("save.json.lock");

        let held = FileLock::acquire(&path, LockMode::Exclusive, SHORT, POLL).unwrap();
        let waiter_path = path.clone();
        let waiter = thread::spawn(move || {
            FileLock::acquire(&waiter_path, LockMode::Exclusive, Duration::from_secs(5), POLL)
                .map(|_| ())
        });

        thread::sleep(Duration::from_millis(30));
        drop(held);

        assert!(waiter.join().unwrap().is_ok());
    }
}

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::core::FxError;

/// Default bound on waiting for another writer.
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_millis(25);

static HELD: LazyLock<Mutex<HashSet<PathBuf>>> = LazyLock::new(|| Mutex::new(HashSet::new()));

/// Exclusive write access to one store file.
///
/// Held in two places: an in-process registry keyed by the absolute store path, and a
/// `<store>.lock` file carrying the owner's pid for other processes. Released on drop.
#[derive(Debug)]
pub struct StoreLock {
    key: PathBuf,
    lock_file: PathBuf,
}

impl StoreLock {
    /// Wait up to `wait` for the store, then hold it until dropped.
    ///
    /// Both the in-process registry and the lock file are polled against the same deadline.
    /// A lock file naming a process that no longer exists is removed and taken over; one whose
    /// owner cannot be checked counts as held.
    pub fn acquire(store_path: &Path, wait: Duration) -> Result<Self, FxError> {
        let key = std::path::absolute(store_path)?;
        let deadline = Instant::now() + wait;
        while !register(&key) {
            if Instant::now() >= deadline {
                warn!(path = %key.display(), "timed out waiting for in-process store lock");
                return Err(FxError::StoreLocked(key));
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        let lock_file = lock_path(&key);
        loop {
            match create_lock_file(&lock_file) {
                Ok(()) => {
                    debug!(lock = %lock_file.display(), "store lock acquired");
                    return Ok(Self { key, lock_file });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if reclaim_stale(&lock_file) {
                        continue;
                    }
                    if Instant::now() >= deadline {
                        unregister(&key);
                        warn!(lock = %lock_file.display(), "store appears locked");
                        return Err(FxError::StoreLocked(lock_file));
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    unregister(&key);
                    return Err(FxError::Io(e));
                }
            }
        }
    }

    pub fn lock_file(&self) -> &Path {
        &self.lock_file
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.lock_file)
            && e.kind() != ErrorKind::NotFound
        {
            warn!(lock = %self.lock_file.display(), error = %e, "failed to remove lock file");
        }
        unregister(&self.key);
    }
}

/// `rates.csv` -> `rates.csv.lock`.
pub fn lock_path(store_path: &Path) -> PathBuf {
    let mut name = store_path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".lock");
    store_path.with_file_name(name)
}

fn create_lock_file(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    if let Err(e) = file.write_all(std::process::id().to_string().as_bytes()) {
        drop(file);
        let _ = fs::remove_file(path);
        return Err(e);
    }
    Ok(())
}

/// Remove `path` if the pid inside it belongs to no running process.
fn reclaim_stale(path: &Path) -> bool {
    let Ok(text) = fs::read_to_string(path) else {
        return false;
    };
    let Ok(pid) = text.trim().parse::<u32>() else {
        return false;
    };
    if process_alive(pid) {
        return false;
    }
    match fs::remove_file(path) {
        Ok(()) => {
            warn!(lock = %path.display(), pid, "removed stale lock file");
            true
        }
        Err(e) if e.kind() == ErrorKind::NotFound => true,
        Err(_) => false,
    }
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

// No portable check; the operator removes leftovers by hand.
#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    true
}

fn register(key: &Path) -> bool {
    let mut held = match HELD.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    held.insert(key.to_path_buf())
}

fn unregister(key: &Path) {
    let mut held = match HELD.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    held.remove(key);
}

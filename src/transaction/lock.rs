// src/transaction/lock.rs

//! Process-wide execution lock
//!
//! At most one transaction may be IN_PROGRESS on a system. The executor holds
//! an `flock(LOCK_EX)` on the lock file from `start()` until the transaction
//! reaches a final state. A `.pid` file next to the lock names the holder.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// First retry delay; doubles on every attempt
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Exclusive execution lock, released on drop
#[derive(Debug)]
pub struct ExecutionLock {
    /// Kept open to hold the lock
    #[allow(dead_code)]
    file: File,
    path: PathBuf,
}

impl ExecutionLock {
    /// Acquire the lock, waiting at most `timeout`
    ///
    /// Retries with exponential backoff (100ms, 200ms, 400ms, ...), never
    /// sleeping past the deadline. Fails with [`Error::LockUnavailable`] once
    /// the deadline passes.
    pub fn acquire<P: AsRef<Path>>(path: P, timeout: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)?;

        let deadline = Instant::now() + timeout;
        let mut delay = INITIAL_BACKOFF;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match file.try_lock_exclusive() {
                Ok(()) => break,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || is_contended(&e) => {
                    let now = Instant::now();
                    if now >= deadline {
                        let holder = Self::holder_pid(&path)
                            .map(|pid| format!(" (held by pid {})", pid))
                            .unwrap_or_default();
                        return Err(Error::LockUnavailable(format!(
                            "{} still locked after {} attempts over {:?}{}",
                            path.display(),
                            attempts,
                            timeout,
                            holder
                        )));
                    }
                    let sleep = delay.min(deadline - now);
                    debug!("Execution lock busy, retrying in {:?}", sleep);
                    std::thread::sleep(sleep);
                    delay *= 2;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let lock = Self { file, path };
        lock.write_pid()?;
        info!("Acquired execution lock at {:?}", lock.path);
        Ok(lock)
    }

    /// Is the lock currently held by anyone?
    pub fn is_held<P: AsRef<Path>>(path: P) -> bool {
        let Ok(file) = File::open(path.as_ref()) else {
            return false;
        };
        match file.try_lock_exclusive() {
            Ok(()) => {
                let _ = FileExt::unlock(&file);
                false
            }
            Err(_) => true,
        }
    }

    /// PID recorded by the current holder, if any
    pub fn holder_pid<P: AsRef<Path>>(lock_path: P) -> Option<u32> {
        fs::read_to_string(lock_path.as_ref().with_extension("pid"))
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_pid(&self) -> Result<()> {
        fs::write(self.path.with_extension("pid"), std::process::id().to_string())?;
        Ok(())
    }
}

impl Drop for ExecutionLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(self.path.with_extension("pid"));
        let _ = FileExt::unlock(&self.file);
        info!("Released execution lock at {:?}", self.path);
    }
}

/// fs2 reports contention as the platform "lock" error on some targets
fn is_contended(e: &std::io::Error) -> bool {
    e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

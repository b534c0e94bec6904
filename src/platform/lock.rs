use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Default lock file, relative to the working directory
pub const DEFAULT_LOCK_FILE: &str = "./vault-monitor.lock";

/// Single-instance guard backed by a lock file
pub struct InstanceLock;

impl InstanceLock {
    /// Try to take the lock without blocking
    ///
    /// Returns `Ok(None)` when another process holds the lock. Errors are
    /// reserved for I/O faults such as a missing directory or denied access.
    pub fn try_acquire(path: &Path) -> Result<Option<LockHandle>> {
        let Some(mut file) = sys::try_lock(path)? else {
            return Ok(None);
        };

        // Informational only: lets an operator see who holds the lock
        if let Err(e) = write_pid(&mut file) {
            tracing::debug!("Could not record PID in {}: {}", path.display(), e);
        }

        tracing::debug!("Acquired instance lock: {}", path.display());

        Ok(Some(LockHandle {
            file: Some(file),
            path: path.to_path_buf(),
        }))
    }
}

fn write_pid(file: &mut File) -> std::io::Result<()> {
    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;
    file.sync_all()
}

/// Exclusive ownership of the lock, released on drop
#[derive(Debug)]
pub struct LockHandle {
    file: Option<File>,
    path: PathBuf,
}

impl LockHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock. Calling this more than once is a no-op.
    pub fn release(&mut self) {
        if let Some(file) = self.file.take() {
            sys::unlock(file, &self.path);
            tracing::debug!("Released instance lock: {}", self.path.display());
        }
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(unix)]
mod sys {
    use anyhow::{Context, Result};
    use std::fs::{File, OpenOptions};
    use std::io::ErrorKind;
    use std::os::unix::io::AsRawFd;
    use std::path::Path;

    pub fn try_lock(path: &Path) -> Result<Option<File>> {
        // Never truncate here: the current holder's PID lives in this file
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))?;

        // SAFETY: the descriptor is owned by `file` and stays open for the call
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == ErrorKind::WouldBlock {
                return Ok(None);
            }
            return Err(err)
                .with_context(|| format!("Failed to lock file: {}", path.display()));
        }

        Ok(Some(file))
    }

    pub fn unlock(file: File, path: &Path) {
        // SAFETY: the descriptor is owned by `file` and stays open for the call
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };
        if rc != 0 {
            // Closing the descriptor below drops the lock anyway
            tracing::warn!(
                "Failed to unlock {}: {}",
                path.display(),
                std::io::Error::last_os_error()
            );
        }
    }
}

#[cfg(not(unix))]
mod sys {
    use anyhow::{Context, Result};
    use std::fs::{File, OpenOptions};
    use std::io::ErrorKind;
    use std::path::Path;

    pub fn try_lock(path: &Path) -> Result<Option<File>> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to create lock file: {}", path.display())),
        }
    }

    pub fn unlock(file: File, path: &Path) {
        drop(file);
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!("Failed to remove lock file {}: {}", path.display(), e);
        }
    }
}

/// Describe who holds the lock, for the contention message
pub fn describe_holder(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(content) if !content.trim().is_empty() => format!("PID {}", content.trim()),
        _ => "unknown process".to_string(),
    }
}

/// Acquire the lock or fail with a contention error
pub fn acquire_or_bail(path: &Path) -> Result<LockHandle> {
    let handle = InstanceLock::try_acquire(path)
        .with_context(|| format!("Error obtaining lock {}", path.display()))?
        .with_context(|| {
            format!(
                "Unable to obtain lock {}, another instance is running ({})",
                path.display(),
                describe_holder(path)
            )
        })?;

    tracing::info!("Holding instance lock: {}", handle.path().display());
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use tempfile::tempdir;

    #[test]
    fn acquire_succeeds_on_fresh_path() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("agent.lock");

        let handle = InstanceLock::try_acquire(&path).unwrap();
        assert!(handle.is_some());
        assert_eq!(handle.unwrap().path(), path.as_path());
    }

    #[test]
    fn second_acquire_reports_contention_without_error() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("agent.lock");

        let _held = InstanceLock::try_acquire(&path).unwrap().unwrap();
        let second = InstanceLock::try_acquire(&path).unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn concurrent_acquire_has_exactly_one_winner() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("agent.lock");
        let barrier = Barrier::new(2);
        let (barrier, path) = (&barrier, path.as_path());

        let results: Vec<Result<Option<LockHandle>>> = std::thread::scope(|s| {
            let workers: Vec<_> = (0..2)
                .map(move |_| {
                    s.spawn(move || {
                        barrier.wait();
                        InstanceLock::try_acquire(path)
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert!(results.iter().all(|r| r.is_ok()));
        let winners = results
            .iter()
            .filter(|r| matches!(r, Ok(Some(_))))
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn release_is_idempotent_and_allows_reacquire() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("agent.lock");

        let mut handle = InstanceLock::try_acquire(&path).unwrap().unwrap();
        handle.release();
        handle.release();

        assert!(InstanceLock::try_acquire(&path).unwrap().is_some());
    }

    #[test]
    fn drop_releases_lock() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("agent.lock");

        {
            let _handle = InstanceLock::try_acquire(&path).unwrap().unwrap();
        }

        assert!(InstanceLock::try_acquire(&path).unwrap().is_some());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("missing").join("agent.lock");

        assert!(InstanceLock::try_acquire(&path).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn lock_file_records_holder_pid() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("agent.lock");

        let _handle = InstanceLock::try_acquire(&path).unwrap().unwrap();

        let expected = format!("PID {}", std::process::id());
        assert_eq!(describe_holder(&path), expected);
    }

    #[test]
    fn acquire_or_bail_returns_handle_for_path() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("agent.lock");

        let handle = acquire_or_bail(&path).unwrap();
        assert_eq!(handle.path(), path.as_path());
    }

    #[test]
    fn acquire_or_bail_fails_on_contention() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("agent.lock");

        let _held = acquire_or_bail(&path).unwrap();
        let err = acquire_or_bail(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("another instance is running"));
    }
}

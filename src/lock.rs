//! Cross-process mutual exclusion per target file.
//!
//! Two builds combining into the same target would otherwise race on the
//! read-compare-write cycle. The lock is an advisory `fs4` lock on a file in
//! the system temp directory, named after the resource id, so it works for
//! processes that know nothing about each other beyond that id.

use crate::config::LOCK_POLL_INTERVAL;
use crate::error::{CombineError, Result};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const LOCK_FILE_PREFIX: &str = "xaml-combine_";

/// Lock file used for `resource_id`. Characters that are not safe in a file
/// name are replaced with `_`.
pub fn lock_path(resource_id: &str) -> PathBuf {
    let name: String = resource_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    std::env::temp_dir().join(format!("{}{}.lock", LOCK_FILE_PREFIX, name))
}

/// Runs `action` while holding the exclusive lock for `resource_id`.
///
/// Waits up to `timeout` for another holder to release it and fails with
/// [`CombineError::LockTimeout`] otherwise. The lock is released whether
/// `action` succeeds or not.
pub fn with_exclusive_access<T>(
    resource_id: &str,
    timeout: Duration,
    action: impl FnOnce() -> Result<T>,
) -> Result<T> {
    let path = lock_path(resource_id);
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&path)
        .map_err(|source| CombineError::Lock {
            path: path.clone(),
            source,
        })?;

    acquire(&file, resource_id, timeout)?;
    debug!(resource = resource_id, "Lock acquired");

    let result = action();

    if let Err(e) = FileExt::unlock(&file) {
        warn!(resource = resource_id, error = %e, "Failed to release lock");
    }
    result
}

fn acquire(file: &File, resource_id: &str, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(()),
            Err(e) => {
                if Instant::now() >= deadline {
                    debug!(resource = resource_id, error = %e, "Giving up on lock");
                    return Err(CombineError::LockTimeout {
                        resource: resource_id.to_string(),
                        timeout,
                    });
                }
                thread::sleep(LOCK_POLL_INTERVAL);
            }
        }
    }
}

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::warn;

use super::{io_err, StoreError, StoreResult};

/// Exclusive cross-process lease backed by a lock file.
///
/// Held only around read-merge-write; the file is removed on drop. Each
/// holder writes a unique token into the file so a stale lease is only
/// broken if it is still the one that was judged stale.
#[derive(Debug)]
pub struct FileLease {
    path: PathBuf,
}

impl FileLease {
    pub fn acquire(path: &Path, timeout: Duration, stale_after: Duration) -> StoreResult<Self> {
        let started = Instant::now();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        loop {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
            {
                Ok(mut file) => {
                    let lease = Self {
                        path: path.to_path_buf(),
                    };
                    file.write_all(lease_token().as_bytes())
                        .and_then(|_| file.sync_all())
                        .map_err(io_err(path))?;
                    return Ok(lease);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if is_stale(path, stale_after) {
                        if let Ok(observed) = std::fs::read(path) {
                            if reclaim(path, &observed) {
                                warn!(target: "storage", lease = %path.display(), "broke stale lease");
                                continue;
                            }
                        }
                    }
                    if started.elapsed() >= timeout {
                        return Err(StoreError::LeaseTimeout(path.to_path_buf()));
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(e) => return Err(io_err(path)(e)),
            }
        }
    }
}

fn lease_token() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("{}-{nanos}", std::process::id())
}

/// Remove the lease at `path` if it still carries `observed`.
///
/// The file is first renamed aside, so only one waiter can take it. If the
/// renamed file turns out to be a newer lease it is linked back in place.
fn reclaim(path: &Path, observed: &[u8]) -> bool {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".stale-{}", lease_token()));
    let aside = path.with_file_name(name);

    if std::fs::rename(path, &aside).is_err() {
        return false;
    }
    let same = std::fs::read(&aside).is_ok_and(|found| found == observed);
    if !same && std::fs::hard_link(&aside, path).is_err() {
        warn!(target: "storage", lease = %path.display(), "could not restore a live lease");
    }
    let _ = std::fs::remove_file(&aside);
    same
}

fn is_stale(path: &Path, stale_after: Duration) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age > stale_after)
}

impl Drop for FileLease {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

/// Cross-process mutual exclusion for the driver-assignment step. Creating a
/// directory is the atomic conditional-create primitive: it either succeeds
/// (we hold the lock) or fails because another process already holds it.
/// Contention is a normal outcome, not an error.
pub struct AssignGuard {
    path: PathBuf,
}

impl AssignGuard {
    /// `None` means another process is already assigning this order.
    pub fn acquire(locks_dir: &Path, order_id: u64) -> Option<Self> {
        if let Err(err) = fs::create_dir_all(locks_dir) {
            warn!(dir = %locks_dir.display(), error = %err, "cannot prepare locks dir");
            return None;
        }
        let path = locks_dir.join(format!("assign-{order_id}"));
        match fs::create_dir(&path) {
            Ok(()) => Some(Self { path }),
            Err(_) => None,
        }
    }
}

impl Drop for AssignGuard {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_dir(&self.path) {
            warn!(path = %self.path.display(), error = %err, "failed to release assign lock");
        }
    }
}

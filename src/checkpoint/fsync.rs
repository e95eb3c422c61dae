//! Low-level fsync operations for checkpoint durability.
//!
//! On POSIX systems, renaming a file updates the directory entry, and that
//! entry may not survive a power loss unless the directory itself is
//! synced. Checkpoint writes therefore fsync both the temp file and its
//! parent directory.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

/// Syncs a file's contents and metadata to disk (`fsync(2)`).
pub fn fsync_file(file: &File) -> io::Result<()> {
    file.sync_all()
}

/// Syncs a directory to disk, making entries created or renamed inside it
/// durable. Call with the checkpoint's parent directory after the rename.
pub fn fsync_dir(dir_path: &Path) -> io::Result<()> {
    let dir = OpenOptions::new().read(true).open(dir_path)?;
    dir.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn fsync_file_works() {
        let dir = tempdir().unwrap();
        let mut file = File::create(dir.path().join("checkpoint.tmp")).unwrap();
        file.write_all(b"{}").unwrap();

        fsync_file(&file).unwrap();
    }

    #[test]
    fn fsync_dir_works() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("checkpoint")).unwrap();

        fsync_dir(dir.path()).unwrap();
    }

    #[test]
    fn fsync_dir_fails_on_nonexistent() {
        assert!(fsync_dir(Path::new("/nonexistent/checkpoint/dir")).is_err());
    }
}

//! Destinations for saved bytes.
//!
//! Saves go to a temporary file next to the target and are persisted over it
//! only once every block has been written, so a failed or cancelled save never
//! truncates the file already on disk.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

/// A writable destination that only takes effect when committed.
pub trait SaveSink: Write + Send {
    /// Make the written bytes the new content of the destination.
    fn commit(self: Box<Self>) -> io::Result<()>;
}

/// Creates the sink for a destination path. Runs on the controlling thread.
pub type SinkOpener = Box<dyn Fn(&Path) -> io::Result<Box<dyn SaveSink>>>;

/// Temp file in the destination directory, renamed over the target on commit.
pub struct AtomicFile {
    temp: NamedTempFile,
    dest: PathBuf,
}

impl AtomicFile {
    pub fn create(dest: &Path) -> io::Result<Self> {
        let parent = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let temp = NamedTempFile::new_in(parent)?;
        // Keep the permissions of the file being replaced
        if let Ok(metadata) = fs::metadata(dest) {
            fs::set_permissions(temp.path(), metadata.permissions())?;
        }
        Ok(Self {
            temp,
            dest: dest.to_path_buf(),
        })
    }
}

impl Write for AtomicFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.temp.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.temp.flush()
    }
}

impl SaveSink for AtomicFile {
    fn commit(self: Box<Self>) -> io::Result<()> {
        let AtomicFile { mut temp, dest } = *self;
        temp.flush()?;
        // sync_all() so the data is on disk before the rename makes it visible
        temp.as_file().sync_all()?;
        temp.persist(&dest).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Default opener used by a session.
pub fn open_atomic(dest: &Path) -> io::Result<Box<dyn SaveSink>> {
    Ok(Box::new(AtomicFile::create(dest)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_replaces_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.txt");
        fs::write(&target, "old").unwrap();

        let mut sink = open_atomic(&target).unwrap();
        sink.write_all(b"new contents").unwrap();
        // Not visible until committed
        assert_eq!(fs::read_to_string(&target).unwrap(), "old");
        sink.commit().unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "new contents");
    }

    #[test]
    fn test_dropped_sink_leaves_target_alone() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("keep.txt");
        fs::write(&target, "original").unwrap();
        {
            let mut sink = open_atomic(&target).unwrap();
            sink.write_all(b"partial").unwrap();
        }
        assert_eq!(fs::read_to_string(&target).unwrap(), "original");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}

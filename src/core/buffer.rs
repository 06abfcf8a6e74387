//! Buffer: one open document slot.
//!
//! Holds the document, its file metadata and the lifecycle state that decides
//! what may be done with it. At most one worker is bound to a buffer at a time.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::core::document::Document;
use crate::core::eol::IndentStyle;
use crate::core::error::{FileError, Result};
use crate::core::id::{BufferId, WorkerId};
use crate::core::worker::FileWorker;

/// Where a buffer is in its open/load lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifeState {
    /// Nothing loaded, or a load failed or was cancelled.
    #[default]
    Empty,
    /// Fully usable.
    Opened,
    /// A worker is filling a fresh document.
    Reading,
    /// The worker finished; post-load setup has not run yet.
    ReadAll,
}

impl LifeState {
    /// Moves allowed by the lifecycle. Starting a load again from `Opened` or
    /// `Empty` is an explicit re-open.
    pub fn can_become(self, next: LifeState) -> bool {
        use LifeState::*;
        matches!(
            (self, next),
            (Empty, Opened)
                | (Empty, Reading)
                | (Opened, Opened)
                | (Opened, Reading)
                | (Reading, ReadAll)
                | (Reading, Empty)
                | (ReadAll, Opened)
                | (ReadAll, Empty)
        )
    }
}

impl fmt::Display for LifeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifeState::Empty => "empty",
            LifeState::Opened => "opened",
            LifeState::Reading => "reading",
            LifeState::ReadAll => "readAll",
        };
        f.write_str(name)
    }
}

/// Modification time of `path` on disk, if it exists.
pub fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[derive(Debug)]
pub struct Buffer {
    id: BufferId,
    pub path: Option<PathBuf>,
    pub document: Document,
    life_state: LifeState,
    /// Read-only by user choice, as opposed to while a worker runs
    pub read_only: bool,
    /// The last save attempt failed
    pub failed_save: bool,
    /// Dirty regardless of the document, e.g. after the file was deleted
    pub forced_dirty: bool,
    /// Hidden buffers are closed but still finishing a save
    pub visible: bool,
    pub file_mod_time: Option<SystemTime>,
    /// On-disk time already asked about, so the user is asked only once per change
    pub file_mod_last_ask: Option<SystemTime>,
    pub indent: Option<IndentStyle>,
    /// Byte offset of the caret
    pub caret: usize,
    worker: Option<FileWorker>,
}

impl Buffer {
    pub fn new(id: BufferId, path: Option<PathBuf>) -> Self {
        Self {
            id,
            path,
            document: Document::new(),
            life_state: LifeState::Empty,
            read_only: false,
            failed_save: false,
            forced_dirty: false,
            visible: true,
            file_mod_time: None,
            file_mod_last_ask: None,
            indent: None,
            caret: 0,
            worker: None,
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn life_state(&self) -> LifeState {
        self.life_state
    }

    pub fn set_life_state(&mut self, next: LifeState) {
        if !self.life_state.can_become(next) {
            warn!(target: "io", buffer = %self.id, from = %self.life_state, to = %next, "unexpected lifecycle transition");
        }
        debug!(target: "io", buffer = %self.id, from = %self.life_state, to = %next, "lifecycle");
        self.life_state = next;
    }

    /// Path for messages; untitled buffers get a placeholder.
    pub fn display_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| PathBuf::from("(Untitled)"))
    }

    pub fn is_untitled(&self) -> bool {
        self.path.is_none()
    }

    pub fn is_dirty(&self) -> bool {
        self.forced_dirty || self.document.is_modified()
    }

    /// Only a fully opened buffer has content worth writing.
    pub fn should_not_save(&self) -> bool {
        self.life_state != LifeState::Opened
    }

    /// Refuses edits: by choice, or while a worker owns the content.
    pub fn is_read_only(&self) -> bool {
        self.read_only || self.worker.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.worker.as_ref().is_some_and(FileWorker::is_loading)
    }

    pub fn is_storing(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_loading())
    }

    pub fn worker(&self) -> Option<&FileWorker> {
        self.worker.as_ref()
    }

    pub fn worker_id(&self) -> Option<WorkerId> {
        self.worker.as_ref().map(FileWorker::id)
    }

    /// Bind a freshly started worker. A buffer never has two.
    pub fn bind_worker(&mut self, worker: FileWorker) -> Result<()> {
        if self.worker.is_some() {
            return Err(FileError::AlreadyInFlight(self.display_path()));
        }
        self.worker = Some(worker);
        Ok(())
    }

    pub fn take_worker(&mut self) -> Option<FileWorker> {
        self.worker.take()
    }

    /// Remember the on-disk modification time as the one in sync with the document.
    pub fn set_time_from_file(&mut self) {
        self.file_mod_time = self.path.as_deref().and_then(modified_time);
        self.file_mod_last_ask = self.file_mod_time;
        self.forced_dirty = false;
    }

    /// Keep the caret inside the document and on a character boundary.
    pub fn clamp_caret(&mut self) {
        self.caret = self.document.floor_boundary(self.caret);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_buffer() {
        let buffer = Buffer::new(BufferId(1), None);
        assert_eq!(buffer.life_state(), LifeState::Empty);
        assert!(buffer.is_untitled());
        assert!(!buffer.is_dirty());
        assert!(buffer.should_not_save());
        assert!(!buffer.is_read_only());
        assert_eq!(buffer.display_path(), PathBuf::from("(Untitled)"));
    }

    #[test]
    fn test_lifecycle_moves() {
        assert!(LifeState::Reading.can_become(LifeState::ReadAll));
        assert!(LifeState::ReadAll.can_become(LifeState::Opened));
        assert!(LifeState::Reading.can_become(LifeState::Empty));
        // a background load never skips readAll
        assert!(!LifeState::Reading.can_become(LifeState::Opened));
        assert!(!LifeState::Opened.can_become(LifeState::Empty));
        assert!(!LifeState::Opened.can_become(LifeState::ReadAll));
    }

    #[test]
    fn test_forced_dirty() {
        let mut buffer = Buffer::new(BufferId(1), None);
        buffer.set_life_state(LifeState::Opened);
        buffer.forced_dirty = true;
        assert!(buffer.is_dirty());
        buffer.set_time_from_file();
        assert!(!buffer.is_dirty());
    }

    #[test]
    fn test_set_time_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "a").unwrap();
        let mut buffer = Buffer::new(BufferId(2), Some(path.clone()));
        buffer.set_time_from_file();
        assert!(buffer.file_mod_time.is_some());
        assert_eq!(buffer.file_mod_time, buffer.file_mod_last_ask);
        assert_eq!(buffer.file_mod_time, modified_time(&path));
    }

    #[test]
    fn test_caret_clamped() {
        let mut buffer = Buffer::new(BufferId(1), None);
        buffer.document = Document::from_str("a\u{e9}");
        buffer.caret = 2;
        buffer.clamp_caret();
        assert_eq!(buffer.caret, 1);
        buffer.caret = 50;
        buffer.clamp_caret();
        assert_eq!(buffer.caret, 3);
    }
}

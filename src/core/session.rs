//! Session: the document I/O engine's root state.
//!
//! Owns every buffer, the settings they are loaded and saved with, and the
//! receiving end of the channel workers report on. All buffer state is
//! touched from the thread that owns the session; workers only ever see the
//! file, a snapshot or a fresh document, and their own status flags.
//!
//! Completion handling lives in `dispatcher`, reload and revert in `reload`.

use std::fs::File;
use std::io::Read;
use std::ops::BitOr;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};

use tracing::{debug, info};

use crate::config::IoSettings;
use crate::core::buffer::{Buffer, LifeState, modified_time};
use crate::core::buffers::{BackgroundActivities, BufferSet};
use crate::core::document::{Document, Loader};
use crate::core::eol::{self, DISCOVERY_LIMIT};
use crate::core::error::{FileError, Result};
use crate::core::host::{Extender, Frontend, Headless, NoExtender, Question};
use crate::core::id::{BufferId, WorkerId};
use crate::core::storage::{self, SinkOpener};
use crate::core::worker::{
    self, Completion, FileWorker, Job, Pacing, StreamError, WorkerKind,
};

/// Hard ceiling on a file's size, whatever the configuration says.
pub const HARD_SIZE_LIMIT: u64 = (isize::MAX as u64) - 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenFlags(u8);

impl OpenFlags {
    pub const NONE: Self = Self(0);
    /// Re-read the file even when a buffer already holds it.
    pub const FORCE_LOAD: Self = Self(1);
    /// Load on the controlling thread whatever the file size.
    pub const SYNCHRONOUS: Self = Self(1 << 1);
    /// Replace the text as one undoable action instead of dropping history.
    pub const PRESERVE_UNDO: Self = Self(1 << 2);
    /// Never ask the user anything; questions count as declined.
    pub const QUIET: Self = Self(1 << 3);
    /// Skip the soft size limit.
    pub const ALLOW_LARGE: Self = Self(1 << 4);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for OpenFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SaveFlags(u8);

impl SaveFlags {
    pub const NONE: Self = Self(0);
    /// Write on the controlling thread whatever the document size.
    pub const SYNCHRONOUS: Self = Self(1);
    /// Count a background save in progress reports.
    pub const PROGRESS_VISIBLE: Self = Self(1 << 1);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for SaveFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// What a successful save call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    /// Written and committed before returning.
    Saved,
    /// Handed to a worker; the outcome arrives through [`Session::poll`].
    Started,
}

/// `None` thresholds send every non-empty file to a worker.
fn exceeds(size: u64, threshold: Option<u64>) -> bool {
    match threshold {
        Some(limit) => size > limit,
        None => size > 0,
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|source| FileError::OpenFailure {
        path: path.to_path_buf(),
        source,
    })
}

pub struct Session {
    pub(crate) settings: IoSettings,
    pub(crate) buffers: BufferSet,
    pub(crate) frontend: Box<dyn Frontend>,
    pub(crate) extender: Box<dyn Extender>,
    open_sink: SinkOpener,
    completions: Sender<Completion>,
    pub(crate) inbox: Receiver<Completion>,
    next_worker_id: u64,
}

impl Session {
    pub fn new(settings: IoSettings) -> Self {
        let (completions, inbox) = mpsc::channel();
        Self {
            settings,
            buffers: BufferSet::new(),
            frontend: Box::new(Headless),
            extender: Box::new(NoExtender),
            open_sink: Box::new(storage::open_atomic),
            completions,
            inbox,
            next_worker_id: 1,
        }
    }

    pub fn with_frontend(mut self, frontend: Box<dyn Frontend>) -> Self {
        self.frontend = frontend;
        self
    }

    pub fn with_extender(mut self, extender: Box<dyn Extender>) -> Self {
        self.extender = extender;
        self
    }

    /// Replace how save destinations are created.
    pub fn with_sink_opener(mut self, opener: SinkOpener) -> Self {
        self.open_sink = opener;
        self
    }

    pub fn settings(&self) -> &IoSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut IoSettings {
        &mut self.settings
    }

    pub fn buffers(&self) -> &BufferSet {
        &self.buffers
    }

    pub fn buffer(&self, id: BufferId) -> Option<&Buffer> {
        self.buffers.get(id)
    }

    pub fn current(&self) -> Option<BufferId> {
        self.buffers.current()
    }

    /// Full text of a buffer.
    pub fn text(&self, id: BufferId) -> Option<String> {
        self.buffers.get(id).map(|b| b.document.text())
    }

    pub fn background_activities(&self) -> BackgroundActivities {
        self.buffers.background_activities()
    }

    fn job(&mut self, buffer: BufferId, path: &Path) -> Job {
        let worker = WorkerId(self.next_worker_id);
        self.next_worker_id += 1;
        Job {
            worker,
            buffer,
            path: path.to_path_buf(),
            pacing: Pacing::from_settings(&self.settings),
            completions: self.completions.clone(),
        }
    }

    // ==================== Opening ====================

    /// Open `path`, or bring forward the buffer that already holds it.
    ///
    /// Large files load on a worker: the buffer is returned read-only in the
    /// `Reading` state and becomes usable once [`Session::poll`] sees the load
    /// finish.
    pub fn open(&mut self, path: impl AsRef<Path>, flags: OpenFlags) -> Result<BufferId> {
        let path = absolute(path.as_ref())?;
        self.open_path(&path, flags, true)
    }

    pub(crate) fn open_path(
        &mut self,
        path: &Path,
        flags: OpenFlags,
        make_current: bool,
    ) -> Result<BufferId> {
        if path.is_dir() {
            return Err(FileError::IsDirectory(path.to_path_buf()));
        }

        let existing = self.buffers.by_path(path, None);
        if let Some(id) = existing {
            // A refused request leaves the buffer exactly as it was
            let busy = self.buffers.get(id).is_some_and(|b| b.worker().is_some());
            if flags.contains(OpenFlags::FORCE_LOAD) && busy {
                return Err(FileError::AlreadyInFlight(path.to_path_buf()));
            }
            if let Some(buffer) = self.buffers.get_mut(id) {
                buffer.visible = true;
            }
            if make_current {
                self.buffers.set_current(id);
            }
            if !flags.contains(OpenFlags::FORCE_LOAD) {
                return Ok(id);
            }
        }

        let open_failure = |source| FileError::OpenFailure {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(open_failure)?;
        let size = file.metadata().map_err(open_failure)?.len();
        self.check_size(path, size, flags)?;

        let id = match existing {
            Some(id) => id,
            None => self.buffers.add(Some(path)),
        };
        if make_current {
            self.buffers.set_current(id);
        }

        let background = !flags.contains(OpenFlags::SYNCHRONOUS)
            && !flags.contains(OpenFlags::PRESERVE_UNDO)
            && exceeds(size, self.settings.background_open_size);
        let result = if background {
            self.load_in_background(id, path, file, size)
        } else {
            self.load_now(id, file, size, flags)
        };
        if let Err(e) = result {
            if existing.is_none() {
                self.buffers.remove(id);
            }
            return Err(e);
        }
        Ok(id)
    }

    fn check_size(&mut self, path: &Path, size: u64, flags: OpenFlags) -> Result<()> {
        if size >= HARD_SIZE_LIMIT {
            return Err(FileError::SizeExceeded {
                path: path.to_path_buf(),
                size,
                limit: HARD_SIZE_LIMIT,
                overridable: false,
            });
        }
        if let Some(limit) = self.settings.max_file_size {
            if size > limit && !flags.contains(OpenFlags::ALLOW_LARGE) {
                let question = Question::LargeFile {
                    path: path.to_path_buf(),
                    size,
                    limit,
                };
                if flags.contains(OpenFlags::QUIET) || !self.frontend.confirm(&question) {
                    return Err(FileError::SizeExceeded {
                        path: path.to_path_buf(),
                        size,
                        limit,
                        overridable: true,
                    });
                }
            }
        }
        Ok(())
    }

    fn load_in_background(&mut self, id: BufferId, path: &Path, file: File, size: u64) -> Result<()> {
        if self.buffers.get(id).is_some_and(|b| b.worker().is_some()) {
            return Err(FileError::AlreadyInFlight(path.to_path_buf()));
        }
        let job = self.job(id, path);
        let worker_id = job.worker;
        let worker = FileWorker::load(job, file, size)?;

        let buffer = self.buffers.get_mut(id).ok_or(FileError::UnknownBuffer(id))?;
        buffer.document = Document::allocate(usize::try_from(size).unwrap_or(0));
        buffer.indent = None;
        buffer.set_time_from_file();
        buffer.set_life_state(LifeState::Reading);
        buffer.bind_worker(worker)?;
        info!(target: "io", buffer = %id, worker = %worker_id, path = %path.display(), size, "loading in background");
        Ok(())
    }

    /// Read `reader` to the end on this thread and install the result.
    ///
    /// The text is read aside first, so a read that fails partway leaves the
    /// buffer's current text and history untouched.
    fn load_now<R: Read>(
        &mut self,
        id: BufferId,
        reader: R,
        size: u64,
        flags: OpenFlags,
    ) -> Result<()> {
        let pacing = Pacing::from_settings(&self.settings);
        let buffer = self.buffers.get(id).ok_or(FileError::UnknownBuffer(id))?;
        if buffer.worker().is_some() {
            return Err(FileError::AlreadyInFlight(buffer.display_path()));
        }
        let path = buffer.display_path();

        let mut loader = Loader::new(usize::try_from(size).unwrap_or(0));
        let encoding = worker::read_stream(reader, &mut loader, pacing, None)
            .map_err(|e| e.into_file_error(&path, WorkerKind::Load))?;

        let buffer = self.buffers.get_mut(id).ok_or(FileError::UnknownBuffer(id))?;
        if flags.contains(OpenFlags::PRESERVE_UNDO) {
            let text = loader.into_document().text();
            let doc = &mut buffer.document;
            doc.begin_undo_action();
            doc.clear_all();
            doc.insert(0, &text);
            doc.end_undo_action();
        } else {
            buffer.document = loader.into_document();
        }
        buffer.document.set_encoding(encoding);
        buffer.set_time_from_file();
        debug!(target: "io", buffer = %id, path = %path.display(), encoding = encoding.name(), "loaded synchronously");
        self.complete_open(id);
        Ok(())
    }

    /// Post-load setup: line-end and indent discovery, save point, caret.
    /// Runs exactly once per load, moving the buffer to `Opened`.
    pub(crate) fn complete_open(&mut self, id: BufferId) {
        let settings = &self.settings;
        let Some(buffer) = self.buffers.get_mut(id) else {
            return;
        };
        buffer.read_only |= settings.read_only;

        let doc = &mut buffer.document;
        doc.set_eol_mode(settings.eol_mode);
        if settings.eol_auto {
            let counts = eol::count_line_ends(doc.rope(), DISCOVERY_LIMIT);
            let mode = eol::discover_eol(counts, doc.eol_mode());
            doc.set_eol_mode(mode);
        }
        buffer.indent = if settings.indent_auto {
            eol::discover_indent(buffer.document.rope(), DISCOVERY_LIMIT, settings.tab_size)
        } else {
            None
        };
        buffer.document.set_save_point();
        buffer.failed_save = false;
        buffer.clamp_caret();
        buffer.set_life_state(LifeState::Opened);
        debug!(
            target: "io",
            buffer = %id,
            eol = %buffer.document.eol_mode(),
            indent = ?buffer.indent,
            "open completed"
        );

        if let Some(path) = buffer.path.clone() {
            self.extender.on_open(&path);
        }
    }

    /// Read everything from `reader` into a new untitled buffer.
    pub fn open_from_reader<R: Read>(&mut self, reader: R) -> Result<BufferId> {
        let id = self.buffers.add(None);
        if let Err(e) = self.load_now(id, reader, 0, OpenFlags::NONE) {
            self.buffers.remove(id);
            return Err(e);
        }
        self.buffers.set_current(id);
        Ok(id)
    }

    /// New empty untitled buffer, made current.
    pub fn new_buffer(&mut self) -> BufferId {
        let id = self.buffers.add(None);
        self.buffers.set_current(id);
        self.complete_open(id);
        id
    }

    /// Make `id` current. A buffer whose background load finished while it
    /// was not current completes its open here.
    pub fn switch_to(&mut self, id: BufferId) -> Result<()> {
        let buffer = self.buffers.get(id).ok_or(FileError::UnknownBuffer(id))?;
        if !buffer.visible {
            return Err(FileError::UnknownBuffer(id));
        }
        let life_state = buffer.life_state();
        self.buffers.set_current(id);
        if life_state == LifeState::ReadAll {
            self.complete_open(id);
        }
        Ok(())
    }

    // ==================== Editing ====================

    fn editable(&mut self, id: BufferId) -> Result<&mut Buffer> {
        let buffer = self.buffers.get_mut(id).ok_or(FileError::UnknownBuffer(id))?;
        if buffer.is_read_only() || buffer.life_state() != LifeState::Opened {
            return Err(FileError::ReadOnly(buffer.display_path()));
        }
        Ok(buffer)
    }

    pub fn insert(&mut self, id: BufferId, pos: usize, text: &str) -> Result<()> {
        let buffer = self.editable(id)?;
        buffer.document.insert(pos, text);
        Ok(())
    }

    pub fn delete(&mut self, id: BufferId, pos: usize, len: usize) -> Result<()> {
        let buffer = self.editable(id)?;
        buffer.document.delete(pos, len);
        Ok(())
    }

    pub fn undo(&mut self, id: BufferId) -> Result<bool> {
        let buffer = self.editable(id)?;
        Ok(buffer.document.undo())
    }

    // ==================== Saving ====================

    pub fn save(&mut self, id: BufferId, flags: SaveFlags) -> Result<SaveStatus> {
        let buffer = self.buffers.get(id).ok_or(FileError::UnknownBuffer(id))?;
        let path = buffer.path.clone().ok_or(FileError::Untitled)?;
        self.save_to(id, &path, flags)
    }

    /// Give the buffer a new file name and save it there.
    pub fn save_as(
        &mut self,
        id: BufferId,
        path: impl AsRef<Path>,
        flags: SaveFlags,
    ) -> Result<SaveStatus> {
        let path = absolute(path.as_ref())?;
        if self.buffers.by_path(&path, Some(id)).is_some() {
            return Err(FileError::AlreadyOpen(path));
        }
        let buffer = self.buffers.get_mut(id).ok_or(FileError::UnknownBuffer(id))?;
        if buffer.worker().is_some() {
            return Err(FileError::AlreadyInFlight(buffer.display_path()));
        }
        if buffer.should_not_save() {
            return Err(FileError::StillLoading(buffer.display_path()));
        }
        buffer.path = Some(path.clone());
        self.save_to(id, &path, flags)
    }

    /// Rename the buffer without writing anything.
    pub fn set_path(&mut self, id: BufferId, path: impl AsRef<Path>) -> Result<()> {
        let path = absolute(path.as_ref())?;
        if self.buffers.by_path(&path, Some(id)).is_some() {
            return Err(FileError::AlreadyOpen(path));
        }
        let buffer = self.buffers.get_mut(id).ok_or(FileError::UnknownBuffer(id))?;
        buffer.path = Some(path);
        buffer.file_mod_time = None;
        buffer.file_mod_last_ask = None;
        Ok(())
    }

    fn save_to(&mut self, id: BufferId, path: &Path, flags: SaveFlags) -> Result<SaveStatus> {
        let buffer = self.buffers.get(id).ok_or(FileError::UnknownBuffer(id))?;
        if buffer.is_loading() || buffer.should_not_save() {
            return Err(FileError::StillLoading(path.to_path_buf()));
        }
        if buffer.worker().is_some() {
            return Err(FileError::AlreadyInFlight(path.to_path_buf()));
        }
        if self.settings.save_check_modified_time && buffer.path.as_deref() == Some(path) {
            let on_disk = modified_time(path);
            if on_disk.is_some() && buffer.file_mod_time.is_some() && on_disk != buffer.file_mod_time {
                let question = Question::Overwrite {
                    path: path.to_path_buf(),
                };
                if !self.frontend.confirm(&question) {
                    return Err(FileError::Cancelled(path.to_path_buf()));
                }
            }
        }

        self.prepare_for_save(id, path)?;

        let size = self.buffers.get(id).map_or(0, |b| b.document.len() as u64);
        let background = !flags.contains(SaveFlags::SYNCHRONOUS)
            && self.buffers.visible_count() > 1
            && exceeds(size, self.settings.background_save_size);
        let job = background.then(|| self.job(id, path));
        let pacing = Pacing::from_settings(&self.settings);

        let buffer = self.buffers.get_mut(id).ok_or(FileError::UnknownBuffer(id))?;
        let sink = match (self.open_sink)(path) {
            Ok(sink) => sink,
            Err(source) => {
                buffer.failed_save = true;
                return Err(FileError::OpenFailure {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let snapshot = buffer.document.snapshot();
        let version = buffer.document.version();
        let encoding = buffer.document.encoding();
        buffer.failed_save = false;

        if let Some(job) = job {
            let worker_id = job.worker;
            let progress_visible = flags.contains(SaveFlags::PROGRESS_VISIBLE);
            let worker = FileWorker::store(job, snapshot, version, encoding, sink, progress_visible)?;
            buffer.bind_worker(worker)?;
            info!(target: "io", buffer = %id, worker = %worker_id, path = %path.display(), size, "saving in background");
            return Ok(SaveStatus::Started);
        }

        let mut sink = sink;
        let result = worker::write_rope(&snapshot, encoding, &mut sink, pacing, None)
            .and_then(|written| sink.commit().map(|()| written).map_err(StreamError::Io));
        match result {
            Ok(written) => {
                debug!(target: "io", buffer = %id, path = %path.display(), written, "saved synchronously");
                self.finish_save(id, path, version);
                Ok(SaveStatus::Saved)
            }
            Err(e) => {
                buffer.failed_save = true;
                Err(e.into_file_error(path, WorkerKind::Store))
            }
        }
    }

    /// Clean-ups applied to the text before it is written, then the
    /// extender's chance to stop the save.
    fn prepare_for_save(&mut self, id: BufferId, path: &Path) -> Result<()> {
        let settings = &self.settings;
        let buffer = self.buffers.get_mut(id).ok_or(FileError::UnknownBuffer(id))?;
        if !buffer.read_only {
            let doc = &mut buffer.document;
            let eol_mode = doc.eol_mode();
            doc.begin_undo_action();
            if settings.strip_trailing_spaces {
                let text = eol::strip_trailing_spaces(&doc.text());
                doc.patch(&text);
            }
            if settings.ensure_final_line_end {
                let text = eol::ensure_final_line_end(&doc.text(), eol_mode);
                doc.patch(&text);
            }
            if settings.ensure_consistent_line_ends {
                let text = eol::convert_eols(&doc.text(), eol_mode);
                doc.patch(&text);
            }
            doc.end_undo_action();
            buffer.clamp_caret();
        }
        if self.extender.on_before_save(path) {
            info!(target: "io", buffer = %id, path = %path.display(), "save vetoed");
            return Err(FileError::Vetoed(path.to_path_buf()));
        }
        Ok(())
    }

    /// Bookkeeping after a successful write of document `version` to `path`.
    /// The buffer is only marked clean if it still belongs to `path`.
    pub(crate) fn finish_save(&mut self, id: BufferId, path: &Path, version: u64) {
        if let Some(buffer) = self.buffers.get_mut(id) {
            buffer.failed_save = false;
            if buffer.path.as_deref() == Some(path) {
                buffer.document.set_save_point_at(version);
                buffer.set_time_from_file();
            }
        }
        info!(target: "io", buffer = %id, path = %path.display(), "saved");
        self.extender.on_save(path);
    }

    // ==================== Closing ====================

    /// Close a buffer. One still saving is hidden until the save finishes;
    /// one still loading has its worker cancelled and is dropped at once.
    pub fn close(&mut self, id: BufferId) -> Result<()> {
        let buffer = self.buffers.get_mut(id).ok_or(FileError::UnknownBuffer(id))?;
        if buffer.is_storing() {
            buffer.visible = false;
            self.buffers.move_current_off(id);
            info!(target: "io", buffer = %id, "closed while saving, hidden until the save completes");
            return Ok(());
        }
        if let Some(worker) = buffer.worker() {
            worker.cancel();
        }
        self.buffers.remove(id);
        debug!(target: "io", buffer = %id, "closed");
        Ok(())
    }

    /// Ask the buffer's worker to stop. Returns false when nothing was running.
    pub fn cancel(&mut self, id: BufferId) -> bool {
        match self.buffers.get(id).and_then(Buffer::worker) {
            Some(worker) => {
                worker.cancel();
                info!(target: "io", buffer = %id, worker = %worker.id(), "cancel requested");
                true
            }
            None => false,
        }
    }

    /// Cancel every load and wait for every save to finish.
    pub fn quit(&mut self) {
        for buffer in self.buffers.iter() {
            if let Some(worker) = buffer.worker().filter(|w| w.is_loading()) {
                worker.cancel();
            }
        }
        self.wait_for_saves();
        info!(target: "session", "quit");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    /// Serves `data` once, then fails like a device going away.
    struct FailingReader {
        data: &'static [u8],
        served: bool,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.served {
                return Err(io::Error::other("device went away"));
            }
            self.served = true;
            let n = self.data.len().min(buf.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            Ok(n)
        }
    }

    #[test]
    fn test_flags() {
        let flags = OpenFlags::FORCE_LOAD | OpenFlags::QUIET;
        assert!(flags.contains(OpenFlags::FORCE_LOAD));
        assert!(flags.contains(OpenFlags::QUIET));
        assert!(!flags.contains(OpenFlags::SYNCHRONOUS));
        assert!(OpenFlags::NONE.contains(OpenFlags::NONE));
        assert!((SaveFlags::SYNCHRONOUS | SaveFlags::PROGRESS_VISIBLE).contains(SaveFlags::SYNCHRONOUS));
    }

    #[test]
    fn test_thresholds() {
        assert!(exceeds(10, Some(5)));
        assert!(!exceeds(5, Some(5)));
        assert!(exceeds(1, None));
        assert!(!exceeds(0, None));
    }

    #[test]
    fn test_new_buffer_is_opened_and_clean() {
        let mut session = Session::new(IoSettings::default());
        let id = session.new_buffer();
        let buffer = session.buffer(id).unwrap();
        assert_eq!(buffer.life_state(), LifeState::Opened);
        assert!(!buffer.is_dirty());
        assert_eq!(session.current(), Some(id));
        assert!(matches!(session.save(id, SaveFlags::NONE), Err(FileError::Untitled)));
    }

    #[test]
    fn test_open_from_reader() {
        let mut session = Session::new(IoSettings::default());
        let id = session.open_from_reader(&b"piped\r\ninput\r\n"[..]).unwrap();
        assert_eq!(session.text(id).unwrap(), "piped\r\ninput\r\n");
        let buffer = session.buffer(id).unwrap();
        assert!(buffer.is_untitled());
        assert!(!buffer.is_dirty());
        assert!(!buffer.document.can_undo());
        assert_eq!(buffer.document.eol_mode(), eol::EolMode::CrLf);
    }

    #[test]
    fn test_directory_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new(IoSettings::default());
        let result = session.open(dir.path(), OpenFlags::NONE);
        assert!(matches!(result, Err(FileError::IsDirectory(_))));
        assert!(session.buffers().is_empty());
    }

    #[test]
    fn test_missing_file_leaves_no_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new(IoSettings::default());
        let result = session.open(dir.path().join("absent.txt"), OpenFlags::NONE);
        assert!(matches!(result, Err(FileError::OpenFailure { .. })));
        assert!(session.buffers().is_empty());
    }

    #[test]
    fn test_failed_reload_keeps_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keep.txt");
        std::fs::write(&path, "original\n").unwrap();
        let mut session = Session::new(IoSettings::default());
        let id = session.open(&path, OpenFlags::NONE).unwrap();
        session.insert(id, 0, "edited ").unwrap();

        let reader = FailingReader {
            data: b"replacement prefix",
            served: false,
        };
        let result = session.load_now(id, reader, 0, OpenFlags::FORCE_LOAD);
        assert!(matches!(result, Err(FileError::OpenFailure { .. })));

        let buffer = session.buffer(id).unwrap();
        assert_eq!(buffer.document.text(), "edited original\n");
        assert_eq!(buffer.life_state(), LifeState::Opened);
        assert!(buffer.is_dirty());
        assert!(session.undo(id).unwrap());
        assert_eq!(session.text(id).unwrap(), "original\n");
    }

    #[test]
    fn test_failed_read_leaves_no_buffer() {
        let mut session = Session::new(IoSettings::default());
        let existing = session.new_buffer();
        let reader = FailingReader {
            data: b"partial",
            served: false,
        };
        assert!(session.open_from_reader(reader).is_err());
        assert_eq!(session.buffers().len(), 1);
        assert_eq!(session.current(), Some(existing));
    }
}

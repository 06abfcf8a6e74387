//! Noticing files changed behind the editor's back, reloading them, and
//! reverting a buffer to what is on disk.

use std::fs;
use std::path::Path;
use std::time::SystemTime;

use tracing::{info, warn};

use crate::core::buffer::{LifeState, modified_time};
use crate::core::encoding::{self, Encoding, UTF8_BOM};
use crate::core::error::{FileError, Result};
use crate::core::host::Question;
use crate::core::id::BufferId;
use crate::core::session::{OpenFlags, SaveFlags, Session};

/// Files at least this large are reverted by a full reload instead of a patch.
pub const PATCH_LIMIT: u64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadAction {
    Unchanged,
    /// Changed on disk; the user has to decide.
    Ask,
    /// Changed on disk and safe to reload without asking.
    Reload,
    /// Gone from disk.
    Deleted,
}

/// Decide what to do about a file from its recorded and current times.
///
/// A change the user was already asked about (`last_ask`) is not asked
/// about again until the file changes once more.
pub fn assess(
    stored: Option<SystemTime>,
    last_ask: Option<SystemTime>,
    on_disk: Option<SystemTime>,
    dirty: bool,
    always_ask: bool,
) -> ReloadAction {
    match on_disk {
        Some(time) if Some(time) != stored => {
            if !(dirty || always_ask) {
                ReloadAction::Reload
            } else if Some(time) != last_ask {
                ReloadAction::Ask
            } else {
                ReloadAction::Unchanged
            }
        }
        None if stored.is_some() => ReloadAction::Deleted,
        _ => ReloadAction::Unchanged,
    }
}

impl Session {
    /// Compare a buffer's file with disk and act on any difference.
    pub fn check_reload(&mut self, id: BufferId) -> Result<ReloadAction> {
        let buffer = self.buffers.get(id).ok_or(FileError::UnknownBuffer(id))?;
        let Some(path) = buffer.path.clone() else {
            return Ok(ReloadAction::Unchanged);
        };
        if buffer.worker().is_some() || buffer.life_state() != LifeState::Opened {
            return Ok(ReloadAction::Unchanged);
        }
        let on_disk = modified_time(&path);
        let dirty = buffer.is_dirty();
        let action = assess(
            buffer.file_mod_time,
            buffer.file_mod_last_ask,
            on_disk,
            dirty,
            self.settings.are_you_sure_on_reload,
        );

        match action {
            ReloadAction::Unchanged => {}
            ReloadAction::Ask => {
                if let Some(buffer) = self.buffers.get_mut(id) {
                    buffer.file_mod_last_ask = on_disk;
                }
                let question = Question::Reload {
                    path: path.clone(),
                    dirty,
                };
                if self.frontend.confirm(&question) {
                    self.reload(&path)?;
                }
            }
            ReloadAction::Reload => self.reload(&path)?,
            ReloadAction::Deleted => {
                if let Some(buffer) = self.buffers.get_mut(id) {
                    buffer.file_mod_time = None;
                    buffer.file_mod_last_ask = None;
                    buffer.forced_dirty = true;
                }
                let error = FileError::ExternalDeletion(path);
                warn!(target: "io", buffer = %id, kind = error.kind(), "{}", error);
                self.frontend.report(&error);
            }
        }
        Ok(action)
    }

    fn reload(&mut self, path: &Path) -> Result<()> {
        let mut flags = OpenFlags::FORCE_LOAD | OpenFlags::QUIET;
        if self.settings.reload_preserves_undo {
            flags = flags | OpenFlags::PRESERVE_UNDO;
        }
        info!(target: "io", path = %path.display(), "reloading");
        self.open_path(path, flags, false).map(|_| ())
    }

    /// The application gained or lost focus. Gaining it checks every buffer
    /// against disk; losing it can save every titled, modified buffer.
    pub fn activate(&mut self, active: bool) {
        if active {
            if !self.settings.load_on_activate {
                return;
            }
            for id in self.buffers.ids() {
                if !self.buffers.get(id).is_some_and(|b| b.visible) {
                    continue;
                }
                if let Err(error) = self.check_reload(id) {
                    self.frontend.report(&error);
                }
            }
        } else if self.settings.save_on_deactivate {
            for id in self.buffers.ids() {
                let wanted = self.buffers.get(id).is_some_and(|b| {
                    b.visible && !b.is_untitled() && b.is_dirty() && b.worker().is_none()
                });
                if wanted {
                    if let Err(error) = self.save(id, SaveFlags::NONE) {
                        self.frontend.report(&error);
                    }
                }
            }
        }
    }

    /// Throw away unsaved changes and show what is on disk.
    ///
    /// Small files in an 8-bit or UTF-8 encoding are patched in place, only
    /// touching the part that differs, so the caret and undo history survive.
    /// Anything else is reloaded in full.
    pub fn revert(&mut self, id: BufferId) -> Result<()> {
        let buffer = self.buffers.get(id).ok_or(FileError::UnknownBuffer(id))?;
        if buffer.worker().is_some() {
            return Err(FileError::AlreadyInFlight(buffer.display_path()));
        }
        if buffer.life_state() != LifeState::Opened {
            return Err(FileError::StillLoading(buffer.display_path()));
        }
        let encoding = buffer.document.encoding();
        let Some(path) = buffer.path.clone() else {
            if let Some(buffer) = self.buffers.get_mut(id) {
                buffer.document.clear_all();
                buffer.document.set_save_point();
                buffer.caret = 0;
            }
            return Ok(());
        };

        let open_failure = |source| FileError::OpenFailure {
            path: path.clone(),
            source,
        };
        let size = fs::metadata(&path).map_err(open_failure)?.len();
        let patchable = size < PATCH_LIMIT
            && matches!(encoding, Encoding::EightBit | Encoding::Utf8 | Encoding::Utf8Bom);
        if !patchable {
            return self.reload_in_full(&path);
        }

        let bytes = fs::read(&path).map_err(open_failure)?;
        if encoding == Encoding::Utf8Bom && !bytes.starts_with(UTF8_BOM) {
            let mismatch = FileError::EncodingMismatch(path.clone());
            warn!(target: "io", buffer = %id, kind = mismatch.kind(), "{}", mismatch);
            return self.reload_in_full(&path);
        }

        let text = encoding::decode_as(&bytes, encoding);
        let buffer = self.buffers.get_mut(id).ok_or(FileError::UnknownBuffer(id))?;
        buffer.document.patch(&text);
        buffer.document.set_save_point();
        buffer.set_time_from_file();
        buffer.failed_save = false;
        buffer.clamp_caret();
        info!(target: "io", buffer = %id, path = %path.display(), "reverted");
        Ok(())
    }

    fn reload_in_full(&mut self, path: &Path) -> Result<()> {
        let flags = OpenFlags::FORCE_LOAD | OpenFlags::SYNCHRONOUS | OpenFlags::QUIET;
        self.open_path(path, flags, false).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn at(secs: u64) -> Option<SystemTime> {
        Some(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
    }

    #[test]
    fn test_unchanged_file() {
        assert_eq!(assess(at(1), at(1), at(1), true, true), ReloadAction::Unchanged);
        assert_eq!(assess(None, None, None, false, false), ReloadAction::Unchanged);
    }

    #[test]
    fn test_clean_buffer_reloads_silently() {
        assert_eq!(assess(at(1), at(1), at(2), false, false), ReloadAction::Reload);
    }

    #[test]
    fn test_dirty_buffer_asks_once_per_change() {
        assert_eq!(assess(at(1), at(1), at(2), true, false), ReloadAction::Ask);
        // already asked about time 2
        assert_eq!(assess(at(1), at(2), at(2), true, false), ReloadAction::Unchanged);
        // changed again
        assert_eq!(assess(at(1), at(2), at(3), true, false), ReloadAction::Ask);
    }

    #[test]
    fn test_always_ask() {
        assert_eq!(assess(at(1), at(1), at(2), false, true), ReloadAction::Ask);
    }

    #[test]
    fn test_deleted() {
        assert_eq!(assess(at(1), at(1), None, false, false), ReloadAction::Deleted);
    }
}

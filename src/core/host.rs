//! Seams between the session and whatever embeds it.
//!
//! A [`Frontend`] answers questions and shows messages; an [`Extender`] gets
//! to react to opens and saves and may veto a save. Both are called only on
//! the controlling thread.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::core::buffers::BackgroundActivities;
use crate::core::error::FileError;

/// A yes/no question put to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Question {
    /// File is above the soft size limit; open anyway?
    LargeFile { path: PathBuf, size: u64, limit: u64 },
    /// File changed on disk; reload it? `dirty` means local edits would be lost.
    Reload { path: PathBuf, dirty: bool },
    /// File changed on disk since it was loaded; overwrite it?
    Overwrite { path: PathBuf },
}

pub trait Frontend {
    fn confirm(&mut self, question: &Question) -> bool;

    /// Show an error the user did not directly ask about, such as a failed
    /// background save or a deleted file.
    fn report(&mut self, error: &FileError);

    /// Called while workers run, and once more when the last one finishes.
    fn progress(&mut self, _activities: &BackgroundActivities) {}
}

/// Says no to every question and logs every report.
#[derive(Debug, Default)]
pub struct Headless;

impl Frontend for Headless {
    fn confirm(&mut self, question: &Question) -> bool {
        info!(target: "session", ?question, "declining question without a frontend");
        false
    }

    fn report(&mut self, error: &FileError) {
        warn!(target: "session", kind = error.kind(), "{}", error);
    }
}

pub trait Extender {
    fn on_open(&mut self, _path: &Path) {}

    /// Return true to stop the save.
    fn on_before_save(&mut self, _path: &Path) -> bool {
        false
    }

    fn on_save(&mut self, _path: &Path) {}
}

#[derive(Debug, Default)]
pub struct NoExtender;

impl Extender for NoExtender {}

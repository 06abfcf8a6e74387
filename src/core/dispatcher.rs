//! Completion dispatcher: applies worker results to their buffers.
//!
//! Runs only on the controlling thread, from [`Session::poll`] or one of the
//! blocking waits. A completion is matched to its buffer by id and then by
//! the worker bound to it; a completion that matches nothing belongs to a
//! buffer that was closed and is dropped without a word.

use std::io;
use std::path::Path;
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::core::buffer::LifeState;
use crate::core::buffers::BufferSet;
use crate::core::document::Document;
use crate::core::error::{FileError, Result};
use crate::core::id::{BufferId, WorkerId};
use crate::core::session::Session;
use crate::core::worker::{Completion, Loaded, Outcome};

/// How long a blocking wait sleeps before checking for dead workers.
const WAIT_SLICE: Duration = Duration::from_millis(20);

impl Session {
    /// Handle every completion that has arrived, without blocking.
    /// Returns how many were handled.
    pub fn poll(&mut self) -> usize {
        let had_workers = self.buffers.has_workers();
        let exited = self.exited_workers();
        let mut handled = 0;
        while let Ok(completion) = self.inbox.try_recv() {
            self.dispatch(completion);
            handled += 1;
        }
        handled += self.reap(exited);
        if had_workers {
            self.report_progress();
        }
        handled
    }

    /// Block until no buffer has a worker.
    pub fn wait_idle(&mut self) {
        self.wait_while(BufferSet::has_workers);
    }

    /// Block until no background save is running.
    pub fn wait_for_saves(&mut self) {
        self.wait_while(BufferSet::saving_in_background);
    }

    fn wait_while(&mut self, busy: fn(&BufferSet) -> bool) {
        while busy(&self.buffers) {
            let exited = self.exited_workers();
            match self.inbox.recv_timeout(WAIT_SLICE) {
                Ok(completion) => self.dispatch(completion),
                Err(RecvTimeoutError::Timeout) => {
                    self.reap(exited);
                }
                // The session holds a sender, so this cannot happen
                Err(RecvTimeoutError::Disconnected) => break,
            }
            self.report_progress();
        }
    }

    fn report_progress(&mut self) {
        let activities = self.buffers.background_activities();
        self.frontend.progress(&activities);
    }

    /// Workers whose thread has already exited.
    fn exited_workers(&self) -> Vec<(BufferId, WorkerId)> {
        self.buffers
            .iter()
            .filter_map(|b| b.worker().filter(|w| w.is_finished()).map(|w| (b.id(), w.id())))
            .collect()
    }

    /// A worker reports before its thread exits. One that had exited before
    /// the inbox was drained and is still bound died without reporting.
    fn reap(&mut self, exited: Vec<(BufferId, WorkerId)>) -> usize {
        let mut reaped = 0;
        for (buffer, worker) in exited {
            let Some(handle) = self.buffers.get(buffer).and_then(|b| b.worker()) else {
                continue;
            };
            if handle.id() != worker {
                continue;
            }
            let path = handle.path().to_path_buf();
            let source = io::Error::other("worker exited without reporting");
            error!(target: "io", %buffer, %worker, path = %path.display(), "worker died");
            let outcome = if handle.is_loading() {
                Outcome::Loaded(Err(FileError::OpenFailure { path, source }))
            } else {
                Outcome::Stored(Err(FileError::PartialWriteFailure { path, source }))
            };
            self.dispatch(Completion {
                buffer,
                worker,
                outcome,
            });
            reaped += 1;
        }
        reaped
    }

    fn dispatch(&mut self, completion: Completion) {
        let Completion {
            buffer: id,
            worker,
            outcome,
        } = completion;
        let bound = self
            .buffers
            .get(id)
            .is_some_and(|b| b.worker_id() == Some(worker));
        if !bound {
            debug!(target: "io", buffer = %id, %worker, "completion for a closed buffer discarded");
            return;
        }
        let Some(handle) = self.buffers.get_mut(id).and_then(|b| b.take_worker()) else {
            return;
        };
        let path = handle.path().to_path_buf();
        let version = handle.version();
        handle.join();

        match outcome {
            Outcome::Loaded(result) => self.text_read(id, &path, result),
            Outcome::Stored(result) => self.text_written(id, &path, version, result),
        }
    }

    fn text_read(&mut self, id: BufferId, path: &Path, result: Result<Loaded>) {
        let Some(buffer) = self.buffers.get_mut(id) else {
            return;
        };
        match result {
            Ok(Loaded { document, bytes }) => {
                info!(
                    target: "io",
                    buffer = %id,
                    path = %path.display(),
                    bytes,
                    encoding = document.encoding().name(),
                    "loaded"
                );
                buffer.set_life_state(LifeState::ReadAll);
                buffer.document = document;
                // A buffer out of view finishes opening when switched to
                if self.buffers.current() == Some(id) {
                    self.complete_open(id);
                }
            }
            Err(error) => {
                buffer.set_life_state(LifeState::Empty);
                buffer.document = Document::new();
                buffer.caret = 0;
                if let FileError::Cancelled(_) = error {
                    info!(target: "io", buffer = %id, path = %path.display(), "load cancelled");
                } else {
                    warn!(target: "io", buffer = %id, kind = error.kind(), "{}", error);
                    self.frontend.report(&error);
                }
            }
        }
    }

    fn text_written(&mut self, id: BufferId, path: &Path, version: u64, result: Result<u64>) {
        let Some(buffer) = self.buffers.get_mut(id) else {
            return;
        };
        match result {
            Ok(written) => {
                debug!(target: "io", buffer = %id, written, "background save finished");
                if !buffer.visible {
                    self.extender.on_save(path);
                    self.buffers.remove(id);
                    info!(target: "io", buffer = %id, path = %path.display(), "saved and removed closed buffer");
                    return;
                }
                self.finish_save(id, path, version);
            }
            Err(error) => {
                // Still dirty: the save point was never moved
                buffer.failed_save = true;
                buffer.visible = true;
                if self.buffers.current().is_none() {
                    self.buffers.set_current(id);
                }
                if let FileError::Cancelled(_) = error {
                    info!(target: "io", buffer = %id, path = %path.display(), "save cancelled");
                } else {
                    warn!(target: "io", buffer = %id, kind = error.kind(), "{}", error);
                    self.frontend.report(&error);
                }
            }
        }
    }
}

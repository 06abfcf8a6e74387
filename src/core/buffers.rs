//! BufferSet: the ordered collection of open buffers.
//!
//! Buffers are addressed by [`BufferId`], never by position: ids are never
//! reused, so a completion arriving for a buffer that has since been closed
//! simply fails to find it.

use std::collections::HashMap;
use std::path::Path;

use crate::core::buffer::Buffer;
use crate::core::id::{BufferId, WorkerId};

/// Summary of what workers are doing, for a progress display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackgroundActivities {
    pub loaders: usize,
    pub storers: usize,
    /// Units of work across all counted workers
    pub total_work: u64,
    pub total_progress: u64,
    /// File of the last counted worker
    pub last_file: Option<String>,
}

impl BackgroundActivities {
    pub fn is_idle(&self) -> bool {
        self.loaders == 0 && self.storers == 0
    }

    pub fn percent(&self) -> u64 {
        if self.total_work == 0 {
            0
        } else {
            self.total_progress.saturating_mul(100) / self.total_work
        }
    }
}

#[derive(Debug, Default)]
pub struct BufferSet {
    /// All buffers
    buffers: HashMap<BufferId, Buffer>,
    /// Display order
    order: Vec<BufferId>,
    /// Next buffer ID to allocate
    next_buffer_id: usize,
    /// Buffer the user is looking at
    current: Option<BufferId>,
}

impl BufferSet {
    pub fn new() -> Self {
        Self {
            next_buffer_id: 1,
            ..Self::default()
        }
    }

    /// Allocate a new buffer ID
    fn alloc_buffer_id(&mut self) -> BufferId {
        let id = BufferId(self.next_buffer_id);
        self.next_buffer_id += 1;
        id
    }

    /// Add an empty buffer at the end of the order
    pub fn add(&mut self, path: Option<&Path>) -> BufferId {
        let id = self.alloc_buffer_id();
        self.buffers
            .insert(id, Buffer::new(id, path.map(Path::to_path_buf)));
        self.order.push(id);
        id
    }

    /// Remove a buffer. When it was current, its neighbour in the order takes over.
    pub fn remove(&mut self, id: BufferId) -> Option<Buffer> {
        let buffer = self.buffers.remove(&id)?;
        let index = self.order.iter().position(|&b| b == id);
        self.order.retain(|&b| b != id);
        if self.current == Some(id) {
            self.current = index.and_then(|i| self.nearest_visible(i));
        }
        Some(buffer)
    }

    fn nearest_visible(&self, index: usize) -> Option<BufferId> {
        let visible = |id: &&BufferId| self.buffers.get(id).is_some_and(|b| b.visible);
        self.order[index.min(self.order.len())..]
            .iter()
            .find(visible)
            .or_else(|| self.order[..index.min(self.order.len())].iter().rev().find(visible))
            .copied()
    }

    pub fn get(&self, id: BufferId) -> Option<&Buffer> {
        self.buffers.get(&id)
    }

    pub fn get_mut(&mut self, id: BufferId) -> Option<&mut Buffer> {
        self.buffers.get_mut(&id)
    }

    pub fn current(&self) -> Option<BufferId> {
        self.current
    }

    pub fn set_current(&mut self, id: BufferId) {
        if self.buffers.contains_key(&id) {
            self.current = Some(id);
        }
    }

    /// Make the current buffer something other than `id`, if possible.
    pub fn move_current_off(&mut self, id: BufferId) {
        if self.current == Some(id) {
            let index = self.index_of(id).unwrap_or(0);
            self.current = self
                .nearest_visible(index + 1)
                .filter(|&other| other != id);
        }
    }

    /// Find the buffer holding `path`, optionally ignoring one buffer.
    pub fn by_path(&self, path: &Path, exclude: Option<BufferId>) -> Option<BufferId> {
        self.order.iter().copied().find(|&id| {
            Some(id) != exclude
                && self
                    .buffers
                    .get(&id)
                    .and_then(|b| b.path.as_deref())
                    .is_some_and(|p| p == path)
        })
    }

    /// Find the buffer a worker is bound to.
    pub fn by_worker(&self, worker: WorkerId) -> Option<BufferId> {
        self.order
            .iter()
            .copied()
            .find(|id| self.buffers.get(id).and_then(Buffer::worker_id) == Some(worker))
    }

    /// Buffer at a position in the display order.
    pub fn by_index(&self, index: usize) -> Option<BufferId> {
        self.order.get(index).copied()
    }

    pub fn index_of(&self, id: BufferId) -> Option<usize> {
        self.order.iter().position(|&b| b == id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Buffers the user can see; hidden ones are only finishing a save.
    pub fn visible_count(&self) -> usize {
        self.iter().filter(|b| b.visible).count()
    }

    /// Buffer ids in display order.
    pub fn ids(&self) -> Vec<BufferId> {
        self.order.clone()
    }

    /// Buffers in display order.
    pub fn iter(&self) -> impl Iterator<Item = &Buffer> {
        self.order.iter().filter_map(|id| self.buffers.get(id))
    }

    pub fn has_workers(&self) -> bool {
        self.iter().any(|b| b.worker().is_some())
    }

    pub fn saving_in_background(&self) -> bool {
        self.iter().any(Buffer::is_storing)
    }

    /// Count workers and sum their progress. Stores started without a
    /// progress display are not counted.
    pub fn background_activities(&self) -> BackgroundActivities {
        let mut activities = BackgroundActivities::default();
        for worker in self.iter().filter_map(Buffer::worker) {
            if worker.is_loading() {
                activities.loaders += 1;
            } else if worker.progress_visible() {
                activities.storers += 1;
            } else {
                continue;
            }
            activities.total_work += worker.size();
            activities.total_progress += worker.progress();
            activities.last_file = Some(worker.path().display().to_string());
        }
        activities
    }
}

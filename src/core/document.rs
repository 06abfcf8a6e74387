//! Document: the text storage a buffer edits, built on a ropey `Rope`.
//!
//! This is the narrow "text buffer" surface the I/O engine talks to: range
//! reads, insert/delete, undo grouping, encoding and EOL mode, save point.
//! A background load builds a fresh document through a [`Loader`] and hands
//! the finished document to the buffer in one move.
//!
//! Positions are byte offsets into the UTF-8 text and are clamped to the
//! nearest character boundary at or before them.

use ropey::{Rope, RopeBuilder};
use std::collections::VecDeque;

use crate::core::encoding::Encoding;
use crate::core::eol::{self, EolMode};

/// Maximum undo stack depth to prevent OOM from unbounded undo history
const MAX_UNDO_DEPTH: usize = 10_000;

/// An edit operation for undo/redo
#[derive(Debug, Clone)]
pub enum Edit {
    /// Insert: (position, text inserted)
    Insert { pos: usize, text: Rope },
    /// Delete: (position, text deleted)
    Delete { pos: usize, text: Rope },
}

/// Edits undone and redone together.
#[derive(Debug, Clone, Default)]
pub struct UndoGroup {
    pub edits: Vec<Edit>,
}

#[derive(Debug, Clone)]
pub struct Document {
    rope: Rope,
    encoding: Encoding,
    eol_mode: EolMode,
    /// Bumped on every change
    version: u64,
    /// Version at the last save point; differing means modified
    save_point: u64,
    undo_stack: VecDeque<UndoGroup>,
    redo_stack: VecDeque<UndoGroup>,
    collect_undo: bool,
    /// Nesting depth of begin/end undo action
    group_depth: usize,
    size_hint: usize,
}

impl Document {
    pub fn new() -> Self {
        Self::from_rope(Rope::new())
    }

    pub fn from_str(text: &str) -> Self {
        Self::from_rope(Rope::from_str(text))
    }

    fn from_rope(rope: Rope) -> Self {
        Self {
            rope,
            encoding: Encoding::default(),
            eol_mode: EolMode::default(),
            version: 0,
            save_point: 0,
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            collect_undo: true,
            group_depth: 0,
            size_hint: 0,
        }
    }

    /// Fresh empty document sized for a file of roughly `size_hint` bytes.
    pub fn allocate(size_hint: usize) -> Self {
        let mut doc = Self::new();
        doc.size_hint = size_hint;
        doc
    }

    pub fn size_hint(&self) -> usize {
        self.size_hint
    }

    // ==================== Content Access ====================

    /// Total length in bytes
    pub fn len(&self) -> usize {
        self.rope.len_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.rope.len_bytes() == 0
    }

    pub fn len_chars(&self) -> usize {
        self.rope.len_chars()
    }

    /// Number of lines counting only CR, LF and CRLF as terminators.
    pub fn line_count(&self) -> usize {
        let counts = eol::count_line_ends(&self.rope, usize::MAX);
        counts.cr + counts.lf + counts.crlf + 1
    }

    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    /// Shared immutable view of the current text; O(1).
    pub fn snapshot(&self) -> Rope {
        self.rope.clone()
    }

    pub fn rope(&self) -> &Rope {
        &self.rope
    }

    /// Range of text as string
    pub fn range_text(&self, start: usize, length: usize) -> String {
        let len = self.rope.len_bytes();
        let start = self.floor_boundary(start.min(len));
        let end = self.floor_boundary(start.saturating_add(length).min(len));
        if start >= end {
            return String::new();
        }
        self.rope.byte_slice(start..end).to_string()
    }

    /// Character at byte position
    pub fn char_at(&self, byte_pos: usize) -> Option<char> {
        if byte_pos >= self.rope.len_bytes() {
            return None;
        }
        let char_idx = self.rope.byte_to_char(byte_pos);
        self.rope.get_char(char_idx)
    }

    /// Round a byte offset down to the start of the character containing it.
    pub fn floor_boundary(&self, byte_pos: usize) -> usize {
        let byte_pos = byte_pos.min(self.rope.len_bytes());
        self.rope.char_to_byte(self.rope.byte_to_char(byte_pos))
    }

    // ==================== Modes ====================

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn set_encoding(&mut self, encoding: Encoding) {
        self.encoding = encoding;
    }

    pub fn eol_mode(&self) -> EolMode {
        self.eol_mode
    }

    pub fn set_eol_mode(&mut self, mode: EolMode) {
        self.eol_mode = mode;
    }

    // ==================== Editing Operations ====================

    /// Insert text at byte position
    pub fn insert(&mut self, pos: usize, text: &str) {
        if text.is_empty() {
            return;
        }
        let pos = self.floor_boundary(pos);
        let char_idx = self.rope.byte_to_char(pos);
        self.rope.insert(char_idx, text);
        self.mark_modified();
        self.push_edit(Edit::Insert {
            pos,
            text: Rope::from_str(text),
        });
    }

    /// Delete `len` bytes at byte position
    pub fn delete(&mut self, pos: usize, len: usize) {
        let pos = self.floor_boundary(pos);
        let end = self.floor_boundary(pos.saturating_add(len));
        if end <= pos {
            return;
        }
        let start_char = self.rope.byte_to_char(pos);
        let end_char = self.rope.byte_to_char(end);
        let deleted = Rope::from(self.rope.slice(start_char..end_char));
        self.rope.remove(start_char..end_char);
        self.mark_modified();
        self.push_edit(Edit::Delete { pos, text: deleted });
    }

    /// Append at the end
    pub fn append(&mut self, text: &str) {
        self.insert(self.len(), text);
    }

    pub fn clear_all(&mut self) {
        self.delete(0, self.len());
    }

    /// Replace the whole text with `new_text`, touching only the section that
    /// differs. Returns false when the texts were already equal.
    pub fn patch(&mut self, new_text: &str) -> bool {
        let current = self.text();
        let (start, last) = eol::common_ends(&current, new_text);
        if start == current.len() && current.len() == new_text.len() {
            return false;
        }
        self.begin_undo_action();
        self.delete(start, current.len() - last - start);
        self.insert(start, &new_text[start..new_text.len() - last]);
        self.end_undo_action();
        true
    }

    // ==================== Undo/Redo ====================

    pub fn begin_undo_action(&mut self) {
        if self.group_depth == 0 && self.collect_undo {
            self.open_group();
        }
        self.group_depth += 1;
    }

    pub fn end_undo_action(&mut self) {
        self.group_depth = self.group_depth.saturating_sub(1);
        if self.group_depth == 0 && self.undo_stack.back().is_some_and(|g| g.edits.is_empty()) {
            self.undo_stack.pop_back();
        }
    }

    /// Turn undo recording on or off. Turning it off discards existing history.
    pub fn set_undo_collection(&mut self, collect: bool) {
        self.collect_undo = collect;
        if !collect {
            self.empty_undo_buffer();
        }
    }

    pub fn undo_collection(&self) -> bool {
        self.collect_undo
    }

    pub fn empty_undo_buffer(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Undo the last edit group
    pub fn undo(&mut self) -> bool {
        let Some(group) = self.undo_stack.pop_back() else {
            return false;
        };
        for edit in group.edits.iter().rev() {
            match edit {
                Edit::Insert { pos, text } => self.raw_remove(*pos, text.len_bytes()),
                Edit::Delete { pos, text } => self.raw_insert(*pos, text),
            }
        }
        self.redo_stack.push_back(group);
        self.mark_modified();
        true
    }

    /// Redo the last undone edit group
    pub fn redo(&mut self) -> bool {
        let Some(group) = self.redo_stack.pop_back() else {
            return false;
        };
        for edit in &group.edits {
            match edit {
                Edit::Insert { pos, text } => self.raw_insert(*pos, text),
                Edit::Delete { pos, text } => self.raw_remove(*pos, text.len_bytes()),
            }
        }
        self.undo_stack.push_back(group);
        self.mark_modified();
        true
    }

    fn raw_insert(&mut self, pos: usize, text: &Rope) {
        let mut current_idx = self.rope.byte_to_char(pos);
        for chunk in text.chunks() {
            self.rope.insert(current_idx, chunk);
            current_idx += chunk.chars().count();
        }
    }

    fn raw_remove(&mut self, pos: usize, len: usize) {
        let start_char = self.rope.byte_to_char(pos);
        let end_char = self.rope.byte_to_char(pos + len);
        self.rope.remove(start_char..end_char);
    }

    fn open_group(&mut self) {
        if self.undo_stack.len() >= MAX_UNDO_DEPTH {
            self.undo_stack.pop_front(); // O(1) discard oldest
        }
        self.undo_stack.push_back(UndoGroup::default());
    }

    fn push_edit(&mut self, edit: Edit) {
        if !self.collect_undo {
            return;
        }
        self.redo_stack.clear();
        if self.group_depth == 0 {
            self.open_group();
        }
        if let Some(group) = self.undo_stack.back_mut() {
            group.edits.push(edit);
        }
    }

    // ==================== Save Point ====================

    fn mark_modified(&mut self) {
        self.version += 1;
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn set_save_point(&mut self) {
        self.save_point = self.version;
    }

    /// Record that the text as of `version` is what is on disk.
    pub fn set_save_point_at(&mut self, version: u64) {
        self.save_point = version;
    }

    pub fn is_modified(&self) -> bool {
        self.version != self.save_point
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a document off the controlling thread. Owned exclusively by one
/// load worker until converted into a [`Document`].
pub struct Loader {
    builder: RopeBuilder,
    size_hint: usize,
    loaded: usize,
}

impl Loader {
    pub fn new(size_hint: usize) -> Self {
        Self {
            builder: RopeBuilder::new(),
            size_hint,
            loaded: 0,
        }
    }

    pub fn add_data(&mut self, text: &str) {
        if !text.is_empty() {
            self.builder.append(text);
            self.loaded += text.len();
        }
    }

    /// Bytes of text added so far
    pub fn loaded(&self) -> usize {
        self.loaded
    }

    pub fn into_document(self) -> Document {
        let mut doc = Document::from_rope(self.builder.finish());
        doc.size_hint = self.size_hint;
        doc
    }
}

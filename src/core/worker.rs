//! FileWorker: loads or saves one file on its own thread.
//!
//! The same block pipelines run synchronously on the controlling thread, so a
//! file loaded or saved either way ends up byte-for-byte identical. A worker
//! reports exactly once, by sending a [`Completion`] over the session's
//! channel; its cancel flag and progress counter are the only state shared
//! while it runs.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ropey::Rope;
use tracing::debug;

use crate::config::IoSettings;
use crate::core::document::{Document, Loader};
use crate::core::encoding::{self, Encoding};
use crate::core::error::{FileError, Result};
use crate::core::id::{BufferId, WorkerId};
use crate::core::storage::SaveSink;

/// Anything a load can stream decoded text into.
pub trait TextSink {
    fn add_text(&mut self, text: &str);
}

impl TextSink for Loader {
    fn add_text(&mut self, text: &str) {
        self.add_data(text);
    }
}

impl TextSink for Document {
    fn add_text(&mut self, text: &str) {
        self.append(text);
    }
}

/// Block size and the pause taken between blocks on a worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub block_size: usize,
    pub sleep: Duration,
}

impl Pacing {
    pub fn from_settings(settings: &IoSettings) -> Self {
        Self {
            block_size: settings.block_size.max(16),
            sleep: settings.asynchronous_sleep,
        }
    }

    fn pause(&self) {
        if self.sleep.is_zero() {
            thread::yield_now();
        } else {
            thread::sleep(self.sleep);
        }
    }
}

/// Cancel flag and progress counter shared with a running worker.
#[derive(Debug, Default)]
pub struct WorkerStatus {
    cancelled: AtomicBool,
    done: AtomicU64,
}

impl WorkerStatus {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    fn advance(&self, bytes: u64) {
        self.done.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Units of work completed so far.
    pub fn done(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }
}

/// Why a pipeline stopped early.
#[derive(Debug)]
pub enum StreamError {
    Io(io::Error),
    Cancelled,
    /// Text the file's encoding cannot represent.
    Unmappable { character: char, encoding: Encoding },
}

impl StreamError {
    pub fn into_file_error(self, path: &Path, kind: WorkerKind) -> FileError {
        let path = path.to_path_buf();
        match (self, kind) {
            (StreamError::Cancelled, _) => FileError::Cancelled(path),
            (StreamError::Io(source), WorkerKind::Load) => FileError::OpenFailure { path, source },
            (StreamError::Io(source), WorkerKind::Store) => {
                FileError::PartialWriteFailure { path, source }
            }
            (StreamError::Unmappable { character, encoding }, _) => FileError::Unrepresentable {
                path,
                character,
                encoding: encoding.name(),
            },
        }
    }
}

/// Read `reader` to the end in blocks, decoding into `sink`. Returns the
/// encoding the converter settled on.
pub fn read_stream<R: Read, S: TextSink + ?Sized>(
    mut reader: R,
    sink: &mut S,
    pacing: Pacing,
    status: Option<&WorkerStatus>,
) -> std::result::Result<Encoding, StreamError> {
    let mut converter = encoding::Reader::new();
    let mut block = vec![0u8; pacing.block_size];
    loop {
        if status.is_some_and(WorkerStatus::is_cancelled) {
            return Err(StreamError::Cancelled);
        }
        let n = match reader.read(&mut block) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(StreamError::Io(e)),
        };
        sink.add_text(&converter.convert(&block[..n]));
        if let Some(status) = status {
            status.advance(n as u64);
            pacing.pause();
        }
    }
    sink.add_text(&converter.finish());
    Ok(converter.encoding())
}

/// End of the block starting at `start`: at most `block_size` bytes, rounded
/// down to a character boundary but always at least one character long.
fn block_end(rope: &Rope, start: usize, block_size: usize) -> usize {
    let limit = start.saturating_add(block_size).min(rope.len_bytes());
    let end = rope.char_to_byte(rope.byte_to_char(limit));
    if end > start {
        end
    } else {
        rope.char_to_byte(rope.byte_to_char(start) + 1)
    }
}

/// Encode `rope` into `out` block by block. Returns the number of bytes written.
pub fn write_rope<W: Write + ?Sized>(
    rope: &Rope,
    encoding: Encoding,
    out: &mut W,
    pacing: Pacing,
    status: Option<&WorkerStatus>,
) -> std::result::Result<u64, StreamError> {
    let mut writer = encoding::Writer::new(encoding);
    let mut bytes = Vec::with_capacity(pacing.block_size + 8);
    let mut written = 0u64;
    let len = rope.len_bytes();
    let mut start = 0;
    while start < len {
        if status.is_some_and(WorkerStatus::is_cancelled) {
            return Err(StreamError::Cancelled);
        }
        let end = block_end(rope, start, pacing.block_size);
        bytes.clear();
        for chunk in rope.byte_slice(start..end).chunks() {
            writer
                .encode(chunk, &mut bytes)
                .map_err(|encoding::Unmappable(character)| StreamError::Unmappable {
                    character,
                    encoding,
                })?;
        }
        out.write_all(&bytes).map_err(StreamError::Io)?;
        written += bytes.len() as u64;
        if let Some(status) = status {
            status.advance((end - start) as u64);
            pacing.pause();
        }
        start = end;
    }
    bytes.clear();
    writer.finish(&mut bytes);
    out.write_all(&bytes).map_err(StreamError::Io)?;
    out.flush().map_err(StreamError::Io)?;
    Ok(written + bytes.len() as u64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerKind {
    Load,
    Store,
}

/// A finished load: the document built off-thread plus the bytes consumed.
#[derive(Debug)]
pub struct Loaded {
    pub document: Document,
    pub bytes: u64,
}

#[derive(Debug)]
pub enum Outcome {
    Loaded(Result<Loaded>),
    /// Bytes written on success.
    Stored(Result<u64>),
}

/// The one message a worker sends when it stops, whatever the reason.
#[derive(Debug)]
pub struct Completion {
    pub buffer: BufferId,
    pub worker: WorkerId,
    pub outcome: Outcome,
}

/// Who a worker works for and where it reports.
pub struct Job {
    pub worker: WorkerId,
    pub buffer: BufferId,
    pub path: PathBuf,
    pub pacing: Pacing,
    pub completions: Sender<Completion>,
}

/// Handle to a running worker. Owned by the buffer it serves; dropping it
/// detaches the thread, whose completion is then discarded by the dispatcher.
#[derive(Debug)]
pub struct FileWorker {
    id: WorkerId,
    kind: WorkerKind,
    path: PathBuf,
    size: u64,
    progress_visible: bool,
    /// Document version captured for a store
    version: u64,
    status: Arc<WorkerStatus>,
    thread: JoinHandle<()>,
}

impl FileWorker {
    /// Start loading `file` into a fresh document.
    pub fn load(job: Job, file: File, size: u64) -> Result<Self> {
        let Job {
            worker,
            buffer,
            path,
            pacing,
            completions,
        } = job;
        let status = Arc::new(WorkerStatus::default());
        let shared = Arc::clone(&status);
        let thread_path = path.clone();
        let size_hint = usize::try_from(size).unwrap_or(0).saturating_add(1000);

        let thread = thread::Builder::new()
            .name(format!("load-{}", worker.0))
            .spawn(move || {
                let mut loader = Loader::new(size_hint);
                let result = read_stream(file, &mut loader, pacing, Some(&shared))
                    .map(|encoding| {
                        let mut document = loader.into_document();
                        document.set_encoding(encoding);
                        Loaded {
                            document,
                            bytes: shared.done(),
                        }
                    })
                    .map_err(|e| e.into_file_error(&thread_path, WorkerKind::Load));
                debug!(target: "io", %worker, path = %thread_path.display(), ok = result.is_ok(), "load finished");
                // A closed channel means the session is gone; nobody to tell.
                let _ = completions.send(Completion {
                    buffer,
                    worker,
                    outcome: Outcome::Loaded(result),
                });
            })
            .map_err(|source| FileError::ThreadStartFailure {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            id: worker,
            kind: WorkerKind::Load,
            path,
            size,
            progress_visible: true,
            version: 0,
            status,
            thread,
        })
    }

    /// Start writing `snapshot`, taken at document `version`, into `sink`.
    pub fn store(
        job: Job,
        snapshot: Rope,
        version: u64,
        encoding: Encoding,
        sink: Box<dyn SaveSink>,
        progress_visible: bool,
    ) -> Result<Self> {
        let Job {
            worker,
            buffer,
            path,
            pacing,
            completions,
        } = job;
        let status = Arc::new(WorkerStatus::default());
        let shared = Arc::clone(&status);
        let thread_path = path.clone();
        let size = snapshot.len_bytes() as u64;

        let thread = thread::Builder::new()
            .name(format!("store-{}", worker.0))
            .spawn(move || {
                let mut sink = sink;
                let result = write_rope(&snapshot, encoding, &mut sink, pacing, Some(&shared))
                    .and_then(|written| sink.commit().map(|()| written).map_err(StreamError::Io))
                    .map_err(|e| e.into_file_error(&thread_path, WorkerKind::Store));
                debug!(target: "io", %worker, path = %thread_path.display(), ok = result.is_ok(), "store finished");
                let _ = completions.send(Completion {
                    buffer,
                    worker,
                    outcome: Outcome::Stored(result),
                });
            })
            .map_err(|source| FileError::ThreadStartFailure {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            id: worker,
            kind: WorkerKind::Store,
            path,
            size,
            progress_visible,
            version,
            status,
            thread,
        })
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn kind(&self) -> WorkerKind {
        self.kind
    }

    pub fn is_loading(&self) -> bool {
        self.kind == WorkerKind::Load
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total units of work: file size for a load, document bytes for a store.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn progress(&self) -> u64 {
        self.status.done()
    }

    pub fn progress_visible(&self) -> bool {
        self.progress_visible
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Ask the worker to stop at its next block boundary.
    pub fn cancel(&self) {
        self.status.cancel();
    }

    pub fn is_cancelling(&self) -> bool {
        self.status.is_cancelled()
    }

    /// The thread has exited, whether or not it managed to report.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Reap the thread after its completion has been received.
    pub fn join(self) {
        if self.thread.join().is_err() {
            tracing::error!(target: "io", worker = %self.id, path = %self.path.display(), "worker thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn pacing(block_size: usize) -> Pacing {
        Pacing {
            block_size,
            sleep: Duration::ZERO,
        }
    }

    struct FailingWriter {
        budget: usize,
    }

    impl Write for FailingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Ok(0);
            }
            let n = buf.len().min(self.budget);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_block_end_rounds_to_char_boundary() {
        let rope = Rope::from_str("a\u{e9}\u{1F600}b");
        // byte 2 is inside é (bytes 1..3)
        assert_eq!(block_end(&rope, 0, 2), 1);
        // a block smaller than the character still makes progress
        assert_eq!(block_end(&rope, 3, 2), 7);
        assert_eq!(block_end(&rope, 7, 100), 8);
    }

    #[test]
    fn test_small_blocks_read_like_one_block() {
        let text = "caf\u{e9} \u{1F600}\r\n".repeat(2000);
        let bytes = encoding::encode_all(&text, Encoding::Utf16Be).unwrap();

        let mut whole = Loader::new(0);
        let enc_whole = read_stream(&bytes[..], &mut whole, pacing(1 << 20), None).unwrap();
        let mut pieces = Document::new();
        let enc_pieces = read_stream(&bytes[..], &mut pieces, pacing(17), None).unwrap();

        assert_eq!(enc_whole, Encoding::Utf16Be);
        assert_eq!(enc_pieces, Encoding::Utf16Be);
        assert_eq!(whole.into_document().text(), text);
        assert_eq!(pieces.text(), text);
    }

    #[test]
    fn test_write_rope_matches_encode_all() {
        let text = "h\u{e9}llo \u{a3}5 world\n".repeat(50);
        let rope = Rope::from_str(&text);
        for encoding in [Encoding::Utf8Bom, Encoding::Utf16Le, Encoding::EightBit] {
            let mut out = Vec::new();
            let written = write_rope(&rope, encoding, &mut out, pacing(16), None).unwrap();
            assert_eq!(written, out.len() as u64);
            assert_eq!(out, encoding::encode_all(&text, encoding).unwrap());
        }
    }

    #[test]
    fn test_short_write_is_an_error() {
        let rope = Rope::from_str(&"x".repeat(100));
        let mut out = FailingWriter { budget: 40 };
        let result = write_rope(&rope, Encoding::Utf8, &mut out, pacing(16), None);
        assert!(matches!(result, Err(StreamError::Io(_))));
    }

    #[test]
    fn test_unmappable_text_is_an_error() {
        let rope = Rope::from_str(&format!("{}\u{65e5}", "a".repeat(40)));
        let mut out = Vec::new();
        let result = write_rope(&rope, Encoding::EightBit, &mut out, pacing(16), None);
        match result {
            Err(StreamError::Unmappable { character, encoding }) => {
                assert_eq!(character, '\u{65e5}');
                assert_eq!(encoding, Encoding::EightBit);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        let error = StreamError::Unmappable {
            character: '\u{65e5}',
            encoding: Encoding::EightBit,
        }
        .into_file_error(Path::new("a.txt"), WorkerKind::Store);
        assert_eq!(error.kind(), "unrepresentable");
    }

    #[test]
    fn test_cancelled_status_stops_pipelines() {
        let status = WorkerStatus::default();
        status.cancel();
        let mut doc = Document::new();
        let read = read_stream(&b"abc"[..], &mut doc, pacing(16), Some(&status));
        assert!(matches!(read, Err(StreamError::Cancelled)));
        let write = write_rope(&Rope::from_str("abc"), Encoding::Utf8, &mut Vec::new(), pacing(16), Some(&status));
        assert!(matches!(write, Err(StreamError::Cancelled)));
    }

    #[test]
    fn test_load_worker_reports_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.txt");
        std::fs::write(&path, "first\nsecond\n").unwrap();
        let (tx, rx) = mpsc::channel();
        let job = Job {
            worker: WorkerId(7),
            buffer: BufferId(3),
            path: path.clone(),
            pacing: pacing(4),
            completions: tx,
        };
        let worker = FileWorker::load(job, File::open(&path).unwrap(), 13).unwrap();
        assert!(worker.is_loading());

        let completion = rx.recv().unwrap();
        assert_eq!(completion.buffer, BufferId(3));
        assert_eq!(completion.worker, WorkerId(7));
        match completion.outcome {
            Outcome::Loaded(Ok(loaded)) => {
                assert_eq!(loaded.document.text(), "first\nsecond\n");
                assert_eq!(loaded.bytes, 13);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(worker.progress(), 13);
        worker.join();
        // the sender went away with the thread
        assert!(rx.recv().is_err());
    }
}

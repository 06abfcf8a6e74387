//! This module constitutes the headless document I/O engine of docio.
//! It manages the open buffers, the worker threads that load and save them,
//! encoding and line-end detection, and the dispatch of worker results back
//! onto the controlling thread.

pub mod buffer;
pub mod buffers;
pub mod dispatcher;
pub mod document;
pub mod encoding;
pub mod eol;
pub mod error;
pub mod host;
pub mod id;
pub mod reload;
pub mod session;
pub mod storage;
pub mod worker;

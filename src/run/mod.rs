//! Batch execution for docio.
//!
//! Opens every file named on the command line through a session, lets the
//! background workers finish, optionally saves everything back, and prints a
//! one-line summary per buffer.

mod console;

use std::io;
use std::path::{Path, PathBuf};

use docio::config::{Config, IoSettings};
use docio::core::buffer::{Buffer, LifeState};
use docio::core::id::BufferId;
use docio::core::session::{OpenFlags, SaveFlags, Session};

use crate::cli::Cli;
use console::Console;

/// Validate and canonicalize file paths, refusing device files that would hang a read.
pub fn validate_file_path(path: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let canonical = path
        .canonicalize()
        .map_err(|e| format!("Invalid path '{}': {}", path.display(), e))?;

    // Block special file types that could hang or crash the reader
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;
        if let Ok(metadata) = std::fs::metadata(&canonical) {
            let ft = metadata.file_type();
            if ft.is_char_device() {
                return Err("Cannot open character device files (e.g., /dev/zero)".into());
            }
            if ft.is_block_device() {
                return Err("Cannot open block device files".into());
            }
            if ft.is_fifo() {
                return Err("Cannot open FIFO/named pipe files".into());
            }
            if ft.is_socket() {
                return Err("Cannot open socket files".into());
            }
        }
    }

    // Windows: block named pipes
    #[cfg(windows)]
    {
        let path_str = canonical.to_string_lossy();
        if path_str.starts_with(r"\\.\pipe\") || path_str.starts_with(r"\\?\pipe\") {
            return Err("Cannot open Windows named pipes".into());
        }
    }

    Ok(canonical)
}

/// One summary line: path, encoding, line ends, indentation, sizes, how it loaded.
pub fn describe(buffer: &Buffer, background: bool) -> String {
    let doc = &buffer.document;
    let indent = buffer
        .indent
        .map(|style| style.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{}\t{}\t{}\t{}\t{} chars\t{} lines\t{}",
        buffer.display_path().display(),
        doc.encoding().name(),
        doc.eol_mode(),
        indent,
        doc.len_chars(),
        doc.line_count(),
        if background { "background" } else { "foreground" }
    )
}

/// Run every file through a session.
pub fn run_batch(cli: &Cli, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let settings = IoSettings::from_config(config);
    let mut session = Session::new(settings).with_frontend(Box::new(Console::new(cli.yes)));
    let open_flags = if cli.sync {
        OpenFlags::SYNCHRONOUS
    } else {
        OpenFlags::NONE
    };
    let mut failures = 0;
    let mut opened: Vec<(BufferId, bool)> = Vec::new();

    for file in &cli.files {
        let result = if file.as_path() == Path::new("-") {
            session
                .open_from_reader(io::stdin().lock())
                .map_err(|e| e.to_string())
        } else {
            validate_file_path(file)
                .map_err(|e| e.to_string())
                .and_then(|path| session.open(path, open_flags).map_err(|e| e.to_string()))
        };
        match result {
            Ok(id) => {
                let background = session.buffer(id).is_some_and(Buffer::is_loading);
                opened.push((id, background));
            }
            Err(message) => {
                eprintln!("docio: {}", message);
                failures += 1;
            }
        }
    }

    session.wait_idle();

    for &(id, background) in &opened {
        // Background loads that finished out of view complete here
        session.switch_to(id)?;
        if let Some(buffer) = session.buffer(id) {
            if buffer.life_state() == LifeState::Opened {
                println!("{}", describe(buffer, background));
            } else {
                failures += 1;
            }
        }
    }

    if cli.resave {
        let mut save_flags = SaveFlags::PROGRESS_VISIBLE;
        if cli.sync {
            save_flags = save_flags | SaveFlags::SYNCHRONOUS;
        }
        for &(id, _) in &opened {
            let titled = session
                .buffer(id)
                .is_some_and(|b| !b.is_untitled() && b.life_state() == LifeState::Opened);
            if !titled {
                continue;
            }
            if let Err(e) = session.save(id, save_flags) {
                eprintln!("docio: {}", e);
                failures += 1;
            }
        }
        session.wait_idle();
        failures += session.buffers().iter().filter(|b| b.failed_save).count();
    }

    session.quit();

    if failures > 0 {
        return Err(format!("{} file(s) could not be processed", failures).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "one\r\n    two\r\n").unwrap();

        let settings = IoSettings {
            indent_auto: true,
            ..IoSettings::default()
        };
        let mut session = Session::new(settings);
        let id = session.open(&path, OpenFlags::NONE).unwrap();
        let line = describe(session.buffer(id).unwrap(), false);
        assert!(line.contains("a.txt"));
        assert!(line.contains("CRLF"));
        assert!(line.contains("4 spaces"));
        assert!(line.contains("3 lines"));
        assert!(line.ends_with("foreground"));
    }

    #[test]
    fn test_validate_rejects_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate_file_path(&dir.path().join("absent")).is_err());
        let present = dir.path().join("here.txt");
        std::fs::write(&present, "x").unwrap();
        assert!(validate_file_path(&present).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_validate_rejects_devices() {
        assert!(validate_file_path(Path::new("/dev/null")).is_err());
    }
}

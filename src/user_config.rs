// docio Configuration
// Edit this file to change the defaults the engine starts with.

use crate::config::Config;

/// User configuration function
pub fn configure(config: &mut Config) {
    // Thresholds (bytes). Files above these sizes are handled on a worker thread;
    // -1 sends every non-empty file to a worker.
    config.set("background_open_size", 1024 * 1024_i64);
    config.set("background_save_size", 1024 * 1024_i64);
    // Soft limit: larger files need confirmation. 0 disables the check.
    config.set("max_file_size", 2_000_000_000_i64);
    // Pause (ms) workers take between blocks
    config.set("asynchronous_sleep", 0_i64);
    config.set("io_block_size", 128 * 1024_i64);

    // Line ends and indentation
    #[cfg(windows)]
    config.set("eol_mode", "CRLF");
    #[cfg(not(windows))]
    config.set("eol_mode", "LF");
    config.set("eol_auto", true);
    config.set("indent_auto", false);
    config.set("tab_size", 8_i64);

    // Clean-ups before saving
    config.set("strip_trailing_spaces", false);
    config.set("ensure_final_line_end", false);
    config.set("ensure_consistent_line_ends", false);

    // Reload behaviour
    config.set("load_on_activate", true);
    config.set("are_you_sure_on_reload", false);
    config.set("reload_preserves_undo", false);
    config.set("save_check_modified_time", false);
    config.set("save_on_deactivate", false);
    config.set("read_only", false);
}

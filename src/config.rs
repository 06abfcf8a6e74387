// Configuration module
// Internal representation of user configuration, plus the typed view the
// document I/O engine reads its thresholds and policies from.

use std::collections::HashMap;
use std::time::Duration;

use crate::core::eol::EolMode;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub settings: HashMap<String, ConfigValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    String(String),
}

impl Config {
    /// Set a configuration value
    pub fn set<V: Into<ConfigValue>>(&mut self, key: &str, value: V) {
        self.settings.insert(key.to_string(), value.into());
    }

    /// Get a setting value
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.settings.get(key)
    }

    /// Get boolean setting
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| match v {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        })
    }

    /// Get integer setting
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| match v {
            ConfigValue::Int(i) => Some(*i),
            _ => None,
        })
    }

    /// Get string setting
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| match v {
            ConfigValue::String(s) => Some(s.as_str()),
            _ => None,
        })
    }

    /// Parse a `key=value` override. Integers and booleans are recognised,
    /// anything else is stored as a string.
    pub fn set_from_assignment(&mut self, assignment: &str) -> Result<(), String> {
        let (key, value) = assignment
            .split_once('=')
            .ok_or_else(|| format!("Expected KEY=VALUE, got '{}'", assignment))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("Missing key in '{}'", assignment));
        }
        let value = value.trim();
        if let Ok(i) = value.parse::<i64>() {
            self.set(key, i);
        } else if let Ok(b) = value.parse::<bool>() {
            self.set(key, b);
        } else {
            self.set(key, value);
        }
        Ok(())
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        ConfigValue::Bool(b)
    }
}

impl From<i64> for ConfigValue {
    fn from(i: i64) -> Self {
        ConfigValue::Int(i)
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::String(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::String(s)
    }
}

/// Typed settings consumed by the session. Built once from a [`Config`];
/// missing or mistyped keys fall back to the defaults below.
#[derive(Debug, Clone, PartialEq)]
pub struct IoSettings {
    /// Files larger than this load on a worker thread. `None` means every
    /// non-empty file does.
    pub background_open_size: Option<u64>,
    /// Documents larger than this save on a worker thread. `None` means always
    /// (unless only one buffer is open).
    pub background_save_size: Option<u64>,
    /// Soft limit on openable file size, overridable by confirmation.
    pub max_file_size: Option<u64>,
    /// Pause between blocks on worker threads.
    pub asynchronous_sleep: Duration,
    pub block_size: usize,
    pub eol_mode: EolMode,
    pub eol_auto: bool,
    pub indent_auto: bool,
    pub tab_size: usize,
    pub strip_trailing_spaces: bool,
    pub ensure_final_line_end: bool,
    pub ensure_consistent_line_ends: bool,
    pub load_on_activate: bool,
    pub are_you_sure_on_reload: bool,
    pub reload_preserves_undo: bool,
    pub save_check_modified_time: bool,
    pub save_on_deactivate: bool,
    pub read_only: bool,
}

pub const DEFAULT_BLOCK_SIZE: usize = 128 * 1024;

impl Default for IoSettings {
    fn default() -> Self {
        Self {
            background_open_size: Some(1024 * 1024),
            background_save_size: Some(1024 * 1024),
            max_file_size: Some(2_000_000_000),
            asynchronous_sleep: Duration::ZERO,
            block_size: DEFAULT_BLOCK_SIZE,
            eol_mode: EolMode::default(),
            eol_auto: true,
            indent_auto: false,
            tab_size: 8,
            strip_trailing_spaces: false,
            ensure_final_line_end: false,
            ensure_consistent_line_ends: false,
            load_on_activate: true,
            are_you_sure_on_reload: false,
            reload_preserves_undo: false,
            save_check_modified_time: false,
            save_on_deactivate: false,
            read_only: false,
        }
    }
}

/// Negative thresholds mean "no threshold".
fn threshold(value: i64) -> Option<u64> {
    u64::try_from(value).ok()
}

impl IoSettings {
    pub fn from_config(config: &Config) -> Self {
        let defaults = Self::default();
        let flag = |key: &str, default: bool| config.get_bool(key).unwrap_or(default);
        let size = |key: &str, default: Option<u64>| match config.get_int(key) {
            Some(v) => threshold(v),
            None => default,
        };

        Self {
            background_open_size: size("background_open_size", defaults.background_open_size),
            background_save_size: size("background_save_size", defaults.background_save_size),
            max_file_size: match config.get_int("max_file_size") {
                Some(v) if v > 0 => Some(v as u64),
                Some(_) => None,
                None => defaults.max_file_size,
            },
            asynchronous_sleep: config
                .get_int("asynchronous_sleep")
                .and_then(|ms| u64::try_from(ms).ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.asynchronous_sleep),
            block_size: config
                .get_int("io_block_size")
                .and_then(|b| usize::try_from(b).ok())
                .filter(|&b| b >= 16)
                .unwrap_or(defaults.block_size),
            eol_mode: config
                .get_string("eol_mode")
                .and_then(EolMode::from_name)
                .unwrap_or(defaults.eol_mode),
            eol_auto: flag("eol_auto", defaults.eol_auto),
            indent_auto: flag("indent_auto", defaults.indent_auto),
            tab_size: config
                .get_int("tab_size")
                .and_then(|t| usize::try_from(t).ok())
                .filter(|&t| t > 0)
                .unwrap_or(defaults.tab_size),
            strip_trailing_spaces: flag("strip_trailing_spaces", defaults.strip_trailing_spaces),
            ensure_final_line_end: flag("ensure_final_line_end", defaults.ensure_final_line_end),
            ensure_consistent_line_ends: flag(
                "ensure_consistent_line_ends",
                defaults.ensure_consistent_line_ends,
            ),
            load_on_activate: flag("load_on_activate", defaults.load_on_activate),
            are_you_sure_on_reload: flag("are_you_sure_on_reload", defaults.are_you_sure_on_reload),
            reload_preserves_undo: flag("reload_preserves_undo", defaults.reload_preserves_undo),
            save_check_modified_time: flag(
                "save_check_modified_time",
                defaults.save_check_modified_time,
            ),
            save_on_deactivate: flag("save_on_deactivate", defaults.save_on_deactivate),
            read_only: flag("read_only", defaults.read_only),
        }
    }
}

//! Where `settings.toml` lives.
//!
//! `VOICE_CHAT_CONFIG_DIR` wins when set and non-empty.  Otherwise the
//! file sits in a `voice-chat` folder under the platform config root
//! reported by `dirs` (`~/.config` on Linux, `Application Support` on
//! macOS, `%APPDATA%` on Windows), or under `.` when there is none.

use std::path::{Path, PathBuf};

/// Environment variable naming an explicit settings directory.
pub const CONFIG_DIR_ENV: &str = "VOICE_CHAT_CONFIG_DIR";

const APP_DIR: &str = "voice-chat";
const SETTINGS_FILE: &str = "settings.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub settings_file: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        match std::env::var_os(CONFIG_DIR_ENV).filter(|dir| !dir.is_empty()) {
            Some(dir) => Self::in_dir(dir),
            None => {
                let root = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
                Self::in_dir(root.join(APP_DIR))
            }
        }
    }

    /// Paths for a settings file kept directly in `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let config_dir = dir.as_ref().to_path_buf();
        Self {
            settings_file: config_dir.join(SETTINGS_FILE),
            config_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

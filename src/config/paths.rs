//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\avatar-client\
//!   macOS:   ~/Library/Application Support/avatar-client/
//!   Linux:   ~/.config/avatar-client/
//!
//! Data dir (recordings, avatar image):
//!   Windows: %LOCALAPPDATA%\avatar-client\
//!   macOS:   ~/Library/Application Support/avatar-client/
//!   Linux:   ~/.local/share/avatar-client/

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Directory for local media (the avatar reference image lives here by
    /// default).
    pub data_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "avatar-client";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let settings_file = config_dir.join("settings.toml");

        Self {
            config_dir,
            settings_file,
            data_dir,
        }
    }

    /// Default location of the still image the animation service animates.
    pub fn default_avatar_image(&self) -> PathBuf {
        self.data_dir.join("avatar.jpg")
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

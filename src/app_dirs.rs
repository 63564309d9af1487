//! Application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Config | `~/Library/Application Support/aceint/` | `~/.config/aceint/` |
//!
//! Set `ACEINT_CONFIG_DIR` to override the config directory.

use std::path::PathBuf;

/// Application config directory, holding `config.toml`.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("ACEINT_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("aceint"))
        .unwrap_or_else(|| PathBuf::from("/tmp/aceint-config"))
}

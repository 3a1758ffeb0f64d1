// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevant path information for external files that need to be
//! interacted with, or managed in some way.

use crate::config::TreeConfig;

use std::{fs, path::PathBuf};
use tracing::debug;

/// Determine default absolute path to the configuration file.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/treeline.toml`. Does not
/// check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("treeline.toml"))
        .ok_or(NoWayHome)
}

/// Load configuration from the default location.
///
/// A missing configuration file is not an error; the built-in defaults apply
/// in that case. A present but unparsable file is surfaced to the caller.
pub fn load_config() -> anyhow::Result<TreeConfig> {
    let path = default_config_path()?;
    if !path.exists() {
        debug!("no config at {}, using built-in defaults", path.display());
        return Ok(TreeConfig::default());
    }

    debug!("loading config from {}", path.display());
    Ok(fs::read_to_string(&path)?.parse()?)
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::config_dir`](https://docs.rs/dirs/latest/dirs/fn.config_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;

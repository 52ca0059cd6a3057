use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::common::paths::{self, MountLayout};

/// Optional operator settings, read from `/etc/diskclone/config.toml`.
///
/// Every field has a default, so a missing file behaves exactly like an empty one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory under which source and target filesystems are mounted
    pub mount_root: PathBuf,
    /// Run log capturing all output of every run
    pub log_file: PathBuf,
    /// Seconds to wait for device nodes after the partition table is re-read
    pub settle_secs: u64,
    /// `--bootloader-id` passed to grub-install
    pub bootloader_id: String,
    /// `--target` passed to grub-install
    pub efi_target: String,
    /// `owner/repo` used for updates when the binary is not inside a git checkout
    pub update_repository: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mount_root: PathBuf::from(paths::MOUNT_ROOT),
            log_file: PathBuf::from(paths::LOG_FILE),
            settle_secs: 2,
            bootloader_id: "ubuntu".to_string(),
            efi_target: "x86_64-efi".to_string(),
            update_repository: None,
        }
    }
}

impl Config {
    /// Load the config from an explicit path, or the default path if it exists.
    ///
    /// An explicitly requested file must exist; the default one is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load_from(path),
            None => {
                let default_path = Path::new(paths::CONFIG_FILE);
                if default_path.exists() {
                    Self::load_from(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn mount_layout(&self) -> MountLayout {
        MountLayout::new(&self.mount_root)
    }
}

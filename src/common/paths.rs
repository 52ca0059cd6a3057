use std::path::PathBuf;

/// Centralized path management for diskclone
/// This module provides a single source of truth for all default paths

pub const CONFIG_FILE: &str = "/etc/diskclone/config.toml";
pub const LOG_FILE: &str = "/var/log/diskclone.log";
pub const MOUNT_ROOT: &str = "/mnt/diskclone";

/// Filesystems projected into the cloned root before entering the chroot,
/// in acquisition order.
pub const CHROOT_BIND_MOUNTS: [&str; 5] = ["/dev", "/dev/pts", "/proc", "/sys", "/run"];

/// Where each side of the clone is mounted while the run is in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountLayout {
    root: PathBuf,
}

impl MountLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn source_root(&self) -> PathBuf {
        self.root.join("source-root")
    }

    pub fn target_root(&self) -> PathBuf {
        self.root.join("target-root")
    }

    pub fn source_efi(&self) -> PathBuf {
        self.root.join("source-efi")
    }

    pub fn target_efi(&self) -> PathBuf {
        self.root.join("target-efi")
    }

    /// The EFI mount inside the cloned root, as seen by the chroot.
    pub fn target_boot_efi(&self) -> PathBuf {
        self.chroot_path("/boot/efi")
    }

    pub fn chroot_path(&self, path: &str) -> PathBuf {
        self.target_root().join(path.trim_start_matches('/'))
    }
}

impl Default for MountLayout {
    fn default() -> Self {
        Self::new(MOUNT_ROOT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chroot_path_nests_under_target_root() {
        let layout = MountLayout::new("/mnt/diskclone");
        assert_eq!(
            layout.chroot_path("/dev/pts"),
            PathBuf::from("/mnt/diskclone/target-root/dev/pts")
        );
        assert_eq!(
            layout.target_boot_efi(),
            PathBuf::from("/mnt/diskclone/target-root/boot/efi")
        );
    }
}

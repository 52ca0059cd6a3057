use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered stages of a clone run. Each one is a precondition for the next.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CloneStage {
    /// Destroy the destination's partition table signatures
    WipeTable,
    /// Write the GPT label and the EFI/root/storage partitions
    CreatePartitions,
    /// Create FAT32, ext4 and exFAT filesystems
    FormatPartitions,
    /// Mount source and destination filesystems
    MountFilesystems,
    /// Mirror the running root filesystem
    CopyRoot,
    /// Mirror the EFI system partition, or start from a fresh one
    CopyEfi,
    /// Point the clone's fstab at the new partitions
    RewriteFstab,
    /// Install GRUB inside the clone
    InstallBootloader,
}

impl CloneStage {
    pub const ORDER: [CloneStage; 8] = [
        CloneStage::WipeTable,
        CloneStage::CreatePartitions,
        CloneStage::FormatPartitions,
        CloneStage::MountFilesystems,
        CloneStage::CopyRoot,
        CloneStage::CopyEfi,
        CloneStage::RewriteFstab,
        CloneStage::InstallBootloader,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CloneStage::WipeTable => "WipeTable",
            CloneStage::CreatePartitions => "CreatePartitions",
            CloneStage::FormatPartitions => "FormatPartitions",
            CloneStage::MountFilesystems => "MountFilesystems",
            CloneStage::CopyRoot => "CopyRoot",
            CloneStage::CopyEfi => "CopyEfi",
            CloneStage::RewriteFstab => "RewriteFstab",
            CloneStage::InstallBootloader => "InstallBootloader",
        }
    }

    /// 1-based position, used for "[3/8]" style progress lines.
    pub fn position(&self) -> usize {
        Self::ORDER
            .iter()
            .position(|s| s == self)
            .map(|i| i + 1)
            .unwrap_or(0)
    }

    pub fn code(&self) -> String {
        format!("clone.stage.{}", serde_plain_name(*self))
    }
}

fn serde_plain_name(stage: CloneStage) -> String {
    serde_json::to_value(stage)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| stage.name().to_lowercase())
}

impl fmt::Display for CloneStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

//! Target partition layout.
//!
//! The plan is computed once from the operator's inputs and never changes
//! afterwards; every stage reads its device names from here.

use serde::Serialize;
use std::fmt;

use super::error::CloneError;
use super::inventory::BlockDevice;

pub const MIN_ROOT_SIZE_GIB: u64 = 16;
pub const EFI_START_MIB: u64 = 1;
pub const EFI_SIZE_MIB: u64 = 512;
/// Smallest storage partition worth creating
pub const MIN_STORAGE_MIB: u64 = 1024;

const MIB: u64 = 1024 * 1024;

/// A partition boundary as parted understands it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Bound {
    MiB(u64),
    Percent(u8),
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::MiB(v) => write!(f, "{v}MiB"),
            Bound::Percent(p) => write!(f, "{p}%"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Filesystem {
    Fat32,
    Ext4,
    Exfat,
}

impl Filesystem {
    /// Filesystem type hint for `parted mkpart`.
    ///
    /// parted has no exfat type; fat32 yields the same Microsoft basic data GUID.
    pub fn parted_type(&self) -> &'static str {
        match self {
            Filesystem::Fat32 | Filesystem::Exfat => "fat32",
            Filesystem::Ext4 => "ext4",
        }
    }

    /// mkfs program and arguments, without the label and device.
    pub fn mkfs(&self) -> (&'static str, &'static [&'static str]) {
        match self {
            Filesystem::Fat32 => ("mkfs.fat", &["-F32", "-n"]),
            Filesystem::Ext4 => ("mkfs.ext4", &["-F", "-L"]),
            Filesystem::Exfat => ("mkfs.exfat", &["-n"]),
        }
    }
}

impl fmt::Display for Filesystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Filesystem::Fat32 => "fat32",
            Filesystem::Ext4 => "ext4",
            Filesystem::Exfat => "exfat",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionSpec {
    pub number: u32,
    pub device: String,
    pub start: Bound,
    pub end: Bound,
    pub filesystem: Filesystem,
    pub label: &'static str,
    pub esp: bool,
}

/// Where the running system lives, taken from the live mounts of `/` and `/boot/efi`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSystem {
    pub disk: String,
    pub root: String,
    pub efi: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClonePlan {
    source: SourceSystem,
    destination: String,
    efi: PartitionSpec,
    root: PartitionSpec,
    storage: PartitionSpec,
    root_size_gib: u64,
}

impl ClonePlan {
    pub fn source_disk(&self) -> &str {
        &self.source.disk
    }

    pub fn source_root(&self) -> &str {
        &self.source.root
    }

    pub fn source_efi(&self) -> Option<&str> {
        self.source.efi.as_deref()
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn efi(&self) -> &PartitionSpec {
        &self.efi
    }

    pub fn root(&self) -> &PartitionSpec {
        &self.root
    }

    pub fn storage(&self) -> &PartitionSpec {
        &self.storage
    }

    pub fn partitions(&self) -> [&PartitionSpec; 3] {
        [&self.efi, &self.root, &self.storage]
    }

    pub fn root_size_gib(&self) -> u64 {
        self.root_size_gib
    }
}

/// Parse the operator's root size answer. Only whole GiB are accepted.
pub fn parse_root_size(input: &str) -> Result<u64, CloneError> {
    let value = input.trim();
    let invalid = |reason: &str| CloneError::InvalidSize {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    if value.is_empty() {
        return Err(invalid("a size in GiB is required"));
    }
    if !value.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("must be a whole number of GiB"));
    }

    let size = value
        .parse::<u64>()
        .map_err(|_| invalid("number is too large"))?;
    validate_root_size(size)?;
    Ok(size)
}

pub fn validate_root_size(size_gib: u64) -> Result<(), CloneError> {
    if size_gib < MIN_ROOT_SIZE_GIB {
        return Err(CloneError::InvalidSize {
            value: size_gib.to_string(),
            reason: format!("must be at least {MIN_ROOT_SIZE_GIB} GiB"),
        });
    }
    Ok(())
}

/// Smallest disk, in MiB, that fits the layout for a given root size.
///
/// `None` when the size does not fit in a u64 of MiB.
pub fn required_capacity_mib(root_size_gib: u64) -> Option<u64> {
    root_end_mib(root_size_gib)?.checked_add(MIN_STORAGE_MIB)
}

fn root_end_mib(root_size_gib: u64) -> Option<u64> {
    root_size_gib
        .checked_mul(1024)?
        .checked_add(EFI_START_MIB + EFI_SIZE_MIB)
}

pub fn plan(
    source: &SourceSystem,
    destination: &BlockDevice,
    root_size_gib: u64,
) -> Result<ClonePlan, CloneError> {
    validate_root_size(root_size_gib)?;

    let (Some(root_end), Some(required_mib)) = (
        root_end_mib(root_size_gib),
        required_capacity_mib(root_size_gib),
    ) else {
        return Err(CloneError::InvalidSize {
            value: root_size_gib.to_string(),
            reason: "number is too large".to_string(),
        });
    };
    let available_mib = destination.size_bytes / MIB;
    if available_mib < required_mib {
        return Err(CloneError::InsufficientCapacity {
            device: destination.path.clone(),
            required_mib,
            available_mib,
        });
    }

    let disk = destination.path.as_str();
    let efi_end = EFI_START_MIB + EFI_SIZE_MIB;

    Ok(ClonePlan {
        source: source.clone(),
        destination: disk.to_string(),
        efi: PartitionSpec {
            number: 1,
            device: get_part_path(disk, 1),
            start: Bound::MiB(EFI_START_MIB),
            end: Bound::MiB(efi_end),
            filesystem: Filesystem::Fat32,
            label: "EFI",
            esp: true,
        },
        root: PartitionSpec {
            number: 2,
            device: get_part_path(disk, 2),
            start: Bound::MiB(efi_end),
            end: Bound::MiB(root_end),
            filesystem: Filesystem::Ext4,
            label: "UBUNTU",
            esp: false,
        },
        storage: PartitionSpec {
            number: 3,
            device: get_part_path(disk, 3),
            start: Bound::MiB(root_end),
            end: Bound::Percent(100),
            filesystem: Filesystem::Exfat,
            label: "STORAGE",
            esp: false,
        },
        root_size_gib,
    })
}

/// Kernel name of partition `part_num` on `disk` (`sdb` -> `sdb1`, `nvme0n1` -> `nvme0n1p1`).
pub fn get_part_path(disk: &str, part_num: u32) -> String {
    if disk.chars().last().is_some_and(|c| c.is_ascii_digit()) {
        format!("{}p{}", disk, part_num)
    } else {
        format!("{}{}", disk, part_num)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disk(path: &str, size_bytes: u64) -> BlockDevice {
        BlockDevice {
            path: path.to_string(),
            size_bytes,
            model: None,
            is_disk: true,
            partitions: Vec::new(),
        }
    }

    fn source() -> SourceSystem {
        SourceSystem {
            disk: "/dev/sda".into(),
            root: "/dev/sda2".into(),
            efi: Some("/dev/sda1".into()),
        }
    }

    #[test]
    fn test_get_part_path() {
        assert_eq!(get_part_path("/dev/sdb", 1), "/dev/sdb1");
        assert_eq!(get_part_path("/dev/nvme0n1", 3), "/dev/nvme0n1p3");
        assert_eq!(get_part_path("/dev/mmcblk0", 2), "/dev/mmcblk0p2");
        assert_eq!(get_part_path("/dev/loop0", 1), "/dev/loop0p1");
    }

    #[test]
    fn root_size_floor_is_sixteen() {
        assert!(matches!(
            parse_root_size("15"),
            Err(CloneError::InvalidSize { .. })
        ));
        assert_eq!(parse_root_size("16").unwrap(), 16);
        assert_eq!(parse_root_size(" 128 ").unwrap(), 128);
    }

    #[test]
    fn non_integer_sizes_are_rejected() {
        for input in ["", "abc", "12.5", "-20", "20G", "1e3"] {
            assert!(
                matches!(parse_root_size(input), Err(CloneError::InvalidSize { .. })),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn layout_for_128_gib_root_on_500_gb_disk() {
        let plan = plan(&source(), &disk("/dev/sdb", 500_000_000_000), 128).unwrap();

        let [efi, root, storage] = plan.partitions();
        assert_eq!(efi.device, "/dev/sdb1");
        assert_eq!((efi.start, efi.end), (Bound::MiB(1), Bound::MiB(513)));
        assert!(efi.esp);
        assert_eq!(root.device, "/dev/sdb2");
        assert_eq!(root.label, "UBUNTU");
        assert_eq!(root.start.to_string(), "513MiB");
        assert_eq!(root.end.to_string(), "131585MiB");
        assert_eq!(storage.device, "/dev/sdb3");
        assert_eq!(storage.end.to_string(), "100%");
        assert_eq!(storage.filesystem, Filesystem::Exfat);
        assert_eq!(plan.source_efi(), Some("/dev/sda1"));
    }

    #[test]
    fn nvme_destination_uses_p_separator() {
        let plan = plan(&source(), &disk("/dev/nvme0n1", 1_000_000_000_000), 64).unwrap();
        let names: Vec<_> = plan.partitions().iter().map(|p| p.device.clone()).collect();
        assert_eq!(names, ["/dev/nvme0n1p1", "/dev/nvme0n1p2", "/dev/nvme0n1p3"]);
    }

    #[test]
    fn too_small_destination_is_rejected() {
        // 20 GiB disk cannot hold a 20 GiB root plus EFI and storage
        let err = plan(&source(), &disk("/dev/sdb", 20 * 1024 * MIB), 20).unwrap_err();
        match err {
            CloneError::InsufficientCapacity {
                required_mib,
                available_mib,
                ..
            } => {
                assert_eq!(required_mib, 513 + 20 * 1024 + 1024);
                assert_eq!(available_mib, 20 * 1024);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn huge_root_size_is_refused_without_overflow() {
        let size = parse_root_size("18014398509481984").unwrap();
        let err = plan(&source(), &disk("/dev/sdb", 500_000_000_000), size).unwrap_err();
        assert!(matches!(err, CloneError::InvalidSize { .. }), "{err}");

        // Fits in u64 but not on any real disk
        let err = plan(&source(), &disk("/dev/sdb", 500_000_000_000), u64::MAX / 2048)
            .unwrap_err();
        assert!(matches!(err, CloneError::InsufficientCapacity { .. }), "{err}");

        assert_eq!(required_capacity_mib(u64::MAX), None);
    }
}

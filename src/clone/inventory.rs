//! Block devices and mount state, queried fresh on every call.

use serde::{Deserialize, Serialize};
use std::fs;
use std::os::unix::fs::FileTypeExt;

use super::error::CloneError;
use super::execution::{CommandRunner, CommandSpec, SystemRunner};

pub const LSBLK_COLUMNS: &str = "NAME,PATH,SIZE,MODEL,TYPE,FSTYPE,LABEL,MOUNTPOINTS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockDevice {
    pub path: String,
    pub size_bytes: u64,
    pub model: Option<String>,
    pub is_disk: bool,
    pub partitions: Vec<Partition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Partition {
    pub path: String,
    pub index: u32,
    pub size_bytes: u64,
    pub fs_type: Option<String>,
    pub label: Option<String>,
    /// Mount points of the partition and anything stacked on it (LVM, LUKS)
    pub mount_points: Vec<String>,
}

/// One row of the live mount table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountRecord {
    pub source: String,
    pub target: String,
    pub fstype: String,
}

/// Source of device and mount information.
pub trait DeviceProbe {
    fn block_devices(&self) -> Result<Vec<BlockDevice>, CloneError>;

    fn mount_table(&self) -> Result<Vec<MountRecord>, CloneError>;

    fn is_block_special(&self, path: &str) -> bool;

    /// Resolve symlinks such as `/dev/disk/by-id/...` to the kernel name.
    fn canonical_path(&self, path: &str) -> String {
        path.to_string()
    }
}

/// Reads `lsblk` and `/proc/self/mounts` on the host.
#[derive(Debug, Default)]
pub struct SystemProbe {
    runner: SystemRunner,
}

impl DeviceProbe for SystemProbe {
    fn block_devices(&self) -> Result<Vec<BlockDevice>, CloneError> {
        let spec = CommandSpec::new("lsblk")
            .args(["-J", "-b", "-o", LSBLK_COLUMNS])
            .read_only();
        let output = self.runner.run(&spec).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CloneError::MissingTool("lsblk".into())
            } else {
                CloneError::Io(e)
            }
        })?;
        if !output.success() {
            return Err(CloneError::ExternalCommand {
                command: spec.command_line(),
                status: output.status,
            });
        }
        parse_lsblk(&output.stdout)
    }

    fn mount_table(&self) -> Result<Vec<MountRecord>, CloneError> {
        let content = fs::read_to_string("/proc/self/mounts")?;
        Ok(parse_mount_table(&content))
    }

    fn is_block_special(&self, path: &str) -> bool {
        fs::metadata(path)
            .map(|m| m.file_type().is_block_device())
            .unwrap_or(false)
    }

    fn canonical_path(&self, path: &str) -> String {
        fs::canonicalize(path)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| path.to_string())
    }
}

#[derive(Deserialize)]
struct LsblkOutput {
    blockdevices: Vec<LsblkEntry>,
}

#[derive(Deserialize)]
struct LsblkEntry {
    name: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(deserialize_with = "deserialize_size")]
    size: u64,
    #[serde(default)]
    model: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    fstype: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default, alias = "mountpoint", deserialize_with = "deserialize_mountpoints")]
    mountpoints: Vec<String>,
    #[serde(default)]
    children: Vec<LsblkEntry>,
}

impl LsblkEntry {
    fn device_path(&self) -> String {
        self.path
            .clone()
            .unwrap_or_else(|| format!("/dev/{}", self.name))
    }

    fn nested_mountpoints(&self) -> Vec<String> {
        let mut all = self.mountpoints.clone();
        for child in &self.children {
            all.extend(child.nested_mountpoints());
        }
        all
    }
}

// Older lsblk prints sizes as strings even with -b
fn deserialize_size<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Sizeish {
        Num(u64),
        Str(String),
        Null,
    }

    match Sizeish::deserialize(deserializer)? {
        Sizeish::Num(n) => Ok(n),
        Sizeish::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
        Sizeish::Null => Ok(0),
    }
}

// `mountpoints` is a list with nulls; the older `mountpoint` column is a single value
fn deserialize_mountpoints<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<Option<String>>),
        One(Option<String>),
    }

    let points: Vec<String> = match OneOrMany::deserialize(deserializer)? {
        OneOrMany::Many(list) => list.into_iter().flatten().collect(),
        OneOrMany::One(single) => single.into_iter().collect(),
    };
    Ok(points.into_iter().filter(|p: &String| !p.is_empty()).collect())
}

/// Parse `lsblk -J -b` output into whole-disk entries with their partitions.
pub fn parse_lsblk(json: &str) -> Result<Vec<BlockDevice>, CloneError> {
    let output: LsblkOutput =
        serde_json::from_str(json).map_err(|e| CloneError::parse("lsblk output", e))?;

    let mut devices = Vec::new();
    for entry in output.blockdevices {
        let disk_path = entry.device_path();
        let is_disk = matches!(entry.kind.as_str(), "disk" | "loop");

        let partitions = entry
            .children
            .iter()
            .filter(|child| child.kind == "part")
            .enumerate()
            .map(|(ordinal, child)| {
                let path = child.device_path();
                Partition {
                    index: parse_partition_number(&disk_path, &path)
                        .unwrap_or(ordinal as u32 + 1),
                    path,
                    size_bytes: child.size,
                    fs_type: child.fstype.clone(),
                    label: child.label.clone(),
                    mount_points: child.nested_mountpoints(),
                }
            })
            .collect();

        devices.push(BlockDevice {
            path: disk_path,
            size_bytes: entry.size,
            model: entry
                .model
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty()),
            is_disk,
            partitions,
        });
    }
    Ok(devices)
}

/// Partition number from the kernel names of a disk and one of its partitions.
pub fn parse_partition_number(disk_path: &str, partition_path: &str) -> Option<u32> {
    let disk_name = disk_path.strip_prefix("/dev/").unwrap_or(disk_path);
    let part_name = partition_path
        .strip_prefix("/dev/")
        .unwrap_or(partition_path);

    let suffix = part_name.strip_prefix(disk_name)?;
    let suffix = if disk_name.ends_with(|c: char| c.is_ascii_digit()) {
        suffix.strip_prefix('p')?
    } else {
        suffix
    };
    suffix.parse().ok()
}

/// Parse `/proc/self/mounts`.
pub fn parse_mount_table(content: &str) -> Vec<MountRecord> {
    content
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let source = fields.next()?;
            let target = fields.next()?;
            let fstype = fields.next()?;
            Some(MountRecord {
                source: unescape_mount_field(source),
                target: unescape_mount_field(target),
                fstype: fstype.to_string(),
            })
        })
        .collect()
}

// The kernel escapes space, tab, newline and backslash as \ooo
fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\'
            && i + 3 < bytes.len()
            && bytes[i + 1..i + 4].iter().all(|b| (b'0'..=b'7').contains(b))
        {
            let octal = &field[i + 1..i + 4];
            if let Ok(value) = u8::from_str_radix(octal, 8) {
                out.push(value);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Human readable binary size, e.g. `465.8 GiB`.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// Device queries used by the gate, the planner and the status view.
pub struct Inventory<'a> {
    probe: &'a dyn DeviceProbe,
}

impl<'a> Inventory<'a> {
    pub fn new(probe: &'a dyn DeviceProbe) -> Self {
        Self { probe }
    }

    pub fn list_disks(&self) -> Result<Vec<BlockDevice>, CloneError> {
        Ok(self
            .probe
            .block_devices()?
            .into_iter()
            .filter(|d| d.is_disk && d.size_bytes > 0)
            .collect())
    }

    pub fn mount_table(&self) -> Result<Vec<MountRecord>, CloneError> {
        self.probe.mount_table()
    }

    /// Look up a disk or partition. Partitions come back with `is_disk == false`.
    pub fn describe(&self, id: &str) -> Result<BlockDevice, CloneError> {
        let path = self.probe.canonical_path(id);
        if !self.probe.is_block_special(&path) {
            return Err(CloneError::DeviceNotFound(id.to_string()));
        }

        for disk in self.probe.block_devices()? {
            if disk.path == path {
                return Ok(disk);
            }
            if let Some(part) = disk.partitions.iter().find(|p| p.path == path) {
                return Ok(BlockDevice {
                    path: part.path.clone(),
                    size_bytes: part.size_bytes,
                    model: disk.model.clone(),
                    is_disk: false,
                    partitions: Vec::new(),
                });
            }
        }

        Err(CloneError::DeviceNotFound(id.to_string()))
    }

    pub fn require_whole_disk(&self, id: &str) -> Result<BlockDevice, CloneError> {
        let device = self.describe(id)?;
        if !device.is_disk {
            return Err(CloneError::NotAWholeDisk(id.to_string()));
        }
        Ok(device)
    }

    /// `"<device> on <mount point>"` for the device and every partition on it.
    pub fn mounted_entries(&self, id: &str) -> Result<Vec<String>, CloneError> {
        let path = self.probe.canonical_path(id);
        let disks = self.probe.block_devices()?;
        let mounts = self.probe.mount_table()?;

        let mut owned = vec![path.clone()];
        let mut entries = Vec::new();
        if let Some(disk) = disks.iter().find(|d| d.path == path) {
            for part in &disk.partitions {
                owned.push(part.path.clone());
                for point in &part.mount_points {
                    entries.push(format!("{} on {}", part.path, point));
                }
            }
        }

        for record in &mounts {
            if !record.source.starts_with('/') {
                continue;
            }
            let source = self.probe.canonical_path(&record.source);
            if owned.contains(&source) {
                let entry = format!("{} on {}", source, record.target);
                if !entries.contains(&entry) {
                    entries.push(entry);
                }
            }
        }
        Ok(entries)
    }

    pub fn is_mounted(&self, id: &str) -> Result<bool, CloneError> {
        Ok(!self.mounted_entries(id)?.is_empty())
    }

    /// Device mounted at `target`. The most recent mount wins.
    pub fn mount_source(&self, target: &str) -> Result<Option<String>, CloneError> {
        Ok(self
            .probe
            .mount_table()?
            .into_iter()
            .rev()
            .find(|m| m.target == target && m.source.starts_with("/dev/"))
            .map(|m| self.probe.canonical_path(&m.source)))
    }

    /// Whole disk that owns `partition`.
    pub fn parent_disk(&self, partition: &str) -> Result<String, CloneError> {
        let path = self.probe.canonical_path(partition);
        self.probe
            .block_devices()?
            .into_iter()
            .find(|d| d.partitions.iter().any(|p| p.path == path))
            .map(|d| d.path)
            .ok_or_else(|| {
                CloneError::parse(
                    "source disk",
                    format!("{partition} is not a partition of any listed disk"),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LSBLK_JSON: &str = r#"{
       "blockdevices": [
          {"name":"sda", "path":"/dev/sda", "size":500107862016, "model":"Samsung SSD 860 ", "type":"disk", "fstype":null, "label":null, "mountpoints":[null],
             "children": [
                {"name":"sda1", "path":"/dev/sda1", "size":536870912, "model":null, "type":"part", "fstype":"vfat", "label":null, "mountpoints":["/boot/efi"]},
                {"name":"sda2", "path":"/dev/sda2", "size":499569893376, "model":null, "type":"part", "fstype":"ext4", "label":null, "mountpoints":["/"]}
             ]
          },
          {"name":"nvme0n1", "path":"/dev/nvme0n1", "size":"1000204886016", "model":"WD Blue", "type":"disk", "fstype":null, "label":null, "mountpoint":null,
             "children": [
                {"name":"nvme0n1p1", "path":"/dev/nvme0n1p1", "size":"1000203837440", "model":null, "type":"part", "fstype":"crypto_LUKS", "label":null, "mountpoint":null,
                   "children": [
                      {"name":"data", "path":"/dev/mapper/data", "size":"1000187060224", "model":null, "type":"crypt", "fstype":"ext4", "label":null, "mountpoint":"/srv"}
                   ]
                }
             ]
          },
          {"name":"sr0", "path":"/dev/sr0", "size":1073741312, "model":"DVD", "type":"rom", "fstype":null, "label":null, "mountpoints":[null]}
       ]
    }"#;

    #[test]
    fn parses_new_and_legacy_lsblk_columns() {
        let devices = parse_lsblk(LSBLK_JSON).unwrap();
        assert_eq!(devices.len(), 3);

        let sda = &devices[0];
        assert_eq!(sda.model.as_deref(), Some("Samsung SSD 860"));
        assert_eq!(sda.partitions[1].index, 2);
        assert_eq!(sda.partitions[1].mount_points, ["/"]);

        let nvme = &devices[1];
        assert_eq!(nvme.size_bytes, 1_000_204_886_016);
        assert_eq!(nvme.partitions[0].index, 1);
        assert_eq!(nvme.partitions[0].mount_points, ["/srv"]);

        assert!(!devices[2].is_disk);
    }

    #[test]
    fn malformed_lsblk_output_is_a_parse_error() {
        assert!(matches!(
            parse_lsblk("not json"),
            Err(CloneError::Parse { .. })
        ));
    }

    #[test]
    fn mount_table_decodes_octal_escapes() {
        let table = parse_mount_table(
            "/dev/sda2 / ext4 rw,relatime 0 0\n/dev/sdb1 /media/my\\040usb vfat rw 0 0\n",
        );
        assert_eq!(table.len(), 2);
        assert_eq!(table[1].target, "/media/my usb");
        assert_eq!(table[1].fstype, "vfat");
    }

    #[test]
    fn partition_numbers_follow_kernel_naming() {
        assert_eq!(parse_partition_number("/dev/sdb", "/dev/sdb3"), Some(3));
        assert_eq!(parse_partition_number("/dev/nvme0n1", "/dev/nvme0n1p2"), Some(2));
        assert_eq!(parse_partition_number("/dev/sdb", "/dev/sdc1"), None);
    }

    #[test]
    fn human_size_uses_binary_units() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(536_870_912), "512.0 MiB");
        assert_eq!(human_size(500_107_862_016), "465.8 GiB");
    }

    #[test]
    fn is_mounted_covers_child_partitions() {
        let mut probe = crate::clone::testing::FakeProbe::workstation();
        assert!(Inventory::new(&probe).is_mounted("/dev/sda").unwrap());
        assert!(!Inventory::new(&probe).is_mounted("/dev/sdb").unwrap());

        probe.mount("/dev/sdb1", "/media/usb", "ntfs");
        let inventory = Inventory::new(&probe);
        assert!(inventory.is_mounted("/dev/sdb").unwrap());
        assert_eq!(
            inventory.mounted_entries("/dev/sdb").unwrap(),
            ["/dev/sdb1 on /media/usb"]
        );
    }
}

use anyhow::Result;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use diskclone::clone::execution::{CommandOutput, CommandRunner, CommandSpec};
use diskclone::clone::gate::ConfirmationPrompt;
use diskclone::clone::inventory::{BlockDevice, DeviceProbe, MountRecord, Partition};
use diskclone::clone::{CloneError, CloneSession, CommandExecutor};
use diskclone::config::Config;

pub const GB_500: u64 = 500_000_000_000;

/// Scratch mount root plus a config pointing at it.
pub struct TestEnvironment {
    temp_dir: TempDir,
    config: Config,
}

impl TestEnvironment {
    pub fn new() -> Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let config = Config {
            mount_root: temp_dir.path().join("mnt"),
            log_file: temp_dir.path().join("diskclone.log"),
            settle_secs: 0,
            ..Config::default()
        };
        Ok(Self { temp_dir, config })
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The fstab rsync would have copied into the clone.
    pub fn seed_clone_fstab(&self, content: &str) -> Result<PathBuf> {
        let path = self.config.mount_layout().chroot_path("/etc/fstab");
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }
}

pub fn disk(path: &str, size_bytes: u64, partitions: Vec<Partition>) -> BlockDevice {
    BlockDevice {
        path: path.to_string(),
        size_bytes,
        model: Some("Test Disk".to_string()),
        is_disk: true,
        partitions,
    }
}

pub fn part(path: &str, index: u32, size_bytes: u64, fs: &str) -> Partition {
    Partition {
        path: path.to_string(),
        index,
        size_bytes,
        fs_type: Some(fs.to_string()),
        label: None,
        mount_points: Vec::new(),
    }
}

pub struct StaticProbe {
    pub disks: Vec<BlockDevice>,
    pub mounts: Vec<MountRecord>,
}

impl StaticProbe {
    /// Ubuntu on /dev/sda (EFI on sda1, root on sda2) and `destination` attached.
    pub fn ubuntu_with(destination: BlockDevice) -> Self {
        let sda = disk(
            "/dev/sda",
            256_060_514_304,
            vec![
                part("/dev/sda1", 1, 536_870_912, "vfat"),
                part("/dev/sda2", 2, 255_522_586_624, "ext4"),
            ],
        );
        Self {
            disks: vec![sda, destination],
            mounts: vec![
                mount_record("/dev/sda2", "/", "ext4"),
                mount_record("tmpfs", "/run", "tmpfs"),
                mount_record("/dev/sda1", "/boot/efi", "vfat"),
            ],
        }
    }
}

pub fn mount_record(source: &str, target: &str, fstype: &str) -> MountRecord {
    MountRecord {
        source: source.to_string(),
        target: target.to_string(),
        fstype: fstype.to_string(),
    }
}

impl DeviceProbe for StaticProbe {
    fn block_devices(&self) -> Result<Vec<BlockDevice>, CloneError> {
        Ok(self.disks.clone())
    }

    fn mount_table(&self) -> Result<Vec<MountRecord>, CloneError> {
        Ok(self.mounts.clone())
    }

    fn is_block_special(&self, path: &str) -> bool {
        self.disks
            .iter()
            .any(|d| d.path == path || d.partitions.iter().any(|p| p.path == path))
    }
}

pub struct TypedAnswer(pub String);

impl ConfirmationPrompt for TypedAnswer {
    fn read_confirmation(&self, _prompt: &str) -> Result<String, CloneError> {
        Ok(self.0.clone())
    }
}

#[derive(Default)]
struct TrackerState {
    lines: Vec<String>,
    active: Vec<String>,
    fail_on: Option<String>,
}

/// Tracks which mount points are live, the way the kernel would.
#[derive(Default)]
pub struct MountTracker {
    state: Mutex<TrackerState>,
}

impl MountTracker {
    pub fn fail_on(&self, needle: &str) {
        self.state.lock().unwrap().fail_on = Some(needle.to_string());
    }

    pub fn lines(&self) -> Vec<String> {
        self.state.lock().unwrap().lines.clone()
    }

    pub fn residual_mounts(&self) -> Vec<String> {
        self.state.lock().unwrap().active.clone()
    }

    pub fn lines_for(&self, program: &str) -> Vec<String> {
        let prefix = format!("{program} ");
        self.lines()
            .into_iter()
            .filter(|l| l.starts_with(&prefix))
            .collect()
    }
}

impl CommandRunner for MountTracker {
    fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput> {
        let mut state = self.state.lock().unwrap();
        let line = spec.command_line();
        state.lines.push(line.clone());

        if let Some(needle) = state.fail_on.clone()
            && line.contains(&needle)
        {
            state.fail_on = None;
            return Ok(CommandOutput {
                status: 1,
                stdout: String::new(),
                stderr: format!("{}: simulated failure", spec.program),
            });
        }

        let target = spec.args.last().cloned().unwrap_or_default();
        let mut stdout = String::new();
        match spec.program.as_str() {
            "mount" => state.active.push(target),
            "umount" => {
                if state.active.last() != Some(&target) {
                    return Ok(CommandOutput {
                        status: 32,
                        stdout,
                        stderr: format!("umount: {target}: target is busy"),
                    });
                }
                state.active.pop();
            }
            "blkid" => {
                let tag = spec.args.get(1).cloned().unwrap_or_default();
                stdout = format!("{}-{}\n", tag, target.trim_start_matches("/dev/"));
            }
            _ => {}
        }

        Ok(CommandOutput {
            status: 0,
            stdout,
            stderr: String::new(),
        })
    }

    fn has_program(&self, _name: &str) -> bool {
        true
    }
}

pub fn executor_with(tracker: &Arc<MountTracker>) -> CommandExecutor {
    CommandExecutor::with_runner(false, Box::new(tracker.clone()))
}

pub fn session<'a>(
    env: &'a TestEnvironment,
    probe: &'a StaticProbe,
    prompt: &'a TypedAnswer,
    executor: &'a CommandExecutor,
) -> CloneSession<'a> {
    CloneSession {
        probe,
        prompt,
        executor,
        config: env.config(),
    }
}

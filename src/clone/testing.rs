//! Fakes shared by the clone unit tests.

use std::cell::Cell;
use std::fs;
use std::io;
use std::sync::{Arc, Mutex};

use super::execution::{CommandExecutor, CommandOutput, CommandRunner, CommandSpec};
use super::gate::ConfirmationPrompt;
use super::interrupt;
use super::inventory::{BlockDevice, DeviceProbe, MountRecord, Partition};
use super::{CloneError, CloneSession};
use crate::config::Config;

const DISK_500GB: u64 = 500_107_862_016;

fn partition(path: &str, index: u32, size_bytes: u64, fs: &str, mount: Option<&str>) -> Partition {
    Partition {
        path: path.into(),
        index,
        size_bytes,
        fs_type: Some(fs.into()),
        label: None,
        mount_points: mount.into_iter().map(String::from).collect(),
    }
}

pub struct FakeProbe {
    pub disks: Vec<BlockDevice>,
    pub mounts: Vec<MountRecord>,
}

impl FakeProbe {
    /// Running system on /dev/sda, blank-ish 500 GB /dev/sdb attached.
    pub fn workstation() -> Self {
        let sda = BlockDevice {
            path: "/dev/sda".into(),
            size_bytes: DISK_500GB,
            model: Some("Samsung SSD 860".into()),
            is_disk: true,
            partitions: vec![
                partition("/dev/sda1", 1, 536_870_912, "vfat", Some("/boot/efi")),
                partition("/dev/sda2", 2, DISK_500GB - 537_919_488, "ext4", Some("/")),
            ],
        };
        let sdb = BlockDevice {
            path: "/dev/sdb".into(),
            size_bytes: DISK_500GB,
            model: Some("Crucial MX500".into()),
            is_disk: true,
            partitions: vec![partition("/dev/sdb1", 1, DISK_500GB - 1_048_576, "ntfs", None)],
        };

        let record = |source: &str, target: &str, fstype: &str| MountRecord {
            source: source.into(),
            target: target.into(),
            fstype: fstype.into(),
        };
        Self {
            disks: vec![sda, sdb],
            mounts: vec![
                record("sysfs", "/sys", "sysfs"),
                record("proc", "/proc", "proc"),
                record("/dev/sda2", "/", "ext4"),
                record("/dev/sda1", "/boot/efi", "vfat"),
            ],
        }
    }

    pub fn mount(&mut self, source: &str, target: &str, fstype: &str) {
        self.mounts.push(MountRecord {
            source: source.into(),
            target: target.into(),
            fstype: fstype.into(),
        });
    }

    pub fn unmount(&mut self, target: &str) {
        self.mounts.retain(|m| m.target != target);
    }
}

impl DeviceProbe for FakeProbe {
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

pub struct FakePrompt {
    answer: String,
    asked: Cell<usize>,
}

impl FakePrompt {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: answer.into(),
            asked: Cell::new(0),
        }
    }

    pub fn asked(&self) -> usize {
        self.asked.get()
    }
}

impl ConfirmationPrompt for FakePrompt {
    fn read_confirmation(&self, _prompt: &str) -> Result<String, CloneError> {
        self.asked.set(self.asked.get() + 1);
        Ok(self.answer.clone())
    }
}

#[derive(Default)]
struct RecorderState {
    commands: Vec<(CommandSpec, i32)>,
    fail: Option<(String, i32)>,
    interrupt_after: Option<String>,
}

/// Records every command and answers `blkid` queries with stable fake ids.
#[derive(Default)]
pub struct RecordingRunner {
    state: Mutex<RecorderState>,
}

impl RecordingRunner {
    /// Fail the first command whose line contains `needle`.
    pub fn fail_when(&self, needle: &str, status: i32) {
        self.state.lock().unwrap().fail = Some((needle.into(), status));
    }

    /// Raise the interrupt flag once a command containing `needle` succeeds.
    pub fn interrupt_after(&self, needle: &str) {
        self.state.lock().unwrap().interrupt_after = Some(needle.into());
    }

    pub fn commands(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.commands.iter().map(|(c, _)| c.command_line()).collect()
    }

    pub fn programs(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.commands.iter().map(|(c, _)| c.program.clone()).collect()
    }

    /// Successful invocations of `program`.
    pub fn count(&self, program: &str) -> usize {
        let state = self.state.lock().unwrap();
        state
            .commands
            .iter()
            .filter(|(c, status)| c.program == program && *status == 0)
            .count()
    }

    pub fn last_program(&self) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.commands.last().map(|(c, _)| c.program.clone())
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput> {
        let mut state = self.state.lock().unwrap();
        let line = spec.command_line();

        let mut status = 0;
        if let Some((needle, code)) = state.fail.clone()
            && line.contains(&needle)
        {
            status = code;
            state.fail = None;
        }
        if status == 0
            && let Some(needle) = state.interrupt_after.clone()
            && line.contains(&needle)
        {
            interrupt::request_interrupt();
            state.interrupt_after = None;
        }

        let stdout = if spec.program == "blkid" && status == 0 {
            let tag = spec.args.get(1).cloned().unwrap_or_default().to_lowercase();
            let device = spec.args.last().cloned().unwrap_or_default();
            format!("{}-{}\n", tag, device.trim_start_matches("/dev/"))
        } else {
            String::new()
        };

        state.commands.push((spec.clone(), status));
        Ok(CommandOutput {
            status,
            stdout,
            stderr: String::new(),
        })
    }

    fn has_program(&self, _name: &str) -> bool {
        true
    }
}

pub struct Fixture {
    pub probe: FakeProbe,
    pub runner: Arc<RecordingRunner>,
    pub executor: CommandExecutor,
    pub config: Config,
    _dir: tempfile::TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self::build(false)
    }

    pub fn dry_run() -> Self {
        Self::build(true)
    }

    fn build(dry_run: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            mount_root: dir.path().to_path_buf(),
            log_file: dir.path().join("diskclone.log"),
            settle_secs: 0,
            ..Config::default()
        };

        // What rsync would have copied over
        let etc = config.mount_layout().chroot_path("/etc");
        fs::create_dir_all(&etc).unwrap();
        fs::write(
            etc.join("fstab"),
            "UUID=uuid-sda2 / ext4 errors=remount-ro 0 1\nUUID=uuid-sda1 /boot/efi vfat umask=0077 0 1\n",
        )
        .unwrap();

        let runner = Arc::new(RecordingRunner::default());
        let executor = CommandExecutor::with_runner(dry_run, Box::new(runner.clone()));
        Self {
            probe: FakeProbe::workstation(),
            runner,
            executor,
            config,
            _dir: dir,
        }
    }

    pub fn session<'a>(&'a self, prompt: &'a FakePrompt) -> CloneSession<'a> {
        CloneSession {
            probe: &self.probe,
            prompt,
            executor: &self.executor,
            config: &self.config,
        }
    }

    pub fn fstab(&self) -> String {
        fs::read_to_string(self.config.mount_layout().chroot_path("/etc/fstab")).unwrap()
    }
}

//! Scoped mounts.
//!
//! Every successful mount is pushed onto a stack and popped in reverse order.
//! Dropping the scope releases whatever is left, so no exit path leaks a mount.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use super::error::CloneError;
use super::execution::{CommandExecutor, CommandSpec};
use crate::ui::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MountKind {
    Filesystem,
    Bind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountHandle {
    pub source: String,
    pub mount_point: PathBuf,
    pub kind: MountKind,
}

/// Stack depth to unwind back to with [`MountScope::release_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(usize);

pub struct MountScope<'a> {
    executor: &'a CommandExecutor,
    stack: Vec<MountHandle>,
}

impl<'a> MountScope<'a> {
    pub fn new(executor: &'a CommandExecutor) -> Self {
        Self {
            executor,
            stack: Vec::new(),
        }
    }

    pub fn active(&self) -> &[MountHandle] {
        &self.stack
    }

    /// Mount `source` on `mount_point`, creating the directory first.
    pub fn acquire(
        &mut self,
        source: &str,
        mount_point: &Path,
        kind: MountKind,
    ) -> Result<MountHandle, CloneError> {
        if !self.executor.dry_run {
            fs::create_dir_all(mount_point)?;
        }

        let target = mount_point.to_string_lossy();
        let spec = match kind {
            MountKind::Filesystem => CommandSpec::new("mount").arg(source).arg(target),
            MountKind::Bind => CommandSpec::new("mount")
                .arg("--bind")
                .arg(source)
                .arg(target),
        };
        self.executor.run(&spec)?;

        let handle = MountHandle {
            source: source.to_string(),
            mount_point: mount_point.to_path_buf(),
            kind,
        };
        emit(
            Level::Debug,
            "mount.acquire",
            &format!("mounted {} on {}", source, mount_point.display()),
            None,
        );
        self.stack.push(handle.clone());
        Ok(handle)
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.stack.len())
    }

    /// Unmount everything acquired after `checkpoint`, newest first.
    ///
    /// Failures are logged, never returned. Returns how many entries were popped.
    pub fn release_to(&mut self, checkpoint: Checkpoint) -> usize {
        let mut released = 0;
        while self.stack.len() > checkpoint.0 {
            let Some(handle) = self.stack.pop() else {
                break;
            };
            self.unmount(&handle);
            released += 1;
        }
        released
    }

    pub fn release_all(&mut self) -> usize {
        self.release_to(Checkpoint(0))
    }

    fn unmount(&self, handle: &MountHandle) {
        let target = handle.mount_point.to_string_lossy().into_owned();
        if self
            .executor
            .run(&CommandSpec::new("umount").arg(target.as_str()))
            .is_ok()
        {
            emit(
                Level::Debug,
                "mount.release",
                &format!("unmounted {}", target),
                None,
            );
            return;
        }

        // Lazy detach so a busy mount point is still gone once its users exit
        match self
            .executor
            .run(&CommandSpec::new("umount").arg("-l").arg(target.as_str()))
        {
            Ok(_) => emit(
                Level::Warn,
                "mount.release.lazy",
                &format!(
                    "{} {} was busy; detached lazily",
                    char::from(NerdFont::Warning),
                    target
                ),
                None,
            ),
            Err(err) => emit(
                Level::Error,
                "mount.release.failed",
                &format!(
                    "{} Could not unmount {}: {}. Unmount it manually.",
                    char::from(NerdFont::CrossCircle),
                    target,
                    err
                ),
                None,
            ),
        }
    }
}

impl Drop for MountScope<'_> {
    fn drop(&mut self) {
        if !self.stack.is_empty() {
            self.release_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clone::execution::{CommandOutput, CommandRunner};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        commands: Mutex<Vec<String>>,
        fail_umount: bool,
    }

    impl CommandRunner for Recorder {
        fn run(&self, spec: &CommandSpec) -> std::io::Result<CommandOutput> {
            self.commands.lock().unwrap().push(spec.command_line());
            let status = if self.fail_umount && spec.program == "umount" && spec.args.len() == 1 {
                32
            } else {
                0
            };
            Ok(CommandOutput {
                status,
                ..Default::default()
            })
        }
    }

    #[test]
    fn releases_in_reverse_order_of_acquisition() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Arc::new(Recorder::default());
        let executor = CommandExecutor::with_runner(false, Box::new(recorder.clone()));

        let root = dir.path().join("root");
        let dev = root.join("dev");
        {
            let mut scope = MountScope::new(&executor);
            scope.acquire("/dev/sdb2", &root, MountKind::Filesystem).unwrap();
            scope.acquire("/dev", &dev, MountKind::Bind).unwrap();
            assert_eq!(scope.active().len(), 2);
            assert_eq!(scope.release_all(), 2);
        }

        let commands = recorder.commands.lock().unwrap();
        assert_eq!(
            *commands,
            vec![
                format!("mount /dev/sdb2 {}", root.display()),
                format!("mount --bind /dev {}", dev.display()),
                format!("umount {}", dev.display()),
                format!("umount {}", root.display()),
            ]
        );
    }

    #[test]
    fn checkpoint_only_unwinds_newer_mounts() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Arc::new(Recorder::default());
        let executor = CommandExecutor::with_runner(false, Box::new(recorder.clone()));
        let mut scope = MountScope::new(&executor);

        scope
            .acquire("/dev/sdb2", &dir.path().join("a"), MountKind::Filesystem)
            .unwrap();
        let cp = scope.checkpoint();
        scope
            .acquire("/proc", &dir.path().join("b"), MountKind::Bind)
            .unwrap();

        assert_eq!(scope.release_to(cp), 1);
        assert_eq!(scope.active().len(), 1);
        assert_eq!(scope.active()[0].source, "/dev/sdb2");
    }

    #[test]
    fn drop_releases_leftovers_and_falls_back_to_lazy_unmount() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Arc::new(Recorder {
            fail_umount: true,
            ..Default::default()
        });
        let executor = CommandExecutor::with_runner(false, Box::new(recorder.clone()));
        let point = dir.path().join("busy");
        {
            let mut scope = MountScope::new(&executor);
            scope.acquire("/dev/sdb1", &point, MountKind::Filesystem).unwrap();
        }

        let commands = recorder.commands.lock().unwrap();
        assert_eq!(commands.len(), 3);
        assert_eq!(commands[2], format!("umount -l {}", point.display()));
    }
}

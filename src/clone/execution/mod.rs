use std::sync::Arc;

pub mod bootloader;
pub mod copy;
pub mod disk;
pub mod fstab;
pub mod runner;
pub mod stage;

pub use self::runner::{CommandOutput, CommandRunner, CommandSpec, SystemRunner};
pub use self::stage::CloneStage;

use super::RunResult;
use super::error::CloneError;
use super::interrupt::{self, PipelineGuard};
use super::mounts::MountScope;
use super::planner::ClonePlan;
use crate::common::paths::MountLayout;
use crate::common::progress::{create_spinner, finish_spinner_with_success};
use crate::config::Config;
use crate::ui::prelude::*;

/// Every tool the pipeline may invoke.
pub const REQUIRED_TOOLS: [&str; 14] = [
    "wipefs",
    "parted",
    "partprobe",
    "udevadm",
    "mkfs.fat",
    "mkfs.ext4",
    "mkfs.exfat",
    "mount",
    "umount",
    "rsync",
    "blkid",
    "chroot",
    "lsblk",
    "sync",
];

pub struct CommandExecutor {
    pub dry_run: bool,
    runner: Box<dyn CommandRunner>,
}

impl CommandExecutor {
    pub fn new(dry_run: bool) -> Self {
        Self::with_runner(dry_run, Box::new(SystemRunner))
    }

    pub fn with_runner(dry_run: bool, runner: Box<dyn CommandRunner>) -> Self {
        Self { dry_run, runner }
    }

    pub fn has_program(&self, name: &str) -> bool {
        self.runner.has_program(name)
    }

    /// Run a command that changes system state. Only printed in dry-run mode.
    pub fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CloneError> {
        if self.dry_run && !spec.read_only {
            self.print_dry_run(spec);
            return Ok(CommandOutput::default());
        }
        self.execute(spec)
    }

    /// Run a read-only query. Executes even in dry-run mode.
    pub fn query(&self, spec: &CommandSpec) -> Result<CommandOutput, CloneError> {
        self.execute(&spec.clone().read_only())
    }

    fn execute(&self, spec: &CommandSpec) -> Result<CommandOutput, CloneError> {
        let line = spec.command_line();
        emit(Level::Debug, "exec.command", &format!("$ {line}"), None);

        let spinner = match (&spec.description, spec.stream_output) {
            (Some(message), false) if get_output_format() == OutputFormat::Text => {
                Some(create_spinner(message.clone()))
            }
            _ => None,
        };

        let result = self.runner.run(spec);

        let output = match result {
            Ok(output) => output,
            Err(err) => {
                if let Some(pb) = spinner {
                    pb.finish_and_clear();
                }
                if err.kind() == std::io::ErrorKind::NotFound {
                    return Err(CloneError::MissingTool(spec.program.clone()));
                }
                return Err(CloneError::Io(err));
            }
        };

        if !output.stdout.trim().is_empty() {
            crate::ui::log_only("exec.stdout", &output.stdout);
        }
        if !output.stderr.trim().is_empty() {
            crate::ui::log_only("exec.stderr", &output.stderr);
        }

        if !output.success() {
            if let Some(pb) = spinner {
                pb.finish_and_clear();
            }
            let tail = output
                .stderr
                .lines()
                .rev()
                .take(5)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            if !tail.is_empty() {
                emit(Level::Warn, "exec.stderr", &tail, None);
            }
            return Err(CloneError::ExternalCommand {
                command: line,
                status: output.status,
            });
        }

        if let (Some(pb), Some(message)) = (spinner, &spec.description) {
            finish_spinner_with_success(pb, message.clone());
        }
        Ok(output)
    }

    fn print_dry_run(&self, spec: &CommandSpec) {
        let cmd_str = spec.command_line();
        crate::ui::log_only("exec.dry_run", &cmd_str);

        println!("[DRY RUN] {}", cmd_str);
    }
}

impl<T: CommandRunner + ?Sized> CommandRunner for Arc<T> {
    fn run(&self, spec: &CommandSpec) -> std::io::Result<CommandOutput> {
        (**self).run(spec)
    }

    fn has_program(&self, name: &str) -> bool {
        (**self).has_program(name)
    }
}

/// Fail early when a tool the pipeline needs is not installed.
pub fn preflight(executor: &CommandExecutor) -> Result<(), CloneError> {
    let missing: Vec<&str> = REQUIRED_TOOLS
        .iter()
        .copied()
        .filter(|tool| !executor.has_program(tool))
        .collect();

    let Some(first) = missing.first() else {
        return Ok(());
    };

    if executor.dry_run {
        emit(
            Level::Warn,
            "clone.preflight.missing",
            &format!(
                "{} Missing tools (ignored in dry-run): {}",
                char::from(NerdFont::Warning),
                missing.join(", ")
            ),
            None,
        );
        return Ok(());
    }
    Err(CloneError::MissingTool(first.to_string()))
}

/// Everything a stage needs to do its work.
pub struct StageContext<'a> {
    pub plan: &'a ClonePlan,
    pub executor: &'a CommandExecutor,
    pub config: &'a Config,
    pub layout: MountLayout,
}

fn run_stage(
    stage: CloneStage,
    ctx: &StageContext<'_>,
    scope: &mut MountScope<'_>,
) -> Result<(), CloneError> {
    match stage {
        CloneStage::WipeTable => disk::wipe_table(ctx),
        CloneStage::CreatePartitions => disk::create_partitions(ctx),
        CloneStage::FormatPartitions => disk::format_partitions(ctx),
        CloneStage::MountFilesystems => disk::mount_filesystems(ctx, scope),
        CloneStage::CopyRoot => copy::copy_root(ctx),
        CloneStage::CopyEfi => copy::copy_efi(ctx),
        CloneStage::RewriteFstab => fstab::rewrite_fstab(ctx),
        CloneStage::InstallBootloader => bootloader::install(ctx, scope),
    }
}

/// Run every stage in order. Mounts are always released before this returns.
pub fn execute_plan(plan: &ClonePlan, executor: &CommandExecutor, config: &Config) -> RunResult {
    let _guard = PipelineGuard::enter();

    if executor.dry_run {
        emit(
            Level::Warn,
            "clone.dry_run",
            "*** DRY RUN MODE ENABLED - No changes will be made ***",
            None,
        );
    }

    let ctx = StageContext {
        plan,
        executor,
        config,
        layout: config.mount_layout(),
    };
    let mut scope = MountScope::new(executor);
    let total = CloneStage::ORDER.len();
    let mut failure = None;

    for stage in CloneStage::ORDER {
        if interrupt::interrupted() {
            failure = Some((stage, CloneError::Interrupted));
            break;
        }

        emit(
            Level::Info,
            &stage.code(),
            &format!(
                "{} [{}/{}] {}",
                char::from(NerdFont::Gear),
                stage.position(),
                total,
                stage.name()
            ),
            None,
        );

        if let Err(cause) = run_stage(stage, &ctx, &mut scope) {
            failure = Some((stage, cause));
            break;
        }
    }

    match failure {
        None => {
            scope.release_all();
            RunResult::Completed
        }
        Some((stage, cause)) => {
            let status = cause
                .exit_status()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "n/a".to_string());
            emit(
                Level::Error,
                "clone.stage.failed",
                &format!(
                    "{} Stage {} failed (exit status {}): {}",
                    char::from(NerdFont::CrossCircle),
                    stage.name(),
                    status,
                    cause
                ),
                Some(serde_json::json!({
                    "stage": stage,
                    "exit_status": cause.exit_status(),
                })),
            );
            let released = scope.release_all();
            emit(
                Level::Info,
                "clone.teardown",
                &format!(
                    "{} Teardown complete ({} mount{} released)",
                    char::from(NerdFont::Trash),
                    released,
                    if released == 1 { "" } else { "s" }
                ),
                None,
            );
            RunResult::Failed { stage, cause }
        }
    }
}

//! The clone workflow: inventory, confirmation, planning and execution.

use serde::Serialize;

pub mod error;
pub mod execution;
pub mod gate;
pub mod interrupt;
pub mod inventory;
pub mod logging;
pub mod mounts;
pub mod planner;
pub mod status;

#[cfg(test)]
pub(crate) mod testing;

pub use self::error::CloneError;
pub use self::execution::{CloneStage, CommandExecutor};

use self::gate::{Confirmation, ConfirmationPrompt};
use self::inventory::{DeviceProbe, Inventory};
use self::planner::{ClonePlan, SourceSystem};
use crate::config::Config;
use crate::ui::prelude::*;

/// Outcome of one clone run.
#[derive(Debug)]
pub enum RunResult {
    Completed,
    AbortedByUser,
    Failed { stage: CloneStage, cause: CloneError },
}

impl RunResult {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunResult::Completed => 0,
            RunResult::AbortedByUser => 2,
            RunResult::Failed { .. } => 1,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RunResult::Completed)
    }

    /// Print the final summary line.
    pub fn report(&self) {
        #[derive(Serialize)]
        struct Summary<'a> {
            result: &'a str,
            exit_code: i32,
            #[serde(skip_serializing_if = "Option::is_none")]
            stage: Option<CloneStage>,
            #[serde(skip_serializing_if = "Option::is_none")]
            exit_status: Option<i32>,
        }

        let (level, result, message) = match self {
            RunResult::Completed => (
                Level::Success,
                "completed",
                format!(
                    "{} Clone completed. The new disk is ready to boot.",
                    char::from(NerdFont::Check)
                ),
            ),
            RunResult::AbortedByUser => (
                Level::Info,
                "aborted",
                format!(
                    "{} Clone aborted by user; no changes were made.",
                    char::from(NerdFont::Info)
                ),
            ),
            RunResult::Failed { stage, cause } => (
                Level::Error,
                "failed",
                format!(
                    "{} Clone failed during {}: {}",
                    char::from(NerdFont::CrossCircle),
                    stage,
                    cause
                ),
            ),
        };

        let (stage, exit_status) = match self {
            RunResult::Failed { stage, cause } => (Some(*stage), cause.exit_status()),
            _ => (None, None),
        };
        let summary = Summary {
            result,
            exit_code: self.exit_code(),
            stage,
            exit_status,
        };
        emit(level, "clone.result", &message, serde_json::to_value(summary).ok());
    }
}

/// Everything a clone run talks to. Tests substitute the probe, prompt and runner.
pub struct CloneSession<'a> {
    pub probe: &'a dyn DeviceProbe,
    pub prompt: &'a dyn ConfirmationPrompt,
    pub executor: &'a CommandExecutor,
    pub config: &'a Config,
}

impl CloneSession<'_> {
    /// The running system: whatever is mounted at `/` and `/boot/efi`.
    pub fn detect_source(&self) -> Result<SourceSystem, CloneError> {
        let inventory = Inventory::new(self.probe);
        let root = inventory.mount_source("/")?.ok_or_else(|| {
            CloneError::parse("mount table", "no block device is mounted at /")
        })?;
        let disk = inventory.parent_disk(&root)?;
        let efi = inventory.mount_source("/boot/efi")?;

        if efi.is_none() {
            emit(
                Level::Warn,
                "clone.source.no_efi",
                &format!(
                    "{} Nothing is mounted at /boot/efi; the clone gets a fresh EFI partition",
                    char::from(NerdFont::Warning)
                ),
                None,
            );
        }
        Ok(SourceSystem { disk, root, efi })
    }

    /// Validate inputs and ask for confirmation. `UserAborted` means the operator declined.
    ///
    /// Errors returned here are validation errors; no device has been touched.
    pub fn prepare(
        &self,
        destination: &str,
        root_size: &str,
    ) -> Result<ClonePlan, CloneError> {
        let root_size_gib = planner::parse_root_size(root_size)?;
        execution::preflight(self.executor)?;

        let source = self.detect_source()?;
        let inventory = Inventory::new(self.probe);

        match gate::confirm_destructive(&inventory, self.prompt, &source.disk, destination)? {
            Confirmation::Rejected => return Err(CloneError::UserAborted),
            Confirmation::Accepted => {}
        }

        let target = inventory.require_whole_disk(destination)?;
        let plan = planner::plan(&source, &target, root_size_gib)?;
        crate::ui::log_only(
            "clone.plan",
            &serde_json::to_string(&plan).unwrap_or_default(),
        );
        Ok(plan)
    }

    /// Full run: validation, confirmation, then every stage.
    pub fn run(&self, destination: &str, root_size: &str) -> Result<RunResult, CloneError> {
        let plan = match self.prepare(destination, root_size) {
            Ok(plan) => plan,
            Err(CloneError::UserAborted) => return Ok(RunResult::AbortedByUser),
            Err(e) => return Err(e),
        };

        emit(
            Level::Info,
            "clone.start",
            &format!(
                "{} Cloning {} -> {} (root {} GiB)",
                char::from(NerdFont::HardDrive),
                plan.source_disk(),
                plan.destination(),
                plan.root_size_gib()
            ),
            None,
        );
        Ok(execution::execute_plan(&plan, self.executor, self.config))
    }
}

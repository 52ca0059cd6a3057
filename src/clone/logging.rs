use anyhow::{Context, Result};
use chrono::Local;
use std::fs::create_dir_all;
use std::path::{Path, PathBuf};

use crate::ui::prelude::*;

/// Mirrors all console output of one run into the run log until dropped.
#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
        }
        crate::ui::attach_run_log(path)
            .with_context(|| format!("Failed to open run log {}", path.display()))?;

        let args: Vec<String> = std::env::args().collect();
        crate::ui::log_only(
            "run.start",
            &format!(
                "diskclone {} started at {} ({})",
                env!("CARGO_PKG_VERSION"),
                Local::now().to_rfc3339(),
                args.join(" ")
            ),
        );
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Open the run log, or carry on without one if it cannot be written.
    pub fn open_or_warn(path: &Path) -> Option<Self> {
        match Self::open(path) {
            Ok(log) => Some(log),
            Err(err) => {
                emit(
                    Level::Warn,
                    "run.log.unavailable",
                    &format!(
                        "{} Run log disabled: {:#}",
                        char::from(NerdFont::Warning),
                        err
                    ),
                    None,
                );
                None
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLog {
    fn drop(&mut self) {
        crate::ui::log_only("run.end", "run finished");
        crate::ui::detach_run_log();
    }
}

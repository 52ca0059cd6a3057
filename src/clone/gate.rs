//! Typed confirmation before anything destructive happens.

use colored::Colorize;
use dialoguer::Input;

use super::error::CloneError;
use super::inventory::{Inventory, human_size};
use crate::ui::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Accepted,
    Rejected,
}

/// Reads one line of operator input.
pub trait ConfirmationPrompt {
    fn read_confirmation(&self, prompt: &str) -> Result<String, CloneError>;
}

/// Prompt on the controlling terminal.
pub struct TerminalPrompt;

impl ConfirmationPrompt for TerminalPrompt {
    fn read_confirmation(&self, prompt: &str) -> Result<String, CloneError> {
        Input::<String>::new()
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()
            .map_err(|e| CloneError::Prompt(e.to_string()))
    }
}

/// The exact text the operator has to type to erase `destination`.
pub fn acceptance_phrase(destination: &str) -> String {
    format!("YES, ERASE {destination}")
}

/// Check that `destination` may be erased and ask the operator once.
///
/// Any answer other than the exact phrase is a rejection; there is no retry.
pub fn confirm_destructive(
    inventory: &Inventory<'_>,
    prompt: &dyn ConfirmationPrompt,
    source: &str,
    destination: &str,
) -> Result<Confirmation, CloneError> {
    let source_dev = inventory.describe(source)?;
    let dest_dev = inventory.require_whole_disk(destination)?;

    if source_dev.path == dest_dev.path {
        return Err(CloneError::SameDevice(dest_dev.path));
    }

    if inventory.is_mounted(&dest_dev.path)? {
        return Err(CloneError::DeviceBusy {
            mounted: inventory.mounted_entries(&dest_dev.path)?,
            device: dest_dev.path,
        });
    }

    emit(
        Level::Warn,
        "clone.gate.warning",
        &format!(
            "{} ALL DATA on {} ({}, {}) will be destroyed.",
            char::from(NerdFont::Warning),
            dest_dev.path,
            human_size(dest_dev.size_bytes),
            dest_dev.model.as_deref().unwrap_or("unknown model")
        ),
        None,
    );
    for part in &dest_dev.partitions {
        emit(
            Level::Warn,
            "clone.gate.partition",
            &format!(
                "   {} {} {}",
                part.path,
                human_size(part.size_bytes),
                part.fs_type.as_deref().unwrap_or("")
            ),
            None,
        );
    }

    let phrase = acceptance_phrase(&dest_dev.path);
    let answer = prompt.read_confirmation(&format!("Type '{}' to continue", phrase.bold()))?;
    crate::ui::log_only("clone.gate.answer", &answer);

    if answer == phrase {
        Ok(Confirmation::Accepted)
    } else {
        emit(
            Level::Info,
            "clone.gate.rejected",
            &format!(
                "{} Confirmation did not match; nothing was changed.",
                char::from(NerdFont::Info)
            ),
            None,
        );
        Ok(Confirmation::Rejected)
    }
}

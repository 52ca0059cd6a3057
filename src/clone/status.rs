//! Read-only overview of disks, partitions and mounts.

use comfy_table::{Table, presets::UTF8_FULL_CONDENSED};
use serde::Serialize;

use super::error::CloneError;
use super::inventory::{BlockDevice, Inventory, MountRecord, human_size};
use crate::ui::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub disks: Vec<BlockDevice>,
    pub mounts: Vec<MountRecord>,
}

pub fn collect(inventory: &Inventory<'_>) -> Result<StatusReport, CloneError> {
    let disks = inventory.list_disks()?;
    // Pseudo filesystems would drown out the block device mounts
    let mounts = inventory
        .mount_table()?
        .into_iter()
        .filter(|m| m.source.starts_with("/dev/"))
        .collect();
    Ok(StatusReport { disks, mounts })
}

pub fn render(report: &StatusReport) -> String {
    let mut devices = Table::new();
    devices
        .load_preset(UTF8_FULL_CONDENSED)
        .set_header(vec!["Device", "Size", "Type", "Label", "Mounted on"]);

    for disk in &report.disks {
        devices.add_row(vec![
            disk.path.clone(),
            human_size(disk.size_bytes),
            disk.model.clone().unwrap_or_else(|| "disk".into()),
            String::new(),
            String::new(),
        ]);
        for part in &disk.partitions {
            devices.add_row(vec![
                format!("  {}", part.path),
                human_size(part.size_bytes),
                part.fs_type.clone().unwrap_or_default(),
                part.label.clone().unwrap_or_default(),
                part.mount_points.join(", "),
            ]);
        }
    }

    let mut mounts = Table::new();
    mounts
        .load_preset(UTF8_FULL_CONDENSED)
        .set_header(vec!["Source", "Mount point", "Filesystem"]);
    for record in &report.mounts {
        mounts.add_row(vec![
            record.source.clone(),
            record.target.clone(),
            record.fstype.clone(),
        ]);
    }

    format!("Block devices\n{devices}\n\nMounted filesystems\n{mounts}")
}

/// Print the status overview. Running it never changes anything.
pub fn show_status(inventory: &Inventory<'_>) -> Result<(), CloneError> {
    let report = collect(inventory)?;
    match get_output_format() {
        OutputFormat::Json => emit(
            Level::Info,
            "status.report",
            &format!("{} disks, {} mounts", report.disks.len(), report.mounts.len()),
            serde_json::to_value(&report).ok(),
        ),
        OutputFormat::Text => {
            emit(
                Level::Info,
                "status.header",
                &format!("{} Disk status", char::from(NerdFont::HardDrive)),
                None,
            );
            separator(true);
            emit(Level::Info, "status.report", &render(&report), None);
        }
    }
    Ok(())
}

use std::thread;
use std::time::Duration;

use super::{CommandSpec, StageContext};
use crate::clone::error::CloneError;
use crate::clone::mounts::{MountKind, MountScope};
use crate::ui::prelude::*;

pub fn wipe_table(ctx: &StageContext<'_>) -> Result<(), CloneError> {
    let disk = ctx.plan.destination();
    ctx.executor.run(
        &CommandSpec::new("wipefs")
            .arg("-a")
            .arg(disk)
            .describe(format!("Wiping signatures on {disk}")),
    )?;
    Ok(())
}

/// The parted invocations that produce the planned layout, in order.
pub fn partition_commands(ctx: &StageContext<'_>) -> Vec<CommandSpec> {
    let disk = ctx.plan.destination();
    let parted = || CommandSpec::new("parted").arg("-s").arg(disk);

    let mut commands = vec![parted().args(["mklabel", "gpt"])];
    for part in ctx.plan.partitions() {
        commands.push(
            parted()
                .args(["mkpart", part.label, part.filesystem.parted_type()])
                .arg(part.start.to_string())
                .arg(part.end.to_string()),
        );
    }
    for part in ctx.plan.partitions().iter().filter(|p| p.esp) {
        commands.push(
            parted()
                .arg("set")
                .arg(part.number.to_string())
                .args(["esp", "on"]),
        );
    }
    commands
}

pub fn create_partitions(ctx: &StageContext<'_>) -> Result<(), CloneError> {
    let disk = ctx.plan.destination();
    emit(
        Level::Info,
        "clone.partition",
        &format!(
            "{} Creating GPT layout on {} (root {} GiB)",
            char::from(NerdFont::Partition),
            disk,
            ctx.plan.root_size_gib()
        ),
        None,
    );

    for spec in partition_commands(ctx) {
        ctx.executor.run(&spec)?;
    }

    ctx.executor.run(&CommandSpec::new("partprobe").arg(disk))?;
    ctx.executor.run(&CommandSpec::new("udevadm").arg("settle"))?;

    // udev may still be creating the partition nodes after settle returns
    if !ctx.executor.dry_run && ctx.config.settle_secs > 0 {
        thread::sleep(Duration::from_secs(ctx.config.settle_secs));
    }
    Ok(())
}

pub fn format_partitions(ctx: &StageContext<'_>) -> Result<(), CloneError> {
    for part in ctx.plan.partitions() {
        let (program, flags) = part.filesystem.mkfs();
        ctx.executor.run(
            &CommandSpec::new(program)
                .args(flags.iter().copied())
                .arg(part.label)
                .arg(part.device.as_str())
                .describe(format!(
                    "Formatting {} as {} ({})",
                    part.device, part.filesystem, part.label
                )),
        )?;
    }
    Ok(())
}

/// Mount both sides of the copy: source root, destination root, then the EFI pair.
pub fn mount_filesystems(
    ctx: &StageContext<'_>,
    scope: &mut MountScope<'_>,
) -> Result<(), CloneError> {
    let layout = &ctx.layout;
    scope.acquire(
        ctx.plan.source_root(),
        &layout.source_root(),
        MountKind::Filesystem,
    )?;
    scope.acquire(
        &ctx.plan.root().device,
        &layout.target_root(),
        MountKind::Filesystem,
    )?;
    if let Some(efi) = ctx.plan.source_efi() {
        scope.acquire(efi, &layout.source_efi(), MountKind::Filesystem)?;
    }
    scope.acquire(
        &ctx.plan.efi().device,
        &layout.target_efi(),
        MountKind::Filesystem,
    )?;
    Ok(())
}

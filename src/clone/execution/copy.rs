use std::path::Path;

use super::{CommandSpec, StageContext};
use crate::clone::error::CloneError;
use crate::ui::prelude::*;

/// Archive mode plus ACLs, xattrs and hard links, keeping numeric ownership.
pub const RSYNC_FLAGS: [&str; 3] = ["-aAXH", "--numeric-ids", "--info=progress2"];

/// rsync command mirroring the contents of `from` into `to`.
pub fn mirror_command(from: &Path, to: &Path) -> CommandSpec {
    // Trailing slashes copy directory contents rather than the directory itself
    let spec = CommandSpec::new("rsync")
        .args(RSYNC_FLAGS)
        .arg(format!("{}/", from.display()))
        .arg(format!("{}/", to.display()));

    if get_output_format() == OutputFormat::Text {
        spec.streaming()
    } else {
        spec.describe(format!("Copying {}", from.display()))
    }
}

fn mirror(ctx: &StageContext<'_>, from: &Path, to: &Path) -> Result<(), CloneError> {
    // Exit codes 23/24 (partial transfer, vanished files) fail the stage like any other
    ctx.executor.run(&mirror_command(from, to))?;
    ctx.executor.run(&CommandSpec::new("sync"))?;
    Ok(())
}

pub fn copy_root(ctx: &StageContext<'_>) -> Result<(), CloneError> {
    emit(
        Level::Info,
        "clone.copy.root",
        &format!(
            "{} Copying root filesystem {} -> {}",
            char::from(NerdFont::Folder),
            ctx.plan.source_root(),
            ctx.plan.root().device
        ),
        None,
    );
    mirror(ctx, &ctx.layout.source_root(), &ctx.layout.target_root())
}

pub fn copy_efi(ctx: &StageContext<'_>) -> Result<(), CloneError> {
    let Some(source_efi) = ctx.plan.source_efi() else {
        emit(
            Level::Info,
            "clone.copy.efi.fresh",
            &format!(
                "{} fresh EFI, no source to copy",
                char::from(NerdFont::Info)
            ),
            None,
        );
        return Ok(());
    };

    emit(
        Level::Info,
        "clone.copy.efi",
        &format!(
            "{} Copying EFI partition {} -> {}",
            char::from(NerdFont::Folder),
            source_efi,
            ctx.plan.efi().device
        ),
        None,
    );
    mirror(ctx, &ctx.layout.source_efi(), &ctx.layout.target_efi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_copies_directory_contents() {
        let spec = mirror_command(
            Path::new("/mnt/diskclone/source-root"),
            Path::new("/mnt/diskclone/target-root"),
        );
        assert_eq!(spec.program, "rsync");
        assert_eq!(
            spec.args[3..],
            [
                "/mnt/diskclone/source-root/".to_string(),
                "/mnt/diskclone/target-root/".to_string()
            ]
        );
    }
}

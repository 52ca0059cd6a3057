use super::{CommandSpec, StageContext};
use crate::clone::error::CloneError;
use crate::clone::mounts::{MountKind, MountScope};
use crate::common::paths::CHROOT_BIND_MOUNTS;
use crate::ui::prelude::*;

/// `chroot <clone root> <program> <args...>`
fn in_chroot(ctx: &StageContext<'_>, program: &str) -> CommandSpec {
    CommandSpec::new("chroot")
        .arg(ctx.layout.target_root().to_string_lossy())
        .arg(program)
}

pub fn grub_install_command(ctx: &StageContext<'_>) -> CommandSpec {
    in_chroot(ctx, "grub-install")
        .arg(format!("--target={}", ctx.config.efi_target))
        .arg("--efi-directory=/boot/efi")
        .arg(format!("--bootloader-id={}", ctx.config.bootloader_id))
        .arg(ctx.plan.destination())
        .describe("Installing GRUB")
}

pub fn grub_mkconfig_command(ctx: &StageContext<'_>) -> CommandSpec {
    in_chroot(ctx, "grub-mkconfig")
        .args(["-o", "/boot/grub/grub.cfg"])
        .describe("Generating GRUB configuration")
}

/// Install GRUB into the clone from inside a chroot.
///
/// The pseudo filesystem binds are released as soon as GRUB is done, whether
/// or not it succeeded. The `/boot/efi` mount stays until final teardown.
pub fn install(ctx: &StageContext<'_>, scope: &mut MountScope<'_>) -> Result<(), CloneError> {
    emit(
        Level::Info,
        "clone.bootloader",
        &format!(
            "{} Installing bootloader on {}",
            char::from(NerdFont::Rocket),
            ctx.plan.destination()
        ),
        None,
    );

    scope.acquire(
        &ctx.plan.efi().device,
        &ctx.layout.target_boot_efi(),
        MountKind::Filesystem,
    )?;

    let checkpoint = scope.checkpoint();
    let result = bind_and_install(ctx, scope);
    scope.release_to(checkpoint);
    result
}

fn bind_and_install(ctx: &StageContext<'_>, scope: &mut MountScope<'_>) -> Result<(), CloneError> {
    for pseudo in CHROOT_BIND_MOUNTS {
        scope.acquire(pseudo, &ctx.layout.chroot_path(pseudo), MountKind::Bind)?;
    }

    ctx.executor.run(&grub_install_command(ctx))?;
    ctx.executor.run(&grub_mkconfig_command(ctx))?;
    Ok(())
}

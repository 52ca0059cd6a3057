use std::fs;

use super::{CommandSpec, StageContext};
use crate::clone::error::CloneError;
use crate::clone::planner::PartitionSpec;
use crate::ui::prelude::*;

/// Identifier of one filesystem before and after the clone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub device: String,
    pub uuid: Option<String>,
    pub partuuid: Option<String>,
    pub label: Option<String>,
}

/// All spellings of `old` an fstab entry may use, each paired with the `new` spelling.
pub fn replacements(old: &Identity, new: &Identity) -> Vec<(String, String)> {
    let mut pairs = vec![(old.device.clone(), new.device.clone())];
    if let (Some(o), Some(n)) = (&old.uuid, &new.uuid) {
        pairs.push((format!("UUID={o}"), format!("UUID={n}")));
        pairs.push((format!("UUID=\"{o}\""), format!("UUID={n}")));
        pairs.push((
            format!("/dev/disk/by-uuid/{o}"),
            format!("/dev/disk/by-uuid/{n}"),
        ));
    }
    if let (Some(o), Some(n)) = (&old.partuuid, &new.partuuid) {
        pairs.push((format!("PARTUUID={o}"), format!("PARTUUID={n}")));
        pairs.push((format!("PARTUUID=\"{o}\""), format!("PARTUUID={n}")));
        pairs.push((
            format!("/dev/disk/by-partuuid/{o}"),
            format!("/dev/disk/by-partuuid/{n}"),
        ));
    }
    if let (Some(o), Some(n)) = (&old.label, &new.label) {
        pairs.push((format!("LABEL={o}"), format!("LABEL={n}")));
        pairs.push((format!("LABEL=\"{o}\""), format!("LABEL={n}")));
        pairs.push((
            format!("/dev/disk/by-label/{o}"),
            format!("/dev/disk/by-label/{n}"),
        ));
    }
    pairs
}

/// Rewrite the device field of matching fstab entries.
///
/// Only the first field of a line is compared, and only whole-field matches
/// count, so `/dev/sda1` never rewrites `/dev/sda10`. Returns the new content
/// and the number of entries changed.
pub fn rewrite_fstab_content(content: &str, pairs: &[(String, String)]) -> (String, usize) {
    let mut changed = 0;
    let mut out = String::with_capacity(content.len());

    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_start();
        let indent = &line[..line.len() - trimmed.len()];
        let field_end = trimmed
            .find(char::is_whitespace)
            .unwrap_or(trimmed.len());
        let field = &trimmed[..field_end];

        let replacement = if field.is_empty() || field.starts_with('#') {
            None
        } else {
            pairs.iter().find(|(old, _)| old == field).map(|(_, new)| new)
        };

        match replacement {
            Some(new) => {
                out.push_str(indent);
                out.push_str(new);
                out.push_str(&trimmed[field_end..]);
                changed += 1;
            }
            None => out.push_str(line),
        }
    }
    (out, changed)
}

fn blkid_value(
    ctx: &StageContext<'_>,
    tag: &str,
    device: &str,
) -> Result<Option<String>, CloneError> {
    // blkid exits 2 when the tag is absent
    match ctx.executor.query(
        &CommandSpec::new("blkid")
            .args(["-s", tag, "-o", "value"])
            .arg(device),
    ) {
        Ok(out) => {
            let value = out.stdout.trim();
            Ok((!value.is_empty()).then(|| value.to_string()))
        }
        Err(CloneError::ExternalCommand { status: 2, .. }) => Ok(None),
        Err(err) => Err(err),
    }
}

fn identify(ctx: &StageContext<'_>, device: &str) -> Result<Identity, CloneError> {
    Ok(Identity {
        device: device.to_string(),
        uuid: blkid_value(ctx, "UUID", device)?,
        partuuid: blkid_value(ctx, "PARTUUID", device)?,
        label: blkid_value(ctx, "LABEL", device)?,
    })
}

/// The new side carries the label mkfs was given, not whatever blkid reports.
fn identify_new(ctx: &StageContext<'_>, spec: &PartitionSpec) -> Result<Identity, CloneError> {
    Ok(Identity {
        label: Some(spec.label.to_string()),
        ..identify(ctx, &spec.device)?
    })
}

pub fn rewrite_fstab(ctx: &StageContext<'_>) -> Result<(), CloneError> {
    let fstab_path = ctx.layout.chroot_path("/etc/fstab");

    if ctx.executor.dry_run {
        println!(
            "[DRY RUN] Rewrite {} to reference {} and {}",
            fstab_path.display(),
            ctx.plan.root().device,
            ctx.plan.efi().device
        );
        return Ok(());
    }

    if !fstab_path.exists() {
        emit(
            Level::Warn,
            "clone.fstab.missing",
            &format!(
                "{} {} not found in the clone; skipping fstab rewrite",
                char::from(NerdFont::Warning),
                fstab_path.display()
            ),
            None,
        );
        return Ok(());
    }

    let mut pairs = replacements(
        &identify(ctx, ctx.plan.source_root())?,
        &identify_new(ctx, ctx.plan.root())?,
    );
    if let Some(source_efi) = ctx.plan.source_efi() {
        pairs.extend(replacements(
            &identify(ctx, source_efi)?,
            &identify_new(ctx, ctx.plan.efi())?,
        ));
    }

    let content = fs::read_to_string(&fstab_path)?;
    let (rewritten, changed) = rewrite_fstab_content(&content, &pairs);
    fs::write(&fstab_path, rewritten)?;

    emit(
        Level::Success,
        "clone.fstab.rewritten",
        &format!(
            "{} Updated {} fstab entr{}",
            char::from(NerdFont::Check),
            changed,
            if changed == 1 { "y" } else { "ies" }
        ),
        None,
    );
    Ok(())
}

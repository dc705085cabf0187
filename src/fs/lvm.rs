use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::process::Command;

use crate::types::SizeSpec;

use super::{cmd::CheckCommandOutput as _, get_verbose};

async fn lvm_cmd(tool: &str) -> Command {
    let mut cmd = Command::new(tool);
    if get_verbose().await {
        cmd.arg("--verbose");
    }
    cmd
}

pub async fn pvcreate(dev: &Path) -> Result<()> {
    lvm_cmd("pvcreate")
        .await
        .arg(dev)
        .run()
        .await
        .with_context(|| format!("Failed to create physical volume on {dev:?}"))?;
    Ok(())
}

pub async fn vgcreate(vg: &str, dev: &Path) -> Result<()> {
    lvm_cmd("vgcreate")
        .await
        .arg(vg)
        .arg(dev)
        .run()
        .await
        .with_context(|| format!("Failed to create volume group `{vg}` on {dev:?}"))?;
    Ok(())
}

pub async fn lvcreate_fixed(vg: &str, name: &str, size: &SizeSpec) -> Result<()> {
    lvm_cmd("lvcreate")
        .await
        .args(["--size", &size.literal(), "--name", name, vg])
        .run()
        .await
        .with_context(|| format!("Failed to create logical volume `{name}` ({size}) in `{vg}`"))?;
    Ok(())
}

/// Create `name` spanning all free extents left in `vg`. Must run after
/// every fixed-size volume, or it would swallow their space.
pub async fn lvcreate_remaining(vg: &str, name: &str) -> Result<()> {
    lvm_cmd("lvcreate")
        .await
        .args(["--extents", "100%FREE", "--name", name, vg])
        .run()
        .await
        .with_context(|| format!("Failed to create logical volume `{name}` (100%FREE) in `{vg}`"))?;
    Ok(())
}

/// Free bytes in `vg`, used for the capacity check before any `lvcreate`.
pub async fn vg_free_bytes(vg: &str) -> Result<u64> {
    let stdout = Command::new("vgs")
        .args([
            "--noheadings",
            "--nosuffix",
            "--units",
            "b",
            "--options",
            "vg_free",
            vg,
        ])
        .run()
        .await
        .with_context(|| format!("Failed to query free space of volume group `{vg}`"))?;
    let raw = String::from_utf8(stdout)?;
    parse_vgs_bytes(&raw).with_context(|| format!("Failed to parse vgs output for `{vg}`"))
}

pub async fn vgchange_deactivate(vg: &str) -> Result<()> {
    lvm_cmd("vgchange")
        .await
        .args(["--activate", "n", vg])
        .run()
        .await
        .with_context(|| format!("Failed to deactivate volume group `{vg}`"))?;
    Ok(())
}

pub fn lv_path(vg: &str, lv: &str) -> PathBuf {
    Path::new("/dev").join(vg).join(lv)
}

fn parse_vgs_bytes(raw: &str) -> Result<u64> {
    // vgs emits a single padded column; "4096B" with --nosuffix becomes "4096",
    // but some versions keep a decimal point ("4096.00").
    let field = raw.trim();
    let integral = field.split('.').next().unwrap_or(field);
    integral
        .parse::<u64>()
        .with_context(|| format!("unexpected vgs field `{field}`"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn lv_path_layout() {
        assert_eq!(lv_path("vg0", "root"), PathBuf::from("/dev/vg0/root"));
    }

    #[rstest]
    #[case("  25769803776\n", 25769803776)]
    #[case("4096", 4096)]
    #[case(" 4096.00 ", 4096)]
    fn parses_vgs_free_bytes(#[case] raw: &str, #[case] expected: u64) {
        assert_eq!(parse_vgs_bytes(raw).unwrap(), expected);
    }

    #[test]
    fn rejects_garbage_vgs_output() {
        assert!(parse_vgs_bytes("no such vg").is_err());
    }
}

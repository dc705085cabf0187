use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use tokio::process::Command;

use crate::fs::cmd::CheckCommandOutput as _;

/// Base package set: kernel, firmware for broad hardware compatibility,
/// microcode for both major CPU vendors, the tools the installed system
/// needs to unlock and assemble its own root, and base utilities.
pub const BASE_PACKAGES: &[&str] = &[
    "base",
    "linux",
    "linux-firmware",
    "amd-ucode",
    "intel-ucode",
    "lvm2",
    "grub",
    "efibootmgr",
    "networkmanager",
    "sudo",
];

/// Package download and install is the one genuinely long-running step.
const INSTALL_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Install the base package set into the mounted root. This is the boundary
/// into guest state: everything after it operates on the new root rather
/// than the provisioning host.
pub async fn install_base(root: &Path) -> Result<()> {
    tracing::info!(?root, packages = BASE_PACKAGES.len(), "installing base system");
    Command::new("pacstrap")
        .arg("-K")
        .arg(root)
        .args(BASE_PACKAGES)
        .run_with_timeout(INSTALL_TIMEOUT)
        .await
        .context("Failed to install base package set")?;
    Ok(())
}

/// Generate the filesystem table by scanning the live mounts under `root`,
/// keyed by UUID.
pub async fn generate_fstab(root: &Path) -> Result<()> {
    let fstab = Command::new("genfstab")
        .arg("-U")
        .arg(root)
        .run()
        .await
        .context("Failed to scan mounts for the filesystem table")?;
    let fstab = String::from_utf8(fstab).context("genfstab produced non-UTF-8 output")?;
    if fstab.trim().is_empty() {
        bail!("genfstab produced an empty filesystem table; is {root:?} mounted?");
    }
    let path = root.join("etc/fstab");
    tokio::fs::write(&path, fstab.as_bytes())
        .await
        .with_context(|| format!("Failed to write {path:?}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_set_covers_both_cpu_vendors() {
        assert!(BASE_PACKAGES.contains(&"amd-ucode"));
        assert!(BASE_PACKAGES.contains(&"intel-ucode"));
    }

    #[test]
    fn base_set_can_unlock_its_own_root() {
        // lvm2 ships the initramfs hook; grub + efibootmgr install the loader
        for pkg in ["lvm2", "grub", "efibootmgr"] {
            assert!(BASE_PACKAGES.contains(&pkg), "missing {pkg}");
        }
    }
}

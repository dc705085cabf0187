use std::path::Path;

use anyhow::{bail, Context as _, Result};

use crate::fs::luks;

/// Host tools every stage together relies on, with the stage that needs
/// them. Checked up front so a missing tool cannot abort the run halfway
/// through a destructive sequence.
const REQUIRED_TOOLS: &[(&str, &str)] = &[
    ("wipefs", "partitioning"),
    ("parted", "partitioning"),
    ("partprobe", "partitioning"),
    ("udevadm", "partitioning"),
    ("cryptsetup", "encryption"),
    ("blkid", "encryption"),
    ("pvcreate", "volume management"),
    ("vgcreate", "volume management"),
    ("lvcreate", "volume management"),
    ("vgs", "volume management"),
    ("vgchange", "volume management"),
    ("mkfs.fat", "filesystems"),
    ("mkfs.ext4", "filesystems"),
    ("mkswap", "filesystems"),
    ("mount", "filesystems"),
    ("umount", "filesystems"),
    ("swapon", "filesystems"),
    ("swapoff", "filesystems"),
    ("pacstrap", "base install"),
    ("genfstab", "base install"),
    ("arch-chroot", "guest configuration"),
];

pub fn check_host_tools() -> Result<()> {
    let missing: Vec<&str> = REQUIRED_TOOLS
        .iter()
        .filter(|(tool, _)| which::which(tool).is_err())
        .map(|(tool, _)| *tool)
        .collect();
    if !missing.is_empty() {
        bail!("missing required host tools: {}", missing.join(", "));
    }
    Ok(())
}

/// The target must be a real, currently unused block device. Runs before
/// stage one; everything after it is destructive.
pub async fn check_device(dev: &Path) -> Result<()> {
    let stat = nix::sys::stat::stat(dev)
        .with_context(|| format!("target device {dev:?} does not exist"))?;
    if stat.st_mode & libc::S_IFMT != libc::S_IFBLK {
        bail!("target {dev:?} is not a block device");
    }
    if luks::is_dev_in_use(dev)
        .await
        .with_context(|| format!("Failed to probe {dev:?}"))?
    {
        bail!("target device {dev:?} is in use (mounted, mapped, or held open)");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_device_is_rejected() {
        let res = check_device(Path::new("/dev/definitely-not-a-device-422")).await;
        assert!(res.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn regular_file_is_not_a_block_device() -> Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        let res = check_device(file.path()).await;
        let err = format!("{:#}", res.unwrap_err());
        assert!(err.contains("not a block device"), "{err}");
        Ok(())
    }
}

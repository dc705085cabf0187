use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use tokio::process::Command;

use super::cmd::CheckCommandOutput as _;

/// A single `parted -s` operation against a disk.
#[derive(Debug, Clone)]
pub enum PartedOp {
    MkLabelGpt,
    MkPart {
        name: &'static str,
        fs_hint: &'static str,
        start: &'static str,
        end: &'static str,
    },
    SetFlag {
        index: u32,
        flag: &'static str,
    },
}

impl PartedOp {
    fn to_args(&self) -> Vec<String> {
        match self {
            PartedOp::MkLabelGpt => vec!["mklabel".into(), "gpt".into()],
            PartedOp::MkPart {
                name,
                fs_hint,
                start,
                end,
            } => vec![
                "mkpart".into(),
                (*name).into(),
                (*fs_hint).into(),
                (*start).into(),
                (*end).into(),
            ],
            PartedOp::SetFlag { index, flag } => {
                vec!["set".into(), index.to_string(), (*flag).into(), "on".into()]
            }
        }
    }
}

pub async fn parted(disk: &Path, op: PartedOp) -> Result<()> {
    Command::new("parted")
        .arg("--script")
        .arg(disk)
        .arg("--")
        .args(op.to_args())
        .run()
        .await
        .with_context(|| format!("Failed to run parted op {op:?} on {disk:?}"))?;
    Ok(())
}

/// Destroy any pre-existing partition table and filesystem signatures.
pub async fn wipe_signatures(disk: &Path) -> Result<()> {
    Command::new("wipefs")
        .arg("--all")
        .arg(disk)
        .run()
        .await
        .with_context(|| format!("Failed to wipe signatures on {disk:?}"))?;
    Ok(())
}

/// Re-read the partition table and wait until the kernel has created the
/// partition device nodes. Later stages address partitions by node path, so
/// they must not run before udev settles.
pub async fn settle(disk: &Path) -> Result<()> {
    Command::new("partprobe")
        .arg(disk)
        .run()
        .await
        .with_context(|| format!("Failed to re-read partition table of {disk:?}"))?;
    Command::new("udevadm")
        .args(["settle", "--timeout", "30"])
        .run()
        .await
        .context("Failed to wait for partition device nodes")?;
    Ok(())
}

/// Device node of partition `index` on `disk`.
///
/// Disks whose name ends in a digit (nvme0n1, mmcblk0, loop0) separate the
/// partition number with `p`; plain sdX disks do not.
pub fn partition_dev(disk: &Path, index: u32) -> PathBuf {
    let disk_str = disk.to_string_lossy();
    let needs_p_sep = disk_str
        .chars()
        .last()
        .map(|c| c.is_ascii_digit())
        .unwrap_or(false);
    if needs_p_sep {
        PathBuf::from(format!("{disk_str}p{index}"))
    } else {
        PathBuf::from(format!("{disk_str}{index}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/dev/sda", 3, "/dev/sda3")]
    #[case("/dev/sdX", 1, "/dev/sdX1")]
    #[case("/dev/vdb", 2, "/dev/vdb2")]
    #[case("/dev/nvme0n1", 3, "/dev/nvme0n1p3")]
    #[case("/dev/mmcblk0", 1, "/dev/mmcblk0p1")]
    #[case("/dev/loop7", 2, "/dev/loop7p2")]
    fn partition_device_naming(#[case] disk: &str, #[case] index: u32, #[case] expected: &str) {
        assert_eq!(
            partition_dev(Path::new(disk), index),
            PathBuf::from(expected)
        );
    }

    #[test]
    fn mkpart_args_preserve_geometry_literals() {
        let op = PartedOp::MkPart {
            name: "esp",
            fs_hint: "fat32",
            start: "1MiB",
            end: "101MiB",
        };
        assert_eq!(op.to_args(), vec!["mkpart", "esp", "fat32", "1MiB", "101MiB"]);
    }

    #[test]
    fn set_flag_args() {
        let op = PartedOp::SetFlag {
            index: 1,
            flag: "esp",
        };
        assert_eq!(op.to_args(), vec!["set", "1", "esp", "on"]);
    }
}

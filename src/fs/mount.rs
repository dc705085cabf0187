use std::path::Path;

use anyhow::{Context as _, Result};
use tokio::process::Command;

use super::cmd::CheckCommandOutput as _;

pub async fn mount(source: &Path, target: &Path) -> Result<()> {
    Command::new("mount")
        .arg(source)
        .arg(target)
        .run()
        .await
        .with_context(|| format!("Failed to mount {source:?} at {target:?}"))?;
    Ok(())
}

pub async fn umount(target: &Path) -> Result<()> {
    Command::new("umount")
        .arg(target)
        .run()
        .await
        .with_context(|| format!("Failed to unmount {target:?}"))?;
    Ok(())
}

pub async fn swapon(dev: &Path) -> Result<()> {
    Command::new("swapon")
        .arg(dev)
        .run()
        .await
        .with_context(|| format!("Failed to activate swap on {dev:?}"))?;
    Ok(())
}

pub async fn swapoff(dev: &Path) -> Result<()> {
    Command::new("swapoff")
        .arg(dev)
        .run()
        .await
        .with_context(|| format!("Failed to deactivate swap on {dev:?}"))?;
    Ok(())
}

pub async fn ensure_dir(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .with_context(|| format!("Failed to create mount point {path:?}"))?;
    Ok(())
}

pub fn is_mounted(target: &Path) -> bool {
    // /proc/mounts is authoritative on Linux and cheap to scan
    match std::fs::read_to_string("/proc/mounts") {
        Ok(mounts) => mounts
            .lines()
            .filter_map(|line| line.split_whitespace().nth(1))
            .any(|mnt| Path::new(mnt) == target),
        Err(_) => false,
    }
}

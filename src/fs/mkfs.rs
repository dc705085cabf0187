use std::path::Path;

use anyhow::{Context, Result};
use tokio::process::Command;

use crate::types::FsType;

use super::cmd::CheckCommandOutput as _;

/// Write a fresh filesystem (or swap area) onto `dev`.
///
/// Unconditional: the pipeline only ever formats devices it created in the
/// same run, so there is nothing to preserve.
pub async fn mkfs(dev: &Path, fs_type: FsType) -> Result<()> {
    let mut cmd = match fs_type {
        FsType::Vfat => {
            let mut cmd = Command::new("mkfs.fat");
            cmd.args(["-F", "32"]);
            cmd
        }
        FsType::Ext4 => {
            let mut cmd = Command::new("mkfs.ext4");
            cmd.args(["-F", "-q"]);
            cmd
        }
        FsType::Swap => Command::new("mkswap"),
    };
    cmd.arg(dev)
        .run()
        .await
        .with_context(|| format!("Failed to create {fs_type} on {dev:?}"))?;
    Ok(())
}

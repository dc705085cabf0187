use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs::OpenOptions;
use tokio::process::Command;

use crate::types::Passphrase;

use super::{cmd::CheckCommandOutput as _, get_verbose};

/// Format `dev` as a LUKS2 container keyed by `passphrase`.
///
/// Overwrites any existing LUKS header unconditionally; the pipeline only
/// ever formats a partition it created itself in the same run. The
/// passphrase travels via stdin (`--key-file=-`), never argv.
pub async fn format(dev: &Path, passphrase: &Passphrase) -> Result<()> {
    let mut cmd = Command::new("cryptsetup");
    if get_verbose().await {
        cmd.arg("--debug");
    }
    cmd.args([
        "luksFormat",
        "--type",
        "luks2",
        "--cipher",
        "aes-xts-plain64",
        "--batch-mode",
        "--key-file=-",
    ])
    .arg(dev)
    .run_with_input(passphrase.as_bytes())
    .await
    .with_context(|| format!("Failed to format {dev:?} as LUKS2 volume"))?;
    Ok(())
}

/// Open the LUKS container at `dev` as `/dev/mapper/<mapper>`.
pub async fn open(dev: &Path, mapper: &str, passphrase: &Passphrase) -> Result<()> {
    let mut cmd = Command::new("cryptsetup");
    if get_verbose().await {
        cmd.arg("--debug");
    }
    cmd.args(["open", "--type", "luks2", "--key-file=-"])
        .arg(dev)
        .arg(mapper)
        .run_with_input(passphrase.as_bytes())
        .await
        .with_context(|| format!("Failed to set up mapping {mapper} for {dev:?}"))?;
    Ok(())
}

pub async fn close(mapper: &str) -> Result<()> {
    Command::new("cryptsetup")
        .args(["close", mapper])
        .run()
        .await
        .with_context(|| format!("Failed to close mapping `{mapper}`"))?;
    Ok(())
}

pub fn mapper_path(mapper: &str) -> PathBuf {
    Path::new("/dev/mapper").join(mapper)
}

pub fn is_active(mapper: &str) -> bool {
    mapper_path(mapper).exists()
}

/// Exclusive-open probe: EBUSY means something (a mount, a mapping, another
/// process) still holds the device.
pub async fn is_dev_in_use(dev: &Path) -> Result<bool> {
    let mut options = OpenOptions::new();
    options.read(true);
    options.custom_flags(libc::O_EXCL);
    match options.open(dev).await {
        Ok(_) => Ok(false),
        Err(e) if e.raw_os_error() == Some(libc::EBUSY) => Ok(true),
        Err(e) => Err(e.into()),
    }
}

/// UUID of the LUKS header on `dev`, as interpolated into the boot command
/// line.
pub async fn luks_uuid(dev: &Path) -> Result<String> {
    let stdout = Command::new("blkid")
        .args(["--match-tag", "UUID", "--output", "value"])
        .arg(dev)
        .run()
        .await
        .with_context(|| format!("Failed to read UUID of {dev:?}"))?;
    let uuid = String::from_utf8(stdout)?.trim().to_owned();
    if uuid.is_empty() {
        anyhow::bail!("blkid reported no UUID for {dev:?}");
    }
    Ok(uuid)
}

use std::path::PathBuf;

use anyhow::{bail, Context as _, Result};

use crate::config::{InstallConfig, VG_NAME};
use crate::fs::{lvm, mkfs};
use crate::types::{FsType, SizeSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LvSize {
    Fixed(SizeSpec),
    RemainingFree,
}

#[derive(Debug, Clone)]
pub struct LogicalVolume {
    pub name: String,
    pub size: LvSize,
    pub fs: FsType,
}

/// The volume group carved out of the opened LUKS mapper device, and the
/// logical volumes to create in it, in creation order.
#[derive(Debug, Clone)]
pub struct VolumePlan {
    vg: String,
    pv: PathBuf,
    volumes: Vec<LogicalVolume>,
}

impl VolumePlan {
    /// swap and root at their configured sizes, then home spanning whatever
    /// is left.
    pub fn for_config(config: &InstallConfig, mapper_dev: PathBuf) -> Self {
        Self {
            vg: VG_NAME.to_owned(),
            pv: mapper_dev,
            volumes: vec![
                LogicalVolume {
                    name: "swap".to_owned(),
                    size: LvSize::Fixed(config.swap_size.clone()),
                    fs: FsType::Swap,
                },
                LogicalVolume {
                    name: "root".to_owned(),
                    size: LvSize::Fixed(config.root_size.clone()),
                    fs: FsType::Ext4,
                },
                LogicalVolume {
                    name: "home".to_owned(),
                    size: LvSize::RemainingFree,
                    fs: FsType::Ext4,
                },
            ],
        }
    }

    pub fn vg(&self) -> &str {
        &self.vg
    }

    pub fn volumes(&self) -> &[LogicalVolume] {
        &self.volumes
    }

    pub fn lv_path(&self, name: &str) -> PathBuf {
        lvm::lv_path(&self.vg, name)
    }

    pub fn root_lv_path(&self) -> PathBuf {
        self.lv_path("root")
    }

    pub fn swap_lv_path(&self) -> PathBuf {
        self.lv_path("swap")
    }

    pub fn home_lv_path(&self) -> PathBuf {
        self.lv_path("home")
    }

    /// Exactly one remaining-free volume, created last: its size is whatever
    /// the fixed-size volumes leave behind, so it cannot be allocated before
    /// them.
    pub fn validate(&self) -> Result<()> {
        let remaining: Vec<usize> = self
            .volumes
            .iter()
            .enumerate()
            .filter(|(_, lv)| lv.size == LvSize::RemainingFree)
            .map(|(i, _)| i)
            .collect();
        match remaining.as_slice() {
            [last] if *last == self.volumes.len() - 1 => {}
            [] => bail!("volume plan has no remaining-free volume"),
            [_] => bail!("remaining-free volume must be created last"),
            _ => bail!("volume plan has more than one remaining-free volume"),
        }
        let mut names: Vec<&str> = self.volumes.iter().map(|lv| lv.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        if names.len() != self.volumes.len() {
            bail!("volume plan has duplicate logical volume names");
        }
        Ok(())
    }

    fn fixed_bytes(&self) -> u64 {
        self.volumes
            .iter()
            .filter_map(|lv| match &lv.size {
                LvSize::Fixed(size) => Some(size.bytes()),
                LvSize::RemainingFree => None,
            })
            .sum()
    }

    /// Capacity check against the actual free space of the created volume
    /// group. Reports the exact shortfall instead of letting `lvcreate`
    /// fail with an undifferentiated message.
    pub fn check_capacity(&self, vg_free: u64) -> Result<()> {
        let need = self.fixed_bytes();
        if need > vg_free {
            bail!(
                "insufficient space in volume group `{}`: fixed-size volumes need {} bytes, \
                 {} bytes free (short {} bytes)",
                self.vg,
                need,
                vg_free,
                need - vg_free
            );
        }
        Ok(())
    }

    /// Build physical volume -> volume group -> logical volumes, in strict
    /// order, then put a filesystem on each.
    pub async fn apply(&self) -> Result<()> {
        self.validate()?;

        tracing::info!(pv = ?self.pv, vg = %self.vg, "creating volume group");
        lvm::pvcreate(&self.pv).await?;
        lvm::vgcreate(&self.vg, &self.pv).await?;

        let free = lvm::vg_free_bytes(&self.vg).await?;
        self.check_capacity(free)?;

        for lv in &self.volumes {
            match &lv.size {
                LvSize::Fixed(size) => {
                    tracing::info!(lv = %lv.name, %size, "creating logical volume");
                    lvm::lvcreate_fixed(&self.vg, &lv.name, size).await?;
                }
                LvSize::RemainingFree => {
                    tracing::info!(lv = %lv.name, "creating logical volume from remaining space");
                    lvm::lvcreate_remaining(&self.vg, &lv.name).await?;
                }
            }
        }

        for lv in &self.volumes {
            let dev = self.lv_path(&lv.name);
            tracing::info!(lv = %lv.name, fs = %lv.fs, "creating filesystem");
            mkfs::mkfs(&dev, lv.fs)
                .await
                .with_context(|| format!("Failed to format logical volume `{}`", lv.name))?;
        }
        Ok(())
    }

    pub async fn deactivate(&self) -> Result<()> {
        lvm::vgchange_deactivate(&self.vg).await
    }
}

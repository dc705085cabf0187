use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use crate::cli::TeardownOptions;
use crate::config::{InstallConfig, MAPPER_NAME, TARGET_ROOT, VG_NAME};
use crate::fs::{luks, lvm, mount};
use crate::provision::layout::PartitionLayout;
use crate::provision::mounts::MountPlan;
use crate::provision::volumes::VolumePlan;

use super::Command;

/// Releases whatever a previous (possibly crashed) run left active, in
/// reverse mount order. Every step is attempted and failures are logged,
/// because any one leftover is enough to block a retry.
pub struct TeardownCommand {
    pub teardown_options: TeardownOptions,
}

#[async_trait]
impl Command for TeardownCommand {
    async fn run(&self) -> Result<()> {
        let install = InstallConfig::load(&self.teardown_options.config).await?;

        let layout = PartitionLayout::plan(&install.device);
        let volumes = VolumePlan::for_config(
            &install,
            Path::new("/dev/mapper").join(MAPPER_NAME),
        );
        let mounts = MountPlan::for_layout(Path::new(TARGET_ROOT), &layout, &volumes)?;

        if let Err(e) = mount::swapoff(&volumes.swap_lv_path()).await {
            tracing::warn!("swapoff: {e:#}");
        }
        for target in mounts.unmount_order() {
            if !mount::is_mounted(target) {
                tracing::debug!(?target, "not mounted, skipping");
                continue;
            }
            if let Err(e) = mount::umount(target).await {
                tracing::warn!("umount: {e:#}");
            }
        }
        if let Err(e) = lvm::vgchange_deactivate(VG_NAME).await {
            tracing::warn!("vgchange: {e:#}");
        }
        if luks::is_active(MAPPER_NAME) {
            if let Err(e) = luks::close(MAPPER_NAME).await {
                tracing::warn!("cryptsetup close: {e:#}");
            }
        }
        tracing::info!("teardown finished");
        Ok(())
    }
}

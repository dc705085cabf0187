pub mod boot;
pub mod bootstrap;
pub mod encrypt;
pub mod guest;
pub mod layout;
pub mod mounts;
pub mod volumes;

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::config::{ProvisioningConfig, MAPPER_NAME, TARGET_ROOT};
use crate::error::{Stage, StageError, WithStage as _};
use crate::fs::{luks, lvm, mount};
use crate::preflight;

use boot::BootCmdline;
use encrypt::EncryptedVolume;
use guest::GuestConfigurer;
use layout::PartitionLayout;
use mounts::MountPlan;
use volumes::VolumePlan;

/// Reverse-order undo ledger. Stages record what they activated; unwinding
/// releases it in the opposite order: swap first, then mounts children
/// before root, then the volume group, then the mapper.
///
/// Used both on the success path (the final step returns the host to its
/// pre-run state, leaving only the provisioned device) and, best-effort, on
/// the failure path, since leftover mounts and open mappers block a retry.
#[derive(Debug, Default)]
pub struct Teardown {
    mounts: Vec<PathBuf>,
    swap: Option<PathBuf>,
    vg: Option<String>,
    mapper: Option<String>,
}

impl Teardown {
    pub fn record_mount(&mut self, target: PathBuf) {
        self.mounts.push(target);
    }

    pub fn record_swap(&mut self, dev: PathBuf) {
        self.swap = Some(dev);
    }

    pub fn record_vg(&mut self, vg: &str) {
        self.vg = Some(vg.to_owned());
    }

    pub fn record_mapper(&mut self, mapper: &str) {
        self.mapper = Some(mapper.to_owned());
    }

    /// Unwind everything recorded, failing on the first error. Records are
    /// consumed as they are released, so a failed run can be retried.
    pub async fn run(&mut self) -> Result<()> {
        if let Some(dev) = self.swap.take() {
            mount::swapoff(&dev).await?;
        }
        while let Some(target) = self.mounts.pop() {
            mount::umount(&target).await?;
        }
        if let Some(vg) = self.vg.take() {
            lvm::vgchange_deactivate(&vg).await?;
        }
        if let Some(mapper) = self.mapper.take() {
            luks::close(&mapper).await?;
        }
        Ok(())
    }

    /// Unwind everything recorded, logging failures instead of stopping.
    /// Never masks the primary error it runs under.
    pub async fn best_effort(&mut self) {
        if let Some(dev) = self.swap.take() {
            if let Err(e) = mount::swapoff(&dev).await {
                tracing::warn!("teardown: {e:#}");
            }
        }
        while let Some(target) = self.mounts.pop() {
            if let Err(e) = mount::umount(&target).await {
                tracing::warn!("teardown: {e:#}");
            }
        }
        if let Some(vg) = self.vg.take() {
            if let Err(e) = lvm::vgchange_deactivate(&vg).await {
                tracing::warn!("teardown: {e:#}");
            }
        }
        if let Some(mapper) = self.mapper.take() {
            if let Err(e) = luks::close(&mapper).await {
                tracing::warn!("teardown: {e:#}");
            }
        }
    }
}

/// Drives the staged pipeline strictly in order; each stage's
/// postconditions are the next stage's preconditions, and the first error
/// aborts the run.
///
/// The pipeline is not idempotent: running it twice against the same device
/// succeeds operationally but destroys all prior data each time. That is
/// inherent to provisioning a disk from scratch and deliberately not
/// papered over.
pub struct Provisioner {
    config: ProvisioningConfig,
}

impl Provisioner {
    pub fn new(config: ProvisioningConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self) -> Result<(), StageError> {
        let mut teardown = Teardown::default();
        match self.run_stages(&mut teardown).await {
            Ok(()) => {
                tracing::info!("releasing host resources");
                teardown.run().await.stage(Stage::Filesystem)?;
                tracing::info!(
                    device = ?self.config.install.device,
                    "provisioning complete; the device is ready to boot"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!("aborting after {} stage failure", e.stage);
                teardown.best_effort().await;
                Err(e)
            }
        }
    }

    async fn run_stages(&self, teardown: &mut Teardown) -> Result<(), StageError> {
        let install = &self.config.install;
        let root = Path::new(TARGET_ROOT);

        preflight::check_host_tools().stage(Stage::Preflight)?;
        preflight::check_device(&install.device)
            .await
            .stage(Stage::Device)?;

        let layout = PartitionLayout::plan(&install.device);
        layout.apply().await.stage(Stage::Partition)?;

        let mut container =
            EncryptedVolume::new(layout.device_for(layout.luks_container()));
        container
            .format(&self.config.luks_passphrase)
            .await
            .stage(Stage::Crypto)?;
        container
            .open(&self.config.luks_passphrase, MAPPER_NAME)
            .await
            .stage(Stage::Crypto)?;
        teardown.record_mapper(MAPPER_NAME);
        let luks_uuid = container.uuid().await.stage(Stage::Crypto)?;
        let mapper_dev = container.mapper_dev().stage(Stage::Crypto)?;

        let volumes = VolumePlan::for_config(install, mapper_dev);
        teardown.record_vg(volumes.vg());
        volumes.apply().await.stage(Stage::Volume)?;

        let mounts = MountPlan::for_layout(root, &layout, &volumes).stage(Stage::Filesystem)?;
        mounts.apply(teardown).await.stage(Stage::Filesystem)?;

        bootstrap::install_base(root).await.stage(Stage::Package)?;
        bootstrap::generate_fstab(root).await.stage(Stage::Package)?;

        let cmdline = BootCmdline {
            luks_uuid,
            mapper: MAPPER_NAME.to_owned(),
            root_lv: volumes.root_lv_path(),
        };
        GuestConfigurer::new(root, &self.config, cmdline)
            .run_all()
            .await
            .stage(Stage::GuestConfig)?;

        Ok(())
    }
}

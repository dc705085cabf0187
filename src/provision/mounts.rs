use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use crate::fs::mount;
use crate::provision::layout::PartitionLayout;
use crate::provision::volumes::VolumePlan;

use super::Teardown;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountBinding {
    pub source: PathBuf,
    pub target: PathBuf,
    /// Whether the target directory must be created first. Only the root
    /// binding mounts onto a pre-existing directory; every other target
    /// lives under the root mount and cannot exist until root is mounted.
    pub precreate_dir: bool,
}

/// Filesystem mount ordering for the new root tree, plus the swap volume
/// activated after all mounts.
#[derive(Debug, Clone)]
pub struct MountPlan {
    root_target: PathBuf,
    bindings: Vec<MountBinding>,
    swap_dev: PathBuf,
}

impl MountPlan {
    /// root LV at the target root, then ESP at `efi/`, boot partition at
    /// `boot/`, home LV at `home/`.
    pub fn for_layout(
        target_root: &Path,
        layout: &PartitionLayout,
        volumes: &VolumePlan,
    ) -> Result<Self> {
        let bindings = vec![
            MountBinding {
                source: volumes.root_lv_path(),
                target: target_root.to_path_buf(),
                precreate_dir: false,
            },
            MountBinding {
                source: layout.device_for(layout.esp()),
                target: target_root.join("efi"),
                precreate_dir: true,
            },
            MountBinding {
                source: layout.device_for(layout.boot()),
                target: target_root.join("boot"),
                precreate_dir: true,
            },
            MountBinding {
                source: volumes.home_lv_path(),
                target: target_root.join("home"),
                precreate_dir: true,
            },
        ];
        Self::from_bindings(target_root.to_path_buf(), bindings, volumes.swap_lv_path())
    }

    pub fn from_bindings(
        root_target: PathBuf,
        bindings: Vec<MountBinding>,
        swap_dev: PathBuf,
    ) -> Result<Self> {
        check_order(&root_target, &bindings)?;
        Ok(Self {
            root_target,
            bindings,
            swap_dev,
        })
    }

    pub fn root_target(&self) -> &Path {
        &self.root_target
    }

    pub fn bindings(&self) -> &[MountBinding] {
        &self.bindings
    }

    pub fn swap_dev(&self) -> &Path {
        &self.swap_dev
    }

    /// Mount every binding in order, then activate swap. Each successful
    /// step is recorded in the teardown ledger so a later stage failure can
    /// unwind in reverse.
    pub async fn apply(&self, teardown: &mut Teardown) -> Result<()> {
        mount::ensure_dir(&self.root_target).await?;
        for binding in &self.bindings {
            if binding.precreate_dir {
                mount::ensure_dir(&binding.target).await?;
            }
            tracing::info!(source = ?binding.source, target = ?binding.target, "mounting");
            mount::mount(&binding.source, &binding.target).await?;
            teardown.record_mount(binding.target.clone());
        }
        tracing::info!(dev = ?self.swap_dev, "activating swap");
        mount::swapon(&self.swap_dev).await?;
        teardown.record_swap(self.swap_dev.clone());
        Ok(())
    }

    /// Unmount targets in teardown order: children first, root last.
    pub fn unmount_order(&self) -> Vec<&Path> {
        self.bindings
            .iter()
            .rev()
            .map(|b| b.target.as_path())
            .collect()
    }
}

/// The root binding must come first and must not require directory
/// creation; every other binding mounts below root and therefore cannot
/// precede it. A violating plan is rejected before anything is mounted.
fn check_order(root_target: &Path, bindings: &[MountBinding]) -> Result<()> {
    let Some(first) = bindings.first() else {
        bail!("mount plan is empty");
    };
    if first.target != root_target {
        bail!(
            "mount plan must mount root {root_target:?} first, found {:?}",
            first.target
        );
    }
    if first.precreate_dir {
        bail!("root binding must not require directory creation under itself");
    }
    for binding in &bindings[1..] {
        if !binding.target.starts_with(root_target) || binding.target == root_target {
            bail!(
                "mount target {:?} is not a subdirectory of the root target {root_target:?}",
                binding.target
            );
        }
        if !binding.precreate_dir {
            bail!(
                "child mount {:?} must create its directory under the mounted root",
                binding.target
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstallConfig;

    fn fixture() -> (PartitionLayout, VolumePlan) {
        let config = InstallConfig {
            hostname: "arch-1".into(),
            username: "rcuser".into(),
            device: "/dev/sdX".into(),
            root_size: "20G".parse().unwrap(),
            swap_size: "4G".parse().unwrap(),
            timezone: "UTC".into(),
            locale: "en_US.UTF-8".into(),
        };
        let layout = PartitionLayout::plan(Path::new("/dev/sdX"));
        let volumes = VolumePlan::for_config(&config, PathBuf::from("/dev/mapper/cryptlvm"));
        (layout, volumes)
    }

    #[test]
    fn root_is_mounted_first() {
        let (layout, volumes) = fixture();
        let plan = MountPlan::for_layout(Path::new("/mnt"), &layout, &volumes).unwrap();
        let targets: Vec<&Path> = plan.bindings().iter().map(|b| b.target.as_path()).collect();
        assert_eq!(
            targets,
            vec![
                Path::new("/mnt"),
                Path::new("/mnt/efi"),
                Path::new("/mnt/boot"),
                Path::new("/mnt/home"),
            ]
        );
        assert!(!plan.bindings()[0].precreate_dir);
        assert!(plan.bindings()[1..].iter().all(|b| b.precreate_dir));
    }

    #[test]
    fn sources_follow_fixed_topology() {
        let (layout, volumes) = fixture();
        let plan = MountPlan::for_layout(Path::new("/mnt"), &layout, &volumes).unwrap();
        let sources: Vec<&Path> = plan.bindings().iter().map(|b| b.source.as_path()).collect();
        assert_eq!(
            sources,
            vec![
                Path::new("/dev/vg0/root"),
                Path::new("/dev/sdX1"),
                Path::new("/dev/sdX2"),
                Path::new("/dev/vg0/home"),
            ]
        );
        assert_eq!(plan.swap_dev(), Path::new("/dev/vg0/swap"));
    }

    #[test]
    fn child_before_root_is_rejected() {
        let bindings = vec![
            MountBinding {
                source: PathBuf::from("/dev/sdX2"),
                target: PathBuf::from("/mnt/boot"),
                precreate_dir: true,
            },
            MountBinding {
                source: PathBuf::from("/dev/vg0/root"),
                target: PathBuf::from("/mnt"),
                precreate_dir: false,
            },
        ];
        let res = MountPlan::from_bindings(
            PathBuf::from("/mnt"),
            bindings,
            PathBuf::from("/dev/vg0/swap"),
        );
        assert!(res.is_err());
    }

    #[test]
    fn target_outside_root_is_rejected() {
        let bindings = vec![
            MountBinding {
                source: PathBuf::from("/dev/vg0/root"),
                target: PathBuf::from("/mnt"),
                precreate_dir: false,
            },
            MountBinding {
                source: PathBuf::from("/dev/sdX1"),
                target: PathBuf::from("/elsewhere/efi"),
                precreate_dir: true,
            },
        ];
        let res = MountPlan::from_bindings(
            PathBuf::from("/mnt"),
            bindings,
            PathBuf::from("/dev/vg0/swap"),
        );
        assert!(res.is_err());
    }

    #[test]
    fn unmount_order_is_exact_reverse() {
        let (layout, volumes) = fixture();
        let plan = MountPlan::for_layout(Path::new("/mnt"), &layout, &volumes).unwrap();
        let order = plan.unmount_order();
        assert_eq!(
            order,
            vec![
                Path::new("/mnt/home"),
                Path::new("/mnt/boot"),
                Path::new("/mnt/efi"),
                Path::new("/mnt"),
            ]
        );
    }
}

// Plan-level end-to-end checks: the full chain from config to partition
// layout, volume plan, mount order and boot command line, without touching
// any device.

use std::path::{Path, PathBuf};

use anyhow::Result;

use vaultstrap::config::{InstallConfig, MAPPER_NAME, TARGET_ROOT, VG_NAME};
use vaultstrap::error::{Stage, StageError};
use vaultstrap::provision::boot::{BootCmdline, HookOrder};
use vaultstrap::provision::layout::PartitionLayout;
use vaultstrap::provision::mounts::MountPlan;
use vaultstrap::provision::volumes::{LvSize, VolumePlan};

fn scenario_config() -> InstallConfig {
    let config: InstallConfig = toml::from_str(
        r#"
        hostname = "arch-1"
        username = "rcuser"
        device = "/dev/sdX"
        root_size = "20G"
        swap_size = "4G"
        "#,
    )
    .unwrap();
    config.validate().unwrap();
    config
}

#[test]
fn scenario_produces_fixed_topology() -> Result<()> {
    let config = scenario_config();

    let layout = PartitionLayout::plan(&config.device);
    assert_eq!(layout.partitions().len(), 3);
    assert_eq!(
        layout.device_for(layout.luks_container()),
        PathBuf::from("/dev/sdX3")
    );

    let volumes = VolumePlan::for_config(&config, Path::new("/dev/mapper").join(MAPPER_NAME));
    volumes.validate()?;
    assert_eq!(volumes.vg(), VG_NAME);

    let by_name: Vec<(&str, &LvSize)> = volumes
        .volumes()
        .iter()
        .map(|lv| (lv.name.as_str(), &lv.size))
        .collect();
    assert_eq!(by_name[0].0, "swap");
    assert_eq!(by_name[0].1, &LvSize::Fixed("4G".parse()?));
    assert_eq!(by_name[1].0, "root");
    assert_eq!(by_name[1].1, &LvSize::Fixed("20G".parse()?));
    assert_eq!(by_name[2].0, "home");
    assert_eq!(by_name[2].1, &LvSize::RemainingFree);

    let mounts = MountPlan::for_layout(Path::new(TARGET_ROOT), &layout, &volumes)?;
    let targets: Vec<&Path> = mounts
        .bindings()
        .iter()
        .map(|b| b.target.as_path())
        .collect();
    assert_eq!(
        targets,
        vec![
            Path::new("/mnt"),
            Path::new("/mnt/efi"),
            Path::new("/mnt/boot"),
            Path::new("/mnt/home"),
        ]
    );
    assert_eq!(mounts.swap_dev(), Path::new("/dev/vg0/swap"));

    Ok(())
}

#[test]
fn scenario_boot_cmdline_binds_container_to_root_lv() {
    let config = scenario_config();
    let layout = PartitionLayout::plan(&config.device);
    let volumes = VolumePlan::for_config(&config, Path::new("/dev/mapper").join(MAPPER_NAME));

    // the UUID the formatted container would report
    let uuid = "5b8b7cd2-6f63-4c8c-9a2e-2c8f17d0a111";
    let cmdline = BootCmdline {
        luks_uuid: uuid.to_owned(),
        mapper: MAPPER_NAME.to_owned(),
        root_lv: volumes.root_lv_path(),
    };
    assert_eq!(
        cmdline.render(),
        format!("cryptdevice=UUID={uuid}:cryptlvm root=/dev/vg0/root")
    );
    // sanity: the cmdline names the container partition's mapper, which sits
    // on partition 3 of the target disk
    assert_eq!(layout.luks_container().index, 3);
}

#[test]
fn hook_order_keeps_decrypt_chain_before_filesystems() {
    let hooks = HookOrder::standard();
    hooks.validate().unwrap();

    let pos = |name: &str| {
        hooks
            .hooks()
            .iter()
            .position(|h| h == name)
            .unwrap_or_else(|| panic!("missing hook {name}"))
    };
    assert!(pos("autodetect") < pos("encrypt"));
    assert!(pos("block") < pos("encrypt"));
    assert!(pos("encrypt") < pos("lvm2"));
    assert!(pos("lvm2") < pos("filesystems"));
    assert_eq!(pos("fsck"), hooks.hooks().len() - 1);
}

#[test]
fn crypto_failure_maps_to_its_own_exit_code() {
    // a LUKS open failure surfaces as a crypto-stage error whose exit code
    // is distinct from every other stage's
    let err = StageError::new(Stage::Crypto, anyhow::anyhow!("No key available"));
    assert_eq!(err.stage.exit_code(), 12);
    assert_ne!(err.stage.exit_code(), Stage::Volume.exit_code());
    let propagated: anyhow::Error = err.into();
    assert_eq!(
        propagated.downcast_ref::<StageError>().unwrap().stage,
        Stage::Crypto
    );
}

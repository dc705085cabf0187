use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, ContentArrangement, Table};

use crate::cli::PlanOptions;
use crate::config::{InstallConfig, MAPPER_NAME, TARGET_ROOT};
use crate::provision::boot::{BootCmdline, HookOrder};
use crate::provision::layout::PartitionLayout;
use crate::provision::mounts::MountPlan;
use crate::provision::volumes::{LvSize, VolumePlan};

use super::Command;

pub struct PlanCommand {
    pub plan_options: PlanOptions,
}

#[async_trait]
impl Command for PlanCommand {
    async fn run(&self) -> Result<()> {
        let install = InstallConfig::load(&self.plan_options.config).await?;

        let layout = PartitionLayout::plan(&install.device);
        let volumes = VolumePlan::for_config(
            &install,
            Path::new("/dev/mapper").join(MAPPER_NAME),
        );
        volumes.validate()?;
        let mounts = MountPlan::for_layout(Path::new(TARGET_ROOT), &layout, &volumes)?;
        let hooks = HookOrder::standard();
        hooks.validate()?;
        // the real UUID only exists once the container is formatted
        let cmdline = BootCmdline {
            luks_uuid: "<luks-partition-uuid>".to_owned(),
            mapper: MAPPER_NAME.to_owned(),
            root_lv: volumes.root_lv_path(),
        };

        let mut partitions = new_table(vec!["#", "Role", "Start", "End", "Flags", "Device"]);
        for partition in layout.partitions() {
            partitions.add_row(vec![
                Cell::new(partition.index),
                Cell::new(format!("{:?}", partition.role)),
                Cell::new(partition.start),
                Cell::new(partition.end),
                Cell::new(if partition.boot_flag { "boot" } else { "" }),
                Cell::new(layout.device_for(partition).display()),
            ]);
        }

        let mut lvs = new_table(vec!["LV", "Size", "FS", "Path"]);
        for lv in volumes.volumes() {
            lvs.add_row(vec![
                Cell::new(&lv.name),
                Cell::new(match &lv.size {
                    LvSize::Fixed(size) => size.to_string(),
                    LvSize::RemainingFree => "remaining".to_owned(),
                }),
                Cell::new(lv.fs),
                Cell::new(volumes.lv_path(&lv.name).display()),
            ]);
        }

        let mut mount_table = new_table(vec!["Order", "Source", "Target"]);
        for (i, binding) in mounts.bindings().iter().enumerate() {
            mount_table.add_row(vec![
                Cell::new(i + 1),
                Cell::new(binding.source.display()),
                Cell::new(binding.target.display()),
            ]);
        }
        mount_table.add_row(vec![
            Cell::new("last"),
            Cell::new(mounts.swap_dev().display()),
            Cell::new("swap"),
        ]);

        println!("Partitions on {}:", install.device.display());
        println!("{partitions}");
        println!("Logical volumes in {} (creation order):", volumes.vg());
        println!("{lvs}");
        println!("Mount order under {TARGET_ROOT}:");
        println!("{mount_table}");
        println!("Initramfs hooks: {}", hooks.hooks_line());
        println!("Kernel command line: {}", cmdline.render());
        Ok(())
    }
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(100)
        .set_header(header);
    table
}

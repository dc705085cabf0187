use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::fs::parted::{self, PartedOp};

/// What a partition exists for; also names it in the GPT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionRole {
    Esp,
    Boot,
    LuksContainer,
}

#[derive(Debug, Clone)]
pub struct Partition {
    pub index: u32,
    pub role: PartitionRole,
    pub fs_hint: &'static str,
    pub start: &'static str,
    pub end: &'static str,
    pub boot_flag: bool,
}

/// The fixed three-partition GPT geometry: ESP (1MiB..101MiB, boot flag),
/// boot (101MiB..613MiB), LUKS container (613MiB..end of disk).
#[derive(Debug, Clone)]
pub struct PartitionLayout {
    disk: PathBuf,
    partitions: Vec<Partition>,
}

impl PartitionLayout {
    pub fn plan(disk: &Path) -> Self {
        Self {
            disk: disk.to_path_buf(),
            partitions: vec![
                Partition {
                    index: 1,
                    role: PartitionRole::Esp,
                    fs_hint: "fat32",
                    start: "1MiB",
                    end: "101MiB",
                    boot_flag: true,
                },
                Partition {
                    index: 2,
                    role: PartitionRole::Boot,
                    fs_hint: "ext4",
                    start: "101MiB",
                    end: "613MiB",
                    boot_flag: false,
                },
                Partition {
                    index: 3,
                    role: PartitionRole::LuksContainer,
                    fs_hint: "ext4",
                    start: "613MiB",
                    end: "100%",
                    boot_flag: false,
                },
            ],
        }
    }

    pub fn disk(&self) -> &Path {
        &self.disk
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    fn by_role(&self, role: PartitionRole) -> &Partition {
        self.partitions
            .iter()
            .find(|p| p.role == role)
            .expect("layout always carries all three roles")
    }

    pub fn esp(&self) -> &Partition {
        self.by_role(PartitionRole::Esp)
    }

    pub fn boot(&self) -> &Partition {
        self.by_role(PartitionRole::Boot)
    }

    pub fn luks_container(&self) -> &Partition {
        self.by_role(PartitionRole::LuksContainer)
    }

    /// Device node the kernel exposes for `partition` once the table is
    /// written.
    pub fn device_for(&self, partition: &Partition) -> PathBuf {
        parted::partition_dev(&self.disk, partition.index)
    }

    /// Write the layout to disk: wipe whatever table exists, write a fresh
    /// GPT, create the three partitions, flag the ESP, and wait for the
    /// kernel to expose the partition nodes.
    ///
    /// Destroys all pre-existing data. A failure here is fatal and aborts
    /// before any later stage runs; nothing is active yet, so there is
    /// nothing to tear down.
    pub async fn apply(&self) -> Result<()> {
        tracing::info!(disk = ?self.disk, "writing GPT partition table");
        parted::wipe_signatures(&self.disk).await?;
        parted::parted(&self.disk, PartedOp::MkLabelGpt).await?;
        for partition in &self.partitions {
            let name = match partition.role {
                PartitionRole::Esp => "esp",
                PartitionRole::Boot => "boot",
                PartitionRole::LuksContainer => "luks",
            };
            parted::parted(
                &self.disk,
                PartedOp::MkPart {
                    name,
                    fs_hint: partition.fs_hint,
                    start: partition.start,
                    end: partition.end,
                },
            )
            .await?;
            if partition.boot_flag {
                parted::parted(
                    &self.disk,
                    PartedOp::SetFlag {
                        index: partition.index,
                        flag: "esp",
                    },
                )
                .await?;
            }
        }
        parted::settle(&self.disk).await?;
        Ok(())
    }
}

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use crate::fs::luks;
use crate::types::Passphrase;

#[derive(Debug, Clone, PartialEq, Eq)]
enum VolumeState {
    Unformatted,
    Formatted,
    Opened { mapper: String },
    Closed,
}

/// The LUKS container partition, tracked through its lifecycle
/// `unformatted -> formatted -> opened(mapper) -> closed`.
///
/// The state guards make ordering violations (opening before formatting,
/// taking the mapper device of a closed volume) errors at the call site
/// instead of cryptic tool failures later.
#[derive(Debug)]
pub struct EncryptedVolume {
    dev: PathBuf,
    state: VolumeState,
}

impl EncryptedVolume {
    pub fn new(dev: PathBuf) -> Self {
        Self {
            dev,
            state: VolumeState::Unformatted,
        }
    }

    pub fn dev(&self) -> &Path {
        &self.dev
    }

    pub async fn format(&mut self, passphrase: &Passphrase) -> Result<()> {
        if self.state != VolumeState::Unformatted {
            bail!(
                "refusing to format {:?}: volume is already {}",
                self.dev,
                self.state_name()
            );
        }
        tracing::info!(dev = ?self.dev, "formatting LUKS2 container");
        luks::format(&self.dev, passphrase).await?;
        self.state = VolumeState::Formatted;
        Ok(())
    }

    pub async fn open(&mut self, passphrase: &Passphrase, mapper: &str) -> Result<()> {
        if self.state != VolumeState::Formatted {
            bail!(
                "cannot open {:?}: volume is {}, expected formatted",
                self.dev,
                self.state_name()
            );
        }
        if luks::is_active(mapper) {
            bail!("mapper `{mapper}` already exists; close it before provisioning");
        }
        tracing::info!(dev = ?self.dev, mapper, "opening LUKS2 container");
        luks::open(&self.dev, mapper, passphrase).await?;
        self.state = VolumeState::Opened {
            mapper: mapper.to_owned(),
        };
        Ok(())
    }

    /// The decrypted block device, available only while opened. Later
    /// stages build the volume group on top of this path.
    pub fn mapper_dev(&self) -> Result<PathBuf> {
        match &self.state {
            VolumeState::Opened { mapper } => Ok(luks::mapper_path(mapper)),
            _ => bail!(
                "no mapper device for {:?}: volume is {}",
                self.dev,
                self.state_name()
            ),
        }
    }

    pub async fn close(&mut self) -> Result<()> {
        match &self.state {
            VolumeState::Opened { mapper } => {
                luks::close(mapper).await?;
                self.state = VolumeState::Closed;
                Ok(())
            }
            _ => bail!(
                "cannot close {:?}: volume is {}",
                self.dev,
                self.state_name()
            ),
        }
    }

    /// UUID of the LUKS header; valid any time after formatting.
    pub async fn uuid(&self) -> Result<String> {
        if self.state == VolumeState::Unformatted {
            bail!("{:?} has no LUKS header yet", self.dev);
        }
        luks::luks_uuid(&self.dev).await
    }

    fn state_name(&self) -> &'static str {
        match self.state {
            VolumeState::Unformatted => "unformatted",
            VolumeState::Formatted => "formatted",
            VolumeState::Opened { .. } => "opened",
            VolumeState::Closed => "closed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume() -> EncryptedVolume {
        EncryptedVolume::new(PathBuf::from("/dev/sdX3"))
    }

    fn passphrase() -> Passphrase {
        Passphrase::from("correct horse battery staple".to_owned())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn open_requires_formatted_state() {
        // the state guard fires before any external tool is invoked
        let mut vol = volume();
        let err = vol.open(&passphrase(), "cryptlvm").await.unwrap_err();
        assert!(format!("{err:#}").contains("unformatted"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn close_requires_opened_state() {
        let mut vol = volume();
        assert!(vol.close().await.is_err());
    }

    #[test]
    fn mapper_dev_unavailable_until_opened() {
        let vol = volume();
        assert!(vol.mapper_dev().is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn uuid_unavailable_before_format() {
        let vol = volume();
        assert!(vol.uuid().await.is_err());
    }
}

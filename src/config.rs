use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use documented::{Documented, DocumentedFields};
use serde::{Deserialize, Serialize};

use crate::types::{Passphrase, SizeSpec};

/// Mapper name of the decrypted LUKS container. All stages after the
/// encryption stage address the plaintext block device through it.
pub const MAPPER_NAME: &str = "cryptlvm";

/// Name of the volume group carved out of the decrypted container.
pub const VG_NAME: &str = "vg0";

/// Where the new root filesystem tree is assembled on the host.
pub const TARGET_ROOT: &str = "/mnt";

/// Installation parameters loaded from the TOML config file.
///
/// Secrets are deliberately not part of the file; they are collected
/// separately (prompt or key file) and joined in [`ProvisioningConfig`].
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Documented, DocumentedFields)]
#[serde(deny_unknown_fields)]
pub struct InstallConfig {
    /// Hostname of the installed system.
    pub hostname: String,

    /// Login name of the administrative user to create. The user is added to
    /// the `wheel` group, which is granted unrestricted sudo.
    pub username: String,

    /// Path to the target block device. Everything on it will be destroyed.
    pub device: PathBuf,

    /// Size of the root logical volume, `<integer>M` or `<integer>G`.
    pub root_size: SizeSpec,

    /// Size of the swap logical volume, `<integer>M` or `<integer>G`.
    pub swap_size: SizeSpec,

    /// Timezone of the installed system, as a zoneinfo path fragment.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Locale to generate and set as the system default.
    #[serde(default = "default_locale")]
    pub locale: String,
}

fn default_timezone() -> String {
    "UTC".to_owned()
}

fn default_locale() -> String {
    "en_US.UTF-8".to_owned()
}

impl InstallConfig {
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {path:?}"))?;
        let config: InstallConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {path:?}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Syntactic validation only. Whether `device` is a real, unused block
    /// device is checked by preflight, right before the first destructive
    /// stage.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [("hostname", &self.hostname), ("username", &self.username)] {
            if value.is_empty() {
                bail!("`{field}` must not be empty");
            }
            if value.chars().any(char::is_whitespace) {
                bail!("`{field}` must not contain whitespace");
            }
        }
        if self.device.as_os_str().is_empty() {
            bail!("`device` must not be empty");
        }
        if self.timezone.is_empty() {
            bail!("`timezone` must not be empty");
        }
        if self.locale.is_empty() {
            bail!("`locale` must not be empty");
        }
        Ok(())
    }

    /// An example config, serialized by the `template` subcommand.
    pub fn example() -> Self {
        Self {
            hostname: "arch-1".into(),
            username: "rcuser".into(),
            device: "/dev/sda".into(),
            root_size: "20G".parse().expect("static literal"),
            swap_size: "4G".parse().expect("static literal"),
            timezone: "Europe/Berlin".into(),
            locale: default_locale(),
        }
    }
}

/// Everything a provisioning run needs, passed by value between stages.
///
/// Holding the secrets here (rather than in process-global state) keeps the
/// input-collection step decoupled from the stages that consume them.
pub struct ProvisioningConfig {
    pub install: InstallConfig,
    pub luks_passphrase: Passphrase,
    pub password: Passphrase,
}

impl ProvisioningConfig {
    pub fn new(
        install: InstallConfig,
        luks_passphrase: Passphrase,
        password: Passphrase,
    ) -> Result<Self> {
        if luks_passphrase.is_empty() {
            bail!("LUKS passphrase must not be empty");
        }
        if password.is_empty() {
            bail!("user password must not be empty");
        }
        Ok(Self {
            install,
            luks_passphrase,
            password,
        })
    }
}

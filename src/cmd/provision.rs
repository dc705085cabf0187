use std::path::Path;

use anyhow::{bail, Context as _, Result};
use async_trait::async_trait;
use dialoguer::{Confirm, Password};

use crate::cli::ProvisionOptions;
use crate::config::{InstallConfig, ProvisioningConfig};
use crate::provision::Provisioner;
use crate::types::Passphrase;

use super::Command;

pub struct ProvisionCommand {
    pub provision_options: ProvisionOptions,
}

#[async_trait]
impl Command for ProvisionCommand {
    async fn run(&self) -> Result<()> {
        let options = &self.provision_options;
        let install = InstallConfig::load(&options.config).await?;

        let luks_passphrase = read_secret(
            options.passphrase_file.as_deref(),
            "LUKS passphrase for the encrypted container",
        )
        .await?;
        let password = read_secret(
            options.password_file.as_deref(),
            &format!("Password for user `{}`", install.username),
        )
        .await?;
        let config = ProvisioningConfig::new(install, luks_passphrase, password)?;

        if !options.yes && !confirm_destruction(&config.install).await? {
            bail!("aborted by user");
        }

        Provisioner::new(config).run().await?;
        Ok(())
    }
}

/// Collect a secret from a key file or an interactive prompt. File input
/// serves unattended runs; the prompt path confirms the entry to catch
/// typos before they end up in a LUKS header.
async fn read_secret(file: Option<&Path>, prompt: &str) -> Result<Passphrase> {
    match file {
        Some(path) => {
            let mut bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read secret file {path:?}"))?;
            if bytes.last() == Some(&b'\n') {
                bytes.pop();
            }
            Ok(Passphrase::from(bytes))
        }
        None => {
            let prompt = prompt.to_owned();
            let entered = tokio::task::spawn_blocking(move || {
                Password::new()
                    .with_prompt(prompt)
                    .with_confirmation("Repeat to confirm", "Entries do not match")
                    .interact()
            })
            .await
            .context("background task failed")?
            .context("Failed to read secret from terminal")?;
            Ok(Passphrase::from(entered))
        }
    }
}

async fn confirm_destruction(install: &InstallConfig) -> Result<bool> {
    let prompt = format!(
        "This will DESTROY all data on {}. Continue?",
        install.device.display()
    );
    tokio::task::spawn_blocking(move || {
        Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
    })
    .await
    .context("background task failed")?
    .context("Failed to read confirmation from terminal")
}

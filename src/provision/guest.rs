use std::os::unix::fs::PermissionsExt as _;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use tokio::process::Command;
use zeroize::Zeroize as _;

use crate::config::ProvisioningConfig;
use crate::fs::cmd::CheckCommandOutput as _;

use super::boot::{self, BootCmdline, HookOrder};

/// Group whose members may escalate; granted unrestricted sudo via a
/// drop-in fragment.
const ADMIN_GROUP: &str = "wheel";

const SUDOERS_FRAGMENT: &str = "%wheel ALL=(ALL:ALL) ALL\n";

/// Guest-side configuration of the freshly installed root: everything here
/// mutates the new system, either through its own binaries (`arch-chroot`)
/// or by writing its files through the host-visible mount path.
///
/// The steps are order-sensitive where noted and none may be silently
/// skipped; by this point the device holds a partition-level-committed
/// system and a partial configuration is exactly what must not be left
/// behind without an error.
pub struct GuestConfigurer<'a> {
    root: PathBuf,
    config: &'a ProvisioningConfig,
    cmdline: BootCmdline,
}

impl<'a> GuestConfigurer<'a> {
    pub fn new(root: &Path, config: &'a ProvisioningConfig, cmdline: BootCmdline) -> Self {
        Self {
            root: root.to_path_buf(),
            config,
            cmdline,
        }
    }

    pub async fn run_all(&self) -> Result<()> {
        self.configure_timezone().await?;
        self.configure_locale().await?;
        self.configure_hostname().await?;
        self.create_user().await?;
        self.regenerate_initramfs().await?;
        self.install_bootloader().await?;
        self.enable_network().await?;
        Ok(())
    }

    /// Run a command inside the new root.
    async fn chroot(&self, args: &[&str]) -> Result<Vec<u8>> {
        Command::new("arch-chroot")
            .arg(&self.root)
            .args(args)
            .run()
            .await
            .with_context(|| format!("Failed to run {args:?} in {:?}", self.root))
    }

    async fn write_guest_file(&self, rel: &str, contents: &str) -> Result<()> {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {parent:?}"))?;
        }
        tokio::fs::write(&path, contents.as_bytes())
            .await
            .with_context(|| format!("Failed to write {path:?}"))?;
        Ok(())
    }

    async fn configure_timezone(&self) -> Result<()> {
        let tz = &self.config.install.timezone;
        tracing::info!(timezone = %tz, "configuring timezone");
        let zoneinfo = format!("/usr/share/zoneinfo/{tz}");
        self.chroot(&["ln", "-sf", &zoneinfo, "/etc/localtime"])
            .await?;
        self.chroot(&["hwclock", "--systohc"]).await?;
        Ok(())
    }

    async fn configure_locale(&self) -> Result<()> {
        let locale = &self.config.install.locale;
        tracing::info!(%locale, "generating locale");
        let locale_gen_path = self.root.join("etc/locale.gen");
        let existing = tokio::fs::read_to_string(&locale_gen_path)
            .await
            .unwrap_or_default();
        let updated = ensure_locale_line(&existing, locale);
        tokio::fs::write(&locale_gen_path, updated.as_bytes())
            .await
            .with_context(|| format!("Failed to write {locale_gen_path:?}"))?;
        self.chroot(&["locale-gen"]).await?;
        self.write_guest_file("etc/locale.conf", &format!("LANG={locale}\n"))
            .await?;
        Ok(())
    }

    async fn configure_hostname(&self) -> Result<()> {
        let hostname = &self.config.install.hostname;
        tracing::info!(%hostname, "setting hostname");
        self.write_guest_file("etc/hostname", &format!("{hostname}\n"))
            .await
    }

    /// Account creation plus privilege escalation. The password goes to
    /// `chpasswd` over stdin only; it never appears in argv, the
    /// environment, shell history, or this process's logs.
    async fn create_user(&self) -> Result<()> {
        let username = &self.config.install.username;
        tracing::info!(%username, "creating administrative user");
        self.chroot(&["useradd", "-m", "-G", ADMIN_GROUP, username])
            .await?;

        let mut input = Vec::with_capacity(
            username.len() + 1 + self.config.password.as_bytes().len() + 1,
        );
        input.extend_from_slice(username.as_bytes());
        input.push(b':');
        input.extend_from_slice(self.config.password.as_bytes());
        input.push(b'\n');
        let res = Command::new("arch-chroot")
            .arg(&self.root)
            .arg("chpasswd")
            .run_with_input(&input)
            .await;
        input.zeroize();
        res.context("Failed to set user password")?;

        let sudoers_path = self.root.join("etc/sudoers.d/10-wheel");
        self.write_guest_file("etc/sudoers.d/10-wheel", SUDOERS_FRAGMENT)
            .await?;
        tokio::fs::set_permissions(&sudoers_path, std::fs::Permissions::from_mode(0o440))
            .await
            .with_context(|| format!("Failed to set mode on {sudoers_path:?}"))?;
        Ok(())
    }

    /// Write the hook order into the initramfs config and regenerate. The
    /// single most failure-prone artifact of the whole run: a wrong order
    /// is invisible now and fatal at next boot.
    async fn regenerate_initramfs(&self) -> Result<()> {
        let order = HookOrder::standard();
        order.validate()?;
        tracing::info!(hooks = %order.hooks_line(), "writing initramfs hook order");

        let conf_path = boot::mkinitcpio_conf(&self.root);
        let existing = tokio::fs::read_to_string(&conf_path)
            .await
            .with_context(|| format!("Failed to read {conf_path:?}"))?;
        let rendered = boot::render_hooks_config(&existing, &order)?;
        tokio::fs::write(&conf_path, rendered.as_bytes())
            .await
            .with_context(|| format!("Failed to write {conf_path:?}"))?;

        self.chroot(&["mkinitcpio", "-P"])
            .await
            .context("Failed to regenerate initramfs")?;
        Ok(())
    }

    /// Install the bootloader to the ESP and bind the encrypted device into
    /// the kernel command line, then regenerate the loader config from the
    /// template.
    async fn install_bootloader(&self) -> Result<()> {
        tracing::info!("installing bootloader");
        self.chroot(&[
            "grub-install",
            "--target=x86_64-efi",
            "--efi-directory=/efi",
            "--bootloader-id=GRUB",
        ])
        .await?;

        let grub_path = boot::grub_default(&self.root);
        let existing = tokio::fs::read_to_string(&grub_path)
            .await
            .with_context(|| format!("Failed to read {grub_path:?}"))?;
        let rendered = boot::substitute_grub_cmdline(&existing, &self.cmdline.render())?;
        tokio::fs::write(&grub_path, rendered.as_bytes())
            .await
            .with_context(|| format!("Failed to write {grub_path:?}"))?;

        self.chroot(&["grub-mkconfig", "-o", "/boot/grub/grub.cfg"])
            .await
            .context("Failed to regenerate bootloader config")?;
        Ok(())
    }

    async fn enable_network(&self) -> Result<()> {
        tracing::info!("enabling network service");
        self.chroot(&["systemctl", "enable", "NetworkManager"])
            .await?;
        Ok(())
    }
}

/// Uncomment or append the requested locale in locale.gen.
fn ensure_locale_line(existing: &str, locale: &str) -> String {
    let wanted = format!("{locale} UTF-8");
    let mut found = false;
    let mut out: Vec<String> = existing
        .lines()
        .map(|line| {
            let uncommented = line.trim_start_matches('#').trim();
            if uncommented == wanted {
                found = true;
                wanted.clone()
            } else {
                line.to_owned()
            }
        })
        .collect();
    if !found {
        out.push(wanted);
    }
    out.join("\n") + "\n"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_line_is_uncommented_in_place() {
        let existing = "#de_DE.UTF-8 UTF-8\n#en_US.UTF-8 UTF-8\n";
        let updated = ensure_locale_line(existing, "en_US.UTF-8");
        assert!(updated.contains("\nen_US.UTF-8 UTF-8\n"));
        assert!(updated.contains("#de_DE.UTF-8 UTF-8\n"));
    }

    #[test]
    fn locale_line_is_appended_when_absent() {
        let updated = ensure_locale_line("", "en_US.UTF-8");
        assert_eq!(updated, "en_US.UTF-8 UTF-8\n");
    }

    #[test]
    fn locale_line_is_not_duplicated() {
        let updated = ensure_locale_line("en_US.UTF-8 UTF-8\n", "en_US.UTF-8");
        assert_eq!(updated.matches("en_US.UTF-8 UTF-8").count(), 1);
    }

    #[test]
    fn sudoers_fragment_grants_group_escalation() {
        assert!(SUDOERS_FRAGMENT.starts_with("%wheel"));
        assert!(SUDOERS_FRAGMENT.ends_with('\n'));
    }
}

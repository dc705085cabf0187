use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _, Result};

/// Initramfs hook order for an encrypted-LVM root.
///
/// `encrypt` must run after the device, keyboard and early-userspace hooks
/// (the prompt needs a keyboard and the block device must be visible) and
/// `lvm2` after `encrypt` (the volume group lives inside the decrypted
/// mapper). Both must run before `filesystems` mounts the real root. Getting
/// this wrong produces a kernel image that cannot decrypt its own root, and
/// the failure only shows up on the next physical boot.
const STANDARD_HOOKS: &[&str] = &[
    "base",
    "udev",
    "autodetect",
    "microcode",
    "modconf",
    "kms",
    "keyboard",
    "keymap",
    "consolefont",
    "block",
    "encrypt",
    "lvm2",
    "filesystems",
    "fsck",
];

/// Hooks that must have run before `encrypt`, when present.
const BEFORE_ENCRYPT: &[&str] = &["block", "keyboard", "autodetect", "microcode"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookOrder(Vec<String>);

impl HookOrder {
    pub fn standard() -> Self {
        Self(STANDARD_HOOKS.iter().map(|s| (*s).to_owned()).collect())
    }

    pub fn from_hooks<I, S>(hooks: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let order = Self(hooks.into_iter().map(Into::into).collect());
        order.validate()?;
        Ok(order)
    }

    pub fn hooks(&self) -> &[String] {
        &self.0
    }

    fn position(&self, hook: &str) -> Option<usize> {
        self.0.iter().position(|h| h == hook)
    }

    pub fn validate(&self) -> Result<()> {
        let encrypt = self
            .position("encrypt")
            .context("hook order is missing `encrypt`")?;
        let lvm2 = self
            .position("lvm2")
            .context("hook order is missing `lvm2`")?;
        let filesystems = self
            .position("filesystems")
            .context("hook order is missing `filesystems`")?;

        for hook in BEFORE_ENCRYPT {
            if let Some(pos) = self.position(hook) {
                if pos > encrypt.min(lvm2) {
                    bail!("hook `{hook}` must come before `encrypt` and `lvm2`");
                }
            }
        }
        if encrypt > lvm2 {
            bail!("`encrypt` must come before `lvm2`: the volume group lives inside the mapper");
        }
        if lvm2 > filesystems || encrypt > filesystems {
            bail!("`encrypt` and `lvm2` must come before `filesystems`");
        }
        if let Some(fsck) = self.position("fsck") {
            if fsck != self.0.len() - 1 {
                bail!("`fsck` must be the last hook");
            }
        }
        Ok(())
    }

    /// The `HOOKS=(...)` configuration line.
    pub fn hooks_line(&self) -> String {
        format!("HOOKS=({})", self.0.join(" "))
    }
}

/// Replace the active `HOOKS=` line of a mkinitcpio config with `order`.
///
/// Commented-out example lines are left untouched. Errors if no active line
/// is found rather than appending one blindly; a config without a HOOKS line
/// is not something this pipeline should silently repair.
pub fn render_hooks_config(existing: &str, order: &HookOrder) -> Result<String> {
    let mut replaced = false;
    let mut out = Vec::with_capacity(existing.lines().count() + 1);
    for line in existing.lines() {
        if !replaced && line.trim_start().starts_with("HOOKS=") {
            out.push(order.hooks_line());
            replaced = true;
        } else {
            out.push(line.to_owned());
        }
    }
    if !replaced {
        bail!("mkinitcpio config has no HOOKS line");
    }
    Ok(out.join("\n") + "\n")
}

/// The kernel command line binding the encrypted partition to the boot-time
/// decrypt prompt: the LUKS UUID names the device to unlock, the mapper name
/// where to expose it, and the root LV path what to mount from inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootCmdline {
    pub luks_uuid: String,
    pub mapper: String,
    pub root_lv: PathBuf,
}

impl BootCmdline {
    pub fn render(&self) -> String {
        format!(
            "cryptdevice=UUID={}:{} root={}",
            self.luks_uuid,
            self.mapper,
            self.root_lv.display()
        )
    }
}

/// Substitute `cmdline` as the value of `GRUB_CMDLINE_LINUX` in the
/// bootloader default file, leaving every other line untouched.
pub fn substitute_grub_cmdline(grub_default: &str, cmdline: &str) -> Result<String> {
    let mut replaced = false;
    let mut out = Vec::with_capacity(grub_default.lines().count() + 1);
    for line in grub_default.lines() {
        if !replaced && line.trim_start().starts_with("GRUB_CMDLINE_LINUX=") {
            out.push(format!("GRUB_CMDLINE_LINUX=\"{cmdline}\""));
            replaced = true;
        } else {
            out.push(line.to_owned());
        }
    }
    if !replaced {
        bail!("bootloader default file has no GRUB_CMDLINE_LINUX line");
    }
    Ok(out.join("\n") + "\n")
}

/// Paths of the two boot-critical config files, relative to a mounted root.
pub fn mkinitcpio_conf(root: &Path) -> PathBuf {
    root.join("etc/mkinitcpio.conf")
}

pub fn grub_default(root: &Path) -> PathBuf {
    root.join("etc/default/grub")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn standard_order_is_valid() {
        assert!(HookOrder::standard().validate().is_ok());
    }

    #[rstest]
    // encrypt after filesystems: unbootable
    #[case(&["base", "udev", "block", "filesystems", "encrypt", "lvm2", "fsck"])]
    // lvm2 after filesystems
    #[case(&["base", "udev", "block", "encrypt", "filesystems", "lvm2", "fsck"])]
    // encrypt before block: device not yet visible
    #[case(&["base", "encrypt", "udev", "block", "lvm2", "filesystems", "fsck"])]
    // encrypt before keyboard: no way to type the passphrase
    #[case(&["base", "udev", "block", "encrypt", "keyboard", "lvm2", "filesystems", "fsck"])]
    // lvm2 before encrypt: vg is inside the mapper
    #[case(&["base", "udev", "block", "keyboard", "lvm2", "encrypt", "filesystems", "fsck"])]
    // fsck not last
    #[case(&["base", "udev", "block", "encrypt", "lvm2", "fsck", "filesystems"])]
    // missing encrypt entirely
    #[case(&["base", "udev", "block", "lvm2", "filesystems", "fsck"])]
    fn invalid_orders_are_rejected(#[case] hooks: &[&str]) {
        assert!(HookOrder::from_hooks(hooks.iter().copied()).is_err());
    }

    #[rstest]
    // minimal valid set
    #[case(&["block", "keyboard", "encrypt", "lvm2", "filesystems"])]
    // no fsck is fine; it is only constrained when present
    #[case(&["base", "udev", "autodetect", "block", "keyboard", "encrypt", "lvm2", "filesystems"])]
    fn valid_orders_pass(#[case] hooks: &[&str]) {
        assert!(HookOrder::from_hooks(hooks.iter().copied()).is_ok());
    }

    #[test]
    fn hooks_line_format() {
        let line = HookOrder::standard().hooks_line();
        assert!(line.starts_with("HOOKS=(base udev"));
        assert!(line.ends_with("filesystems fsck)"));
    }

    #[test]
    fn hooks_config_replaces_only_active_line() {
        let conf = "\
# vim:set ft=sh
MODULES=()
#HOOKS=(base udev autodetect modconf block filesystems fsck)
HOOKS=(base udev autodetect modconf block filesystems fsck)
COMPRESSION=\"zstd\"
";
        let rendered = render_hooks_config(conf, &HookOrder::standard()).unwrap();
        assert!(rendered.contains("#HOOKS=(base udev autodetect modconf block filesystems fsck)"));
        assert!(rendered.contains(&HookOrder::standard().hooks_line()));
        assert!(rendered.contains("COMPRESSION=\"zstd\""));
        assert_eq!(
            rendered.matches("\nHOOKS=").count(),
            1,
            "exactly one active HOOKS line"
        );
    }

    #[test]
    fn hooks_config_without_hooks_line_is_an_error() {
        assert!(render_hooks_config("MODULES=()\n", &HookOrder::standard()).is_err());
    }

    fn cmdline(uuid: &str) -> BootCmdline {
        BootCmdline {
            luks_uuid: uuid.to_owned(),
            mapper: "cryptlvm".to_owned(),
            root_lv: PathBuf::from("/dev/vg0/root"),
        }
    }

    #[test]
    fn cmdline_binds_uuid_mapper_and_root() {
        let rendered = cmdline("5b8b7cd2-6f63-4c8c-9a2e-2c8f17d0a111").render();
        assert_eq!(
            rendered,
            "cryptdevice=UUID=5b8b7cd2-6f63-4c8c-9a2e-2c8f17d0a111:cryptlvm root=/dev/vg0/root"
        );
    }

    #[test]
    fn substitution_is_injective_in_uuid() {
        let grub = "GRUB_TIMEOUT=5\nGRUB_CMDLINE_LINUX=\"\"\nGRUB_DISABLE_RECOVERY=true\n";
        let a = substitute_grub_cmdline(grub, &cmdline("aaaa-aaaa").render()).unwrap();
        let b = substitute_grub_cmdline(grub, &cmdline("bbbb-bbbb").render()).unwrap();
        assert_ne!(a, b);
        // changing the UUID changes the cmdline and nothing else
        let diff: Vec<(&str, &str)> = a
            .lines()
            .zip(b.lines())
            .filter(|(la, lb)| la != lb)
            .collect();
        assert_eq!(diff.len(), 1);
        assert!(diff[0].0.starts_with("GRUB_CMDLINE_LINUX="));
        assert_eq!(a.replace("aaaa-aaaa", "bbbb-bbbb"), b);
    }

    #[test]
    fn substitution_requires_existing_key() {
        assert!(substitute_grub_cmdline("GRUB_TIMEOUT=5\n", "x").is_err());
    }
}

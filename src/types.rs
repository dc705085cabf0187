use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A secret byte string (LUKS passphrase or account password).
///
/// Never printed, never placed on a command line or in the environment. The
/// only way out is [`Passphrase::as_bytes`], which stage code feeds to
/// external tools via piped stdin.
#[derive(Zeroize, ZeroizeOnDrop, Clone)]
pub struct Passphrase(Vec<u8>);

impl Passphrase {
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Passphrase {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<String> for Passphrase {
    fn from(value: String) -> Self {
        Self(value.into_bytes())
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(<redacted>)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeUnit {
    MiB,
    GiB,
}

/// A logical volume size of the form `<integer><unit>`, unit in {M, G}.
///
/// The original literal is kept so `lvcreate -L` receives exactly what the
/// user wrote, while [`SizeSpec::bytes`] backs the capacity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SizeSpec {
    count: u64,
    unit: SizeUnit,
}

impl SizeSpec {
    pub fn bytes(&self) -> u64 {
        match self.unit {
            SizeUnit::MiB => self.count * 1024 * 1024,
            SizeUnit::GiB => self.count * 1024 * 1024 * 1024,
        }
    }

    /// The `lvcreate -L` argument, e.g. `20G`.
    pub fn literal(&self) -> String {
        self.to_string()
    }
}

impl FromStr for SizeSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let Some(unit) = s.chars().last() else {
            bail!("empty size, expected `<integer>M` or `<integer>G`");
        };
        let unit = match unit {
            'M' => SizeUnit::MiB,
            'G' => SizeUnit::GiB,
            other => bail!("bad size unit `{other}`, expected `M` or `G`"),
        };
        let count: u64 = s[..s.len() - 1]
            .parse()
            .with_context(|| format!("bad size `{s}`, expected `<integer>M` or `<integer>G`"))?;
        if count == 0 {
            bail!("size must be non-zero");
        }
        Ok(Self { count, unit })
    }
}

impl TryFrom<String> for SizeSpec {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<SizeSpec> for String {
    fn from(value: SizeSpec) -> Self {
        value.to_string()
    }
}

impl fmt::Display for SizeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unit {
            SizeUnit::MiB => write!(f, "{}M", self.count),
            SizeUnit::GiB => write!(f, "{}G", self.count),
        }
    }
}

/// Filesystem written onto a block device by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsType {
    Vfat,
    Ext4,
    Swap,
}

impl fmt::Display for FsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsType::Vfat => f.write_str("vfat"),
            FsType::Ext4 => f.write_str("ext4"),
            FsType::Swap => f.write_str("swap"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("4G", 4 * 1024 * 1024 * 1024)]
    #[case("20G", 20 * 1024 * 1024 * 1024)]
    #[case("512M", 512 * 1024 * 1024)]
    fn size_spec_bytes(#[case] literal: &str, #[case] bytes: u64) {
        let spec: SizeSpec = literal.parse().unwrap();
        assert_eq!(spec.bytes(), bytes);
        assert_eq!(spec.literal(), literal);
    }

    #[rstest]
    #[case("")]
    #[case("20")]
    #[case("20K")]
    #[case("G")]
    #[case("0G")]
    #[case("-4G")]
    fn size_spec_rejects_bad_input(#[case] literal: &str) {
        assert!(literal.parse::<SizeSpec>().is_err());
    }

    #[test]
    fn passphrase_debug_is_redacted() {
        let p = Passphrase::from("hunter2".to_owned());
        assert_eq!(format!("{p:?}"), "Passphrase(<redacted>)");
    }
}

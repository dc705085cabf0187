use anyhow::{Context as _, Result};
use async_trait::async_trait;
use documented::{Documented, DocumentedFields};
use toml_edit::{Decor, DocumentMut, Item};

use crate::config::InstallConfig;

use super::Command;

/// Prints an example config with every field annotated from its doc
/// comment, ready to edit and feed back via `--config`.
pub struct TemplateCommand {}

#[async_trait]
impl Command for TemplateCommand {
    async fn run(&self) -> Result<()> {
        println!("{}", render_template(&InstallConfig::example())?);
        Ok(())
    }
}

fn render_template(config: &InstallConfig) -> Result<String> {
    let mut toml = toml_edit::ser::to_string_pretty(config)?
        .parse::<DocumentMut>()
        .context("Failed to reparse serialized config")?;

    for (mut key, value) in toml.as_table_mut().iter_mut() {
        let Ok(docs) = InstallConfig::get_field_docs(key.get()) else {
            continue;
        };
        match value {
            Item::Value(_) => set_docs_as_toml_comments(key.leaf_decor_mut(), docs),
            Item::Table(sub_table) => set_docs_as_toml_comments(sub_table.decor_mut(), docs),
            _ => {}
        }
    }

    let header: String = InstallConfig::DOCS
        .lines()
        .map(|l| {
            if l.is_empty() {
                "#\n".to_owned()
            } else {
                format!("# {l}\n")
            }
        })
        .collect();
    Ok(format!("{header}\n{toml}"))
}

fn set_docs_as_toml_comments(decor: &mut Decor, docs: &str) {
    let comments: String = docs
        .lines()
        .map(|l| {
            if l.is_empty() {
                "#\n".to_owned()
            } else {
                format!("# {l}\n")
            }
        })
        .collect();
    decor.set_prefix(format!("\n{comments}"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_is_annotated_and_parses_back() -> Result<()> {
        let rendered = render_template(&InstallConfig::example())?;
        // every field keeps its doc comment
        assert!(rendered.contains("# Hostname of the installed system."));
        assert!(rendered.contains("# Size of the swap logical volume"));
        // comments do not break round-tripping
        let parsed: InstallConfig = toml::from_str(&rendered)?;
        assert_eq!(parsed, InstallConfig::example());
        Ok(())
    }
}

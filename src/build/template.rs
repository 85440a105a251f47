//! `%%NAME%%` launcher templates.
//!
//! A placeholder is `%%` + identifier + `%%`. Every placeholder must have a
//! value; any other `%` text is copied through untouched.

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

const DELIMITER: &str = "%%";

/// A launcher template loaded from disk.
#[derive(Debug, Clone)]
pub struct LauncherTemplate {
    text: String,
}

impl LauncherTemplate {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading launcher template '{}'", path.display()))?;
        Ok(Self { text })
    }

    /// Substitute every placeholder.
    pub fn render(&self, values: &BTreeMap<&str, &str>) -> Result<String> {
        let mut out = String::with_capacity(self.text.len());
        let mut rest = self.text.as_str();

        while let Some(start) = rest.find(DELIMITER) {
            out.push_str(&rest[..start]);
            let after_open = &rest[start + DELIMITER.len()..];

            match placeholder_name(after_open) {
                Some(name) => {
                    let Some(value) = values.get(name) else {
                        bail!("launcher template references unknown placeholder '{name}'");
                    };
                    out.push_str(value);
                    rest = &after_open[name.len() + DELIMITER.len()..];
                }
                None => {
                    out.push_str(DELIMITER);
                    rest = after_open;
                }
            }
        }
        out.push_str(rest);
        Ok(out)
    }

    /// Render to `target` and mark the result executable.
    pub fn render_to(&self, target: &Path, values: &BTreeMap<&str, &str>) -> Result<()> {
        let rendered = self.render(values)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating '{}'", parent.display()))?;
        }
        fs::write(target, rendered)
            .with_context(|| format!("writing launcher '{}'", target.display()))?;
        fs::set_permissions(target, fs::Permissions::from_mode(0o755))
            .with_context(|| format!("setting permissions on '{}'", target.display()))?;
        Ok(())
    }
}

/// The identifier at the start of `text` if it is closed by `%%`.
fn placeholder_name(text: &str) -> Option<&str> {
    let len = text
        .char_indices()
        .take_while(|(i, c)| {
            if *i == 0 {
                c.is_ascii_alphabetic() || *c == '_'
            } else {
                c.is_ascii_alphanumeric() || *c == '_'
            }
        })
        .count();
    if len == 0 || !text[len..].starts_with(DELIMITER) {
        return None;
    }
    Some(&text[..len])
}

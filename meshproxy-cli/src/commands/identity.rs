//! Identity command handler

use anyhow::{Context, Result};
use colored::Colorize;
use meshproxy_types::LocalIdentity;
use std::path::PathBuf;

pub fn handle(name: &str, path: Option<PathBuf>, show: bool) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => identity_path(name)?,
    };

    let (local, created) = if show {
        let local = LocalIdentity::load(&path)
            .with_context(|| format!("No identity at {}", path.display()))?;
        (local, false)
    } else {
        LocalIdentity::load_or_create(&path)
            .with_context(|| format!("Failed to load identity from {}", path.display()))?
    };

    if created {
        println!("{} Created new identity", "✓".green().bold());
    } else {
        println!("{} Loaded identity", "→".cyan().bold());
    }
    println!("  File:       {}", path.display().to_string().dimmed());
    println!("  Address:    {}", local.address().to_string().cyan());
    println!("  Public key: {}", local.identity());

    Ok(())
}

/// `~/.meshproxy/<name>/identity`
fn identity_path(name: &str) -> Result<PathBuf> {
    if name.is_empty() || name.contains(std::path::is_separator) {
        anyhow::bail!("Invalid identity name: {:?}", name);
    }
    let home = dirs::home_dir().context("Cannot locate home directory")?;
    Ok(home.join(".meshproxy").join(name).join("identity"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creates_then_reuses_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gw").join("identity");

        handle("unused", Some(path.clone()), false).unwrap();
        let first = LocalIdentity::load(&path).unwrap().address();

        handle("unused", Some(path.clone()), true).unwrap();
        assert_eq!(LocalIdentity::load(&path).unwrap().address(), first);
    }

    #[test]
    fn test_show_missing_identity_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(handle("unused", Some(dir.path().join("identity")), true).is_err());
    }

    #[test]
    fn test_rejects_path_like_names() {
        assert!(identity_path("../x").is_err());
        assert!(identity_path("").is_err());
    }
}

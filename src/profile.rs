//! Profile discovery.
//!
//! A profile is a named environment pairing a backend config with a var
//! file. Profiles are never declared anywhere: a file stem present as both
//! `backend/<name>.tfbackend` and `vars/<name>.tfvars` constitutes one
//! profile, and a stem present on only one side is ignored.

use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

pub const BACKEND_DIR: &str = "backend";
pub const VARS_DIR: &str = "vars";

const BACKEND_EXT: &str = ".tfbackend";
const VARS_EXT: &str = ".tfvars";

/// A detected environment profile. Immutable once discovered.
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub name: String,
    pub backend_config: String,
    pub var_file: String,
    pub backend_dir: String,
    pub vars_dir: String,
}

/// Scan the current directory for profiles.
pub fn discover() -> Result<Vec<Profile>> {
    discover_in(Path::new("."))
}

/// Scan `root` for matching backend/var file pairs.
///
/// Missing `backend/` or `vars/` directories yield an empty list rather
/// than an error, so `profile list` works anywhere.
pub fn discover_in(root: &Path) -> Result<Vec<Profile>> {
    let backend_dir = root.join(BACKEND_DIR);
    let vars_dir = root.join(VARS_DIR);
    if !backend_dir.is_dir() || !vars_dir.is_dir() {
        return Ok(Vec::new());
    }

    let backends = scan_with_extension(&backend_dir, BACKEND_EXT)?;
    let vars = scan_with_extension(&vars_dir, VARS_EXT)?;

    let mut profiles = Vec::new();
    for (name, backend_config) in backends {
        if let Some(var_file) = vars.get(&name) {
            profiles.push(Profile {
                name,
                backend_config,
                var_file: var_file.clone(),
                backend_dir: BACKEND_DIR.to_string(),
                vars_dir: VARS_DIR.to_string(),
            });
        }
    }
    Ok(profiles)
}

/// Find a profile by name.
pub fn find<'a>(profiles: &'a [Profile], name: &str) -> Option<&'a Profile> {
    profiles.iter().find(|p| p.name == name)
}

/// All profile names, in discovery order.
pub fn names(profiles: &[Profile]) -> Vec<String> {
    profiles.iter().map(|p| p.name.clone()).collect()
}

/// Verify `root` holds an active terraform module before running anything.
pub fn ensure_active_dir(root: &Path) -> Result<()> {
    let entries = fs::read_dir(root).context("error reading module directory")?;
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }
        if is_active_file(&entry.file_name().to_string_lossy()) {
            return Ok(());
        }
    }
    bail!("current directory does not contain any terraform configuration files")
}

fn is_active_file(name: &str) -> bool {
    if !(name.ends_with(".tf") || name.ends_with(".tf.json")) {
        return false;
    }
    // Editor backups and generated droppings don't count as configuration.
    !(name.starts_with('.')
        || name.ends_with('~')
        || (name.starts_with('#') && name.ends_with('#')))
}

fn scan_with_extension(dir: &Path, extension: &str) -> Result<BTreeMap<String, String>> {
    let mut files = BTreeMap::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.with_context(|| format!("error scanning {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if let Some(stem) = name.strip_suffix(extension) {
            files.insert(stem.to_string(), name.into_owned());
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn discover_returns_empty_without_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let profiles = discover_in(tmp.path()).unwrap();
        assert!(profiles.is_empty());
    }

    #[test]
    fn discover_matches_backend_and_var_stems() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "backend/dev.tfbackend", "bucket = \"dev-bucket\"");
        write(tmp.path(), "vars/dev.tfvars", "environment = \"dev\"");
        write(tmp.path(), "backend/prod.tfbackend", "bucket = \"prod-bucket\"");
        write(tmp.path(), "vars/prod.tfvars", "environment = \"prod\"");

        let profiles = discover_in(tmp.path()).unwrap();
        assert_eq!(profiles.len(), 2);
        let listed = names(&profiles);
        assert!(listed.contains(&"dev".to_string()));
        assert!(listed.contains(&"prod".to_string()));

        let dev = find(&profiles, "dev").unwrap();
        assert_eq!(dev.backend_config, "dev.tfbackend");
        assert_eq!(dev.var_file, "dev.tfvars");
    }

    #[test]
    fn discover_ignores_orphaned_files() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "backend/dev.tfbackend", "");
        write(tmp.path(), "vars/dev.tfvars", "");
        write(tmp.path(), "backend/staging.tfbackend", "");

        let profiles = discover_in(tmp.path()).unwrap();
        assert_eq!(profiles.len(), 1);
        assert!(find(&profiles, "staging").is_none());
    }

    #[test]
    fn find_misses_unknown_profile() {
        let profiles = discover_in(Path::new("/nonexistent-terramux")).unwrap_or_default();
        assert!(find(&profiles, "nonexistent").is_none());
    }

    #[test]
    fn active_dir_requires_terraform_files() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(ensure_active_dir(tmp.path()).is_err());

        fs::write(tmp.path().join("main.tf"), "").unwrap();
        assert!(ensure_active_dir(tmp.path()).is_ok());
    }

    #[test]
    fn active_file_rules() {
        assert!(is_active_file("main.tf"));
        assert!(is_active_file("stack.tf.json"));
        assert!(!is_active_file("main.tf~"));
        assert!(!is_active_file(".hidden.tf"));
        assert!(!is_active_file("#main.tf#"));
        assert!(!is_active_file("README.md"));
    }
}

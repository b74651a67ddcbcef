//! Per-profile workspace isolation.
//!
//! Every profile gets an ephemeral sibling directory of the shared source
//! tree, populated with symlinks rather than copies. The one exception is
//! the tool's `.terraform` cache: its contents are linked individually so
//! cached provider plugins stay shared, while the workspace-local state
//! file is deliberately left out and materializes per workspace.
//!
//! Workspace names carry a random operation id, so teardown can only ever
//! remove this invocation's directories and concurrent invocations never
//! collide.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::os::unix::fs as unix_fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const TOOL_CACHE_DIR: &str = ".terraform";
const STATE_FILE_MARKER: &str = "terraform.tfstate";

pub struct WorkspaceManager {
    base_dir: PathBuf,
    operation_id: String,
    spaces: HashMap<String, PathBuf>,
}

impl WorkspaceManager {
    /// Manager rooted at the current directory.
    pub fn new() -> Result<Self> {
        let base_dir = std::env::current_dir().context("failed to get working directory")?;
        Ok(Self::with_base_dir(base_dir))
    }

    /// Manager rooted at an explicit source tree.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        let mut operation_id = Uuid::new_v4().simple().to_string();
        operation_id.truncate(8);
        Self {
            base_dir,
            operation_id,
            spaces: HashMap::new(),
        }
    }

    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    /// Create and populate one workspace per profile name.
    ///
    /// Workspaces are siblings of the source tree, named
    /// `.{base}-{profile}-{operation_id}` so they stay hidden from normal
    /// listings. Any failure aborts the whole allocation.
    pub fn allocate(&mut self, names: &[String]) -> Result<()> {
        let parent = self
            .base_dir
            .parent()
            .context("source directory has no parent")?
            .to_path_buf();
        let base_name = self.base_name()?.to_string();

        for name in names {
            let workspace = parent.join(format!(".{base_name}-{name}-{}", self.operation_id));
            fs::create_dir_all(&workspace)
                .with_context(|| format!("error creating workspace {}", workspace.display()))?;
            self.populate(&workspace, &base_name)
                .with_context(|| format!("error linking workspace for profile {name}"))?;
            self.spaces.insert(name.clone(), workspace);
        }
        Ok(())
    }

    /// Workspace path for a profile, if one was allocated.
    pub fn path_for(&self, name: &str) -> Option<&Path> {
        self.spaces.get(name).map(PathBuf::as_path)
    }

    /// Remove every workspace carrying this operation's id.
    ///
    /// Matching is on the `.{base}-` prefix and `-{operation_id}` suffix
    /// only, so the source tree and other operations' workspaces are never
    /// touched. Calling this twice is a no-op the second time.
    pub fn teardown(&mut self) -> Result<()> {
        let parent = self
            .base_dir
            .parent()
            .context("source directory has no parent")?;
        let base_name = self.base_name()?;
        let prefix = format!(".{base_name}-");
        let suffix = format!("-{}", self.operation_id);

        for entry in fs::read_dir(parent)
            .with_context(|| format!("error reading workspace parent {}", parent.display()))?
        {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(&prefix) && name.ends_with(&suffix) {
                fs::remove_dir_all(entry.path()).with_context(|| {
                    format!("error removing workspace {}", entry.path().display())
                })?;
            }
        }
        self.spaces.clear();
        Ok(())
    }

    fn base_name(&self) -> Result<&str> {
        self.base_dir
            .file_name()
            .and_then(|n| n.to_str())
            .context("source directory has no usable name")
    }

    fn populate(&self, workspace: &Path, base_name: &str) -> Result<()> {
        for entry in fs::read_dir(&self.base_dir).context("error reading source directory")? {
            let entry = entry?;
            let name = entry.file_name();
            let target = workspace.join(&name);

            if name == TOOL_CACHE_DIR {
                fs::create_dir_all(&target)?;
                link_cache_contents(&entry.path(), &target, base_name)?;
            } else {
                let source = Path::new("..").join(base_name).join(&name);
                unix_fs::symlink(&source, &target).with_context(|| {
                    format!("error creating symlink {}", target.display())
                })?;
            }
        }
        Ok(())
    }
}

/// Link the cache directory's entries individually, skipping per-workspace
/// state files. The skip is a name substring match, not a structural
/// guarantee; revisit if the tool changes its cache layout.
fn link_cache_contents(cache_dir: &Path, target_dir: &Path, base_name: &str) -> Result<()> {
    for entry in fs::read_dir(cache_dir)
        .with_context(|| format!("error reading cache directory {}", cache_dir.display()))?
    {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().contains(STATE_FILE_MARKER) {
            continue;
        }
        let source = Path::new("../..")
            .join(base_name)
            .join(TOOL_CACHE_DIR)
            .join(&name);
        let target = target_dir.join(&name);
        unix_fs::symlink(&source, &target)
            .with_context(|| format!("error creating symlink {}", target.display()))?;
    }
    Ok(())
}

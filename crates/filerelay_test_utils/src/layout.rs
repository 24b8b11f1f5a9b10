//! Isolated relay directory layouts for tests.

use anyhow::{Context, Result};
use filerelay::{DirectoryLayout, RelayConfig, SafeFileWriter};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// One of the four relay directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Staging,
    Input,
    Output,
    Errors,
}

impl Role {
    pub fn all() -> &'static [Role] {
        &[Role::Staging, Role::Input, Role::Output, Role::Errors]
    }
}

/// RAII guard owning a fresh `temp/in/out/errors` tree.
///
/// The tree lives in its own temp directory and is removed on Drop.
pub struct TestLayout {
    root: TempDir,
    layout: DirectoryLayout,
}

impl TestLayout {
    /// Create a new layout with all four directories present and empty.
    pub fn new() -> Result<Self> {
        let root = tempfile::Builder::new()
            .prefix("filerelay-test-")
            .tempdir()
            .context("Failed to create temp dir")?;
        let layout = DirectoryLayout::under(root.path());
        layout.ensure().context("Failed to create relay directories")?;
        debug!(root = %root.path().display(), "Created test layout");
        Ok(Self { root, layout })
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn layout(&self) -> &DirectoryLayout {
        &self.layout
    }

    /// Relay config over this layout: 20ms polling, content containing
    /// "explode" fails.
    pub fn config(&self) -> RelayConfig {
        let mut config = RelayConfig::with_layout(self.layout.clone());
        config.poll_interval_ms = 20;
        config.fail_on = Some("explode".to_string());
        config
    }

    pub fn writer(&self) -> SafeFileWriter {
        SafeFileWriter::from_layout(&self.layout)
    }

    pub fn dir(&self, role: Role) -> &Path {
        match role {
            Role::Staging => &self.layout.staging_dir,
            Role::Input => &self.layout.input_dir,
            Role::Output => &self.layout.output_dir,
            Role::Errors => &self.layout.error_dir,
        }
    }

    pub fn path(&self, role: Role, name: &str) -> PathBuf {
        self.dir(role).join(name)
    }

    pub fn contains(&self, role: Role, name: &str) -> bool {
        self.path(role, name).is_file()
    }

    pub fn read(&self, role: Role, name: &str) -> Result<String> {
        let path = self.path(role, name);
        fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))
    }

    /// Sorted names of the files in `role`'s directory.
    pub fn files(&self, role: Role) -> Result<Vec<String>> {
        let dir = self.dir(role);
        let mut names = Vec::new();
        for entry in fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Roles whose directory currently holds `name`.
    pub fn locate(&self, name: &str) -> Vec<Role> {
        Role::all()
            .iter()
            .copied()
            .filter(|role| self.contains(*role, name))
            .collect()
    }

    /// Delete everything under the four directories and recreate them empty.
    pub fn clean(&self) -> Result<()> {
        for role in Role::all() {
            let dir = self.dir(*role);
            if dir.exists() {
                debug!(dir = %dir.display(), "Deleting");
                fs::remove_dir_all(dir)
                    .with_context(|| format!("Failed to delete {}", dir.display()))?;
            }
            fs::create_dir_all(dir).with_context(|| {
                format!("Could not create {}. Check your directory permissions.", dir.display())
            })?;
        }
        Ok(())
    }
}

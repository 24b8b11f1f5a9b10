//! Staged writes into the input directory
//!
//! Content is written to a uniquely named file in the staging directory,
//! synced, closed, and only then renamed into the input directory. The rename
//! is the visibility boundary: the watcher never sees a partial file.

use crate::config::DirectoryLayout;
use crate::error::{validate_file_name, RelayError, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Writer that exposes files to the watcher atomically.
#[derive(Debug, Clone)]
pub struct SafeFileWriter {
    staging_dir: PathBuf,
    input_dir: PathBuf,
}

impl SafeFileWriter {
    pub fn new(staging_dir: impl Into<PathBuf>, input_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            input_dir: input_dir.into(),
        }
    }

    pub fn from_layout(layout: &DirectoryLayout) -> Self {
        Self::new(&layout.staging_dir, &layout.input_dir)
    }

    /// Write `content` as `name` into the input directory.
    ///
    /// Returns the final path in the input directory.
    pub fn write(&self, name: &str, content: impl AsRef<[u8]>) -> Result<PathBuf> {
        validate_file_name(name)?;

        let staged = self
            .staging_dir
            .join(format!(".{}.{}.staging", name, Uuid::new_v4().simple()));
        debug!(file = %name, staged = %staged.display(), "Writing staging file");

        if let Err(source) = write_synced(&staged, content.as_ref()) {
            if staged.exists() {
                if let Err(e) = fs::remove_file(&staged) {
                    warn!(staged = %staged.display(), error = %e, "Failed to remove partial staging file");
                }
            }
            return Err(RelayError::Write {
                name: name.to_string(),
                staged: None,
                source,
            });
        }

        let destination = self.input_dir.join(name);
        fs::rename(&staged, &destination).map_err(|source| RelayError::Write {
            name: name.to_string(),
            staged: Some(staged.clone()),
            source,
        })?;

        info!(file = %name, destination = %destination.display(), "Moved staged file into input directory");
        Ok(destination)
    }

    /// Copy an existing file's bytes into the input directory as `name`.
    pub fn write_file(&self, name: &str, source_path: &Path) -> Result<PathBuf> {
        let content = fs::read(source_path)?;
        self.write(name, content)
    }
}

fn write_synced(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content)?;
    file.flush()?;
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn layout(temp: &TempDir) -> DirectoryLayout {
        let layout = DirectoryLayout::under(temp.path());
        layout.ensure().unwrap();
        layout
    }

    #[test]
    fn test_write_moves_file_into_input() {
        let temp = TempDir::new().unwrap();
        let layout = layout(&temp);
        let writer = SafeFileWriter::from_layout(&layout);

        let path = writer.write("expectedToPass.txt", "hello").unwrap();

        assert_eq!(path, layout.input_dir.join("expectedToPass.txt"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello");
        assert_eq!(fs::read_dir(&layout.staging_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_write_rejects_path_like_names() {
        let temp = TempDir::new().unwrap();
        let writer = SafeFileWriter::from_layout(&layout(&temp));

        let err = writer.write("../escape.txt", "x").unwrap_err();
        assert!(matches!(err, RelayError::InvalidFileName(_)));
    }

    #[test]
    fn test_staging_failure_exposes_nothing() {
        let temp = TempDir::new().unwrap();
        let layout = layout(&temp);
        fs::remove_dir(&layout.staging_dir).unwrap();
        let writer = SafeFileWriter::from_layout(&layout);

        let err = writer.write("a.txt", "x").unwrap_err();

        match err {
            RelayError::Write { staged, .. } => assert!(staged.is_none()),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fs::read_dir(&layout.input_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_rename_failure_keeps_staged_file() {
        let temp = TempDir::new().unwrap();
        let layout = layout(&temp);
        fs::remove_dir(&layout.input_dir).unwrap();
        let writer = SafeFileWriter::from_layout(&layout);

        let err = writer.write("a.txt", "payload").unwrap_err();

        let staged = match err {
            RelayError::Write {
                staged: Some(staged),
                ..
            } => staged,
            other => panic!("unexpected error: {other}"),
        };
        assert!(staged.starts_with(&layout.staging_dir));
        assert_eq!(fs::read_to_string(staged).unwrap(), "payload");
    }

    #[test]
    fn test_write_file_copies_source() {
        let temp = TempDir::new().unwrap();
        let layout = layout(&temp);
        let source = temp.path().join("source.txt");
        fs::write(&source, "from disk").unwrap();

        let writer = SafeFileWriter::from_layout(&layout);
        let path = writer.write_file("copied.txt", &source).unwrap();

        assert_eq!(fs::read_to_string(path).unwrap(), "from disk");
        assert!(source.exists());
    }
}

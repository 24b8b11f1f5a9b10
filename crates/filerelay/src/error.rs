//! Error types for the relay

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Relay error type
///
/// Processing failures are not errors: they become
/// [`ProcessingOutcome::Failure`](crate::ProcessingOutcome) and are routed to
/// the error directory. Everything here breaks the delivery guarantee for the
/// file involved and is surfaced to the caller.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Failed to write '{name}' into the input directory: {source}")]
    Write {
        name: String,
        /// Staged copy left behind when the rename into the input directory failed
        staged: Option<PathBuf>,
        #[source]
        source: io::Error,
    },

    #[error("Failed to relocate '{name}' to {}: {source}", destination.display())]
    Relocation {
        name: String,
        destination: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Refusing to relocate '{name}': {} already exists", destination.display())]
    DestinationExists { name: String, destination: PathBuf },

    #[error("Invalid file name: {0:?}")]
    InvalidFileName(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl RelayError {
    /// True when the error left a file stuck in the input directory.
    pub fn is_relocation(&self) -> bool {
        matches!(
            self,
            RelayError::Relocation { .. } | RelayError::DestinationExists { .. }
        )
    }

    /// Name of the file this error concerns, if any.
    pub fn file_name(&self) -> Option<&str> {
        match self {
            RelayError::Write { name, .. }
            | RelayError::Relocation { name, .. }
            | RelayError::DestinationExists { name, .. } => Some(name),
            RelayError::InvalidFileName(name) => Some(name),
            RelayError::Config(_) | RelayError::Io(_) => None,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, RelayError>;

/// Validate that `name` is a plain, visible file name.
pub(crate) fn validate_file_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.starts_with('.')
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if invalid {
        return Err(RelayError::InvalidFileName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_file_name() {
        assert!(validate_file_name("expectedToPass.txt").is_ok());
        assert!(validate_file_name("a b.csv").is_ok());

        for bad in ["", ".", "..", ".hidden", "dir/file.txt", "dir\\file.txt", "nul\0"] {
            assert!(
                matches!(validate_file_name(bad), Err(RelayError::InvalidFileName(_))),
                "expected {bad:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_relocation_classification() {
        let err = RelayError::DestinationExists {
            name: "a.txt".to_string(),
            destination: PathBuf::from("/out/a.txt"),
        };
        assert!(err.is_relocation());
        assert_eq!(err.file_name(), Some("a.txt"));

        let err = RelayError::Config("bad".to_string());
        assert!(!err.is_relocation());
        assert_eq!(err.file_name(), None);
    }
}

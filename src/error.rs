use std::fmt;
use std::path::PathBuf;

/// Failure to read a package into memory.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("file is not a ZIP archive")]
    NotAZip,
    #[error("missing {0} (is this a DOCX file?)")]
    MissingPart(String),
    #[error("malformed XML in {part}: {message}")]
    Xml { part: String, message: String },
}

/// Failure to write a package to disk.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("zip: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("encoded package does not re-open: {0}")]
    Verify(#[source] Box<DecodeError>),
}

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("no valid input documents")]
    NoValidInputs,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Merge(#[from] MergeError),
}

/// Non-fatal problem recovered locally and reported next to a successful result.
#[derive(Clone, Debug, PartialEq)]
pub enum Warning {
    /// A merge input was skipped.
    PartialSkip { path: PathBuf, reason: String },
    /// A body reference had no relationship entry in its source document.
    ReferenceInconsistency { old_id: String },
    /// An image was missing or unreadable and was replaced by placeholder text.
    ImageResolutionFailure { path: PathBuf },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::PartialSkip { path, reason } => {
                write!(f, "skipped {}: {reason}", path.display())
            }
            Warning::ReferenceInconsistency { old_id } => {
                write!(f, "reference {old_id} has no relationship entry")
            }
            Warning::ImageResolutionFailure { path } => {
                write!(f, "image {} could not be embedded", path.display())
            }
        }
    }
}

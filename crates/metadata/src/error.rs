//! Metadata error types.

use std::path::PathBuf;
use thiserror::Error;

/// Metadata operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("invalid metadata path: {0}")]
    InvalidPath(String),

    #[error("failed to parse {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: quick_xml::de::DeError,
    },

    #[error("failed to parse metadata document: {0}")]
    Document(#[from] quick_xml::de::DeError),

    #[error("failed to serialize metadata document: {0}")]
    Serialize(#[from] quick_xml::se::SeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_parse_error_keeps_source() {
        let source = quick_xml::de::from_str::<crate::Metadata>("<metadata><versioning>")
            .unwrap_err();
        let err = MetadataError::Parse {
            path: PathBuf::from("/repo/g/a/maven-metadata.xml"),
            source,
        };
        assert!(err.to_string().contains("/repo/g/a/maven-metadata.xml"));
        assert!(err.source().is_some());
    }
}

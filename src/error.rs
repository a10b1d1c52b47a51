//! Error types for loading content, building the site, and serving it.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the content loader, the site builder and the preview server.
///
/// The helpers and controllers never produce errors; failures there are
/// contained by the highlighting engine or are plain no-ops.
#[derive(Error, Debug)]
pub enum SiteError {
    /// Filesystem error with the path that triggered it.
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The article has no leading `---` front matter block, or it is unterminated.
    #[error("{0}: missing or unterminated front matter")]
    MissingFrontMatter(PathBuf),

    /// Front matter YAML did not match the expected shape.
    #[error("{path}: invalid front matter: {source}")]
    FrontMatter {
        path: PathBuf,
        #[source]
        source: serde_yml::Error,
    },

    /// Two source files map to the same article slug.
    #[error("duplicate article slug '{slug}' ({first} and {second})")]
    DuplicateSlug {
        slug: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// Neither the file name nor the title yields a usable slug.
    #[error("{0}: cannot derive an article slug from the file name or title")]
    EmptySlug(PathBuf),

    /// Site configuration could not be parsed or is inconsistent.
    #[error("config error: {0}")]
    Config(String),

    /// The preview server could not bind a listening socket.
    #[error("bind failed: {0}")]
    Bind(String),
}

impl SiteError {
    /// Attach a path to an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        SiteError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for site operations.
pub type Result<T> = std::result::Result<T, SiteError>;

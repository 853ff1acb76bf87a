//! nimbus File Store
//!
//! A concurrent, local-disk store for temporary uploads. Clients hand over a byte stream and the
//! name it was uploaded under, receive an opaque key, and later download, bulk-archive or delete
//! the content by that key.
//!
//! ## Components
//!
//! - [`ExtensionPolicy`]: decides whether an upload's extension may be accepted
//! - [`transfer`]: bounded-buffer copy used for every byte moved in or out of the store
//! - [`MetadataCache`]: single-writer/multiple-reader index from key to content type(s)
//! - [`FileStore`] / [`LocalFileStore`]: upload, download, delete and teardown
//! - [`Archiver`]: all-or-nothing zip assembly from a list of keys
//!
//! ## Storage Layout
//!
//! ```text
//! <directory>/
//! ├── Xq3vT9aLk2Pw7bNc.png    # one regular file per upload, named by its key
//! └── 0mRfA81sZxYv4TQe.jpg
//! ```
//!
//! Content types live only in memory; the backing directory is removed in full on teardown.
//!
//! ## Example Usage
//!
//! ```no_run
//! use nimbus_files::{ExtensionSet, FileStore, LocalFileStore, StoreConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StoreConfig::builder(".nimbus_tmp")
//!     .extensions(ExtensionSet::images())
//!     .build()?;
//! let store = LocalFileStore::new(config)?;
//!
//! let key = store.upload(&mut &b"\xFF\xD8"[..], "photo.png", vec!["image/png".into()])?;
//! let download = store.download(key.as_str())?;
//! assert_eq!(download.content_types(), ["image/png"]);
//! store.teardown()?;
//! # Ok(())
//! # }
//! ```

mod archive;
mod config;
mod constants;
mod metadata;
mod policy;
mod store;
pub mod transfer;

pub use archive::Archiver;
pub use config::{EnvValues, ExtensionSet, StoreConfig, StoreConfigBuilder};
pub use constants::{
    ALL_EXTENSIONS, ARCHIVE_FILENAME, ARCHIVE_MEDIA_TYPE, COMPRESSED_EXTENSIONS,
    DEFAULT_FILE_FIELD, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_STORE_DIR, DEFAULT_TRANSFER_CHUNK_SIZE,
    IMAGE_EXTENSIONS, TEXT_EXTENSIONS,
};
pub use metadata::MetadataCache;
pub use nimbus_types::{FileKey, KeyError, NonEmptyText};
pub use policy::{extension_of, ExtensionPolicy, ExtensionRejection};
pub use store::{FileHandle, FileStore, LocalFileStore};

/// The four failure kinds a caller of the store has to distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or missing input; not retryable without correcting the request.
    BadRequest,
    /// The upload's extension is rejected by policy.
    ExtensionNotPermitted,
    /// The key does not resolve to a stored file.
    NotFound,
    /// Filesystem failure; may be transient.
    Io,
}

/// Errors that can occur during file store operations
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// Malformed or missing input
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Upload extension is not in the allow-list
    #[error("file extension not permitted: {0:?}")]
    ExtensionNotPermitted(String),

    /// Key does not resolve to a stored file
    #[error("file not found: {0}")]
    NotFound(String),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Zip archive could not be written
    #[error("failed to compile archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Store configuration is unusable
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl FilesError {
    /// Classifies this error into one of the caller-facing kinds.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BadRequest(_) | Self::InvalidConfig(_) => ErrorKind::BadRequest,
            Self::ExtensionNotPermitted(_) => ErrorKind::ExtensionNotPermitted,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Io(_) | Self::Archive(_) => ErrorKind::Io,
        }
    }
}

impl From<ExtensionRejection> for FilesError {
    fn from(rejection: ExtensionRejection) -> Self {
        match rejection {
            ExtensionRejection::NoExtension => Self::BadRequest(rejection.to_string()),
            ExtensionRejection::NotPermitted(ext) => Self::ExtensionNotPermitted(ext),
        }
    }
}

/// Result type for file store operations.
pub type FilesResult<T> = std::result::Result<T, FilesError>;

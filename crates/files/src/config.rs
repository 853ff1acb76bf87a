//! Store configuration.
//!
//! A [`StoreConfig`] is resolved once at process startup and handed to the store; nothing reads
//! the process environment during request handling. [`StoreConfig::from_env_values`] takes the raw
//! values rather than reading `std::env` itself so the parsing can be tested in isolation.

use crate::constants::{
    ALL_EXTENSIONS, COMPRESSED_EXTENSIONS, DEFAULT_FILE_FIELD, DEFAULT_MAX_UPLOAD_BYTES,
    DEFAULT_STORE_DIR, DEFAULT_TRANSFER_CHUNK_SIZE, IMAGE_EXTENSIONS, TEXT_EXTENSIONS,
};
use crate::{FilesError, FilesResult};
use nimbus_types::NonEmptyText;
use std::path::{Path, PathBuf};

/// Extensions an upload may carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionSet {
    /// Every extension is accepted.
    All,
    /// Only these extensions, matched verbatim (leading dot included).
    Only(Vec<String>),
}

impl ExtensionSet {
    pub fn only<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Only(extensions.into_iter().map(Into::into).collect())
    }

    pub fn images() -> Self {
        Self::only(IMAGE_EXTENSIONS.iter().copied())
    }

    pub fn compressed() -> Self {
        Self::only(COMPRESSED_EXTENSIONS.iter().copied())
    }

    pub fn text() -> Self {
        Self::only(TEXT_EXTENSIONS.iter().copied())
    }

    /// Parses a configuration value.
    ///
    /// Accepts `_all_` or `*`, one of the preset names `images`, `compressed` and `text`, or a
    /// comma-separated list of extensions each starting with a dot.
    pub fn parse(value: &str) -> FilesResult<Self> {
        let value = value.trim();
        match value {
            ALL_EXTENSIONS | "*" => return Ok(Self::All),
            "images" => return Ok(Self::images()),
            "compressed" => return Ok(Self::compressed()),
            "text" => return Ok(Self::text()),
            _ => {}
        }

        let extensions: Vec<String> = value
            .split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_owned)
            .collect();
        if extensions.is_empty() {
            return Err(FilesError::InvalidConfig(
                "extension allow-list cannot be empty".into(),
            ));
        }
        if let Some(bad) = extensions.iter().find(|e| !e.starts_with('.')) {
            return Err(FilesError::InvalidConfig(format!(
                "extension {bad:?} must start with '.'"
            )));
        }
        Ok(Self::Only(extensions))
    }
}

/// Immutable configuration of a file store.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    directory: PathBuf,
    max_upload_bytes: u64,
    chunk_size: usize,
    file_field: NonEmptyText,
    extensions: ExtensionSet,
    allow_no_extension: bool,
}

impl StoreConfig {
    /// Starts a configuration for a store backed by `directory`, with every other value at its
    /// default.
    pub fn builder(directory: impl Into<PathBuf>) -> StoreConfigBuilder {
        StoreConfigBuilder {
            directory: directory.into(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            chunk_size: DEFAULT_TRANSFER_CHUNK_SIZE,
            file_field: DEFAULT_FILE_FIELD.to_owned(),
            extensions: ExtensionSet::images(),
            allow_no_extension: false,
        }
    }

    /// Resolves a configuration from raw environment values.
    ///
    /// Absent or blank values fall back to the defaults.
    ///
    /// # Errors
    ///
    /// Returns `FilesError::InvalidConfig` if a present value cannot be parsed or the resulting
    /// configuration is rejected by [`StoreConfigBuilder::build`].
    pub fn from_env_values(values: EnvValues) -> FilesResult<Self> {
        fn present(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        fn parse_number<T: std::str::FromStr>(name: &str, value: String) -> FilesResult<T> {
            value
                .parse()
                .map_err(|_| FilesError::InvalidConfig(format!("{name} is not a number: {value}")))
        }

        let directory = present(values.store_dir).unwrap_or_else(|| DEFAULT_STORE_DIR.into());
        let mut builder = StoreConfig::builder(directory);

        if let Some(v) = present(values.max_upload_bytes) {
            builder = builder.max_upload_bytes(parse_number("NIMBUS_MAX_UPLOAD_BYTES", v)?);
        }
        if let Some(v) = present(values.chunk_size) {
            builder = builder.chunk_size(parse_number("NIMBUS_CHUNK_SIZE", v)?);
        }
        if let Some(v) = present(values.file_field) {
            builder = builder.file_field(v);
        }
        if let Some(v) = present(values.allowed_extensions) {
            builder = builder.extensions(ExtensionSet::parse(&v)?);
        }
        if let Some(v) = present(values.allow_no_extension) {
            let allow = match v.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(FilesError::InvalidConfig(format!(
                        "NIMBUS_ALLOW_NO_EXT is not a boolean: {v}"
                    )))
                }
            };
            builder = builder.allow_no_extension(allow);
        }

        builder.build()
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Name of the form field carrying an upload, also used as the key query parameter.
    pub fn file_field(&self) -> &str {
        self.file_field.as_str()
    }

    pub fn extensions(&self) -> &ExtensionSet {
        &self.extensions
    }

    pub fn allow_no_extension(&self) -> bool {
        self.allow_no_extension
    }
}

/// Builder for [`StoreConfig`].
#[derive(Debug, Clone)]
pub struct StoreConfigBuilder {
    directory: PathBuf,
    max_upload_bytes: u64,
    chunk_size: usize,
    file_field: String,
    extensions: ExtensionSet,
    allow_no_extension: bool,
}

impl StoreConfigBuilder {
    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    pub fn chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }

    pub fn file_field(mut self, name: impl Into<String>) -> Self {
        self.file_field = name.into();
        self
    }

    pub fn extensions(mut self, extensions: ExtensionSet) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn allow_no_extension(mut self, allow: bool) -> Self {
        self.allow_no_extension = allow;
        self
    }

    /// Validates and freezes the configuration.
    ///
    /// # Errors
    ///
    /// Returns `FilesError::InvalidConfig` for a zero chunk size, a zero upload limit or a blank
    /// file field name.
    pub fn build(self) -> FilesResult<StoreConfig> {
        if self.chunk_size == 0 {
            return Err(FilesError::InvalidConfig(
                "transfer chunk size must be non-zero".into(),
            ));
        }
        if self.max_upload_bytes == 0 {
            return Err(FilesError::InvalidConfig(
                "maximum upload size must be non-zero".into(),
            ));
        }
        let file_field = NonEmptyText::new(&self.file_field)
            .map_err(|_| FilesError::InvalidConfig("file field name cannot be empty".into()))?;

        Ok(StoreConfig {
            directory: self.directory,
            max_upload_bytes: self.max_upload_bytes,
            chunk_size: self.chunk_size,
            file_field,
            extensions: self.extensions,
            allow_no_extension: self.allow_no_extension,
        })
    }
}

/// Raw configuration values as read from the environment.
#[derive(Debug, Clone, Default)]
pub struct EnvValues {
    pub store_dir: Option<String>,
    pub max_upload_bytes: Option<String>,
    pub chunk_size: Option<String>,
    pub file_field: Option<String>,
    pub allowed_extensions: Option<String>,
    pub allow_no_extension: Option<String>,
}

impl EnvValues {
    /// Reads the `NIMBUS_*` variables from the process environment.
    pub fn from_process_env() -> Self {
        let var = |name: &str| std::env::var(name).ok();
        Self {
            store_dir: var("NIMBUS_STORE_DIR"),
            max_upload_bytes: var("NIMBUS_MAX_UPLOAD_BYTES"),
            chunk_size: var("NIMBUS_CHUNK_SIZE"),
            file_field: var("NIMBUS_FILE_FIELD"),
            allowed_extensions: var("NIMBUS_ALLOWED_EXTENSIONS"),
            allow_no_extension: var("NIMBUS_ALLOW_NO_EXT"),
        }
    }
}

//! Defaults and fixed names used by the file store.

/// Default size of the reusable transfer buffer, in bytes.
pub const DEFAULT_TRANSFER_CHUNK_SIZE: usize = 256;

/// Default maximum accepted upload size (10 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 << 20;

/// Default name of the file field in upload forms and download/delete queries.
pub const DEFAULT_FILE_FIELD: &str = "_file_";

/// Default backing directory, relative to the working directory.
pub const DEFAULT_STORE_DIR: &str = ".nimbus_tmp";

/// Allow-list value meaning every extension is accepted.
pub const ALL_EXTENSIONS: &str = "_all_";

/// Image extensions most commonly used on the web.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    ".apng", ".avif", ".gif", ".jpg", ".jpeg", ".jfif", ".pjpeg", ".pjp", ".png", ".svg", ".webp",
    ".bmp",
];

/// Compressed archive extensions.
pub const COMPRESSED_EXTENSIONS: &[&str] = &[".zip", ".tar", ".tgz", ".gz", ".bz2"];

/// Plain text extensions.
pub const TEXT_EXTENSIONS: &[&str] = &[".txt"];

/// Media type of a bulk download.
pub const ARCHIVE_MEDIA_TYPE: &str = "application/zip";

/// Suggested filename of a bulk download.
pub const ARCHIVE_FILENAME: &str = "archive.zip";

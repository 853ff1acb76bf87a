//! File store trait and its local-disk implementation.
//!
//! # Upload lifecycle
//!
//! 1. The extension of the declared filename is checked against the [`ExtensionPolicy`]; a
//!    rejected upload never touches the disk.
//! 2. A uniquely named backing file is created in the backing directory. Uniqueness comes from
//!    exclusive creation (`O_EXCL`) of a randomly named file, not from any lock held by the store.
//! 3. The source is copied into it through [`copy_chunked_limited`].
//! 4. Only once the bytes are on disk is the content type recorded in the [`MetadataCache`] and
//!    the key returned.
//!
//! Until step 4 the backing file is owned by a temporary-file guard, so any failure after
//! allocation removes the partial file. Between steps 3 and 4 the file exists without a cache
//! entry; no caller can observe this because the key has not been handed out yet.
//!
//! # Concurrency
//!
//! The metadata cache is the only shared mutable state and carries its own lock. Filesystem
//! operations rely on the OS: distinct keys never share a path, and a delete racing a download of
//! the same key may let the download either fail with `NotFound` or read the file one last time.

use crate::archive::Archiver;
use crate::config::StoreConfig;
use crate::metadata::MetadataCache;
use crate::policy::{extension_of, ExtensionPolicy};
use crate::transfer::{copy_chunked, copy_chunked_limited, LimitExceeded};
use crate::{FilesError, FilesResult};
use nimbus_types::FileKey;
use std::collections::HashSet;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Number of random characters in a generated key, before the extension.
const KEY_RANDOM_CHARS: usize = 16;

/// Capability set of a temporary file store.
///
/// All methods block the calling thread for the duration of their I/O.
pub trait FileStore: Send + Sync + std::fmt::Debug {
    /// Configuration the store was built with.
    fn config(&self) -> &StoreConfig;

    /// Persists everything read from `source` and returns the key of the new file.
    ///
    /// `original_filename` only contributes its extension; `content_types` is returned as is on
    /// every later download.
    ///
    /// # Errors
    ///
    /// - `BadRequest` for a blank filename, a missing extension when those are disallowed, or a
    ///   source longer than the configured maximum
    /// - `ExtensionNotPermitted` when the extension is not in the allow-list
    /// - `Io` when the backing file cannot be created or written
    fn upload(
        &self,
        source: &mut dyn Read,
        original_filename: &str,
        content_types: Vec<String>,
    ) -> FilesResult<FileKey>;

    /// Opens the file stored under `key` for reading.
    ///
    /// # Errors
    ///
    /// `NotFound` if `key` is not a plain file name or no such file is stored; `Io` otherwise.
    fn download(&self, key: &str) -> FilesResult<FileHandle>;

    /// Removes the file stored under `key` and forgets its content type.
    ///
    /// # Errors
    ///
    /// `NotFound` if `key` is not a plain file name or no such file is stored; `Io` otherwise.
    fn delete(&self, key: &str) -> FilesResult<()>;

    /// Builds a zip archive holding the files stored under `keys`, in order.
    ///
    /// Each entry is named by its key. The operation is all-or-nothing: the first key that cannot
    /// be archived aborts it and discards everything written so far.
    ///
    /// # Errors
    ///
    /// `NotFound` naming the first missing key, `BadRequest` for a key listed twice, `Io` if a
    /// file cannot be read or the archive cannot be written.
    fn archive(&self, keys: &[String]) -> FilesResult<Vec<u8>>;

    /// Removes the backing directory and everything in it.
    ///
    /// The store must not be used afterwards.
    fn teardown(&self) -> FilesResult<()>;
}

/// An opened stored file, ready to be streamed to a caller.
pub struct FileHandle {
    key: FileKey,
    content_types: Vec<String>,
    size: u64,
    reader: Box<dyn Read + Send>,
}

impl FileHandle {
    pub fn new(
        key: FileKey,
        content_types: Vec<String>,
        size: u64,
        reader: Box<dyn Read + Send>,
    ) -> Self {
        Self {
            key,
            content_types,
            size,
            reader,
        }
    }

    pub fn key(&self) -> &FileKey {
        &self.key
    }

    /// Content type values recorded at upload; empty if none were recorded.
    pub fn content_types(&self) -> &[String] {
        &self.content_types
    }

    /// Size of the stored file when it was opened.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Streams the remaining content into `writer` in chunks of `chunk_size` bytes.
    pub fn copy_to<W: Write + ?Sized>(&mut self, writer: &mut W, chunk_size: usize) -> io::Result<u64> {
        copy_chunked(&mut self.reader, writer, chunk_size)
    }
}

impl Read for FileHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl std::fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileHandle")
            .field("key", &self.key)
            .field("content_types", &self.content_types)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// [`FileStore`] keeping one regular file per upload in a local directory.
#[derive(Debug)]
pub struct LocalFileStore {
    config: StoreConfig,
    /// Canonicalised backing directory
    directory: PathBuf,
    policy: ExtensionPolicy,
    metadata: MetadataCache,
}

impl LocalFileStore {
    /// Creates a store with an empty metadata cache, creating the backing directory if needed.
    ///
    /// # Errors
    ///
    /// Returns `FilesError::Io` if the directory cannot be created or canonicalised.
    pub fn new(config: StoreConfig) -> FilesResult<Self> {
        Self::with_metadata(config, MetadataCache::new())
    }

    /// Creates a store around an existing metadata cache.
    pub fn with_metadata(config: StoreConfig, metadata: MetadataCache) -> FilesResult<Self> {
        let requested = config.directory();
        fs::create_dir_all(requested).map_err(|e| {
            FilesError::Io(io::Error::new(
                e.kind(),
                format!(
                    "Failed to create store directory {}: {}",
                    requested.display(),
                    e
                ),
            ))
        })?;
        let directory = requested.canonicalize().map_err(|e| {
            FilesError::Io(io::Error::new(
                e.kind(),
                format!("Cannot canonicalize path {}: {}", requested.display(), e),
            ))
        })?;

        let policy = ExtensionPolicy::new(config.extensions().clone(), config.allow_no_extension());
        tracing::info!(directory = %directory.display(), "file store ready");

        Ok(Self {
            config,
            directory,
            policy,
            metadata,
        })
    }

    /// Canonicalised backing directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn metadata(&self) -> &MetadataCache {
        &self.metadata
    }

    /// Resolves a client-supplied key to its backing path.
    ///
    /// Anything that is not a single plain file name is reported as not found, so a traversal
    /// attempt is indistinguishable from an unknown key.
    fn resolve(&self, raw_key: &str) -> FilesResult<(FileKey, PathBuf)> {
        let key = FileKey::parse(raw_key).map_err(|_| FilesError::NotFound(raw_key.to_owned()))?;
        let path = self.directory.join(key.as_str());
        Ok((key, path))
    }

    fn open_stored(&self, key: &FileKey, path: &Path) -> FilesResult<(fs::File, u64)> {
        let file = fs::File::open(path).map_err(|e| not_found_or_io(e, key))?;
        let meta = file.metadata()?;
        if !meta.is_file() {
            return Err(FilesError::NotFound(key.to_string()));
        }
        Ok((file, meta.len()))
    }
}

impl FileStore for LocalFileStore {
    fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn upload(
        &self,
        source: &mut dyn Read,
        original_filename: &str,
        content_types: Vec<String>,
    ) -> FilesResult<FileKey> {
        if original_filename.trim().is_empty() {
            return Err(FilesError::BadRequest("missing original filename".into()));
        }
        let extension = extension_of(original_filename);
        self.policy.check(extension)?;

        let mut staged = tempfile::Builder::new()
            .prefix("")
            .suffix(extension)
            .rand_bytes(KEY_RANDOM_CHARS)
            .tempfile_in(&self.directory)?;

        let max = self.config.max_upload_bytes();
        let written = copy_chunked_limited(
            source,
            staged.as_file_mut(),
            self.config.chunk_size(),
            max,
        )
        .map_err(|e| {
            if e.get_ref().is_some_and(|inner| inner.is::<LimitExceeded>()) {
                FilesError::BadRequest(format!("upload exceeds maximum size of {max} bytes"))
            } else {
                FilesError::Io(e)
            }
        })?;

        let (_file, path) = staged.keep().map_err(|e| FilesError::Io(e.error))?;
        let key = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| FileKey::parse(name).ok())
            .ok_or_else(|| {
                FilesError::Io(io::Error::other(format!(
                    "allocated file has no usable name: {}",
                    path.display()
                )))
            })?;

        self.metadata.put(key.as_str(), content_types);
        tracing::debug!(%key, bytes = written, "stored upload");
        Ok(key)
    }

    fn download(&self, key: &str) -> FilesResult<FileHandle> {
        let (key, path) = self.resolve(key)?;
        let (file, size) = self.open_stored(&key, &path)?;
        let content_types = self.metadata.get(key.as_str()).unwrap_or_default();
        Ok(FileHandle::new(key, content_types, size, Box::new(file)))
    }

    fn delete(&self, key: &str) -> FilesResult<()> {
        let (key, path) = self.resolve(key)?;
        fs::remove_file(&path).map_err(|e| not_found_or_io(e, &key))?;
        self.metadata.remove(key.as_str());
        tracing::debug!(%key, "deleted file");
        Ok(())
    }

    fn archive(&self, keys: &[String]) -> FilesResult<Vec<u8>> {
        let mut seen = HashSet::with_capacity(keys.len());
        let mut archiver = Archiver::in_memory(self.config.chunk_size());
        for raw_key in keys {
            let (key, path) = self.resolve(raw_key)?;
            if !seen.insert(key.clone()) {
                return Err(FilesError::BadRequest(format!(
                    "key listed more than once: {key}"
                )));
            }
            let (mut file, _) = self.open_stored(&key, &path)?;
            archiver.add_entry(key.as_str(), &mut file)?;
        }
        let entries = archiver.entries();
        let bytes = archiver.finish()?.into_inner();
        tracing::debug!(entries, bytes = bytes.len(), "compiled archive");
        Ok(bytes)
    }

    fn teardown(&self) -> FilesResult<()> {
        match fs::remove_dir_all(&self.directory) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.metadata.clear();
        tracing::info!(directory = %self.directory.display(), "file store torn down");
        Ok(())
    }
}

fn not_found_or_io(e: io::Error, key: &FileKey) -> FilesError {
    if e.kind() == io::ErrorKind::NotFound {
        FilesError::NotFound(key.to_string())
    } else {
        FilesError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtensionSet;
    use crate::ErrorKind;
    use std::io::Cursor;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn png_store(temp: &TempDir) -> LocalFileStore {
        let config = StoreConfig::builder(temp.path().join("store"))
            .extensions(ExtensionSet::only([".png"]))
            .build()
            .unwrap();
        LocalFileStore::new(config).unwrap()
    }

    fn open_store(temp: &TempDir) -> LocalFileStore {
        let config = StoreConfig::builder(temp.path().join("store"))
            .extensions(ExtensionSet::All)
            .chunk_size(7)
            .build()
            .unwrap();
        LocalFileStore::new(config).unwrap()
    }

    fn stored_names(store: &LocalFileStore) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(store.directory())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn read_all(store: &LocalFileStore, key: &str) -> (Vec<u8>, Vec<String>) {
        let mut handle = store.download(key).unwrap();
        let mut out = Vec::new();
        handle.copy_to(&mut out, 5).unwrap();
        (out, handle.content_types().to_vec())
    }

    #[test]
    fn test_new_creates_directory() {
        let temp = TempDir::new().unwrap();
        let store = png_store(&temp);
        assert!(store.directory().is_dir());
        assert!(stored_names(&store).is_empty());
    }

    #[test]
    fn test_upload_download_roundtrip() {
        let temp = TempDir::new().unwrap();
        let store = png_store(&temp);

        let key = store
            .upload(
                &mut Cursor::new(vec![0xFF, 0xD8]),
                "photo.png",
                vec!["image/png".into()],
            )
            .unwrap();

        assert!(key.as_str().ends_with(".png"));
        assert_eq!(key.as_str().len(), KEY_RANDOM_CHARS + ".png".len());
        assert_eq!(stored_names(&store), vec![key.to_string()]);

        let (bytes, types) = read_all(&store, key.as_str());
        assert_eq!(bytes, vec![0xFF, 0xD8]);
        assert_eq!(types, vec!["image/png".to_string()]);
        assert_eq!(store.download(key.as_str()).unwrap().size(), 2);
    }

    #[test]
    fn test_upload_larger_than_chunk() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        let payload: Vec<u8> = (0..=255).cycle().take(10_000).collect();

        let key = store
            .upload(&mut Cursor::new(payload.clone()), "blob.bin", vec![])
            .unwrap();

        let (bytes, types) = read_all(&store, key.as_str());
        assert_eq!(bytes, payload);
        assert!(types.is_empty());
    }

    #[test]
    fn test_upload_rejects_unlisted_extension_without_writing() {
        let temp = TempDir::new().unwrap();
        let store = png_store(&temp);

        let err = store
            .upload(&mut Cursor::new(b"hello".to_vec()), "notes.txt", vec![])
            .unwrap_err();

        assert!(matches!(err, FilesError::ExtensionNotPermitted(ref ext) if ext == ".txt"));
        assert!(stored_names(&store).is_empty());
    }

    #[test]
    fn test_upload_rejects_missing_extension() {
        let temp = TempDir::new().unwrap();
        let store = png_store(&temp);

        let err = store
            .upload(&mut Cursor::new(b"# readme".to_vec()), "README", vec![])
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert!(stored_names(&store).is_empty());
    }

    #[test]
    fn test_upload_without_extension_when_allowed() {
        let temp = TempDir::new().unwrap();
        let config = StoreConfig::builder(temp.path().join("store"))
            .extensions(ExtensionSet::All)
            .allow_no_extension(true)
            .build()
            .unwrap();
        let store = LocalFileStore::new(config).unwrap();

        let key = store
            .upload(&mut Cursor::new(b"plain".to_vec()), "README", vec![])
            .unwrap();

        assert_eq!(key.as_str().len(), KEY_RANDOM_CHARS);
        assert!(!key.as_str().contains('.'));
    }

    #[test]
    fn test_upload_rejects_blank_filename() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        let err = store
            .upload(&mut Cursor::new(b"x".to_vec()), "  ", vec![])
            .unwrap_err();
        assert!(matches!(err, FilesError::BadRequest(_)));
    }

    #[test]
    fn test_upload_over_limit_leaves_nothing_behind() {
        let temp = TempDir::new().unwrap();
        let config = StoreConfig::builder(temp.path().join("store"))
            .extensions(ExtensionSet::All)
            .max_upload_bytes(16)
            .chunk_size(4)
            .build()
            .unwrap();
        let store = LocalFileStore::new(config).unwrap();

        let err = store
            .upload(&mut Cursor::new(vec![1u8; 17]), "big.bin", vec![])
            .unwrap_err();
        assert!(matches!(err, FilesError::BadRequest(ref msg) if msg.contains("16")));
        assert!(stored_names(&store).is_empty());

        store
            .upload(&mut Cursor::new(vec![1u8; 16]), "fits.bin", vec![])
            .unwrap();
        assert_eq!(stored_names(&store).len(), 1);
    }

    #[test]
    fn test_failed_transfer_removes_partial_file() {
        struct FailsAfter(usize);
        impl Read for FailsAfter {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if self.0 == 0 {
                    return Err(io::Error::new(io::ErrorKind::ConnectionAborted, "client gone"));
                }
                let n = self.0.min(buf.len());
                buf[..n].fill(b'x');
                self.0 -= n;
                Ok(n)
            }
        }

        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);

        let err = store
            .upload(&mut FailsAfter(20), "partial.bin", vec![])
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(stored_names(&store).is_empty());
        assert!(store.metadata().is_empty());
    }

    #[test]
    fn test_download_unknown_and_traversal_keys_are_not_found() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        fs::write(temp.path().join("secret.txt"), b"outside").unwrap();

        for key in ["missing.png", "../secret.txt", "..", "", "sub/dir.png"] {
            let err = store.download(key).unwrap_err();
            assert!(
                matches!(err, FilesError::NotFound(_)),
                "{key:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_download_tolerates_missing_metadata() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        fs::write(store.directory().join("dropped-in.txt"), b"from elsewhere").unwrap();

        let (bytes, types) = read_all(&store, "dropped-in.txt");
        assert_eq!(bytes, b"from elsewhere");
        assert!(types.is_empty());
    }

    #[test]
    fn test_delete_then_download_is_not_found() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        let key = store
            .upload(&mut Cursor::new(b"bye".to_vec()), "bye.txt", vec!["text/plain".into()])
            .unwrap();

        store.delete(key.as_str()).unwrap();

        assert!(matches!(store.download(key.as_str()), Err(FilesError::NotFound(_))));
        assert!(store.metadata().get(key.as_str()).is_none());
        assert!(stored_names(&store).is_empty());
        assert!(matches!(store.delete(key.as_str()), Err(FilesError::NotFound(_))));
    }

    #[test]
    fn test_delete_rejects_traversal() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        let outside = temp.path().join("keep.txt");
        fs::write(&outside, b"keep me").unwrap();

        let err = store.delete("../keep.txt").unwrap_err();

        assert!(matches!(err, FilesError::NotFound(_)));
        assert!(outside.exists());
    }

    #[test]
    fn test_archive_contains_requested_files() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        let k1 = store
            .upload(&mut Cursor::new(b"first file".to_vec()), "a.txt", vec![])
            .unwrap();
        let k2 = store
            .upload(&mut Cursor::new(vec![9u8; 300]), "b.bin", vec![])
            .unwrap();

        let bytes = store.archive(&[k1.to_string(), k2.to_string()]).unwrap();

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);
        let mut first = Vec::new();
        archive.by_index(0).unwrap().read_to_end(&mut first).unwrap();
        let mut second = Vec::new();
        archive.by_index(1).unwrap().read_to_end(&mut second).unwrap();
        assert_eq!(first, b"first file");
        assert_eq!(second, vec![9u8; 300]);
        assert_eq!(archive.by_index(0).unwrap().name(), k1.as_str());
        assert_eq!(archive.by_index(1).unwrap().name(), k2.as_str());
    }

    #[test]
    fn test_archive_with_missing_key_fails_whole() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        let k1 = store
            .upload(&mut Cursor::new(b"present".to_vec()), "a.txt", vec![])
            .unwrap();

        let err = store
            .archive(&[k1.to_string(), "gone.txt".to_string()])
            .unwrap_err();

        assert!(matches!(err, FilesError::NotFound(ref key) if key == "gone.txt"));
        // the archived file itself is untouched
        assert_eq!(read_all(&store, k1.as_str()).0, b"present");
    }

    #[test]
    fn test_archive_rejects_duplicate_keys() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        let k = store
            .upload(&mut Cursor::new(b"once".to_vec()), "a.txt", vec![])
            .unwrap();

        let err = store.archive(&[k.to_string(), k.to_string()]).unwrap_err();
        assert!(matches!(err, FilesError::BadRequest(_)));
    }

    #[test]
    fn test_concurrent_uploads_get_distinct_keys() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        const N: usize = 32;

        let keys: Vec<(usize, FileKey)> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..N)
                .map(|i| {
                    let store = &store;
                    scope.spawn(move || {
                        let payload = format!("payload number {i}").repeat(i + 1);
                        let key = store
                            .upload(
                                &mut Cursor::new(payload.into_bytes()),
                                "same-name.txt",
                                vec![format!("text/x-{i}")],
                            )
                            .unwrap();
                        (i, key)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let distinct: HashSet<_> = keys.iter().map(|(_, k)| k.clone()).collect();
        assert_eq!(distinct.len(), N);

        for (i, key) in keys {
            let (bytes, types) = read_all(&store, key.as_str());
            assert_eq!(bytes, format!("payload number {i}").repeat(i + 1).into_bytes());
            assert_eq!(types, vec![format!("text/x-{i}")]);
        }
    }

    #[test]
    fn test_teardown_removes_everything() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);
        store
            .upload(&mut Cursor::new(b"temp".to_vec()), "a.txt", vec!["text/plain".into()])
            .unwrap();

        store.teardown().unwrap();

        assert!(!store.directory().exists());
        assert!(store.metadata().is_empty());
        // a second teardown has nothing left to do
        store.teardown().unwrap();
    }

    #[test]
    fn test_usable_as_trait_object() {
        let temp = TempDir::new().unwrap();
        let store: std::sync::Arc<dyn FileStore> = std::sync::Arc::new(png_store(&temp));
        assert_eq!(store.config().file_field(), "_file_");
        let key = store
            .upload(&mut &b"\x89PNG"[..], "x.png", vec!["image/png".into()])
            .unwrap();
        store.delete(key.as_str()).unwrap();
    }
}

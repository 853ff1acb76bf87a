//! Zip assembly for bulk downloads.

use crate::transfer::copy_chunked;
use crate::FilesResult;
use std::io::{Cursor, Read, Seek, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Streams entries into a zip archive one chunk at a time.
///
/// Dropping an `Archiver` without calling [`Archiver::finish`] leaves no usable archive behind:
/// the central directory is only written by `finish`, and an in-memory archiver's buffer is freed
/// with it.
pub struct Archiver<W: Write + Seek> {
    zip: ZipWriter<W>,
    chunk_size: usize,
    entries: usize,
}

impl Archiver<Cursor<Vec<u8>>> {
    /// Creates an archiver writing into a fresh in-memory buffer.
    pub fn in_memory(chunk_size: usize) -> Self {
        Self::new(Cursor::new(Vec::new()), chunk_size)
    }
}

impl<W: Write + Seek> Archiver<W> {
    pub fn new(sink: W, chunk_size: usize) -> Self {
        Self {
            zip: ZipWriter::new(sink),
            chunk_size,
            entries: 0,
        }
    }

    /// Adds a deflated entry called `name` holding everything read from `source`.
    ///
    /// Returns the number of uncompressed bytes stored.
    pub fn add_entry<R: Read + ?Sized>(&mut self, name: &str, source: &mut R) -> FilesResult<u64> {
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        self.zip.start_file(name, options)?;
        let written = copy_chunked(source, &mut self.zip, self.chunk_size)?;
        self.entries += 1;
        Ok(written)
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Writes the central directory and returns the underlying sink.
    pub fn finish(self) -> FilesResult<W> {
        Ok(self.zip.finish()?)
    }
}

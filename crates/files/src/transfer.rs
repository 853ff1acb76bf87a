//! Bounded-buffer streaming copy.
//!
//! Every byte that enters or leaves the store passes through [`copy_chunked`], which reads into a
//! single reusable buffer of `chunk_size` bytes and writes each chunk out before reading the next.
//! Nothing here ever holds more than one chunk of a payload in memory.

use std::io::{self, Read, Write};

/// Copies `reader` into `writer` in chunks of `chunk_size` bytes.
///
/// Returns the number of bytes written. Reads interrupted by a signal are retried; any other read
/// or write failure aborts the copy and is returned as is, with no indication of how much was
/// written. Callers treat such a failure as the loss of the whole transfer.
///
/// # Panics
///
/// Panics if `chunk_size` is zero.
pub fn copy_chunked<R, W>(reader: &mut R, writer: &mut W, chunk_size: usize) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    assert!(chunk_size > 0, "transfer chunk size must be non-zero");
    let mut buffer = vec![0u8; chunk_size];
    let mut written = 0u64;
    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buffer[..n])?;
        written += n as u64;
    }
    writer.flush()?;
    Ok(written)
}

/// Like [`copy_chunked`], but fails once more than `limit` bytes have been read.
///
/// On overflow the error has kind [`io::ErrorKind::InvalidData`] and wraps [`LimitExceeded`];
/// `writer` has received at most `limit` bytes by then.
pub fn copy_chunked_limited<R, W>(
    reader: &mut R,
    writer: &mut W,
    chunk_size: usize,
    limit: u64,
) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut bounded = LimitedReader {
        inner: reader,
        limit,
        remaining: limit,
    };
    copy_chunked(&mut bounded, writer, chunk_size)
}

/// Returned by [`copy_chunked_limited`] when the source is longer than the limit.
#[derive(Debug, thiserror::Error)]
#[error("stream exceeds limit of {limit} bytes")]
pub struct LimitExceeded {
    pub limit: u64,
}

struct LimitedReader<'a, R: ?Sized> {
    inner: &'a mut R,
    limit: u64,
    remaining: u64,
}

impl<R: Read + ?Sized> Read for LimitedReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.remaining == 0 {
            // Read one more byte to tell "exactly at the limit" from "over it".
            let mut extra = [0u8; 1];
            return match self.inner.read(&mut extra)? {
                0 => Ok(0),
                _ => Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    LimitExceeded { limit: self.limit },
                )),
            };
        }
        let max = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        let n = self.inner.read(&mut buf[..max])?;
        self.remaining -= n as u64;
        Ok(n)
    }
}

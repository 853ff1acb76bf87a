//! Adapters between async request/response bodies and the blocking file store.
//!
//! Both sides move data through a bounded channel of chunks, so at most
//! [`CHANNEL_DEPTH`] chunks of a payload are buffered between the two threads.

use axum::body::Bytes;
use futures::Stream;
use std::io::{self, Read, Write};
use tokio::sync::mpsc;

/// Chunks buffered between the async and blocking halves of a transfer.
pub const CHANNEL_DEPTH: usize = 4;

pub type ChunkSender = mpsc::Sender<io::Result<Bytes>>;
pub type ChunkReceiver = mpsc::Receiver<io::Result<Bytes>>;

pub fn chunk_channel() -> (ChunkSender, ChunkReceiver) {
    mpsc::channel(CHANNEL_DEPTH)
}

/// Blocking [`Read`] over chunks sent from an async task.
///
/// Must only be used off the async runtime (e.g. inside `spawn_blocking`). End of stream is the
/// sender being dropped; an `Err` chunk is returned to the reader as is.
pub struct ChunkReader {
    rx: ChunkReceiver,
    current: Bytes,
}

impl ChunkReader {
    pub fn new(rx: ChunkReceiver) -> Self {
        Self {
            rx,
            current: Bytes::new(),
        }
    }
}

impl Read for ChunkReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.current.is_empty() {
            match self.rx.blocking_recv() {
                Some(Ok(chunk)) => self.current = chunk,
                Some(Err(e)) => return Err(e),
                None => return Ok(0),
            }
        }
        let n = buf.len().min(self.current.len());
        let chunk = self.current.split_to(n);
        buf[..n].copy_from_slice(&chunk);
        Ok(n)
    }
}

/// Blocking [`Write`] that forwards every write as one chunk to an async receiver.
///
/// Fails with `BrokenPipe` once the receiving side has gone away, which is how an abandoned
/// download stops the copy feeding it.
pub struct ChunkWriter {
    tx: ChunkSender,
}

impl ChunkWriter {
    pub fn new(tx: ChunkSender) -> Self {
        Self { tx }
    }

    /// Passes `error` on to the receiver so the stream ends in failure rather than looking
    /// complete.
    pub fn fail(self, error: io::Error) {
        let _ = self.tx.blocking_send(Err(error));
    }
}

impl Write for ChunkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.tx
            .blocking_send(Ok(Bytes::copy_from_slice(buf)))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "receiver dropped"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Turns the receiving half of a chunk channel into a body stream.
pub fn receiver_stream(rx: ChunkReceiver) -> impl Stream<Item = io::Result<Bytes>> + Send {
    futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) })
}

//! INSTREAM chunk relay
//!
//! After `zINSTREAM`/`nINSTREAM` the client sends chunks of the form
//! `<u32 big-endian length><length bytes>`, ending with a zero length.
//! Chunks are forwarded byte-for-byte; their content is never inspected.

use crate::error::{Error, Result};
use crate::pool::{BufferClass, BufferPool, CHUNK_BUFFER_SIZE};
use tokio::io::{AsyncBufRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

/// Flush the backend output every this many chunks
const FLUSH_INTERVAL_CHUNKS: u64 = 10;

/// Log progress every this many chunks
const PROGRESS_LOG_INTERVAL_CHUNKS: u64 = 100;

/// Totals for one relayed stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Number of non-terminating chunks
    pub chunks: u64,
    /// Payload bytes, excluding length prefixes
    pub bytes: u64,
}

/// Relay chunks from `reader` to `writer` until the zero-length terminator
///
/// The writer is always flushed before returning, whether the stream
/// completed or failed.
///
/// # Panics
///
/// In debug builds, if `pool` does not hand out [`BufferClass::Chunk`]
/// buffers.
pub async fn relay_chunks<R, W>(
    reader: &mut R,
    writer: &mut W,
    pool: &BufferPool,
) -> Result<StreamStats>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    debug_assert_eq!(
        pool.class(),
        BufferClass::Chunk,
        "relay_chunks needs a chunk buffer pool"
    );
    let result = relay_loop(reader, writer, pool).await;
    let flushed = writer.flush().await;

    let stats = result?;
    flushed.map_err(|source| Error::IncompleteChunk {
        stage: "flush final data",
        source,
    })?;
    Ok(stats)
}

async fn relay_loop<R, W>(reader: &mut R, writer: &mut W, pool: &BufferPool) -> Result<StreamStats>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut stats = StreamStats::default();
    let mut size_bytes = [0u8; 4];

    loop {
        reader
            .read_exact(&mut size_bytes)
            .await
            .map_err(|source| Error::IncompleteChunk {
                stage: "read chunk size",
                source,
            })?;
        writer
            .write_all(&size_bytes)
            .await
            .map_err(|source| Error::IncompleteChunk {
                stage: "forward chunk size",
                source,
            })?;

        let size = u32::from_be_bytes(size_bytes);
        if size == 0 {
            debug!(
                chunks = stats.chunks,
                bytes = stats.bytes,
                "INSTREAM completed"
            );
            return Ok(stats);
        }

        if size as usize <= CHUNK_BUFFER_SIZE {
            let mut buf = pool.acquire();
            let chunk = &mut buf[..size as usize];
            reader
                .read_exact(chunk)
                .await
                .map_err(|source| Error::IncompleteChunk {
                    stage: "read chunk data",
                    source,
                })?;
            writer
                .write_all(chunk)
                .await
                .map_err(|source| Error::IncompleteChunk {
                    stage: "forward chunk data",
                    source,
                })?;
        } else {
            // Oversized chunks stream through without being held in memory
            let mut limited = (&mut *reader).take(u64::from(size));
            let copied = tokio::io::copy_buf(&mut limited, writer)
                .await
                .map_err(|source| Error::IncompleteChunk {
                    stage: "copy chunk data",
                    source,
                })?;
            if copied < u64::from(size) {
                return Err(Error::IncompleteChunk {
                    stage: "copy chunk data",
                    source: std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        format!("chunk truncated after {} of {} bytes", copied, size),
                    ),
                });
            }
        }

        stats.chunks += 1;
        stats.bytes += u64::from(size);

        if stats.chunks % PROGRESS_LOG_INTERVAL_CHUNKS == 0 {
            trace!(
                chunks = stats.chunks,
                bytes = stats.bytes,
                "INSTREAM progress"
            );
        }

        if stats.chunks % FLUSH_INTERVAL_CHUNKS == 0 {
            writer
                .flush()
                .await
                .map_err(|source| Error::IncompleteChunk {
                    stage: "flush data",
                    source,
                })?;
        }
    }
}

//! Delimited command reader

use crate::error::{Error, Result};
use crate::pool::BufferPool;
use crate::protocol::{Command, Delimiter};
use bytes::Bytes;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Read the next command from a buffered reader
///
/// Bytes are accumulated until a NUL or newline byte; the delimiter is
/// consumed but not included in the name. A delimiter with nothing before it
/// yields an empty command.
///
/// # Errors
/// - `Error::Eof` if the stream ends before any byte of a new command
/// - `Error::IncompleteCommand` if the stream ends in the middle of a command
/// - `Error::Io` if the underlying read fails
pub async fn read_command<R>(reader: &mut R, pool: &BufferPool) -> Result<Command>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = pool.acquire();

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Err(if buf.is_empty() {
                Error::Eof
            } else {
                Error::IncompleteCommand {
                    received: buf.len(),
                }
            });
        }

        let found = available
            .iter()
            .enumerate()
            .find_map(|(i, &b)| Delimiter::from_byte(b).map(|d| (i, d)));

        match found {
            Some((pos, delimiter)) => {
                buf.extend_from_slice(&available[..pos]);
                reader.consume(pos + 1);
                return Ok(Command::new(Bytes::copy_from_slice(&buf), delimiter));
            }
            None => {
                let len = available.len();
                buf.extend_from_slice(available);
                reader.consume(len);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::BufferClass;
    use tokio::io::BufReader;

    async fn read_one(input: &[u8]) -> Result<Command> {
        let pool = BufferPool::new(BufferClass::Command);
        let mut reader = input;
        read_command(&mut reader, &pool).await
    }

    #[tokio::test]
    async fn test_null_terminated() {
        let cmd = read_one(b"PING\0").await.unwrap();
        assert_eq!(&cmd.name[..], b"PING");
        assert_eq!(cmd.delimiter, Delimiter::Null);
    }

    #[tokio::test]
    async fn test_newline_terminated() {
        let cmd = read_one(b"VERSION\n").await.unwrap();
        assert_eq!(&cmd.name[..], b"VERSION");
        assert_eq!(cmd.delimiter, Delimiter::Newline);
    }

    #[tokio::test]
    async fn test_prefixed_command_kept_verbatim() {
        let cmd = read_one(b"zVERSIONCOMMANDS\0").await.unwrap();
        assert_eq!(&cmd.name[..], b"zVERSIONCOMMANDS");
        assert_eq!(cmd.delimiter, Delimiter::Null);
    }

    #[tokio::test]
    async fn test_empty_command() {
        let cmd = read_one(b"\n").await.unwrap();
        assert!(cmd.name.is_empty());
        assert_eq!(cmd.delimiter, Delimiter::Newline);
    }

    #[tokio::test]
    async fn test_incomplete_command() {
        let err = read_one(b"PING").await.unwrap_err();
        assert!(matches!(err, Error::IncompleteCommand { received: 4 }));
    }

    #[tokio::test]
    async fn test_eof_at_boundary() {
        let err = read_one(b"").await.unwrap_err();
        assert!(matches!(err, Error::Eof));
    }

    #[tokio::test]
    async fn test_first_delimiter_wins() {
        let cmd = read_one(b"SCAN /tmp\nPING\0").await.unwrap();
        assert_eq!(&cmd.name[..], b"SCAN /tmp");
        assert_eq!(cmd.delimiter, Delimiter::Newline);
    }

    #[tokio::test]
    async fn test_consecutive_commands() {
        let pool = BufferPool::new(BufferClass::Command);
        let mut reader: &[u8] = b"zPING\0nVERSION\n\0";

        let first = read_command(&mut reader, &pool).await.unwrap();
        let second = read_command(&mut reader, &pool).await.unwrap();
        let third = read_command(&mut reader, &pool).await.unwrap();

        assert_eq!(&first.name[..], b"zPING");
        assert_eq!(&second.name[..], b"nVERSION");
        assert!(third.name.is_empty());
        assert_eq!(third.delimiter, Delimiter::Null);
        assert!(matches!(
            read_command(&mut reader, &pool).await,
            Err(Error::Eof)
        ));
    }

    #[tokio::test]
    async fn test_command_split_across_reads() {
        let pool = BufferPool::new(BufferClass::Command);
        let mock = tokio_test::io::Builder::new()
            .read(b"zINS")
            .read(b"TRE")
            .read(b"AM\0")
            .build();
        let mut reader = BufReader::new(mock);

        let cmd = read_command(&mut reader, &pool).await.unwrap();
        assert_eq!(&cmd.name[..], b"zINSTREAM");
        assert_eq!(cmd.delimiter, Delimiter::Null);
    }

    #[tokio::test]
    async fn test_read_error_propagates() {
        let pool = BufferPool::new(BufferClass::Command);
        let mock = tokio_test::io::Builder::new()
            .read(b"PI")
            .read_error(std::io::Error::from(std::io::ErrorKind::ConnectionReset))
            .build();
        let mut reader = BufReader::new(mock);

        let err = read_command(&mut reader, &pool).await.unwrap_err();
        match err {
            Error::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::ConnectionReset),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_buffer_returned_to_pool() {
        let pool = BufferPool::new(BufferClass::Command);
        let mut reader: &[u8] = b"PING\n";
        read_command(&mut reader, &pool).await.unwrap();
        assert_eq!(pool.idle(), 1);

        let _ = read_command(&mut reader, &pool).await;
        assert_eq!(pool.idle(), 1);
    }

    #[tokio::test]
    async fn test_long_command_without_limit() {
        let mut input = vec![b'A'; 100_000];
        input.push(b'\n');
        let cmd = read_one(&input).await.unwrap();
        assert_eq!(cmd.name.len(), 100_000);
    }
}

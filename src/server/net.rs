use bytes::{BufMut, BytesMut};
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

/// Read one DNS message from a TCP stream.
///
/// A DNS TCP message is slightly different to a DNS UDP message: it
/// has a big-endian u16 prefix giving the total length of the
/// message.  This is redundant (since the header is fixed-size and
/// says how many fields there are, and the fields contain length
/// information), but it means the entire message can be read before
/// parsing begins.
///
/// Reads exactly the prefixed length, so a connection carrying
/// several messages back-to-back yields them one at a time, and a
/// length prefix split across packets still assembles.  Returns
/// `None` when the peer closes the connection cleanly between
/// messages.
pub async fn read_tcp_bytes(stream: &mut OwnedReadHalf) -> Result<Option<BytesMut>, TcpError> {
    let size = match stream.read_u16().await {
        Ok(size) => size,
        Err(error) if error.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(error) => return Err(TcpError::IO { id: None, error }),
    };

    let expected = size as usize;
    let mut bytes = BytesMut::with_capacity(expected);
    while bytes.len() < expected {
        let remaining = expected - bytes.len();
        match stream
            .read_buf(&mut (&mut bytes).limit(remaining))
            .await
        {
            Ok(0) => {
                return Err(TcpError::TooShort {
                    id: peek_id(&bytes),
                    expected,
                    actual: bytes.len(),
                });
            }
            Err(error) => {
                return Err(TcpError::IO {
                    id: peek_id(&bytes),
                    error,
                });
            }
            _ => (),
        }
    }

    Ok(Some(bytes))
}

fn peek_id(bytes: &[u8]) -> Option<u16> {
    if bytes.len() >= 2 {
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    } else {
        None
    }
}

/// An error that can occur when reading a DNS TCP message.
#[derive(Debug)]
pub enum TcpError {
    TooShort {
        id: Option<u16>,
        expected: usize,
        actual: usize,
    },
    IO {
        id: Option<u16>,
        error: io::Error,
    },
}

/// Write a serialised message to a TCP stream, preceded by the
/// two-octet length prefix.  The caller has already checked the
/// message fits in a u16.
pub async fn send_tcp_bytes(stream: &mut OwnedWriteHalf, bytes: &[u8]) -> Result<(), io::Error> {
    let len = bytes.len() as u16;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(bytes).await?;
    Ok(())
}

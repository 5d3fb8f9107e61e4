use std::{
    io::{self, Cursor},
    pin::Pin,
    task::{Context, Poll},
};

use async_compression::tokio::bufread::GzipDecoder;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader, ReadBuf};
use tracing::{instrument, warn};

use crate::{
    error::{Error, Result},
    storage::ObjectBody,
};

const HEADER_LEN: usize = 10;
const MAGIC: [u8; 2] = [0x1f, 0x8b];
const METHOD_DEFLATE: u8 = 8;
const RESERVED_FLAGS: u8 = 0xe0;

/// Decompressed view of a fetched object.
///
/// Reads are served by the gzip decoder. The fetched body stays owned by this reader and is
/// closed when the reader is closed or dropped.
pub struct DecompressingReader {
    inner: GzipDecoder<BufReader<ObjectBody>>,
}

impl DecompressingReader {
    /// Checks that `body` starts with a gzip header and wraps it in a decoder.
    ///
    /// The body is closed before returning an error.
    #[instrument(level = "trace", skip(body), err)]
    pub async fn new(mut body: ObjectBody) -> Result<Self> {
        let mut header = [0u8; HEADER_LEN];
        if let Err(e) = body.read_exact(&mut header).await {
            return Err(match e.kind() {
                io::ErrorKind::UnexpectedEof => {
                    warn!("object ends before a complete gzip header");
                    Error::MalformedStream("object ends before a complete gzip header".into())
                }
                _ => Error::Transport(e),
            });
        }

        check_header(&header)?;

        let replayed: ObjectBody = Box::new(Cursor::new(header).chain(body));
        let mut decoder = GzipDecoder::new(BufReader::new(replayed));
        decoder.multiple_members(true);

        Ok(Self { inner: decoder })
    }

    /// Closes the underlying object body. Unread data is discarded.
    pub fn close(self) {
        drop(self.inner.into_inner());
    }
}

fn check_header(header: &[u8; HEADER_LEN]) -> Result<()> {
    if header[..2] != MAGIC {
        warn!(magic = ?&header[..2], "object is not gzip");
        return Err(Error::MalformedStream(format!(
            "bad magic bytes {:02x}{:02x}",
            header[0], header[1]
        )));
    }
    if header[2] != METHOD_DEFLATE {
        return Err(Error::MalformedStream(format!(
            "unsupported compression method {}",
            header[2]
        )));
    }
    if header[3] & RESERVED_FLAGS != 0 {
        return Err(Error::MalformedStream(format!(
            "reserved header flags set ({:#04x})",
            header[3]
        )));
    }

    Ok(())
}

impl AsyncRead for DecompressingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl std::fmt::Debug for DecompressingReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecompressingReader").finish_non_exhaustive()
    }
}

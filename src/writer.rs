use std::{
    future::Future,
    io,
    pin::Pin,
    task::{Context, Poll, ready},
};

use async_compression::{Level, tokio::write::GzipEncoder};
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf},
    sync::oneshot,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, instrument};

use crate::{
    config::CompressionConfig,
    error::{Error, Result},
};

/// Starts the compression task for one upload.
///
/// Returns the read end of the pipe the task writes gzip into, and the task's handle. The
/// handle resolves exactly once, to the number of uncompressed bytes consumed or to the
/// first error. The write end is always closed before the handle resolves.
pub(crate) fn spawn_compressor<R>(
    source: R,
    config: &CompressionConfig,
    stop: CancellationToken,
) -> (PipeReader, JoinHandle<Result<u64>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (pipe_reader, pipe_writer) = tokio::io::duplex(config.pipe_capacity);
    let (sealed_tx, sealed_rx) = oneshot::channel();
    let level = config.gzip_level();

    let task = tokio::spawn(
        async move {
            let res = compress_into(source, pipe_writer, level, &stop).await;
            let _ = sealed_tx.send(res.as_ref().map(|_| ()).map_err(describe));

            res
        }
        .in_current_span(),
    );

    (PipeReader::new(pipe_reader, sealed_rx), task)
}

/// Copies `source` through a gzip encoder into `sink`, then finalizes the stream.
///
/// On success `sink` has been shut down after the gzip trailer. On failure `sink` is dropped
/// as is, without a trailer.
#[instrument(level = "debug", skip_all, err)]
pub(crate) async fn compress_into<R, W>(
    mut source: R,
    sink: W,
    level: Level,
    stop: &CancellationToken,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut encoder = GzipEncoder::with_quality(sink, level);

    let copied = tokio::select! {
        biased;
        _ = stop.cancelled() => return Err(Error::Cancelled),
        res = tokio::io::copy(&mut source, &mut encoder) => {
            res.map_err(|e| Error::compression("failed to copy source into gzip encoder", e))?
        }
    };

    tokio::select! {
        biased;
        _ = stop.cancelled() => return Err(Error::Cancelled),
        res = encoder.shutdown() => {
            res.map_err(|e| Error::compression("failed to finalize gzip stream", e))?
        }
    }

    tracing::debug!(uncompressed = copied, "gzip stream finalized");

    Ok(copied)
}

/// Error text including its source, for the store side of the pipe.
fn describe(err: &Error) -> String {
    match std::error::Error::source(err) {
        Some(source) => format!("{err}: {source}"),
        None => err.to_string(),
    }
}

/// Outcome of the task as seen by the reader: `Err` carries the failure text.
type SealOutcome = std::result::Result<(), String>;

enum Seal {
    Waiting(oneshot::Receiver<SealOutcome>),
    Sealed,
    Broken(String),
}

/// Read end of the upload pipe.
///
/// The pipe reports EOF both when the encoder finished and when the task gave up and dropped
/// its end. Only the first is a complete object, so EOF is held back until the task confirms
/// the trailer was written, and turned into an error otherwise.
pub(crate) struct PipeReader {
    pipe: DuplexStream,
    seal: Seal,
}

impl PipeReader {
    fn new(pipe: DuplexStream, sealed: oneshot::Receiver<SealOutcome>) -> Self {
        Self {
            pipe,
            seal: Seal::Waiting(sealed),
        }
    }
}

impl AsyncRead for PipeReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        let before = buf.filled().len();
        ready!(Pin::new(&mut this.pipe).poll_read(cx, buf))?;
        if buf.filled().len() > before || buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        match &mut this.seal {
            Seal::Sealed => Poll::Ready(Ok(())),
            Seal::Broken(cause) => Poll::Ready(Err(truncated(cause))),
            Seal::Waiting(rx) => {
                let cause = match ready!(Pin::new(rx).poll(cx)) {
                    Ok(Ok(())) => {
                        this.seal = Seal::Sealed;
                        return Poll::Ready(Ok(()));
                    }
                    Ok(Err(cause)) => cause,
                    Err(_) => "compression task exited without a result".to_owned(),
                };
                let err = truncated(&cause);
                this.seal = Seal::Broken(cause);
                Poll::Ready(Err(err))
            }
        }
    }
}

fn truncated(cause: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("compressed stream ended before the encoder finished ({cause})"),
    )
}

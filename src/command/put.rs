use std::io;

use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::{
    config::CompressionConfig,
    error::{Error, Result},
    storage::{ObjectPutter, PutObjectInput, PutObjectOutput},
    writer,
};

/// Compresses `source` into the object `bucket/key` while it is being uploaded.
///
/// The upload and the compression task run side by side, connected by a bounded pipe. The
/// call returns only after the task has finished, so a failure at the end of the stream is
/// never hidden behind a successful upload. If both fail the upload error is returned.
#[instrument(skip(putter, config, cancel, source), err)]
pub async fn put<P, R>(
    putter: &P,
    config: &CompressionConfig,
    cancel: &CancellationToken,
    source: R,
    bucket: &str,
    key: &str,
) -> Result<PutObjectOutput>
where
    P: ObjectPutter + ?Sized,
    R: AsyncRead + Unpin + Send + 'static,
{
    super::check_location(bucket, key)?;
    config.validate()?;

    let stop = cancel.child_token();
    // stops the compression task if this future is dropped mid-upload
    let _stop_on_drop = stop.clone().drop_guard();

    let (body, task) = writer::spawn_compressor(source, config, stop.clone());

    let input = PutObjectInput {
        bucket: bucket.to_owned(),
        key: key.to_owned(),
        body: Box::new(body),
    };
    let uploaded = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        res = putter.put_object(input) => res.map_err(Error::Transport),
    };

    // The read end went into the upload and has been released with it. Stop the task in
    // case it is still producing, then collect its outcome.
    stop.cancel();
    let compressed = match task.await {
        Ok(res) => res,
        Err(e) => Err(Error::Task(e)),
    };

    let (result, discarded) = settle(uploaded, compressed, cancel.is_cancelled());
    if let Some(e) = discarded {
        warn!(error = %e, "compression also failed after upload error");
    }

    result
}

/// Merges the upload and task outcomes. The upload error wins; a task error it hides is
/// returned alongside unless it is the stop this call sent itself.
fn settle(
    uploaded: Result<PutObjectOutput>,
    compressed: Result<u64>,
    caller_cancelled: bool,
) -> (Result<PutObjectOutput>, Option<Error>) {
    match (uploaded, compressed) {
        (Ok(receipt), Ok(uncompressed)) => {
            debug!(
                uncompressed,
                compressed = receipt.size,
                etag = ?receipt.etag,
                "object stored"
            );
            (Ok(receipt), None)
        }
        (Ok(_), Err(Error::Cancelled)) if !caller_cancelled => (
            Err(Error::compression(
                "upload finished before the compressed stream was consumed",
                io::ErrorKind::BrokenPipe.into(),
            )),
            None,
        ),
        (Ok(_), Err(e)) => (Err(e), None),
        (Err(e), Ok(_)) | (Err(e), Err(Error::Cancelled)) => (Err(e), None),
        (Err(e), Err(discarded)) => (Err(e), Some(discarded)),
    }
}

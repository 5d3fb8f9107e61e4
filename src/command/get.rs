use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::{
    error::{Error, Result},
    reader::DecompressingReader,
    storage::{GetObjectInput, ObjectGetter},
};

/// Fetches `bucket/key` and returns a reader over its decompressed content.
///
/// Store failures come back as [`Error::Transport`], a body that is not gzip as
/// [`Error::MalformedStream`]. In both cases nothing is left open.
#[instrument(skip(getter, cancel), err)]
pub async fn get<G>(
    getter: &G,
    cancel: &CancellationToken,
    bucket: &str,
    key: &str,
) -> Result<DecompressingReader>
where
    G: ObjectGetter + ?Sized,
{
    super::check_location(bucket, key)?;

    let input = GetObjectInput {
        bucket: bucket.to_owned(),
        key: key.to_owned(),
    };
    let body = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        res = getter.get_object(input) => res.map_err(Error::Transport)?,
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        res = DecompressingReader::new(body) => res,
    }
}

use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::{
    command,
    config::CompressionConfig,
    error::Result,
    reader::DecompressingReader,
    storage::{ObjectGetter, ObjectPutter, PutObjectOutput},
};

/// Gzip-on-write, gunzip-on-read front for an object store.
///
/// `put` only needs `P: ObjectPutter` and `get` only needs `G: ObjectGetter`, so either side
/// can be left as `()` when a caller only ever writes or only ever reads.
#[derive(Debug, Clone)]
pub struct Client<G, P> {
    getter: G,
    putter: P,
    config: CompressionConfig,
}

impl<G, P> Client<G, P> {
    pub fn new(getter: G, putter: P) -> Self {
        Self {
            getter,
            putter,
            config: CompressionConfig::default(),
        }
    }

    pub fn with_config(mut self, config: CompressionConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;

        Ok(self)
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }
}

impl<S> Client<Arc<S>, Arc<S>>
where
    S: ObjectGetter + ObjectPutter,
{
    /// Uses one store for both directions.
    pub fn from_store(store: S) -> Self {
        let store = Arc::new(store);
        Self::new(Arc::clone(&store), store)
    }
}

impl<G, P> Client<G, P>
where
    P: ObjectPutter,
{
    pub async fn put<R>(
        &self,
        cancel: &CancellationToken,
        source: R,
        bucket: &str,
        key: &str,
    ) -> Result<PutObjectOutput>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        command::put::put(&self.putter, &self.config, cancel, source, bucket, key).await
    }
}

impl<G, P> Client<G, P>
where
    G: ObjectGetter,
{
    pub async fn get(
        &self,
        cancel: &CancellationToken,
        bucket: &str,
        key: &str,
    ) -> Result<DecompressingReader> {
        command::get::get(&self.getter, cancel, bucket, key).await
    }
}

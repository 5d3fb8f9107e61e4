use std::{io, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

pub use fs::FsObjectStore;

mod fs;

/// A streamed object body, owned by whoever holds it. Dropping it closes it.
pub type ObjectBody = Box<dyn AsyncRead + Unpin + Send>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetObjectInput {
    pub bucket: String,
    pub key: String,
}

pub struct PutObjectInput {
    pub bucket: String,
    pub key: String,
    pub body: ObjectBody,
}

impl std::fmt::Debug for PutObjectInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PutObjectInput")
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Acknowledgement returned by a store once a body has been stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutObjectOutput {
    pub etag: Option<String>,
    /// Stored (compressed) size in bytes.
    pub size: u64,
}

#[async_trait]
pub trait ObjectGetter: Send + Sync {
    async fn get_object(&self, input: GetObjectInput) -> io::Result<ObjectBody>;
}

/// Implementations must read `body` to EOF before reporting success.
#[async_trait]
pub trait ObjectPutter: Send + Sync {
    async fn put_object(&self, input: PutObjectInput) -> io::Result<PutObjectOutput>;
}

#[async_trait]
impl<T: ObjectGetter + ?Sized> ObjectGetter for Arc<T> {
    async fn get_object(&self, input: GetObjectInput) -> io::Result<ObjectBody> {
        (**self).get_object(input).await
    }
}

#[async_trait]
impl<T: ObjectPutter + ?Sized> ObjectPutter for Arc<T> {
    async fn put_object(&self, input: PutObjectInput) -> io::Result<PutObjectOutput> {
        (**self).put_object(input).await
    }
}

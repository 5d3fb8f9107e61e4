use std::{
    ffi::OsString,
    fmt::Debug,
    io,
    ops::Deref,
    path::{Component, Path, PathBuf},
    pin::Pin,
    task::{Context, Poll, ready},
};

use async_trait::async_trait;
use fs2::FileExt;
use tokio::{
    fs,
    io::{AsyncWrite, AsyncWriteExt},
};
use tracing::instrument;

use super::{
    GetObjectInput, ObjectBody, ObjectGetter, ObjectPutter, PutObjectInput, PutObjectOutput,
};

/// Staging files are `<key>.partial`, so no stored name may end with it.
const PARTIAL_SUFFIX: &str = ".partial";

/// Exclusive advisory lock on an object that is being written.
struct WriteLock {
    inner: std::fs::File,
}

impl WriteLock {
    fn try_new(file: std::fs::File) -> io::Result<Self> {
        FileExt::try_lock_exclusive(&file).map_err(|e| {
            if e.kind() == fs2::lock_contended_error().kind() {
                io::Error::new(
                    io::ErrorKind::WouldBlock,
                    "object is being written by another writer",
                )
            } else {
                e
            }
        })?;

        Ok(Self { inner: file })
    }
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.inner);
    }
}

impl Deref for WriteLock {
    type Target = std::fs::File;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Object store over a local directory, `<root>/<bucket>/<key>`.
#[derive(Debug)]
pub struct FsObjectStore {
    root: PathBuf,
    allow_overwrite: bool,
}

impl FsObjectStore {
    #[instrument(err)]
    pub async fn new<P: Into<PathBuf> + Debug>(root: P, allow_overwrite: bool) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;

        Ok(Self {
            root,
            allow_overwrite,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, key: &str) -> io::Result<PathBuf> {
        let bucket = checked_relative(bucket, "bucket")?;
        if bucket.components().count() != 1 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("bucket {:?} must be a single path component", bucket),
            ));
        }
        let key = checked_relative(key, "key")?;

        Ok(self.root.join(bucket).join(key))
    }

    /// Moves a fully written staging file into place. Runs while the staging lock is held, so
    /// the overwrite check cannot race another writer of the same object.
    async fn commit(&self, partial: &Path, path: &Path) -> io::Result<()> {
        if !self.allow_overwrite && fs::try_exists(path).await? {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("object {} already exists", path.display()),
            ));
        }

        fs::rename(partial, path).await
    }
}

fn checked_relative<'a>(name: &'a str, what: &str) -> io::Result<&'a Path> {
    let path = Path::new(name);
    let valid = !name.is_empty()
        && !name.ends_with('/')
        && path.components().all(|c| match c {
            Component::Normal(part) => !part
                .as_encoded_bytes()
                .ends_with(PARTIAL_SUFFIX.as_bytes()),
            _ => false,
        });

    if !valid {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid {what} name {name:?}"),
        ));
    }

    Ok(path)
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(PARTIAL_SUFFIX);
    path.with_file_name(name)
}

/// Writer that hashes and counts everything passed through to `inner`.
struct HashingWriter<W> {
    inner: W,
    hasher: blake3::Hasher,
    size: u64,
}

impl<W> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: blake3::Hasher::new(),
            size: 0,
        }
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for HashingWriter<W> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let n = ready!(Pin::new(&mut self.inner).poll_write(cx, buf))?;
        self.hasher.update(&buf[..n]);
        self.size += n as u64;

        Poll::Ready(Ok(n))
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

async fn write_body(file: std::fs::File, mut body: ObjectBody) -> io::Result<PutObjectOutput> {
    let mut writer = HashingWriter::new(fs::File::from_std(file));

    tokio::io::copy(&mut body, &mut writer).await?;
    writer.flush().await?;
    writer.inner.sync_all().await?;

    Ok(PutObjectOutput {
        etag: Some(writer.hasher.finalize().to_hex().to_string()),
        size: writer.size,
    })
}

#[async_trait]
impl ObjectGetter for FsObjectStore {
    #[instrument(skip(self), fields(root = %self.root.display()), err)]
    async fn get_object(&self, input: GetObjectInput) -> io::Result<ObjectBody> {
        let path = self.object_path(&input.bucket, &input.key)?;

        let file = fs::File::open(&path).await.map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no such object {}/{}", input.bucket, input.key),
                )
            } else {
                e
            }
        })?;

        Ok(Box::new(file))
    }
}

#[async_trait]
impl ObjectPutter for FsObjectStore {
    #[instrument(skip(self), fields(root = %self.root.display()), ret, err)]
    async fn put_object(&self, input: PutObjectInput) -> io::Result<PutObjectOutput> {
        let path = self.object_path(&input.bucket, &input.key)?;

        if !self.allow_overwrite && fs::try_exists(&path).await? {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("object {}/{} already exists", input.bucket, input.key),
            ));
        }

        let parent = path
            .parent()
            .ok_or_else(|| io::Error::other("internal error, object parent not found"))?;
        fs::create_dir_all(parent).await?;

        let partial = partial_path(&path);
        let lock = {
            let file = std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(false)
                .open(&partial)?;
            WriteLock::try_new(file)?
        };
        lock.set_len(0)?;

        let written = match write_body(lock.try_clone()?, input.body).await {
            Ok(v) => v,
            Err(e) => {
                let _ = fs::remove_file(&partial).await;
                return Err(e);
            }
        };

        if let Err(e) = self.commit(&partial, &path).await {
            let _ = fs::remove_file(&partial).await;
            return Err(e);
        }
        drop(lock);

        Ok(written)
    }
}

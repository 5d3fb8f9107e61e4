#![allow(dead_code)]

use std::{
    collections::HashMap,
    io::{self, Cursor},
    pin::Pin,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    task::{Context, Poll},
};

use async_trait::async_trait;
use objzip::storage::{
    GetObjectInput, ObjectBody, ObjectGetter, ObjectPutter, PutObjectInput, PutObjectOutput,
};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

/// Deterministic, poorly compressible bytes.
pub fn noise(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed | 1;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state as u8
        })
        .collect()
}

#[derive(Clone, Default)]
pub struct DropFlag(Arc<AtomicBool>);

impl DropFlag {
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Reader over fixed bytes that records when it is dropped.
pub struct TrackedBody {
    inner: Cursor<Vec<u8>>,
    closed: DropFlag,
}

impl TrackedBody {
    pub fn new(data: Vec<u8>) -> (Self, DropFlag) {
        let closed = DropFlag::default();
        (
            Self {
                inner: Cursor::new(data),
                closed: closed.clone(),
            },
            closed,
        )
    }
}

impl AsyncRead for TrackedBody {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl Drop for TrackedBody {
    fn drop(&mut self) {
        self.closed.set();
    }
}

/// Never ends, never fails. Records when it is dropped.
pub struct EndlessSource {
    state: u64,
    dropped: DropFlag,
}

impl EndlessSource {
    pub fn new() -> (Self, DropFlag) {
        let dropped = DropFlag::default();
        (
            Self {
                state: 0x9e37_79b9_7f4a_7c15,
                dropped: dropped.clone(),
            },
            dropped,
        )
    }
}

impl AsyncRead for EndlessSource {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let dst = buf.initialize_unfilled();
        for b in dst.iter_mut() {
            self.state ^= self.state << 13;
            self.state ^= self.state >> 7;
            self.state ^= self.state << 17;
            *b = self.state as u8;
        }
        let n = dst.len();
        buf.advance(n);

        Poll::Ready(Ok(()))
    }
}

impl Drop for EndlessSource {
    fn drop(&mut self) {
        self.dropped.set();
    }
}

/// Yields `good` bytes, then fails.
pub struct FailingSource {
    data: Cursor<Vec<u8>>,
}

impl FailingSource {
    pub fn new(good: usize) -> Self {
        Self {
            data: Cursor::new(noise(good, 7)),
        }
    }
}

impl AsyncRead for FailingSource {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.data.position() as usize >= self.data.get_ref().len() {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "source connection reset",
            )));
        }
        Pin::new(&mut self.data).poll_read(cx, buf)
    }
}

/// In-memory store that drains every body and hands out drop-tracked bodies.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
    bodies: Mutex<Vec<DropFlag>>,
}

impl MemoryStore {
    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_owned(), key.to_owned()))
            .cloned()
    }

    pub fn insert(&self, bucket: &str, key: &str, data: Vec<u8>) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_owned(), key.to_owned()), data);
    }

    pub fn bodies_handed_out(&self) -> Vec<DropFlag> {
        self.bodies.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectGetter for MemoryStore {
    async fn get_object(&self, input: GetObjectInput) -> io::Result<ObjectBody> {
        let data = self.object(&input.bucket, &input.key).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such key {}/{}", input.bucket, input.key),
            )
        })?;

        let (body, closed) = TrackedBody::new(data);
        self.bodies.lock().unwrap().push(closed);

        Ok(Box::new(body))
    }
}

#[async_trait]
impl ObjectPutter for MemoryStore {
    async fn put_object(&self, input: PutObjectInput) -> io::Result<PutObjectOutput> {
        let mut body = input.body;
        let mut data = Vec::new();
        body.read_to_end(&mut data).await?;

        let size = data.len() as u64;
        self.insert(&input.bucket, &input.key, data);

        Ok(PutObjectOutput { etag: None, size })
    }
}

/// Fails every upload after reading `read_first` bytes of the body.
pub struct FailingPutter {
    pub read_first: usize,
}

#[async_trait]
impl ObjectPutter for FailingPutter {
    async fn put_object(&self, input: PutObjectInput) -> io::Result<PutObjectOutput> {
        let mut body = input.body;
        let mut buffer = vec![0u8; self.read_first];
        let _ = body.read_exact(&mut buffer).await;

        Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "access denied",
        ))
    }
}

/// Acknowledges after reading a single byte.
pub struct EarlyAckPutter;

#[async_trait]
impl ObjectPutter for EarlyAckPutter {
    async fn put_object(&self, input: PutObjectInput) -> io::Result<PutObjectOutput> {
        let mut body = input.body;
        let mut byte = [0u8; 1];
        body.read_exact(&mut byte).await?;

        Ok(PutObjectOutput::default())
    }
}

/// Reads until EOF or the first error and reports success either way.
pub struct LenientPutter;

#[async_trait]
impl ObjectPutter for LenientPutter {
    async fn put_object(&self, input: PutObjectInput) -> io::Result<PutObjectOutput> {
        let mut body = input.body;
        let mut buffer = vec![0u8; 8192];
        let mut size = 0u64;
        while let Ok(n) = body.read(&mut buffer).await {
            if n == 0 {
                break;
            }
            size += n as u64;
        }

        Ok(PutObjectOutput { etag: None, size })
    }
}

/// Holds on to the body and never answers.
pub struct StalledPutter;

#[async_trait]
impl ObjectPutter for StalledPutter {
    async fn put_object(&self, input: PutObjectInput) -> io::Result<PutObjectOutput> {
        let _body = input.body;
        std::future::pending().await
    }
}

/// Returns fixed raw bytes for every key.
pub struct RawGetter {
    pub data: Vec<u8>,
    pub closed: Mutex<Vec<DropFlag>>,
}

impl RawGetter {
    pub fn new(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
            closed: Mutex::new(Vec::new()),
        }
    }

    pub fn all_closed(&self) -> bool {
        self.closed.lock().unwrap().iter().all(DropFlag::is_set)
    }
}

#[async_trait]
impl ObjectGetter for RawGetter {
    async fn get_object(&self, _input: GetObjectInput) -> io::Result<ObjectBody> {
        let (body, closed) = TrackedBody::new(self.data.clone());
        self.closed.lock().unwrap().push(closed);

        Ok(Box::new(body))
    }
}

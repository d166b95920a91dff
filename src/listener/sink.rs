//! Buffered, backpressure-aware listener sink

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::media::{IcyMetadata, METADATA_INTERVAL};

use super::interleave::MetadataInterleaver;

/// Batches a listener may fall behind (in-flight write included) before its
/// write is cancelled and it is dropped
pub const MAX_QUEUED_BATCHES: usize = 5;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connected listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type BoxedWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// Write-side state; only ever touched for short, non-blocking sections
struct Outbox {
    /// Prepared batches not yet handed to a write
    pending: Vec<Bytes>,
    /// Present while no write is in flight
    writer: Option<BoxedWriter>,
    /// Cancels the in-flight write, if any
    in_flight: Option<CancellationToken>,
}

struct SinkInner {
    id: ListenerId,
    requires_metadata: bool,
    listening: AtomicBool,
    interleaver: Mutex<MetadataInterleaver>,
    outbox: Mutex<Outbox>,
    runtime: Handle,
}

/// Output side of one listener connection
///
/// Cheap to clone; clones share the same connection and state.
#[derive(Clone)]
pub struct ListenerSink {
    inner: Arc<SinkInner>,
}

impl ListenerSink {
    /// Wrap a connection's write half
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime; writes are spawned on the
    /// runtime current at construction.
    pub fn new<W>(writer: W, requires_metadata: bool) -> Self
    where
        W: AsyncWrite + Send + 'static,
    {
        Self::with_handle(writer, requires_metadata, Handle::current())
    }

    /// Wrap a connection's write half, spawning writes on `runtime`
    pub fn with_handle<W>(writer: W, requires_metadata: bool, runtime: Handle) -> Self
    where
        W: AsyncWrite + Send + 'static,
    {
        Self {
            inner: Arc::new(SinkInner {
                id: ListenerId::next(),
                requires_metadata,
                listening: AtomicBool::new(true),
                interleaver: Mutex::new(MetadataInterleaver::new(METADATA_INTERVAL)),
                outbox: Mutex::new(Outbox {
                    pending: Vec::new(),
                    writer: Some(Box::pin(writer)),
                    in_flight: None,
                }),
                runtime,
            }),
        }
    }

    pub fn id(&self) -> ListenerId {
        self.inner.id
    }

    pub fn requires_metadata(&self) -> bool {
        self.inner.requires_metadata
    }

    /// False forever once a write failed or was shed
    pub fn is_listening(&self) -> bool {
        self.inner.listening.load(Ordering::Acquire)
    }

    /// Replace the metadata block used for future interleaving
    pub fn update_metadata(&self, metadata: IcyMetadata) {
        lock(&self.inner.interleaver).set_metadata(metadata);
    }

    /// Queue `data` for delivery; never blocks on the network
    pub fn send(&self, data: &[u8]) {
        if !self.is_listening() || data.is_empty() {
            return;
        }

        let prepared = if self.inner.requires_metadata {
            lock(&self.inner.interleaver).interleave(data)
        } else {
            Bytes::copy_from_slice(data)
        };

        self.send_raw(prepared);
    }

    /// Stop listening and close the connection
    ///
    /// Cancels any in-flight write and drops queued batches. Idempotent.
    pub fn close(&self) {
        self.inner.listening.store(false, Ordering::Release);

        let mut outbox = lock(&self.inner.outbox);
        if let Some(token) = outbox.in_flight.take() {
            token.cancel();
        }
        outbox.pending.clear();
        // Dropping an idle writer closes the connection now; an in-flight
        // one is dropped by its write task
        outbox.writer = None;
    }

    fn send_raw(&self, data: Bytes) {
        let mut outbox = lock(&self.inner.outbox);
        outbox.pending.push(data);

        if let Some(writer) = outbox.writer.take() {
            let batch = concat(&mut outbox.pending);
            let token = CancellationToken::new();
            outbox.in_flight = Some(token.clone());
            drop(outbox);

            self.inner
                .runtime
                .spawn(drain(Arc::clone(&self.inner), writer, batch, token));
        } else if outbox.pending.len() + 1 > MAX_QUEUED_BATCHES {
            if let Some(token) = outbox.in_flight.take() {
                token.cancel();
            }
            outbox.pending.clear();
            self.inner.listening.store(false, Ordering::Release);

            tracing::debug!(
                listener = %self.inner.id,
                max_queued = MAX_QUEUED_BATCHES,
                "Listener too slow, write cancelled"
            );
        }
    }
}

impl fmt::Debug for ListenerSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSink")
            .field("id", &self.inner.id)
            .field("requires_metadata", &self.inner.requires_metadata)
            .field("listening", &self.is_listening())
            .finish()
    }
}

/// Write `batch`, then keep flushing whatever queued up meanwhile
async fn drain(
    inner: Arc<SinkInner>,
    mut writer: BoxedWriter,
    mut batch: Bytes,
    token: CancellationToken,
) {
    loop {
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(io::Error::new(io::ErrorKind::TimedOut, "write shed")),
            result = write_batch(&mut writer, &batch) => result,
        };

        if let Err(e) = result {
            inner.listening.store(false, Ordering::Release);
            tracing::debug!(listener = %inner.id, error = %e, "Listener write failed");
            // Dropping the writer closes the connection
            return;
        }

        let mut outbox = lock(&inner.outbox);
        if !inner.listening.load(Ordering::Acquire) {
            // Closed while writing; the writer is dropped here
            outbox.in_flight = None;
            return;
        }
        if outbox.pending.is_empty() {
            outbox.writer = Some(writer);
            outbox.in_flight = None;
            return;
        }
        batch = concat(&mut outbox.pending);
    }
}

async fn write_batch(writer: &mut BoxedWriter, batch: &[u8]) -> io::Result<()> {
    writer.write_all(batch).await?;
    writer.flush().await
}

/// Concatenate and clear the pending batches
fn concat(pending: &mut Vec<Bytes>) -> Bytes {
    if pending.len() == 1 {
        return pending.remove(0);
    }

    let total = pending.iter().map(Bytes::len).sum();
    let mut buf = BytesMut::with_capacity(total);
    for batch in pending.drain(..) {
        buf.extend_from_slice(&batch);
    }
    buf.freeze()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::task::{Context, Poll};
    use std::time::Duration;

    use tokio::io::AsyncReadExt;

    use super::*;

    /// Writer whose writes never complete
    struct StalledWriter;

    impl AsyncWrite for StalledWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Pending
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Pending
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Pending
        }
    }

    async fn wait_until_not_listening(sink: &ListenerSink) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while sink.is_listening() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("listener still listening");
    }

    #[tokio::test]
    async fn test_raw_listener_receives_bytes_in_order() {
        let (client, mut server) = tokio::io::duplex(64 * 1024);
        let sink = ListenerSink::new(client, false);

        sink.send(b"abc");
        sink.send(b"def");
        sink.send(b"ghi");

        let mut buf = [0u8; 9];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"abcdefghi");
        assert!(sink.is_listening());
    }

    #[tokio::test]
    async fn test_queued_batches_flush_after_in_flight_write() {
        // Tiny pipe: the first write stalls until the reader drains it
        let (client, mut server) = tokio::io::duplex(4);
        let sink = ListenerSink::new(client, false);

        sink.send(b"0123456789");
        sink.send(b"ab");
        sink.send(b"cd");

        let mut buf = [0u8; 14];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"0123456789abcd");
        assert!(sink.is_listening());
    }

    #[tokio::test]
    async fn test_metadata_listener_interleaves() {
        let (client, mut server) = tokio::io::duplex(64 * 1024);
        let sink = ListenerSink::new(client, true);
        let meta = IcyMetadata::new("Song", "Cat");
        sink.update_metadata(meta.clone());

        let audio = vec![0x55u8; METADATA_INTERVAL + 10];
        sink.send(&audio);

        let mut buf = vec![0u8; audio.len() + meta.len()];
        server.read_exact(&mut buf).await.unwrap();

        assert!(buf[..METADATA_INTERVAL].iter().all(|&b| b == 0x55));
        let block = &buf[METADATA_INTERVAL..METADATA_INTERVAL + meta.len()];
        assert_eq!(IcyMetadata::parse(block).unwrap().title(), "Song");
        assert!(buf[METADATA_INTERVAL + meta.len()..].iter().all(|&b| b == 0x55));
    }

    #[tokio::test]
    async fn test_write_failure_stops_listening() {
        let writer = tokio_test::io::Builder::new()
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))
            .build();
        let sink = ListenerSink::new(writer, false);

        sink.send(b"frame");
        wait_until_not_listening(&sink).await;

        // Further sends are ignored
        sink.send(b"frame");
        assert!(!sink.is_listening());
    }

    #[tokio::test]
    async fn test_exact_write_to_mock() {
        let writer = tokio_test::io::Builder::new().write(b"hello").build();
        let sink = ListenerSink::new(writer, false);

        sink.send(b"hello");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(sink.is_listening());
    }

    #[tokio::test]
    async fn test_stalled_listener_is_shed() {
        let sink = ListenerSink::new(StalledWriter, false);

        for _ in 0..MAX_QUEUED_BATCHES {
            sink.send(b"batch");
            assert!(sink.is_listening());
        }

        sink.send(b"batch");
        assert!(!sink.is_listening());

        // The cancelled write task observes the shed as well
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!sink.is_listening());
    }

    #[tokio::test]
    async fn test_close_idle_listener_ends_stream() {
        let (client, mut server) = tokio::io::duplex(1024);
        let sink = ListenerSink::new(client, false);

        sink.send(b"abc");
        let mut buf = [0u8; 3];
        server.read_exact(&mut buf).await.unwrap();

        sink.close();
        sink.close();
        assert!(!sink.is_listening());

        let mut rest = Vec::new();
        tokio::time::timeout(Duration::from_secs(2), server.read_to_end(&mut rest))
            .await
            .expect("connection left open")
            .unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_close_cancels_in_flight_write() {
        // The pipe fills up so the write stays in flight
        let (client, mut server) = tokio::io::duplex(4);
        let sink = ListenerSink::new(client, false);

        sink.send(b"0123456789");
        tokio::time::sleep(Duration::from_millis(10)).await;
        sink.close();

        let mut received = Vec::new();
        tokio::time::timeout(Duration::from_secs(2), server.read_to_end(&mut received))
            .await
            .expect("connection left open")
            .unwrap();
        assert!(received.len() < 10);
        assert!(!sink.is_listening());
    }

    #[tokio::test]
    async fn test_listener_ids_are_unique() {
        let a = ListenerSink::new(StalledWriter, false);
        let b = ListenerSink::new(StalledWriter, true);

        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
        assert!(b.requires_metadata());
    }
}

//! Listener registry and fan-out sink
//!
//! **Responsibilities:**
//! - Track every connected listener (one bounded channel per listener)
//! - Replicate each paced chunk to all live listeners through [`FanoutSink`]
//! - Prune listeners lazily: a listener whose receiving side is gone is
//!   removed the moment a write pass finds it closed, before any write to it
//!
//! A write never blocks: a listener whose buffer is full misses that chunk,
//! and after `max_lagged_chunks` consecutive misses it is disconnected.
//! Other listeners and the upstream pacer are unaffected.

use bytes::Bytes;
use futures::stream::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Writable destination for one listener
#[derive(Debug)]
pub struct ListenerSink {
    id: Uuid,
    tx: mpsc::Sender<Bytes>,
    lagged: u32,
}

impl ListenerSink {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// True once the listener's receiving side has been closed or dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

struct RegistryInner {
    listeners: Mutex<HashMap<Uuid, ListenerSink>>,
    producers: AtomicUsize,
    buffer_chunks: usize,
    max_lagged_chunks: u32,
}

impl RegistryInner {
    fn listeners(&self) -> MutexGuard<'_, HashMap<Uuid, ListenerSink>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, id: &Uuid) -> bool {
        self.listeners().remove(id).is_some()
    }
}

/// Registry of connected listeners (the BroadcastSet owner)
///
/// Cheap to clone; all clones share the same set.
#[derive(Clone)]
pub struct ListenerRegistry {
    inner: Arc<RegistryInner>,
}

impl ListenerRegistry {
    /// Create a registry
    ///
    /// # Arguments
    ///
    /// * `buffer_chunks` - Chunks buffered per listener (minimum 1)
    /// * `max_lagged_chunks` - Consecutive missed chunks before a slow listener is dropped
    pub fn new(buffer_chunks: usize, max_lagged_chunks: u32) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                listeners: Mutex::new(HashMap::new()),
                producers: AtomicUsize::new(0),
                buffer_chunks: buffer_chunks.max(1),
                max_lagged_chunks,
            }),
        }
    }

    /// Register a new listener, returning its id and the stream it reads from
    pub fn connect(&self) -> (Uuid, ListenerStream) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.inner.buffer_chunks);

        let count = {
            let mut listeners = self.inner.listeners();
            listeners.insert(id, ListenerSink { id, tx, lagged: 0 });
            listeners.len()
        };
        info!("Listener {} connected, {} listening", id, count);

        let stream = ListenerStream {
            id,
            inner: ReceiverStream::new(rx),
            registry: Arc::downgrade(&self.inner),
        };
        (id, stream)
    }

    /// Remove a listener; returns false if it was already gone
    pub fn disconnect(&self, id: Uuid) -> bool {
        let removed = self.inner.remove(&id);
        if removed {
            info!("Listener {} disconnected", id);
        }
        removed
    }

    /// Number of listeners currently in the set (closed ones count until pruned)
    pub fn listener_count(&self) -> usize {
        self.inner.listeners().len()
    }

    /// Number of fan-out sinks currently attached (one per live pacer)
    pub fn producer_count(&self) -> usize {
        self.inner.producers.load(Ordering::SeqCst)
    }

    /// Obtain a fan-out sink; each pacer holds exactly one
    pub fn fanout_sink(&self) -> FanoutSink {
        self.inner.producers.fetch_add(1, Ordering::SeqCst);
        FanoutSink {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Single logical destination replicating every write to all listeners
pub struct FanoutSink {
    inner: Arc<RegistryInner>,
}

impl FanoutSink {
    /// Deliver `chunk` to every open listener; returns how many accepted it
    ///
    /// Closed listeners are removed before any write is attempted to them.
    pub fn write(&self, chunk: Bytes) -> usize {
        let max_lagged = self.inner.max_lagged_chunks;
        let mut delivered = 0;

        let mut listeners = self.inner.listeners();
        listeners.retain(|id, sink| {
            if sink.is_closed() {
                debug!("Pruning closed listener {}", id);
                return false;
            }

            match sink.tx.try_send(chunk.clone()) {
                Ok(()) => {
                    sink.lagged = 0;
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    sink.lagged += 1;
                    if sink.lagged > max_lagged {
                        warn!(
                            "Listener {} missed {} consecutive chunks, disconnecting",
                            id, sink.lagged
                        );
                        false
                    } else {
                        debug!("Listener {} buffer full, chunk dropped", id);
                        true
                    }
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Pruning closed listener {}", id);
                    false
                }
            }
        });

        delivered
    }
}

impl Drop for FanoutSink {
    fn drop(&mut self) {
        self.inner.producers.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Receiving side of one listener, consumed by the HTTP response body
///
/// Dropping the stream (client went away) disconnects the listener.
pub struct ListenerStream {
    id: Uuid,
    inner: ReceiverStream<Bytes>,
    registry: Weak<RegistryInner>,
}

impl ListenerStream {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Stop accepting new chunks while keeping the stream alive
    ///
    /// Already-buffered chunks can still be read. The registry notices on its
    /// next write pass and prunes the listener.
    pub fn close(&mut self) {
        self.inner.close();
    }
}

impl Stream for ListenerStream {
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx).map(|chunk| chunk.map(Ok))
    }
}

impl Drop for ListenerStream {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            if registry.remove(&self.id) {
                info!("Listener {} connection closed", self.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn chunk(data: &'static [u8]) -> Bytes {
        Bytes::from_static(data)
    }

    async fn next_chunk(stream: &mut ListenerStream) -> Option<Bytes> {
        stream.next().await.map(|r| r.unwrap())
    }

    #[tokio::test]
    async fn test_connect_and_disconnect() {
        let registry = ListenerRegistry::new(8, 4);
        let (id, _stream) = registry.connect();
        assert_eq!(registry.listener_count(), 1);

        assert!(registry.disconnect(id));
        assert!(!registry.disconnect(id));
        assert_eq!(registry.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_closed_listener_pruned_on_next_write() {
        let registry = ListenerRegistry::new(8, 4);
        let sink = registry.fanout_sink();

        let (_a, mut first) = registry.connect();
        let (_b, mut second) = registry.connect();
        let (_c, mut third) = registry.connect();

        assert_eq!(sink.write(chunk(b"one")), 3);

        second.close();
        assert_eq!(registry.listener_count(), 3);

        assert_eq!(sink.write(chunk(b"two")), 2);
        assert_eq!(registry.listener_count(), 2);
        assert_eq!(sink.write(chunk(b"three")), 2);

        for stream in [&mut first, &mut third] {
            assert_eq!(next_chunk(stream).await, Some(chunk(b"one")));
            assert_eq!(next_chunk(stream).await, Some(chunk(b"two")));
            assert_eq!(next_chunk(stream).await, Some(chunk(b"three")));
        }

        // Closed listener keeps what it had buffered, then ends
        assert_eq!(next_chunk(&mut second).await, Some(chunk(b"one")));
        assert_eq!(next_chunk(&mut second).await, None);
    }

    #[tokio::test]
    async fn test_dropping_stream_disconnects() {
        let registry = ListenerRegistry::new(8, 4);
        let (_id, stream) = registry.connect();
        assert_eq!(registry.listener_count(), 1);

        drop(stream);
        assert_eq!(registry.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_slow_listener_drops_chunks_then_disconnects() {
        let registry = ListenerRegistry::new(1, 2);
        let sink = registry.fanout_sink();
        let (_slow, _slow_stream) = registry.connect();
        let (_fast, mut fast_stream) = registry.connect();

        for i in 0..4u8 {
            let delivered = sink.write(Bytes::from(vec![i]));
            // The fast listener drains every chunk; the slow one never reads
            assert_eq!(next_chunk(&mut fast_stream).await, Some(Bytes::from(vec![i])));
            if i == 0 {
                assert_eq!(delivered, 2);
            } else {
                assert_eq!(delivered, 1);
            }
        }

        // First write filled the slow buffer, next two were dropped, fourth pruned it
        assert_eq!(registry.listener_count(), 1);
    }

    #[tokio::test]
    async fn test_producer_count_tracks_sinks() {
        let registry = ListenerRegistry::new(8, 4);
        assert_eq!(registry.producer_count(), 0);

        let first = registry.fanout_sink();
        let second = registry.fanout_sink();
        assert_eq!(registry.producer_count(), 2);

        drop(first);
        assert_eq!(registry.producer_count(), 1);
        drop(second);
        assert_eq!(registry.producer_count(), 0);
    }
}

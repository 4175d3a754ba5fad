//! Bounded hand-off between the network side and the render thread.
//!
//! Built on `tokio::sync::mpsc` with a fixed capacity. Publishing never
//! waits: when the queue is full the item is handed back to the caller,
//! who drops it. The network path must never stall on the display path.

use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};

// ── Constants ────────────────────────────────────────────────────

/// Maximum number of items queued between ingestion and rendering.
pub const FRAME_QUEUE_CAPACITY: usize = 5;

// ── FrameItem ────────────────────────────────────────────────────

/// Pixel data plus the geometry it should be drawn with.
///
/// The buffer is owned exclusively by the payload from construction
/// until it is rendered or dropped.
#[derive(Debug, PartialEq, Eq)]
pub struct FramePayload {
    buffer: Vec<u8>,
    width: u16,
    height: u16,
}

impl FramePayload {
    pub fn new(buffer: Vec<u8>, width: u16, height: u16) -> Self {
        Self {
            buffer,
            width,
            height,
        }
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Bytes actually received. May differ from `width * height * 2`.
    pub fn size(&self) -> u32 {
        u32::try_from(self.buffer.len()).unwrap_or(u32::MAX)
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    /// Take the buffer back out, consuming the payload.
    pub fn into_buffer(self) -> Vec<u8> {
        self.buffer
    }
}

/// One unit of work for the render consumer.
#[derive(Debug, PartialEq, Eq)]
pub enum FrameItem {
    /// New session geometry; carries no pixels.
    Config { width: u16, height: u16 },
    /// A frame to draw.
    Payload(FramePayload),
}

impl FrameItem {
    /// Size of the owned pixel buffer (0 for config items).
    pub fn buffer_len(&self) -> usize {
        match self {
            FrameItem::Config { .. } => 0,
            FrameItem::Payload(p) => p.buffer.len(),
        }
    }
}

// ── PublishError ─────────────────────────────────────────────────

/// A rejected publish. The item is returned so ownership stays explicit;
/// dropping the error releases the buffer.
#[derive(Debug)]
pub enum PublishError {
    /// The queue already holds [`FRAME_QUEUE_CAPACITY`] items.
    Full(FrameItem),
    /// The receiver has been dropped.
    Closed(FrameItem),
}

impl PublishError {
    pub fn into_item(self) -> FrameItem {
        match self {
            PublishError::Full(item) | PublishError::Closed(item) => item,
        }
    }
}

// ── FrameChannel ─────────────────────────────────────────────────

/// Constructor for a publisher/receiver pair.
pub struct FrameChannel;

impl FrameChannel {
    /// Create a channel with the fixed [`FRAME_QUEUE_CAPACITY`].
    pub fn new() -> (FramePublisher, FrameReceiver) {
        let (tx, rx) = mpsc::channel(FRAME_QUEUE_CAPACITY);
        (FramePublisher { tx }, FrameReceiver { rx })
    }
}

/// Producer half. Cheap to clone; one per network task is fine.
#[derive(Debug, Clone)]
pub struct FramePublisher {
    tx: mpsc::Sender<FrameItem>,
}

impl FramePublisher {
    /// Enqueue `item` without waiting.
    pub fn publish(&self, item: FrameItem) -> Result<(), PublishError> {
        self.tx.try_send(item).map_err(|e| match e {
            TrySendError::Full(item) => PublishError::Full(item),
            TrySendError::Closed(item) => PublishError::Closed(item),
        })
    }

    /// Items currently waiting for the consumer.
    pub fn pending(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half. Exactly one exists per channel.
#[derive(Debug)]
pub struct FrameReceiver {
    rx: mpsc::Receiver<FrameItem>,
}

impl FrameReceiver {
    /// Block the current thread until an item is available.
    ///
    /// Returns `None` once every publisher has been dropped. Must not be
    /// called from inside an async context; use [`take_async`](Self::take_async).
    pub fn take(&mut self) -> Option<FrameItem> {
        self.rx.blocking_recv()
    }

    /// Async equivalent of [`take`](Self::take).
    pub async fn take_async(&mut self) -> Option<FrameItem> {
        self.rx.recv().await
    }

    /// Non-blocking poll. `None` when empty or closed.
    pub fn try_take(&mut self) -> Option<FrameItem> {
        match self.rx.try_recv() {
            Ok(item) => Some(item),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Items currently queued.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(len: usize) -> FrameItem {
        FrameItem::Payload(FramePayload::new(vec![0xAB; len], 320, 240))
    }

    #[test]
    fn sixth_publish_fails_without_blocking() {
        let (tx, rx) = FrameChannel::new();
        for _ in 0..FRAME_QUEUE_CAPACITY {
            tx.publish(payload(16)).unwrap();
        }
        assert_eq!(tx.pending(), FRAME_QUEUE_CAPACITY);

        let rejected = tx.publish(payload(32));
        let item = match rejected {
            Err(PublishError::Full(item)) => item,
            other => panic!("expected Full, got {other:?}"),
        };
        assert_eq!(item.buffer_len(), 32);
        assert_eq!(rx.len(), FRAME_QUEUE_CAPACITY);
    }

    #[test]
    fn never_holds_more_than_capacity() {
        let (tx, rx) = FrameChannel::new();
        let accepted = (0..20).filter(|_| tx.publish(payload(1)).is_ok()).count();
        assert_eq!(accepted, FRAME_QUEUE_CAPACITY);
        assert_eq!(rx.len(), FRAME_QUEUE_CAPACITY);
    }

    #[test]
    fn fifo_order_and_release_of_capacity() {
        let (tx, mut rx) = FrameChannel::new();
        tx.publish(FrameItem::Config {
            width: 320,
            height: 240,
        })
        .unwrap();
        tx.publish(payload(4)).unwrap();

        assert_eq!(
            rx.try_take(),
            Some(FrameItem::Config {
                width: 320,
                height: 240
            })
        );
        assert_eq!(rx.try_take().map(|i| i.buffer_len()), Some(4));
        assert_eq!(rx.try_take(), None);
        assert_eq!(tx.pending(), 0);
    }

    #[test]
    fn publish_to_closed_channel() {
        let (tx, rx) = FrameChannel::new();
        drop(rx);
        assert!(tx.is_closed());
        assert!(matches!(
            tx.publish(payload(2)),
            Err(PublishError::Closed(_))
        ));
    }

    #[test]
    fn blocking_take_from_another_thread() {
        let (tx, mut rx) = FrameChannel::new();
        let consumer = std::thread::spawn(move || {
            let mut sizes = Vec::new();
            while let Some(item) = rx.take() {
                sizes.push(item.buffer_len());
            }
            sizes
        });

        for len in 1..=3 {
            // Retry on Full: the consumer may lag behind.
            let mut item = payload(len);
            loop {
                match tx.publish(item) {
                    Ok(()) => break,
                    Err(e) => {
                        item = e.into_item();
                        std::thread::yield_now();
                    }
                }
            }
        }
        drop(tx);

        assert_eq!(consumer.join().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn async_take() {
        let (tx, mut rx) = FrameChannel::new();
        tx.publish(payload(10)).unwrap();
        let item = rx.take_async().await.unwrap();
        assert_eq!(item.buffer_len(), 10);
    }

    #[test]
    fn payload_accessors() {
        let p = FramePayload::new(vec![1, 2, 3], 2, 1);
        assert_eq!(p.size(), 3);
        assert_eq!((p.width(), p.height()), (2, 1));
        assert_eq!(p.into_buffer(), vec![1, 2, 3]);
    }
}

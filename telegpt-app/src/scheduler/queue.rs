//! Unbounded FIFO between the fetch loop and the processing loop.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};

/// Producers never block; the single consumer waits with a timeout.
#[derive(Debug)]
pub struct DispatchQueue<T> {
    tx: mpsc::UnboundedSender<T>,
    rx: Mutex<mpsc::UnboundedReceiver<T>>,
    depth: AtomicUsize,
}

impl<T> Default for DispatchQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DispatchQueue<T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            depth: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, item: T) -> anyhow::Result<()> {
        self.depth.fetch_add(1, Ordering::Relaxed);
        self.tx.send(item).map_err(|_| {
            self.depth.fetch_sub(1, Ordering::Relaxed);
            anyhow::anyhow!("dispatch queue closed")
        })
    }

    /// Wait up to `timeout` for the next item. `None` on timeout.
    pub async fn pop(&self, timeout: Duration) -> Option<T> {
        let item = tokio::time::timeout(timeout, async {
            let mut rx = self.rx.lock().await;
            rx.recv().await
        })
        .await
        .ok()
        .flatten()?;
        self.depth.fetch_sub(1, Ordering::Relaxed);
        Some(item)
    }

    pub fn len(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

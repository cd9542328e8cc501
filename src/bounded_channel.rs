// SPDX-License-Identifier: Apache-2.0

//! Bounded MPSC queue used between file followers and their source watcher.
//!
//! A full queue blocks the sender, which is how slow broker delivery throttles
//! disk reads. Senders that must stay responsive to shutdown use
//! [`BoundedSender::send_or_cancel`].

use flume::{Receiver, Sender};
use std::fmt;
use tokio::select;
use tokio_util::sync::CancellationToken;

#[derive(Debug, PartialEq, Eq)]
pub enum SendError {
    /// The receiving side was dropped.
    Disconnected,
    /// The cancellation token fired while waiting for queue capacity.
    Cancelled,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Disconnected => write!(f, "queue disconnected"),
            SendError::Cancelled => write!(f, "send cancelled"),
        }
    }
}

impl std::error::Error for SendError {}

pub struct BoundedSender<T> {
    tx: Sender<T>,
}

impl<T> BoundedSender<T> {
    pub async fn send(&self, item: T) -> Result<(), SendError> {
        self.tx
            .send_async(item)
            .await
            .map_err(|_| SendError::Disconnected)
    }

    /// Waits for capacity unless `cancel` fires first. The item is dropped on
    /// cancellation.
    pub async fn send_or_cancel(
        &self,
        item: T,
        cancel: &CancellationToken,
    ) -> Result<(), SendError> {
        select! {
            biased;

            _ = cancel.cancelled() => Err(SendError::Cancelled),
            res = self.tx.send_async(item) => res.map_err(|_| SendError::Disconnected),
        }
    }
}

impl<T> Clone for BoundedSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

pub struct BoundedReceiver<T> {
    rx: Receiver<T>,
}

impl<T> BoundedReceiver<T> {
    /// Returns `None` once every sender is gone and the queue is empty.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv_async().await.ok()
    }

    /// Takes whatever is queued right now without waiting.
    pub fn drain_ready(&mut self) -> Vec<T> {
        self.rx.try_iter().collect()
    }
}

pub fn bounded<T>(size: usize) -> (BoundedSender<T>, BoundedReceiver<T>) {
    let (tx, rx) = flume::bounded::<T>(size);

    (BoundedSender { tx }, BoundedReceiver { rx })
}

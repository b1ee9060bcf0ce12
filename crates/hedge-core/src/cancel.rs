//! Run-level cancellation

use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Cloneable cancellation flag shared between a caller and a running pipeline
#[derive(Debug, Clone)]
pub struct CancelToken {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    /// Request cancellation; idempotent
    pub fn cancel(&self) {
        let already = self.sender.send_replace(true);
        if !already {
            info!("Run cancellation requested");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Completes once [`cancel`](Self::cancel) has been called
    pub async fn cancelled(&self) {
        let mut rx = self.receiver.clone();
        // The sender lives as long as any clone of the token, so this only
        // returns early if the flag is already set.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

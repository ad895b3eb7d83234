//! Per-user message queues.
//!
//! Each user gets one worker task fed by an unbounded channel, so a user's
//! messages are handled one at a time in the order they arrived. Different
//! users run concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::channels::InboundMessage;

use super::controller::FlowController;

struct UserQueue {
    tx: mpsc::UnboundedSender<InboundMessage>,
    handle: JoinHandle<()>,
}

pub struct MessageDispatcher {
    controller: Arc<FlowController>,
    queues: Mutex<HashMap<String, UserQueue>>,
}

impl MessageDispatcher {
    pub fn new(controller: Arc<FlowController>) -> Self {
        Self {
            controller,
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// Queue a message behind the user's earlier messages.
    pub async fn dispatch(&self, message: InboundMessage) {
        let user_id = message.user_id.clone();
        let mut queues = self.queues.lock().await;

        let message = match queues.get(&user_id) {
            Some(queue) => match queue.tx.send(message) {
                Ok(()) => return,
                // Worker is gone (it panicked); start a new one.
                Err(mpsc::error::SendError(message)) => {
                    tracing::warn!(user_id = %user_id, "User worker stopped, restarting");
                    message
                }
            },
            None => message,
        };

        let queue = self.spawn_worker(&user_id);
        if queue.tx.send(message).is_err() {
            tracing::error!(user_id = %user_id, "Failed to queue message for new worker");
        }
        queues.insert(user_id, queue);
    }

    fn spawn_worker(&self, user_id: &str) -> UserQueue {
        let (tx, mut rx) = mpsc::unbounded_channel::<InboundMessage>();
        let controller = Arc::clone(&self.controller);
        let user_id = user_id.to_string();

        let handle = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                controller.handle_inbound_message(message).await;
            }
            tracing::debug!(user_id = %user_id, "User worker finished");
        });
        UserQueue { tx, handle }
    }

    /// Number of users with a worker.
    pub async fn active_users(&self) -> usize {
        self.queues.lock().await.len()
    }

    /// Close every queue and wait for the queued messages to be handled.
    pub async fn drain(&self) {
        let queues = std::mem::take(&mut *self.queues.lock().await);
        for (user_id, queue) in queues {
            drop(queue.tx);
            if let Err(e) = queue.handle.await {
                tracing::error!(user_id = %user_id, "User worker failed: {}", e);
            }
        }
    }
}

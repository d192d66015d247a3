use log;
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::mpsc;

use crate::actions::ConnectionId;
use crate::websocket::WsMessage;

/// Delivers outbound messages to connections. Fire-and-forget: no
/// acknowledgement, no retry.
pub trait Broadcaster: Send + Sync {
    fn deliver(&self, connection_id: &str, message: WsMessage);
}

/// Outbound channel per live connection
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    senders: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<WsMessage>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `connection_id` and returns the receiving end of its channel.
    pub fn register(&self, connection_id: &str) -> mpsc::UnboundedReceiver<WsMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(connection_id.to_string(), tx);
        rx
    }

    pub fn unregister(&self, connection_id: &str) {
        self.senders
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(connection_id);
    }

    /// Number of registered connections
    pub fn connection_count(&self) -> usize {
        self.senders
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl Broadcaster for ConnectionRegistry {
    fn deliver(&self, connection_id: &str, message: WsMessage) {
        let senders = self
            .senders
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match senders.get(connection_id) {
            Some(tx) => {
                if tx.send(message).is_err() {
                    log::debug!("Dropped message for closed connection {}", connection_id);
                }
            }
            None => log::debug!("No live connection {}", connection_id),
        }
    }
}

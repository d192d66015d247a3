use log;
use std::sync::{Mutex, MutexGuard};

use crate::actions::{ConnectionId, Pairing};

/// Pairs connections two at a time. Holds at most one waiting connection.
#[derive(Debug, Default)]
pub struct Matchmaker {
    waiting: Mutex<Option<ConnectionId>>,
}

impl Matchmaker {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<ConnectionId>> {
        // Poisoning is ignored; the slot is a plain Option.
        self.waiting.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Takes the waiting slot or pairs with its occupant (who plays white).
    /// The check and the update happen under one lock.
    pub fn join(&self, connection_id: &str) -> Pairing {
        let mut slot = self.slot();
        match slot.take() {
            Some(waiting) if waiting == connection_id => {
                *slot = Some(waiting);
                Pairing::Waiting
            }
            Some(waiting) => {
                log::info!("Paired {} (white) with {} (black)", waiting, connection_id);
                Pairing::Paired {
                    white: waiting,
                    black: connection_id.to_string(),
                }
            }
            None => {
                log::debug!("{} is waiting for an opponent", connection_id);
                *slot = Some(connection_id.to_string());
                Pairing::Waiting
            }
        }
    }

    /// Clears the slot if `connection_id` occupies it. Returns whether it did.
    pub fn cancel(&self, connection_id: &str) -> bool {
        let mut slot = self.slot();
        if slot.as_deref() == Some(connection_id) {
            log::debug!("{} left the waiting slot", connection_id);
            *slot = None;
            true
        } else {
            false
        }
    }

    pub fn waiting(&self) -> Option<ConnectionId> {
        self.slot().clone()
    }
}

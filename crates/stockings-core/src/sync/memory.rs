//! In-process relay
//!
//! A [`MemoryRelay`] forwards every message sent on one of its connections
//! to all other open connections, like the broker does. It runs sessions
//! against each other without a network and lets a test drop every
//! connection or refuse new ones.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::StockingsError;
use crate::sync::relay::{RelayConnection, RelayConnector};

#[derive(Default)]
struct Hub {
    next_id: u64,
    peers: HashMap<u64, mpsc::UnboundedSender<String>>,
    offline: bool,
    log: Vec<String>,
}

/// Shared in-memory relay; clones refer to the same hub
#[derive(Clone, Default)]
pub struct MemoryRelay {
    hub: Arc<Mutex<Hub>>,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    fn hub(&self) -> MutexGuard<'_, Hub> {
        self.hub.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every message relayed so far, in order
    pub fn sent(&self) -> Vec<String> {
        self.hub().log.clone()
    }

    pub fn connection_count(&self) -> usize {
        self.hub().peers.len()
    }

    /// Close every open connection. Their `recv` yields `None`.
    pub fn disconnect_all(&self) {
        self.hub().peers.clear();
    }

    /// Refuse (`false`) or allow (`true`) new connections.
    pub fn set_online(&self, online: bool) {
        self.hub().offline = !online;
    }
}

#[async_trait]
impl RelayConnector for MemoryRelay {
    async fn connect(&self) -> Result<Box<dyn RelayConnection>, StockingsError> {
        let mut hub = self.hub();
        if hub.offline {
            return Err(StockingsError::Transport("relay unreachable".to_string()));
        }
        let id = hub.next_id;
        hub.next_id += 1;
        let (tx, rx) = mpsc::unbounded_channel();
        hub.peers.insert(id, tx);
        Ok(Box::new(MemoryConnection {
            id,
            relay: self.clone(),
            rx,
        }))
    }
}

struct MemoryConnection {
    id: u64,
    relay: MemoryRelay,
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl RelayConnection for MemoryConnection {
    async fn send(&mut self, message: String) -> Result<(), StockingsError> {
        let mut hub = self.relay.hub();
        if !hub.peers.contains_key(&self.id) {
            return Err(StockingsError::Transport("connection closed".to_string()));
        }
        for (id, peer) in &hub.peers {
            if *id != self.id {
                // A peer that went away is cleaned up by its own drop
                let _ = peer.send(message.clone());
            }
        }
        hub.log.push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<String>, StockingsError> {
        Ok(self.rx.recv().await)
    }

    async fn close(&mut self) -> Result<(), StockingsError> {
        self.relay.hub().peers.remove(&self.id);
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.relay.hub().peers.remove(&self.id);
    }
}

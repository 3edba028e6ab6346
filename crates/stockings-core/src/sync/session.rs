//! Sync session: the single task that owns the relay connection
//!
//! Per connection the session announces its inventory, publishes every
//! stored archive, then streams: inbound frames go to the reconciler, a
//! keepalive goes out every heartbeat interval. Any relay error or close
//! drops back to `Disconnected` and the session reconnects after an
//! exponential backoff delay. The backoff resets once a connection reaches
//! `Streaming`.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::archive::ArchiveName;
use crate::config::SessionConfig;
use crate::error::StockingsError;
use crate::identity::Signature;
use crate::reconcile::Reconciler;
use crate::storage::ArchiveStore;
use crate::sync::events::{SessionEvent, SessionState};
use crate::sync::protocol::Frame;
use crate::sync::relay::{RelayConnection, RelayConnector};

/// Capacity of the session event channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

enum Wakeup {
    Inbound(Result<Option<String>, StockingsError>),
    Heartbeat,
    Rescan,
}

/// Replicates the archive store over one relay
pub struct SyncSession {
    connector: Arc<dyn RelayConnector>,
    reconciler: Arc<Reconciler>,
    config: SessionConfig,
    state: SessionState,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl SyncSession {
    pub fn new(
        connector: Arc<dyn RelayConnector>,
        reconciler: Arc<Reconciler>,
        config: SessionConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            connector,
            reconciler,
            config,
            state: SessionState::Disconnected,
            event_tx,
        }
    }

    /// Subscribe to session events. Events sent before subscribing are not
    /// replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run until the process exits.
    pub async fn run(self) {
        self.run_until(std::future::pending()).await
    }

    /// Run until `shutdown` completes.
    pub async fn run_until(mut self, shutdown: impl Future<Output = ()>) {
        tokio::select! {
            _ = shutdown => info!("Sync session shutting down"),
            _ = self.reconnect_loop() => {}
        }
        self.set_state(SessionState::Disconnected);
    }

    async fn reconnect_loop(&mut self) {
        let mut backoff = ExponentialBackoff {
            current_interval: self.config.initial_backoff,
            initial_interval: self.config.initial_backoff,
            max_interval: self.config.max_backoff,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };

        loop {
            self.set_state(SessionState::Connecting);
            match self.connector.connect().await {
                Ok(conn) => match self.serve(conn, &mut backoff).await {
                    Ok(()) => info!("Relay closed the connection"),
                    Err(e) => warn!(error = %e, "Relay connection failed"),
                },
                Err(e) => warn!(error = %e, "Failed to connect to relay"),
            }
            self.set_state(SessionState::Disconnected);

            let delay = backoff.next_backoff().unwrap_or(self.config.max_backoff);
            info!(delay_ms = delay.as_millis() as u64, "Reconnecting to relay");
            tokio::time::sleep(delay).await;
        }
    }

    /// Drive one connection until the relay closes it or fails.
    async fn serve(
        &mut self,
        mut conn: Box<dyn RelayConnection>,
        backoff: &mut ExponentialBackoff,
    ) -> Result<(), StockingsError> {
        let mut published = HashSet::new();

        self.set_state(SessionState::Announcing);
        let inventory = stored_signatures(self.store())?;
        conn.send(Frame::announce(inventory.iter().map(|(_, sig)| sig)).encode())
            .await?;
        debug!(archives = inventory.len(), "Sent announcement");

        for (name, _) in &inventory {
            self.publish(conn.as_mut(), name, &mut published).await?;
        }

        self.set_state(SessionState::Streaming);
        backoff.reset();

        let period = self.config.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut rescan = self.config.rescan_interval.map(|period| {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            let wakeup = tokio::select! {
                message = conn.recv() => Wakeup::Inbound(message),
                _ = heartbeat.tick() => Wakeup::Heartbeat,
                _ = next_tick(&mut rescan) => Wakeup::Rescan,
            };

            match wakeup {
                Wakeup::Inbound(Ok(None)) => return Ok(()),
                Wakeup::Inbound(Ok(Some(text))) => {
                    self.handle_inbound(conn.as_mut(), &text, &mut published)
                        .await?
                }
                // Dropped like a frame that fails to decode; the connection stays up
                Wakeup::Inbound(Err(e @ StockingsError::MalformedMessage(_))) => {
                    warn!(error = %e, "Dropping malformed frame");
                    self.emit(SessionEvent::ArchiveRejected {
                        name: None,
                        reason: e.to_string(),
                    });
                }
                Wakeup::Inbound(Err(e)) => return Err(e),
                Wakeup::Heartbeat => {
                    trace!("Sending keepalive");
                    conn.send(Frame::Keepalive.encode()).await?;
                }
                Wakeup::Rescan => {
                    for (name, signature) in stored_signatures(self.store())? {
                        if !published.contains(&signature) {
                            self.publish(conn.as_mut(), &name, &mut published).await?;
                        }
                    }
                }
            }
        }
    }

    async fn handle_inbound(
        &self,
        conn: &mut dyn RelayConnection,
        text: &str,
        published: &mut HashSet<Signature>,
    ) -> Result<(), StockingsError> {
        match Frame::decode(text) {
            Ok(Frame::Keepalive) => trace!("Received keepalive"),
            Ok(Frame::Announce(theirs)) => {
                debug!(archives = theirs.len(), "Received announcement");
                if self.config.answer_announcements {
                    let theirs: HashSet<Signature> = theirs.into_iter().collect();
                    for (name, signature) in stored_signatures(self.store())? {
                        if !theirs.contains(&signature) {
                            self.publish(conn, &name, published).await?;
                        }
                    }
                }
            }
            Ok(Frame::Update(update)) => {
                let name = update.name.clone();
                match self.reconciler.reconcile(update).await {
                    Ok(accepted) => self.emit(SessionEvent::ArchiveAccepted {
                        name: accepted.name,
                        version: accepted.version,
                        newly_pinned: accepted.newly_pinned,
                    }),
                    Err(e) => {
                        if !e.is_rejection() {
                            error!(name = %name, error = %e, "Failed to apply update");
                        }
                        self.emit(SessionEvent::ArchiveRejected {
                            name: Some(name),
                            reason: e.to_string(),
                        });
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, bytes = text.len(), "Dropping malformed frame");
                self.emit(SessionEvent::ArchiveRejected {
                    name: None,
                    reason: e.to_string(),
                });
            }
        }
        Ok(())
    }

    async fn publish(
        &self,
        conn: &mut dyn RelayConnection,
        name: &ArchiveName,
        published: &mut HashSet<Signature>,
    ) -> Result<(), StockingsError> {
        let archive = match self.store().get(name) {
            Ok(Some(archive)) => archive,
            // Removed since the inventory was taken
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!(name = %name, error = %e, "Skipping unreadable archive");
                return Ok(());
            }
        };
        let signature = archive.signature.clone();
        debug!(name = %archive.name, version = %archive.version, "Publishing archive");
        conn.send(Frame::Update(archive).encode()).await?;
        published.insert(signature);
        Ok(())
    }

    fn store(&self) -> &ArchiveStore {
        self.reconciler.store()
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "Session state changed");
            self.state = state;
            self.emit(SessionEvent::StateChanged(state));
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}

/// Name and signature of every readable stored archive
fn stored_signatures(
    store: &ArchiveStore,
) -> Result<Vec<(ArchiveName, Signature)>, StockingsError> {
    let mut out = Vec::new();
    for name in store.list()? {
        match store.get(&name) {
            Ok(Some(archive)) => out.push((name, archive.signature)),
            Ok(None) => {}
            Err(e) => warn!(name = %name, error = %e, "Skipping unreadable archive"),
        }
    }
    Ok(out)
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

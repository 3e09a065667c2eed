//! # Update Dispatcher
//!
//! The `Dispatcher` is a single-owner actor that turns change flags into
//! minimal [`ManifestUpdate`]s and fans them out to every connected client.
//!
//! ## Core Design Principles:
//!
//! 1.  **Single Owner**: the baseline (what every client has already seen) and
//!     the client registry live on the dispatcher's own task. Everything else
//!     talks to it through the [`DispatcherHandle`] command queue.
//!
//! 2.  **Coalescing**: when a change arrives, every other pending change is
//!     drained without waiting and ORed in, so a burst of flags produces one
//!     update.
//!
//! 3.  **Zero-Copy Fan-out**: each update is wrapped in an `Arc`; clients
//!     receive a pointer to the same value.
//!
//! 4.  **Eviction Over Backpressure**: every client queue is bounded. A client
//!     whose queue is full (or closed) is dropped from the registry; its
//!     receiver then sees the channel close. The dispatcher never waits on a
//!     slow client.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::flags::SourceChangeFlags;
use super::state::DropzoneState;
use super::update::ManifestUpdate;

/// Capacity of each client's update queue.
pub const CLIENT_QUEUE_CAPACITY: usize = 16;

/// Receiving half handed to a client.
pub type UpdateReceiver = mpsc::Receiver<Arc<ManifestUpdate>>;
/// Sending half registered with the dispatcher.
pub type UpdateSender = mpsc::Sender<Arc<ManifestUpdate>>;

/// Errors raised by [`DispatcherHandle`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The dispatcher task has exited.
    #[error("Dispatcher stopped")]
    Stopped,

    /// The client's queue was full or closed, so the baseline could not be queued.
    #[error("Client queue cannot take the baseline")]
    QueueUnavailable,
}

enum Command {
    Add {
        sender: UpdateSender,
        reply: oneshot::Sender<Result<u64, DispatchError>>,
    },
    Remove(u64),
}

/// # Dispatcher Handle
///
/// Cheap, cloneable access to a running dispatcher.
#[derive(Clone)]
pub struct DispatcherHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl DispatcherHandle {
    /// # Add Client
    ///
    /// Registers `sender`. The current baseline is queued to it before this
    /// returns.
    ///
    /// # Returns
    /// The client id, increasing with every registration.
    ///
    /// # Errors
    /// - [`DispatchError::Stopped`] once the dispatcher has exited
    /// - [`DispatchError::QueueUnavailable`] when `sender` is full or closed;
    ///   the client is not registered
    pub async fn add_client(&self, sender: UpdateSender) -> Result<u64, DispatchError> {
        let (reply, id) = oneshot::channel();
        self.commands
            .send(Command::Add { sender, reply })
            .map_err(|_| DispatchError::Stopped)?;
        id.await.map_err(|_| DispatchError::Stopped)?
    }

    /// Unregisters a client. Unknown ids are ignored.
    pub fn remove_client(&self, id: u64) {
        let _ = self.commands.send(Command::Remove(id));
    }

    /// Creates a queue of [`CLIENT_QUEUE_CAPACITY`] and registers it.
    pub async fn subscribe(&self) -> Result<(u64, UpdateReceiver), DispatchError> {
        let (tx, rx) = mpsc::channel(CLIENT_QUEUE_CAPACITY);
        let id = self.add_client(tx).await?;
        Ok((id, rx))
    }
}

/// # Dispatcher
///
/// The actor state. Construct and spawn it with [`Dispatcher::start`].
pub struct Dispatcher {
    state: Arc<DropzoneState>,
    listener_id: u64,
    changes: mpsc::UnboundedReceiver<SourceChangeFlags>,
    commands: mpsc::UnboundedReceiver<Command>,
    baseline: ManifestUpdate,
    clients: HashMap<u64, UpdateSender>,
    next_client_id: u64,
}

impl Dispatcher {
    /// # Start
    ///
    /// Registers as a change listener, builds the initial baseline and spawns
    /// the actor loop. Both happen before this returns, so no change raised
    /// afterwards is missed.
    pub fn start(state: Arc<DropzoneState>, cancel: CancellationToken) -> (DispatcherHandle, JoinHandle<()>) {
        let (change_tx, changes) = mpsc::unbounded_channel();
        let listener_id = state.add_listener(change_tx);
        let (commands_tx, commands) = mpsc::unbounded_channel();

        let baseline = ManifestUpdate::construct(&state, baseline_flags(&state), &ManifestUpdate::default());
        let dispatcher = Dispatcher {
            state,
            listener_id,
            changes,
            commands,
            baseline,
            clients: HashMap::new(),
            next_client_id: 0,
        };

        let handle = tokio::spawn(dispatcher.run(cancel));
        (DispatcherHandle { commands: commands_tx }, handle)
    }

    async fn run(mut self, cancel: CancellationToken) {
        log::info!("Dispatcher started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(command) = self.commands.recv() => match command {
                    Command::Add { sender, reply } => {
                        let _ = reply.send(self.add_client(sender));
                    }
                    Command::Remove(id) => self.remove_client(id),
                },
                Some(flags) = self.changes.recv() => {
                    let mut flags = flags;
                    while let Ok(more) = self.changes.try_recv() {
                        flags |= more;
                    }
                    self.publish(flags);
                }
                else => break,
            }
        }
        self.state.remove_listener(self.listener_id);
        log::info!("Dispatcher stopped with {} clients", self.clients.len());
    }

    fn add_client(&mut self, sender: UpdateSender) -> Result<u64, DispatchError> {
        if let Err(e) = sender.try_send(Arc::new(self.baseline.clone())) {
            log::warn!("Rejecting client: {}", e);
            return Err(DispatchError::QueueUnavailable);
        }
        self.next_client_id += 1;
        let id = self.next_client_id;
        self.clients.insert(id, sender);
        log::info!("Client {} registered", id);
        Ok(id)
    }

    fn remove_client(&mut self, id: u64) {
        if self.clients.remove(&id).is_some() {
            log::info!("Client {} removed", id);
        }
    }

    /// # Publish
    ///
    /// ## Logic:
    /// 1.  Recompute the sections implicated by `flags`.
    /// 2.  Drop the sections equal to the baseline; stop if none remain.
    /// 3.  Send the update to every client, evicting full or closed queues.
    /// 4.  Fold the update into the baseline.
    fn publish(&mut self, flags: SourceChangeFlags) {
        // --- 1. Recompute ---
        let mut update = ManifestUpdate::construct(&self.state, flags, &self.baseline);

        // --- 2. Diff ---
        if !update.diff(&self.baseline) {
            return;
        }

        // --- 3. Zero-Copy Fan-out and Eviction ---
        let update = Arc::new(update);
        self.clients.retain(|id, sender| match sender.try_send(Arc::clone(&update)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::warn!("Client {} is not keeping up. Evicting.", id);
                false
            }
            Err(TrySendError::Closed(_)) => {
                log::info!("Client {} disconnected. Removing from dispatcher.", id);
                false
            }
        });

        // --- 4. Advance the baseline ---
        update.merge_into(&mut self.baseline);
    }
}

/// Sections every client starts with: loads and options always, plus each
/// enabled optional source.
pub fn baseline_flags(state: &DropzoneState) -> SourceChangeFlags {
    let mut flags = SourceChangeFlags::BURBLE | SourceChangeFlags::OPTIONS;
    if state.jumprun().is_some() {
        flags |= SourceChangeFlags::JUMPRUN;
    }
    if state.metar().is_some() {
        flags |= SourceChangeFlags::METAR;
    }
    if state.winds().is_some() {
        flags |= SourceChangeFlags::WINDS_ALOFT;
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::{Settings, SettingsConfig};
    use serde_json::json;
    use std::time::Duration;

    fn state() -> Arc<DropzoneState> {
        DropzoneState::new(Arc::new(Settings::new(SettingsConfig::default()).unwrap())).unwrap()
    }

    fn one_load(name: &str) -> serde_json::Value {
        json!({ "loads": [ {
            "id": 1, "name": "Otter 1", "time_left": 20, "max_slots": 10,
            "groups": [[ { "name": name, "id": 1, "type": "Sport Jumper", "jump": "Solo" } ]]
        } ] })
    }

    async fn next(rx: &mut UpdateReceiver) -> Option<Arc<ManifestUpdate>> {
        tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.ok().flatten()
    }

    #[tokio::test]
    async fn baseline_first_then_only_changed_sections() {
        let state = state();
        let cancel = CancellationToken::new();
        let (handle, task) = Dispatcher::start(Arc::clone(&state), cancel.clone());

        let (id, mut rx) = handle.subscribe().await.unwrap();
        assert_eq!(id, 1);
        let baseline = next(&mut rx).await.unwrap();
        assert!(!baseline.loads.is_unchanged());
        assert!(!baseline.options.is_unchanged());
        assert!(!baseline.status.is_unchanged());
        assert!(!baseline.winds_aloft.is_unchanged());
        assert!(baseline.jumprun.is_unchanged());

        state.burble().apply_payload(&one_load("Alice")).unwrap();
        state.wake(SourceChangeFlags::BURBLE);
        let update = next(&mut rx).await.unwrap();
        assert_eq!(update.loads.as_changed().unwrap().loads.len(), 1);
        assert!(update.options.is_unchanged());
        assert!(update.status.is_unchanged());

        // Nothing differs, so nothing is sent.
        state.wake(SourceChangeFlags::BURBLE | SourceChangeFlags::METAR);
        assert!(next(&mut rx).await.is_none());

        let (second, mut rx2) = handle.subscribe().await.unwrap();
        assert_eq!(second, 2);
        let late = next(&mut rx2).await.unwrap();
        assert_eq!(late.loads, update.loads);

        cancel.cancel();
        task.await.unwrap();
        assert!(handle.subscribe().await.is_err());
    }

    #[tokio::test]
    async fn slow_clients_are_evicted() {
        let state = state();
        let cancel = CancellationToken::new();
        let (handle, _task) = Dispatcher::start(Arc::clone(&state), cancel.clone());

        let (tx, mut rx) = mpsc::channel(1);
        handle.add_client(tx).await.unwrap();

        // The baseline fills the queue, so publishing this update evicts the client.
        state.burble().apply_payload(&one_load("Bob")).unwrap();
        state.wake(SourceChangeFlags::BURBLE);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(next(&mut rx).await.is_some());
        // The dispatcher dropped its sender: the stream ends rather than stalls.
        let end = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        assert!(matches!(end, Ok(None)));
        cancel.cancel();
    }

    #[tokio::test]
    async fn clients_that_cannot_take_the_baseline_are_rejected() {
        let state = state();
        let cancel = CancellationToken::new();
        let (handle, _task) = Dispatcher::start(Arc::clone(&state), cancel.clone());

        let (full_tx, _full_rx) = mpsc::channel(1);
        full_tx.try_send(Arc::new(ManifestUpdate::default())).unwrap();
        assert_eq!(handle.add_client(full_tx).await, Err(DispatchError::QueueUnavailable));

        let (closed_tx, closed_rx) = mpsc::channel(4);
        drop(closed_rx);
        assert_eq!(handle.add_client(closed_tx).await, Err(DispatchError::QueueUnavailable));

        // Rejections do not consume ids.
        let (id, mut rx) = handle.subscribe().await.unwrap();
        assert_eq!(id, 1);
        assert!(next(&mut rx).await.is_some());
        cancel.cancel();
    }
}

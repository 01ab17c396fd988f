//! In-process fan-out of change events to live viewers.
//!
//! A single coordinator task owns the subscriber set. Registration,
//! removal, broadcast and count requests reach it as messages on one queue
//! and are handled in arrival order, so the set needs no lock. Delivery to a
//! subscriber is `try_send` into its bounded buffer: a full buffer drops the
//! event for that subscriber only.

mod event;

pub use event::{EventKind, HubEvent};

use futures::Stream;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::ScribeError;

enum Command {
    Register {
        id: u64,
        sender: mpsc::Sender<HubEvent>,
        reply: oneshot::Sender<()>,
    },
    Unregister {
        id: u64,
    },
    Broadcast(HubEvent),
    Count(oneshot::Sender<usize>),
}

#[derive(Debug, Default)]
struct HubCounters {
    delivered: AtomicU64,
    dropped: AtomicU64,
}

/// Handle to the coordinator. Cheap to share behind an `Arc`.
pub struct EventHub {
    commands: mpsc::UnboundedSender<Command>,
    capacity: usize,
    next_id: AtomicU64,
    counters: Arc<HubCounters>,
}

impl EventHub {
    /// Spawns the coordinator. It runs until `shutdown_token` is cancelled,
    /// at which point every subscriber stream ends.
    ///
    /// `capacity` is the per-subscriber buffer size and is raised to 1 if 0.
    #[must_use]
    pub fn spawn(capacity: usize, shutdown_token: CancellationToken) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let counters = Arc::new(HubCounters::default());
        let handle = tokio::spawn(coordinate(rx, counters.clone(), shutdown_token));

        let hub = Self {
            commands: tx,
            capacity: capacity.max(1),
            next_id: AtomicU64::new(1),
            counters,
        };
        (hub, handle)
    }

    /// Adds a subscriber whose buffer already holds the `connected`
    /// acknowledgement. Resolves once the coordinator has recorded it.
    pub async fn register(&self) -> Result<Subscriber, ScribeError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.capacity);
        sender
            .try_send(HubEvent::connected(id))
            .map_err(|_| ScribeError::Internal("subscriber buffer rejected ack".into()))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Register {
                id,
                sender,
                reply: reply_tx,
            })
            .map_err(|_| ScribeError::Internal("event hub is not running".into()))?;
        reply_rx
            .await
            .map_err(|_| ScribeError::Internal("event hub stopped".into()))?;

        debug!(subscriber_id = id, "subscriber registered");
        Ok(Subscriber {
            id,
            receiver,
            commands: self.commands.clone(),
        })
    }

    /// Queues `event` for every registered subscriber. Never waits.
    pub fn broadcast(&self, event: HubEvent) {
        if self.commands.send(Command::Broadcast(event)).is_err() {
            debug!("event hub stopped, broadcast discarded");
        }
    }

    /// Number of registered subscribers, answered after every command
    /// queued before this call.
    pub async fn client_count(&self) -> usize {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.commands.send(Command::Count(reply_tx)).is_err() {
            return 0;
        }
        reply_rx.await.unwrap_or(0)
    }

    /// Events discarded because a subscriber's buffer was full.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn delivered_events(&self) -> u64 {
        self.counters.delivered.load(Ordering::Relaxed)
    }
}

async fn coordinate(
    mut commands: mpsc::UnboundedReceiver<Command>,
    counters: Arc<HubCounters>,
    shutdown_token: CancellationToken,
) {
    let mut subscribers: HashMap<u64, mpsc::Sender<HubEvent>> = HashMap::new();
    info!("event hub started");

    loop {
        tokio::select! {
            () = shutdown_token.cancelled() => {
                info!("event hub received shutdown signal, stopping");
                break;
            }
            command = commands.recv() => match command {
                Some(Command::Register { id, sender, reply }) => {
                    subscribers.insert(id, sender);
                    let _ = reply.send(());
                }
                Some(Command::Unregister { id }) => {
                    if subscribers.remove(&id).is_some() {
                        debug!(subscriber_id = id, "subscriber unregistered");
                    }
                }
                Some(Command::Broadcast(event)) => fan_out(&mut subscribers, &event, &counters),
                Some(Command::Count(reply)) => {
                    let _ = reply.send(subscribers.len());
                }
                None => break,
            }
        }
    }

    let remaining = subscribers.len();
    subscribers.clear();
    info!(remaining, "event hub shutdown complete");
}

fn fan_out(
    subscribers: &mut HashMap<u64, mpsc::Sender<HubEvent>>,
    event: &HubEvent,
    counters: &HubCounters,
) {
    let mut closed = Vec::new();
    for (id, sender) in subscribers.iter() {
        match sender.try_send(event.clone()) {
            Ok(()) => {
                counters.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                counters.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(subscriber_id = id, kind = event.kind.as_str(), "subscriber buffer full, event dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*id),
        }
    }
    for id in closed {
        subscribers.remove(&id);
    }
}

/// A registered viewer. Dropping it unregisters it.
pub struct Subscriber {
    id: u64,
    receiver: mpsc::Receiver<HubEvent>,
    commands: mpsc::UnboundedSender<Command>,
}

impl Subscriber {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next event, or `None` once the hub has shut down.
    pub async fn recv(&mut self) -> Option<HubEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<HubEvent> {
        self.receiver.try_recv().ok()
    }

    /// Safe to call more than once.
    pub fn unregister(&self) {
        let _ = self.commands.send(Command::Unregister { id: self.id });
    }

    /// Hub events interleaved with a `ping` every `heartbeat`, the first one
    /// a full interval after the call. Ends when the hub shuts down.
    pub fn into_stream(self, heartbeat: Duration) -> impl Stream<Item = HubEvent> + Send + 'static {
        let mut ticker = tokio::time::interval_at(Instant::now() + heartbeat, heartbeat);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        futures::stream::unfold((self, ticker), |(mut subscriber, mut ticker)| async move {
            tokio::select! {
                biased;
                event = subscriber.receiver.recv() => event.map(|e| (e, (subscriber, ticker))),
                _ = ticker.tick() => Some((HubEvent::ping(), (subscriber, ticker))),
            }
        })
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.unregister();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn spawn_hub(capacity: usize) -> (EventHub, CancellationToken, JoinHandle<()>) {
        let token = CancellationToken::new();
        let (hub, handle) = EventHub::spawn(capacity, token.clone());
        (hub, token, handle)
    }

    #[tokio::test]
    async fn test_register_delivers_connected_first() {
        let (hub, _token, _handle) = spawn_hub(4);
        let mut subscriber = hub.register().await.unwrap();

        let first = subscriber.recv().await.unwrap();
        assert_eq!(first.kind, EventKind::Connected);
        assert_eq!(first.data["subscriber_id"], subscriber.id());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_subscriber() {
        let (hub, _token, _handle) = spawn_hub(4);
        let mut a = hub.register().await.unwrap();
        let mut b = hub.register().await.unwrap();
        a.recv().await.unwrap();
        b.recv().await.unwrap();

        hub.broadcast(HubEvent::log_deleted(5));

        assert_eq!(a.recv().await.unwrap(), HubEvent::log_deleted(5));
        assert_eq!(b.recv().await.unwrap(), HubEvent::log_deleted(5));
    }

    #[tokio::test]
    async fn test_full_subscriber_does_not_block_others() {
        let (hub, _token, _handle) = spawn_hub(2);
        // Never drained: holds `connected` plus one event, then is full.
        let mut slow = hub.register().await.unwrap();
        let mut fast = hub.register().await.unwrap();
        fast.recv().await.unwrap();

        for id in 0..5 {
            hub.broadcast(HubEvent::log_deleted(id));
            assert_eq!(fast.recv().await.unwrap(), HubEvent::log_deleted(id));
        }

        assert_eq!(hub.client_count().await, 2);
        assert_eq!(hub.dropped_events(), 4);

        assert_eq!(slow.try_recv().unwrap().kind, EventKind::Connected);
        assert_eq!(slow.try_recv().unwrap(), HubEvent::log_deleted(0));
        assert!(slow.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent_and_drop_unregisters() {
        let (hub, _token, _handle) = spawn_hub(4);
        let a = hub.register().await.unwrap();
        let b = hub.register().await.unwrap();
        assert_eq!(hub.client_count().await, 2);

        a.unregister();
        a.unregister();
        assert_eq!(hub.client_count().await, 1);

        drop(a);
        drop(b);
        assert_eq!(hub.client_count().await, 0);
    }

    #[tokio::test]
    async fn test_shutdown_ends_subscriber_streams() {
        let (hub, token, handle) = spawn_hub(4);
        let mut subscriber = hub.register().await.unwrap();
        subscriber.recv().await.unwrap();

        token.cancel();
        handle.await.unwrap();

        assert!(subscriber.recv().await.is_none());
        assert!(hub.register().await.is_err());
        assert_eq!(hub.client_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_emits_heartbeat() {
        let (hub, _token, _handle) = spawn_hub(4);
        let subscriber = hub.register().await.unwrap();
        let mut stream = Box::pin(subscriber.into_stream(Duration::from_secs(30)));

        assert_eq!(stream.next().await.unwrap().kind, EventKind::Connected);

        let before = Instant::now();
        assert_eq!(stream.next().await.unwrap().kind, EventKind::Ping);
        assert!(before.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_prefers_pending_events_over_ping() {
        let (hub, _token, _handle) = spawn_hub(4);
        let subscriber = hub.register().await.unwrap();
        let mut stream = Box::pin(subscriber.into_stream(Duration::from_secs(30)));
        stream.next().await.unwrap();

        hub.broadcast(HubEvent::log_deleted(1));
        assert_eq!(stream.next().await.unwrap(), HubEvent::log_deleted(1));
    }
}

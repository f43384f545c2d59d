use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::models::presence::PresenceSnapshot;
use crate::transport::{CloseReason, Connection, MessageSink, MessageStream};

enum PresenceCommand {
    Subscribe {
        user_id: String,
        token: u64,
        updates: mpsc::Sender<PresenceSnapshot>,
    },
    Unsubscribe {
        user_id: String,
        token: u64,
    },
    PlayerJoined,
    GameFinished,
    Snapshot(oneshot::Sender<PresenceSnapshot>),
}

struct Subscriber {
    token: u64,
    updates: mpsc::Sender<PresenceSnapshot>,
}

struct PresenceHub {
    commands: mpsc::UnboundedReceiver<PresenceCommand>,
    subscribers: HashMap<String, Subscriber>,
    playing: usize,
}

impl PresenceHub {
    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                PresenceCommand::Subscribe {
                    user_id,
                    token,
                    updates,
                } => {
                    if self
                        .subscribers
                        .insert(user_id.clone(), Subscriber { token, updates })
                        .is_some()
                    {
                        debug!("Replaced presence subscription for {}", user_id);
                    }
                }
                PresenceCommand::Unsubscribe { user_id, token } => {
                    let current = self.subscribers.get(&user_id).map(|s| s.token);
                    if current != Some(token) {
                        continue;
                    }
                    self.subscribers.remove(&user_id);
                }
                PresenceCommand::PlayerJoined => self.playing += 1,
                PresenceCommand::GameFinished => self.playing = self.playing.saturating_sub(2),
                PresenceCommand::Snapshot(reply) => {
                    let _ = reply.send(self.snapshot());
                    continue;
                }
            }
            self.broadcast();
        }
    }

    fn snapshot(&self) -> PresenceSnapshot {
        PresenceSnapshot::compute(self.subscribers.len(), self.playing)
    }

    fn broadcast(&mut self) {
        let snapshot = self.snapshot();
        self.subscribers.retain(|user_id, subscriber| {
            match subscriber.updates.try_send(snapshot) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("Dropping slow presence subscriber {}", user_id);
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }
}

pub struct PresenceSubscription {
    pub user_id: String,
    pub token: u64,
    pub updates: mpsc::Receiver<PresenceSnapshot>,
}

/// Cheap handle onto the presence hub task.
#[derive(Clone)]
pub struct PresenceService {
    commands: mpsc::UnboundedSender<PresenceCommand>,
    tokens: Arc<AtomicU64>,
    queue_capacity: usize,
}

impl PresenceService {
    pub fn start(queue_capacity: usize) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let hub = PresenceHub {
            commands: commands_rx,
            subscribers: HashMap::new(),
            playing: 0,
        };
        tokio::spawn(hub.run());

        PresenceService {
            commands: commands_tx,
            tokens: Arc::new(AtomicU64::new(0)),
            queue_capacity: queue_capacity.max(1),
        }
    }

    pub fn subscribe(&self, user_id: &str) -> PresenceSubscription {
        let token = self.tokens.fetch_add(1, Ordering::Relaxed);
        let (updates_tx, updates_rx) = mpsc::channel(self.queue_capacity);
        self.send(PresenceCommand::Subscribe {
            user_id: user_id.to_string(),
            token,
            updates: updates_tx,
        });
        PresenceSubscription {
            user_id: user_id.to_string(),
            token,
            updates: updates_rx,
        }
    }

    pub fn unsubscribe(&self, user_id: &str, token: u64) {
        self.send(PresenceCommand::Unsubscribe {
            user_id: user_id.to_string(),
            token,
        });
    }

    pub fn player_joined(&self) {
        self.send(PresenceCommand::PlayerJoined);
    }

    pub fn game_finished(&self) {
        self.send(PresenceCommand::GameFinished);
    }

    pub async fn snapshot(&self) -> PresenceSnapshot {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(PresenceCommand::Snapshot(reply_tx));
        reply_rx.await.unwrap_or_default()
    }

    /// Streams snapshots to `connection` until either side goes away.
    pub async fn serve(&self, user_id: &str, connection: Connection, ping_period: Duration) {
        let subscription = self.subscribe(user_id);
        let token = subscription.token;
        info!("{} subscribed to presence", user_id);

        let writer = tokio::spawn(write_snapshots(
            connection.sink,
            subscription.updates,
            ping_period,
        ));
        drain_until_closed(connection.stream).await;

        self.unsubscribe(user_id, token);
        if let Err(e) = writer.await {
            warn!("Presence writer for {} failed: {}", user_id, e);
        }
        debug!("{} left presence", user_id);
    }

    fn send(&self, command: PresenceCommand) {
        if self.commands.send(command).is_err() {
            warn!("Presence hub is not running");
        }
    }
}

async fn write_snapshots(
    mut sink: Box<dyn MessageSink>,
    mut updates: mpsc::Receiver<PresenceSnapshot>,
    ping_period: Duration,
) {
    let mut keepalive = tokio::time::interval_at(Instant::now() + ping_period, ping_period);
    loop {
        let written = tokio::select! {
            update = updates.recv() => match update {
                Some(snapshot) => {
                    let mut batch = vec![snapshot];
                    while let Ok(snapshot) = updates.try_recv() {
                        batch.push(snapshot);
                    }
                    let lines: Result<Vec<String>, _> =
                        batch.iter().map(serde_json::to_string).collect();
                    match lines {
                        Ok(lines) => sink.send_text(lines.join("\n")).await,
                        Err(e) => {
                            warn!("Could not encode presence snapshot: {}", e);
                            sink.close(CloseReason::InternalError).await;
                            return;
                        }
                    }
                }
                None => {
                    sink.close(CloseReason::Normal).await;
                    return;
                }
            },
            _ = keepalive.tick() => sink.send_ping().await,
        };
        if written.is_err() {
            return;
        }
    }
}

async fn drain_until_closed(mut stream: Box<dyn MessageStream>) {
    while let Some(Ok(_)) = stream.next_text().await {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory;

    #[tokio::test]
    async fn test_subscribers_receive_snapshots() {
        let presence = PresenceService::start(8);
        let mut alice = presence.subscribe("u-a");

        assert_eq!(
            alice.updates.recv().await,
            Some(PresenceSnapshot { online: 1, games: 0 })
        );

        let _bob = presence.subscribe("u-b");
        assert_eq!(
            alice.updates.recv().await,
            Some(PresenceSnapshot { online: 2, games: 0 })
        );
    }

    #[tokio::test]
    async fn test_game_counters() {
        let presence = PresenceService::start(8);

        presence.player_joined();
        presence.player_joined();
        assert_eq!(
            presence.snapshot().await,
            PresenceSnapshot { online: 2, games: 1 }
        );

        presence.game_finished();
        presence.game_finished();
        assert_eq!(presence.snapshot().await, PresenceSnapshot::default());
    }

    #[tokio::test]
    async fn test_stale_unsubscribe_keeps_newer_subscription() {
        let presence = PresenceService::start(8);
        let first = presence.subscribe("u-a");
        let mut second = presence.subscribe("u-a");

        presence.unsubscribe("u-a", first.token);

        assert_eq!(
            presence.snapshot().await,
            PresenceSnapshot { online: 1, games: 0 }
        );
        assert_eq!(
            second.updates.recv().await,
            Some(PresenceSnapshot { online: 1, games: 0 })
        );
    }

    #[tokio::test]
    async fn test_slow_subscriber_is_dropped() {
        let presence = PresenceService::start(1);
        let mut slow = presence.subscribe("u-slow");

        presence.player_joined();
        presence.player_joined();

        assert_eq!(
            presence.snapshot().await,
            PresenceSnapshot { online: 2, games: 1 }
        );
        assert_eq!(
            slow.updates.recv().await,
            Some(PresenceSnapshot { online: 1, games: 0 })
        );
        assert_eq!(slow.updates.recv().await, None);
    }

    #[tokio::test]
    async fn test_serve_streams_until_client_leaves() {
        let presence = PresenceService::start(8);
        let (connection, mut client) = memory::pair();

        let serving = {
            let presence = presence.clone();
            tokio::spawn(async move {
                presence
                    .serve("u-a", connection, Duration::from_secs(54))
                    .await
            })
        };
        assert_eq!(
            client.recv_text().await.unwrap(),
            r#"{"online":1,"games":0}"#
        );

        client.hang_up();
        serving.await.unwrap();

        assert_eq!(presence.snapshot().await, PresenceSnapshot::default());
        assert_eq!(client.recv_text().await, None);
    }
}

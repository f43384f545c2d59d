use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::models::{color::Color, time_control::TimeControl};
use crate::services::{
    player::{HandleId, Player},
    room::{MatchObserver, Room, RoomHandle},
};

enum PoolCommand {
    Register(Box<Player>),
    Abandon { match_id: String, handle_id: HandleId },
    Finish(String),
    Shutdown(oneshot::Sender<()>),
}

/// Sends commands to one time control's matching pool.
#[derive(Debug, Clone)]
pub struct PoolHandle {
    time_control: TimeControl,
    commands: mpsc::UnboundedSender<PoolCommand>,
}

impl PoolHandle {
    pub fn register(&self, player: Player) {
        self.send(PoolCommand::Register(Box::new(player)));
    }

    /// Gives up a seat whose participant left before pairing completed.
    pub fn abandon(&self, match_id: &str, handle_id: HandleId) {
        self.send(PoolCommand::Abandon {
            match_id: match_id.to_string(),
            handle_id,
        });
    }

    pub fn finish(&self, match_id: &str) {
        self.send(PoolCommand::Finish(match_id.to_string()));
    }

    /// Ends every room this pool is hosting and waits for their cleanup.
    pub async fn shutdown(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(PoolCommand::Shutdown(done_tx));
        let _ = done_rx.await;
    }

    fn send(&self, command: PoolCommand) {
        if self.commands.send(command).is_err() {
            warn!("Matching pool for {} is not running", self.time_control);
        }
    }
}

enum PoolEntry {
    Waiting {
        white: Option<Player>,
        black: Option<Player>,
    },
    Active(RoomHandle),
}

/// Removes the pool's entry before the external observer sees the finish.
struct PoolObserver {
    pool: PoolHandle,
    inner: Arc<dyn MatchObserver>,
}

#[async_trait]
impl MatchObserver for PoolObserver {
    async fn match_started(&self, match_id: &str) {
        self.inner.match_started(match_id).await;
    }

    async fn colors_swapped(&self, match_id: &str) {
        self.inner.colors_swapped(match_id).await;
    }

    async fn match_finished(&self, match_id: &str) {
        self.pool.finish(match_id);
        self.inner.match_finished(match_id).await;
    }
}

struct MatchingPool {
    handle: PoolHandle,
    commands: mpsc::UnboundedReceiver<PoolCommand>,
    entries: HashMap<String, PoolEntry>,
    observer: Arc<dyn MatchObserver>,
    reconnect_grace: Duration,
}

impl MatchingPool {
    async fn run(mut self) {
        debug!("Matching pool for {} started", self.handle.time_control);
        while let Some(command) = self.commands.recv().await {
            match command {
                PoolCommand::Register(player) => self.register(*player).await,
                PoolCommand::Abandon {
                    match_id,
                    handle_id,
                } => self.abandon(&match_id, handle_id),
                PoolCommand::Finish(match_id) => {
                    if self.entries.remove(&match_id).is_some() {
                        debug!("Match {} left the {} pool", match_id, self.handle.time_control);
                    }
                }
                PoolCommand::Shutdown(done) => {
                    self.shutdown().await;
                    let _ = done.send(());
                }
            }
        }
    }

    async fn register(&mut self, player: Player) {
        let match_id = player.match_id.clone();

        let entry = self
            .entries
            .entry(match_id.clone())
            .or_insert(PoolEntry::Waiting {
                white: None,
                black: None,
            });

        let (white, black) = match entry {
            PoolEntry::Active(room) => {
                info!("{} is rejoining match {}", player.user.username, match_id);
                if room.reconnect(player).is_err() {
                    warn!("Room for match {} refused a rejoin", match_id);
                }
                return;
            }
            PoolEntry::Waiting { white, black } => {
                let seat = match player.color {
                    Color::White => &mut *white,
                    Color::Black => &mut *black,
                };
                if let Some(replaced) = seat.replace(player) {
                    debug!(
                        "Replacing pending {} seat of match {} (handle {})",
                        replaced.color, match_id, replaced.handle_id
                    );
                }
                if white.is_none() || black.is_none() {
                    return;
                }
                (white.take(), black.take())
            }
        };

        let (Some(white), Some(black)) = (white, black) else {
            return;
        };

        let observer: Arc<dyn MatchObserver> = Arc::new(PoolObserver {
            pool: self.handle.clone(),
            inner: self.observer.clone(),
        });
        let room = Room::open(white, black, self.reconnect_grace, observer);
        self.entries.insert(match_id.clone(), PoolEntry::Active(room));
        self.observer.match_started(&match_id).await;
    }

    /// Room cleanup only queues a `Finish` on this pool and never waits on
    /// its loop.
    async fn shutdown(&mut self) {
        info!(
            "Closing {} rooms in the {} pool",
            self.entries.len(),
            self.handle.time_control
        );
        let mut closing = JoinSet::new();
        for (_, entry) in self.entries.drain() {
            if let PoolEntry::Active(room) = entry {
                debug!("Unregistering room {}", room.match_id());
                closing.spawn(async move { room.unregister().await });
            }
        }
        while let Some(closed) = closing.join_next().await {
            if let Err(e) = closed {
                warn!("Room did not close cleanly: {}", e);
            }
        }
    }

    fn abandon(&mut self, match_id: &str, handle_id: HandleId) {
        match self.entries.get_mut(match_id) {
            Some(PoolEntry::Waiting { white, black }) => {
                for seat in [&mut *white, &mut *black] {
                    if seat.as_ref().map(|p| p.handle_id) == Some(handle_id) {
                        debug!("Handle {} gave up its seat in match {}", handle_id, match_id);
                        *seat = None;
                    }
                }
                if white.is_none() && black.is_none() {
                    self.entries.remove(match_id);
                }
            }
            // The room was attached while the handle was already leaving.
            Some(PoolEntry::Active(room)) => {
                let _ = room.try_disconnect(handle_id);
            }
            None => {}
        }
    }
}

/// Pairs the two connections of each match into a room, one pool per
/// supported time control.
pub struct RoomMatcher {
    pools: HashMap<TimeControl, PoolHandle>,
}

impl RoomMatcher {
    pub fn start(observer: Arc<dyn MatchObserver>, reconnect_grace: Duration) -> Self {
        let pools = TimeControl::ALL
            .iter()
            .map(|&time_control| {
                let (commands_tx, commands_rx) = mpsc::unbounded_channel();
                let handle = PoolHandle {
                    time_control,
                    commands: commands_tx,
                };
                let pool = MatchingPool {
                    handle: handle.clone(),
                    commands: commands_rx,
                    entries: HashMap::new(),
                    observer: observer.clone(),
                    reconnect_grace,
                };
                tokio::spawn(pool.run());
                (time_control, handle)
            })
            .collect();

        info!("Room matcher started for {} time controls", TimeControl::ALL.len());
        RoomMatcher { pools }
    }

    pub fn pool(&self, time_control: TimeControl) -> Option<PoolHandle> {
        self.pools.get(&time_control).cloned()
    }

    pub async fn shutdown(&self) {
        for pool in self.pools.values() {
            pool.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::User;
    use crate::services::player::{run_outbound, OutboundContext, OutboundQueues};
    use crate::transport::memory::{self, MemoryClient};

    #[derive(Default)]
    struct CountingObserver {
        started: std::sync::Mutex<Vec<String>>,
        finished: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MatchObserver for CountingObserver {
        async fn match_started(&self, match_id: &str) {
            self.started.lock().unwrap().push(match_id.to_string());
        }

        async fn colors_swapped(&self, _match_id: &str) {}

        async fn match_finished(&self, match_id: &str) {
            self.finished.lock().unwrap().push(match_id.to_string());
        }
    }

    fn connect(match_id: &str, user: User, color: Color) -> (Player, MemoryClient) {
        let (connection, client) = memory::pair();
        let (player, queues, _room): (Player, OutboundQueues, _) =
            Player::new(match_id, user.clone(), color, TimeControl::ThreeMinutes, 8);
        let context = OutboundContext {
            recipient_id: user.id,
            default_username: "anonymous".to_string(),
            ping_period: Duration::from_secs(3600),
        };
        tokio::spawn(run_outbound(connection.sink, queues, context));
        (player, client)
    }

    #[tokio::test]
    async fn test_room_opens_once_both_colors_register() {
        let observer = Arc::new(CountingObserver::default());
        let matcher = RoomMatcher::start(observer.clone(), Duration::from_secs(5));
        let pool = matcher.pool(TimeControl::ThreeMinutes).unwrap();

        let (white, mut white_client) = connect("m-1", User::new("u-1", "amy"), Color::White);
        let (black, mut black_client) = connect("m-1", User::new("u-2", "ben"), Color::Black);
        pool.register(white);
        pool.register(black);

        assert_eq!(white_client.recv_text().await.unwrap(), r#"{"oppReady":"true"}"#);
        assert_eq!(black_client.recv_text().await.unwrap(), r#"{"oppReady":"true"}"#);
        assert_eq!(*observer.started.lock().unwrap(), vec!["m-1".to_string()]);
    }

    #[tokio::test]
    async fn test_single_registration_waits_for_opponent() {
        let observer = Arc::new(CountingObserver::default());
        let matcher = RoomMatcher::start(observer.clone(), Duration::from_secs(5));
        let pool = matcher.pool(TimeControl::ThreeMinutes).unwrap();

        let (white, mut white_client) = connect("m-2", User::new("u-1", "amy"), Color::White);
        pool.register(white);

        let waited =
            tokio::time::timeout(Duration::from_millis(50), white_client.recv_text()).await;
        assert!(waited.is_err());
        assert!(observer.started.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_seat_is_freed_before_pairing() {
        let observer = Arc::new(CountingObserver::default());
        let matcher = RoomMatcher::start(observer.clone(), Duration::from_secs(5));
        let pool = matcher.pool(TimeControl::ThreeMinutes).unwrap();

        let (first, _first_client) = connect("m-3", User::new("u-1", "amy"), Color::White);
        let first_handle = first.handle_id;
        pool.register(first);
        pool.abandon("m-3", first_handle);

        let (second, mut second_client) = connect("m-3", User::new("u-1", "amy"), Color::White);
        let (black, mut black_client) = connect("m-3", User::new("u-2", "ben"), Color::Black);
        pool.register(second);
        pool.register(black);

        assert_eq!(second_client.recv_text().await.unwrap(), r#"{"oppReady":"true"}"#);
        assert_eq!(black_client.recv_text().await.unwrap(), r#"{"oppReady":"true"}"#);
    }

    #[tokio::test]
    async fn test_registration_for_active_match_rejoins_room() {
        let observer = Arc::new(CountingObserver::default());
        let matcher = RoomMatcher::start(observer.clone(), Duration::from_secs(5));
        let pool = matcher.pool(TimeControl::ThreeMinutes).unwrap();

        let (white, _white_client) = connect("m-4", User::new("u-1", "amy"), Color::White);
        let (black, mut black_client) = connect("m-4", User::new("u-2", "ben"), Color::Black);
        pool.register(white);
        pool.register(black);
        black_client.recv_text().await.unwrap();

        let (rejoined, mut rejoined_client) =
            connect("m-4", User::new("u-1", "amy"), Color::White);
        pool.register(rejoined);

        assert_eq!(rejoined_client.recv_text().await.unwrap(), r#"{"pgn":""}"#);
        assert_eq!(black_client.recv_text().await.unwrap(), r#"{"oppReady":"true"}"#);
        assert_eq!(observer.started.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_closes_active_rooms() {
        let observer = Arc::new(CountingObserver::default());
        let matcher = RoomMatcher::start(observer.clone(), Duration::from_secs(5));
        let pool = matcher.pool(TimeControl::ThreeMinutes).unwrap();
        let (white, mut white_client) = connect("m-5", User::new("u-1", "amy"), Color::White);
        let (black, _black_client) = connect("m-5", User::new("u-2", "ben"), Color::Black);
        pool.register(white);
        pool.register(black);
        white_client.recv_text().await.unwrap();

        matcher.shutdown().await;

        assert_eq!(*observer.finished.lock().unwrap(), vec!["m-5".to_string()]);
        assert_eq!(white_client.recv_text().await, None);
    }
}

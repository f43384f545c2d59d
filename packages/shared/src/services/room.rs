//! A single two-player game. The room task owns both seats and both clocks
//! and handles one event at a time from a single queue, so no state is
//! shared with the participant tasks.

use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::models::{
    color::Color,
    messages::{self, ChatLine, ClientMessage, MovePayload, Signal},
};
use crate::services::{
    clock,
    player::{HandleId, Player, QueueError},
};

const ROOM_QUEUE_CAPACITY: usize = 64;

/// Lifecycle hooks supplied by whoever opens the room.
#[async_trait]
pub trait MatchObserver: Send + Sync {
    async fn match_started(&self, match_id: &str);

    async fn colors_swapped(&self, match_id: &str);

    async fn match_finished(&self, match_id: &str);
}

#[derive(Debug)]
pub enum RoomEvent {
    Move { from: HandleId, payload: MovePayload },
    Chat { from: HandleId, text: String },
    DrawOffer(HandleId),
    AcceptDraw(HandleId),
    Resign(HandleId),
    RematchOffer(HandleId),
    AcceptRematch(HandleId),
    StopClocks,
    Disconnect(HandleId),
    Reconnect(Box<Player>),
    /// Ends the room; the sender is answered once cleanup has run.
    Unregister(oneshot::Sender<()>),
}

impl RoomEvent {
    /// The event a decoded client frame raises, if any. Leaving the room
    /// is handled by the connection itself.
    pub fn from_message(from: HandleId, message: ClientMessage) -> Option<RoomEvent> {
        let event = match message {
            ClientMessage::Move(payload) => RoomEvent::Move { from, payload },
            ClientMessage::Chat(text) => RoomEvent::Chat { from, text },
            ClientMessage::Resign => RoomEvent::Resign(from),
            ClientMessage::DrawOffer => RoomEvent::DrawOffer(from),
            ClientMessage::AcceptDraw => RoomEvent::AcceptDraw(from),
            ClientMessage::GameOver => RoomEvent::StopClocks,
            ClientMessage::RematchOffer => RoomEvent::RematchOffer(from),
            ClientMessage::AcceptRematch => RoomEvent::AcceptRematch(from),
            ClientMessage::FinishRoom | ClientMessage::Unknown => return None,
        };
        Some(event)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomClosed;

#[derive(Debug, Clone)]
pub struct RoomHandle {
    match_id: Arc<str>,
    events: mpsc::Sender<RoomEvent>,
}

impl RoomHandle {
    pub fn match_id(&self) -> &str {
        &self.match_id
    }

    pub async fn send(&self, event: RoomEvent) -> Result<(), RoomClosed> {
        self.events.send(event).await.map_err(|_| RoomClosed)
    }

    pub async fn disconnect(&self, handle_id: HandleId) {
        let _ = self.send(RoomEvent::Disconnect(handle_id)).await;
    }

    /// Hands a rejoining participant to the room without waiting. If the
    /// room is gone or backed up the player is dropped, which closes its
    /// connection.
    pub fn reconnect(&self, player: Player) -> Result<(), RoomClosed> {
        self.events
            .try_send(RoomEvent::Reconnect(Box::new(player)))
            .map_err(|_| RoomClosed)
    }

    pub fn try_disconnect(&self, handle_id: HandleId) -> Result<(), RoomClosed> {
        self.events
            .try_send(RoomEvent::Disconnect(handle_id))
            .map_err(|_| RoomClosed)
    }

    /// Ends the room and waits until it has cleaned up.
    pub async fn unregister(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.send(RoomEvent::Unregister(done_tx)).await.is_err() {
            return;
        }
        let _ = done_rx.await;
    }

    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomExit {
    BothDisconnected,
    Unregistered,
    ChatBackedUp(Color),
    ResyncFailed(Color),
}

impl fmt::Display for RoomExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomExit::BothDisconnected => write!(f, "both players left"),
            RoomExit::Unregistered => write!(f, "unregistered"),
            RoomExit::ChatBackedUp(color) => write!(f, "{} chat queue is full", color),
            RoomExit::ResyncFailed(color) => write!(f, "could not resync {}", color),
        }
    }
}

pub struct Room {
    match_id: String,
    white: Player,
    black: Player,
    duration: Duration,
    reconnect_grace: Duration,
    events: mpsc::Receiver<RoomEvent>,
    handle: RoomHandle,
    observer: Arc<dyn MatchObserver>,
    /// Seat of the side that dropped, while the room waits for it.
    away: Option<Color>,
    grace_deadline: Option<Instant>,
    pgn: String,
    unregistered: Option<oneshot::Sender<()>>,
}

impl Room {
    /// Seats both players, attaches them and starts the room task.
    pub fn open(
        mut white: Player,
        mut black: Player,
        reconnect_grace: Duration,
        observer: Arc<dyn MatchObserver>,
    ) -> RoomHandle {
        let (events_tx, events_rx) = mpsc::channel(ROOM_QUEUE_CAPACITY);
        let handle = RoomHandle {
            match_id: Arc::from(white.match_id.as_str()),
            events: events_tx,
        };

        white.color = Color::White;
        black.color = Color::Black;
        white.attach(handle.clone());
        black.attach(handle.clone());

        let room = Room {
            match_id: white.match_id.clone(),
            duration: white.time_control.duration(),
            white,
            black,
            reconnect_grace,
            events: events_rx,
            handle: handle.clone(),
            observer,
            away: None,
            grace_deadline: None,
            pgn: String::new(),
            unregistered: None,
        };
        tokio::spawn(room.run());
        handle
    }

    async fn run(mut self) {
        info!(
            "Room {} opened: {} (white) vs {} (black)",
            self.match_id, self.white.user.username, self.black.user.username
        );
        self.notify(Color::White, Signal::OpponentReady);
        self.notify(Color::Black, Signal::OpponentReady);

        let exit = loop {
            let white_deadline = self.white.clock.deadline();
            let black_deadline = self.black.clock.deadline();
            let grace_deadline = self.grace_deadline;

            let flow = tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => ControlFlow::Break(RoomExit::Unregistered),
                },
                _ = clock::expiry(white_deadline) => self.on_clock_expired(Color::White),
                _ = clock::expiry(black_deadline) => self.on_clock_expired(Color::Black),
                _ = clock::expiry(grace_deadline) => self.on_grace_expired(),
            };

            if let ControlFlow::Break(exit) = flow {
                break exit;
            }
        };

        self.close(exit).await;
    }

    async fn handle(&mut self, event: RoomEvent) -> ControlFlow<RoomExit> {
        match event {
            RoomEvent::Move { from, payload } => self.on_move(from, payload),
            RoomEvent::Chat { from, text } => return self.on_chat(from, text),
            RoomEvent::DrawOffer(from) => {
                if let Some(color) = self.gated_seat(from, "draw offer") {
                    self.notify(color.opposite(), Signal::DrawOffered);
                }
            }
            RoomEvent::AcceptDraw(from) => {
                if let Some(color) = self.gated_seat(from, "draw acceptance") {
                    self.notify(color.opposite(), Signal::OpponentAcceptedDraw);
                    self.stop_clocks();
                }
            }
            RoomEvent::Resign(from) => {
                if let Some(color) = self.gated_seat(from, "resignation") {
                    info!("{} resigned in room {}", color, self.match_id);
                    self.notify(color.opposite(), Signal::OpponentResigned);
                    self.stop_clocks();
                }
            }
            RoomEvent::RematchOffer(from) => {
                if let Some(color) = self.gated_seat(from, "rematch offer") {
                    self.notify(color.opposite(), Signal::RematchOffered);
                }
            }
            RoomEvent::AcceptRematch(from) => {
                if let Some(color) = self.gated_seat(from, "rematch acceptance") {
                    self.notify(color.opposite(), Signal::OpponentAcceptedRematch);
                    self.start_rematch().await;
                }
            }
            RoomEvent::StopClocks => self.stop_clocks(),
            RoomEvent::Disconnect(handle_id) => return self.on_disconnect(handle_id),
            RoomEvent::Reconnect(player) => return self.on_reconnect(*player),
            RoomEvent::Unregister(done) => {
                self.unregistered = Some(done);
                return ControlFlow::Break(RoomExit::Unregistered);
            }
        }
        ControlFlow::Continue(())
    }

    fn on_move(&mut self, from: HandleId, payload: MovePayload) {
        if self.seat_of(from).is_none() {
            debug!("Ignoring move from stale handle {} in room {}", from, self.match_id);
            return;
        }

        let mover = payload.color;
        let opponent = mover.opposite();
        self.pgn = payload.pgn;

        let now = Instant::now();
        let elapsed = match (self.seat(mover).last_move, self.seat(opponent).last_move) {
            (Some(_), Some(previous)) if self.away.is_none() => {
                now.saturating_duration_since(previous)
            }
            _ => Duration::ZERO,
        };

        let opponent_seat = self.seat_mut(opponent);
        if opponent_seat.last_move.is_some() {
            opponent_seat.clock.start();
        }

        let mover_seat = self.seat_mut(mover);
        mover_seat.last_move = Some(now);
        mover_seat.clock.charge(elapsed);
        mover_seat.clock.stop();

        let mover_left = self.seat(mover).clock.remaining().as_millis();
        let opponent_left = self.seat(opponent).clock.remaining().as_millis();

        let forwarded = match messages::decorate_move(&payload.raw, opponent_left, mover_left) {
            Ok(forwarded) => forwarded,
            Err(e) => {
                warn!("Could not decorate move in room {}: {}", self.match_id, e);
                return;
            }
        };

        if self.seat(opponent).outbox.push_move(forwarded).is_err() {
            debug!("{} is not receiving moves in room {}", opponent, self.match_id);
        }
        let update = messages::clock_update(mover_left, opponent_left);
        if self.seat(mover).outbox.push_move(update).is_err() {
            debug!("{} is not receiving moves in room {}", mover, self.match_id);
        }
    }

    fn on_chat(&mut self, from: HandleId, text: String) -> ControlFlow<RoomExit> {
        let Some(color) = self.seat_of(from) else {
            debug!("Ignoring chat from stale handle {} in room {}", from, self.match_id);
            return ControlFlow::Continue(());
        };
        let text = messages::sanitize_chat(&text);
        if text.is_empty() {
            return ControlFlow::Continue(());
        }

        let sender = &self.seat(color).user;
        let line = ChatLine {
            text,
            from: sender.username.clone(),
            sender_id: sender.id.clone(),
        };

        for recipient in [Color::White, Color::Black] {
            if let Err(QueueError::Full) = self.seat(recipient).outbox.push_chat(line.clone()) {
                warn!("Chat queue for {} is full in room {}", recipient, self.match_id);
                return ControlFlow::Break(RoomExit::ChatBackedUp(recipient));
            }
        }
        ControlFlow::Continue(())
    }

    fn on_clock_expired(&mut self, color: Color) -> ControlFlow<RoomExit> {
        self.seat_mut(color).clock.stop();
        info!("{} ran out of time in room {}", color, self.match_id);
        self.notify(color, Signal::OwnClockExpired);

        if self.away.is_some() {
            debug!("Not announcing timeout in room {} while a player is away", self.match_id);
        } else {
            self.notify(color.opposite(), Signal::OpponentRanOut);
        }
        ControlFlow::Continue(())
    }

    fn on_grace_expired(&mut self) -> ControlFlow<RoomExit> {
        self.grace_deadline = None;
        if let Some(away) = self.away {
            info!("{} did not come back to room {}", away, self.match_id);
            self.notify(away.opposite(), Signal::OpponentGone);
        }
        ControlFlow::Continue(())
    }

    fn on_disconnect(&mut self, handle_id: HandleId) -> ControlFlow<RoomExit> {
        let Some(color) = self.seat_of(handle_id) else {
            debug!("Ignoring disconnect of replaced handle {}", handle_id);
            return ControlFlow::Continue(());
        };
        self.seat(color).outbox.disconnect();

        if self.away.is_some() {
            return ControlFlow::Break(RoomExit::BothDisconnected);
        }

        info!("{} disconnected from room {}", color, self.match_id);
        self.notify(color.opposite(), Signal::OpponentDisconnected);
        self.grace_deadline = Some(Instant::now() + self.reconnect_grace);
        self.away = Some(color);
        ControlFlow::Continue(())
    }

    fn on_reconnect(&mut self, mut player: Player) -> ControlFlow<RoomExit> {
        let color = player.color;
        let away = self.away;
        if away == Some(color) {
            self.grace_deadline = None;
            self.away = None;
        }

        let previous = self.seat(color);
        player.clock = previous.clock;
        player.last_move = previous.last_move;
        player.attach(self.handle.clone());

        let replaced = std::mem::replace(self.seat_mut(color), player);
        replaced.outbox.disconnect();
        replaced.detach();

        info!("{} rejoined room {}", color, self.match_id);
        match away {
            // The opponent's handle is gone; the room keeps waiting on it.
            Some(away) if away != color => {
                debug!("{} is still away from room {}", away, self.match_id)
            }
            _ => self.notify(color.opposite(), Signal::OpponentReconnected),
        }

        let resync = messages::resync_payload(&self.pgn);
        if self.seat(color).outbox.push_move(resync).is_err() {
            return ControlFlow::Break(RoomExit::ResyncFailed(color));
        }
        ControlFlow::Continue(())
    }

    async fn start_rematch(&mut self) {
        self.observer.colors_swapped(&self.match_id).await;

        std::mem::swap(&mut self.white, &mut self.black);
        self.white.color = Color::White;
        self.black.color = Color::Black;
        for seat in [&mut self.white, &mut self.black] {
            seat.clock.reset(self.duration);
            seat.last_move = None;
        }
        self.pgn.clear();
        info!(
            "Rematch in room {}: {} now plays white",
            self.match_id, self.white.user.username
        );
    }

    async fn close(mut self, exit: RoomExit) {
        info!("Closing room {}: {}", self.match_id, exit);
        self.events.close();
        self.grace_deadline = None;
        for seat in [&mut self.white, &mut self.black] {
            seat.clock.stop();
            seat.outbox.close();
            seat.detach();
        }
        self.observer.match_finished(&self.match_id).await;
        if let Some(done) = self.unregistered.take() {
            let _ = done.send(());
        }
    }

    fn stop_clocks(&mut self) {
        self.white.clock.stop();
        self.black.clock.stop();
    }

    /// Seat of the sender, unless the room is waiting on a dropped player.
    fn gated_seat(&self, from: HandleId, action: &str) -> Option<Color> {
        let color = self.seat_of(from)?;
        if self.away.is_some() {
            debug!("Ignoring {} from {} while opponent is away", action, color);
            return None;
        }
        Some(color)
    }

    fn notify(&self, color: Color, signal: Signal) {
        if let Err(e) = self.seat(color).outbox.signal(signal) {
            debug!("Could not signal {} ({:?}): {:?}", color, signal, e);
        }
    }

    fn seat_of(&self, handle_id: HandleId) -> Option<Color> {
        if self.white.handle_id == handle_id {
            Some(Color::White)
        } else if self.black.handle_id == handle_id {
            Some(Color::Black)
        } else {
            None
        }
    }

    fn seat(&self, color: Color) -> &Player {
        match color {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }

    fn seat_mut(&mut self, color: Color) -> &mut Player {
        match color {
            Color::White => &mut self.white,
            Color::Black => &mut self.black,
        }
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::models::{
    color::Color,
    matchmaking::{Invite, InviteOutcome, MatchAssignment, MatchRecord, QuickMatchOutcome},
    presence::PresenceSnapshot,
    time_control::TimeControl,
    user::User,
};
use crate::repositories::{
    invite_repository::InMemoryInviteRepository,
    match_repository::{InMemoryMatchRepository, MatchRepository},
};
use crate::services::{
    errors::lobby_service_errors::LobbyServiceError,
    errors::matchmaking_service_errors::MatchmakingServiceError,
    invite_service::InviteService,
    matchmaking_service::MatchmakingService,
    player::{self, InboundContext, OutboundContext, Player},
    presence_service::PresenceService,
    room::MatchObserver,
    room_matcher::RoomMatcher,
};
use crate::settings::LobbySettings;
use crate::transport::Connection;

/// Keeps the match directory and the presence counters in step with the
/// rooms' lifecycles.
struct LobbyObserver {
    matches: Arc<dyn MatchRepository + Send + Sync>,
    presence: PresenceService,
}

#[async_trait]
impl MatchObserver for LobbyObserver {
    async fn match_started(&self, _match_id: &str) {
        self.presence.player_joined();
        self.presence.player_joined();
    }

    async fn colors_swapped(&self, match_id: &str) {
        if let Err(e) = self.matches.swap_colors(match_id).await {
            warn!("Could not swap colors of match {}: {}", match_id, e);
        }
    }

    async fn match_finished(&self, match_id: &str) {
        if let Err(e) = self.matches.remove_match(match_id).await {
            debug!("Match {} was already gone: {}", match_id, e);
        }
        self.presence.game_finished();
        info!("Match {} finished", match_id);
    }
}

/// Entry point for every session-facing operation.
#[derive(Clone)]
pub struct LobbyService {
    settings: Arc<LobbySettings>,
    matches: Arc<dyn MatchRepository + Send + Sync>,
    matchmaking: MatchmakingService,
    invites: InviteService,
    matcher: Arc<RoomMatcher>,
    presence: PresenceService,
}

impl LobbyService {
    /// Builds the in-memory lobby and starts its background tasks. Must be
    /// called from within a Tokio runtime.
    pub fn start(settings: LobbySettings) -> Self {
        let matches: Arc<dyn MatchRepository + Send + Sync> =
            Arc::new(InMemoryMatchRepository::new());
        let presence = PresenceService::start(settings.presence_queue_capacity);
        let observer = Arc::new(LobbyObserver {
            matches: matches.clone(),
            presence: presence.clone(),
        });

        LobbyService {
            matchmaking: MatchmakingService::new(matches.clone(), settings.quick_match_wait),
            invites: InviteService::new(
                Arc::new(InMemoryInviteRepository::new()),
                matches.clone(),
                settings.invite_wait,
            ),
            matcher: Arc::new(RoomMatcher::start(observer, settings.reconnect_grace)),
            presence,
            matches,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &LobbySettings {
        &self.settings
    }

    pub async fn request_quick_match(
        &self,
        user: &User,
        minutes: u32,
    ) -> Result<QuickMatchOutcome, LobbyServiceError> {
        let time_control = time_control(minutes)?;
        Ok(self.matchmaking.request_match(user, time_control).await?)
    }

    pub async fn create_invite(
        &self,
        host: &User,
        minutes: u32,
    ) -> Result<Invite, LobbyServiceError> {
        let time_control = time_control(minutes)?;
        Ok(self.invites.create_invite(host, time_control).await?)
    }

    pub async fn join_invite(
        &self,
        invite_id: &str,
        joiner: &User,
    ) -> Result<MatchAssignment, LobbyServiceError> {
        Ok(self.invites.join_invite(invite_id, joiner).await?)
    }

    /// Checks that `host` owns the invite before its wait is started.
    pub async fn check_invite_host(
        &self,
        invite_id: &str,
        host: &User,
    ) -> Result<Invite, LobbyServiceError> {
        let invite = self.invites.get_invite(invite_id).await?;
        if invite.host.id != host.id {
            return Err(LobbyServiceError::NotAParticipant);
        }
        Ok(invite)
    }

    pub async fn wait_on_invite(&self, invite_id: &str, connection: Connection) -> InviteOutcome {
        self.invites.wait_for_opponent(invite_id, connection).await
    }

    /// Resolves the seat `user` holds in the match without attaching.
    pub async fn check_seat(
        &self,
        match_id: &str,
        user: &User,
        minutes: u32,
    ) -> Result<Color, LobbyServiceError> {
        let (record, color) = self.seat_of(match_id, user, minutes).await?;
        debug!("{} holds {} in match {}", user.id, color, record.match_id);
        Ok(color)
    }

    /// Resolves the user's seat in the match and hands the connection to
    /// its room. The connection is served by background tasks from here
    /// on; the returned color is the seat that was taken.
    pub async fn attach_to_room(
        &self,
        match_id: &str,
        user: &User,
        minutes: u32,
        connection: Connection,
    ) -> Result<Color, LobbyServiceError> {
        let (record, color) = self.seat_of(match_id, user, minutes).await?;
        let time_control = record.time_control;
        let pool = self
            .matcher
            .pool(time_control)
            .ok_or(LobbyServiceError::Matchmaking(
                MatchmakingServiceError::UnsupportedTimeControl(minutes),
            ))?;

        let seated = record.user(color).clone();
        let (player, queues, room) = Player::new(
            match_id,
            seated,
            color,
            time_control,
            self.settings.chat_queue_capacity,
        );
        let inbound = InboundContext {
            handle_id: player.handle_id,
            match_id: match_id.to_string(),
            room,
            pool: pool.clone(),
        };
        let outbound = OutboundContext::new(&user.id, &self.settings);

        tokio::spawn(player::run_outbound(connection.sink, queues, outbound));
        pool.register(player);
        tokio::spawn(player::run_inbound(connection.stream, inbound));

        info!("{} attached to match {} as {}", user.id, match_id, color);
        Ok(color)
    }

    async fn seat_of(
        &self,
        match_id: &str,
        user: &User,
        minutes: u32,
    ) -> Result<(MatchRecord, Color), LobbyServiceError> {
        if match_id.is_empty() {
            return Err(LobbyServiceError::ValidationError(
                "match id is required".to_string(),
            ));
        }
        let time_control = time_control(minutes)?;
        let record = self.matches.get_match(match_id).await?;
        if record.time_control != time_control {
            return Err(LobbyServiceError::ValidationError(format!(
                "match {} is played at {}, not {}",
                match_id, record.time_control, time_control
            )));
        }
        let color = record
            .color_of(&user.id)
            .ok_or(LobbyServiceError::NotAParticipant)?;
        Ok((record, color))
    }

    pub async fn subscribe_presence(&self, user: &User, connection: Connection) {
        self.presence
            .serve(&user.id, connection, self.settings.ping_period)
            .await;
    }

    pub async fn presence_snapshot(&self) -> PresenceSnapshot {
        self.presence.snapshot().await
    }

    pub async fn active_matches(&self) -> usize {
        self.matches.active_matches().await
    }

    /// Ends every running room. Returns once each room has cleaned up.
    pub async fn shutdown(&self) {
        self.matcher.shutdown().await;
    }
}

fn time_control(minutes: u32) -> Result<TimeControl, LobbyServiceError> {
    TimeControl::from_minutes(minutes).ok_or_else(|| {
        LobbyServiceError::ValidationError(format!("unsupported time control: {} minutes", minutes))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory;
    use std::time::Duration;

    fn settings() -> LobbySettings {
        LobbySettings {
            quick_match_wait: Duration::from_secs(5),
            ..LobbySettings::default()
        }
    }

    #[tokio::test]
    async fn test_unsupported_time_control_is_rejected() {
        let lobby = LobbyService::start(settings());

        let result = lobby
            .request_quick_match(&User::new("u-1", "amy"), 7)
            .await;

        assert!(matches!(result, Err(LobbyServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_attach_to_unknown_match_is_not_found() {
        let lobby = LobbyService::start(settings());
        let (connection, _client) = memory::pair();

        let result = lobby
            .attach_to_room("missing", &User::new("u-1", "amy"), 3, connection)
            .await;

        assert_eq!(result, Err(LobbyServiceError::MatchNotFound));
    }

    #[tokio::test]
    async fn test_attach_by_outsider_is_rejected() {
        let lobby = LobbyService::start(settings());
        let invite = lobby
            .create_invite(&User::new("u-1", "amy"), 3)
            .await
            .unwrap();
        let assignment = lobby
            .join_invite(&invite.invite_id, &User::new("u-2", "ben"))
            .await
            .unwrap();
        let (connection, _client) = memory::pair();

        let result = lobby
            .attach_to_room(&assignment.match_id, &User::new("u-3", "cat"), 3, connection)
            .await;

        assert_eq!(result, Err(LobbyServiceError::NotAParticipant));
    }

    #[tokio::test]
    async fn test_attach_with_wrong_time_control_is_rejected() {
        let lobby = LobbyService::start(settings());
        let invite = lobby
            .create_invite(&User::new("u-1", "amy"), 3)
            .await
            .unwrap();
        let assignment = lobby
            .join_invite(&invite.invite_id, &User::new("u-2", "ben"))
            .await
            .unwrap();
        let (connection, _client) = memory::pair();

        let result = lobby
            .attach_to_room(&assignment.match_id, &User::new("u-2", "ben"), 5, connection)
            .await;

        assert!(matches!(result, Err(LobbyServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_check_seat_resolves_color_from_record() {
        let lobby = LobbyService::start(settings());
        let host = User::new("u-1", "amy");
        let guest = User::new("u-2", "ben");
        let invite = lobby.create_invite(&host, 5).await.unwrap();
        let assignment = lobby.join_invite(&invite.invite_id, &guest).await.unwrap();

        let guest_color = lobby
            .check_seat(&assignment.match_id, &guest, 5)
            .await
            .unwrap();
        let host_color = lobby
            .check_seat(&assignment.match_id, &host, 5)
            .await
            .unwrap();

        assert_eq!(guest_color, assignment.color);
        assert_eq!(host_color, assignment.color.opposite());
        assert_eq!(lobby.active_matches().await, 1);
    }

    #[tokio::test]
    async fn test_waiting_on_someone_elses_invite_is_rejected() {
        let lobby = LobbyService::start(settings());
        let invite = lobby
            .create_invite(&User::new("u-1", "amy"), 1)
            .await
            .unwrap();

        let result = lobby
            .check_invite_host(&invite.invite_id, &User::new("u-2", "ben"))
            .await;

        assert_eq!(result, Err(LobbyServiceError::NotAParticipant));
    }
}

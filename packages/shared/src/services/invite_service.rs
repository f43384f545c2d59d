use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::models::{
    color::Color,
    matchmaking::{Invite, InviteOutcome, MatchAssignment, MatchRecord, MatchResponse},
    time_control::TimeControl,
    user::User,
};
use crate::repositories::{
    invite_repository::{InvitePairing, InviteRepository},
    match_repository::MatchRepository,
};
use crate::services::errors::invite_service_errors::InviteServiceError;
use crate::transport::{CloseReason, Connection, MessageStream};

const EXPIRED_PAYLOAD: &str = r#"{"expired":"true"}"#;

#[derive(Clone)]
pub struct InviteService {
    invites: Arc<dyn InviteRepository + Send + Sync>,
    matches: Arc<dyn MatchRepository + Send + Sync>,
    wait: Duration,
}

impl InviteService {
    pub fn new(
        invites: Arc<dyn InviteRepository + Send + Sync>,
        matches: Arc<dyn MatchRepository + Send + Sync>,
        wait: Duration,
    ) -> Self {
        InviteService {
            invites,
            matches,
            wait,
        }
    }

    pub async fn create_invite(
        &self,
        host: &User,
        time_control: TimeControl,
    ) -> Result<Invite, InviteServiceError> {
        if host.id.is_empty() {
            return Err(InviteServiceError::ValidationError(
                "host id is required".to_string(),
            ));
        }
        let invite = Invite::new(host.clone(), time_control);
        self.invites.create_invite(&invite).await?;
        info!(
            "{} opened invite {} for {}",
            host.id, invite.invite_id, time_control
        );
        Ok(invite)
    }

    /// Accepts an invite on behalf of `joiner`. Colors are assigned at
    /// random. A host joining their own invite cancels it.
    pub async fn join_invite(
        &self,
        invite_id: &str,
        joiner: &User,
    ) -> Result<MatchAssignment, InviteServiceError> {
        if invite_id.is_empty() || joiner.id.is_empty() {
            return Err(InviteServiceError::ValidationError(
                "invite id and user id are required".to_string(),
            ));
        }

        let invite = self.invites.get_invite(invite_id).await?;
        let pairing = self.invites.take_pairing_sender(invite_id).await?;

        if invite.host.id == joiner.id {
            info!("{} cancelled their own invite {}", joiner.id, invite_id);
            let _ = pairing.send(InvitePairing::Cancelled);
            return Err(InviteServiceError::SelfJoin);
        }

        let joiner_color = if rand::random::<bool>() {
            Color::White
        } else {
            Color::Black
        };
        let record = match joiner_color {
            Color::White => MatchRecord::new(joiner.clone(), invite.host.clone(), invite.time_control),
            Color::Black => MatchRecord::new(invite.host.clone(), joiner.clone(), invite.time_control),
        };
        self.matches.create_match(&record).await?;

        if pairing.send(InvitePairing::Matched(record.clone())).is_err() {
            warn!("Host of invite {} stopped waiting", invite_id);
            let _ = self.matches.remove_match(&record.match_id).await;
            return Err(InviteServiceError::NotFound);
        }

        info!(
            "{} joined invite {} as match {}",
            joiner.id, invite_id, record.match_id
        );
        Ok(record.assignment_for(joiner_color))
    }

    pub async fn get_invite(&self, invite_id: &str) -> Result<Invite, InviteServiceError> {
        Ok(self.invites.get_invite(invite_id).await?)
    }

    /// Holds the host's connection until someone joins, the invite is
    /// cancelled, the wait expires or the host hangs up. The outcome is
    /// written to the connection, which is then closed, and the invite is
    /// removed in every case.
    pub async fn wait_for_opponent(&self, invite_id: &str, connection: Connection) -> InviteOutcome {
        let Connection {
            mut sink,
            mut stream,
        } = connection;

        let outcome = tokio::select! {
            outcome = self.await_pairing(invite_id) => Some(outcome),
            _ = closed(&mut stream) => None,
        };
        let _ = self.invites.remove_invite(invite_id).await;

        let Some(outcome) = outcome else {
            info!("Host of invite {} hung up", invite_id);
            return InviteOutcome::Expired;
        };

        let payload = match &outcome {
            InviteOutcome::Matched(assignment) => {
                serde_json::to_string(&MatchResponse::from(assignment.clone()))
                    .unwrap_or_else(|_| EXPIRED_PAYLOAD.to_string())
            }
            InviteOutcome::Expired => EXPIRED_PAYLOAD.to_string(),
        };
        if let Err(e) = sink.send_text(payload).await {
            debug!("Could not deliver invite {} outcome: {}", invite_id, e);
        }
        sink.close(CloseReason::Normal).await;
        outcome
    }

    async fn await_pairing(&self, invite_id: &str) -> InviteOutcome {
        let invite = match self.invites.get_invite(invite_id).await {
            Ok(invite) => invite,
            Err(e) => {
                debug!("Cannot wait on invite {}: {}", invite_id, e);
                return InviteOutcome::Expired;
            }
        };
        let pairing = match self.invites.take_pairing_receiver(invite_id).await {
            Ok(pairing) => pairing,
            Err(e) => {
                debug!("Cannot wait on invite {}: {}", invite_id, e);
                return InviteOutcome::Expired;
            }
        };

        match tokio::time::timeout(self.wait, pairing).await {
            Ok(Ok(InvitePairing::Matched(record))) => match record.color_of(&invite.host.id) {
                Some(color) => InviteOutcome::Matched(record.assignment_for(color)),
                None => InviteOutcome::Expired,
            },
            Ok(Ok(InvitePairing::Cancelled)) => InviteOutcome::Expired,
            Ok(Err(_)) | Err(_) => {
                debug!("Invite {} expired", invite_id);
                InviteOutcome::Expired
            }
        }
    }

    pub async fn open_invites(&self) -> usize {
        self.invites.open_invites().await
    }
}

/// Completes once the peer closes or the connection fails. Frames sent by
/// a waiting host are ignored.
async fn closed(stream: &mut Box<dyn MessageStream>) {
    while let Some(Ok(_)) = stream.next_text().await {}
}

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::models::matchmaking::{Invite, MatchRecord};
use crate::repositories::errors::invite_repository_errors::InviteRepositoryError;

/// Value delivered to a waiting host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvitePairing {
    Matched(MatchRecord),
    Cancelled,
}

struct InviteEntry {
    invite: Invite,
    sender: Option<oneshot::Sender<InvitePairing>>,
    receiver: Option<oneshot::Receiver<InvitePairing>>,
}

/// Open invitations, each carrying a single-use pairing channel. The
/// sending half goes to whoever joins, the receiving half to the host.
#[async_trait]
pub trait InviteRepository: Send + Sync {
    async fn create_invite(&self, invite: &Invite) -> Result<(), InviteRepositoryError>;

    async fn get_invite(&self, invite_id: &str) -> Result<Invite, InviteRepositoryError>;

    async fn take_pairing_sender(
        &self,
        invite_id: &str,
    ) -> Result<oneshot::Sender<InvitePairing>, InviteRepositoryError>;

    async fn take_pairing_receiver(
        &self,
        invite_id: &str,
    ) -> Result<oneshot::Receiver<InvitePairing>, InviteRepositoryError>;

    async fn remove_invite(&self, invite_id: &str) -> Result<Invite, InviteRepositoryError>;

    async fn open_invites(&self) -> usize;
}

#[derive(Default)]
pub struct InMemoryInviteRepository {
    invites: Mutex<HashMap<String, InviteEntry>>,
}

impl InMemoryInviteRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, InviteEntry>> {
        self.invites
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl InviteRepository for InMemoryInviteRepository {
    async fn create_invite(&self, invite: &Invite) -> Result<(), InviteRepositoryError> {
        let mut invites = self.lock();
        if invites.contains_key(&invite.invite_id) {
            return Err(InviteRepositoryError::AlreadyExists);
        }
        let (sender, receiver) = oneshot::channel();
        invites.insert(
            invite.invite_id.clone(),
            InviteEntry {
                invite: invite.clone(),
                sender: Some(sender),
                receiver: Some(receiver),
            },
        );
        Ok(())
    }

    async fn get_invite(&self, invite_id: &str) -> Result<Invite, InviteRepositoryError> {
        self.lock()
            .get(invite_id)
            .map(|entry| entry.invite.clone())
            .ok_or(InviteRepositoryError::NotFound)
    }

    async fn take_pairing_sender(
        &self,
        invite_id: &str,
    ) -> Result<oneshot::Sender<InvitePairing>, InviteRepositoryError> {
        self.lock()
            .get_mut(invite_id)
            .ok_or(InviteRepositoryError::NotFound)?
            .sender
            .take()
            .ok_or(InviteRepositoryError::AlreadyConsumed)
    }

    async fn take_pairing_receiver(
        &self,
        invite_id: &str,
    ) -> Result<oneshot::Receiver<InvitePairing>, InviteRepositoryError> {
        self.lock()
            .get_mut(invite_id)
            .ok_or(InviteRepositoryError::NotFound)?
            .receiver
            .take()
            .ok_or(InviteRepositoryError::AlreadyConsumed)
    }

    async fn remove_invite(&self, invite_id: &str) -> Result<Invite, InviteRepositoryError> {
        self.lock()
            .remove(invite_id)
            .map(|entry| entry.invite)
            .ok_or(InviteRepositoryError::NotFound)
    }

    async fn open_invites(&self) -> usize {
        self.lock().len()
    }
}

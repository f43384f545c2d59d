use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

use crate::models::{
    color::Color,
    matchmaking::{MatchRecord, QuickMatchOutcome},
    time_control::TimeControl,
    user::User,
};
use crate::repositories::match_repository::MatchRepository;
use crate::services::errors::matchmaking_service_errors::MatchmakingServiceError;

/// A repeat request from the waiting user cancels their earlier one and
/// goes round again; this bounds how often that can happen per call.
const MAX_PAIRING_ATTEMPTS: usize = 3;

#[derive(Debug)]
enum Pairing {
    Matched(MatchRecord),
    Cancelled,
}

struct Seeker {
    user: User,
    ticket: u64,
    pairing: oneshot::Sender<Pairing>,
}

enum Step {
    Paired(MatchRecord),
    Wait(u64, oneshot::Receiver<Pairing>),
    Retry,
}

/// Quick-match waiting list: at most one seeker waits per time control and
/// the next caller for that time control is paired with them.
#[derive(Clone)]
pub struct MatchmakingService {
    slots: Arc<HashMap<TimeControl, Mutex<Option<Seeker>>>>,
    repository: Arc<dyn MatchRepository + Send + Sync>,
    tickets: Arc<AtomicU64>,
    wait: Duration,
}

impl MatchmakingService {
    pub fn new(repository: Arc<dyn MatchRepository + Send + Sync>, wait: Duration) -> Self {
        let slots = TimeControl::ALL
            .iter()
            .map(|&time_control| (time_control, Mutex::new(None)))
            .collect();
        MatchmakingService {
            slots: Arc::new(slots),
            repository,
            tickets: Arc::new(AtomicU64::new(0)),
            wait,
        }
    }

    /// Pairs `user` with whoever is waiting, or waits for the next seeker.
    /// The earlier arrival plays white.
    pub async fn request_match(
        &self,
        user: &User,
        time_control: TimeControl,
    ) -> Result<QuickMatchOutcome, MatchmakingServiceError> {
        if user.id.is_empty() {
            return Err(MatchmakingServiceError::ValidationError(
                "user id is required".to_string(),
            ));
        }
        let slot = self
            .slots
            .get(&time_control)
            .ok_or(MatchmakingServiceError::UnsupportedTimeControl(
                time_control.minutes(),
            ))?;

        for _ in 0..MAX_PAIRING_ATTEMPTS {
            match self.try_pair(slot, user, time_control).await? {
                Step::Paired(record) => {
                    info!(
                        "Paired {} with {} for {} as match {}",
                        record.white.username, record.black.username, time_control, record.match_id
                    );
                    return Ok(QuickMatchOutcome::Matched(
                        record.assignment_for(Color::Black),
                    ));
                }
                Step::Wait(ticket, pairing) => {
                    return Ok(self.wait_for_pairing(slot, ticket, pairing).await);
                }
                Step::Retry => continue,
            }
        }

        warn!("Giving up pairing {} after repeated retries", user.id);
        Ok(QuickMatchOutcome::NoMatch)
    }

    async fn try_pair(
        &self,
        slot: &Mutex<Option<Seeker>>,
        user: &User,
        time_control: TimeControl,
    ) -> Result<Step, MatchmakingServiceError> {
        let mut waiting = slot.lock().await;

        let Some(seeker) = waiting.take() else {
            let ticket = self.tickets.fetch_add(1, Ordering::Relaxed);
            let (pairing_tx, pairing_rx) = oneshot::channel();
            *waiting = Some(Seeker {
                user: user.clone(),
                ticket,
                pairing: pairing_tx,
            });
            debug!("{} is waiting for a {} opponent", user.id, time_control);
            return Ok(Step::Wait(ticket, pairing_rx));
        };

        if seeker.user.id == user.id {
            debug!("{} asked again, cancelling the earlier request", user.id);
            let _ = seeker.pairing.send(Pairing::Cancelled);
            return Ok(Step::Retry);
        }

        let record = MatchRecord::new(seeker.user, user.clone(), time_control);
        self.repository.create_match(&record).await?;

        match seeker.pairing.send(Pairing::Matched(record.clone())) {
            Ok(()) => Ok(Step::Paired(record)),
            Err(_) => {
                // The waiting caller went away without clearing its slot.
                debug!("Discarding stale seeker for match {}", record.match_id);
                let _ = self.repository.remove_match(&record.match_id).await;
                Ok(Step::Retry)
            }
        }
    }

    async fn wait_for_pairing(
        &self,
        slot: &Mutex<Option<Seeker>>,
        ticket: u64,
        mut pairing: oneshot::Receiver<Pairing>,
    ) -> QuickMatchOutcome {
        let received = match tokio::time::timeout(self.wait, &mut pairing).await {
            Ok(received) => received.ok(),
            Err(_) => {
                let mut waiting = slot.lock().await;
                if waiting.as_ref().map(|seeker| seeker.ticket) == Some(ticket) {
                    *waiting = None;
                    debug!("Quick match wait expired");
                    return QuickMatchOutcome::NoMatch;
                }
                // Someone claimed the slot before the lock was taken, so the
                // pairing has already been sent.
                drop(waiting);
                pairing.try_recv().ok()
            }
        };

        match received {
            Some(Pairing::Matched(record)) => {
                QuickMatchOutcome::Matched(record.assignment_for(Color::White))
            }
            Some(Pairing::Cancelled) | None => QuickMatchOutcome::NoMatch,
        }
    }

    pub async fn waiting_count(&self) -> usize {
        let mut count = 0;
        for slot in self.slots.values() {
            if slot.lock().await.is_some() {
                count += 1;
            }
        }
        count
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{color::Color, time_control::TimeControl, user::User};

/// What a paired participant needs to open its game connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchAssignment {
    pub match_id: String,
    pub color: Color,
    pub opponent: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuickMatchOutcome {
    Matched(MatchAssignment),
    NoMatch,
}

/// Result delivered to an invite host over its waiting connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InviteOutcome {
    Matched(MatchAssignment),
    Expired,
}

/// Wire shape of a pairing result: `{color, roomId, opp}`.
/// Empty strings mean no pairing was made.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResponse {
    pub color: String,
    #[serde(rename = "roomId")]
    pub room_id: String,
    pub opp: String,
}

impl From<MatchAssignment> for MatchResponse {
    fn from(assignment: MatchAssignment) -> Self {
        MatchResponse {
            color: assignment.color.as_str().to_string(),
            room_id: assignment.match_id,
            opp: assignment.opponent,
        }
    }
}

impl From<QuickMatchOutcome> for MatchResponse {
    fn from(outcome: QuickMatchOutcome) -> Self {
        match outcome {
            QuickMatchOutcome::Matched(assignment) => assignment.into(),
            QuickMatchOutcome::NoMatch => MatchResponse::default(),
        }
    }
}

/// A pairing both sides may attach to, keyed by match id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRecord {
    pub match_id: String,
    pub white: User,
    pub black: User,
    pub time_control: TimeControl,
    pub created_at: DateTime<Utc>,
}

impl MatchRecord {
    pub fn new(white: User, black: User, time_control: TimeControl) -> Self {
        MatchRecord {
            match_id: new_match_id(),
            white,
            black,
            time_control,
            created_at: Utc::now(),
        }
    }

    pub fn color_of(&self, user_id: &str) -> Option<Color> {
        if self.white.id == user_id {
            Some(Color::White)
        } else if self.black.id == user_id {
            Some(Color::Black)
        } else {
            None
        }
    }

    pub fn user(&self, color: Color) -> &User {
        match color {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }

    pub fn assignment_for(&self, color: Color) -> MatchAssignment {
        MatchAssignment {
            match_id: self.match_id.clone(),
            color,
            opponent: self.user(color.opposite()).username.clone(),
        }
    }

    pub fn swap_colors(&mut self) {
        std::mem::swap(&mut self.white, &mut self.black);
    }
}

/// A host's open invitation, waiting for exactly one opponent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invite {
    pub invite_id: String,
    pub host: User,
    pub time_control: TimeControl,
    pub created_at: DateTime<Utc>,
}

impl Invite {
    pub fn new(host: User, time_control: TimeControl) -> Self {
        Invite {
            invite_id: Uuid::new_v4().simple().to_string(),
            host,
            time_control,
            created_at: Utc::now(),
        }
    }
}

pub fn new_match_id() -> String {
    Uuid::new_v4().to_string()
}

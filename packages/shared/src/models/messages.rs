//! Wire shapes exchanged with a game connection.
//!
//! Inbound frames are JSON objects whose populated field decides the event.
//! Outbound frames are small JSON objects; a move is forwarded as the
//! sender's object unchanged plus clock fields.

use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::fmt;

use crate::models::color::Color;

#[derive(Debug)]
pub struct DecodeError(pub String);

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Decode error: {}", self.0)
    }
}

impl std::error::Error for DecodeError {}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawClientMessage {
    #[serde(rename = "move")]
    mv: Option<RawMove>,
    chat: Option<String>,
    #[serde(default)]
    resign: bool,
    #[serde(default)]
    draw_offer: bool,
    #[serde(default)]
    accept_draw: bool,
    #[serde(default)]
    game_over: bool,
    #[serde(default)]
    rematch_offer: bool,
    #[serde(default)]
    accept_rematch: bool,
    #[serde(default)]
    finish_room: bool,
}

#[derive(Debug, Default, Deserialize)]
struct RawMove {
    #[serde(default)]
    color: String,
    #[serde(default)]
    pgn: String,
}

/// A move as sent by a client. `raw` is the untouched frame, forwarded to
/// the opponent after clock decoration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovePayload {
    pub color: Color,
    pub pgn: String,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Move(MovePayload),
    Chat(String),
    Resign,
    DrawOffer,
    AcceptDraw,
    GameOver,
    RematchOffer,
    AcceptRematch,
    FinishRoom,
    Unknown,
}

impl ClientMessage {
    /// Decodes one inbound frame. Frames that are valid JSON but match no
    /// known shape decode to `Unknown`; anything else is an error.
    pub fn decode(text: &str) -> Result<ClientMessage, DecodeError> {
        let raw: RawClientMessage =
            serde_json::from_str(text).map_err(|e| DecodeError(e.to_string()))?;

        if let Some(mv) = raw.mv.filter(|mv| !mv.color.is_empty()) {
            return Ok(match Color::from_move_tag(&mv.color) {
                Some(color) => ClientMessage::Move(MovePayload {
                    color,
                    pgn: mv.pgn,
                    raw: text.to_string(),
                }),
                None => ClientMessage::Unknown,
            });
        }

        let message = match raw.chat {
            Some(chat) if !chat.is_empty() => ClientMessage::Chat(chat),
            _ if raw.resign => ClientMessage::Resign,
            _ if raw.draw_offer => ClientMessage::DrawOffer,
            _ if raw.accept_draw => ClientMessage::AcceptDraw,
            _ if raw.game_over => ClientMessage::GameOver,
            _ if raw.rematch_offer => ClientMessage::RematchOffer,
            _ if raw.accept_rematch => ClientMessage::AcceptRematch,
            _ if raw.finish_room => ClientMessage::FinishRoom,
            _ => ClientMessage::Unknown,
        };
        Ok(message)
    }
}

/// Collapses newlines to spaces and trims the result.
pub fn sanitize_chat(text: &str) -> String {
    text.replace('\n', " ").trim().to_string()
}

/// A chat line after the room stamped it with its sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    pub text: String,
    pub from: String,
    pub sender_id: String,
}

impl ChatLine {
    /// Renders the line for one recipient. A sender still using the default
    /// display name sees their own lines attributed to "you".
    pub fn render_for(&self, recipient_id: &str, default_username: &str) -> String {
        let from = if self.sender_id == recipient_id && self.from == default_username {
            "you"
        } else {
            self.from.as_str()
        };
        json!({ "chat": self.text, "from": from }).to_string()
    }
}

/// Room-to-participant notifications that carry no payload of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    OwnClockExpired,
    OpponentRanOut,
    DrawOffered,
    OpponentAcceptedDraw,
    OpponentResigned,
    RematchOffered,
    OpponentAcceptedRematch,
    OpponentReady,
    OpponentDisconnected,
    OpponentReconnected,
    OpponentGone,
}

impl Signal {
    pub fn payload(self) -> String {
        let (key, value) = match self {
            Signal::OwnClockExpired => ("OOT", "MY_CLOCK"),
            Signal::OpponentRanOut => ("OOT", "OPP_CLOCK"),
            Signal::DrawOffered => ("drawOffer", "true"),
            Signal::OpponentAcceptedDraw => ("oppAcceptedDraw", "true"),
            Signal::OpponentResigned => ("oppResigned", "true"),
            Signal::RematchOffered => ("rematchOffer", "true"),
            Signal::OpponentAcceptedRematch => ("oppAcceptedRematch", "true"),
            Signal::OpponentReady | Signal::OpponentReconnected => ("oppReady", "true"),
            Signal::OpponentDisconnected => ("waitingOpp", "true"),
            Signal::OpponentGone => ("oppGone", "true"),
        };
        let mut data = Map::new();
        data.insert(key.to_string(), Value::String(value.to_string()));
        Value::Object(data).to_string()
    }
}

/// Adds `clock` (recipient's remaining ms) and `oppClock` (mover's remaining
/// ms) to the mover's frame.
pub fn decorate_move(raw: &str, clock_ms: u128, opp_clock_ms: u128) -> Result<String, DecodeError> {
    let mut data: Map<String, Value> =
        serde_json::from_str(raw).map_err(|e| DecodeError(e.to_string()))?;
    data.insert("clock".to_string(), json!(clock_ms as u64));
    data.insert("oppClock".to_string(), json!(opp_clock_ms as u64));
    Ok(Value::Object(data).to_string())
}

pub fn clock_update(clock_ms: u128, opp_clock_ms: u128) -> String {
    json!({ "clock": clock_ms as u64, "oppClock": opp_clock_ms as u64 }).to_string()
}

/// Sent to a rejoining participant so its client can rebuild the board.
pub fn resync_payload(pgn: &str) -> String {
    json!({ "pgn": pgn }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_decode_move() {
        let text = r#"{"move":{"color":"w","pgn":"1. e4"}}"#;

        match ClientMessage::decode(text).unwrap() {
            ClientMessage::Move(mv) => {
                assert_eq!(mv.color, Color::White);
                assert_eq!(mv.pgn, "1. e4");
                assert_eq!(mv.raw, text);
            }
            other => panic!("Expected move, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_move_with_unknown_color_is_ignored() {
        let text = r#"{"move":{"color":"x","pgn":"1. e4"}}"#;
        assert_eq!(ClientMessage::decode(text).unwrap(), ClientMessage::Unknown);
    }

    #[test]
    fn test_decode_move_without_color_falls_through() {
        let text = r#"{"move":{"pgn":"1. e4"},"resign":true}"#;
        assert_eq!(ClientMessage::decode(text).unwrap(), ClientMessage::Resign);
    }

    #[rstest]
    #[case(r#"{"chat":"hello"}"#, ClientMessage::Chat("hello".to_string()))]
    #[case(r#"{"resign":true}"#, ClientMessage::Resign)]
    #[case(r#"{"drawOffer":true}"#, ClientMessage::DrawOffer)]
    #[case(r#"{"acceptDraw":true}"#, ClientMessage::AcceptDraw)]
    #[case(r#"{"gameOver":true}"#, ClientMessage::GameOver)]
    #[case(r#"{"rematchOffer":true}"#, ClientMessage::RematchOffer)]
    #[case(r#"{"acceptRematch":true}"#, ClientMessage::AcceptRematch)]
    #[case(r#"{"finishRoom":true}"#, ClientMessage::FinishRoom)]
    #[case(r#"{"somethingElse":1}"#, ClientMessage::Unknown)]
    #[case(r#"{"chat":""}"#, ClientMessage::Unknown)]
    fn test_decode_variants(#[case] text: &str, #[case] expected: ClientMessage) {
        assert_eq!(ClientMessage::decode(text).unwrap(), expected);
    }

    #[rstest]
    #[case("not json")]
    #[case("[1, 2]")]
    #[case(r#"{"resign":"yes"}"#)]
    fn test_decode_rejects_malformed(#[case] text: &str) {
        assert!(ClientMessage::decode(text).is_err());
    }

    #[test]
    fn test_sanitize_chat() {
        assert_eq!(sanitize_chat("  hi\nthere\n "), "hi there");
    }

    #[test]
    fn test_chat_line_renders_you_for_anonymous_sender() {
        let line = ChatLine {
            text: "gg".to_string(),
            from: "anonymous".to_string(),
            sender_id: "u1".to_string(),
        };

        let own: Value = serde_json::from_str(&line.render_for("u1", "anonymous")).unwrap();
        let peer: Value = serde_json::from_str(&line.render_for("u2", "anonymous")).unwrap();

        assert_eq!(own["from"], "you");
        assert_eq!(peer["from"], "anonymous");
        assert_eq!(own["chat"], "gg");
    }

    #[test]
    fn test_chat_line_keeps_chosen_name() {
        let line = ChatLine {
            text: "gg".to_string(),
            from: "magnus".to_string(),
            sender_id: "u1".to_string(),
        };
        let own: Value = serde_json::from_str(&line.render_for("u1", "anonymous")).unwrap();
        assert_eq!(own["from"], "magnus");
    }

    #[test]
    fn test_signal_payloads() {
        assert_eq!(Signal::OwnClockExpired.payload(), r#"{"OOT":"MY_CLOCK"}"#);
        assert_eq!(Signal::OpponentRanOut.payload(), r#"{"OOT":"OPP_CLOCK"}"#);
        assert_eq!(Signal::OpponentDisconnected.payload(), r#"{"waitingOpp":"true"}"#);
        assert_eq!(
            Signal::OpponentReconnected.payload(),
            Signal::OpponentReady.payload()
        );
    }

    #[test]
    fn test_decorate_move_adds_clocks() {
        let decorated = decorate_move(r#"{"move":{"color":"b","pgn":"1. e4 e5"}}"#, 1000, 2000).unwrap();
        let value: Value = serde_json::from_str(&decorated).unwrap();

        assert_eq!(value["clock"], 1000);
        assert_eq!(value["oppClock"], 2000);
        assert_eq!(value["move"]["pgn"], "1. e4 e5");
    }

    #[test]
    fn test_resync_payload() {
        assert_eq!(resync_payload("1. d4"), r#"{"pgn":"1. d4"}"#);
    }
}

//! Wire protocol for the realtime socket.
//!
//! Every frame is one JSON object of the form `{"event": <name>, "data":
//! <payload>}`; commands without a payload omit `data`. Each direction is a
//! closed enum, so consumers match exhaustively instead of dispatching on
//! event-name strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    ContactDecision, Gender, Location, MatchedUser, MessageData, SearchStats, SearchStatus,
};

/// Search criteria in the wire format the matching server expects.
///
/// Produced from [`crate::models::SearchParams`] by the client's
/// normalization step; the field names and the array-encoded desired gender
/// follow the server contract, not the form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchCriteria {
    /// Own gender; the server accepts only `male` or `female` here.
    pub gender: Gender,
    pub age: u8,
    /// Desired partner genders; `["any"]` means no preference.
    pub desired_gender: Vec<Gender>,
    pub desired_age_min: u8,
    pub desired_age_max: u8,
    pub use_geolocation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_distance: Option<u32>,
}

/// Commands the client emits to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientCommand {
    #[serde(rename = "search:start")]
    SearchStart { criteria: SearchCriteria },
    #[serde(rename = "search:cancel")]
    SearchCancel,
    #[serde(rename = "search:subscribe_stats")]
    SubscribeStats,
    #[serde(rename = "search:unsubscribe_stats")]
    UnsubscribeStats,
    /// Payload is the bare chat id.
    #[serde(rename = "chat:join")]
    ChatJoin(String),
    #[serde(rename = "chat:leave")]
    ChatLeave(String),
    #[serde(rename = "chat:message", rename_all = "camelCase")]
    ChatMessage {
        chat_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reply_to: Option<String>,
    },
    #[serde(rename = "chat:start_typing", rename_all = "camelCase")]
    ChatStartTyping { chat_id: String },
    #[serde(rename = "chat:stop_typing", rename_all = "camelCase")]
    ChatStopTyping { chat_id: String },
    #[serde(rename = "chat:read", rename_all = "camelCase")]
    ChatRead {
        chat_id: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "chat:end", rename_all = "camelCase")]
    ChatEnd {
        chat_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    #[serde(rename = "chat:rate", rename_all = "camelCase")]
    ChatRate {
        chat_id: String,
        score: u8,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
    },
    #[serde(rename = "contact:request", rename_all = "camelCase")]
    ContactRequest { to: String, chat_id: String },
    #[serde(rename = "contact:respond", rename_all = "camelCase")]
    ContactRespond {
        user_id: String,
        status: ContactDecision,
    },
}

/// Events the server pushes to the client.
///
/// Connect/disconnect are transport lifecycle notifications, not wire
/// frames; the socket layer synthesizes those separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "search:matched", rename_all = "camelCase")]
    SearchMatched { matched_user: MatchedUser },
    #[serde(rename = "search:status")]
    SearchStatus { status: SearchStatus },
    #[serde(rename = "search:expired")]
    SearchExpired,
    #[serde(rename = "search:stats")]
    SearchStats(SearchStats),
    #[serde(rename = "chat:message", rename_all = "camelCase")]
    ChatMessage {
        chat_id: String,
        message: MessageData,
    },
    #[serde(rename = "chat:start_typing", rename_all = "camelCase")]
    ChatStartTyping { chat_id: String, user_id: String },
    #[serde(rename = "chat:stop_typing", rename_all = "camelCase")]
    ChatStopTyping { chat_id: String, user_id: String },
    #[serde(rename = "chat:read", rename_all = "camelCase")]
    ChatRead {
        chat_id: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "chat:ended", rename_all = "camelCase")]
    ChatEnded {
        chat_id: String,
        ended_by: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    #[serde(rename = "chat:rated", rename_all = "camelCase")]
    ChatRated {
        chat_id: String,
        rated_by: String,
        score: u8,
    },
    #[serde(rename = "contact:request", rename_all = "camelCase")]
    ContactRequest { from: String, chat_id: String },
    #[serde(rename = "contact:status", rename_all = "camelCase")]
    ContactStatus {
        user_id: String,
        status: ContactDecision,
    },
    #[serde(rename = "connection:recovered")]
    ConnectionRecovered,
    #[serde(rename = "error")]
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn search_start_wire_shape() {
        let command = ClientCommand::SearchStart {
            criteria: SearchCriteria {
                gender: Gender::Male,
                age: 25,
                desired_gender: vec![Gender::Female],
                desired_age_min: 20,
                desired_age_max: 30,
                use_geolocation: false,
                location: None,
                max_distance: None,
            },
        };
        let value = serde_json::to_value(&command).expect("serialize");
        assert_eq!(
            value,
            json!({
                "event": "search:start",
                "data": {
                    "criteria": {
                        "gender": "male",
                        "age": 25,
                        "desiredGender": ["female"],
                        "desiredAgeMin": 20,
                        "desiredAgeMax": 30,
                        "useGeolocation": false
                    }
                }
            })
        );
    }

    #[test]
    fn desired_any_encodes_as_array_marker() {
        let criteria = SearchCriteria {
            gender: Gender::Female,
            age: 30,
            desired_gender: vec![Gender::Any],
            desired_age_min: 18,
            desired_age_max: 99,
            use_geolocation: false,
            location: None,
            max_distance: None,
        };
        let value = serde_json::to_value(&criteria).expect("serialize");
        assert_eq!(value["desiredGender"], json!(["any"]));
    }

    #[test]
    fn payloadless_commands_omit_data() {
        let value = serde_json::to_value(ClientCommand::SearchCancel).expect("serialize");
        assert_eq!(value, json!({"event": "search:cancel"}));
    }

    #[test]
    fn chat_join_carries_bare_chat_id() {
        let value = serde_json::to_value(ClientCommand::ChatJoin("c42".into())).expect("serialize");
        assert_eq!(value, json!({"event": "chat:join", "data": "c42"}));
    }

    #[test]
    fn chat_message_skips_absent_reply() {
        let value = serde_json::to_value(ClientCommand::ChatMessage {
            chat_id: "c1".into(),
            content: "hello".into(),
            reply_to: None,
        })
        .expect("serialize");
        assert_eq!(
            value,
            json!({"event": "chat:message", "data": {"chatId": "c1", "content": "hello"}})
        );
    }

    #[test]
    fn server_chat_message_parses() {
        let json = r#"{
            "event": "chat:message",
            "data": {
                "chatId": "c1",
                "message": {
                    "_id": "m1",
                    "chatId": "c1",
                    "content": "hi there",
                    "timestamp": "2024-05-01T10:00:00Z",
                    "isRead": false,
                    "readBy": [],
                    "sender": {"_id": "u1", "telegramId": 777}
                }
            }
        }"#;
        let event: ServerEvent = serde_json::from_str(json).expect("event should parse");
        match event {
            ServerEvent::ChatMessage { chat_id, message } => {
                assert_eq!(chat_id, "c1");
                assert_eq!(message.id, "m1");
                assert_eq!(message.sender.telegram_id, 777);
                assert_eq!(message.reply_to, None);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn matched_event_parses() {
        let json = r#"{
            "event": "search:matched",
            "data": {"matchedUser": {"telegramId": "555", "gender": "female", "age": 23, "chatId": "c9"}}
        }"#;
        let event: ServerEvent = serde_json::from_str(json).expect("event should parse");
        match event {
            ServerEvent::SearchMatched { matched_user } => {
                assert_eq!(matched_user.chat_id, "c9");
                assert_eq!(matched_user.gender, Gender::Female);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_name_fails_to_parse() {
        let result = serde_json::from_str::<ServerEvent>(r#"{"event": "search:promoted"}"#);
        assert!(result.is_err());
    }
}

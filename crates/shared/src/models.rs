//! Shared data models for the anochat matching service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CriteriaError;

/// Minimum age accepted anywhere in search criteria.
pub const MIN_AGE: u8 = 18;

// --- Identity ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Any,
}

/// A user as delivered inside chat message payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatUser {
    #[serde(rename = "_id")]
    pub id: String,
    pub telegram_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub photos: Vec<String>,
}

// --- Search ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// Search parameters as collected from the form, already parsed to native
/// types. Validated before normalization to the wire criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub my_gender: Gender,
    pub my_age: u8,
    pub target_gender: Gender,
    pub target_age_min: u8,
    pub target_age_max: u8,
    pub use_location: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl SearchParams {
    /// Reject criteria the matching server would refuse, before any command
    /// reaches the wire.
    pub fn validate(&self) -> Result<(), CriteriaError> {
        if self.my_gender == Gender::Any {
            return Err(CriteriaError::OwnGenderAny);
        }
        if self.my_age < MIN_AGE {
            return Err(CriteriaError::Underage { age: self.my_age });
        }
        if self.target_age_min < MIN_AGE {
            return Err(CriteriaError::Underage {
                age: self.target_age_min,
            });
        }
        if self.target_age_min > self.target_age_max {
            return Err(CriteriaError::InvertedAgeRange {
                min: self.target_age_min,
                max: self.target_age_max,
            });
        }
        Ok(())
    }
}

/// Partner handed over by a `search:matched` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedUser {
    pub telegram_id: String,
    pub gender: Gender,
    pub age: u8,
    pub chat_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStatus {
    Searching,
    Cancelled,
    Expired,
    Matched,
}

/// Live matchmaking statistics. The broadcast payload uses terse keys to
/// stay small; the field names spell them out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchStats {
    #[serde(rename = "t")]
    pub searching_total: u32,
    #[serde(rename = "m")]
    pub searching_men: u32,
    #[serde(rename = "f")]
    pub searching_women: u32,
    #[serde(default, rename = "inChat", skip_serializing_if = "Option::is_none")]
    pub in_chat: Option<u32>,
    pub online: OnlineStats,
    #[serde(rename = "avgSearchTime")]
    pub avg_search_time: SearchTimeStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OnlineStats {
    #[serde(rename = "t")]
    pub total: u32,
    #[serde(rename = "m")]
    pub men: u32,
    #[serde(rename = "f")]
    pub women: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchTimeStats {
    #[serde(rename = "t")]
    pub total_secs: u32,
    #[serde(rename = "m")]
    pub men_secs: u32,
    #[serde(rename = "f")]
    pub women_secs: u32,
    #[serde(rename = "matches24h")]
    pub matches_24h: u32,
}

// --- Messaging ---

/// A chat message as the relay delivers it. The `_id` is the canonical,
/// server-assigned identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageData {
    #[serde(rename = "_id")]
    pub id: String,
    pub chat_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub read_by: Vec<String>,
    pub sender: ChatUser,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

// --- Contacts ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactDecision {
    Accepted,
    Declined,
    Blocked,
}

// --- REST API ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub telegram_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub telegram_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub telegram_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub rating: f32,
}

/// `POST /auth/login` and `POST /auth/register` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: AuthUser,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub telegram_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u8>,
    pub rating: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub photos: Vec<String>,
}

/// One page of chat history from `GET /chats/{id}/messages`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagesPage {
    pub messages: Vec<MessageData>,
    pub total: u32,
    pub page: u32,
    pub limit: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SearchParams {
        SearchParams {
            my_gender: Gender::Male,
            my_age: 25,
            target_gender: Gender::Female,
            target_age_min: 20,
            target_age_max: 30,
            use_location: false,
            location: None,
        }
    }

    #[test]
    fn valid_params_pass() {
        assert!(params().validate().is_ok());
    }

    #[test]
    fn own_gender_any_is_rejected() {
        let mut p = params();
        p.my_gender = Gender::Any;
        assert_eq!(p.validate(), Err(CriteriaError::OwnGenderAny));
    }

    #[test]
    fn underage_is_rejected() {
        let mut p = params();
        p.my_age = 17;
        assert_eq!(p.validate(), Err(CriteriaError::Underage { age: 17 }));

        let mut p = params();
        p.target_age_min = 16;
        assert_eq!(p.validate(), Err(CriteriaError::Underage { age: 16 }));
    }

    #[test]
    fn inverted_age_range_is_rejected() {
        let mut p = params();
        p.target_age_min = 40;
        p.target_age_max = 30;
        assert_eq!(
            p.validate(),
            Err(CriteriaError::InvertedAgeRange { min: 40, max: 30 })
        );
    }

    #[test]
    fn stats_parse_terse_wire_keys() {
        let json = r#"{
            "t": 12, "m": 7, "f": 5, "inChat": 40,
            "online": {"t": 100, "m": 60, "f": 40},
            "avgSearchTime": {"t": 30, "m": 45, "f": 15, "matches24h": 200}
        }"#;
        let stats: SearchStats = serde_json::from_str(json).expect("stats should parse");
        assert_eq!(stats.searching_total, 12);
        assert_eq!(stats.in_chat, Some(40));
        assert_eq!(stats.online.women, 40);
        assert_eq!(stats.avg_search_time.matches_24h, 200);
    }
}

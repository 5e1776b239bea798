//! Active chat session state.

use chrono::{DateTime, TimeDelta, Utc};

use anochat_shared::{ChatUser, MatchedUser, MessageData};

/// Window within which consecutive messages from one sender render as one
/// block.
pub const GROUPING_WINDOW_SECS: i64 = 60;

/// One entry in the session message log.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    /// Canonical, server-assigned id.
    pub id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub from_me: bool,
    pub sender: ChatUser,
    pub reply_to: Option<String>,
    /// Snapshot of the replied-to content at ingestion time, for rendering.
    pub reply_preview: Option<String>,
}

/// The active conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSession {
    pub chat_id: String,
    pub partner: MatchedUser,
    pub messages: Vec<ChatMessage>,
    pub partner_typing: bool,
    /// Message id the next outgoing send replies to. One-shot.
    pub replying_to: Option<String>,
    /// Score the partner gave us, if a `chat:rated` event arrived.
    pub partner_rating: Option<u8>,
    /// Partner id of an incoming contact request awaiting a response.
    pub contact_request_from: Option<String>,
}

impl ChatSession {
    /// Read-side grouping projection: consecutive messages from the same
    /// sender within [`GROUPING_WINDOW_SECS`] belong to one block. Never
    /// mutates the stored log.
    pub fn grouped(&self) -> Vec<Vec<&ChatMessage>> {
        let mut groups: Vec<Vec<&ChatMessage>> = Vec::new();
        for message in &self.messages {
            if let Some(group) = groups.last_mut() {
                if let Some(last) = group.last() {
                    let same_sender = last.sender.id == message.sender.id;
                    let within_window = message.timestamp - last.timestamp
                        <= TimeDelta::seconds(GROUPING_WINDOW_SECS);
                    if same_sender && within_window {
                        group.push(message);
                        continue;
                    }
                }
            }
            groups.push(vec![message]);
        }
        groups
    }
}

/// Owner of the (at most one) active [`ChatSession`].
///
/// Pure state: command emission and timers live in the session controller.
#[derive(Debug, Default)]
pub struct ChatState {
    session: Option<ChatSession>,
}

impl ChatState {
    pub fn session(&self) -> Option<&ChatSession> {
        self.session.as_ref()
    }

    pub fn chat_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.chat_id.as_str())
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Open a fresh session for a freshly matched chat. Replaces whatever
    /// session existed before.
    pub fn begin(&mut self, partner: MatchedUser) {
        self.session = Some(ChatSession {
            chat_id: partner.chat_id.clone(),
            partner,
            messages: Vec::new(),
            partner_typing: false,
            replying_to: None,
            partner_rating: None,
            contact_request_from: None,
        });
    }

    /// Ingest a server-delivered message.
    ///
    /// Returns `false` when the message belongs to another chat or its id is
    /// already in the log; reconnects replay recent events and the bus does
    /// not deduplicate, so this is where duplicates die.
    pub fn add_incoming(&mut self, message: MessageData, my_telegram_id: i64) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if message.chat_id != session.chat_id {
            return false;
        }
        if session.messages.iter().any(|m| m.id == message.id) {
            return false;
        }

        let reply_preview = message.reply_to.as_deref().and_then(|id| {
            session
                .messages
                .iter()
                .find(|m| m.id == id)
                .map(|m| m.content.clone())
        });
        session.messages.push(ChatMessage {
            id: message.id,
            content: message.content,
            timestamp: message.timestamp,
            from_me: message.sender.telegram_id == my_telegram_id,
            sender: message.sender,
            reply_to: message.reply_to,
            reply_preview,
        });
        true
    }

    /// Mark a logged message as the reply target for the next send, or
    /// clear the target with `None`. Returns `false` for an unknown id.
    pub fn set_replying_to(&mut self, message_id: Option<String>) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        match message_id {
            None => {
                session.replying_to = None;
                true
            }
            Some(id) => {
                if !session.messages.iter().any(|m| m.id == id) {
                    return false;
                }
                session.replying_to = Some(id);
                true
            }
        }
    }

    /// Take the one-shot reply reference; subsequent sends carry none.
    pub fn take_reply(&mut self) -> Option<String> {
        self.session.as_mut().and_then(|s| s.replying_to.take())
    }

    pub fn set_partner_typing(&mut self, typing: bool) {
        if let Some(session) = self.session.as_mut() {
            session.partner_typing = typing;
        }
    }

    pub fn set_partner_rating(&mut self, score: u8) {
        if let Some(session) = self.session.as_mut() {
            session.partner_rating = Some(score);
        }
    }

    pub fn set_contact_request(&mut self, from: String) {
        if let Some(session) = self.session.as_mut() {
            session.contact_request_from = Some(from);
        }
    }

    /// Tear down the session. Returns the chat id it owned, if any.
    pub fn end(&mut self) -> Option<String> {
        self.session.take().map(|s| s.chat_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anochat_shared::Gender;
    use chrono::Duration;

    const MY_ID: i64 = 100;
    const PARTNER_ID: i64 = 200;

    fn partner() -> MatchedUser {
        MatchedUser {
            telegram_id: PARTNER_ID.to_string(),
            gender: Gender::Female,
            age: 23,
            chat_id: "c1".to_string(),
        }
    }

    fn user(telegram_id: i64) -> ChatUser {
        ChatUser {
            id: format!("u{telegram_id}"),
            telegram_id,
            username: None,
            first_name: None,
            last_name: None,
            photos: Vec::new(),
        }
    }

    fn message(id: &str, from: i64, content: &str) -> MessageData {
        MessageData {
            id: id.to_string(),
            chat_id: "c1".to_string(),
            content: content.to_string(),
            timestamp: Utc::now(),
            is_read: false,
            read_by: Vec::new(),
            sender: user(from),
            reply_to: None,
        }
    }

    fn active_state() -> ChatState {
        let mut state = ChatState::default();
        state.begin(partner());
        state
    }

    #[test]
    fn duplicate_ids_are_dropped() {
        let mut state = active_state();
        assert!(state.add_incoming(message("m1", PARTNER_ID, "hi"), MY_ID));
        assert!(!state.add_incoming(message("m1", PARTNER_ID, "hi"), MY_ID));
        assert_eq!(state.session().expect("active").messages.len(), 1);
    }

    #[test]
    fn repeated_ingestion_is_idempotent_regardless_of_order() {
        let mut state = active_state();
        for id in ["m1", "m2", "m1", "m3", "m2", "m1"] {
            state.add_incoming(message(id, PARTNER_ID, id), MY_ID);
        }
        let ids: Vec<_> = state
            .session()
            .expect("active")
            .messages
            .iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn distinct_ids_always_append() {
        let mut state = active_state();
        for n in 0..20 {
            let id = uuid::Uuid::new_v4().to_string();
            assert!(
                state.add_incoming(message(&id, PARTNER_ID, &format!("msg {n}")), MY_ID),
                "fresh id must be accepted"
            );
        }
        assert_eq!(state.session().expect("active").messages.len(), 20);
    }

    #[test]
    fn from_me_follows_sender_identity() {
        let mut state = active_state();
        state.add_incoming(message("m1", MY_ID, "mine"), MY_ID);
        state.add_incoming(message("m2", PARTNER_ID, "theirs"), MY_ID);
        let messages = &state.session().expect("active").messages;
        assert!(messages[0].from_me);
        assert!(!messages[1].from_me);
    }

    #[test]
    fn foreign_chat_messages_are_rejected() {
        let mut state = active_state();
        let mut foreign = message("m1", PARTNER_ID, "hi");
        foreign.chat_id = "other".to_string();
        assert!(!state.add_incoming(foreign, MY_ID));
        assert!(state.session().expect("active").messages.is_empty());
    }

    #[test]
    fn no_session_no_ingestion() {
        let mut state = ChatState::default();
        assert!(!state.add_incoming(message("m1", PARTNER_ID, "hi"), MY_ID));
    }

    #[test]
    fn reply_target_is_one_shot() {
        let mut state = active_state();
        state.add_incoming(message("m1", PARTNER_ID, "original"), MY_ID);
        assert!(state.set_replying_to(Some("m1".to_string())));
        assert_eq!(state.take_reply(), Some("m1".to_string()));
        assert_eq!(state.take_reply(), None);
    }

    #[test]
    fn reply_target_must_exist_in_the_log() {
        let mut state = active_state();
        assert!(!state.set_replying_to(Some("ghost".to_string())));
        assert_eq!(state.take_reply(), None);
    }

    #[test]
    fn reply_preview_is_cached_from_the_log() {
        let mut state = active_state();
        state.add_incoming(message("m1", PARTNER_ID, "original"), MY_ID);
        let mut reply = message("m2", MY_ID, "answer");
        reply.reply_to = Some("m1".to_string());
        state.add_incoming(reply, MY_ID);

        let messages = &state.session().expect("active").messages;
        assert_eq!(messages[1].reply_to.as_deref(), Some("m1"));
        assert_eq!(messages[1].reply_preview.as_deref(), Some("original"));
    }

    #[test]
    fn end_clears_everything() {
        let mut state = active_state();
        state.add_incoming(message("m1", PARTNER_ID, "hi"), MY_ID);
        assert_eq!(state.end(), Some("c1".to_string()));
        assert!(!state.is_active());
        assert_eq!(state.end(), None);
    }

    #[test]
    fn grouping_splits_on_sender_and_window() {
        let mut state = active_state();
        let base = Utc::now();

        let mut m1 = message("m1", PARTNER_ID, "a");
        m1.timestamp = base;
        let mut m2 = message("m2", PARTNER_ID, "b");
        m2.timestamp = base + Duration::seconds(30);
        let mut m3 = message("m3", PARTNER_ID, "c");
        m3.timestamp = base + Duration::seconds(150);
        let mut m4 = message("m4", MY_ID, "d");
        m4.timestamp = base + Duration::seconds(160);

        for m in [m1, m2, m3, m4] {
            state.add_incoming(m, MY_ID);
        }

        let session = state.session().expect("active");
        let groups = session.grouped();
        let shape: Vec<Vec<&str>> = groups
            .iter()
            .map(|g| g.iter().map(|m| m.id.as_str()).collect())
            .collect();
        // m3 is the same sender but past the window; m4 is another sender.
        assert_eq!(shape, vec![vec!["m1", "m2"], vec!["m3"], vec!["m4"]]);
        // The projection leaves the log untouched.
        assert_eq!(session.messages.len(), 4);
    }
}

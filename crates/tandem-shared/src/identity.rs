//! Conversation identity: turning raw keys and deep-link routes into a
//! canonical [`ConversationKey`] with its kind.
//!
//! Grammar:
//!
//! ```text
//! route    := [ "/" ] [ "chat/" ] body
//! body     := club | login
//! club     := "club_" club-id [ ( ":" | "/" ) event-id ]
//! login    := 1*( any char except whitespace, "/", ":" )
//! club-id  := 1*( ALPHA / DIGIT / "-" / "_" )
//! event-id := 1*( ALPHA / DIGIT / "-" / "_" )
//! ```
//!
//! The canonical form of a club key is `club_<clubId>` or
//! `club_<clubId>:<eventId>`, so classifying a canonical key returns it
//! unchanged.

use serde::{Deserialize, Serialize};

use crate::constants::{
    CHAT_ROUTE_PREFIX, CLUB_EVENT_SEPARATOR, CLUB_KEY_PREFIX, CLUB_ROOM_PREFIX, USER_ROOM_PREFIX,
};
use crate::error::IdentityError;
use crate::types::{ConversationKey, ConversationKind, RoomKey, UserId};

/// Result of classifying a key or route.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationRoute {
    pub key: ConversationKey,
    pub kind: ConversationKind,
    pub club_id: Option<String>,
    pub event_id: Option<String>,
}

impl ConversationRoute {
    /// Room key used on the push channel for this conversation.
    ///
    /// Peer rooms are symmetric: both participants derive the same key.
    pub fn room_key(&self, me: &UserId) -> RoomKey {
        match (&self.club_id, &self.event_id) {
            (Some(club), Some(event)) => RoomKey(format!("{CLUB_ROOM_PREFIX}:{club}:{event}")),
            (Some(club), None) => RoomKey(format!("{CLUB_ROOM_PREFIX}:{club}")),
            _ => {
                let peer = self.key.as_str();
                let (a, b) = if me.as_str() <= peer {
                    (me.as_str(), peer)
                } else {
                    (peer, me.as_str())
                };
                RoomKey(format!("{USER_ROOM_PREFIX}:{a}:{b}"))
            }
        }
    }
}

/// Classify a raw conversation key or deep-link route.
pub fn classify(raw: &str) -> Result<ConversationRoute, IdentityError> {
    let trimmed = raw.trim();
    let body = trimmed.strip_prefix('/').unwrap_or(trimmed);
    let body = body.strip_prefix(CHAT_ROUTE_PREFIX).unwrap_or(body);

    if body.is_empty() {
        return Err(IdentityError::Empty);
    }

    match body.strip_prefix(CLUB_KEY_PREFIX) {
        Some(rest) => classify_club(rest),
        None => classify_login(body),
    }
}

fn classify_club(rest: &str) -> Result<ConversationRoute, IdentityError> {
    let (club_id, event_id) = match rest.split_once([CLUB_EVENT_SEPARATOR, '/']) {
        Some((club, event)) => (club, Some(event)),
        None => (rest, None),
    };

    if !is_valid_segment(club_id) {
        return Err(IdentityError::InvalidClubId(club_id.to_string()));
    }
    if let Some(event) = event_id {
        if !is_valid_segment(event) {
            return Err(IdentityError::InvalidEventId(event.to_string()));
        }
    }

    let canonical = match event_id {
        Some(event) => format!("{CLUB_KEY_PREFIX}{club_id}{CLUB_EVENT_SEPARATOR}{event}"),
        None => format!("{CLUB_KEY_PREFIX}{club_id}"),
    };

    Ok(ConversationRoute {
        key: ConversationKey::from_canonical(canonical),
        kind: ConversationKind::ClubEvent,
        club_id: Some(club_id.to_string()),
        event_id: event_id.map(str::to_string),
    })
}

fn classify_login(login: &str) -> Result<ConversationRoute, IdentityError> {
    let bad = login
        .chars()
        .any(|c| c.is_whitespace() || c == '/' || c == CLUB_EVENT_SEPARATOR);
    if bad {
        return Err(IdentityError::InvalidLogin(login.to_string()));
    }

    Ok(ConversationRoute {
        key: ConversationKey::from_canonical(login.to_string()),
        kind: ConversationKind::User,
        club_id: None,
        event_id: None,
    })
}

fn is_valid_segment(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

//! Match gating: may the current user send into a conversation?
//!
//! [`evaluate`] is pure. Facts come from the match and event-participation
//! services and may be stale or not loaded yet ([`MatchFacts::Unknown`]).

use serde::{Deserialize, Serialize};

use crate::protocol::{MatchStatusRecord, ParticipationRecord};
use crate::types::{ConversationKey, ConversationKind};

const REASON_NO_MATCH: &str = "You can message each other once you both like each other.";
const REASON_PENDING_LIKE: &str = "You liked them. Chat opens once they like you back.";
const REASON_LIKED_BY_PEER: &str = "They liked you. Like them back to start chatting.";
const REASON_EVENT_DECLINED: &str = "You declined this event, so its chat is closed to you.";
const REASON_UNKNOWN: &str = "Checking whether you can message here...";

/// Latest facts known for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchFacts {
    /// Not loaded yet, or the service could not tell.
    Unknown,
    /// Like facts for a peer conversation.
    Likes { i_liked: bool, liked_me: bool },
    /// The caller's participation record for a club event.
    Participation(Participation),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Participation {
    Participant,
    Declined,
    Undetermined,
}

impl From<MatchStatusRecord> for MatchFacts {
    fn from(record: MatchStatusRecord) -> Self {
        match (record.i_liked, record.liked_me) {
            (Some(i_liked), Some(liked_me)) => MatchFacts::Likes { i_liked, liked_me },
            _ if record.is_match == Some(true) => MatchFacts::Likes {
                i_liked: true,
                liked_me: true,
            },
            _ => MatchFacts::Unknown,
        }
    }
}

impl From<ParticipationRecord> for MatchFacts {
    fn from(record: ParticipationRecord) -> Self {
        let participation = match record.status.as_deref() {
            Some("participant") | Some("accepted") | Some("going") => Participation::Participant,
            Some("declined") | Some("rejected") | Some("not_going") => Participation::Declined,
            _ => Participation::Undetermined,
        };
        MatchFacts::Participation(participation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    NoMatch,
    PendingLike,
    LikedByPeer,
    MutualMatch,
    EventParticipant,
    EventDeclined,
    Unknown,
}

impl MatchStatus {
    fn allows_send(self) -> bool {
        matches!(self, MatchStatus::MutualMatch | MatchStatus::EventParticipant)
    }

    fn reason(self) -> &'static str {
        match self {
            MatchStatus::NoMatch => REASON_NO_MATCH,
            MatchStatus::PendingLike => REASON_PENDING_LIKE,
            MatchStatus::LikedByPeer => REASON_LIKED_BY_PEER,
            MatchStatus::EventDeclined => REASON_EVENT_DECLINED,
            MatchStatus::Unknown => REASON_UNKNOWN,
            MatchStatus::MutualMatch | MatchStatus::EventParticipant => "",
        }
    }
}

/// Computed gating verdict for one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchState {
    pub key: ConversationKey,
    pub status: MatchStatus,
    pub can_send: bool,
    /// Shown to the user verbatim when sending is denied.
    pub reason_message: Option<String>,
}

impl MatchState {
    /// Initial state before any facts have been fetched.
    pub fn unknown(key: ConversationKey) -> Self {
        evaluate(key.clone(), key.kind(), &MatchFacts::Unknown, false)
    }

    /// True when the denial only reflects facts that have not loaded yet.
    ///
    /// Such a denial is advisory: an explicit send goes to the server, which
    /// has the final word.
    pub fn is_provisional_denial(&self) -> bool {
        !self.can_send && self.status == MatchStatus::Unknown
    }
}

/// Evaluate whether messages may be sent for `key`.
///
/// Any conversation that already has a persisted message stays sendable
/// whatever the facts say now. That rule is applied last and only ever
/// grants permission.
pub fn evaluate(
    key: ConversationKey,
    kind: ConversationKind,
    facts: &MatchFacts,
    has_existing_messages: bool,
) -> MatchState {
    let status = match (kind, facts) {
        (ConversationKind::User, MatchFacts::Likes { i_liked, liked_me }) => {
            match (*i_liked, *liked_me) {
                (true, true) => MatchStatus::MutualMatch,
                (true, false) => MatchStatus::PendingLike,
                (false, true) => MatchStatus::LikedByPeer,
                (false, false) => MatchStatus::NoMatch,
            }
        }
        (ConversationKind::ClubEvent, MatchFacts::Participation(p)) => match p {
            Participation::Participant => MatchStatus::EventParticipant,
            Participation::Declined => MatchStatus::EventDeclined,
            Participation::Undetermined => MatchStatus::Unknown,
        },
        _ => MatchStatus::Unknown,
    };

    let can_send = status.allows_send() || has_existing_messages;
    let reason_message = (!can_send).then(|| status.reason().to_string());

    MatchState {
        key,
        status,
        can_send,
        reason_message,
    }
}

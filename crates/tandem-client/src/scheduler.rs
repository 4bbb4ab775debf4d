//! Bookkeeping for the poll and push producers.
//!
//! The scheduler holds no I/O. The engine loop asks it what to do next
//! (whether a poll may start, which room to subscribe or drop, how long to
//! wait before reconnecting) and reports back what happened.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use tandem_shared::{ConversationKey, ErrorKind, RoomKey};

use crate::events::{PollFailure, PushHealth, SyncStatus};

/// Largest exponent applied to the reconnect base delay.
const MAX_BACKOFF_SHIFT: u32 = 16;

/// Per-room push subscription lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Idle,
    Subscribing,
    Active,
    Unsubscribing,
}

/// A poll the scheduler tracks to avoid overlapping requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PollTarget {
    Conversations,
    Messages(ConversationKey),
    OlderMessages(ConversationKey),
    MatchFacts(ConversationKey),
}

impl PollTarget {
    fn conversation(&self) -> Option<&ConversationKey> {
        match self {
            PollTarget::Conversations => None,
            PollTarget::Messages(key)
            | PollTarget::OlderMessages(key)
            | PollTarget::MatchFacts(key) => Some(key),
        }
    }
}

#[derive(Debug, Clone)]
struct Subscription {
    key: ConversationKey,
    state: SubscriptionState,
}

#[derive(Debug)]
pub struct SyncScheduler {
    active: Option<(ConversationKey, RoomKey)>,
    rooms: HashMap<RoomKey, Subscription>,
    in_flight: HashSet<PollTarget>,
    health: PushHealth,
    reconnect_attempt: u32,
    max_reconnect_attempts: u32,
    base_delay: Duration,
    /// Failures still current, one per target.
    poll_errors: HashMap<PollTarget, PollFailure>,
}

impl SyncScheduler {
    pub fn new(max_reconnect_attempts: u32, base_delay: Duration) -> Self {
        Self {
            active: None,
            rooms: HashMap::new(),
            in_flight: HashSet::new(),
            health: PushHealth::Connecting,
            reconnect_attempt: 0,
            max_reconnect_attempts,
            base_delay,
            poll_errors: HashMap::new(),
        }
    }

    // -- Active conversation --------------------------------------------------

    pub fn active_key(&self) -> Option<&ConversationKey> {
        self.active.as_ref().map(|(k, _)| k)
    }

    pub fn active_room(&self) -> Option<&RoomKey> {
        self.active.as_ref().map(|(_, r)| r)
    }

    /// Make `key` the open conversation, returning the previous one.
    ///
    /// Poll failures of the conversation left behind are forgotten.
    pub fn set_active(
        &mut self,
        key: ConversationKey,
        room: RoomKey,
    ) -> Option<(ConversationKey, RoomKey)> {
        self.poll_errors
            .retain(|target, _| target.conversation().map_or(true, |k| *k == key));
        self.active.replace((key, room))
    }

    fn is_relevant(&self, target: &PollTarget) -> bool {
        match target.conversation() {
            None => true,
            Some(key) => self.active_key() == Some(key),
        }
    }

    // -- Polls ----------------------------------------------------------------

    /// Claim `target` for a new poll. Returns `false` while one is in flight.
    pub fn begin_poll(&mut self, target: PollTarget) -> bool {
        let started = self.in_flight.insert(target.clone());
        if !started {
            debug!(target = ?target, "Poll still in flight, skipping tick");
        }
        started
    }

    pub fn finish_poll(&mut self, target: &PollTarget) {
        self.in_flight.remove(target);
    }

    pub fn is_polling(&self, target: &PollTarget) -> bool {
        self.in_flight.contains(target)
    }

    /// Clears the failure of `target` only.
    pub fn record_poll_success(&mut self, target: &PollTarget) {
        self.poll_errors.remove(target);
    }

    /// Results for a conversation that is no longer open do not reach the
    /// status.
    pub fn record_poll_failure(&mut self, target: &PollTarget, kind: ErrorKind, message: String) {
        if !self.is_relevant(target) {
            debug!(target = ?target, error = %message, "Late poll failure for an inactive conversation");
            return;
        }
        warn!(target = ?target, kind = ?kind, error = %message, "Poll failed, retrying on next tick");
        self.poll_errors.insert(
            target.clone(),
            PollFailure {
                kind,
                message,
                at: Utc::now(),
            },
        );
    }

    /// Returns `true` when there was an error to dismiss.
    pub fn dismiss_poll_error(&mut self) -> bool {
        let had_errors = !self.poll_errors.is_empty();
        self.poll_errors.clear();
        had_errors
    }

    // -- Push subscriptions ---------------------------------------------------

    pub fn subscription_state(&self, room: &RoomKey) -> SubscriptionState {
        self.rooms
            .get(room)
            .map_or(SubscriptionState::Idle, |s| s.state)
    }

    /// Conversation a subscribed (or subscribing) room belongs to.
    pub fn key_for_room(&self, room: &RoomKey) -> Option<&ConversationKey> {
        self.rooms.get(room).map(|s| &s.key)
    }

    /// Start subscribing `room`. Returns `false` when the push channel is not
    /// up or the room is already subscribed or subscribing.
    pub fn begin_subscribe(&mut self, key: &ConversationKey, room: &RoomKey) -> bool {
        if self.health != PushHealth::Connected {
            return false;
        }
        match self.subscription_state(room) {
            SubscriptionState::Idle | SubscriptionState::Unsubscribing => {
                self.rooms.insert(
                    room.clone(),
                    Subscription {
                        key: key.clone(),
                        state: SubscriptionState::Subscribing,
                    },
                );
                true
            }
            SubscriptionState::Subscribing | SubscriptionState::Active => false,
        }
    }

    pub fn subscribe_finished(&mut self, room: &RoomKey, ok: bool) {
        let Some(sub) = self.rooms.get_mut(room) else {
            return;
        };
        if sub.state != SubscriptionState::Subscribing {
            return;
        }
        if ok {
            sub.state = SubscriptionState::Active;
        } else {
            self.rooms.remove(room);
        }
    }

    /// Start dropping `room`. Returns `false` when there is nothing to drop.
    pub fn begin_unsubscribe(&mut self, room: &RoomKey) -> bool {
        match self.rooms.get_mut(room) {
            Some(sub) if sub.state == SubscriptionState::Active => {
                sub.state = SubscriptionState::Unsubscribing;
                true
            }
            Some(sub) if sub.state == SubscriptionState::Subscribing => {
                self.rooms.remove(room);
                false
            }
            _ => false,
        }
    }

    pub fn unsubscribe_finished(&mut self, room: &RoomKey) {
        if self.subscription_state(room) == SubscriptionState::Unsubscribing {
            self.rooms.remove(room);
        }
    }

    // -- Push health ----------------------------------------------------------

    pub fn push_health(&self) -> PushHealth {
        self.health
    }

    /// The push channel is up. Subscriptions from an older connection are
    /// gone server-side, so the table starts empty.
    pub fn push_connected(&mut self) {
        if self.health.is_degraded() {
            info!("Push channel recovered, leaving poll-only mode");
        }
        self.health = PushHealth::Connected;
        self.reconnect_attempt = 0;
        self.rooms.clear();
    }

    /// The push channel dropped, or a reconnect attempt failed.
    ///
    /// Returns the delay before the next attempt, or `None` once attempts
    /// are exhausted and the scheduler is in poll-only mode.
    pub fn push_lost(&mut self) -> Option<Duration> {
        self.rooms.clear();
        if self.health.is_degraded() {
            return None;
        }
        self.reconnect_attempt += 1;
        if self.reconnect_attempt > self.max_reconnect_attempts {
            warn!(
                attempts = self.max_reconnect_attempts,
                "Push reconnect attempts exhausted, falling back to polling"
            );
            self.health = PushHealth::Degraded;
            return None;
        }
        self.health = PushHealth::Reconnecting {
            attempt: self.reconnect_attempt,
        };
        Some(backoff_delay(self.base_delay, self.reconnect_attempt))
    }

    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            push: self.health,
            poll_error: self.poll_errors.values().max_by_key(|f| f.at).cloned(),
        }
    }
}

/// `base * 2^(attempt - 1)`: 1 s, 2 s, 4 s, ... for a one second base.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
    base.saturating_mul(1u32 << shift)
}

//! Per-conversation message cache with idempotent merge.
//!
//! Each conversation keeps an id index plus an ordered index keyed by
//! `(created_at, id)`. The ordered index is a `BTreeMap`, so the visible
//! sequence is always sorted and repeated merges of the same snapshot never
//! reorder what is already displayed.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use tandem_shared::protocol::MessageRecord;
use tandem_shared::{ConversationKey, CorrelationToken, MessageId, SourceHint, UserId};

use crate::models::{AttachmentRef, Delivery, Message, StoredMessage};

type OrderKey = (DateTime<Utc>, MessageId);

/// Outcome of one merge batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeResult {
    /// New messages that became visible.
    pub inserted: usize,
    /// Optimistic entries replaced by their server echo.
    pub reconciled: usize,
    /// Records whose id was already cached.
    pub duplicates: usize,
    /// Records dropped by shape validation.
    pub rejected: usize,
}

impl MergeResult {
    pub fn changed(&self) -> bool {
        self.inserted > 0 || self.reconciled > 0
    }
}

#[derive(Debug, Default)]
struct ConversationLog {
    ordered: BTreeMap<OrderKey, StoredMessage>,
    by_id: HashMap<MessageId, DateTime<Utc>>,
    optimistic: HashMap<CorrelationToken, OrderKey>,
}

impl ConversationLog {
    fn insert(&mut self, stored: StoredMessage) {
        let key = stored.message.order_key();
        if let Some(token) = stored.token() {
            self.optimistic.insert(token, key.clone());
        }
        self.by_id.insert(key.1.clone(), key.0);
        self.ordered.insert(key, stored);
    }

    fn remove_optimistic(&mut self, token: &CorrelationToken) -> Option<StoredMessage> {
        let key = self.optimistic.remove(token)?;
        self.by_id.remove(&key.1);
        self.ordered.remove(&key)
    }

    fn persisted_count(&self) -> usize {
        self.ordered.values().filter(|m| m.is_persisted()).count()
    }
}

/// Client-side message cache for every conversation.
#[derive(Debug, Default)]
pub struct MessageStore {
    logs: HashMap<ConversationKey, ConversationLog>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a batch of wire records into `key`'s timeline.
    ///
    /// Malformed records are dropped and logged; the rest of the batch
    /// proceeds. A record whose client token matches an optimistic entry
    /// replaces that entry. A record whose id is already cached is a no-op.
    pub fn merge(
        &mut self,
        key: &ConversationKey,
        incoming: impl IntoIterator<Item = MessageRecord>,
        source: SourceHint,
    ) -> MergeResult {
        let log = self.logs.entry(key.clone()).or_default();
        let mut result = MergeResult::default();

        for record in incoming {
            let token = record
                .client_token
                .as_deref()
                .and_then(|t| Uuid::parse_str(t).ok())
                .map(CorrelationToken);

            let message = match Message::from_record(record, key, source) {
                Ok(m) => m,
                Err(e) => {
                    warn!(key = %key, source = ?source, error = %e, "Dropping malformed message record");
                    result.rejected += 1;
                    continue;
                }
            };

            if let Some(token) = token {
                if log.remove_optimistic(&token).is_some() {
                    debug!(key = %key, token = %token, id = %message.id, "Reconciled optimistic message");
                    result.reconciled += 1;
                }
            }

            if log.by_id.contains_key(&message.id) {
                result.duplicates += 1;
                continue;
            }

            log.insert(StoredMessage {
                message,
                delivery: Delivery::Persisted,
            });
            result.inserted += 1;
        }

        if result.changed() || result.rejected > 0 {
            debug!(
                key = %key,
                source = ?source,
                inserted = result.inserted,
                reconciled = result.reconciled,
                duplicates = result.duplicates,
                rejected = result.rejected,
                "Merged message batch"
            );
        }

        result
    }

    /// Insert a not-yet-acknowledged message at the tail of `key`'s timeline.
    pub fn insert_optimistic(
        &mut self,
        key: &ConversationKey,
        sender_id: UserId,
        body: String,
        attachments: Vec<AttachmentRef>,
        token: CorrelationToken,
    ) -> Message {
        let message = Message {
            id: MessageId::local(&token),
            conversation_key: key.clone(),
            sender_id,
            body,
            attachments,
            created_at: Utc::now(),
            source: SourceHint::Local,
        };

        self.logs.entry(key.clone()).or_default().insert(StoredMessage {
            message: message.clone(),
            delivery: Delivery::Pending { token },
        });

        message
    }

    /// Mark an optimistic entry as failed. Returns `false` when it was
    /// already reconciled or never existed.
    pub fn mark_failed(
        &mut self,
        key: &ConversationKey,
        token: &CorrelationToken,
        reason: impl Into<String>,
    ) -> bool {
        let Some(log) = self.logs.get_mut(key) else {
            return false;
        };
        let Some(order_key) = log.optimistic.get(token) else {
            return false;
        };
        match log.ordered.get_mut(order_key) {
            Some(stored) => {
                stored.delivery = Delivery::Failed {
                    token: *token,
                    reason: reason.into(),
                };
                true
            }
            None => false,
        }
    }

    /// Remove a failed optimistic entry the user chose to discard.
    pub fn discard_failed(&mut self, key: &ConversationKey, token: &CorrelationToken) -> bool {
        let Some(log) = self.logs.get_mut(key) else {
            return false;
        };
        let is_failed = log
            .optimistic
            .get(token)
            .and_then(|k| log.ordered.get(k))
            .is_some_and(|m| matches!(m.delivery, Delivery::Failed { .. }));
        is_failed && log.remove_optimistic(token).is_some()
    }

    /// Ordered snapshot of `key`'s timeline.
    pub fn messages(&self, key: &ConversationKey) -> Vec<StoredMessage> {
        self.logs
            .get(key)
            .map(|log| log.ordered.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of server-acknowledged messages cached for `key`.
    pub fn persisted_count(&self, key: &ConversationKey) -> usize {
        self.logs.get(key).map_or(0, ConversationLog::persisted_count)
    }

    pub fn has_persisted_messages(&self, key: &ConversationKey) -> bool {
        self.logs
            .get(key)
            .is_some_and(|log| log.ordered.values().any(StoredMessage::is_persisted))
    }

    /// Whether an optimistic entry for `token` is still waiting or failed.
    pub fn has_optimistic(&self, key: &ConversationKey, token: &CorrelationToken) -> bool {
        self.logs
            .get(key)
            .is_some_and(|log| log.optimistic.contains_key(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Delivery;

    fn key(raw: &str) -> ConversationKey {
        ConversationKey::parse(raw).unwrap()
    }

    fn record(id: &str, ts: &str) -> MessageRecord {
        MessageRecord {
            id: Some(MessageId::new(id)),
            sender_id: Some("bob".into()),
            body: Some(format!("message {id}")),
            created_at: Some(ts.into()),
            ..Default::default()
        }
    }

    fn ids(store: &MessageStore, k: &ConversationKey) -> Vec<String> {
        store
            .messages(k)
            .into_iter()
            .map(|m| m.message.id.to_string())
            .collect()
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut store = MessageStore::new();
        let k = key("bob");
        let first = store.merge(&k, vec![record("42", "2024-05-01T10:00:00Z")], SourceHint::Poll);
        assert_eq!(first.inserted, 1);
        let before = store.messages(&k);

        let second = store.merge(&k, vec![record("42", "2024-05-01T10:00:00Z")], SourceHint::Push);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.duplicates, 1);
        assert!(!second.changed());
        assert_eq!(store.messages(&k), before);
    }

    #[test]
    fn test_order_independent_of_arrival() {
        let batch = vec![
            record("3", "2024-05-01T10:00:02Z"),
            record("1", "2024-05-01T10:00:00Z"),
            record("10", "2024-05-01T10:00:01Z"),
            record("2", "2024-05-01T10:00:01Z"),
        ];
        let mut reversed = batch.clone();
        reversed.reverse();

        let k = key("bob");
        let mut a = MessageStore::new();
        a.merge(&k, batch, SourceHint::Poll);
        let mut b = MessageStore::new();
        for r in reversed {
            b.merge(&k, vec![r], SourceHint::Push);
        }

        assert_eq!(ids(&a, &k), vec!["1", "2", "10", "3"]);
        assert_eq!(ids(&a, &k), ids(&b, &k));
    }

    #[test]
    fn test_malformed_record_dropped_rest_proceeds() {
        let mut store = MessageStore::new();
        let k = key("bob");
        let mut bad = record("2", "2024-05-01T10:00:00Z");
        bad.created_at = Some("not a time".into());

        let result = store.merge(
            &k,
            vec![record("1", "2024-05-01T09:00:00Z"), bad, record("3", "2024-05-01T11:00:00Z")],
            SourceHint::Poll,
        );
        assert_eq!(result.inserted, 2);
        assert_eq!(result.rejected, 1);
        assert_eq!(ids(&store, &k), vec!["1", "3"]);
    }

    #[test]
    fn test_echo_replaces_optimistic_entry() {
        let mut store = MessageStore::new();
        let k = key("alice");
        let token = CorrelationToken::new();
        store.insert_optimistic(&k, UserId::new("me"), "hi".into(), vec![], token);
        assert_eq!(store.messages(&k).len(), 1);
        assert!(!store.has_persisted_messages(&k));

        let mut echo = record("99", "2024-05-01T10:00:00Z");
        echo.client_token = Some(token.0.to_string());
        let result = store.merge(&k, vec![echo], SourceHint::Poll);

        assert_eq!(result.reconciled, 1);
        let messages = store.messages(&k);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message.id, MessageId::new("99"));
        assert!(messages[0].is_persisted());
        assert!(!store.has_optimistic(&k, &token));
    }

    #[test]
    fn test_echo_after_push_copy_still_clears_optimistic() {
        let mut store = MessageStore::new();
        let k = key("alice");
        let token = CorrelationToken::new();
        store.insert_optimistic(&k, UserId::new("me"), "hi".into(), vec![], token);

        // Push delivers the message without the token first.
        store.merge(&k, vec![record("99", "2024-05-01T10:00:00Z")], SourceHint::Push);
        assert_eq!(store.messages(&k).len(), 2);

        let mut echo = record("99", "2024-05-01T10:00:00Z");
        echo.client_token = Some(token.0.to_string());
        let result = store.merge(&k, vec![echo], SourceHint::Poll);
        assert_eq!(result.reconciled, 1);
        assert_eq!(result.duplicates, 1);
        assert_eq!(ids(&store, &k), vec!["99"]);
    }

    #[test]
    fn test_mark_failed_then_discard() {
        let mut store = MessageStore::new();
        let k = key("alice");
        let token = CorrelationToken::new();
        store.insert_optimistic(&k, UserId::new("me"), "hi".into(), vec![], token);

        assert!(!store.discard_failed(&k, &token), "pending entries are not discardable");
        assert!(store.mark_failed(&k, &token, "timeout"));
        assert!(matches!(
            store.messages(&k)[0].delivery,
            Delivery::Failed { .. }
        ));
        assert!(store.discard_failed(&k, &token));
        assert!(store.messages(&k).is_empty());
    }

    #[test]
    fn test_persisted_count_ignores_optimistic() {
        let mut store = MessageStore::new();
        let k = key("club_1:2");
        store.merge(&k, vec![record("1", "2024-05-01T10:00:00Z")], SourceHint::Poll);
        store.insert_optimistic(&k, UserId::new("me"), "x".into(), vec![], CorrelationToken::new());
        assert_eq!(store.persisted_count(&k), 1);
        assert!(store.has_persisted_messages(&k));
        assert_eq!(store.persisted_count(&key("nobody")), 0);
    }
}

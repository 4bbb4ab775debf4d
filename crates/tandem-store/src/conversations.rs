//! Conversation list aggregation: persisted snapshot plus at most one
//! virtual conversation.

use std::collections::HashSet;

use tracing::{debug, warn};

use tandem_shared::protocol::ConversationRecord;
use tandem_shared::ConversationKey;

use crate::models::{Conversation, ConversationEntry, ConversationMeta, VirtualConversation};

/// Combine a persisted list with an optional virtual conversation.
///
/// The persisted list is authoritative and keeps the service's order. A
/// virtual entry whose key already appears there is dropped; otherwise it
/// goes first, since it is where the user is navigating to.
pub fn aggregate(
    persisted: &[Conversation],
    virtual_conversation: Option<&VirtualConversation>,
) -> Vec<ConversationEntry> {
    let mut out = Vec::with_capacity(persisted.len() + 1);

    if let Some(v) = virtual_conversation {
        if !persisted.iter().any(|c| c.key == v.key) {
            out.push(ConversationEntry::Virtual(v.clone()));
        }
    }

    out.extend(persisted.iter().cloned().map(ConversationEntry::Persisted));
    out
}

/// Holds the latest persisted snapshot and the current virtual conversation.
#[derive(Debug, Default)]
pub struct ConversationListAggregator {
    persisted: Vec<Conversation>,
    virtual_conversation: Option<VirtualConversation>,
}

/// Outcome of applying a persisted snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotResult {
    pub accepted: usize,
    pub rejected: usize,
    /// The virtual conversation was replaced by its persisted counterpart.
    pub superseded_virtual: bool,
}

impl ConversationListAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the persisted snapshot with freshly fetched records.
    ///
    /// Malformed records are dropped with a warning; a repeated key keeps
    /// its first occurrence.
    pub fn apply_snapshot(
        &mut self,
        records: impl IntoIterator<Item = ConversationRecord>,
    ) -> SnapshotResult {
        let mut result = SnapshotResult::default();
        let mut seen = HashSet::new();
        let mut persisted = Vec::new();

        for record in records {
            match Conversation::try_from(record) {
                Ok(conversation) => {
                    if seen.insert(conversation.key.clone()) {
                        persisted.push(conversation);
                        result.accepted += 1;
                    } else {
                        debug!(key = %conversation.key, "Skipping repeated conversation in snapshot");
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Dropping malformed conversation record");
                    result.rejected += 1;
                }
            }
        }

        self.persisted = persisted;

        if let Some(v) = &self.virtual_conversation {
            if seen.contains(&v.key) {
                debug!(key = %v.key, "Virtual conversation superseded by persisted record");
                self.virtual_conversation = None;
                result.superseded_virtual = true;
            }
        }

        result
    }

    /// Show a virtual conversation for `key`, discarding any previous one.
    ///
    /// Returns `false` (and keeps no virtual entry) when `key` is already
    /// persisted.
    pub fn set_virtual(&mut self, key: ConversationKey) -> bool {
        if self.contains_persisted(&key) {
            self.virtual_conversation = None;
            return false;
        }
        if self.virtual_key() != Some(&key) {
            self.virtual_conversation = Some(VirtualConversation::new(key));
        }
        true
    }

    /// Swap in resolved metadata for the current virtual conversation.
    pub fn resolve_virtual_meta(&mut self, key: &ConversationKey, meta: ConversationMeta) -> bool {
        match &self.virtual_conversation {
            Some(v) if &v.key == key => {
                self.virtual_conversation = Some(v.with_meta(meta));
                true
            }
            _ => false,
        }
    }

    pub fn clear_virtual(&mut self) {
        self.virtual_conversation = None;
    }

    pub fn virtual_key(&self) -> Option<&ConversationKey> {
        self.virtual_conversation.as_ref().map(|v| &v.key)
    }

    pub fn contains_persisted(&self, key: &ConversationKey) -> bool {
        self.persisted.iter().any(|c| &c.key == key)
    }

    pub fn persisted(&self) -> &[Conversation] {
        &self.persisted
    }

    /// Ordered list for display.
    pub fn entries(&self) -> Vec<ConversationEntry> {
        aggregate(&self.persisted, self.virtual_conversation.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &str, at: &str) -> ConversationRecord {
        ConversationRecord {
            key: Some(key.into()),
            last_message: Some(format!("last in {key}")),
            last_message_at: Some(at.into()),
            ..Default::default()
        }
    }

    fn key(raw: &str) -> ConversationKey {
        ConversationKey::parse(raw).unwrap()
    }

    fn keys(entries: &[ConversationEntry]) -> Vec<String> {
        entries.iter().map(|e| e.key().to_string()).collect()
    }

    #[test]
    fn test_virtual_goes_first() {
        let mut agg = ConversationListAggregator::new();
        agg.apply_snapshot(vec![
            record("bob", "2024-05-02T00:00:00Z"),
            record("carol", "2024-05-01T00:00:00Z"),
        ]);
        assert!(agg.set_virtual(key("alice")));

        let entries = agg.entries();
        assert_eq!(keys(&entries), vec!["alice", "bob", "carol"]);
        assert!(entries[0].is_virtual());
        assert_eq!(entries[0].unread_count(), 0);
    }

    #[test]
    fn test_supersession_keeps_persisted_entry() {
        let mut agg = ConversationListAggregator::new();
        agg.set_virtual(key("alice"));

        let result = agg.apply_snapshot(vec![
            record("bob", "2024-05-02T00:00:00Z"),
            record("alice", "2024-05-01T00:00:00Z"),
        ]);
        assert!(result.superseded_virtual);

        let entries = agg.entries();
        let alice: Vec<_> = entries.iter().filter(|e| e.key().as_str() == "alice").collect();
        assert_eq!(alice.len(), 1);
        assert!(!alice[0].is_virtual());
        assert_eq!(agg.virtual_key(), None);
    }

    #[test]
    fn test_aggregate_pure_drops_superseded_virtual() {
        let conv = Conversation::try_from(record("alice", "2024-05-01T00:00:00Z")).unwrap();
        let virt = VirtualConversation::new(key("alice"));
        let entries = aggregate(std::slice::from_ref(&conv), Some(&virt));
        assert_eq!(entries, vec![ConversationEntry::Persisted(conv)]);
    }

    #[test]
    fn test_only_latest_virtual_kept() {
        let mut agg = ConversationListAggregator::new();
        agg.set_virtual(key("alice"));
        agg.set_virtual(key("club_3:4"));
        let entries = agg.entries();
        assert_eq!(keys(&entries), vec!["club_3:4"]);
    }

    #[test]
    fn test_set_virtual_for_persisted_key_is_refused() {
        let mut agg = ConversationListAggregator::new();
        agg.apply_snapshot(vec![record("bob", "2024-05-02T00:00:00Z")]);
        assert!(!agg.set_virtual(key("bob")));
        assert_eq!(agg.entries().len(), 1);
    }

    #[test]
    fn test_persisted_order_is_trusted() {
        let mut agg = ConversationListAggregator::new();
        // Deliberately not sorted by timestamp.
        agg.apply_snapshot(vec![
            record("carol", "2024-05-01T00:00:00Z"),
            record("bob", "2024-05-03T00:00:00Z"),
        ]);
        assert_eq!(keys(&agg.entries()), vec!["carol", "bob"]);
    }

    #[test]
    fn test_snapshot_drops_malformed_and_repeats() {
        let mut agg = ConversationListAggregator::new();
        let result = agg.apply_snapshot(vec![
            record("bob", "2024-05-02T00:00:00Z"),
            ConversationRecord::default(),
            record("bob", "2024-05-01T00:00:00Z"),
        ]);
        assert_eq!(result.accepted, 1);
        assert_eq!(result.rejected, 1);
        assert_eq!(agg.persisted().len(), 1);
    }

    #[test]
    fn test_resolve_meta_only_for_current_virtual() {
        let mut agg = ConversationListAggregator::new();
        agg.set_virtual(key("alice"));
        let meta = ConversationMeta {
            display_name: Some("Alice".into()),
            avatar_url: None,
        };
        assert!(!agg.resolve_virtual_meta(&key("bob"), meta.clone()));
        assert!(agg.resolve_virtual_meta(&key("alice"), meta));
        match &agg.entries()[0] {
            ConversationEntry::Virtual(v) => assert_eq!(v.meta.display_name.as_deref(), Some("Alice")),
            other => panic!("expected virtual entry, got {other:?}"),
        }
    }
}

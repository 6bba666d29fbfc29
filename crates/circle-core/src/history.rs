//! De-duplicating message history.
//!
//! A chat view loads a page of history over REST while the socket may
//! already be delivering new messages. Either can arrive first, and the
//! same message can arrive through both. [`MessageLog`] merges the two
//! streams keyed by message id and keeps them in chronological order, so
//! arrival order never produces duplicates or out-of-order entries.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::model::{ChatMessage, DmMessage, MessageId};

/// A message that has a stable id and a creation time.
pub trait Timeline {
    fn id(&self) -> &MessageId;
    fn created_at(&self) -> DateTime<Utc>;
}

impl Timeline for ChatMessage {
    fn id(&self) -> &MessageId {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Timeline for DmMessage {
    fn id(&self) -> &MessageId {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

type OrderKey = (DateTime<Utc>, MessageId);

/// Chronologically ordered set of messages keyed by id.
#[derive(Clone, Debug)]
pub struct MessageLog<M> {
    ordered: BTreeMap<OrderKey, M>,
    index: HashMap<MessageId, DateTime<Utc>>,
}

impl<M> Default for MessageLog<M> {
    fn default() -> Self {
        Self {
            ordered: BTreeMap::new(),
            index: HashMap::new(),
        }
    }
}

impl<M: Timeline> MessageLog<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a single message.
    ///
    /// Returns `false` if a message with the same id is already present.
    pub fn append(&mut self, message: M) -> bool {
        if self.index.contains_key(message.id()) {
            return false;
        }
        let created_at = message.created_at();
        let id = message.id().clone();
        self.index.insert(id.clone(), created_at);
        self.ordered.insert((created_at, id), message);
        true
    }

    /// Merge a history snapshot, skipping messages already present.
    ///
    /// Returns the number of newly inserted messages.
    pub fn merge_snapshot(&mut self, snapshot: impl IntoIterator<Item = M>) -> usize {
        snapshot
            .into_iter()
            .map(|message| self.append(message))
            .filter(|inserted| *inserted)
            .count()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &MessageId) -> Option<&M> {
        let created_at = *self.index.get(id)?;
        self.ordered.get(&(created_at, id.clone()))
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Messages oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &M> {
        self.ordered.values()
    }

    pub fn latest(&self) -> Option<&M> {
        self.ordered.values().next_back()
    }

    pub fn clear(&mut self) {
        self.ordered.clear();
        self.index.clear();
    }
}

impl<M: Timeline + Clone> MessageLog<M> {
    pub fn to_vec(&self) -> Vec<M> {
        self.ordered.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::model::{CircleId, UserId};

    fn message(id: &str, offset_secs: i64) -> ChatMessage {
        ChatMessage {
            id: MessageId::new(id),
            circle_id: CircleId::new("c1"),
            user_id: UserId::new("u1"),
            content: format!("message {id}"),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                + Duration::seconds(offset_secs),
        }
    }

    fn ids(log: &MessageLog<ChatMessage>) -> Vec<&str> {
        log.iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn test_append_rejects_duplicates() {
        let mut log = MessageLog::new();
        assert!(log.append(message("m1", 0)));
        assert!(!log.append(message("m1", 0)));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_socket_before_snapshot() {
        let mut log = MessageLog::new();
        // Live message lands before the REST page that also contains it.
        log.append(message("m3", 30));

        let inserted = log.merge_snapshot(vec![message("m1", 10), message("m2", 20), message("m3", 30)]);

        assert_eq!(inserted, 2);
        assert_eq!(ids(&log), vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn test_snapshot_then_socket() {
        let mut log = MessageLog::new();
        log.merge_snapshot(vec![message("m1", 10), message("m2", 20)]);
        assert!(log.append(message("m3", 30)));
        assert!(!log.append(message("m2", 20)));

        assert_eq!(ids(&log), vec!["m1", "m2", "m3"]);
        assert_eq!(log.latest().map(|m| m.id.as_str()), Some("m3"));
    }

    #[test]
    fn test_out_of_order_arrival_is_sorted() {
        let mut log = MessageLog::new();
        log.append(message("m2", 20));
        log.append(message("m1", 10));

        assert_eq!(ids(&log), vec!["m1", "m2"]);
        assert!(log.get(&MessageId::new("m1")).is_some());
    }

    #[test]
    fn test_equal_timestamps_ordered_by_id() {
        let mut log = MessageLog::new();
        log.append(message("b", 5));
        log.append(message("a", 5));

        assert_eq!(ids(&log), vec!["a", "b"]);
    }

    #[test]
    fn test_clear() {
        let mut log = MessageLog::new();
        log.append(message("m1", 0));
        log.clear();
        assert!(log.is_empty());
        assert!(!log.contains(&MessageId::new("m1")));
    }
}

//! In-process [`Store`] backed by hash maps.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use circle_core::logging::targets;
use circle_core::{
    ChatMessage, Circle, CircleId, Conversation, ConversationId, DmMessage, MessageId, NewCircle,
    Notification, NotificationId, NotificationKind, UserId,
};
use parking_lot::RwLock;
use tracing::debug;

use super::{Store, StoreError, StoreResult, validate_circle_name, validate_content};

const TARGET: &str = targets::STORE;

#[derive(Default)]
struct Tables {
    circles: Vec<Circle>,
    members: HashMap<CircleId, HashSet<UserId>>,
    chat: HashMap<CircleId, Vec<ChatMessage>>,
    conversations: Vec<Conversation>,
    dms: HashMap<ConversationId, Vec<DmMessage>>,
    dm_index: HashMap<MessageId, (ConversationId, usize)>,
    notifications: HashMap<UserId, Vec<Notification>>,
    next_id: u64,
    last_timestamp: Option<DateTime<Utc>>,
}

impl Tables {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }

    /// Wall-clock time, nudged forward so stamps are strictly increasing.
    fn timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(stamp);
        stamp
    }

    fn circle(&self, id: &CircleId) -> StoreResult<&Circle> {
        self.circles
            .iter()
            .find(|c| &c.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("circle {id}")))
    }

    fn conversation(&self, id: &ConversationId) -> StoreResult<&Conversation> {
        self.conversations
            .iter()
            .find(|c| &c.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("conversation {id}")))
    }

    fn is_member(&self, circle: &CircleId, user: &UserId) -> bool {
        self.members
            .get(circle)
            .is_some_and(|members| members.contains(user))
    }
}

/// Thread-safe in-memory store. Ids are monotonic per store.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn create_circle(&self, owner: &UserId, circle: NewCircle) -> StoreResult<Circle> {
        let name = validate_circle_name(&circle.name)?.to_string();

        let mut tables = self.tables.write();
        let circle = Circle {
            id: CircleId::new(tables.next_id("c")),
            name,
            description: circle.description.trim().to_string(),
            is_private: circle.is_private,
            created_by: owner.clone(),
            created_at: tables.timestamp(),
        };

        tables
            .members
            .entry(circle.id.clone())
            .or_default()
            .insert(owner.clone());
        tables.circles.push(circle.clone());

        debug!(target: TARGET, circle = %circle.id, owner = %owner, "created circle");
        Ok(circle)
    }

    fn circle(&self, id: &CircleId) -> StoreResult<Circle> {
        self.tables.read().circle(id).cloned()
    }

    fn circles_for_user(&self, user: &UserId) -> Vec<Circle> {
        let tables = self.tables.read();
        tables
            .circles
            .iter()
            .filter(|c| tables.is_member(&c.id, user))
            .cloned()
            .collect()
    }

    fn circle_ids_for_user(&self, user: &UserId) -> HashSet<CircleId> {
        self.tables
            .read()
            .members
            .iter()
            .filter(|(_, members)| members.contains(user))
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn join_circle(&self, circle: &CircleId, user: &UserId) -> StoreResult<Circle> {
        let mut tables = self.tables.write();
        let found = tables.circle(circle)?.clone();

        if tables.is_member(circle, user) {
            return Ok(found);
        }
        if found.is_private {
            return Err(StoreError::Forbidden(format!("circle {circle} is private")));
        }

        tables
            .members
            .entry(circle.clone())
            .or_default()
            .insert(user.clone());
        debug!(target: TARGET, %circle, %user, "joined circle");
        Ok(found)
    }

    fn leave_circle(&self, circle: &CircleId, user: &UserId) -> StoreResult<()> {
        let mut tables = self.tables.write();
        tables.circle(circle)?;

        if let Some(members) = tables.members.get_mut(circle) {
            if members.remove(user) {
                debug!(target: TARGET, %circle, %user, "left circle");
            }
        }
        Ok(())
    }

    fn is_member(&self, circle: &CircleId, user: &UserId) -> bool {
        self.tables.read().is_member(circle, user)
    }

    fn insert_chat_message(
        &self,
        circle: &CircleId,
        author: &UserId,
        content: &str,
    ) -> StoreResult<ChatMessage> {
        let content = validate_content(content)?;

        let mut tables = self.tables.write();
        tables.circle(circle)?;
        if !tables.is_member(circle, author) {
            return Err(StoreError::Forbidden(format!(
                "{author} is not a member of circle {circle}"
            )));
        }

        let message = ChatMessage {
            id: MessageId::new(tables.next_id("m")),
            circle_id: circle.clone(),
            user_id: author.clone(),
            content: content.to_string(),
            created_at: tables.timestamp(),
        };
        tables
            .chat
            .entry(circle.clone())
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    fn circle_messages(&self, circle: &CircleId) -> StoreResult<Vec<ChatMessage>> {
        let tables = self.tables.read();
        tables.circle(circle)?;
        Ok(tables.chat.get(circle).cloned().unwrap_or_default())
    }

    fn open_conversation(&self, a: &UserId, b: &UserId) -> StoreResult<Conversation> {
        if a == b {
            return Err(StoreError::Invalid(
                "cannot open a conversation with yourself".into(),
            ));
        }

        let mut tables = self.tables.write();
        if let Some(existing) = tables
            .conversations
            .iter()
            .find(|c| c.includes(a) && c.includes(b))
        {
            return Ok(existing.clone());
        }

        let conversation = Conversation {
            id: ConversationId::new(tables.next_id("d")),
            participants: [a.clone(), b.clone()],
            created_at: tables.timestamp(),
        };
        tables.conversations.push(conversation.clone());
        debug!(target: TARGET, conversation = %conversation.id, "opened conversation");
        Ok(conversation)
    }

    fn conversation(&self, id: &ConversationId) -> StoreResult<Conversation> {
        self.tables.read().conversation(id).cloned()
    }

    fn conversations_for_user(&self, user: &UserId) -> Vec<Conversation> {
        self.tables
            .read()
            .conversations
            .iter()
            .filter(|c| c.includes(user))
            .cloned()
            .collect()
    }

    fn insert_dm(
        &self,
        conversation: &ConversationId,
        sender: &UserId,
        content: &str,
    ) -> StoreResult<DmMessage> {
        let content = validate_content(content)?;

        let mut tables = self.tables.write();
        if !tables.conversation(conversation)?.includes(sender) {
            return Err(StoreError::Forbidden(format!(
                "{sender} is not part of conversation {conversation}"
            )));
        }

        let message = DmMessage {
            id: MessageId::new(tables.next_id("m")),
            conversation_id: conversation.clone(),
            sender_id: sender.clone(),
            content: content.to_string(),
            created_at: tables.timestamp(),
        };

        let thread = tables.dms.entry(conversation.clone()).or_default();
        thread.push(message.clone());
        let position = thread.len() - 1;
        tables
            .dm_index
            .insert(message.id.clone(), (conversation.clone(), position));
        Ok(message)
    }

    fn dm_message(&self, id: &MessageId) -> StoreResult<DmMessage> {
        let tables = self.tables.read();
        tables
            .dm_index
            .get(id)
            .and_then(|(conversation, position)| tables.dms.get(conversation)?.get(*position))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("message {id}")))
    }

    fn conversation_messages(&self, conversation: &ConversationId) -> StoreResult<Vec<DmMessage>> {
        let tables = self.tables.read();
        tables.conversation(conversation)?;
        Ok(tables.dms.get(conversation).cloned().unwrap_or_default())
    }

    fn push_notification(
        &self,
        user: &UserId,
        kind: NotificationKind,
        body: &str,
    ) -> Notification {
        let mut tables = self.tables.write();
        let notification = Notification {
            id: NotificationId::new(tables.next_id("n")),
            user_id: user.clone(),
            kind,
            body: body.to_string(),
            read: false,
            created_at: tables.timestamp(),
        };
        tables
            .notifications
            .entry(user.clone())
            .or_default()
            .push(notification.clone());
        notification
    }

    fn notifications(&self, user: &UserId) -> Vec<Notification> {
        self.tables
            .read()
            .notifications
            .get(user)
            .map(|list| list.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    fn mark_notification_read(&self, user: &UserId, id: &NotificationId) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let notification = tables
            .notifications
            .get_mut(user)
            .and_then(|list| list.iter_mut().find(|n| &n.id == id))
            .ok_or_else(|| StoreError::NotFound(format!("notification {id}")))?;
        notification.read = true;
        Ok(())
    }

    fn mark_all_read(&self, user: &UserId) -> usize {
        let mut tables = self.tables.write();
        let Some(list) = tables.notifications.get_mut(user) else {
            return 0;
        };

        let mut changed = 0;
        for notification in list.iter_mut().filter(|n| !n.read) {
            notification.read = true;
            changed += 1;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> UserId {
        UserId::new(id)
    }

    fn public_circle(store: &MemoryStore, owner: &str) -> Circle {
        store
            .create_circle(
                &user(owner),
                NewCircle {
                    name: "Morning runners".into(),
                    description: "5k club".into(),
                    is_private: false,
                },
            )
            .unwrap()
    }

    #[test]
    fn test_creator_is_member() {
        let store = MemoryStore::new();
        let circle = public_circle(&store, "alice");

        assert!(store.is_member(&circle.id, &user("alice")));
        assert_eq!(store.circles_for_user(&user("alice")), vec![circle.clone()]);
        assert!(store.circle_ids_for_user(&user("alice")).contains(&circle.id));
        assert!(store.circles_for_user(&user("bob")).is_empty());
    }

    #[test]
    fn test_blank_circle_name_rejected() {
        let store = MemoryStore::new();
        let result = store.create_circle(
            &user("alice"),
            NewCircle {
                name: "   ".into(),
                description: String::new(),
                is_private: false,
            },
        );
        assert!(matches!(result, Err(StoreError::Invalid(_))));
    }

    #[test]
    fn test_join_and_leave() {
        let store = MemoryStore::new();
        let circle = public_circle(&store, "alice");

        store.join_circle(&circle.id, &user("bob")).unwrap();
        store.join_circle(&circle.id, &user("bob")).unwrap();
        assert!(store.is_member(&circle.id, &user("bob")));

        store.leave_circle(&circle.id, &user("bob")).unwrap();
        assert!(!store.is_member(&circle.id, &user("bob")));
    }

    #[test]
    fn test_private_circle_rejects_join() {
        let store = MemoryStore::new();
        let circle = store
            .create_circle(
                &user("alice"),
                NewCircle {
                    name: "Inner".into(),
                    description: String::new(),
                    is_private: true,
                },
            )
            .unwrap();

        assert!(matches!(
            store.join_circle(&circle.id, &user("bob")),
            Err(StoreError::Forbidden(_))
        ));
        // Existing members re-joining is fine.
        assert!(store.join_circle(&circle.id, &user("alice")).is_ok());
    }

    #[test]
    fn test_chat_requires_membership() {
        let store = MemoryStore::new();
        let circle = public_circle(&store, "alice");

        assert!(matches!(
            store.insert_chat_message(&circle.id, &user("bob"), "hi"),
            Err(StoreError::Forbidden(_))
        ));

        let message = store
            .insert_chat_message(&circle.id, &user("alice"), "  hi  ")
            .unwrap();
        assert_eq!(message.content, "hi");
        assert_eq!(store.circle_messages(&circle.id).unwrap(), vec![message]);
    }

    #[test]
    fn test_content_validation() {
        let store = MemoryStore::new();
        let circle = public_circle(&store, "alice");

        assert!(matches!(
            store.insert_chat_message(&circle.id, &user("alice"), " \n "),
            Err(StoreError::Invalid(_))
        ));

        let too_long = "x".repeat(super::super::MAX_CONTENT_CHARS + 1);
        assert!(matches!(
            store.insert_chat_message(&circle.id, &user("alice"), &too_long),
            Err(StoreError::Invalid(_))
        ));
    }

    #[test]
    fn test_timestamps_strictly_increase() {
        let store = MemoryStore::new();
        let circle = public_circle(&store, "alice");

        let stamps: Vec<_> = (0..50)
            .map(|i| {
                store
                    .insert_chat_message(&circle.id, &user("alice"), &format!("msg {i}"))
                    .unwrap()
                    .created_at
            })
            .collect();

        assert!(stamps.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_open_conversation_is_idempotent_per_pair() {
        let store = MemoryStore::new();
        let first = store.open_conversation(&user("alice"), &user("bob")).unwrap();
        let second = store.open_conversation(&user("bob"), &user("alice")).unwrap();
        assert_eq!(first.id, second.id);

        assert!(matches!(
            store.open_conversation(&user("alice"), &user("alice")),
            Err(StoreError::Invalid(_))
        ));
    }

    #[test]
    fn test_dm_lookup_and_participation() {
        let store = MemoryStore::new();
        let conversation = store.open_conversation(&user("alice"), &user("bob")).unwrap();

        let message = store
            .insert_dm(&conversation.id, &user("alice"), "hey bob")
            .unwrap();
        assert_eq!(store.dm_message(&message.id).unwrap(), message);
        assert_eq!(
            store.conversation_messages(&conversation.id).unwrap(),
            vec![message]
        );

        assert!(matches!(
            store.insert_dm(&conversation.id, &user("eve"), "hi"),
            Err(StoreError::Forbidden(_))
        ));
        assert!(matches!(
            store.dm_message(&MessageId::new("missing")),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_notifications_newest_first_and_mark_read() {
        let store = MemoryStore::new();
        let first = store.push_notification(&user("bob"), NotificationKind::System, "welcome");
        let second =
            store.push_notification(&user("bob"), NotificationKind::DirectMessage, "new dm");

        let list = store.notifications(&user("bob"));
        assert_eq!(list[0].id, second.id);
        assert_eq!(list[1].id, first.id);

        store.mark_notification_read(&user("bob"), &first.id).unwrap();
        assert!(matches!(
            store.mark_notification_read(&user("alice"), &first.id),
            Err(StoreError::NotFound(_))
        ));

        assert_eq!(store.mark_all_read(&user("bob")), 1);
        assert_eq!(store.mark_all_read(&user("bob")), 0);
        assert!(store.notifications(&user("bob")).iter().all(|n| n.read));
    }
}

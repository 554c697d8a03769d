//! 进程内存储
//!
//! 所有集合放在同一把锁之后，每个接口方法都是一个原子单元；
//! 写入成功后在持锁状态下发布变更，订阅者看到的顺序与写入顺序一致。

use std::collections::HashMap;

use async_trait::async_trait;
use domain::{
    ChangeFeed, CollapseOutcome, Conversation, ConversationId, ConversationRepository,
    InterestRecord, InterestRepository, Message, MessageId, MessageRepository, NotificationEvent,
    NotificationId, NotificationKey, NotificationRepository, PairKey, PresenceRepository,
    PresenceState, RepositoryError, RepositoryResult, StoreEvent, Timestamp, UserId,
};
use tokio::sync::{broadcast, Mutex};

use crate::feed::BroadcastFeed;

#[derive(Default)]
struct State {
    interests: HashMap<PairKey, InterestRecord>,
    conversations: HashMap<ConversationId, Conversation>,
    messages: HashMap<ConversationId, Vec<Message>>,
    message_index: HashMap<MessageId, ConversationId>,
    presence: HashMap<UserId, PresenceState>,
    notifications: Vec<NotificationEvent>,
}

pub struct MemoryStore {
    state: Mutex<State>,
    feed: BroadcastFeed,
}

impl MemoryStore {
    pub fn new(feed: BroadcastFeed) -> Self {
        Self {
            state: Mutex::new(State::default()),
            feed,
        }
    }

    pub fn feed(&self) -> &BroadcastFeed {
        &self.feed
    }

    /// 存储中的通知总数，包括已读的
    pub async fn notification_count(&self) -> usize {
        self.state.lock().await.notifications.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(BroadcastFeed::default())
    }
}

impl ChangeFeed for MemoryStore {
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.feed.subscribe()
    }
}

#[async_trait]
impl InterestRepository for MemoryStore {
    async fn find(&self, pair: PairKey) -> RepositoryResult<Option<InterestRecord>> {
        Ok(self.state.lock().await.interests.get(&pair).cloned())
    }

    async fn insert_if_absent(&self, record: InterestRecord) -> RepositoryResult<()> {
        let mut state = self.state.lock().await;
        if state.interests.contains_key(&record.pair) {
            return Err(RepositoryError::conflict("interest"));
        }
        state.interests.insert(record.pair, record);
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        record: InterestRecord,
        expected_version: i64,
    ) -> RepositoryResult<()> {
        let mut state = self.state.lock().await;
        let current = state
            .interests
            .get_mut(&record.pair)
            .ok_or(RepositoryError::NotFound)?;
        if current.version != expected_version {
            return Err(RepositoryError::conflict("interest"));
        }
        *current = record;
        Ok(())
    }

    async fn list_mutual(&self, user: UserId) -> RepositoryResult<Vec<InterestRecord>> {
        let state = self.state.lock().await;
        let mut records: Vec<_> = state
            .interests
            .values()
            .filter(|record| record.mutual && record.pair.contains(user))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.last_interaction_at.cmp(&a.last_interaction_at));
        Ok(records)
    }
}

#[async_trait]
impl ConversationRepository for MemoryStore {
    async fn create_if_absent(
        &self,
        conversation: Conversation,
    ) -> RepositoryResult<(Conversation, bool)> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.conversations.get(&conversation.id) {
            return Ok((existing.clone(), false));
        }
        state
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok((conversation, true))
    }

    async fn find(&self, id: ConversationId) -> RepositoryResult<Option<Conversation>> {
        Ok(self.state.lock().await.conversations.get(&id).cloned())
    }

    async fn list_for_user(&self, user: UserId, limit: u32) -> RepositoryResult<Vec<Conversation>> {
        let state = self.state.lock().await;
        let mut conversations: Vec<_> = state
            .conversations
            .values()
            .filter(|conversation| conversation.is_participant(user))
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        conversations.truncate(limit as usize);
        Ok(conversations)
    }
}

#[async_trait]
impl MessageRepository for MemoryStore {
    async fn append(&self, mut message: Message) -> RepositoryResult<Message> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        // 同一 id 的重复追加返回已存储的消息
        if let Some(conversation_id) = state.message_index.get(&message.id) {
            return state
                .messages
                .get(conversation_id)
                .and_then(|log| log.iter().find(|stored| stored.id == message.id))
                .cloned()
                .ok_or_else(|| RepositoryError::storage("message index out of sync"));
        }

        let conversation = state
            .conversations
            .get_mut(&message.conversation_id)
            .ok_or(RepositoryError::NotFound)?;
        message.seq = conversation.next_seq();
        conversation.record_message(&message);

        state
            .message_index
            .insert(message.id, message.conversation_id);
        state
            .messages
            .entry(message.conversation_id)
            .or_default()
            .push(message.clone());

        self.feed.publish(StoreEvent::MessageAppended {
            message: message.clone(),
        });
        Ok(message)
    }

    async fn list(
        &self,
        conversation_id: ConversationId,
        before_seq: Option<i64>,
        limit: u32,
    ) -> RepositoryResult<Vec<Message>> {
        let state = self.state.lock().await;
        let Some(log) = state.messages.get(&conversation_id) else {
            return Ok(Vec::new());
        };
        let end = match before_seq {
            Some(before) => log.partition_point(|message| message.seq < before),
            None => log.len(),
        };
        let start = end.saturating_sub(limit as usize);
        Ok(log[start..end].to_vec())
    }

    async fn mark_read(
        &self,
        conversation_id: ConversationId,
        reader: UserId,
    ) -> RepositoryResult<u64> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let flipped = state
            .messages
            .get_mut(&conversation_id)
            .map(|log| {
                log.iter_mut()
                    .filter_map(|message| message.mark_read_by(reader).then_some(()))
                    .count() as u64
            })
            .unwrap_or(0);

        if flipped > 0 {
            if let Some(conversation) = state.conversations.get_mut(&conversation_id) {
                conversation.mark_summary_read(reader);
            }
            self.feed.publish(StoreEvent::MessagesRead {
                conversation_id,
                reader_id: reader,
                flipped,
            });
        }
        Ok(flipped)
    }

    async fn count_unread(
        &self,
        receiver: UserId,
        conversation_id: Option<ConversationId>,
    ) -> RepositoryResult<u64> {
        let state = self.state.lock().await;
        let unread = |log: &Vec<Message>| {
            log.iter()
                .filter(|message| message.receiver_id == receiver && !message.read)
                .count() as u64
        };
        let count = match conversation_id {
            Some(id) => state.messages.get(&id).map(unread).unwrap_or(0),
            None => state.messages.values().map(unread).sum(),
        };
        Ok(count)
    }
}

#[async_trait]
impl PresenceRepository for MemoryStore {
    async fn set(&self, presence: PresenceState) -> RepositoryResult<()> {
        let mut state = self.state.lock().await;
        state.presence.insert(presence.user_id, presence.clone());
        self.feed
            .publish(StoreEvent::PresenceChanged { state: presence });
        Ok(())
    }

    async fn get(&self, user: UserId) -> RepositoryResult<Option<PresenceState>> {
        Ok(self.state.lock().await.presence.get(&user).cloned())
    }
}

#[async_trait]
impl NotificationRepository for MemoryStore {
    async fn collapse_or_insert(
        &self,
        candidate: NotificationEvent,
        window_start: Timestamp,
    ) -> RepositoryResult<CollapseOutcome> {
        let mut state = self.state.lock().await;
        let key = candidate.key();

        let existing = state
            .notifications
            .iter_mut()
            .filter(|event| event.matches(&key) && event.within_window(window_start))
            .max_by_key(|event| event.created_at);

        let outcome = match existing {
            Some(event) => {
                event.refresh(candidate.message, candidate.created_at);
                CollapseOutcome::Refreshed(event.clone())
            }
            None => {
                state.notifications.push(candidate.clone());
                CollapseOutcome::Created(candidate)
            }
        };

        self.feed.publish(StoreEvent::NotificationUpserted {
            event: outcome.event().clone(),
        });
        Ok(outcome)
    }

    async fn retract(&self, key: NotificationKey) -> RepositoryResult<u64> {
        let mut state = self.state.lock().await;
        let before = state.notifications.len();
        state.notifications.retain(|event| !event.matches(&key));
        let removed = (before - state.notifications.len()) as u64;

        if removed > 0 {
            self.feed
                .publish(StoreEvent::NotificationRetracted { key, removed });
        }
        Ok(removed)
    }

    async fn mark_read(&self, target: UserId, id: NotificationId) -> RepositoryResult<bool> {
        let mut state = self.state.lock().await;
        let event = state
            .notifications
            .iter_mut()
            .find(|event| event.id == id && event.target_id == target)
            .ok_or(RepositoryError::NotFound)?;

        let flipped = event.mark_read();
        if flipped {
            self.feed.publish(StoreEvent::NotificationsRead {
                target_id: target,
                count: 1,
            });
        }
        Ok(flipped)
    }

    async fn mark_all_read(&self, target: UserId) -> RepositoryResult<u64> {
        let mut state = self.state.lock().await;
        let count = state
            .notifications
            .iter_mut()
            .filter(|event| event.target_id == target)
            .filter_map(|event| event.mark_read().then_some(()))
            .count() as u64;

        if count > 0 {
            self.feed.publish(StoreEvent::NotificationsRead {
                target_id: target,
                count,
            });
        }
        Ok(count)
    }

    async fn list_for_target(
        &self,
        target: UserId,
        limit: u32,
    ) -> RepositoryResult<Vec<NotificationEvent>> {
        let state = self.state.lock().await;
        let mut events: Vec<_> = state
            .notifications
            .iter()
            .filter(|event| event.target_id == target)
            .cloned()
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        events.truncate(limit as usize);
        Ok(events)
    }

    async fn count_unread(&self, target: UserId) -> RepositoryResult<u64> {
        let state = self.state.lock().await;
        Ok(state
            .notifications
            .iter()
            .filter(|event| event.target_id == target && !event.is_read())
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use domain::{MessageBody, NotificationType};
    use uuid::Uuid;

    fn user() -> UserId {
        UserId::from(Uuid::new_v4())
    }

    async fn conversation(store: &MemoryStore, a: UserId, b: UserId) -> Conversation {
        let conversation = Conversation::open(PairKey::new(a, b).unwrap(), Utc::now());
        store.create_if_absent(conversation).await.unwrap().0
    }

    #[tokio::test]
    async fn append_assigns_sequence_and_is_idempotent_by_id() {
        let store = MemoryStore::default();
        let (a, b) = (user(), user());
        let conversation = conversation(&store, a, b).await;

        let message = Message::compose(
            &conversation,
            a,
            MessageBody::text("hi", 100).unwrap(),
            Utc::now(),
        )
        .unwrap();
        let first = store.append(message.clone()).await.unwrap();
        let again = store.append(message).await.unwrap();
        assert_eq!(first.seq, 1);
        assert_eq!(again, first);

        let log = store.list(conversation.id, None, 10).await.unwrap();
        assert_eq!(log.len(), 1);

        let stored = ConversationRepository::find(&store, conversation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.last_seq, 1);
        assert_eq!(stored.last_message.unwrap().message_id, first.id);
    }

    #[tokio::test]
    async fn append_to_unknown_conversation_is_not_found() {
        let store = MemoryStore::default();
        let (a, b) = (user(), user());
        let conversation = Conversation::open(PairKey::new(a, b).unwrap(), Utc::now());
        let message = Message::compose(
            &conversation,
            a,
            MessageBody::text("hi", 100).unwrap(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(
            store.append(message).await.unwrap_err(),
            RepositoryError::NotFound
        );
    }

    #[tokio::test]
    async fn history_pages_backwards_by_sequence() {
        let store = MemoryStore::default();
        let (a, b) = (user(), user());
        let conversation = conversation(&store, a, b).await;
        for i in 0..5 {
            let message = Message::compose(
                &conversation,
                a,
                MessageBody::text(format!("m{i}"), 100).unwrap(),
                Utc::now(),
            )
            .unwrap();
            store.append(message).await.unwrap();
        }

        let latest = store.list(conversation.id, None, 2).await.unwrap();
        assert_eq!(latest.iter().map(|m| m.seq).collect::<Vec<_>>(), vec![4, 5]);

        let older = store.list(conversation.id, Some(4), 2).await.unwrap();
        assert_eq!(older.iter().map(|m| m.seq).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[tokio::test]
    async fn late_stamped_message_does_not_demote_a_conversation() {
        let store = MemoryStore::default();
        let (a, b, c) = (user(), user(), user());
        let with_b = conversation(&store, a, b).await;
        let with_c = conversation(&store, a, c).await;
        let base = Utc::now();

        let send = |conversation: &Conversation, at| {
            Message::compose(conversation, a, MessageBody::text("x", 100).unwrap(), at).unwrap()
        };
        store
            .append(send(&with_b, base + Duration::seconds(10)))
            .await
            .unwrap();
        store
            .append(send(&with_c, base + Duration::seconds(5)))
            .await
            .unwrap();
        store
            .append(send(&with_b, base + Duration::seconds(1)))
            .await
            .unwrap();

        let listed = ConversationRepository::list_for_user(&store, a, 10)
            .await
            .unwrap();
        assert_eq!(
            listed.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![with_b.id, with_c.id]
        );
        assert_eq!(listed[0].updated_at, base + Duration::seconds(10));
    }

    #[tokio::test]
    async fn compare_and_swap_rejects_stale_versions() {
        let store = MemoryStore::default();
        let (a, b) = (user(), user());
        let pair = PairKey::new(a, b).unwrap();
        let mut record = InterestRecord::new(pair, Utc::now());
        record.version = 1;
        store.insert_if_absent(record.clone()).await.unwrap();

        assert!(matches!(
            store.insert_if_absent(record.clone()).await,
            Err(RepositoryError::Conflict { .. })
        ));

        let mut next = record.clone();
        next.version = 2;
        store.compare_and_swap(next.clone(), 1).await.unwrap();
        assert!(matches!(
            store.compare_and_swap(next, 1).await,
            Err(RepositoryError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn collapse_refreshes_inside_window_only() {
        let store = MemoryStore::default();
        let (actor, target) = (user(), user());
        let key = NotificationKey::new(NotificationType::Like, actor, target, Some("p".into()));
        let now = Utc::now();

        let first = store
            .collapse_or_insert(NotificationEvent::new(key.clone(), None, now), now - Duration::hours(1))
            .await
            .unwrap();
        assert!(!first.is_refresh());

        let later = now + Duration::minutes(10);
        let second = store
            .collapse_or_insert(
                NotificationEvent::new(key.clone(), Some("again".into()), later),
                later - Duration::hours(1),
            )
            .await
            .unwrap();
        assert!(second.is_refresh());
        assert_eq!(second.event().id, first.event().id);
        assert_eq!(store.notification_count().await, 1);

        let much_later = later + Duration::hours(2);
        let third = store
            .collapse_or_insert(
                NotificationEvent::new(key, None, much_later),
                much_later - Duration::hours(1),
            )
            .await
            .unwrap();
        assert!(!third.is_refresh());
        assert_eq!(store.notification_count().await, 2);
    }

    #[tokio::test]
    async fn mark_read_of_foreign_notification_is_not_found() {
        let store = MemoryStore::default();
        let (actor, target) = (user(), user());
        let now = Utc::now();
        let event = store
            .collapse_or_insert(
                NotificationEvent::new(
                    NotificationKey::new(NotificationType::Follow, actor, target, None),
                    None,
                    now,
                ),
                now,
            )
            .await
            .unwrap()
            .into_event();

        assert_eq!(
            NotificationRepository::mark_read(&store, actor, event.id)
                .await
                .unwrap_err(),
            RepositoryError::NotFound
        );
        assert!(NotificationRepository::mark_read(&store, target, event.id)
            .await
            .unwrap());
        assert!(!NotificationRepository::mark_read(&store, target, event.id)
            .await
            .unwrap());
    }
}

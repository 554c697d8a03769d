use domain::{ChangeFeed, StoreEvent};
use tokio::sync::broadcast;

/// 进程内变更流。
///
/// 没有订阅者时发布直接丢弃；接收端落后超过容量时会收到 `Lagged`。
#[derive(Clone)]
pub struct BroadcastFeed {
    sender: broadcast::Sender<StoreEvent>,
}

impl BroadcastFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: StoreEvent) {
        if self.sender.receiver_count() == 0 {
            return;
        }
        if let Err(err) = self.sender.send(event) {
            tracing::debug!(error = %err, "变更没有接收者");
        }
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastFeed {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl ChangeFeed for BroadcastFeed {
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }
}

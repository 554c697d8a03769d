//! 实时订阅句柄
//!
//! 每个订阅对应一个后台任务和一个变更流接收端。调用 `unsubscribe`
//! 或丢弃句柄都会停止回调并释放监听。

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use domain::StoreEvent;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

/// 统计仍在运行的监听数量
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    active: AtomicUsize,
}

impl ListenerRegistry {
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

pub struct Subscription {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
    registry: Arc<ListenerRegistry>,
}

impl Subscription {
    /// 启动监听任务并登记
    pub(crate) fn spawn<Fut>(
        name: &'static str,
        registry: Arc<ListenerRegistry>,
        task: Fut,
    ) -> Self
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        registry.active.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(subscription = name, "订阅已建立");
        Self {
            name,
            handle: Some(tokio::spawn(task)),
            registry,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_active(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// 停止回调投递并释放监听
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            self.registry.active.fetch_sub(1, Ordering::SeqCst);
            tracing::debug!(subscription = self.name, "订阅已释放");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("name", &self.name)
            .field("active", &self.is_active())
            .finish()
    }
}

/// 读取下一条变更；接收端落后时跳过丢失的事件，流关闭时返回 `None`
pub(crate) async fn next_event(
    receiver: &mut broadcast::Receiver<StoreEvent>,
    subscription: &'static str,
) -> Option<StoreEvent> {
    loop {
        match receiver.recv().await {
            Ok(event) => return Some(event),
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(subscription, skipped, "订阅处理过慢，丢弃了部分变更");
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn unsubscribe_releases_listener() {
        let registry = Arc::new(ListenerRegistry::default());
        let subscription = Subscription::spawn("test", registry.clone(), async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        assert_eq!(registry.active(), 1);
        assert!(subscription.is_active());

        subscription.unsubscribe();
        assert_eq!(registry.active(), 0);
    }

    #[tokio::test]
    async fn dropping_the_handle_releases_listener() {
        let registry = Arc::new(ListenerRegistry::default());
        {
            let _subscription = Subscription::spawn("test", registry.clone(), async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            });
            assert_eq!(registry.active(), 1);
        }
        assert_eq!(registry.active(), 0);
    }
}

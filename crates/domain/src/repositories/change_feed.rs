use tokio::sync::broadcast;

use crate::events::StoreEvent;

/// 存储的实时变更流
#[cfg_attr(feature = "testing", mockall::automock)]
pub trait ChangeFeed: Send + Sync {
    /// 订阅之后发生的所有变更；接收端被丢弃即释放监听
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}

use serde::{Deserialize, Serialize};

use crate::value_objects::{Timestamp, UserId};

/// 用户在线状态，持续覆盖写入，从不删除
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceState {
    pub user_id: UserId,
    pub online: bool,
    /// 从未写入过状态的用户为 `None`
    pub last_changed: Option<Timestamp>,
}

impl PresenceState {
    pub fn new(user_id: UserId, online: bool, now: Timestamp) -> Self {
        Self {
            user_id,
            online,
            last_changed: Some(now),
        }
    }

    /// 没有状态记录的用户按约定视为离线
    pub fn unknown(user_id: UserId) -> Self {
        Self {
            user_id,
            online: false,
            last_changed: None,
        }
    }
}

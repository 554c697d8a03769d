//! 匹配与会话核心领域模型
//!
//! 包含兴趣记录、会话、消息、在线状态、通知等核心实体，
//! 以及存储适配器需要实现的接口。

pub mod entities;
pub mod errors;
pub mod events;
pub mod repositories;
pub mod value_objects;

// 重新导出常用类型
pub use entities::*;
pub use errors::*;
pub use events::*;
pub use repositories::*;
pub use value_objects::*;

//! Repository实现模块

mod conversation_repository_impl;
mod interest_repository_impl;
mod message_repository_impl;
mod notification_repository_impl;
mod presence_repository_impl;

mod chat_service;
mod conversation_directory;
mod interest_ledger;
mod match_service;
mod message_stream;
mod notification_dispatcher;
mod presence_tracker;
mod read_state;

pub use chat_service::{ChatService, ChatServiceDependencies};
pub use conversation_directory::ConversationDirectory;
pub use interest_ledger::InterestLedger;
pub use match_service::MatchService;
pub use message_stream::{MessageLimits, MessageStream};
pub use notification_dispatcher::{
    Dispatch, NotificationDispatcher, NotificationSettings, NotifyRequest,
};
pub use presence_tracker::{PresenceSession, PresenceTracker};
pub use read_state::ReadStateAggregator;

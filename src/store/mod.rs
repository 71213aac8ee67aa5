// Latest-conversation storage and change notification.
//
// The store holds at most one conversation record (the most recent webhook
// delivery); every replacement is fanned out to live subscribers through the
// event bus so the stream endpoint can push it to connected clients.

pub mod conversation;
pub mod event_bus;

pub use conversation::{ConversationBackend, ConversationStore, FileBackend, MemoryBackend};
pub use event_bus::{EventBus, SubscriptionId};

pub mod store;
pub mod subscription;
pub mod typing;

pub use store::ChatStore;
pub use subscription::Subscription;
pub use typing::{TypingRegistry, TYPING_STALENESS};

use crate::chat::chat_models::ChatMessage;
use uuid::Uuid;

/// Change events pushed over the store's channels, in the shape the hosted
/// gateway's row-change feed would deliver them.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// A message row was inserted into a conversation.
    MessageInserted(ChatMessage),
    /// A typing indicator for this conversation was set, refreshed or
    /// cleared. Subscribers refetch the current snapshot rather than
    /// patching incrementally.
    TypingChanged { conversation_id: Uuid },
    /// Coarse invalidation on the unscoped feed: something about this
    /// conversation changed (created, message appended, activity bumped).
    ConversationTouched { conversation_id: Uuid },
}

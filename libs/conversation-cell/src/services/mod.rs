pub mod engine;
pub mod sender;
pub mod session_store;
pub mod templates;

pub use engine::{ConversationEngine, EngineSettings};
pub use sender::{HttpMessageSender, MessageSender, RecordingMessageSender};
pub use session_store::{InMemorySessionStore, RedisSessionStore, SessionStore};
pub use templates::{DefaultTemplates, TemplateRenderer};

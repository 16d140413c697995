pub mod handlers;
pub mod models;
pub mod resolver;
pub mod router;
pub mod services;
pub mod session;
pub mod states;

pub use models::*;
pub use router::conversation_routes;
pub use services::*;
pub use states::ConversationState;

/// Pending admin actions
pub mod admin_state;
/// Long message delivery
pub mod messaging;
/// Transport-independent event handlers
pub mod router;
/// Update parsing and bot commands
pub mod telegram;
/// Reply channel abstraction and its Telegram implementation
pub mod transport;
/// Texts and keyboards
pub mod views;

pub use admin_state::{AdminAction, AdminInputOutcome, AdminStateTable};
pub use router::Router;
pub use transport::{ChatTransport, TelegramTransport, TextFormat};

//! Client-side adapter for the marketplace chat: one-shot REST calls, the
//! live session, and the local state a chat screen keeps on top of them.

pub mod error;
pub mod http;
pub mod session;
pub mod transcript;
pub mod typing;

pub use error::ClientError;
pub use http::{Bootstrap, ChatClient};
pub use session::{ChatSession, CommandSender, Connection, EventStream};
pub use transcript::{Entry, Transcript};
pub use typing::{OutgoingTyping, TypingIndicator};

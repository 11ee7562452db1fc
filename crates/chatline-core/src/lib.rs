pub mod errors;
pub mod events;
pub mod ids;
pub mod messages;
pub mod store;

pub use errors::ChatError;
pub use messages::{Message, NewMessage};
pub use store::MessageStore;

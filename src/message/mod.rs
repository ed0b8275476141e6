pub use message_id::{EntryPosition, MessageId};
pub use record::Message;

mod message_id;
mod record;

//! Storage backends for helpdesk data

mod memory;
mod sqlite;
mod traits;

pub use memory::InMemoryHelpdeskStore;
pub use sqlite::SqliteHelpdeskStore;
pub use traits::{HelpdeskStore, TicketInsert};

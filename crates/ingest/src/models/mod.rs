//! Data models for helpdesk entities

mod client;
mod integration;
mod membership;
mod thread;
mod ticket;

pub use client::Client;
pub use integration::MailIntegration;
pub use membership::{MemberRole, Membership};
pub use thread::{EmailThread, NewEmailThread};
pub use ticket::{NewComment, NewTicket, Ticket, TicketComment, TicketPriority, TicketStatus};

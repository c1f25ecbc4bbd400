//! Data models for conference entities.
//!
//! This module contains the typed views of the mirrored tables:
//!
//! - `AgendaItem`: schedule entries (`agenda_items`)
//! - `Attendee`: registered attendees (`attendees`)
//! - `ConferenceSession`: timed sessions (`sessions`)
//!
//! The cache itself stores untyped records; these types are decoded at the
//! consumer boundary.

pub mod agenda;
pub mod attendee;
pub mod session;

pub use agenda::{sort_agenda, AgendaItem};
pub use attendee::Attendee;
pub use session::ConferenceSession;

/// Table keys of the mirrored remote tables.
pub mod tables {
    pub const AGENDA_ITEMS: &str = "agenda_items";
    pub const ATTENDEES: &str = "attendees";
    pub const SESSIONS: &str = "sessions";
}

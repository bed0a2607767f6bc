//! Observability subsystem for userbase
//!
//! - Structured logging (JSON lines)
//! - Typed lifecycle and record events
//! - Begin/complete scopes for boot steps
//!
//! ```ignore
//! use userbase::observability::{log_event_with_fields, Event};
//!
//! log_event_with_fields(Event::UserCreated, &[("id", "1"), ("account_id", "alice_01")]);
//! ```

mod events;
mod logger;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use scope::{ObservationScope, Timer};

/// Log an event at its default severity
pub fn log_event(event: Event) {
    Logger::log(event.severity(), event.as_str(), &[]);
}

/// Log an event with fields at its default severity
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}

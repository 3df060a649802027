//! Scheduling: recurrence rules and the simulation calendar.

pub mod calendar;
pub mod rrule;

pub use calendar::{build_calendar, ObservationKind, SessionStamp};
pub use rrule::{Frequency, RecurrenceRule};

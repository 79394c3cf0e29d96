//! iCalendar serialization for appointments and reflection placeholders.

mod generate;
mod parse;

pub use generate::generate_ics;
pub use parse::{parse_calendar, parse_event};

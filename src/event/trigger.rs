use serde::{Deserialize, Serialize};

use super::{EventArena, EventId};
use crate::time::Date;

/// When an event may apply. Triggers are pure: they read the date and other events' applied
/// flags, nothing else.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Trigger {
    /// Always fires.
    Empty,
    Day(Date),
    /// `start <= date < end`.
    TimeRange { start: Date, end: Date },
    /// Fires once the referenced event has applied.
    After(EventId),
    And(Vec<Trigger>),
    /// First match: stops at the first child that fires.
    Or(Vec<Trigger>),
}

impl Trigger {
    pub fn fires(&self, date: Date, events: &EventArena) -> bool {
        match self {
            Trigger::Empty => true,
            Trigger::Day(day) => date == *day,
            Trigger::TimeRange { start, end } => *start <= date && date < *end,
            Trigger::After(event) => events.is_applied(*event),
            Trigger::And(children) => children.iter().all(|c| c.fires(date, events)),
            Trigger::Or(children) => children.iter().any(|c| c.fires(date, events)),
        }
    }
}

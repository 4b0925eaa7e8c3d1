//! The day index of pending work.
//!
//! `DayPlan` maps each date to a root day event. Registering an event for a date hooks it onto
//! that date's root, so events registered for the same date apply in registration order. The day
//! loop takes today's root out of the plan and applies it; anything registered for today while
//! that happens lands on a fresh root, which the loop takes next. A `Delayed` effect with zero
//! days therefore runs after every handler already queued for today.

use std::collections::BTreeMap;

use crate::event::{Effect, EventArena, EventId, Trigger};
use crate::time::Date;

#[derive(Debug, Clone, Default)]
pub struct DayPlan {
    roots: BTreeMap<Date, EventId>,
}

impl DayPlan {
    /// Hooks `event` onto the root for `date`. Panics if `date` is before `today`.
    pub fn register(&mut self, date: Date, event: EventId, events: &mut EventArena, today: Date) {
        assert!(
            date >= today,
            "cannot register {event} on {date}, already {today}"
        );
        let root = *self
            .roots
            .entry(date)
            .or_insert_with(|| events.create(Trigger::Day(date), Effect::NoOp));
        events.add_hook(root, event);
    }

    pub fn register_all(
        &mut self,
        day_events: impl IntoIterator<Item = (Date, EventId)>,
        events: &mut EventArena,
        today: Date,
    ) {
        for (date, event) in day_events {
            self.register(date, event, events, today);
        }
    }

    /// Removes and returns the root for `date`.
    pub fn take(&mut self, date: Date) -> Option<EventId> {
        self.roots.remove(&date)
    }
}

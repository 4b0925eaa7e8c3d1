//! Events: a trigger, an effect and a list of hooks, stored in an arena and referred to by
//! [`EventId`].
//!
//! Applying an event checks its trigger against the current date. If it fires, the event is
//! marked applied, its effect runs, and then every hook is applied in insertion order (hooks added
//! while the parent is applying included). An event applies at most once; `After` triggers rely on
//! that. A cancelled event never applies.
//!
//! Once an event has applied or been cancelled its trigger, effect and hooks are dropped. Only one
//! applied bit and one cancelled bit per id outlive it, which is all `After` needs.
mod effect;
mod trigger;

pub use effect::Effect;
pub use trigger::Trigger;

use std::fmt::{self, Display};
use std::mem;

use serde::{Deserialize, Serialize};

use crate::hashing::HashMap;
use crate::log::trace;
use crate::plan::DayPlan;
use crate::time::Date;
use crate::world::World;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(pub usize);

impl Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event#{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct Event {
    trigger: Trigger,
    effect: Effect,
    hooks: Vec<EventId>,
}

/// One bit per event id.
#[derive(Debug, Clone, Default)]
struct Bits(Vec<u64>);

impl Bits {
    fn get(&self, i: usize) -> bool {
        self.0.get(i / 64).is_some_and(|word| word & (1u64 << (i % 64)) != 0)
    }

    fn set(&mut self, i: usize) {
        let word = i / 64;
        if word >= self.0.len() {
            self.0.resize(word + 1, 0);
        }
        self.0[word] |= 1u64 << (i % 64);
    }
}

/// Everything an effect may touch while an event applies.
pub struct EventContext<'a> {
    pub date: Date,
    pub world: &'a mut World,
    pub plan: &'a mut DayPlan,
}

#[derive(Debug, Clone, Default)]
pub struct EventArena {
    pending: HashMap<EventId, Event>,
    applied: Bits,
    cancelled: Bits,
    created: usize,
    applied_count: usize,
}

impl EventArena {
    pub fn create(&mut self, trigger: Trigger, effect: Effect) -> EventId {
        let id = EventId(self.created);
        self.created += 1;
        self.pending.insert(
            id,
            Event {
                trigger,
                effect,
                hooks: Vec::new(),
            },
        );
        id
    }

    /// `child` applies right after `parent` (and after hooks added before it). A parent that has
    /// already applied or been cancelled will never run it.
    pub fn add_hook(&mut self, parent: EventId, child: EventId) {
        match self.pending.get_mut(&parent) {
            Some(event) => event.hooks.push(child),
            None => trace!("{parent} is settled, {child} not hooked"),
        }
    }

    pub fn cancel(&mut self, event: EventId) {
        self.cancelled.set(event.0);
        self.pending.remove(&event);
    }

    pub fn is_applied(&self, event: EventId) -> bool {
        self.applied.get(event.0)
    }

    pub fn is_cancelled(&self, event: EventId) -> bool {
        self.cancelled.get(event.0)
    }

    /// Hooks of an event that has not settled yet; empty once it has.
    pub fn hooks(&self, event: EventId) -> &[EventId] {
        self.pending
            .get(&event)
            .map_or(&[], |event| event.hooks.as_slice())
    }

    /// Number of events ever created.
    pub fn len(&self) -> usize {
        self.created
    }

    pub fn is_empty(&self) -> bool {
        self.created == 0
    }

    /// Number of events still holding a trigger and an effect.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Number of events that have applied so far.
    pub fn applied_count(&self) -> usize {
        self.applied_count
    }

    /// Panics if `id` has already applied.
    pub fn apply(&mut self, id: EventId, ctx: &mut EventContext) {
        if self.is_cancelled(id) {
            return;
        }
        let Some(event) = self.pending.get(&id) else {
            assert!(!self.is_applied(id), "{id} applied twice (on {})", ctx.date);
            panic!("{id} was never created");
        };
        if !event.trigger.fires(ctx.date, self) {
            return;
        }

        self.applied.set(id.0);
        self.applied_count += 1;
        let effect = self
            .pending
            .get_mut(&id)
            .map(|event| mem::take(&mut event.effect))
            .unwrap_or_default();
        trace!("{}: applying {id}: {effect:?}", ctx.date);
        effect.run(self, ctx);

        let mut i = 0;
        while let Some(hook) = self.hook_at(id, i) {
            self.apply(hook, ctx);
            i += 1;
        }
        self.pending.remove(&id);
    }

    fn hook_at(&self, id: EventId, i: usize) -> Option<EventId> {
        self.pending.get(&id)?.hooks.get(i).copied()
    }

    #[cfg(test)]
    pub(crate) fn mark_applied_for_test(&mut self, event: EventId) {
        self.applied.set(event.0);
        self.pending.remove(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disease::DiseaseState;
    use crate::environment::{EnvironmentKind, InterventionState};
    use crate::person::PersonId;
    use crate::routine::{RoutineChange, RoutineChangeKey};
    use crate::world::WorldBuilder;

    fn small_world() -> World {
        let mut builder = WorldBuilder::new();
        let a = builder.add_person(30, 1.0);
        let b = builder.add_person(40, 1.0);
        builder.add_environment(EnvironmentKind::Household, "home", vec![a, b], 2.0);
        builder.build()
    }

    #[test]
    fn applies_once_and_runs_hooks_in_order() {
        let mut world = small_world();
        let mut plan = DayPlan::default();
        let mut events = EventArena::default();
        let key = RoutineChangeKey::Quarantine;
        let parent = events.create(
            Trigger::Day(Date(0)),
            Effect::AddRoutineChange {
                person: PersonId(0),
                key: key.clone(),
                change: RoutineChange::uniform(0.5),
            },
        );
        let child = events.create(
            Trigger::After(parent),
            Effect::RemoveRoutineChange {
                person: PersonId(0),
                key,
            },
        );
        events.add_hook(parent, child);

        let mut ctx = EventContext {
            date: Date(0),
            world: &mut world,
            plan: &mut plan,
        };
        events.apply(parent, &mut ctx);
        assert!(events.is_applied(parent));
        assert!(events.is_applied(child));
        assert_eq!(events.applied_count(), 2);
        let routine = world.get_person(PersonId(0)).routine();
        assert_eq!(routine.weight(EnvironmentKind::Household), 1.0);
    }

    #[test]
    fn trigger_not_firing_leaves_event_pending() {
        let mut world = small_world();
        let mut plan = DayPlan::default();
        let mut events = EventArena::default();
        let event = events.create(Trigger::Day(Date(3)), Effect::NoOp);
        let mut ctx = EventContext {
            date: Date(2),
            world: &mut world,
            plan: &mut plan,
        };
        events.apply(event, &mut ctx);
        assert!(!events.is_applied(event));
        ctx.date = Date(3);
        events.apply(event, &mut ctx);
        assert!(events.is_applied(event));
    }

    #[test]
    #[should_panic(expected = "applied twice")]
    fn double_apply_panics() {
        let mut world = small_world();
        let mut plan = DayPlan::default();
        let mut events = EventArena::default();
        let event = events.create(Trigger::Empty, Effect::NoOp);
        let mut ctx = EventContext {
            date: Date(0),
            world: &mut world,
            plan: &mut plan,
        };
        events.apply(event, &mut ctx);
        events.apply(event, &mut ctx);
    }

    #[test]
    fn cancelled_events_never_apply() {
        let mut world = small_world();
        let mut plan = DayPlan::default();
        let mut events = EventArena::default();
        let event = events.create(
            Trigger::Empty,
            Effect::DiseaseStateChange {
                person: PersonId(0),
                old: DiseaseState::Latent,
                new: DiseaseState::IncubatingPostLatent,
            },
        );
        events.cancel(event);
        let mut ctx = EventContext {
            date: Date(0),
            world: &mut world,
            plan: &mut plan,
        };
        events.apply(event, &mut ctx);
        assert!(!events.is_applied(event));
    }

    #[test]
    fn environment_effects_reach_every_member() {
        let mut world = small_world();
        let mut plan = DayPlan::default();
        let mut events = EventArena::default();
        let home = world.get_person(PersonId(0)).environment(EnvironmentKind::Household).unwrap();
        let key = RoutineChangeKey::HouseholdIsolation;
        let add = events.create(
            Trigger::Empty,
            Effect::AddRoutineChangeEnvironment {
                env: home,
                key: key.clone(),
                change: RoutineChange::uniform(0.0).with(EnvironmentKind::Household, 1.0),
            },
        );
        let close = events.create(
            Trigger::Empty,
            Effect::ChangeEnvInterventionState {
                env: home,
                old: InterventionState::Open,
                new: InterventionState::Isolated,
            },
        );
        let mut ctx = EventContext {
            date: Date(0),
            world: &mut world,
            plan: &mut plan,
        };
        events.apply(add, &mut ctx);
        events.apply(close, &mut ctx);
        for person in world.all_people() {
            assert_eq!(person.routine().weight(EnvironmentKind::Workplace), 0.0);
            assert_eq!(person.routine().weight(EnvironmentKind::Household), 1.0);
        }
        assert_eq!(
            world.environment(home).intervention_state(),
            InterventionState::Isolated
        );

        let remove = events.create(
            Trigger::Empty,
            Effect::RemoveRoutineChangeEnvironment { env: home, key },
        );
        let mut ctx = EventContext {
            date: Date(0),
            world: &mut world,
            plan: &mut plan,
        };
        events.apply(remove, &mut ctx);
        for person in world.all_people() {
            assert_eq!(person.routine().weight(EnvironmentKind::Workplace), 1.0);
        }
    }

    #[test]
    fn delayed_registers_on_the_plan() {
        let mut world = small_world();
        let mut plan = DayPlan::default();
        let mut events = EventArena::default();
        let inner = events.create(Trigger::Empty, Effect::NoOp);
        let delayed = events.create(Trigger::Empty, Effect::Delayed { event: inner, days: 3 });
        let mut ctx = EventContext {
            date: Date(1),
            world: &mut world,
            plan: &mut plan,
        };
        events.apply(delayed, &mut ctx);
        assert!(!events.is_applied(inner));
        let root = plan.take(Date(4)).unwrap();
        assert_eq!(events.hooks(root), &[inner]);
    }

    #[test]
    fn settled_events_are_dropped() {
        let mut world = small_world();
        let mut plan = DayPlan::default();
        let mut events = EventArena::default();
        let first = events.create(Trigger::Empty, Effect::NoOp);
        let second = events.create(Trigger::After(first), Effect::NoOp);
        let cancelled = events.create(Trigger::Empty, Effect::NoOp);
        events.add_hook(first, second);
        events.cancel(cancelled);
        assert_eq!(events.pending_count(), 2);

        let mut ctx = EventContext {
            date: Date(0),
            world: &mut world,
            plan: &mut plan,
        };
        events.apply(first, &mut ctx);
        assert_eq!(events.pending_count(), 0);
        assert_eq!(events.len(), 3);
        assert!(events.is_applied(first) && events.is_applied(second));
        assert!(events.is_cancelled(cancelled) && !events.is_applied(cancelled));
        assert!(Trigger::After(second).fires(Date(0), &events));
        assert!(events.hooks(first).is_empty());
    }

    #[test]
    fn bits_span_words() {
        let mut bits = Bits::default();
        bits.set(3);
        bits.set(130);
        assert!(bits.get(3) && bits.get(130));
        assert!(!bits.get(4) && !bits.get(64) && !bits.get(1000));
    }
}

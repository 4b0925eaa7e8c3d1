//! A member of the synthetic population: age, disease state, the environments they belong to and
//! the routine that decides how much they attend each of them.

use std::fmt::{self, Display};

use rand::Rng;
use serde::{Deserialize, Serialize};
use strum::EnumCount;

use crate::disease::{Course, DiseaseProgression, DiseaseState, InfectiousnessFactors};
use crate::environment::{Environment, EnvironmentId, EnvironmentKind};
use crate::event::{Effect, EventArena, EventId, Trigger};
use crate::routine::{Routine, RoutineChange, RoutineChangeKey};
use crate::time::Date;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PersonId(pub usize);

impl Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "person#{}", self.0)
    }
}

/// Where, when and from whom a person caught the disease.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct InfectionRecord {
    pub date: Date,
    pub environment: EnvironmentId,
    pub environment_kind: EnvironmentKind,
    /// `None` for seed infections.
    pub transmitter: Option<PersonId>,
    pub infectee: PersonId,
}

type Transition = (DiseaseState, DiseaseState);

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Person {
    id: PersonId,
    age: u32,
    base_infectiousness: f64,
    state: DiseaseState,
    last_state: DiseaseState,
    changed: bool,
    environments: [Option<EnvironmentId>; EnvironmentKind::COUNT],
    routine: Routine,
    infection: Option<InfectionRecord>,
    secondary_infections: f64,
    /// Hook point per transition, created on first request. Most people never get one.
    state_events: Vec<(Transition, EventId)>,
    course: Option<Course>,
    pending_course_events: Vec<EventId>,
    symptomatic_date: Option<Date>,
    ever_critical: bool,
}

impl Person {
    pub fn new(id: PersonId, age: u32, base_infectiousness: f64) -> Self {
        Self {
            id,
            age,
            base_infectiousness,
            state: DiseaseState::Susceptible,
            last_state: DiseaseState::Susceptible,
            changed: false,
            environments: [None; EnvironmentKind::COUNT],
            routine: Routine::default(),
            infection: None,
            secondary_infections: 0.0,
            state_events: Vec::new(),
            course: None,
            pending_course_events: Vec::new(),
            symptomatic_date: None,
            ever_critical: false,
        }
    }

    pub fn id(&self) -> PersonId {
        self.id
    }

    pub fn age(&self) -> u32 {
        self.age
    }

    pub fn base_infectiousness(&self) -> f64 {
        self.base_infectiousness
    }

    pub fn state(&self) -> DiseaseState {
        self.state
    }

    /// The state recorded by the last [`Person::save_state`].
    pub fn last_state(&self) -> DiseaseState {
        self.last_state
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn infection(&self) -> Option<&InfectionRecord> {
        self.infection.as_ref()
    }

    pub fn secondary_infections(&self) -> f64 {
        self.secondary_infections
    }

    pub fn course(&self) -> Option<&Course> {
        self.course.as_ref()
    }

    pub fn symptomatic_date(&self) -> Option<Date> {
        self.symptomatic_date
    }

    pub fn ever_critical(&self) -> bool {
        self.ever_critical
    }

    pub fn routine(&self) -> &Routine {
        &self.routine
    }

    pub fn environment(&self, kind: EnvironmentKind) -> Option<EnvironmentId> {
        self.environments[kind as usize]
    }

    /// `(kind, environment)` for every environment this person belongs to, in kind order.
    pub fn environments(&self) -> impl Iterator<Item = (EnvironmentKind, EnvironmentId)> + '_ {
        use strum::IntoEnumIterator;
        EnvironmentKind::iter().filter_map(|kind| self.environment(kind).map(|id| (kind, id)))
    }

    pub(crate) fn set_environment(&mut self, kind: EnvironmentKind, env: EnvironmentId) {
        self.environments[kind as usize] = Some(env);
    }

    pub(crate) fn credit_secondary_infections(&mut self, amount: f64) {
        self.secondary_infections += amount;
    }

    /// Infects a susceptible person and returns one day event per transition of the sampled
    /// course. Panics if the person is not susceptible.
    #[allow(clippy::too_many_arguments)]
    pub fn infect<R: Rng + ?Sized>(
        &mut self,
        date: Date,
        environment: EnvironmentId,
        environment_kind: EnvironmentKind,
        transmitter: Option<PersonId>,
        progression: &DiseaseProgression,
        rng: &mut R,
        events: &mut EventArena,
    ) -> Vec<(Date, EventId)> {
        let course = progression.sample_course(self.age, rng);
        self.infect_with_course(
            date,
            environment,
            environment_kind,
            transmitter,
            course,
            None,
            events,
        )
    }

    /// Like [`Person::infect`] with a known course. The infection and any transitions that would
    /// fall before `floor` are moved to `floor`, keeping their order.
    #[allow(clippy::too_many_arguments)]
    pub fn infect_with_course(
        &mut self,
        date: Date,
        environment: EnvironmentId,
        environment_kind: EnvironmentKind,
        transmitter: Option<PersonId>,
        course: Course,
        floor: Option<Date>,
        events: &mut EventArena,
    ) -> Vec<(Date, EventId)> {
        assert!(
            self.state.is_susceptible(),
            "cannot infect {} in state {}",
            self.id,
            self.state
        );
        self.state = DiseaseState::Latent;
        self.changed = true;
        self.infection = Some(InfectionRecord {
            date: floor.map_or(date, |f| date.max(f)),
            environment,
            environment_kind,
            transmitter,
            infectee: self.id,
        });

        let mut day_events = Vec::new();
        for (transition_date, old, new) in course.transitions(date) {
            let transition_date = floor.map_or(transition_date, |f| transition_date.max(f));
            let event = events.create(
                Trigger::Day(transition_date),
                Effect::DiseaseStateChange {
                    person: self.id,
                    old,
                    new,
                },
            );
            let hook_point = self.state_change_event((old, new), events);
            events.add_hook(event, hook_point);
            self.pending_course_events.push(event);
            day_events.push((transition_date, event));
        }
        self.course = Some(course);
        day_events
    }

    /// A day event on `date + delay` that makes this person immune if they are still susceptible
    /// or latent by then.
    pub fn immune(&self, date: Date, delay: u32, events: &mut EventArena) -> (Date, EventId) {
        let when = date + delay;
        let event = events.create(Trigger::Day(when), Effect::Immunize { person: self.id });
        (when, event)
    }

    /// Returns false if the person had already progressed past latent.
    pub(crate) fn immunize(&mut self, events: &mut EventArena) -> bool {
        match self.state {
            DiseaseState::Susceptible => {}
            DiseaseState::Latent => {
                for event in self.pending_course_events.drain(..) {
                    events.cancel(event);
                }
            }
            _ => return false,
        }
        self.state = DiseaseState::Immune;
        self.changed = true;
        true
    }

    /// Panics if the current state is not `old`.
    pub(crate) fn change_state(&mut self, date: Date, old: DiseaseState, new: DiseaseState) {
        assert_eq!(
            self.state, old,
            "{} is {}, cannot move {} -> {}",
            self.id, self.state, old, new
        );
        self.state = new;
        self.changed = true;
        match new {
            DiseaseState::SymptomaticInfectious => self.symptomatic_date = Some(date),
            DiseaseState::Critical => self.ever_critical = true,
            _ if new.is_terminal() => self.pending_course_events.clear(),
            _ => {}
        }
    }

    pub fn add_routine_change(&mut self, key: RoutineChangeKey, change: RoutineChange) {
        if self.routine.add(key, change) {
            self.changed = true;
        }
    }

    pub fn remove_routine_change(&mut self, key: &RoutineChangeKey) {
        if self.routine.remove(key) {
            self.changed = true;
        }
    }

    /// Re-signs a changed person up to each of their environments.
    pub fn register_attendance(
        &mut self,
        environments: &mut [Environment],
        factors: &InfectiousnessFactors,
    ) {
        if self.changed {
            self.sign_up(environments, factors);
        }
    }

    pub(crate) fn sign_up(
        &mut self,
        environments: &mut [Environment],
        factors: &InfectiousnessFactors,
    ) {
        for (kind, env) in self.environments() {
            environments[env.0].sign_up(self, self.routine.weight(kind), factors);
        }
        self.changed = false;
    }

    /// The event applied right after this person makes the `transition`.
    pub fn state_change_event(&mut self, transition: Transition, events: &mut EventArena) -> EventId {
        if let Some((_, event)) = self.state_events.iter().find(|(t, _)| *t == transition) {
            return *event;
        }
        let event = events.create(Trigger::Empty, Effect::NoOp);
        self.state_events.push((transition, event));
        event
    }

    pub fn hook_on_change(&mut self, transition: Transition, hook: EventId, events: &mut EventArena) {
        let event = self.state_change_event(transition, events);
        events.add_hook(event, hook);
    }

    pub fn save_state(&mut self) {
        self.last_state = self.state;
        self.changed = false;
    }

    #[cfg(test)]
    pub(crate) fn force_state(&mut self, state: DiseaseState) {
        self.state = state;
        self.changed = true;
    }
}

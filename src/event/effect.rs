use serde::{Deserialize, Serialize};

use super::{EventArena, EventContext, EventId};
use crate::disease::DiseaseState;
use crate::environment::{EnvironmentId, InterventionState};
use crate::log::trace;
use crate::person::PersonId;
use crate::routine::{RoutineChange, RoutineChangeKey};

/// What an event does when it applies.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub enum Effect {
    #[default]
    NoOp,
    /// Panics if the person is not in `old`.
    DiseaseStateChange {
        person: PersonId,
        old: DiseaseState,
        new: DiseaseState,
    },
    AddRoutineChange {
        person: PersonId,
        key: RoutineChangeKey,
        change: RoutineChange,
    },
    RemoveRoutineChange {
        person: PersonId,
        key: RoutineChangeKey,
    },
    /// Adds the change to every member of the environment.
    AddRoutineChangeEnvironment {
        env: EnvironmentId,
        key: RoutineChangeKey,
        change: RoutineChange,
    },
    RemoveRoutineChangeEnvironment {
        env: EnvironmentId,
        key: RoutineChangeKey,
    },
    /// Panics if the environment is not in `old`.
    ChangeEnvInterventionState {
        env: EnvironmentId,
        old: InterventionState,
        new: InterventionState,
    },
    /// Registers `event` on the plan `days` after the day this applies. With `days == 0` it
    /// runs later the same day.
    Delayed { event: EventId, days: u32 },
    /// Susceptible or latent people become immune; anyone further along is unaffected.
    Immunize { person: PersonId },
}

impl Effect {
    pub(super) fn run(self, events: &mut EventArena, ctx: &mut EventContext) {
        let world = &mut *ctx.world;
        match self {
            Effect::NoOp => {}
            Effect::DiseaseStateChange { person, old, new } => {
                world.person_mut(person).change_state(ctx.date, old, new);
            }
            Effect::AddRoutineChange {
                person,
                key,
                change,
            } => world.person_mut(person).add_routine_change(key, change),
            Effect::RemoveRoutineChange { person, key } => {
                world.person_mut(person).remove_routine_change(&key);
            }
            Effect::AddRoutineChangeEnvironment { env, key, change } => {
                let members = world.environment(env).members().to_vec();
                for member in members {
                    world.person_mut(member).add_routine_change(key.clone(), change);
                }
            }
            Effect::RemoveRoutineChangeEnvironment { env, key } => {
                let members = world.environment(env).members().to_vec();
                for member in members {
                    world.person_mut(member).remove_routine_change(&key);
                }
            }
            Effect::ChangeEnvInterventionState { env, old, new } => {
                world
                    .environment_mut(env)
                    .change_intervention_state(old, new);
            }
            Effect::Delayed { event, days } => {
                ctx.plan.register(ctx.date + days, event, events, ctx.date);
            }
            Effect::Immunize { person } => {
                if !world.person_mut(person).immunize(events) {
                    trace!("{}: {person} already past latent, not immunized", ctx.date);
                }
            }
        }
    }
}

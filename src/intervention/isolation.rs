//! Isolation hooked on symptom onset. Nothing here touches the plan directly: the events hang
//! off each complying person's `incubating_post_latent -> symptomatic_infectious` transition and
//! off their recovery transitions.

use crate::environment::EnvironmentKind;
use crate::event::{Effect, EventId, Trigger};
use crate::params::TemplateName;
use crate::person::PersonId;
use crate::routine::RoutineChangeKey;

use super::{after_any, recovery_events, CompileContext, Intervention, SYMPTOM_ONSET};

/// Hooks `add` on symptom onset, `delay` days later, provided onset falls in the intervention's
/// time range.
fn hook_entry(
    intervention: &Intervention,
    ctx: &mut CompileContext,
    person: PersonId,
    add: EventId,
    delay: u32,
) {
    let entry = ctx.events.create(
        intervention.time_range(),
        Effect::Delayed {
            event: add,
            days: delay,
        },
    );
    ctx.world
        .person_mut(person)
        .hook_on_change(SYMPTOM_ONSET, entry, ctx.events);
}

/// Creates `exit` so it applies once `person` has recovered and `entered` has applied, whichever
/// comes last.
fn exit_after_recovery(
    ctx: &mut CompileContext,
    person: PersonId,
    entered: EventId,
    effect: Effect,
) -> EventId {
    let recovered = recovery_events(ctx, person);
    let exit = ctx.events.create(
        Trigger::And(vec![after_any(&recovered), Trigger::After(entered)]),
        effect,
    );
    for event in recovered {
        ctx.events.add_hook(event, exit);
    }
    ctx.events.add_hook(entered, exit);
    exit
}

/// The symptomatic person quarantines until they recover or die.
pub(super) fn symptomatic_isolation(
    intervention: &Intervention,
    ctx: &mut CompileContext,
    delay: u32,
) {
    let change = ctx.templates.get(TemplateName::Quarantine).to_change();
    for person in 0..ctx.world.num_people() {
        let person = PersonId(person);
        if !ctx.complies(intervention.compliance) {
            continue;
        }
        let add = ctx.events.create(
            Trigger::Empty,
            Effect::AddRoutineChange {
                person,
                key: RoutineChangeKey::Quarantine,
                change,
            },
        );
        hook_entry(intervention, ctx, person, add, delay);
        exit_after_recovery(
            ctx,
            person,
            add,
            Effect::RemoveRoutineChange {
                person,
                key: RoutineChangeKey::Quarantine,
            },
        );
    }
}

/// The whole household of a symptomatic person isolates. It leaves either `delay_on_exit` days
/// after entering, or `delay_on_exit` days after the symptomatic person recovers.
pub(super) fn household_isolation(
    intervention: &Intervention,
    ctx: &mut CompileContext,
    delay_on_enter: u32,
    delay_on_exit: u32,
    is_exit_after_recovery: bool,
) {
    let change = ctx.templates.get(TemplateName::HouseholdIsolation).to_change();
    for person in 0..ctx.world.num_people() {
        let person = PersonId(person);
        let Some(household) = ctx
            .world
            .get_person(person)
            .environment(EnvironmentKind::Household)
        else {
            continue;
        };
        if !ctx.complies(intervention.compliance) {
            continue;
        }
        let add = ctx.events.create(
            Trigger::Empty,
            Effect::AddRoutineChangeEnvironment {
                env: household,
                key: RoutineChangeKey::HouseholdIsolation,
                change,
            },
        );
        hook_entry(intervention, ctx, person, add, delay_on_enter);

        let remove = ctx.events.create(
            Trigger::Empty,
            Effect::RemoveRoutineChangeEnvironment {
                env: household,
                key: RoutineChangeKey::HouseholdIsolation,
            },
        );
        let delayed_remove = Effect::Delayed {
            event: remove,
            days: delay_on_exit,
        };
        if is_exit_after_recovery {
            exit_after_recovery(ctx, person, add, delayed_remove);
        } else {
            let exit = ctx.events.create(Trigger::Empty, delayed_remove);
            ctx.events.add_hook(add, exit);
        }
    }
}

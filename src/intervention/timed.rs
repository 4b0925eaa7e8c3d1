//! Interventions that add a routine change on the start date and remove it on the end date for
//! every complying person matching a predicate.

use crate::environment::EnvironmentKind;
use crate::error::{config_error, EpiError};
use crate::event::{Effect, EventId, Trigger};
use crate::params::TemplateName;
use crate::person::PersonId;
use crate::routine::{RoutineChange, RoutineChangeKey};
use crate::time::Date;

use super::{CompileContext, Intervention};

/// Add on `start`, remove on `end`.
pub(super) fn add_remove_pair(
    ctx: &mut CompileContext,
    person: PersonId,
    key: RoutineChangeKey,
    change: RoutineChange,
    start: Date,
    end: Date,
) -> [(Date, EventId); 2] {
    let add = ctx.events.create(
        Trigger::Day(start),
        Effect::AddRoutineChange {
            person,
            key: key.clone(),
            change,
        },
    );
    let remove = ctx
        .events
        .create(Trigger::Day(end), Effect::RemoveRoutineChange { person, key });
    [(start, add), (end, remove)]
}

fn for_matching_people(
    intervention: &Intervention,
    ctx: &mut CompileContext,
    key: &RoutineChangeKey,
    template: TemplateName,
    matches: impl Fn(&crate::person::Person) -> bool,
) -> Vec<(Date, EventId)> {
    let change = ctx.templates.get(template).to_change();
    let candidates: Vec<PersonId> = ctx
        .world
        .all_people()
        .iter()
        .filter(|p| matches(p))
        .map(|p| p.id())
        .collect();
    let mut day_events = Vec::new();
    for person in candidates {
        if !ctx.complies(intervention.compliance) {
            continue;
        }
        day_events.extend(add_remove_pair(
            ctx,
            person,
            key.clone(),
            change,
            intervention.start_date,
            intervention.end_date(),
        ));
    }
    day_events
}

pub(super) fn social_distancing(
    intervention: &Intervention,
    ctx: &mut CompileContext,
    min_age: u32,
    max_age: u32,
) -> Vec<(Date, EventId)> {
    for_matching_people(
        intervention,
        ctx,
        &RoutineChangeKey::SocialDistancing,
        TemplateName::SocialDistancing,
        |p| (min_age..=max_age).contains(&p.age()),
    )
}

pub(super) fn elderly_quarantine(
    intervention: &Intervention,
    ctx: &mut CompileContext,
    min_age: u32,
) -> Vec<(Date, EventId)> {
    for_matching_people(
        intervention,
        ctx,
        &RoutineChangeKey::ElderlyQuarantine,
        TemplateName::Quarantine,
        |p| p.age() >= min_age,
    )
}

pub(super) fn workplace_closure(
    intervention: &Intervention,
    ctx: &mut CompileContext,
) -> Vec<(Date, EventId)> {
    for_matching_people(
        intervention,
        ctx,
        &RoutineChangeKey::WorkplaceClosure,
        TemplateName::WorkplaceClosure,
        |p| p.environment(EnvironmentKind::Workplace).is_some(),
    )
}

/// Residents get the in-city template. Outsiders with any environment in the city get the
/// crossing template on exactly those environment kinds.
pub(super) fn city_curfew(
    intervention: &Intervention,
    ctx: &mut CompileContext,
    city_name: &str,
) -> Result<Vec<(Date, EventId)>, EpiError> {
    if ctx.world.get_city_community(city_name).is_none() {
        return Err(config_error(format!("city_curfew: unknown city {city_name:?}")));
    }
    let key = RoutineChangeKey::CityCurfew {
        city: city_name.to_string(),
    };
    let in_city = ctx.templates.get(TemplateName::CityCurfew).to_change();
    let crossing = ctx.templates.get(TemplateName::CityCurfewCrossing);

    let mut affected: Vec<(PersonId, RoutineChange)> = Vec::new();
    for person in ctx.world.all_people() {
        if ctx.world.residence_city(person.id()) == Some(city_name) {
            affected.push((person.id(), in_city));
            continue;
        }
        let kinds_in_city: Vec<EnvironmentKind> = person
            .environments()
            .filter(|(_, env)| ctx.world.environment(*env).city() == Some(city_name))
            .map(|(kind, _)| kind)
            .collect();
        if !kinds_in_city.is_empty() {
            affected.push((
                person.id(),
                crossing.to_change_where(|kind| kinds_in_city.contains(&kind)),
            ));
        }
    }

    let mut day_events = Vec::new();
    for (person, change) in affected {
        if !ctx.complies(intervention.compliance) {
            continue;
        }
        day_events.extend(add_remove_pair(
            ctx,
            person,
            key.clone(),
            change,
            intervention.start_date,
            intervention.end_date(),
        ));
    }
    Ok(day_events)
}

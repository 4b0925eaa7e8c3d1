//! Closing or isolating a proportion of a city's schools.
//!
//! Schools are ordered once per `(city, age segment)` by a random permutation drawn on first use
//! and reused by every later school intervention on the same key. Closure takes a prefix of that
//! order and isolation a suffix, so a closure and an isolation with complementary proportions
//! never pick the same school. A school may be held by one school intervention at a time; a
//! second one picking it on an overlapping day is a configuration error.

use std::collections::BTreeMap;

use crate::environment::{EnvironmentId, EnvironmentKind, InterventionState};
use crate::error::{config_error, EpiError};
use crate::event::{Effect, EventId, Trigger};
use crate::params::TemplateName;
use crate::person::PersonId;
use crate::random::permutation;
use crate::routine::RoutineChangeKey;
use crate::time::Date;

use super::timed::add_remove_pair;
use super::{CompileContext, Intervention, Period, SchoolSelection};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Mode {
    Closure,
    Isolation,
}

impl Mode {
    fn state(self) -> InterventionState {
        match self {
            Mode::Closure => InterventionState::Closed,
            Mode::Isolation => InterventionState::Isolated,
        }
    }

    fn key(self) -> RoutineChangeKey {
        match self {
            Mode::Closure => RoutineChangeKey::SchoolClosure,
            Mode::Isolation => RoutineChangeKey::SchoolIsolation,
        }
    }

    fn template(self) -> TemplateName {
        match self {
            Mode::Closure => TemplateName::SchoolClosure,
            Mode::Isolation => TemplateName::SchoolIsolation,
        }
    }

    /// The schools this mode takes out of a shuffled order of `n`.
    fn chosen(self, order: &[EnvironmentId], proportion: f64) -> &[EnvironmentId] {
        let n = order.len() as f64;
        match self {
            Mode::Closure => &order[..(n * proportion).floor() as usize],
            Mode::Isolation => &order[(n * (1.0 - proportion)).floor() as usize..],
        }
    }
}

/// Shuffled school orders, keyed by city and age segment, and the days each school is already
/// held by an earlier school intervention.
#[derive(Debug, Clone, Default)]
pub struct SchoolOrders {
    orders: BTreeMap<(String, (u32, u32)), Vec<EnvironmentId>>,
    claims: BTreeMap<EnvironmentId, Vec<(Date, Date)>>,
}

fn overlaps(a: (u32, u32), b: (u32, u32)) -> bool {
    a.0 <= b.1 && b.0 <= a.1
}

impl SchoolOrders {
    fn get(ctx: &mut CompileContext, city: &str, segment: (u32, u32)) -> Vec<EnvironmentId> {
        let key = (city.to_string(), segment);
        if let Some(order) = ctx.school_orders.orders.get(&key) {
            return order.clone();
        }
        let schools: Vec<EnvironmentId> = ctx
            .world
            .environments_of_kind(EnvironmentKind::School)
            .filter(|env| env.city() == Some(city))
            .filter(|env| env.age_range().is_some_and(|range| overlaps(range, segment)))
            .map(|env| env.id())
            .collect();
        let order: Vec<EnvironmentId> = permutation(&mut *ctx.rng, schools.len())
            .into_iter()
            .map(|i| schools[i])
            .collect();
        ctx.school_orders.orders.insert(key, order.clone());
        order
    }

    /// Reserves `school` from `start` through `end`, both inclusive, so that one intervention
    /// reopening a school and another closing it never share a day.
    fn claim(&mut self, school: EnvironmentId, start: Date, end: Date) -> bool {
        let claims = self.claims.entry(school).or_default();
        if claims.iter().any(|&(from, to)| from <= end && start <= to) {
            return false;
        }
        claims.push((start, end));
        true
    }
}

/// `[start, end)` windows during which people of `phase` are affected.
fn windows(start: Date, end: Date, period: Period, phase: u32) -> Vec<(Date, Date)> {
    let mut windows = Vec::new();
    let mut from = start + period.length * phase;
    while from < end {
        windows.push((from, (from + period.length).min(end)));
        from = from + period.length * period.phases;
    }
    windows
}

pub(super) fn partial_school(
    intervention: &Intervention,
    ctx: &mut CompileContext,
    selection: &SchoolSelection,
    mode: Mode,
) -> Result<Vec<(Date, EventId)>, EpiError> {
    let cities: Vec<String> = match &selection.city_name {
        Some(city) => {
            if ctx.world.get_city_community(city).is_none() {
                return Err(config_error(format!(
                    "{}: unknown city {city:?}",
                    intervention.type_name()
                )));
            }
            vec![city.clone()]
        }
        None => ctx
            .world
            .get_all_city_names()
            .into_iter()
            .map(str::to_string)
            .collect(),
    };

    let change = ctx.templates.get(mode.template()).to_change();
    let (start, end) = (intervention.start_date, intervention.end_date());
    let mut day_events = Vec::new();
    for city in &cities {
        let order = SchoolOrders::get(ctx, city, selection.age_segment);
        for &school in mode.chosen(&order, selection.proportion_of_envs) {
            if !ctx.school_orders.claim(school, start, end) {
                return Err(config_error(format!(
                    "{}: {} is already closed or isolated by another school intervention \
                     between {start} and {end}",
                    intervention.type_name(),
                    ctx.world.environment(school).name()
                )));
            }
            let close = ctx.events.create(
                Trigger::Day(start),
                Effect::ChangeEnvInterventionState {
                    env: school,
                    old: InterventionState::Open,
                    new: mode.state(),
                },
            );
            let reopen = ctx.events.create(
                Trigger::Day(end),
                Effect::ChangeEnvInterventionState {
                    env: school,
                    old: mode.state(),
                    new: InterventionState::Open,
                },
            );
            day_events.push((start, close));
            day_events.push((end, reopen));

            let (first, last) = selection.age_segment;
            let members: Vec<PersonId> = ctx
                .world
                .environment(school)
                .members()
                .iter()
                .copied()
                .filter(|p| (first..=last).contains(&ctx.world.get_person(*p).age()))
                .collect();
            for person in members {
                if !ctx.complies(intervention.compliance) {
                    continue;
                }
                let ranges = match selection.period {
                    None => vec![(start, end)],
                    Some(period) => {
                        let family_name = ctx
                            .world
                            .get_person(person)
                            .environment(EnvironmentKind::Household)
                            .and_then(|home| ctx.world.environment(home).family_name())
                            .unwrap_or(0);
                        windows(start, end, period, family_name % period.phases)
                    }
                };
                for (from, to) in ranges {
                    day_events.extend(add_remove_pair(ctx, person, mode.key(), change, from, to));
                }
            }
        }
    }
    Ok(day_events)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::family_world;
    use super::super::InterventionKind;
    use super::*;
    use crate::event::{EventArena, EventContext};
    use crate::params::test_support::test_params;
    use crate::plan::DayPlan;
    use crate::world::World;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn selection(proportion: f64, period: Option<Period>) -> SchoolSelection {
        SchoolSelection {
            proportion_of_envs: proportion,
            age_segment: (0, 17),
            city_name: None,
            period,
        }
    }

    fn compile(
        world: &mut World,
        events: &mut EventArena,
        orders: &mut SchoolOrders,
        kind: InterventionKind,
    ) -> Result<Vec<(Date, EventId)>, EpiError> {
        compile_at(world, events, orders, Date(0), kind)
    }

    fn compile_at(
        world: &mut World,
        events: &mut EventArena,
        orders: &mut SchoolOrders,
        start_date: Date,
        kind: InterventionKind,
    ) -> Result<Vec<(Date, EventId)>, EpiError> {
        let params = test_params();
        let mut rng = SmallRng::seed_from_u64(1);
        let mut ctx = CompileContext {
            world,
            events,
            rng: &mut rng,
            templates: &params.interventions_routines,
            school_orders: orders,
        };
        Intervention {
            compliance: 1.0,
            start_date,
            duration: 7,
            kind,
        }
        .generate_events(&mut ctx)
    }

    fn school_weight(world: &World, person: usize) -> f64 {
        world
            .get_person(PersonId(person))
            .routine()
            .weight(EnvironmentKind::School)
    }

    #[test]
    fn chosen_prefix_and_suffix_are_disjoint() {
        let order: Vec<EnvironmentId> = (0..10).map(EnvironmentId).collect();
        let closed = Mode::Closure.chosen(&order, 0.3);
        let isolated = Mode::Isolation.chosen(&order, 0.7);
        assert_eq!(closed.len(), 3);
        assert_eq!(isolated.len(), 7);
        assert!(closed.iter().all(|s| !isolated.contains(s)));
        assert!(Mode::Closure.chosen(&order, 0.0).is_empty());
        assert!(Mode::Isolation.chosen(&order, 0.0).is_empty());
    }

    #[test]
    fn period_windows_rotate_by_phase() {
        let period = Period {
            length: 2,
            phases: 2,
        };
        assert_eq!(
            windows(Date(0), Date(7), period, 0),
            vec![(Date(0), Date(2)), (Date(4), Date(6))]
        );
        assert_eq!(
            windows(Date(0), Date(7), period, 1),
            vec![(Date(2), Date(4)), (Date(6), Date(7))]
        );
    }

    #[test]
    fn full_closure_closes_and_reopens() {
        let mut world = family_world();
        let mut events = EventArena::default();
        let mut orders = SchoolOrders::default();
        let day_events = compile(
            &mut world,
            &mut events,
            &mut orders,
            InterventionKind::SchoolClosure(selection(1.0, None)),
        )
        .unwrap();
        assert_eq!(day_events.len(), 6);

        let mut plan = DayPlan::default();
        plan.register_all(day_events, &mut events, Date(0));
        let school = world
            .get_person(PersonId(0))
            .environment(EnvironmentKind::School)
            .unwrap();
        for day in 0..=7 {
            let date = Date(day);
            while let Some(root) = plan.take(date) {
                let mut ctx = EventContext {
                    date,
                    world: &mut world,
                    plan: &mut plan,
                };
                events.apply(root, &mut ctx);
            }
            let closed = day < 7;
            assert_eq!(
                world.environment(school).intervention_state() == InterventionState::Closed,
                closed
            );
            assert_eq!(school_weight(&world, 0), if closed { 0.0 } else { 1.0 });
            assert_eq!(school_weight(&world, 3), if closed { 0.0 } else { 1.0 });
        }
    }

    #[test]
    fn period_mode_alternates_households() {
        let mut world = family_world();
        let mut events = EventArena::default();
        let mut orders = SchoolOrders::default();
        let period = Period {
            length: 2,
            phases: 2,
        };
        let day_events = compile(
            &mut world,
            &mut events,
            &mut orders,
            InterventionKind::SchoolClosure(selection(1.0, Some(period))),
        )
        .unwrap();
        assert_eq!(day_events.len(), 10);

        let mut plan = DayPlan::default();
        plan.register_all(day_events, &mut events, Date(0));
        let expected_family_0 = [0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0];
        for (day, expected) in expected_family_0.iter().enumerate() {
            let date = Date(i32::try_from(day).unwrap());
            while let Some(root) = plan.take(date) {
                let mut ctx = EventContext {
                    date,
                    world: &mut world,
                    plan: &mut plan,
                };
                events.apply(root, &mut ctx);
            }
            assert_eq!(school_weight(&world, 0), *expected, "day {day}");
            if day < 7 {
                assert_eq!(school_weight(&world, 3), 1.0 - *expected, "day {day}");
            }
        }
    }

    #[test]
    fn order_is_shared_between_interventions() {
        let mut world = family_world();
        let mut events = EventArena::default();
        let mut orders = SchoolOrders::default();
        let closure = compile(
            &mut world,
            &mut events,
            &mut orders,
            InterventionKind::SchoolClosure(selection(0.5, None)),
        )
        .unwrap();
        let isolation = compile(
            &mut world,
            &mut events,
            &mut orders,
            InterventionKind::SchoolIsolation(selection(0.5, None)),
        )
        .unwrap();
        // One school: half rounds down for closure and up for isolation.
        assert!(closure.is_empty());
        assert_eq!(isolation.len(), 6);
        assert_eq!(orders.orders.len(), 1);
    }

    #[test]
    fn unknown_city_is_a_config_error() {
        let mut world = family_world();
        let mut events = EventArena::default();
        let mut orders = SchoolOrders::default();
        let mut selection = selection(1.0, None);
        selection.city_name = Some("nowhere".to_string());
        let result = compile(
            &mut world,
            &mut events,
            &mut orders,
            InterventionKind::SchoolIsolation(selection),
        );
        assert!(matches!(result, Err(EpiError::ConfigError(_))));
    }

    fn segment(first: u32, last: u32) -> InterventionKind {
        let mut selection = selection(1.0, None);
        selection.age_segment = (first, last);
        InterventionKind::SchoolClosure(selection)
    }

    #[test]
    fn disjoint_segments_sharing_a_school_are_rejected() {
        let mut world = family_world();
        let mut events = EventArena::default();
        let mut orders = SchoolOrders::default();
        compile(&mut world, &mut events, &mut orders, segment(6, 8)).unwrap();
        let second = compile(&mut world, &mut events, &mut orders, segment(9, 11));
        assert!(matches!(second, Err(EpiError::ConfigError(_))));
    }

    #[test]
    fn back_to_back_closures_of_one_school_are_rejected() {
        let mut world = family_world();
        let mut events = EventArena::default();
        let mut orders = SchoolOrders::default();
        compile_at(&mut world, &mut events, &mut orders, Date(0), segment(6, 8)).unwrap();
        // The first closure reopens on day 7.
        let touching =
            compile_at(&mut world, &mut events, &mut orders, Date(7), segment(9, 11));
        assert!(matches!(touching, Err(EpiError::ConfigError(_))));
    }

    #[test]
    fn separate_closures_of_one_school_run_in_turn() {
        let mut world = family_world();
        let mut events = EventArena::default();
        let mut orders = SchoolOrders::default();
        let mut day_events =
            compile_at(&mut world, &mut events, &mut orders, Date(0), segment(6, 8)).unwrap();
        day_events.extend(
            compile_at(&mut world, &mut events, &mut orders, Date(10), segment(9, 11)).unwrap(),
        );

        let mut plan = DayPlan::default();
        plan.register_all(day_events, &mut events, Date(0));
        let school = world
            .get_person(PersonId(0))
            .environment(EnvironmentKind::School)
            .unwrap();
        for day in 0..=17 {
            let date = Date(day);
            while let Some(root) = plan.take(date) {
                let mut ctx = EventContext {
                    date,
                    world: &mut world,
                    plan: &mut plan,
                };
                events.apply(root, &mut ctx);
            }
            let closed = day < 7 || (10..17).contains(&day);
            assert_eq!(
                world.environment(school).intervention_state() == InterventionState::Closed,
                closed,
                "day {day}"
            );
        }
        // Person 0 is 8 and person 3 is 10.
        assert_eq!(school_weight(&world, 0), 1.0);
        assert_eq!(school_weight(&world, 3), 1.0);
    }
}

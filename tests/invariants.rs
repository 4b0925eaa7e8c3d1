mod common;

use assert_approx_eq::assert_approx_eq;
use common::{household, interventions, kefar_yona, params, random_seed};
use episim::disease::{DiseaseProgression, DiseaseState};
use episim::environment::EnvironmentKind;
use episim::event::{Effect, EventArena, EventContext, Trigger};
use episim::plan::DayPlan;
use episim::rand::rngs::SmallRng;
use episim::rand::SeedableRng;
use episim::routine::{Routine, RoutineChange, RoutineChangeKey};
use episim::seeding::SeedStrategy;
use episim::statistics::Statistics;
use episim::{Date, EpiError, Simulation};
use strum::IntoEnumIterator;

fn busy_simulation(seed: u64) -> Simulation {
    let params = params();
    let world = kefar_yona(&params, 0.05);
    let all = interventions(
        r#"[
            {"type": "social_distancing", "compliance": 0.7, "start_date": 3, "duration": 10,
             "min_age": 20, "max_age": 60},
            {"type": "symptomatic_isolation", "compliance": 0.8, "start_date": 0, "duration": 30},
            {"type": "household_isolation", "compliance": 0.5, "start_date": 0, "duration": 30,
             "delay_on_enter": 1, "delay_on_exit": 7},
            {"type": "school_closure", "compliance": 1.0, "start_date": 5, "duration": 8,
             "proportion_of_envs": 0.5, "age_segment": [6, 11]}
        ]"#,
    );
    Simulation::with_seed_strategy(world, &params, &all, &random_seed(20), seed).unwrap()
}

fn bits(change: &RoutineChange) -> Vec<u64> {
    EnvironmentKind::iter()
        .map(|kind| change.weight(kind).to_bits())
        .collect()
}

#[test]
fn routine_is_the_product_of_active_changes() {
    let mut simulation = busy_simulation(1);
    for _ in 0..20 {
        simulation.simulate_day();
        for person in simulation.world().all_people() {
            let routine = person.routine();
            for kind in EnvironmentKind::iter() {
                let product: f64 = routine
                    .active_changes()
                    .map(|(_, change)| change.weight(kind))
                    .product();
                assert_eq!(routine.weight(kind), product, "{} {kind}", person.id());
            }
        }
    }
}

#[test]
fn infection_record_iff_ever_infected() {
    let mut simulation = busy_simulation(2);
    simulation.run_simulation(30, "records", &[]);
    for person in simulation.world().all_people() {
        assert_eq!(person.infection().is_some(), person.course().is_some());
        if person.state().is_infected() {
            assert!(person.infection().is_some());
        }
        if person.state().is_susceptible() {
            assert!(person.infection().is_none());
        }
    }
}

#[test]
fn attendance_matches_routine_weights() {
    let mut simulation = busy_simulation(3);
    for _ in 0..20 {
        simulation.simulate_day();
        let world = simulation.world();
        for env in world.all_environments() {
            let attended: f64 = env.attendance().values().sum();
            let alive_weights: f64 = env
                .members()
                .iter()
                .map(|id| world.get_person(*id))
                .filter(|p| !p.state().is_dead())
                .map(|p| p.routine().weight(env.kind()))
                .sum();
            let all_weights: f64 = env
                .members()
                .iter()
                .map(|id| world.get_person(*id).routine().weight(env.kind()))
                .sum();
            assert_approx_eq!(attended, alive_weights, 1e-9);
            assert!(attended <= all_weights + 1e-9);
        }
    }
}

#[test]
fn after_fires_only_once_its_event_applied() {
    let mut world = household(&[30], 0.0);
    let mut events = EventArena::default();
    let mut plan = DayPlan::default();
    let first = events.create(Trigger::Empty, Effect::NoOp);
    let second = events.create(Trigger::After(first), Effect::NoOp);
    let mut ctx = EventContext {
        date: Date(0),
        world: &mut world,
        plan: &mut plan,
    };

    events.apply(second, &mut ctx);
    assert!(!events.is_applied(second));
    events.apply(first, &mut ctx);
    events.apply(second, &mut ctx);
    assert!(events.is_applied(first));
    assert!(events.is_applied(second));
    assert_eq!(events.applied_count(), 2);
}

#[test]
fn applied_events_never_exceed_created_events() {
    let mut simulation = busy_simulation(4);
    simulation.run_simulation(30, "counts", &[]);
    let events = simulation.events();
    assert!(events.applied_count() <= events.len());
    assert!(events.pending_count() + events.applied_count() <= events.len());
    assert!(events.pending_count() < events.len());
}

#[test]
fn courses_start_latent_and_end_terminal() {
    let params = params();
    let progression = DiseaseProgression::new(&params.disease_parameters).unwrap();
    let mut rng = SmallRng::seed_from_u64(5);
    for age in (0..=95).step_by(5) {
        for _ in 0..50 {
            let course = progression.sample_course(age, &mut rng);
            let stages = course.stages();
            assert_eq!(stages[0].0, DiseaseState::Latent);
            assert!(course.final_state().is_terminal());
            let durations: u32 = stages.iter().filter_map(|(_, days)| *days).sum();
            assert_eq!(durations, course.total_days());
            assert!(stages[..stages.len() - 1].iter().all(|(_, d)| d.is_some()));
        }
    }
}

#[test]
fn secondary_credit_sums_to_new_infections() {
    let mut simulation = busy_simulation(5);
    for _ in 0..25 {
        simulation.simulate_day();
        let world = simulation.world();
        let credited: f64 = world
            .all_people()
            .iter()
            .map(|p| p.secondary_infections())
            .sum();
        let transmitted = world
            .all_people()
            .iter()
            .filter_map(|p| p.infection())
            .filter(|record| record.environment_kind != EnvironmentKind::InitialGroup)
            .count();
        assert_approx_eq!(credited, transmitted as f64, 1e-6);
    }
}

#[test]
fn add_then_remove_restores_the_routine() {
    let mut routine = Routine::default();
    routine.add(
        RoutineChangeKey::SocialDistancing,
        RoutineChange::uniform(0.5).with(EnvironmentKind::Household, 1.0),
    );
    let before = bits(routine.effective());

    let isolation = RoutineChange::uniform(0.0).with(EnvironmentKind::Household, 1.0);
    routine.add(RoutineChangeKey::HouseholdIsolation, isolation);
    assert_ne!(bits(routine.effective()), before);
    routine.remove(&RoutineChangeKey::HouseholdIsolation);
    assert_eq!(bits(routine.effective()), before);
}

#[test]
fn repeated_adds_need_as_many_removes() {
    let mut routine = Routine::default();
    let before = bits(routine.effective());
    let closure = RoutineChange::identity().with(EnvironmentKind::School, 0.0);
    routine.add(RoutineChangeKey::SchoolClosure, closure);
    routine.add(RoutineChangeKey::SchoolClosure, closure);
    assert_eq!(routine.multiplicity(&RoutineChangeKey::SchoolClosure), 2);
    routine.remove(&RoutineChangeKey::SchoolClosure);
    assert_eq!(routine.weight(EnvironmentKind::School), 0.0);
    routine.remove(&RoutineChangeKey::SchoolClosure);
    assert_eq!(bits(routine.effective()), before);
}

#[test]
fn statistics_survive_bincode() {
    let mut simulation = busy_simulation(6);
    simulation.run_simulation(15, "bytes", &[]);
    let statistics = simulation.statistics();
    let decoded = Statistics::from_bytes(&statistics.to_bytes().unwrap()).unwrap();
    assert_eq!(&decoded, statistics);
}

#[test]
fn zero_base_infectiousness_means_no_transmission() {
    let params = params()
        .with_overrides(&serde_json::json!({"person": {"base_infectiousness": 0.0}}))
        .unwrap();
    let world = kefar_yona(&params, 0.1);
    let mut simulation =
        Simulation::with_seed_strategy(world, &params, &[], &random_seed(15), 7).unwrap();
    simulation.run_simulation(40, "silent", &[]);
    assert_eq!(simulation.statistics().infections().len(), 15);
    assert!(simulation
        .world()
        .all_people()
        .iter()
        .all(|p| p.secondary_infections() == 0.0));
}

#[test]
fn zero_contacts_means_no_transmission() {
    let mut params = params();
    params.population.household_avg_daily_contacts = 0.0;
    params.population.community_avg_daily_contacts = 0.0;
    params.population.city_avg_daily_contacts = 0.0;
    for env in &mut params.city_environments {
        env.average_daily_contacts = 0.0;
    }
    let world = kefar_yona(&params, 0.1);
    let mut simulation =
        Simulation::with_seed_strategy(world, &params, &[], &random_seed(15), 8).unwrap();
    simulation.run_simulation(40, "no_contacts", &[]);
    assert_eq!(simulation.statistics().infections().len(), 15);
}

#[test]
fn zero_routine_weights_mean_no_transmission() {
    let params = params();
    let world = kefar_yona(&params, 0.1);
    let lockdown = interventions(
        r#"[{"type": "social_distancing", "compliance": 1.0, "start_date": 0, "duration": 40,
             "min_age": 0, "max_age": 200},
            {"type": "household_isolation", "compliance": 1.0, "start_date": 0, "duration": 40}]"#,
    );
    let mut params = params;
    params
        .interventions_routines
        .0
        .values_mut()
        .for_each(|template| template.0 = [("other".to_string(), 0.0)].into());
    let mut simulation =
        Simulation::with_seed_strategy(world, &params, &lockdown, &random_seed(15), 9).unwrap();
    simulation.run_simulation(40, "lockdown", &[]);
    assert_eq!(simulation.statistics().infections().len(), 15);
}

#[test]
fn household_isolation_records_only_household_infections() {
    let params = params()
        .with_overrides(&serde_json::json!({
            "disease_parameters": {"infectiousness_per_stage": {
                "asymptomatic_infectious": 0.0,
                "incubating_post_latent": 0.0
            }}
        }))
        .unwrap();
    let world = kefar_yona(&params, 0.2);
    let isolation = interventions(
        r#"[{"type": "household_isolation", "compliance": 1.0, "start_date": 0, "duration": 250}]"#,
    );
    let mut simulation =
        Simulation::with_seed_strategy(world, &params, &isolation, &random_seed(30), 10).unwrap();
    simulation.run_simulation(60, "isolated", &[]);
    for record in simulation.statistics().infections() {
        assert!(
            matches!(
                record.environment_kind,
                EnvironmentKind::Household | EnvironmentKind::InitialGroup
            ),
            "infected in {}",
            record.environment_kind
        );
    }
}

#[test]
fn closed_schools_infect_nobody_in_the_band() {
    let params = params();
    let world = kefar_yona(&params, 0.2);
    let closure = interventions(
        r#"[{"type": "school_closure", "compliance": 1.0, "start_date": 0, "duration": 250,
             "proportion_of_envs": 1.0, "age_segment": [6, 17]}]"#,
    );
    let mut simulation =
        Simulation::with_seed_strategy(world, &params, &closure, &random_seed(30), 11).unwrap();
    simulation.run_simulation(60, "closed", &[]);
    let world = simulation.world();
    for record in simulation.statistics().infections() {
        let age = world.get_person(record.infectee).age();
        if (6..=17).contains(&age) {
            assert_ne!(record.environment_kind, EnvironmentKind::School);
        }
    }
}

#[test]
fn school_closures_competing_for_one_school_fail_at_startup() {
    let params = params();
    let world = kefar_yona(&params, 0.1);
    let closures = interventions(
        r#"[{"type": "school_closure", "compliance": 1.0, "start_date": 0, "duration": 20,
             "proportion_of_envs": 1.0, "age_segment": [6, 8]},
            {"type": "school_closure", "compliance": 1.0, "start_date": 0, "duration": 20,
             "proportion_of_envs": 1.0, "age_segment": [9, 11]}]"#,
    );
    let result = Simulation::with_seed_strategy(world, &params, &closures, &random_seed(10), 13);
    assert!(matches!(result, Err(EpiError::ConfigError(_))));
}

#[test]
fn school_closures_in_turn_share_schools() {
    let params = params();
    let world = kefar_yona(&params, 0.1);
    let closures = interventions(
        r#"[{"type": "school_closure", "compliance": 1.0, "start_date": 0, "duration": 10,
             "proportion_of_envs": 1.0, "age_segment": [6, 8]},
            {"type": "school_closure", "compliance": 1.0, "start_date": 12, "duration": 10,
             "proportion_of_envs": 1.0, "age_segment": [9, 11]}]"#,
    );
    let mut simulation =
        Simulation::with_seed_strategy(world, &params, &closures, &random_seed(10), 14).unwrap();
    let summary = simulation.run_simulation(25, "closures_in_turn", &[]);
    assert_eq!(summary.days_run, 25);
}

#[test]
fn immunizing_ninety_percent() {
    let params = params();
    let world = kefar_yona(&params, 0.1);
    let population = world.num_people();
    let strategy: SeedStrategy = serde_json::from_str(
        r#"{"mode": "random", "num_to_infect": 10, "percent_to_immune": 0.9}"#,
    )
    .unwrap();
    let mut simulation = Simulation::with_seed_strategy(world, &params, &[], &strategy, 12).unwrap();
    simulation.run_simulation(30, "immunized", &[]);
    let immune = simulation.statistics().summary(None)["Total immune"];
    assert!(
        immune as f64 >= 0.89 * population as f64,
        "{immune} of {population} immune"
    );
}

//! Who is infected and who is immune before the first day.
//!
//! A random seed optionally schedules immunizations for a share of the eligible population,
//! picked in one of several orders and paced over days, and then infects people picked uniformly
//! at random among everyone else. A smart seed instead runs a mock simulation with no
//! interventions on a copy of the world until every named city has enough symptomatic people,
//! and replays those people's disease courses into the real simulation so that they turn
//! symptomatic on its first day.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::disease::{Course, DiseaseState};
use crate::environment::EnvironmentKind;
use crate::error::{config_error, EpiError};
use crate::hashing::HashSet;
use crate::log::{info, warn};
use crate::params::Params;
use crate::person::PersonId;
use crate::random::sample_without_replacement;
use crate::simulation::Simulation;
use crate::time::Date;
use crate::world::{World, INITIAL_GROUP};

/// Longest the smart seed's mock simulation may run before giving up.
pub const MOCK_DAY_BUDGET: u32 = 365;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SeedStrategy {
    Random(InitialInfectionParams),
    Smart(SmartSeedParams),
}

/// Where the immunized share of the population comes from.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImmuneSource {
    #[default]
    General,
    /// Households in random order, one eligible member at a time.
    Households,
    /// Households in random order; all eligible members of a household on the same day.
    HouseholdsAllAtOnce,
    /// Neighborhoods in random order, one eligible member at a time.
    ByNeighborhood,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImmuneOrder {
    #[default]
    None,
    Ascending,
    Descending,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InitialInfectionParams {
    pub num_to_infect: usize,
    /// Share of the eligible population to immunize, in `[0, 1]`.
    #[serde(default)]
    pub percent_to_immune: f64,
    #[serde(default)]
    pub immune_source: ImmuneSource,
    /// Youngest age eligible for immunization.
    #[serde(default)]
    pub min_age: u32,
    /// Immunizations per day; 0 immunizes everyone on the first day.
    #[serde(default)]
    pub people_per_day: usize,
    #[serde(default)]
    pub order: ImmuneOrder,
    #[serde(default)]
    pub city_name_to_infect: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SmartSeedParams {
    pub initial_symptomatic_num_per_city: BTreeMap<String, usize>,
    pub initial_random_set_for_mock: usize,
}

/// A course realized in the mock run, to be replayed in the real one.
#[derive(Debug, Clone, PartialEq)]
pub struct Replay {
    pub person: PersonId,
    pub course: Course,
}

/// Groups of people immunized together, in immunization order.
fn immunization_groups<R: Rng>(
    world: &World,
    initial: &InitialInfectionParams,
    rng: &mut R,
) -> Vec<Vec<PersonId>> {
    let eligible = |id: &PersonId| {
        let person = world.get_person(*id);
        person.state().is_susceptible() && person.age() >= initial.min_age
    };
    let members_of = |kind: EnvironmentKind, rng: &mut R| -> Vec<Vec<PersonId>> {
        let mut envs: Vec<Vec<PersonId>> = world
            .environments_of_kind(kind)
            .map(|env| env.members().iter().copied().filter(eligible).collect())
            .collect();
        envs.shuffle(rng);
        envs
    };

    let mut groups: Vec<Vec<PersonId>> = match initial.immune_source {
        ImmuneSource::General => {
            let mut people: Vec<PersonId> = world
                .all_people()
                .iter()
                .map(|p| p.id())
                .filter(eligible)
                .collect();
            people.shuffle(rng);
            people.into_iter().map(|id| vec![id]).collect()
        }
        ImmuneSource::Households => members_of(EnvironmentKind::Household, rng)
            .into_iter()
            .flatten()
            .map(|id| vec![id])
            .collect(),
        ImmuneSource::HouseholdsAllAtOnce => members_of(EnvironmentKind::Household, rng)
            .into_iter()
            .filter(|members| !members.is_empty())
            .collect(),
        ImmuneSource::ByNeighborhood => members_of(EnvironmentKind::NeighborhoodCommunity, rng)
            .into_iter()
            .flatten()
            .map(|id| vec![id])
            .collect(),
    };

    let oldest = |group: &Vec<PersonId>| {
        group
            .iter()
            .map(|id| world.get_person(*id).age())
            .max()
            .unwrap_or(0)
    };
    match initial.order {
        ImmuneOrder::None => {}
        ImmuneOrder::Ascending => groups.sort_by_key(oldest),
        ImmuneOrder::Descending => groups.sort_by_key(|g| std::cmp::Reverse(oldest(g))),
    }
    groups
}

/// `(person, days after the first day)` for every scheduled immunization.
///
/// Groups are never split. With whole households the schedule can pass `target` by less than one
/// household, and a day can pass `people_per_day` the same way.
fn pace(groups: Vec<Vec<PersonId>>, target: usize, people_per_day: usize) -> Vec<(PersonId, u32)> {
    let mut schedule = Vec::with_capacity(target);
    let mut day = 0;
    let mut today = 0;
    for group in groups {
        if schedule.len() >= target {
            break;
        }
        for id in group {
            schedule.push((id, day));
            today += 1;
        }
        if people_per_day > 0 && today >= people_per_day {
            day += 1;
            today = 0;
        }
    }
    schedule
}

pub(crate) fn random_seed(
    simulation: &mut Simulation,
    initial: &InitialInfectionParams,
) -> Result<(), EpiError> {
    if !(0.0..=1.0).contains(&initial.percent_to_immune) {
        return Err(config_error(format!(
            "percent_to_immune {} is not a fraction",
            initial.percent_to_immune
        )));
    }
    if let Some(city) = &initial.city_name_to_infect {
        if simulation.world().get_city_community(city).is_none() {
            return Err(config_error(format!("city_name_to_infect: unknown city {city:?}")));
        }
    }
    let date = simulation.date();
    let (world, events, plan, rng, progression) = simulation.seeding_parts();

    let mut immunized: HashSet<PersonId> = HashSet::default();
    if initial.percent_to_immune > 0.0 {
        let groups = immunization_groups(world, initial, rng);
        let eligible: usize = groups.iter().map(Vec::len).sum();
        let target = (initial.percent_to_immune * eligible as f64).round() as usize;
        let schedule = pace(groups, target, initial.people_per_day);
        for (id, delay) in &schedule {
            let (when, event) = world.get_person(*id).immune(date, *delay, events);
            plan.register(when, event, events, date);
            immunized.insert(*id);
        }
        info!(
            "scheduled {} immunizations out of {eligible} eligible",
            schedule.len()
        );
    }

    let pool: Vec<PersonId> = match &initial.city_name_to_infect {
        Some(city) => world.city_residents(city),
        None => world.all_people().iter().map(|p| p.id()).collect(),
    }
    .into_iter()
    .filter(|id| !immunized.contains(id) && world.get_person(*id).state().is_susceptible())
    .collect();
    if pool.len() < initial.num_to_infect {
        warn!(
            "asked to infect {} people but only {} are available",
            initial.num_to_infect,
            pool.len()
        );
    }
    for id in sample_without_replacement(rng, &pool, initial.num_to_infect) {
        let day_events = world.person_mut(id).infect(
            date,
            INITIAL_GROUP,
            EnvironmentKind::InitialGroup,
            None,
            progression,
            rng,
            events,
        );
        plan.register_all(day_events, events, date);
    }
    Ok(())
}

/// Runs the mock simulation and picks, per city, the first people to turn symptomatic.
pub(crate) fn run_mock(
    world: &World,
    params: &Params,
    smart: &SmartSeedParams,
    seed: u64,
) -> Result<Vec<Replay>, EpiError> {
    for city in smart.initial_symptomatic_num_per_city.keys() {
        if world.get_city_community(city).is_none() {
            return Err(config_error(format!(
                "initial_symptomatic_num_per_city: unknown city {city:?}"
            )));
        }
    }
    let strategy = SeedStrategy::Random(InitialInfectionParams {
        num_to_infect: smart.initial_random_set_for_mock,
        percent_to_immune: 0.0,
        immune_source: ImmuneSource::General,
        min_age: 0,
        people_per_day: 0,
        order: ImmuneOrder::None,
        city_name_to_infect: None,
    });
    let mut mock = Simulation::with_seed_strategy(world.clone(), params, &[], &strategy, seed)?;

    let symptomatic_by_city = |mock: &Simulation| -> BTreeMap<String, Vec<PersonId>> {
        let mut by_city: BTreeMap<String, Vec<(Date, PersonId)>> = BTreeMap::new();
        for person in mock.world().all_people() {
            let Some(date) = person.symptomatic_date() else {
                continue;
            };
            if let Some(city) = mock.world().residence_city(person.id()) {
                by_city
                    .entry(city.to_string())
                    .or_default()
                    .push((date, person.id()));
            }
        }
        by_city
            .into_iter()
            .map(|(city, mut people)| {
                people.sort_unstable();
                (city, people.into_iter().map(|(_, id)| id).collect())
            })
            .collect()
    };
    let satisfied = |by_city: &BTreeMap<String, Vec<PersonId>>| {
        smart
            .initial_symptomatic_num_per_city
            .iter()
            .all(|(city, n)| by_city.get(city).map_or(0, Vec::len) >= *n)
    };

    let mut days = 0;
    let mut by_city = symptomatic_by_city(&mock);
    while !satisfied(&by_city) {
        if days == MOCK_DAY_BUDGET {
            return Err(EpiError::SimulationError(format!(
                "smart seed: mock simulation did not reach {:?} symptomatic people within {} days",
                smart.initial_symptomatic_num_per_city, MOCK_DAY_BUDGET
            )));
        }
        mock.simulate_day();
        days += 1;
        by_city = symptomatic_by_city(&mock);
    }
    info!("smart seed: mock simulation reached its targets after {days} days");

    let mut replays = Vec::new();
    for (city, n) in &smart.initial_symptomatic_num_per_city {
        for id in by_city[city].iter().take(*n) {
            let course = mock
                .world()
                .get_person(*id)
                .course()
                .cloned()
                .ok_or_else(|| EpiError::SimulationError(format!("{id} has no course")))?;
            replays.push(Replay {
                person: *id,
                course,
            });
        }
    }
    Ok(replays)
}

/// Infects each replayed person so that they turn symptomatic on the simulation's first day.
pub(crate) fn replay(simulation: &mut Simulation, replays: &[Replay]) {
    let date = simulation.date();
    let (world, events, plan, _, _) = simulation.seeding_parts();
    for replay in replays {
        let to_symptoms = replay
            .course
            .offset_of(DiseaseState::SymptomaticInfectious)
            .unwrap_or(0);
        let infection_date = Date(date.0 - i32::try_from(to_symptoms).unwrap_or(i32::MAX));
        let day_events = world.person_mut(replay.person).infect_with_course(
            infection_date,
            INITIAL_GROUP,
            EnvironmentKind::InitialGroup,
            None,
            replay.course.clone(),
            Some(date),
            events,
        );
        plan.register_all(day_events, events, date);
    }
    info!("smart seed: replayed {} courses", replays.len());
}

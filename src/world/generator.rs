//! Synthetic cities. Each city gets households sized by its household-size distribution, people
//! aged by its age distribution, neighborhood communities of roughly
//! `community_approx_size` people, one city community, and the schools and workplaces listed in
//! `city_environments`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::Gamma;
use serde::{Deserialize, Serialize};

use super::{World, WorldBuilder};
use crate::environment::EnvironmentKind;
use crate::error::{config_error, EpiError};
use crate::log::{debug, info, warn};
use crate::params::{CityEnvironmentParams, FatherEnvironment, Params, AGE_BANDS};
use crate::person::PersonId;
use crate::random::permutation;

/// Largest absolute difference allowed between a target and a realized age-band share.
pub const AGE_DISTRIBUTION_TOLERANCE: f64 = 0.02;

/// Households draw a family name from this many.
const FAMILY_NAMES: u32 = 1000;

const OLDEST_AGE: u32 = 95;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CityDescription {
    pub name: String,
    pub population: usize,
    /// Share of people per ten-year band, the last band being 80+.
    pub age_distribution: Vec<f64>,
    /// Share of households with 1, 2, 3, ... members.
    pub household_size_distribution: Vec<f64>,
}

impl CityDescription {
    fn validate(&self) -> Result<(), EpiError> {
        if self.population == 0 {
            return Err(config_error(format!("city {}: empty population", self.name)));
        }
        if self.age_distribution.len() != AGE_BANDS {
            return Err(config_error(format!(
                "city {}: age_distribution has {} entries, expected {AGE_BANDS}",
                self.name,
                self.age_distribution.len()
            )));
        }
        if self.household_size_distribution.is_empty() {
            return Err(config_error(format!(
                "city {}: empty household_size_distribution",
                self.name
            )));
        }
        Ok(())
    }
}

pub fn load_cities(path: &Path) -> Result<Vec<CityDescription>, EpiError> {
    let cities: Vec<CityDescription> = serde_json::from_str(&fs::read_to_string(path)?)
        .map_err(|e| config_error(format!("invalid city file {}: {e}", path.display())))?;
    for city in &cities {
        city.validate()?;
    }
    Ok(cities)
}

/// Builds one world containing every city in `cities`, each scaled by `scale`.
pub fn generate_world(
    params: &Params,
    cities: &[CityDescription],
    scale: f64,
    seed: u64,
) -> Result<World, EpiError> {
    if !(scale > 0.0 && scale.is_finite()) {
        return Err(config_error(format!("scale {scale} must be positive")));
    }
    let infectiousness = Gamma::new(
        params.person.individual_infectiousness_gamma_shape,
        params.person.individual_infectiousness_gamma_scale,
    )
    .map_err(|e| config_error(format!("individual infectiousness: {e}")))?;

    let mut rng = SmallRng::seed_from_u64(seed);
    let mut builder = WorldBuilder::new();
    for city in cities {
        city.validate()?;
        generate_city(&mut builder, params, city, scale, &infectiousness, &mut rng)?;
    }
    let world = builder.build();
    info!(
        "generated {} people in {} environments",
        world.num_people(),
        world.all_environments().len()
    );
    Ok(world)
}

fn sample_age<R: Rng>(band: usize, rng: &mut R) -> u32 {
    let band = u32::try_from(band).expect("few age bands");
    if band as usize == AGE_BANDS - 1 {
        rng.random_range(band * 10..=OLDEST_AGE)
    } else {
        band * 10 + rng.random_range(0..10)
    }
}

fn generate_city(
    builder: &mut WorldBuilder,
    params: &Params,
    city: &CityDescription,
    scale: f64,
    infectiousness: &Gamma<f64>,
    rng: &mut SmallRng,
) -> Result<(), EpiError> {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let target = ((city.population as f64 * scale).round() as usize).max(1);
    let ages = WeightedIndex::new(&city.age_distribution)
        .map_err(|e| config_error(format!("city {}: age_distribution: {e}", city.name)))?;
    let household_sizes = WeightedIndex::new(&city.household_size_distribution).map_err(|e| {
        config_error(format!(
            "city {}: household_size_distribution: {e}",
            city.name
        ))
    })?;
    let population = &params.population;
    let base_infectiousness = params.person.base_infectiousness;

    let mut band_counts = [0_usize; AGE_BANDS];
    let mut households: Vec<Vec<PersonId>> = Vec::new();
    let mut created = 0;
    while created < target {
        let size = (household_sizes.sample(rng) + 1).min(target - created);
        let members = (0..size)
            .map(|_| {
                let band = ages.sample(rng);
                band_counts[band] += 1;
                let age = sample_age(band, rng);
                let individual = (base_infectiousness * infectiousness.sample(rng)).min(1.0);
                builder.add_person(age, individual)
            })
            .collect();
        households.push(members);
        created += size;
    }
    check_age_distribution(city, &band_counts, target);

    let mut neighborhoods: Vec<Vec<PersonId>> = vec![Vec::new()];
    for (i, members) in households.iter().enumerate() {
        let family = rng.random_range(0..FAMILY_NAMES);
        builder.add_environment_with(
            EnvironmentKind::Household,
            &format!("{} household {i}", city.name),
            members.clone(),
            population.household_avg_daily_contacts,
            |env| env.with_city(&city.name).with_family_name(family),
        );
        let current = neighborhoods.last_mut().expect("starts non-empty");
        current.extend(members);
        if current.len() >= population.community_approx_size {
            neighborhoods.push(Vec::new());
        }
    }
    neighborhoods.retain(|members| !members.is_empty());
    for (i, members) in neighborhoods.iter().enumerate() {
        builder.add_environment_with(
            EnvironmentKind::NeighborhoodCommunity,
            &format!("{} neighborhood {i}", city.name),
            members.clone(),
            population.community_avg_daily_contacts,
            |env| env.with_city(&city.name),
        );
    }
    let everyone: Vec<PersonId> = neighborhoods.concat();
    builder.add_environment_with(
        EnvironmentKind::CityCommunity,
        &city.name,
        everyone.clone(),
        population.city_avg_daily_contacts,
        |env| env.with_city(&city.name),
    );

    for env_params in &params.city_environments {
        let parents: Vec<&[PersonId]> = match env_params.father_name {
            FatherEnvironment::NeighborhoodCommunity => {
                neighborhoods.iter().map(Vec::as_slice).collect()
            }
            FatherEnvironment::CityCommunity => vec![everyone.as_slice()],
        };
        let mut count = 0;
        for parent in parents {
            count += add_city_environments(builder, &city.name, env_params, parent, rng);
        }
        debug!("{}: {count} x {}", city.name, env_params.env_name);
    }
    Ok(())
}

/// Splits the eligible members of `parent` into environments of `env_params.size`. Returns how
/// many were created.
fn add_city_environments(
    builder: &mut WorldBuilder,
    city: &str,
    env_params: &CityEnvironmentParams,
    parent: &[PersonId],
    rng: &mut SmallRng,
) -> usize {
    let (min_age, max_age) = env_params.age_range;
    let mut groups: BTreeMap<u32, Vec<PersonId>> = BTreeMap::new();
    for id in parent {
        let person = builder.person(*id);
        // Overlapping entries of the same kind keep the first assignment.
        if person.age() < min_age
            || person.age() > max_age
            || person.environment(env_params.env_type).is_some()
        {
            continue;
        }
        let group = if env_params.is_per_age { person.age() } else { 0 };
        groups.entry(group).or_default().push(*id);
    }

    let mut created = 0;
    for members in groups.into_values() {
        let order = permutation(rng, members.len());
        let shuffled: Vec<PersonId> = order.into_iter().map(|i| members[i]).collect();
        for chunk in shuffled.chunks(env_params.size) {
            let age_range = env_params.age_range;
            builder.add_environment_with(
                env_params.env_type,
                &format!("{city} {} {created}", env_params.env_name),
                chunk.to_vec(),
                env_params.average_daily_contacts,
                |env| env.with_city(city).with_age_range(age_range),
            );
            created += 1;
        }
    }
    created
}

/// Logs a warning when a realized age band share misses its target by more than the tolerance.
fn check_age_distribution(city: &CityDescription, band_counts: &[usize], total: usize) -> bool {
    let target_total: f64 = city.age_distribution.iter().sum();
    let mut within = true;
    for (band, (count, target)) in band_counts.iter().zip(&city.age_distribution).enumerate() {
        #[allow(clippy::cast_precision_loss)]
        let realized = *count as f64 / total as f64;
        let expected = target / target_total;
        if (realized - expected).abs() > AGE_DISTRIBUTION_TOLERANCE {
            warn!(
                "{}: age band {band} has share {realized:.3}, target {expected:.3}",
                city.name
            );
            within = false;
        }
    }
    within
}

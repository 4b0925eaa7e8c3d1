//! Run configuration loaded from a single JSON file.
//!
//! All five top-level sections are required. [`Params::load`] deserializes and then validates;
//! any problem surfaces as [`EpiError::ConfigError`] before a simulation is constructed.
mod routines;

pub use routines::{RoutineTemplate, RoutineTemplates, TemplateName};

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::disease::InfectiousnessFactors;
use crate::environment::EnvironmentKind;
use crate::error::{config_error, EpiError};
use crate::hashing::hash_serialized;

/// Number of ten-year age bands in the disease tables. The last band is 80+.
pub const AGE_BANDS: usize = 9;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Params {
    pub disease_parameters: DiseaseParameters,
    pub person: PersonParams,
    pub population: PopulationParams,
    pub city_environments: Vec<CityEnvironmentParams>,
    pub interventions_routines: RoutineTemplates,
}

/// Shape and scale of a Gamma distribution truncated to `1..=max_val` days.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct GammaParams {
    pub a: f64,
    pub scale: f64,
    pub max_val: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DiseaseParameters {
    pub infectiousness_per_stage: InfectiousnessFactors,
    pub symptomatic_given_infected_per_age: Vec<f64>,
    pub hospitalization_given_symptomatic_per_age: Vec<f64>,
    pub critical_given_hospitalized_per_age: Vec<f64>,
    pub deceased_given_critical_per_age: Vec<f64>,
    pub latent_period_distribution: GammaParams,
    pub infectious_before_symptomatic_distribution: GammaParams,
    pub infectious_before_immune_distribution: GammaParams,
    pub symptomatic_before_critical_distribution: GammaParams,
    pub symptomatic_before_immune_distribution: GammaParams,
    pub critical_before_deceased_distribution: GammaParams,
    pub critical_before_immune_distribution: GammaParams,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct PersonParams {
    pub base_infectiousness: f64,
    pub individual_infectiousness_gamma_shape: f64,
    pub individual_infectiousness_gamma_scale: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct PopulationParams {
    pub household_avg_daily_contacts: f64,
    pub community_avg_daily_contacts: f64,
    pub city_avg_daily_contacts: f64,
    /// Target number of people per neighborhood community.
    pub community_approx_size: usize,
}

/// Which enclosing environment a school or workplace is drawn from.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FatherEnvironment {
    NeighborhoodCommunity,
    CityCommunity,
}

/// One family of schools or workplaces generated inside each city.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CityEnvironmentParams {
    pub env_name: String,
    pub env_type: EnvironmentKind,
    /// Inclusive age range of the members.
    pub age_range: (u32, u32),
    pub father_name: FatherEnvironment,
    /// Members per environment instance.
    pub size: usize,
    pub average_daily_contacts: f64,
    /// Split members by single year of age before chunking.
    pub is_per_age: bool,
}

fn check_probability(name: &str, value: f64) -> Result<(), EpiError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(config_error(format!("{name} = {value} is not a probability")))
    }
}

fn check_age_table(name: &str, table: &[f64]) -> Result<(), EpiError> {
    if table.len() != AGE_BANDS {
        return Err(config_error(format!(
            "{name} has {} entries, expected {AGE_BANDS}",
            table.len()
        )));
    }
    for value in table {
        check_probability(name, *value)?;
    }
    Ok(())
}

fn check_non_negative(name: &str, value: f64) -> Result<(), EpiError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(config_error(format!("{name} = {value} must be non-negative")))
    }
}

impl GammaParams {
    pub fn validate(&self, name: &str) -> Result<(), EpiError> {
        if !(self.a > 0.0 && self.a.is_finite()) || !(self.scale > 0.0 && self.scale.is_finite()) {
            return Err(config_error(format!(
                "{name}: gamma parameters a = {}, scale = {} out of range",
                self.a, self.scale
            )));
        }
        if self.max_val == 0 {
            return Err(config_error(format!("{name}: max_val must be at least 1")));
        }
        Ok(())
    }
}

impl DiseaseParameters {
    /// The seven stage-duration distributions with their configuration names.
    pub fn distributions(&self) -> [(&'static str, GammaParams); 7] {
        [
            ("latent_period_distribution", self.latent_period_distribution),
            (
                "infectious_before_symptomatic_distribution",
                self.infectious_before_symptomatic_distribution,
            ),
            (
                "infectious_before_immune_distribution",
                self.infectious_before_immune_distribution,
            ),
            (
                "symptomatic_before_critical_distribution",
                self.symptomatic_before_critical_distribution,
            ),
            (
                "symptomatic_before_immune_distribution",
                self.symptomatic_before_immune_distribution,
            ),
            (
                "critical_before_deceased_distribution",
                self.critical_before_deceased_distribution,
            ),
            (
                "critical_before_immune_distribution",
                self.critical_before_immune_distribution,
            ),
        ]
    }

    fn validate(&self) -> Result<(), EpiError> {
        self.infectiousness_per_stage.validate()?;
        check_age_table(
            "symptomatic_given_infected_per_age",
            &self.symptomatic_given_infected_per_age,
        )?;
        check_age_table(
            "hospitalization_given_symptomatic_per_age",
            &self.hospitalization_given_symptomatic_per_age,
        )?;
        check_age_table(
            "critical_given_hospitalized_per_age",
            &self.critical_given_hospitalized_per_age,
        )?;
        check_age_table(
            "deceased_given_critical_per_age",
            &self.deceased_given_critical_per_age,
        )?;
        for (name, gamma) in self.distributions() {
            gamma.validate(name)?;
        }
        Ok(())
    }
}

impl Params {
    /// Reads and validates a configuration file.
    pub fn load(path: &Path) -> Result<Params, EpiError> {
        let contents = fs::read_to_string(path)?;
        Params::from_json_str(&contents)
    }

    pub fn from_json_str(json: &str) -> Result<Params, EpiError> {
        let params: Params = serde_json::from_str(json)
            .map_err(|e| config_error(format!("invalid configuration: {e}")))?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), EpiError> {
        self.disease_parameters.validate()?;

        let person = &self.person;
        check_probability("person.base_infectiousness", person.base_infectiousness)?;
        if person.individual_infectiousness_gamma_shape <= 0.0
            || person.individual_infectiousness_gamma_scale <= 0.0
        {
            return Err(config_error(
                "person: individual infectiousness gamma parameters must be positive",
            ));
        }

        let population = &self.population;
        check_non_negative(
            "household_avg_daily_contacts",
            population.household_avg_daily_contacts,
        )?;
        check_non_negative(
            "community_avg_daily_contacts",
            population.community_avg_daily_contacts,
        )?;
        check_non_negative("city_avg_daily_contacts", population.city_avg_daily_contacts)?;
        if population.community_approx_size == 0 {
            return Err(config_error("community_approx_size must be at least 1"));
        }

        for env in &self.city_environments {
            if !matches!(
                env.env_type,
                EnvironmentKind::School | EnvironmentKind::Workplace
            ) {
                return Err(config_error(format!(
                    "city environment {}: env_type {} is not a school or workplace",
                    env.env_name, env.env_type
                )));
            }
            if env.age_range.0 > env.age_range.1 {
                return Err(config_error(format!(
                    "city environment {}: empty age range {:?}",
                    env.env_name, env.age_range
                )));
            }
            if env.size == 0 {
                return Err(config_error(format!(
                    "city environment {}: size must be at least 1",
                    env.env_name
                )));
            }
            check_non_negative(&env.env_name, env.average_daily_contacts)?;
        }

        self.interventions_routines.validate()
    }

    /// Applies a JSON merge patch (objects merge key by key, anything else replaces) and
    /// validates the result.
    pub fn with_overrides(&self, overrides: &Value) -> Result<Params, EpiError> {
        let mut value = serde_json::to_value(self)?;
        merge_json(&mut value, overrides);
        let params: Params = serde_json::from_value(value)
            .map_err(|e| config_error(format!("invalid parameter overrides: {e}")))?;
        params.validate()?;
        Ok(params)
    }

    /// Fingerprint of the effective parameters.
    pub fn hash(&self) -> u64 {
        hash_serialized(self)
    }
}

fn merge_json(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                merge_json(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

//! Sampling a person's disease course: the branch taken at each stage depends on age, the time
//! spent in each stage is a truncated, discretized Gamma.

use rand::Rng;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, Gamma};

use super::DiseaseState;
use crate::error::{config_error, EpiError};
use crate::params::{DiseaseParameters, GammaParams, AGE_BANDS};
use crate::random::bisect_cumulative;
use crate::time::Date;

/// A Gamma density evaluated at each whole day `1..=max_val` and renormalized.
#[derive(Debug, Clone)]
pub struct DiscreteGamma {
    cumulative: Vec<f64>,
}

impl DiscreteGamma {
    pub fn new(name: &str, params: GammaParams) -> Result<Self, EpiError> {
        params.validate(name)?;
        let gamma = Gamma::new(params.a, 1.0 / params.scale)
            .map_err(|e| config_error(format!("{name}: {e}")))?;
        let mass: Vec<f64> = (1..=params.max_val)
            .map(|day| gamma.pdf(f64::from(day)))
            .collect();
        let total: f64 = mass.iter().sum();
        if !(total > 0.0 && total.is_finite()) {
            return Err(config_error(format!(
                "{name}: no probability mass within 1..={} days",
                params.max_val
            )));
        }
        let mut cumulative = Vec::with_capacity(mass.len());
        let mut running = 0.0;
        for m in mass {
            running += m / total;
            cumulative.push(running);
        }
        Ok(Self { cumulative })
    }

    pub fn probability(&self, days: u32) -> f64 {
        let i = days as usize;
        match i {
            0 => 0.0,
            1 => self.cumulative[0],
            _ if i <= self.cumulative.len() => self.cumulative[i - 1] - self.cumulative[i - 2],
            _ => 0.0,
        }
    }

    /// A duration in whole days, at least 1.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        let u: f64 = rng.random();
        let index = bisect_cumulative(&self.cumulative, u);
        u32::try_from(index).expect("max_val fits in u32") + 1
    }
}

/// A realized disease course. Starts in `Latent`, ends in `Immune` or `Deceased`; every stage
/// except the last carries its duration in days.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Course {
    stages: Vec<(DiseaseState, Option<u32>)>,
}

impl Course {
    /// Panics unless `stages` has the shape described on [`Course`].
    pub fn new(stages: Vec<(DiseaseState, Option<u32>)>) -> Self {
        assert!(
            stages.first().map(|s| s.0) == Some(DiseaseState::Latent),
            "a course must start latent: {stages:?}"
        );
        let (last, last_duration) = *stages.last().expect("checked non-empty");
        assert!(
            last.is_terminal() && last_duration.is_none(),
            "a course must end in a terminal state without duration: {stages:?}"
        );
        assert!(
            stages[..stages.len() - 1]
                .iter()
                .all(|(state, d)| !state.is_terminal() && d.is_some()),
            "only the last stage may be terminal or open-ended: {stages:?}"
        );
        Self { stages }
    }

    pub fn stages(&self) -> &[(DiseaseState, Option<u32>)] {
        &self.stages
    }

    pub fn final_state(&self) -> DiseaseState {
        self.stages[self.stages.len() - 1].0
    }

    /// Days from infection until the course reaches its terminal state.
    pub fn total_days(&self) -> u32 {
        self.stages.iter().filter_map(|(_, d)| *d).sum()
    }

    /// Days from infection until `state` begins, if the course passes through it.
    pub fn offset_of(&self, state: DiseaseState) -> Option<u32> {
        let mut elapsed = 0;
        for (stage, duration) in &self.stages {
            if *stage == state {
                return Some(elapsed);
            }
            elapsed += duration.unwrap_or(0);
        }
        None
    }

    /// `(date, old, new)` for every transition after the initial `Susceptible -> Latent`.
    pub fn transitions(&self, infection_date: Date) -> Vec<(Date, DiseaseState, DiseaseState)> {
        let mut date = infection_date;
        self.stages
            .windows(2)
            .map(|pair| {
                let (old, duration) = pair[0];
                date = date + duration.expect("non-terminal stages have durations");
                (date, old, pair[1].0)
            })
            .collect()
    }
}

/// Age-dependent branching plus the seven stage-duration distributions, built once per run.
#[derive(Debug, Clone)]
pub struct DiseaseProgression {
    symptomatic_given_infected: Vec<f64>,
    hospitalization_given_symptomatic: Vec<f64>,
    critical_given_hospitalized: Vec<f64>,
    deceased_given_critical: Vec<f64>,
    latent: DiscreteGamma,
    infectious_before_symptomatic: DiscreteGamma,
    infectious_before_immune: DiscreteGamma,
    symptomatic_before_critical: DiscreteGamma,
    symptomatic_before_immune: DiscreteGamma,
    critical_before_deceased: DiscreteGamma,
    critical_before_immune: DiscreteGamma,
}

/// Decade band used by the per-age tables; everyone 80 and over shares the last band.
pub fn age_band(age: u32) -> usize {
    (age as usize / 10).min(AGE_BANDS - 1)
}

impl DiseaseProgression {
    pub fn new(params: &DiseaseParameters) -> Result<Self, EpiError> {
        let [latent, infectious_before_symptomatic, infectious_before_immune, symptomatic_before_critical, symptomatic_before_immune, critical_before_deceased, critical_before_immune] =
            params
                .distributions()
                .map(|(name, gamma)| DiscreteGamma::new(name, gamma));
        Ok(Self {
            symptomatic_given_infected: params.symptomatic_given_infected_per_age.clone(),
            hospitalization_given_symptomatic: params
                .hospitalization_given_symptomatic_per_age
                .clone(),
            critical_given_hospitalized: params.critical_given_hospitalized_per_age.clone(),
            deceased_given_critical: params.deceased_given_critical_per_age.clone(),
            latent: latent?,
            infectious_before_symptomatic: infectious_before_symptomatic?,
            infectious_before_immune: infectious_before_immune?,
            symptomatic_before_critical: symptomatic_before_critical?,
            symptomatic_before_immune: symptomatic_before_immune?,
            critical_before_deceased: critical_before_deceased?,
            critical_before_immune: critical_before_immune?,
        })
    }

    pub fn p_symptomatic(&self, age: u32) -> f64 {
        self.symptomatic_given_infected[age_band(age)]
    }

    pub fn p_critical_given_symptomatic(&self, age: u32) -> f64 {
        let band = age_band(age);
        self.hospitalization_given_symptomatic[band] * self.critical_given_hospitalized[band]
    }

    pub fn p_deceased_given_critical(&self, age: u32) -> f64 {
        self.deceased_given_critical[age_band(age)]
    }

    pub fn sample_course<R: Rng + ?Sized>(&self, age: u32, rng: &mut R) -> Course {
        use DiseaseState::{
            AsymptomaticInfectious, Critical, Deceased, Immune, IncubatingPostLatent, Latent,
            SymptomaticInfectious,
        };

        let mut stages = vec![(Latent, Some(self.latent.sample(rng)))];
        if !rng.random_bool(self.p_symptomatic(age)) {
            stages.push((
                AsymptomaticInfectious,
                Some(self.infectious_before_immune.sample(rng)),
            ));
            stages.push((Immune, None));
            return Course::new(stages);
        }

        stages.push((
            IncubatingPostLatent,
            Some(self.infectious_before_symptomatic.sample(rng)),
        ));
        if !rng.random_bool(self.p_critical_given_symptomatic(age)) {
            stages.push((
                SymptomaticInfectious,
                Some(self.symptomatic_before_immune.sample(rng)),
            ));
            stages.push((Immune, None));
            return Course::new(stages);
        }

        stages.push((
            SymptomaticInfectious,
            Some(self.symptomatic_before_critical.sample(rng)),
        ));
        if rng.random_bool(self.p_deceased_given_critical(age)) {
            stages.push((Critical, Some(self.critical_before_deceased.sample(rng))));
            stages.push((Deceased, None));
        } else {
            stages.push((Critical, Some(self.critical_before_immune.sample(rng))));
            stages.push((Immune, None));
        }
        Course::new(stages)
    }
}

//! Disease states and the per-stage infectiousness they carry.
mod progression;

pub use progression::{age_band, Course, DiscreteGamma, DiseaseProgression};

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumCount, EnumIter};

use crate::error::{config_error, EpiError};

#[derive(
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    EnumIter,
    EnumCount,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DiseaseState {
    Susceptible,
    Latent,
    /// Infectious but not yet showing symptoms.
    IncubatingPostLatent,
    AsymptomaticInfectious,
    SymptomaticInfectious,
    Critical,
    Immune,
    Deceased,
}

impl DiseaseState {
    pub fn is_susceptible(self) -> bool {
        self == DiseaseState::Susceptible
    }

    pub fn is_infected(self) -> bool {
        self == DiseaseState::Latent || self.is_infectious()
    }

    pub fn is_infectious(self) -> bool {
        matches!(
            self,
            DiseaseState::IncubatingPostLatent
                | DiseaseState::AsymptomaticInfectious
                | DiseaseState::SymptomaticInfectious
                | DiseaseState::Critical
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DiseaseState::Immune | DiseaseState::Deceased)
    }

    pub fn is_dead(self) -> bool {
        self == DiseaseState::Deceased
    }

    /// Position in declaration order, for per-state tables.
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Multiplier on a person's base infectiousness in each contagious stage.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct InfectiousnessFactors {
    pub incubating_post_latent: f64,
    pub asymptomatic_infectious: f64,
    pub symptomatic_infectious: f64,
    pub critical: f64,
}

impl InfectiousnessFactors {
    pub fn factor(&self, state: DiseaseState) -> f64 {
        match state {
            DiseaseState::IncubatingPostLatent => self.incubating_post_latent,
            DiseaseState::AsymptomaticInfectious => self.asymptomatic_infectious,
            DiseaseState::SymptomaticInfectious => self.symptomatic_infectious,
            DiseaseState::Critical => self.critical,
            _ => 0.0,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), EpiError> {
        let all = [
            self.incubating_post_latent,
            self.asymptomatic_infectious,
            self.symptomatic_infectious,
            self.critical,
        ];
        if all.iter().all(|f| f.is_finite() && *f >= 0.0) {
            Ok(())
        } else {
            Err(config_error(format!(
                "infectiousness_per_stage must be non-negative: {self:?}"
            )))
        }
    }
}

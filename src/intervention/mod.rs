//! Interventions compile into events before day 0.
//!
//! Each intervention has a compliance probability, a start date and a duration. Compliance is
//! decided once per person and intervention with a single Bernoulli draw; non-compliers get no
//! events from that intervention. The compiled events either sit on the plan for fixed dates
//! (time-range interventions) or hang off people's disease transitions (isolation).
mod isolation;
mod school;
mod timed;

pub use school::SchoolOrders;

use rand::rngs::SmallRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::AsRefStr;

use crate::disease::DiseaseState;
use crate::error::{config_error, EpiError};
use crate::event::{EventArena, EventId, Trigger};
use crate::params::RoutineTemplates;
use crate::person::PersonId;
use crate::time::Date;
use crate::world::World;

/// Rotating attendance: complying people are split into `phases` groups by household family name,
/// and each group is under the intervention for `length` days out of every `phases * length`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Period {
    pub length: u32,
    pub phases: u32,
}

/// Parameters shared by the two partial-environment interventions.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SchoolSelection {
    pub proportion_of_envs: f64,
    /// Inclusive age band of the people affected.
    pub age_segment: (u32, u32),
    #[serde(default)]
    pub city_name: Option<String>,
    #[serde(default)]
    pub period: Option<Period>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, AsRefStr)]
#[serde(tag = "type", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InterventionKind {
    SocialDistancing {
        min_age: u32,
        max_age: u32,
    },
    ElderlyQuarantine {
        min_age: u32,
    },
    WorkplaceClosure,
    CityCurfew {
        city_name: String,
    },
    SymptomaticIsolation {
        #[serde(default)]
        delay: u32,
    },
    HouseholdIsolation {
        #[serde(default)]
        delay_on_enter: u32,
        #[serde(default)]
        delay_on_exit: u32,
        #[serde(default)]
        is_exit_after_recovery: bool,
    },
    SchoolClosure(SchoolSelection),
    SchoolIsolation(SchoolSelection),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Intervention {
    pub compliance: f64,
    pub start_date: Date,
    pub duration: u32,
    #[serde(flatten)]
    pub kind: InterventionKind,
}

/// What compiling an intervention may touch.
pub struct CompileContext<'a> {
    pub world: &'a mut World,
    pub events: &'a mut EventArena,
    pub rng: &'a mut SmallRng,
    pub templates: &'a RoutineTemplates,
    pub school_orders: &'a mut SchoolOrders,
}

impl CompileContext<'_> {
    pub(crate) fn complies(&mut self, compliance: f64) -> bool {
        self.rng.random_bool(compliance)
    }
}

/// Exit hook point for isolation: any transition out of the symptomatic course into a terminal
/// state.
pub(crate) const RECOVERY_TRANSITIONS: [(DiseaseState, DiseaseState); 4] = [
    (DiseaseState::SymptomaticInfectious, DiseaseState::Immune),
    (DiseaseState::SymptomaticInfectious, DiseaseState::Deceased),
    (DiseaseState::Critical, DiseaseState::Immune),
    (DiseaseState::Critical, DiseaseState::Deceased),
];

pub(crate) const SYMPTOM_ONSET: (DiseaseState, DiseaseState) = (
    DiseaseState::IncubatingPostLatent,
    DiseaseState::SymptomaticInfectious,
);

/// The hook points for `person` recovering or dying out of the symptomatic course.
pub(crate) fn recovery_events(ctx: &mut CompileContext, person: PersonId) -> [EventId; 4] {
    RECOVERY_TRANSITIONS.map(|transition| {
        ctx.world
            .person_mut(person)
            .state_change_event(transition, ctx.events)
    })
}

/// Fires once any of `events` has applied.
pub(crate) fn after_any(events: &[EventId]) -> Trigger {
    Trigger::Or(events.iter().map(|e| Trigger::After(*e)).collect())
}

impl Intervention {
    pub fn end_date(&self) -> Date {
        self.start_date + self.duration
    }

    pub fn time_range(&self) -> Trigger {
        Trigger::TimeRange {
            start: self.start_date,
            end: self.end_date(),
        }
    }

    pub fn type_name(&self) -> &str {
        self.kind.as_ref()
    }

    pub fn validate(&self) -> Result<(), EpiError> {
        if !(0.0..=1.0).contains(&self.compliance) {
            return Err(config_error(format!(
                "{}: compliance {} is not a probability",
                self.type_name(),
                self.compliance
            )));
        }
        match &self.kind {
            InterventionKind::SocialDistancing { min_age, max_age } if min_age > max_age => Err(
                config_error(format!("social_distancing: empty age range {min_age}..={max_age}")),
            ),
            InterventionKind::SchoolClosure(selection)
            | InterventionKind::SchoolIsolation(selection) => {
                if !(0.0..=1.0).contains(&selection.proportion_of_envs) {
                    return Err(config_error(format!(
                        "{}: proportion_of_envs {} is not a fraction",
                        self.type_name(),
                        selection.proportion_of_envs
                    )));
                }
                if selection.age_segment.0 > selection.age_segment.1 {
                    return Err(config_error(format!(
                        "{}: empty age segment {:?}",
                        self.type_name(),
                        selection.age_segment
                    )));
                }
                if let Some(period) = selection.period {
                    if period.length == 0 || period.phases == 0 {
                        return Err(config_error(format!(
                            "{}: period needs a positive length and phase count",
                            self.type_name()
                        )));
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Compiles this intervention into events. The returned day events must be registered on
    /// the plan; hook-based events are already attached to people's transitions.
    pub fn generate_events(
        &self,
        ctx: &mut CompileContext,
    ) -> Result<Vec<(Date, EventId)>, EpiError> {
        self.validate()?;
        match &self.kind {
            InterventionKind::SocialDistancing { min_age, max_age } => {
                Ok(timed::social_distancing(self, ctx, *min_age, *max_age))
            }
            InterventionKind::ElderlyQuarantine { min_age } => {
                Ok(timed::elderly_quarantine(self, ctx, *min_age))
            }
            InterventionKind::WorkplaceClosure => Ok(timed::workplace_closure(self, ctx)),
            InterventionKind::CityCurfew { city_name } => timed::city_curfew(self, ctx, city_name),
            InterventionKind::SymptomaticIsolation { delay } => {
                isolation::symptomatic_isolation(self, ctx, *delay);
                Ok(Vec::new())
            }
            InterventionKind::HouseholdIsolation {
                delay_on_enter,
                delay_on_exit,
                is_exit_after_recovery,
            } => {
                isolation::household_isolation(
                    self,
                    ctx,
                    *delay_on_enter,
                    *delay_on_exit,
                    *is_exit_after_recovery,
                );
                Ok(Vec::new())
            }
            InterventionKind::SchoolClosure(selection) => {
                school::partial_school(self, ctx, selection, school::Mode::Closure)
            }
            InterventionKind::SchoolIsolation(selection) => {
                school::partial_school(self, ctx, selection, school::Mode::Isolation)
            }
        }
    }

    /// `(key, value)` rows describing this intervention, for `interventions_inputs.csv`.
    pub fn parameters(&self) -> Vec<(String, String)> {
        let mut rows = Vec::new();
        if let Ok(Value::Object(fields)) = serde_json::to_value(self) {
            for (key, value) in fields {
                if key == "type" {
                    continue;
                }
                let value = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                rows.push((key, value));
            }
        }
        rows
    }
}

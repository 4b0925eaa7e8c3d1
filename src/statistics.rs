//! Daily statistics and the end-of-run snapshot.
//!
//! The day loop hands [`Statistics::record_day`] the people that changed today. Counts per state
//! and age band are kept incrementally by diffing each changed person's last saved state against
//! their current one. After the run [`Statistics::mark_ending`] snapshots every person; from then
//! on the statistics are read-only and any further mutation panics.

use std::ops::Index;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumCount, EnumIter, EnumString, IntoEnumIterator};

use crate::disease::{age_band, DiseaseState};
use crate::environment::EnvironmentKind;
use crate::error::EpiError;
use crate::params::AGE_BANDS;
use crate::person::{InfectionRecord, PersonId};
use crate::time::Date;
use crate::world::World;

type StateCounts = [usize; DiseaseState::COUNT];

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DayStatistics {
    pub date: Date,
    /// People per state at the end of the day, one row per age band.
    pub state_counts: Vec<StateCounts>,
    /// New infections today by the kind of environment they happened in.
    pub new_infections: [usize; EnvironmentKind::COUNT],
    pub new_symptomatic: usize,
    pub new_critical: usize,
    pub new_immune: usize,
    pub new_deceased: usize,
    /// People whose state or routine changed today.
    pub changed: usize,
}

impl DayStatistics {
    pub fn count(&self, state: DiseaseState) -> usize {
        self.state_counts.iter().map(|row| row[state.index()]).sum()
    }

    pub fn total_new_infections(&self) -> usize {
        self.new_infections.iter().sum()
    }
}

/// Per-day series that can be exported for plotting.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, EnumIter, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Series {
    Susceptible,
    Latent,
    Infectious,
    Symptomatic,
    Critical,
    Immune,
    Deceased,
    NewInfections,
    NewSymptomatic,
    NewCritical,
    NewDeceased,
    TotalInfected,
}

/// A person as they ended the run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PersonSnapshot {
    pub id: PersonId,
    pub age: u32,
    pub final_state: DiseaseState,
    pub infection_date: Option<Date>,
    pub infection_kind: Option<EnvironmentKind>,
    pub ever_symptomatic: bool,
    pub ever_critical: bool,
}

/// Mean secondary infections caused by the people infected on `date`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct REstimate {
    pub date: Date,
    pub cohort: usize,
    pub r: f64,
}

/// Named end-of-run counts over a slice of the population.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    rows: Vec<(String, usize)>,
}

impl Summary {
    pub(crate) fn from_rows(rows: Vec<(String, usize)>) -> Self {
        Summary { rows }
    }

    pub fn get(&self, row: &str) -> Option<usize> {
        self.rows.iter().find(|(name, _)| name == row).map(|(_, v)| *v)
    }

    pub fn rows(&self) -> &[(String, usize)] {
        &self.rows
    }
}

impl Index<&str> for Summary {
    type Output = usize;

    fn index(&self, row: &str) -> &usize {
        self.rows
            .iter()
            .find(|(name, _)| name == row)
            .map(|(_, v)| v)
            .unwrap_or_else(|| panic!("no summary row named {row:?}"))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Statistics {
    population: usize,
    current: Vec<StateCounts>,
    days: Vec<DayStatistics>,
    infections: Vec<InfectionRecord>,
    snapshots: Vec<PersonSnapshot>,
    r_estimates: Vec<REstimate>,
    ended: bool,
}

impl Statistics {
    /// Starts counting from everyone's last saved state.
    pub fn new(world: &World) -> Self {
        let mut current = vec![[0; DiseaseState::COUNT]; AGE_BANDS];
        for person in world.all_people() {
            current[age_band(person.age())][person.last_state().index()] += 1;
        }
        Self {
            population: world.num_people(),
            current,
            days: Vec::new(),
            infections: Vec::new(),
            snapshots: Vec::new(),
            r_estimates: Vec::new(),
            ended: false,
        }
    }

    fn assert_open(&self, action: &str) {
        assert!(!self.ended, "cannot {action}: statistics already ended");
    }

    /// Diffs `changed` people against their last saved state. Must run before their
    /// `save_state`.
    pub fn record_day(&mut self, date: Date, world: &World, changed: &[PersonId]) -> &DayStatistics {
        self.assert_open("record a day");
        let mut day = DayStatistics {
            date,
            state_counts: Vec::new(),
            new_infections: [0; EnvironmentKind::COUNT],
            new_symptomatic: 0,
            new_critical: 0,
            new_immune: 0,
            new_deceased: 0,
            changed: changed.len(),
        };
        for id in changed {
            let person = world.get_person(*id);
            let (old, new) = (person.last_state(), person.state());
            if old == new {
                continue;
            }
            let band = age_band(person.age());
            self.current[band][old.index()] -= 1;
            self.current[band][new.index()] += 1;

            if old.is_susceptible() {
                if let Some(record) = person.infection().filter(|r| r.date == date) {
                    day.new_infections[record.environment_kind as usize] += 1;
                    self.infections.push(*record);
                }
            }
            if person.symptomatic_date() == Some(date) {
                day.new_symptomatic += 1;
            }
            match new {
                DiseaseState::Critical => day.new_critical += 1,
                DiseaseState::Immune => day.new_immune += 1,
                DiseaseState::Deceased => day.new_deceased += 1,
                _ => {}
            }
        }
        day.state_counts.clone_from(&self.current);
        self.days.push(day);
        &self.days[self.days.len() - 1]
    }

    pub fn set_r_estimates(&mut self, estimates: Vec<REstimate>) {
        self.assert_open("set R estimates");
        self.r_estimates = estimates;
    }

    /// Snapshots every person and closes the statistics.
    pub fn mark_ending(&mut self, world: &World) {
        self.assert_open("end twice");
        self.snapshots = world
            .all_people()
            .iter()
            .map(|person| PersonSnapshot {
                id: person.id(),
                age: person.age(),
                final_state: person.state(),
                infection_date: person.infection().map(|r| r.date),
                infection_kind: person.infection().map(|r| r.environment_kind),
                ever_symptomatic: person.symptomatic_date().is_some(),
                ever_critical: person.ever_critical(),
            })
            .collect();
        self.ended = true;
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn population(&self) -> usize {
        self.population
    }

    pub fn days(&self) -> &[DayStatistics] {
        &self.days
    }

    pub fn infections(&self) -> &[InfectionRecord] {
        &self.infections
    }

    pub fn snapshots(&self) -> &[PersonSnapshot] {
        &self.snapshots
    }

    pub fn r_estimates(&self) -> &[REstimate] {
        &self.r_estimates
    }

    /// One value per recorded day.
    pub fn series(&self, series: Series) -> Vec<f64> {
        let mut total_infected = 0;
        self.days
            .iter()
            .map(|day| {
                total_infected += day.total_new_infections();
                let value = match series {
                    Series::Susceptible => day.count(DiseaseState::Susceptible),
                    Series::Latent => day.count(DiseaseState::Latent),
                    Series::Infectious => DiseaseState::iter()
                        .filter(|s| s.is_infectious())
                        .map(|s| day.count(s))
                        .sum(),
                    Series::Symptomatic => day.count(DiseaseState::SymptomaticInfectious),
                    Series::Critical => day.count(DiseaseState::Critical),
                    Series::Immune => day.count(DiseaseState::Immune),
                    Series::Deceased => day.count(DiseaseState::Deceased),
                    Series::NewInfections => day.total_new_infections(),
                    Series::NewSymptomatic => day.new_symptomatic,
                    Series::NewCritical => day.new_critical,
                    Series::NewDeceased => day.new_deceased,
                    Series::TotalInfected => total_infected,
                };
                value as f64
            })
            .collect()
    }

    /// End-of-run counts for people whose age is in the inclusive `age_range`, or everyone.
    /// Panics before [`Statistics::mark_ending`].
    pub fn summary(&self, age_range: Option<(u32, u32)>) -> Summary {
        assert!(self.ended, "summary requested before the run ended");
        let people: Vec<&PersonSnapshot> = self
            .snapshots
            .iter()
            .filter(|p| age_range.is_none_or(|(lo, hi)| (lo..=hi).contains(&p.age)))
            .collect();
        let count = |f: &dyn Fn(&PersonSnapshot) -> bool| people.iter().filter(|p| f(p)).count();

        let mut rows = vec![
            ("Population".to_string(), people.len()),
            (
                "Total infected".to_string(),
                count(&|p| p.infection_kind.is_some()),
            ),
        ];
        for kind in EnvironmentKind::iter() {
            rows.push((
                format!("Total infected in {kind}"),
                count(&|p| p.infection_kind == Some(kind)),
            ));
        }
        rows.extend([
            ("Total symptomatic".to_string(), count(&|p| p.ever_symptomatic)),
            ("Total critical".to_string(), count(&|p| p.ever_critical)),
            (
                "Total deceased".to_string(),
                count(&|p| p.final_state == DiseaseState::Deceased),
            ),
            (
                "Total immune".to_string(),
                count(&|p| p.final_state == DiseaseState::Immune),
            ),
            (
                "Still susceptible".to_string(),
                count(&|p| p.final_state == DiseaseState::Susceptible),
            ),
        ]);
        Summary { rows }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EpiError> {
        Ok(bincode::serde::encode_to_vec(
            self,
            bincode::config::standard(),
        )?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EpiError> {
        let (statistics, _) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        Ok(statistics)
    }
}

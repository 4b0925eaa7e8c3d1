//! Environments are homogeneous contact pools. Every pair of people attending the same
//! environment on a day meets with the same probability, scaled by both attendance weights.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::Rng;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display as StrumDisplay, EnumCount, EnumIter, EnumString};

use crate::disease::{DiseaseProgression, InfectiousnessFactors};
use crate::event::{EventArena, EventId};
use crate::log::trace;
use crate::person::{Person, PersonId};
use crate::time::Date;

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
    EnumString,
    StrumDisplay,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EnvironmentKind {
    Household,
    NeighborhoodCommunity,
    CityCommunity,
    School,
    Workplace,
    /// Source of seed infections. Nobody attends it.
    InitialGroup,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EnvironmentId(pub usize);

impl Display for EnvironmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "env#{}", self.0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, StrumDisplay)]
#[strum(serialize_all = "snake_case")]
pub enum InterventionState {
    Open,
    Closed,
    Isolated,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Environment {
    id: EnvironmentId,
    kind: EnvironmentKind,
    name: String,
    city: Option<String>,
    /// Inclusive age band of schools and workplaces.
    age_range: Option<(u32, u32)>,
    /// Households only. Selects the rotation phase of period-mode school interventions.
    family_name: Option<u32>,
    intervention_state: InterventionState,
    contact_prob_between_each_two_people: f64,
    members: Vec<PersonId>,
    #[serde(skip)]
    attendance: BTreeMap<PersonId, f64>,
    #[serde(skip)]
    infectious: BTreeMap<PersonId, f64>,
}

impl Environment {
    /// `average_daily_contacts` is spread evenly over every other member.
    pub fn new(
        id: EnvironmentId,
        kind: EnvironmentKind,
        name: String,
        members: Vec<PersonId>,
        average_daily_contacts: f64,
    ) -> Self {
        let others = members.len().saturating_sub(1).max(1);
        #[allow(clippy::cast_precision_loss)]
        let contact_prob = average_daily_contacts / others as f64;
        Self {
            id,
            kind,
            name,
            city: None,
            age_range: None,
            family_name: None,
            intervention_state: InterventionState::Open,
            contact_prob_between_each_two_people: contact_prob,
            members,
            attendance: BTreeMap::new(),
            infectious: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_city(mut self, city: &str) -> Self {
        self.city = Some(city.to_string());
        self
    }

    #[must_use]
    pub fn with_age_range(mut self, age_range: (u32, u32)) -> Self {
        self.age_range = Some(age_range);
        self
    }

    #[must_use]
    pub fn with_family_name(mut self, family_name: u32) -> Self {
        self.family_name = Some(family_name);
        self
    }

    pub fn id(&self) -> EnvironmentId {
        self.id
    }

    pub fn kind(&self) -> EnvironmentKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn city(&self) -> Option<&str> {
        self.city.as_deref()
    }

    pub fn age_range(&self) -> Option<(u32, u32)> {
        self.age_range
    }

    pub fn family_name(&self) -> Option<u32> {
        self.family_name
    }

    pub fn members(&self) -> &[PersonId] {
        &self.members
    }

    pub fn contact_prob(&self) -> f64 {
        self.contact_prob_between_each_two_people
    }

    pub fn intervention_state(&self) -> InterventionState {
        self.intervention_state
    }

    pub fn attendance(&self) -> &BTreeMap<PersonId, f64> {
        &self.attendance
    }

    pub fn infectious(&self) -> &BTreeMap<PersonId, f64> {
        &self.infectious
    }

    /// Panics if the current state is not `old`.
    pub fn change_intervention_state(&mut self, old: InterventionState, new: InterventionState) {
        assert_eq!(
            self.intervention_state, old,
            "{} ({}) is {}, expected {} before moving to {}",
            self.name, self.id, self.intervention_state, old, new
        );
        self.intervention_state = new;
    }

    /// Records today's attendance for `person`. Panics on a negative weight.
    pub fn sign_up(&mut self, person: &Person, weight: f64, factors: &InfectiousnessFactors) {
        let id = person.id();
        if person.state().is_dead() {
            self.attendance.remove(&id);
            self.infectious.remove(&id);
            return;
        }
        assert!(
            weight >= 0.0,
            "negative attendance weight {weight} for {id} in {}",
            self.name
        );
        self.attendance.insert(id, weight);
        if person.state().is_infectious() {
            self.infectious.insert(
                id,
                weight * person.base_infectiousness() * factors.factor(person.state()),
            );
        } else {
            self.infectious.remove(&id);
        }
    }

    /// Runs one day of contacts. Returns the disease-course events of everyone infected here.
    pub fn propagate<R: Rng>(
        &self,
        date: Date,
        persons: &mut [Person],
        progression: &DiseaseProgression,
        rng: &mut R,
        events: &mut EventArena,
    ) -> Vec<(Date, EventId)> {
        if self.infectious.is_empty() {
            return Vec::new();
        }
        let susceptible: Vec<(PersonId, f64)> = self
            .attendance
            .iter()
            .filter(|(id, _)| persons[id.0].state().is_susceptible())
            .map(|(id, weight)| (*id, *weight))
            .collect();
        if susceptible.is_empty() {
            return Vec::new();
        }
        let total: f64 = self.infectious.values().sum();
        if total <= 0.0 {
            return Vec::new();
        }

        let log_q = -self.contact_prob_between_each_two_people * total;
        let sources: Vec<PersonId> = self.infectious.keys().copied().collect();
        let source_distribution = WeightedIndex::new(self.infectious.values())
            .expect("infectious weights are non-negative with a positive sum");

        let mut new_events = Vec::new();
        let mut infected = 0_u32;
        for (id, weight) in susceptible {
            let p = -(weight * log_q).exp_m1();
            if !rng.random_bool(p.clamp(0.0, 1.0)) {
                continue;
            }
            let source = sources[source_distribution.sample(rng)];
            trace!("{date}: {source} infected {id} in {}", self.name);
            new_events.extend(persons[id.0].infect(
                date,
                self.id,
                self.kind,
                Some(source),
                progression,
                rng,
                events,
            ));
            infected += 1;
        }

        if infected > 0 {
            let k = f64::from(infected);
            for (id, value) in &self.infectious {
                persons[id.0].credit_secondary_infections(value / total * k);
            }
        }
        new_events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disease::DiseaseState;
    use crate::params::test_support::test_params;
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn factors() -> InfectiousnessFactors {
        InfectiousnessFactors {
            incubating_post_latent: 1.0,
            asymptomatic_infectious: 1.0,
            symptomatic_infectious: 1.0,
            critical: 1.0,
        }
    }

    fn people(n: usize) -> Vec<Person> {
        (0..n).map(|i| Person::new(PersonId(i), 30, 1.0)).collect()
    }

    fn pool(n: usize, contacts: f64) -> Environment {
        Environment::new(
            EnvironmentId(1),
            EnvironmentKind::Workplace,
            "office".into(),
            (0..n).map(PersonId).collect(),
            contacts,
        )
    }

    #[test]
    fn contact_prob_spreads_over_other_members() {
        assert_approx_eq!(pool(11, 5.0).contact_prob(), 0.5);
        assert_approx_eq!(pool(1, 5.0).contact_prob(), 5.0);
        assert_approx_eq!(pool(0, 5.0).contact_prob(), 5.0);
    }

    #[test]
    fn sign_up_tracks_infectiousness() {
        let mut env = pool(2, 1.0);
        let mut persons = people(2);
        persons[0].force_state(DiseaseState::SymptomaticInfectious);
        env.sign_up(&persons[0], 0.5, &factors());
        env.sign_up(&persons[1], 1.0, &factors());
        assert_eq!(env.attendance().len(), 2);
        assert_eq!(env.infectious().get(&PersonId(0)), Some(&0.5));
        assert!(!env.infectious().contains_key(&PersonId(1)));

        persons[0].force_state(DiseaseState::Deceased);
        env.sign_up(&persons[0], 0.5, &factors());
        assert!(!env.attendance().contains_key(&PersonId(0)));
        assert!(env.infectious().is_empty());
    }

    #[test]
    #[should_panic(expected = "negative attendance weight")]
    fn negative_weight_panics() {
        let mut env = pool(1, 1.0);
        env.sign_up(&people(1)[0], -1.0, &factors());
    }

    #[test]
    fn empty_propagation_returns_nothing() {
        let params = test_params();
        let progression = DiseaseProgression::new(&params.disease_parameters).unwrap();
        let mut env = pool(3, 100.0);
        let mut persons = people(3);
        for person in &persons {
            env.sign_up(person, 1.0, &factors());
        }
        let mut rng = SmallRng::seed_from_u64(0);
        let mut events = EventArena::default();
        let out = env.propagate(Date(0), &mut persons, &progression, &mut rng, &mut events);
        assert!(out.is_empty());
        assert!(events.is_empty());
    }

    #[test]
    fn credit_sums_to_new_infections() {
        let params = test_params();
        let progression = DiseaseProgression::new(&params.disease_parameters).unwrap();
        let mut env = pool(40, 30.0);
        let mut persons = people(40);
        for person in persons.iter_mut().take(4) {
            person.force_state(DiseaseState::SymptomaticInfectious);
        }
        for person in &persons {
            env.sign_up(person, 1.0, &factors());
        }
        let mut rng = SmallRng::seed_from_u64(9);
        let mut events = EventArena::default();
        env.propagate(Date(0), &mut persons, &progression, &mut rng, &mut events);
        let newly_infected = persons
            .iter()
            .filter(|p| p.state() == DiseaseState::Latent)
            .count();
        assert!(newly_infected > 0);
        let credited: f64 = persons.iter().map(Person::secondary_infections).sum();
        #[allow(clippy::cast_precision_loss)]
        let expected = newly_infected as f64;
        assert_approx_eq!(credited, expected, 1e-9);
        for person in persons.iter().filter(|p| p.state() == DiseaseState::Latent) {
            let record = person.infection().unwrap();
            assert_eq!(record.environment, EnvironmentId(1));
            assert!(record.transmitter.unwrap().0 < 4);
        }
    }

    #[test]
    fn zero_weight_attendees_are_never_infected() {
        let params = test_params();
        let progression = DiseaseProgression::new(&params.disease_parameters).unwrap();
        let mut env = pool(10, 1000.0);
        let mut persons = people(10);
        persons[0].force_state(DiseaseState::SymptomaticInfectious);
        env.sign_up(&persons[0], 1.0, &factors());
        for person in &persons[1..] {
            env.sign_up(person, 0.0, &factors());
        }
        let mut rng = SmallRng::seed_from_u64(2);
        let mut events = EventArena::default();
        let out = env.propagate(Date(0), &mut persons, &progression, &mut rng, &mut events);
        assert!(out.is_empty());
        assert_eq!(persons[0].secondary_infections(), 0.0);
    }

    #[test]
    fn intervention_state_transitions() {
        let mut env = pool(1, 1.0);
        env.change_intervention_state(InterventionState::Open, InterventionState::Closed);
        assert_eq!(env.intervention_state(), InterventionState::Closed);
    }

    #[test]
    #[should_panic(expected = "expected open")]
    fn mismatched_intervention_state_panics() {
        let mut env = pool(1, 1.0);
        env.change_intervention_state(InterventionState::Closed, InterventionState::Open);
    }
}

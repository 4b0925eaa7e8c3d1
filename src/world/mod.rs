//! The population: every person and every environment, stored in two arenas indexed by
//! [`PersonId`] and [`EnvironmentId`].
//!
//! Worlds come from [`generator`] (cities described in JSON) or are assembled directly with
//! [`WorldBuilder`]. Environment 0 is always the initial group.
pub mod cache;
pub mod generator;

use serde::{Deserialize, Serialize};

use crate::disease::InfectiousnessFactors;
use crate::environment::{Environment, EnvironmentId, EnvironmentKind};
use crate::person::{Person, PersonId};

pub const INITIAL_GROUP: EnvironmentId = EnvironmentId(0);

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct World {
    persons: Vec<Person>,
    environments: Vec<Environment>,
    /// City names with their city community, in generation order.
    cities: Vec<(String, EnvironmentId)>,
}

impl World {
    pub fn all_people(&self) -> &[Person] {
        &self.persons
    }

    pub fn all_environments(&self) -> &[Environment] {
        &self.environments
    }

    pub fn num_people(&self) -> usize {
        self.persons.len()
    }

    pub fn get_person(&self, id: PersonId) -> &Person {
        &self.persons[id.0]
    }

    pub(crate) fn person_mut(&mut self, id: PersonId) -> &mut Person {
        &mut self.persons[id.0]
    }

    pub fn environment(&self, id: EnvironmentId) -> &Environment {
        &self.environments[id.0]
    }

    pub(crate) fn environment_mut(&mut self, id: EnvironmentId) -> &mut Environment {
        &mut self.environments[id.0]
    }

    /// Both arenas at once, for the contact model.
    pub(crate) fn split_mut(&mut self) -> (&mut [Person], &mut [Environment]) {
        (&mut self.persons, &mut self.environments)
    }

    pub fn initial_group(&self) -> &Environment {
        &self.environments[INITIAL_GROUP.0]
    }

    pub fn get_city_community(&self, name: &str) -> Option<&Environment> {
        self.cities
            .iter()
            .find(|(city, _)| city == name)
            .map(|(_, id)| self.environment(*id))
    }

    pub fn get_all_city_names(&self) -> Vec<&str> {
        self.cities.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn get_all_city_households(&self, name: &str) -> Vec<&Environment> {
        self.environments_of_kind(EnvironmentKind::Household)
            .filter(|env| env.city() == Some(name))
            .collect()
    }

    pub fn environments_of_kind(
        &self,
        kind: EnvironmentKind,
    ) -> impl Iterator<Item = &Environment> + '_ {
        self.environments.iter().filter(move |env| env.kind() == kind)
    }

    /// The city a person lives in, from their household.
    pub fn residence_city(&self, person: PersonId) -> Option<&str> {
        self.get_person(person)
            .environment(EnvironmentKind::Household)
            .and_then(|household| self.environment(household).city())
    }

    /// People whose household is in `city`.
    pub fn city_residents(&self, city: &str) -> Vec<PersonId> {
        self.persons
            .iter()
            .filter(|p| self.residence_city(p.id()) == Some(city))
            .map(Person::id)
            .collect()
    }

    /// Signs everyone up regardless of their changed flag.
    pub fn sign_all_people_up_to_environments(&mut self, factors: &InfectiousnessFactors) {
        let (persons, environments) = self.split_mut();
        for person in persons {
            person.sign_up(environments, factors);
        }
    }

    /// Re-registers the attendance of `ids` in order.
    pub fn register_attendance(&mut self, ids: &[PersonId], factors: &InfectiousnessFactors) {
        let (persons, environments) = self.split_mut();
        for id in ids {
            persons[id.0].register_attendance(environments, factors);
        }
    }

    pub fn changed_people(&self) -> Vec<PersonId> {
        self.persons
            .iter()
            .filter(|p| p.is_changed())
            .map(Person::id)
            .collect()
    }
}

/// Assembles a [`World`] person by person and environment by environment.
#[derive(Debug)]
pub struct WorldBuilder {
    persons: Vec<Person>,
    environments: Vec<Environment>,
    cities: Vec<(String, EnvironmentId)>,
}

impl Default for WorldBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WorldBuilder {
    pub fn new() -> Self {
        let initial_group = Environment::new(
            INITIAL_GROUP,
            EnvironmentKind::InitialGroup,
            "initial_group".to_string(),
            Vec::new(),
            0.0,
        );
        Self {
            persons: Vec::new(),
            environments: vec![initial_group],
            cities: Vec::new(),
        }
    }

    pub fn add_person(&mut self, age: u32, base_infectiousness: f64) -> PersonId {
        let id = PersonId(self.persons.len());
        self.persons.push(Person::new(id, age, base_infectiousness));
        id
    }

    pub fn num_people(&self) -> usize {
        self.persons.len()
    }

    pub fn person(&self, id: PersonId) -> &Person {
        &self.persons[id.0]
    }

    pub fn add_environment(
        &mut self,
        kind: EnvironmentKind,
        name: &str,
        members: Vec<PersonId>,
        average_daily_contacts: f64,
    ) -> EnvironmentId {
        self.add_environment_with(kind, name, members, average_daily_contacts, |env| env)
    }

    /// Like [`WorldBuilder::add_environment`], letting `configure` set the city, age range or
    /// family name. Members get the environment as their environment of `kind`.
    pub fn add_environment_with(
        &mut self,
        kind: EnvironmentKind,
        name: &str,
        members: Vec<PersonId>,
        average_daily_contacts: f64,
        configure: impl FnOnce(Environment) -> Environment,
    ) -> EnvironmentId {
        assert!(
            kind != EnvironmentKind::InitialGroup,
            "the initial group is created by the builder"
        );
        let id = EnvironmentId(self.environments.len());
        for member in &members {
            self.persons[member.0].set_environment(kind, id);
        }
        let env = configure(Environment::new(
            id,
            kind,
            name.to_string(),
            members,
            average_daily_contacts,
        ));
        if kind == EnvironmentKind::CityCommunity {
            if let Some(city) = env.city() {
                self.cities.push((city.to_string(), id));
            }
        }
        self.environments.push(env);
        id
    }

    pub fn build(self) -> World {
        World {
            persons: self.persons,
            environments: self.environments,
            cities: self.cities,
        }
    }
}

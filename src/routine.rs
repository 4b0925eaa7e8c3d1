//! Routines: how much of a normal day a person spends in each kind of environment.
//!
//! Interventions push named [`RoutineChange`]s onto a person's [`Routine`]. The effective weight
//! for a kind is the product of every active change's weight for that kind. Changes are reference
//! counted by key so that overlapping interventions using the same key compose idempotently.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use strum::{EnumCount, IntoEnumIterator};

use crate::environment::EnvironmentKind;

/// A multiplicative weight per environment kind. Kinds not mentioned by a template stay at 1.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct RoutineChange([f64; EnvironmentKind::COUNT]);

impl RoutineChange {
    pub fn identity() -> Self {
        RoutineChange([1.0; EnvironmentKind::COUNT])
    }

    /// Weight `w` for every kind.
    pub fn uniform(w: f64) -> Self {
        RoutineChange([w; EnvironmentKind::COUNT])
    }

    pub fn weight(&self, kind: EnvironmentKind) -> f64 {
        self.0[kind as usize]
    }

    pub fn set(&mut self, kind: EnvironmentKind, weight: f64) {
        assert!(
            weight >= 0.0,
            "routine weight for {kind} must be non-negative, got {weight}"
        );
        self.0[kind as usize] = weight;
    }

    #[must_use]
    pub fn with(mut self, kind: EnvironmentKind, weight: f64) -> Self {
        self.set(kind, weight);
        self
    }
}

/// Names a routine change on a person. Each intervention kind owns one key.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RoutineChangeKey {
    Quarantine,
    ElderlyQuarantine,
    SocialDistancing,
    WorkplaceClosure,
    HouseholdIsolation,
    CityCurfew { city: String },
    SchoolClosure,
    SchoolIsolation,
}

impl Display for RoutineChangeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutineChangeKey::Quarantine => write!(f, "quarantine"),
            RoutineChangeKey::ElderlyQuarantine => write!(f, "elderly_quarantine"),
            RoutineChangeKey::SocialDistancing => write!(f, "social_distancing"),
            RoutineChangeKey::WorkplaceClosure => write!(f, "workplace_closure"),
            RoutineChangeKey::HouseholdIsolation => write!(f, "household_isolation"),
            RoutineChangeKey::CityCurfew { city } => write!(f, "city_curfew({city})"),
            RoutineChangeKey::SchoolClosure => write!(f, "school_closure"),
            RoutineChangeKey::SchoolIsolation => write!(f, "school_isolation"),
        }
    }
}

/// A person's effective routine plus the stack of changes that produced it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Routine {
    effective: RoutineChange,
    changes: BTreeMap<RoutineChangeKey, (RoutineChange, u32)>,
}

impl Default for Routine {
    fn default() -> Self {
        Self {
            effective: RoutineChange::identity(),
            changes: BTreeMap::new(),
        }
    }
}

impl Routine {
    pub fn weight(&self, kind: EnvironmentKind) -> f64 {
        self.effective.weight(kind)
    }

    pub fn effective(&self) -> &RoutineChange {
        &self.effective
    }

    pub fn active_changes(&self) -> impl Iterator<Item = (&RoutineChangeKey, &RoutineChange)> {
        self.changes.iter().map(|(key, (change, _))| (key, change))
    }

    pub fn multiplicity(&self, key: &RoutineChangeKey) -> u32 {
        self.changes.get(key).map_or(0, |(_, count)| *count)
    }

    /// Returns true if the effective routine was recomputed.
    ///
    /// Panics if `key` is already active with a different change.
    pub fn add(&mut self, key: RoutineChangeKey, change: RoutineChange) -> bool {
        if let Some((active, count)) = self.changes.get_mut(&key) {
            assert!(
                *active == change,
                "routine change {key} is active with {active:?}, cannot add {change:?}"
            );
            *count += 1;
            return false;
        }
        self.changes.insert(key, (change, 1));
        self.recompute();
        true
    }

    /// Returns true if the effective routine was recomputed.
    ///
    /// Panics if `key` is not active.
    pub fn remove(&mut self, key: &RoutineChangeKey) -> bool {
        let Some((_, count)) = self.changes.get_mut(key) else {
            panic!("removing routine change {key} that is not active");
        };
        *count -= 1;
        if *count > 0 {
            return false;
        }
        self.changes.remove(key);
        self.recompute();
        true
    }

    fn recompute(&mut self) {
        let mut effective = RoutineChange::identity();
        for kind in EnvironmentKind::iter() {
            let product = self
                .changes
                .values()
                .map(|(change, _)| change.weight(kind))
                .product();
            effective.set(kind, product);
        }
        self.effective = effective;
    }
}

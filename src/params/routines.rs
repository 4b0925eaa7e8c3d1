//! The `interventions_routines` section: one multiplicative weight table per intervention kind.
//!
//! ```json
//! "household_isolation": {"household": 1.0, "other": 0.0}
//! ```
//!
//! Keys are environment kind names or `"other"`; kinds absent from a table take the `"other"`
//! value, or 1 if there is none.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoEnumIterator};

use crate::environment::EnvironmentKind;
use crate::error::{config_error, EpiError};
use crate::routine::RoutineChange;

const OTHER: &str = "other";

#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TemplateName {
    WorkplaceClosure,
    /// Shared by symptomatic isolation and elderly quarantine.
    Quarantine,
    SocialDistancing,
    HouseholdIsolation,
    CityCurfew,
    /// Applied to people crossing into a city under curfew from outside.
    CityCurfewCrossing,
    SchoolClosure,
    SchoolIsolation,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(transparent)]
pub struct RoutineTemplate(pub BTreeMap<String, f64>);

impl RoutineTemplate {
    pub fn weight(&self, kind: EnvironmentKind) -> f64 {
        self.0
            .get(kind.as_ref())
            .or_else(|| self.0.get(OTHER))
            .copied()
            .unwrap_or(1.0)
    }

    /// The template applied to every environment kind.
    pub fn to_change(&self) -> RoutineChange {
        self.to_change_where(|_| true)
    }

    /// The template applied only to the kinds selected by `applies`; other kinds keep weight 1.
    pub fn to_change_where(&self, applies: impl Fn(EnvironmentKind) -> bool) -> RoutineChange {
        let mut change = RoutineChange::identity();
        for kind in EnvironmentKind::iter() {
            if applies(kind) {
                change.set(kind, self.weight(kind));
            }
        }
        change
    }

    fn validate(&self, name: TemplateName) -> Result<(), EpiError> {
        for (key, weight) in &self.0 {
            if key != OTHER && EnvironmentKind::from_str(key).is_err() {
                return Err(config_error(format!(
                    "interventions_routines.{name}: unknown environment kind {key:?}"
                )));
            }
            if !(weight.is_finite() && *weight >= 0.0) {
                return Err(config_error(format!(
                    "interventions_routines.{name}.{key} = {weight} must be non-negative"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(transparent)]
pub struct RoutineTemplates(pub BTreeMap<TemplateName, RoutineTemplate>);

impl RoutineTemplates {
    /// Every name is checked present by [`RoutineTemplates::validate`] at load time.
    pub fn get(&self, name: TemplateName) -> &RoutineTemplate {
        self.0
            .get(&name)
            .unwrap_or_else(|| panic!("routine template {name} missing from validated params"))
    }

    pub(crate) fn validate(&self) -> Result<(), EpiError> {
        for name in TemplateName::iter() {
            let template = self.0.get(&name).ok_or_else(|| {
                config_error(format!("interventions_routines: missing template {name}"))
            })?;
            template.validate(name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(entries: &[(&str, f64)]) -> RoutineTemplate {
        RoutineTemplate(
            entries
                .iter()
                .map(|(k, v)| ((*k).to_string(), *v))
                .collect(),
        )
    }

    #[test]
    fn other_is_the_fallback() {
        let t = template(&[("household", 1.0), ("other", 0.0)]);
        assert_eq!(t.weight(EnvironmentKind::Household), 1.0);
        assert_eq!(t.weight(EnvironmentKind::Workplace), 0.0);
        assert_eq!(t.weight(EnvironmentKind::InitialGroup), 0.0);
    }

    #[test]
    fn missing_without_other_is_one() {
        let t = template(&[("school", 0.0)]);
        assert_eq!(t.weight(EnvironmentKind::School), 0.0);
        assert_eq!(t.weight(EnvironmentKind::Household), 1.0);
    }

    #[test]
    fn restricted_change_leaves_other_kinds_alone() {
        let t = template(&[("other", 0.0)]);
        let change = t.to_change_where(|k| k == EnvironmentKind::Workplace);
        assert_eq!(change.weight(EnvironmentKind::Workplace), 0.0);
        assert_eq!(change.weight(EnvironmentKind::Household), 1.0);
    }

    #[test]
    fn rejects_unknown_kind() {
        let mut templates = RoutineTemplates::default();
        for name in TemplateName::iter() {
            templates.0.insert(name, RoutineTemplate::default());
        }
        assert!(templates.validate().is_ok());
        templates
            .0
            .insert(TemplateName::Quarantine, template(&[("bakery", 0.5)]));
        assert!(matches!(templates.validate(), Err(EpiError::ConfigError(_))));
    }

    #[test]
    fn rejects_missing_template() {
        let templates = RoutineTemplates::default();
        assert!(matches!(templates.validate(), Err(EpiError::ConfigError(_))));
    }

    /// Columns: workplace, school, household, neighborhood and city, other.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    enum Level {
        Unchanged,
        Zero,
        NearZero,
        Low,
        MidLow,
        Mid,
        High,
        Boosted,
    }

    use Level::*;

    const CONTRACT: [(TemplateName, [Level; 5]); 7] = [
        (TemplateName::WorkplaceClosure, [Low, Unchanged, Unchanged, Unchanged, Mid]),
        (TemplateName::Quarantine, [Low, Low, Low, Low, Low]),
        (TemplateName::SocialDistancing, [MidLow, MidLow, High, MidLow, MidLow]),
        (TemplateName::HouseholdIsolation, [Low, Low, High, Low, Low]),
        (TemplateName::CityCurfew, [Unchanged, Unchanged, High, Boosted, Unchanged]),
        (TemplateName::CityCurfewCrossing, [Zero, Zero, Unchanged, Zero, Zero]),
        (TemplateName::SchoolClosure, [Unchanged, NearZero, High, Boosted, Unchanged]),
    ];

    fn column_kinds(column: usize) -> &'static [EnvironmentKind] {
        match column {
            0 => &[EnvironmentKind::Workplace],
            1 => &[EnvironmentKind::School],
            2 => &[EnvironmentKind::Household],
            3 => &[
                EnvironmentKind::NeighborhoodCommunity,
                EnvironmentKind::CityCommunity,
            ],
            _ => &[EnvironmentKind::InitialGroup],
        }
    }

    #[test]
    fn bundled_templates_follow_the_contract() {
        let params = crate::params::test_support::test_params();
        let templates = &params.interventions_routines;
        let mut ordered: BTreeMap<Level, Vec<f64>> = BTreeMap::new();
        for (name, levels) in CONTRACT {
            let template = templates.get(name);
            for (column, level) in levels.into_iter().enumerate() {
                for &kind in column_kinds(column) {
                    let weight = template.weight(kind);
                    match level {
                        Unchanged => assert_eq!(weight, 1.0, "{name}.{kind}"),
                        Zero => assert_eq!(weight, 0.0, "{name}.{kind}"),
                        NearZero => assert!(weight <= 0.01, "{name}.{kind} = {weight}"),
                        _ => ordered.entry(level).or_default().push(weight),
                    }
                }
            }
        }

        let ranges: Vec<(Level, f64, f64)> = ordered
            .iter()
            .map(|(level, weights)| {
                let min = weights.iter().copied().fold(f64::INFINITY, f64::min);
                let max = weights.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                (*level, min, max)
            })
            .collect();
        assert_eq!(ranges.len(), 5);
        for pair in ranges.windows(2) {
            let (lower, _, lower_max) = pair[0];
            let (upper, upper_min, _) = pair[1];
            assert!(
                lower_max < upper_min,
                "{lower:?} reaches {lower_max} but {upper:?} starts at {upper_min}"
            );
        }
        assert!(ordered[&High].iter().all(|w| *w <= 1.0));
        assert!(ordered[&Boosted].iter().all(|w| *w > 1.0));
    }
}

//! Start-of-day hooks that schedule extra events from outside the intervention catalogue.

use serde::{Deserialize, Serialize};

use crate::event::EventArena;
use crate::hashing::HashSet;
use crate::log::debug;
use crate::person::PersonId;
use crate::plan::DayPlan;
use crate::time::Date;
use crate::world::World;

/// What an extension may read and schedule at the start of a day.
pub struct ExtensionContext<'a> {
    pub date: Date,
    pub world: &'a World,
    pub events: &'a mut EventArena,
    pub plan: &'a mut DayPlan,
}

pub trait Extension: Send {
    fn name(&self) -> &str;

    /// Runs before today's events apply.
    fn start_of_day(&mut self, ctx: &mut ExtensionContext);
}

/// Days between a vaccination and the protection it gives, unless a job says otherwise. Within
/// the first `DEFAULT_IMMUNITY_DELAY_DAYS + 1` days only the day-0 batch becomes immune.
pub const DEFAULT_IMMUNITY_DELAY_DAYS: u32 = 6;

fn default_immunity_delay_days() -> u32 {
    DEFAULT_IMMUNITY_DELAY_DAYS
}

/// Vaccinates up to `people_per_day` susceptible people aged `min_age` or more each day, oldest
/// first. Each vaccination takes effect `immunity_delay_days` later, and only if the person has
/// not progressed past latent by then.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ImmuneByAge {
    pub min_age: u32,
    pub people_per_day: usize,
    #[serde(default = "default_immunity_delay_days")]
    pub immunity_delay_days: u32,
    #[serde(skip)]
    scheduled: HashSet<PersonId>,
}

impl ImmuneByAge {
    pub fn new(min_age: u32, people_per_day: usize, immunity_delay_days: u32) -> Self {
        Self {
            min_age,
            people_per_day,
            immunity_delay_days,
            scheduled: HashSet::default(),
        }
    }
}

impl Extension for ImmuneByAge {
    fn name(&self) -> &str {
        "immune_by_age"
    }

    fn start_of_day(&mut self, ctx: &mut ExtensionContext) {
        let mut candidates: Vec<(u32, PersonId)> = ctx
            .world
            .all_people()
            .iter()
            .filter(|p| p.state().is_susceptible() && p.age() >= self.min_age)
            .filter(|p| !self.scheduled.contains(&p.id()))
            .map(|p| (p.age(), p.id()))
            .collect();
        candidates.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        candidates.truncate(self.people_per_day);

        for (_, id) in &candidates {
            let (when, event) =
                ctx.world
                    .get_person(*id)
                    .immune(ctx.date, self.immunity_delay_days, ctx.events);
            ctx.plan.register(when, event, ctx.events, ctx.date);
            self.scheduled.insert(*id);
        }
        if !candidates.is_empty() {
            debug!(
                "{}: {} scheduled {} vaccinations",
                ctx.date,
                self.name(),
                candidates.len()
            );
        }
    }
}

/// Extensions as they appear in a job file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtensionConfig {
    ImmuneByAge(ImmuneByAge),
}

impl ExtensionConfig {
    pub fn build(&self) -> Box<dyn Extension> {
        match self {
            ExtensionConfig::ImmuneByAge(config) => Box::new(ImmuneByAge::new(
                config.min_age,
                config.people_per_day,
                config.immunity_delay_days,
            )),
        }
    }
}

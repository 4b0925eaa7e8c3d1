//! The day loop.
//!
//! A [`Simulation`] owns one world and everything needed to advance it: the event arena, the day
//! plan, the disease model, its random streams and the statistics being collected. Each call to
//! [`Simulation::simulate_day`] runs one day:
//!
//! 0. extensions schedule their start-of-day events,
//! 1. today's root events apply (repeatedly, since applying may register more events for today),
//! 2. changed people re-register their attendance in ascending id order,
//! 3. every environment propagates, in construction order,
//! 4. people infected in step 3 join the changed set,
//! 5. the day's statistics are recorded over the changed set,
//! 6. changed people save their state,
//! 7. the early-stop condition is checked,
//! 8. the date advances.

use rand::rngs::SmallRng;

use crate::define_rng;
use crate::disease::{DiseaseProgression, InfectiousnessFactors};
use crate::error::EpiError;
use crate::event::{EventArena, EventContext, EventId};
use crate::extension::{Extension, ExtensionContext};
use crate::intervention::{CompileContext, Intervention, SchoolOrders};
use crate::log::{debug, info};
use crate::params::Params;
use crate::person::PersonId;
use crate::plan::DayPlan;
use crate::random::RandomStreams;
use crate::seeding::{self, SeedStrategy};
use crate::statistics::{REstimate, Series, Statistics};
use crate::time::Date;
use crate::world::World;

define_rng!(TransmissionRng);
define_rng!(InterventionRng);
define_rng!(SeedingRng);

/// The cohort followed in R-computation mode: everyone infected during the first `days` days.
#[derive(Debug, Clone)]
struct RComputation {
    days: u32,
    cohort: Vec<PersonId>,
}

/// What a finished run hands back to the caller besides its statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub name: String,
    pub days_run: u32,
    pub stopped_early: bool,
    pub plots: Vec<(Series, Vec<f64>)>,
}

pub struct Simulation {
    world: World,
    events: EventArena,
    plan: DayPlan,
    initial_date: Date,
    date: Date,
    progression: DiseaseProgression,
    factors: InfectiousnessFactors,
    streams: RandomStreams,
    statistics: Statistics,
    extensions: Vec<Box<dyn Extension>>,
    r_computation: Option<RComputation>,
    params_hash: u64,
    report_progress: bool,
}

impl Simulation {
    /// Compiles `interventions` against `world` and signs everyone up to their environments.
    /// Nobody is infected yet; see [`Simulation::with_seed_strategy`].
    pub fn new(
        world: World,
        params: &Params,
        interventions: &[Intervention],
        seed: u64,
    ) -> Result<Self, EpiError> {
        let progression = DiseaseProgression::new(&params.disease_parameters)?;
        let factors = params.disease_parameters.infectiousness_per_stage;
        let initial_date = Date(0);
        let mut simulation = Simulation {
            statistics: Statistics::new(&world),
            world,
            events: EventArena::default(),
            plan: DayPlan::default(),
            initial_date,
            date: initial_date,
            progression,
            factors,
            streams: RandomStreams::new(seed),
            extensions: Vec::new(),
            r_computation: None,
            params_hash: params.hash(),
            report_progress: false,
        };

        let mut school_orders = SchoolOrders::default();
        for intervention in interventions {
            let mut ctx = CompileContext {
                world: &mut simulation.world,
                events: &mut simulation.events,
                rng: simulation.streams.get(InterventionRng),
                templates: &params.interventions_routines,
                school_orders: &mut school_orders,
            };
            let day_events = intervention.generate_events(&mut ctx)?;
            debug!(
                "{} compiled into {} day events",
                intervention.type_name(),
                day_events.len()
            );
            simulation
                .plan
                .register_all(day_events, &mut simulation.events, initial_date);
        }
        simulation
            .world
            .sign_all_people_up_to_environments(&simulation.factors);
        Ok(simulation)
    }

    /// [`Simulation::new`] followed by seeding. A smart seed first runs its mock simulation on a
    /// copy of the untouched world.
    pub fn with_seed_strategy(
        world: World,
        params: &Params,
        interventions: &[Intervention],
        strategy: &SeedStrategy,
        seed: u64,
    ) -> Result<Self, EpiError> {
        match strategy {
            SeedStrategy::Random(initial) => {
                let mut simulation = Self::new(world, params, interventions, seed)?;
                seeding::random_seed(&mut simulation, initial)?;
                Ok(simulation)
            }
            SeedStrategy::Smart(smart) => {
                let mock_seed = RandomStreams::new(seed).derive("mock").base_seed();
                let replays = seeding::run_mock(&world, params, smart, mock_seed)?;
                let mut simulation = Self::new(world, params, interventions, seed)?;
                seeding::replay(&mut simulation, &replays);
                Ok(simulation)
            }
        }
    }

    pub fn add_extension(&mut self, extension: Box<dyn Extension>) {
        self.extensions.push(extension);
    }

    /// Follows everyone infected in the first `days` days and stops once they are all immune or
    /// dead.
    pub fn enable_r_computation(&mut self, days: u32) {
        self.r_computation = Some(RComputation {
            days,
            cohort: Vec::new(),
        });
    }

    /// Advances the day progress bar once per simulated day.
    pub fn set_report_progress(&mut self, report_progress: bool) {
        self.report_progress = report_progress;
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn events(&self) -> &EventArena {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventArena {
        &mut self.events
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    pub fn date(&self) -> Date {
        self.date
    }

    pub fn initial_date(&self) -> Date {
        self.initial_date
    }

    /// Hash of the params this simulation was built from.
    pub fn params_hash(&self) -> u64 {
        self.params_hash
    }

    /// Puts `event` on the plan for `date`. Panics if `date` has already passed.
    pub fn register(&mut self, date: Date, event: EventId) {
        self.plan.register(date, event, &mut self.events, self.date);
    }

    pub fn register_all(&mut self, day_events: impl IntoIterator<Item = (Date, EventId)>) {
        self.plan
            .register_all(day_events, &mut self.events, self.date);
    }

    /// Everything seeding needs, borrowed at once.
    pub(crate) fn seeding_parts(
        &mut self,
    ) -> (
        &mut World,
        &mut EventArena,
        &mut DayPlan,
        &mut SmallRng,
        &DiseaseProgression,
    ) {
        (
            &mut self.world,
            &mut self.events,
            &mut self.plan,
            self.streams.get(SeedingRng),
            &self.progression,
        )
    }

    /// Runs one day. Returns false once the early-stop condition holds.
    pub fn simulate_day(&mut self) -> bool {
        let date = self.date;

        let mut ctx = ExtensionContext {
            date,
            world: &self.world,
            events: &mut self.events,
            plan: &mut self.plan,
        };
        for extension in &mut self.extensions {
            extension.start_of_day(&mut ctx);
        }

        while let Some(root) = self.plan.take(date) {
            let mut ctx = EventContext {
                date,
                world: &mut self.world,
                plan: &mut self.plan,
            };
            self.events.apply(root, &mut ctx);
        }

        let mut changed = self.world.changed_people();
        self.world.register_attendance(&changed, &self.factors);

        let rng = self.streams.get(TransmissionRng);
        let (persons, environments) = self.world.split_mut();
        for environment in environments.iter() {
            let day_events =
                environment.propagate(date, persons, &self.progression, rng, &mut self.events);
            self.plan.register_all(day_events, &mut self.events, date);
        }

        changed.extend(self.world.changed_people());
        changed.sort_unstable();
        changed.dedup();

        if let Some(r) = &mut self.r_computation {
            if date < self.initial_date + r.days {
                r.cohort.extend(changed.iter().copied().filter(|id| {
                    let person = self.world.get_person(*id);
                    person.last_state().is_susceptible()
                        && person.infection().is_some_and(|record| record.date == date)
                }));
            }
        }

        let day = self.statistics.record_day(date, &self.world, &changed);
        debug!(
            "{date}: {} new infections, {} changed, {} events applied so far",
            day.total_new_infections(),
            day.changed,
            self.events.applied_count()
        );

        for id in &changed {
            self.world.person_mut(*id).save_state();
        }

        let stop = self.r_cohort_resolved(date);
        self.date = date.next();
        !stop
    }

    fn r_cohort_resolved(&self, date: Date) -> bool {
        let Some(r) = &self.r_computation else {
            return false;
        };
        date.next() >= self.initial_date + r.days
            && r
                .cohort
                .iter()
                .all(|id| self.world.get_person(*id).state().is_terminal())
    }

    fn r_estimates(&self) -> Vec<REstimate> {
        let Some(r) = &self.r_computation else {
            return Vec::new();
        };
        (0..r.days)
            .map(|offset| {
                let date = self.initial_date + offset;
                let secondary: Vec<f64> = r
                    .cohort
                    .iter()
                    .map(|id| self.world.get_person(*id))
                    .filter(|p| p.infection().is_some_and(|record| record.date == date))
                    .map(|p| p.secondary_infections())
                    .collect();
                let r = if secondary.is_empty() {
                    0.0
                } else {
                    secondary.iter().sum::<f64>() / secondary.len() as f64
                };
                REstimate {
                    date,
                    cohort: secondary.len(),
                    r,
                }
            })
            .collect()
    }

    /// Runs up to `num_days` days, then closes the statistics. Panics if called twice.
    pub fn run_simulation(
        &mut self,
        num_days: u32,
        name: &str,
        datas_to_plot: &[Series],
    ) -> RunSummary {
        info!(
            "{name}: running {num_days} days over {} people",
            self.world.num_people()
        );
        let mut days_run = 0;
        let mut stopped_early = false;
        while days_run < num_days {
            let go_on = self.simulate_day();
            days_run += 1;
            #[cfg(feature = "progress_bar")]
            if self.report_progress {
                crate::progress::increment_day_progress();
            }
            if !go_on {
                stopped_early = true;
                info!("{name}: R cohort resolved after {days_run} days");
                break;
            }
        }

        let estimates = self.r_estimates();
        if !estimates.is_empty() {
            self.statistics.set_r_estimates(estimates);
        }
        self.statistics.mark_ending(&self.world);
        info!(
            "{name}: finished on {}, {} people ever infected",
            self.date,
            self.statistics.infections().len()
        );

        RunSummary {
            name: name.to_string(),
            days_run,
            stopped_early,
            plots: datas_to_plot
                .iter()
                .map(|series| (*series, self.statistics.series(*series)))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disease::DiseaseState;
    use crate::environment::EnvironmentKind;
    use crate::event::{Effect, Trigger};
    use crate::params::test_support::test_params;
    use crate::world::WorldBuilder;

    fn household_world(ages: &[u32], base_infectiousness: f64) -> World {
        let mut builder = WorldBuilder::new();
        let people: Vec<PersonId> = ages
            .iter()
            .map(|age| builder.add_person(*age, base_infectiousness))
            .collect();
        builder.add_environment(EnvironmentKind::Household, "home", people, 2.0);
        builder.build()
    }

    #[test]
    fn delayed_state_change_lands_on_day_three() {
        let params = test_params();
        let mut simulation =
            Simulation::new(household_world(&[10, 20, 30], 0.0), &params, &[], 1).unwrap();
        for id in 0..3 {
            let change = simulation.events_mut().create(
                Trigger::Empty,
                Effect::DiseaseStateChange {
                    person: PersonId(id),
                    old: DiseaseState::Susceptible,
                    new: DiseaseState::SymptomaticInfectious,
                },
            );
            let delayed = simulation
                .events_mut()
                .create(Trigger::Empty, Effect::Delayed { event: change, days: 3 });
            simulation.register(Date(0), delayed);
        }
        let symptomatic = |simulation: &Simulation| {
            simulation
                .world()
                .all_people()
                .iter()
                .filter(|p| p.state() == DiseaseState::SymptomaticInfectious)
                .count()
        };
        for _ in 0..3 {
            simulation.simulate_day();
            assert_eq!(symptomatic(&simulation), 0);
        }
        simulation.simulate_day();
        assert_eq!(symptomatic(&simulation), 3);
        assert_eq!(simulation.date(), Date(4));
    }

    #[test]
    fn statistics_close_after_the_run() {
        let params = test_params();
        let mut simulation =
            Simulation::new(household_world(&[10, 20], 1.0), &params, &[], 1).unwrap();
        let summary = simulation.run_simulation(5, "quiet", &[Series::Susceptible]);
        assert_eq!(summary.days_run, 5);
        assert!(!summary.stopped_early);
        assert_eq!(summary.plots[0].1, vec![2.0; 5]);
        assert!(simulation.statistics().is_ended());
        assert_eq!(simulation.statistics().snapshots().len(), 2);
    }

    #[test]
    fn r_computation_stops_once_the_cohort_resolves() {
        let params = test_params();
        let world = household_world(&[30, 40, 50, 60], 0.0);
        let strategy: SeedStrategy =
            serde_json::from_str(r#"{"mode": "random", "num_to_infect": 2}"#).unwrap();
        let mut simulation =
            Simulation::with_seed_strategy(world, &params, &[], &strategy, 3).unwrap();
        simulation.enable_r_computation(1);
        let summary = simulation.run_simulation(400, "r", &[]);
        assert!(summary.stopped_early);
        assert!(summary.days_run < 400);
        let estimates = simulation.statistics().r_estimates();
        assert_eq!(estimates.len(), 1);
        assert_eq!(estimates[0].cohort, 2);
        assert_eq!(estimates[0].r, 0.0);
    }
}

//! A day-stepped agent-based epidemic simulator
//!
//! Episim simulates a synthetic population one day at a time. People belong to environments
//! (households, neighborhood and city communities, schools, workplaces) that act as homogeneous
//! contact pools. Each day every environment draws new infections from the infectiousness of
//! the people attending it, and infected people progress through a stochastic disease course.
//!
//! Everything that happens on a given date is an event: disease transitions, routine changes made
//! by interventions, vaccinations. Events live in an arena and are referred to by id. They carry
//! a trigger deciding whether they fire, an effect, and hooks applied after them. Interventions
//! compile into events before day 0.
//!
//! The main pieces:
//! * [`world`]: the population, its generator and on-disk cache
//! * [`event`] and [`plan`]: events and the per-date index of pending work
//! * [`disease`]: per-age course sampling
//! * [`intervention`]: compiling interventions to events
//! * [`simulation`]: the day loop, seeding and statistics
//! * [`runner`]: the `episim` job driver and its outputs
pub mod disease;
pub mod environment;
pub mod error;
pub mod event;
pub mod execution_stats;
pub mod extension;
pub mod hashing;
pub mod intervention;
pub mod log;
pub mod params;
pub mod person;
pub mod plan;
#[cfg(feature = "progress_bar")]
pub mod progress;
pub mod random;
pub mod report;
pub mod routine;
pub mod runner;
pub mod seeding;
pub mod simulation;
pub mod statistics;
pub mod time;
pub mod world;

pub use error::EpiError;
pub use params::Params;
pub use simulation::{RunSummary, Simulation};
pub use time::Date;

// Re-exports for the `define_rng!` macro.
pub use paste;
pub use rand;

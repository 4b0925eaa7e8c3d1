use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use clap::{Args, Command, FromArgMatches as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{config_error, EpiError};
use crate::execution_stats::{
    log_execution_statistics, print_execution_statistics, ExecutionProfilingCollector,
};
use crate::extension::ExtensionConfig;
use crate::hashing::{hash_str, HashSet};
use crate::intervention::Intervention;
use crate::log::{error, info, set_log_level, LevelFilter};
use crate::params::Params;
use crate::report::RunReport;
use crate::seeding::SeedStrategy;
use crate::simulation::Simulation;
use crate::statistics::Series;
use crate::world::cache::WorldCache;
use crate::world::generator::{load_cities, CityDescription};

/// Command line arguments of the `episim` job driver
#[derive(Args, Debug, Clone)]
pub struct BaseArgs {
    /// Path of the parameters file
    #[arg(long)]
    pub params: PathBuf,

    /// Path of the city descriptions file
    #[arg(long)]
    pub cities: PathBuf,

    /// Path of the job list
    #[arg(long)]
    pub jobs: PathBuf,

    /// Each job writes its outputs to a directory of its name under this one
    #[arg(short, long)]
    pub output_dir: PathBuf,

    /// Worker threads. Defaults to the available parallelism
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Where generated populations are cached. Defaults to `<output-dir>/.population_cache`
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Seed for jobs that do not set their own
    #[arg(short, long, default_value = "0")]
    pub random_seed: u64,

    /// One of off, error, warn, info, debug, trace
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    /// Show a progress bar counting simulated days
    #[arg(long)]
    pub progress: bool,
}

/// One simulation run as listed in the job file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct JobSpec {
    pub name: String,
    /// A city name from the cities file, or `"all"`.
    pub city: String,
    #[serde(default = "default_scale")]
    pub scale: f64,
    pub num_days: u32,
    #[serde(default)]
    pub seed: Option<u64>,
    pub initial_infection: SeedStrategy,
    #[serde(default)]
    pub interventions: Vec<Intervention>,
    #[serde(default)]
    pub extensions: Vec<ExtensionConfig>,
    #[serde(default)]
    pub datas_to_plot: Vec<Series>,
    #[serde(default)]
    pub r_computation_days: Option<u32>,
    /// A JSON merge patch over the params file.
    #[serde(default)]
    pub params_overrides: Option<Value>,
}

fn default_scale() -> f64 {
    1.0
}

impl JobSpec {
    /// The job's own seed, or one derived from the driver seed and the job name.
    pub fn effective_seed(&self, random_seed: u64) -> u64 {
        self.seed
            .unwrap_or_else(|| hash_str(&format!("{random_seed}/{}", self.name)))
    }

    fn validate(&self) -> Result<(), EpiError> {
        if self.name.is_empty() || self.name.contains(['/', '\\']) {
            return Err(config_error(format!(
                "job name {:?} cannot name a directory",
                self.name
            )));
        }
        for intervention in &self.interventions {
            intervention.validate()?;
        }
        Ok(())
    }
}

/// Reads the job list. Job names must be unique since they name output directories.
pub fn load_jobs(path: &Path) -> Result<Vec<JobSpec>, EpiError> {
    let jobs: Vec<JobSpec> = serde_json::from_str(&std::fs::read_to_string(path)?)
        .map_err(|e| config_error(format!("invalid job file {}: {e}", path.display())))?;
    let mut names = HashSet::default();
    for job in &jobs {
        job.validate()?;
        if !names.insert(job.name.as_str()) {
            return Err(config_error(format!("duplicate job name {:?}", job.name)));
        }
    }
    Ok(jobs)
}

/// How one job ended. A job fails by returning an error or by panicking.
#[derive(Debug)]
pub struct JobOutcome {
    pub name: String,
    pub result: Result<JobResult, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    pub output_dir: PathBuf,
    pub days_run: u32,
    pub stopped_early: bool,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub jobs: Vec<JobOutcome>,
}

impl RunOutcome {
    pub fn failed(&self) -> usize {
        self.jobs.iter().filter(|job| job.result.is_err()).count()
    }

    pub fn simulated_days(&self) -> u64 {
        self.jobs
            .iter()
            .filter_map(|job| job.result.as_ref().ok())
            .map(|result| u64::from(result.days_run))
            .sum()
    }
}

/// A job ready for a worker: its params with overrides applied.
struct PreparedJob {
    spec: JobSpec,
    params: Arc<Params>,
    seed: u64,
}

fn create_episim_cli() -> Command {
    let cli = Command::new("episim").about("Runs a list of epidemic simulation jobs");
    BaseArgs::augment_args(cli)
}

/// Parses the process arguments and runs every job.
///
/// # Errors
/// Returns an error if the arguments, params, cities or job files are invalid, or if a
/// population cannot be built. Failed jobs are not errors; see [`RunOutcome::failed`].
pub fn run_with_args() -> Result<RunOutcome, EpiError> {
    let matches = create_episim_cli().get_matches();
    let args = BaseArgs::from_arg_matches(&matches).map_err(|e| config_error(e.to_string()))?;
    run_with_args_internal(&args)
}

/// Runs every job in `args.jobs`. Populations are generated into the cache first; then a pool
/// of workers each runs whole jobs.
///
/// # Errors
/// See [`run_with_args`].
pub fn run_with_args_internal(args: &BaseArgs) -> Result<RunOutcome, EpiError> {
    let level = LevelFilter::from_str(&args.log_level)
        .map_err(|_| config_error(format!("unknown log level {:?}", args.log_level)))?;
    set_log_level(level);

    let mut collector = ExecutionProfilingCollector::new();
    let base_params = Arc::new(Params::load(&args.params)?);
    let cities = load_cities(&args.cities)?;
    let jobs = prepare_jobs(load_jobs(&args.jobs)?, &base_params, args.random_seed)?;
    let cache = WorldCache::new(
        args.cache_dir
            .clone()
            .unwrap_or_else(|| args.output_dir.join(".population_cache")),
    );
    prebuild_cache(&cache, &cities, &jobs)?;

    #[cfg(feature = "progress_bar")]
    if args.progress {
        crate::progress::init_day_progress_bar(
            jobs.iter().map(|job| job.spec.num_days as usize).sum(),
        );
    }

    let threads = args
        .threads
        .or_else(|| thread::available_parallelism().ok().map(Into::into))
        .unwrap_or(1)
        .clamp(1, jobs.len().max(1));
    info!("running {} jobs on {threads} threads", jobs.len());

    let next_job = AtomicUsize::new(0);
    let finished = AtomicUsize::new(0);
    let outcomes = Mutex::new(Vec::with_capacity(jobs.len()));
    thread::scope(|scope| {
        for _ in 0..threads {
            scope.spawn(|| loop {
                let index = next_job.fetch_add(1, Ordering::Relaxed);
                let Some(job) = jobs.get(index) else {
                    break;
                };
                let outcome = run_job_guarded(job, &cache, args);
                outcomes
                    .lock()
                    .expect("Mutex poisoned")
                    .push((index, outcome));
                finished.fetch_add(1, Ordering::Release);
            });
        }
        while finished.load(Ordering::Acquire) < jobs.len() {
            collector.refresh();
            thread::sleep(Duration::from_millis(50));
        }
    });

    #[cfg(feature = "progress_bar")]
    if args.progress {
        crate::progress::finish_day_progress();
    }

    let mut outcomes = outcomes.into_inner().expect("Mutex poisoned");
    outcomes.sort_by_key(|(index, _)| *index);
    let outcome = RunOutcome {
        jobs: outcomes.into_iter().map(|(_, outcome)| outcome).collect(),
    };

    let stats = collector.compute_final_statistics(
        outcome.jobs.len(),
        outcome.failed(),
        outcome.simulated_days(),
    );
    log_execution_statistics(&stats);
    print_execution_statistics(&stats);
    Ok(outcome)
}

fn prepare_jobs(
    specs: Vec<JobSpec>,
    base_params: &Arc<Params>,
    random_seed: u64,
) -> Result<Vec<PreparedJob>, EpiError> {
    specs
        .into_iter()
        .map(|spec| {
            let params = match &spec.params_overrides {
                Some(overrides) => Arc::new(base_params.with_overrides(overrides)?),
                None => Arc::clone(base_params),
            };
            let seed = spec.effective_seed(random_seed);
            Ok(PreparedJob { spec, params, seed })
        })
        .collect()
}

/// Generates every population the jobs need that is not already cached.
fn prebuild_cache(
    cache: &WorldCache,
    cities: &[CityDescription],
    jobs: &[PreparedJob],
) -> Result<(), EpiError> {
    let mut done = HashSet::default();
    for job in jobs {
        let key = (
            job.spec.city.clone(),
            job.spec.scale.to_bits(),
            job.params.hash(),
        );
        if done.insert(key) {
            cache.load_or_generate(&job.params, cities, &job.spec.city, job.spec.scale)?;
        }
    }
    Ok(())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panicked".to_string()
    }
}

fn run_job_guarded(job: &PreparedJob, cache: &WorldCache, args: &BaseArgs) -> JobOutcome {
    let name = job.spec.name.clone();
    let result = match panic::catch_unwind(AssertUnwindSafe(|| run_job(job, cache, args))) {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => Err(panic_message(payload.as_ref())),
    };
    if let Err(message) = &result {
        error!("job {name} failed: {message}");
    }
    JobOutcome { name, result }
}

fn run_job(job: &PreparedJob, cache: &WorldCache, args: &BaseArgs) -> Result<JobResult, EpiError> {
    let spec = &job.spec;
    let params_hash = job.params.hash();
    let world = cache
        .load(&spec.city, spec.scale, params_hash)?
        .ok_or_else(|| {
            EpiError::SimulationError(format!(
                "population for {} at scale {} missing from {}",
                spec.city,
                spec.scale,
                cache.dir().display()
            ))
        })?;

    let mut simulation = Simulation::with_seed_strategy(
        world,
        &job.params,
        &spec.interventions,
        &spec.initial_infection,
        job.seed,
    )?;
    for extension in &spec.extensions {
        simulation.add_extension(extension.build());
    }
    if let Some(days) = spec.r_computation_days {
        simulation.enable_r_computation(days);
    }
    simulation.set_report_progress(args.progress);

    let run = simulation.run_simulation(spec.num_days, &spec.name, &spec.datas_to_plot);
    let output_dir = RunReport {
        run: &run,
        statistics: simulation.statistics(),
        params: &job.params,
        params_hash: simulation.params_hash(),
        interventions: &spec.interventions,
        extensions: &spec.extensions,
        initial_infection: &spec.initial_infection,
        city: &spec.city,
        scale: spec.scale,
        num_days: spec.num_days,
        seed: job.seed,
    }
    .write(&args.output_dir)?;

    Ok(JobResult {
        output_dir,
        days_run: run.days_run,
        stopped_early: run.stopped_early,
    })
}

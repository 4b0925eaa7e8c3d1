// Loss of precision is allowable in this module's use cases.
#![allow(clippy::cast_precision_loss)]

use std::time::{Duration, Instant};

use bytesize::ByteSize;
use humantime::format_duration;
use serde::Serialize;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use crate::log::{debug, error, info};

/// How frequently we update the max memory used value.
const REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Resource use of a whole driver run. Per-day figures are zero when no day was simulated.
#[derive(Serialize, Debug, Clone)]
pub struct ExecutionStatistics {
    pub max_memory_usage: u64,
    pub cpu_time: Duration,
    pub wall_time: Duration,

    pub jobs: usize,
    pub failed_jobs: usize,
    pub simulated_days: u64,
    pub wall_time_per_day: Duration,
}

pub struct ExecutionProfilingCollector {
    start_time: Instant,
    last_refresh: Instant,
    /// CPU-milliseconds the process had used when collection started.
    start_cpu_time: u64,
    max_memory_usage: u64,
    system: System,
    /// `None` where the platform does not expose process statistics.
    process_id: Option<Pid>,
}

impl Default for ExecutionProfilingCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionProfilingCollector {
    pub fn new() -> ExecutionProfilingCollector {
        let process_id = sysinfo::get_current_pid().ok();
        let now = Instant::now();

        let mut collector = ExecutionProfilingCollector {
            start_time: now,
            last_refresh: now,
            start_cpu_time: 0,
            max_memory_usage: 0,
            system: System::new(),
            process_id,
        };
        if let Some(process_id) = process_id {
            debug!("process id: {process_id}");
            collector.update_system_info(ProcessRefreshKind::nothing().with_cpu().with_memory());
            if let Some(process) = collector.system.process(process_id) {
                collector.max_memory_usage = process.memory();
                collector.start_cpu_time = process.accumulated_cpu_time();
            }
        }
        collector
    }

    /// Polls memory use if at least `REFRESH_INTERVAL` has passed since the last poll. Cheap to
    /// call often.
    #[inline]
    pub fn refresh(&mut self) {
        if self.last_refresh.elapsed() >= REFRESH_INTERVAL {
            self.poll_memory();
            self.last_refresh = Instant::now();
        }
    }

    fn poll_memory(&mut self) {
        if let Some(pid) = self.process_id {
            self.update_system_info(ProcessRefreshKind::nothing().with_memory());
            if let Some(process) = self.system.process(pid) {
                self.max_memory_usage = self.max_memory_usage.max(process.memory());
            }
        }
    }

    #[inline]
    fn update_system_info(&mut self, process_refresh_kind: ProcessRefreshKind) {
        if let Some(pid) = self.process_id {
            if self.system.refresh_processes_specifics(
                ProcessesToUpdate::Some(&[pid]),
                true,
                process_refresh_kind,
            ) < 1
            {
                error!("could not refresh process statistics");
            }
        }
    }

    pub fn compute_final_statistics(
        &mut self,
        jobs: usize,
        failed_jobs: usize,
        simulated_days: u64,
    ) -> ExecutionStatistics {
        let mut cpu_time_millis = 0;
        if let Some(pid) = self.process_id {
            self.update_system_info(ProcessRefreshKind::nothing().with_cpu().with_memory());
            if let Some(process) = self.system.process(pid) {
                self.max_memory_usage = self.max_memory_usage.max(process.memory());
                cpu_time_millis = process
                    .accumulated_cpu_time()
                    .saturating_sub(self.start_cpu_time);
            }
        }

        let wall_time = self.start_time.elapsed();
        let wall_time_per_day = if simulated_days > 0 {
            Duration::from_secs_f64(wall_time.as_secs_f64() / simulated_days as f64)
        } else {
            Duration::ZERO
        };

        ExecutionStatistics {
            max_memory_usage: self.max_memory_usage,
            cpu_time: Duration::from_millis(cpu_time_millis),
            wall_time,
            jobs,
            failed_jobs,
            simulated_days,
            wall_time_per_day,
        }
    }
}

/// Logs execution statistics with the logging system.
pub fn log_execution_statistics(stats: &ExecutionStatistics) {
    info!(
        "{} jobs finished, {} failed, {} days simulated",
        stats.jobs, stats.failed_jobs, stats.simulated_days
    );
    if stats.max_memory_usage == 0 {
        info!("Memory and CPU statistics are not available on your platform.");
    } else {
        info!("Max memory usage: {}", ByteSize::b(stats.max_memory_usage));
        info!("CPU time: {}", format_duration(stats.cpu_time));
    }
    info!("Wall time: {}", format_duration(stats.wall_time));
    if stats.simulated_days > 0 {
        info!(
            "Wall time per simulated day: {}",
            format_duration(stats.wall_time_per_day)
        );
    }
}

/// Prints execution statistics to the console.
pub fn print_execution_statistics(stats: &ExecutionStatistics) {
    println!("━━━━ Execution Summary ━━━━");
    println!("{:<25}{}", "Jobs:", stats.jobs);
    println!("{:<25}{}", "Failed jobs:", stats.failed_jobs);
    println!("{:<25}{}", "Simulated days:", stats.simulated_days);
    if stats.max_memory_usage == 0 {
        println!("Memory and CPU statistics are not available on your platform.");
    } else {
        println!(
            "{:<25}{}",
            "Max memory usage:",
            ByteSize::b(stats.max_memory_usage)
        );
        println!("{:<25}{}", "CPU time:", format_duration(stats.cpu_time));
    }
    println!("{:<25}{}", "Wall time:", format_duration(stats.wall_time));
    if stats.simulated_days > 0 {
        println!(
            "{:<25}{}",
            "Wall time per day:",
            format_duration(stats.wall_time_per_day)
        );
    }
}

use std::process::ExitCode;

use episim::runner::run_with_args;

fn main() -> ExitCode {
    match run_with_args() {
        Ok(outcome) => {
            for job in &outcome.jobs {
                match &job.result {
                    Ok(result) => println!(
                        "{}: {} days -> {}",
                        job.name,
                        result.days_run,
                        result.output_dir.display()
                    ),
                    Err(message) => eprintln!("{}: FAILED: {message}", job.name),
                }
            }
            if outcome.failed() > 0 {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::from(2)
        }
    }
}

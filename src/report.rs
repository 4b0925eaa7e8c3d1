//! Per-run output directories.
//!
//! Every finished job gets a fresh directory named after it under the output root:
//!
//! | file                               | contents                                            |
//! |------------------------------------|-----------------------------------------------------|
//! | `statistics.bin`                   | the closed [`Statistics`], bincode encoded          |
//! | `summary.{csv,txt}`                | end-of-run shares of the population                 |
//! | `summary_long.{csv,txt}`           | the same shares per ten-year age band               |
//! | `absolute_table.{csv,txt}`         | end-of-run counts                                   |
//! | `absolute_table_long.{csv,txt}`    | counts per ten-year age band                        |
//! | `inputs.txt`                       | what the job asked for                              |
//! | `interventions_inputs.csv`         | one row per intervention parameter                  |
//! | `params.json`                      | the effective parameters                            |
//! | `<series>.csv`                     | one per requested series                            |
//! | `r_data.csv`                       | R estimates, when R computation was on              |
//!
//! Writing into an existing directory is refused with [`EpiError::OutputExists`].

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use csv::Writer;

use crate::error::EpiError;
use crate::extension::ExtensionConfig;
use crate::hashing::HashMap;
use crate::intervention::Intervention;
use crate::log::{debug, info};
use crate::params::{Params, AGE_BANDS};
use crate::seeding::SeedStrategy;
use crate::simulation::RunSummary;
use crate::statistics::{Statistics, Summary};

/// Everything a run directory is written from.
pub struct RunReport<'a> {
    pub run: &'a RunSummary,
    pub statistics: &'a Statistics,
    pub params: &'a Params,
    /// Hash the simulation recorded when it was built; `params` must still match it.
    pub params_hash: u64,
    pub interventions: &'a [Intervention],
    pub extensions: &'a [ExtensionConfig],
    pub initial_infection: &'a SeedStrategy,
    pub city: &'a str,
    pub scale: f64,
    pub num_days: u32,
    pub seed: u64,
}

fn age_bands() -> Vec<(String, (u32, u32))> {
    (0..AGE_BANDS as u32)
        .map(|band| {
            let lo = band * 10;
            if band as usize == AGE_BANDS - 1 {
                (format!("{lo}+"), (lo, u32::MAX))
            } else {
                (format!("{lo}-{}", lo + 9), (lo, lo + 9))
            }
        })
        .collect()
}

fn share(count: usize, population: usize) -> f64 {
    if population == 0 {
        0.0
    } else {
        count as f64 / population as f64
    }
}

/// A table of named rows with one value column per heading.
struct Table {
    headings: Vec<String>,
    rows: Vec<(String, Vec<String>)>,
}

impl Table {
    fn from_summaries(summaries: &[(String, Summary)], relative: bool) -> Table {
        let headings = summaries.iter().map(|(name, _)| name.clone()).collect();
        let mut rows = Vec::new();
        let Some((_, first)) = summaries.first() else {
            return Table { headings, rows };
        };
        for (row, _) in first.rows() {
            if relative && row == "Population" {
                continue;
            }
            let values = summaries
                .iter()
                .map(|(_, summary)| {
                    let count = summary[row.as_str()];
                    if relative {
                        format!("{:.4}", share(count, summary["Population"]))
                    } else {
                        count.to_string()
                    }
                })
                .collect();
            rows.push((row.clone(), values));
        }
        Table { headings, rows }
    }

    fn write_csv(&self, path: &Path) -> Result<(), EpiError> {
        let mut writer = Writer::from_path(path)?;
        let mut header = vec!["name"];
        header.extend(self.headings.iter().map(String::as_str));
        writer.write_record(&header)?;
        for (name, values) in &self.rows {
            let mut record = vec![name.as_str()];
            record.extend(values.iter().map(String::as_str));
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }

    fn write_txt(&self, path: &Path) -> Result<(), EpiError> {
        let name_width = self.rows.iter().map(|(n, _)| n.len()).max().unwrap_or(0) + 2;
        let mut text = format!("{:name_width$}", "");
        for heading in &self.headings {
            let _ = write!(text, "{heading:>12}");
        }
        text.push('\n');
        for (name, values) in &self.rows {
            let _ = write!(text, "{name:name_width$}");
            for value in values {
                let _ = write!(text, "{value:>12}");
            }
            text.push('\n');
        }
        fs::write(path, text)?;
        Ok(())
    }

    fn write_both(&self, dir: &Path, stem: &str) -> Result<(), EpiError> {
        self.write_csv(&dir.join(format!("{stem}.csv")))?;
        self.write_txt(&dir.join(format!("{stem}.txt")))
    }
}

impl RunReport<'_> {
    /// Creates `<root>/<run name>` and fills it. Panics if the params no longer hash to
    /// `params_hash`.
    pub fn write(&self, root: &Path) -> Result<PathBuf, EpiError> {
        let dir = root.join(&self.run.name);
        if dir.exists() {
            return Err(EpiError::OutputExists(dir));
        }
        fs::create_dir_all(root)?;
        fs::create_dir(&dir)?;

        fs::write(dir.join("statistics.bin"), self.statistics.to_bytes()?)?;
        self.write_tables(&dir)?;
        self.write_inputs(&dir)?;
        self.write_interventions(&dir)?;
        self.write_params(&dir)?;
        self.write_series(&dir)?;
        self.write_r_data(&dir)?;

        info!("{}: outputs written to {}", self.run.name, dir.display());
        Ok(dir)
    }

    fn write_tables(&self, dir: &Path) -> Result<(), EpiError> {
        let total = vec![("all".to_string(), self.statistics.summary(None))];
        let by_age: Vec<(String, Summary)> = age_bands()
            .into_iter()
            .map(|(label, range)| (label, self.statistics.summary(Some(range))))
            .collect();

        Table::from_summaries(&total, true).write_both(dir, "summary")?;
        Table::from_summaries(&by_age, true).write_both(dir, "summary_long")?;
        Table::from_summaries(&total, false).write_both(dir, "absolute_table")?;
        Table::from_summaries(&by_age, false).write_both(dir, "absolute_table_long")
    }

    fn write_inputs(&self, dir: &Path) -> Result<(), EpiError> {
        let mut text = String::new();
        let _ = writeln!(text, "name: {}", self.run.name);
        let _ = writeln!(text, "city: {}", self.city);
        let _ = writeln!(text, "scale: {}", self.scale);
        let _ = writeln!(text, "seed: {}", self.seed);
        let _ = writeln!(text, "days requested: {}", self.num_days);
        let _ = writeln!(text, "days run: {}", self.run.days_run);
        let _ = writeln!(text, "stopped early: {}", self.run.stopped_early);
        let _ = writeln!(text, "population: {}", self.statistics.population());
        let _ = writeln!(text, "params hash: {:016x}", self.params_hash);
        let _ = writeln!(
            text,
            "initial infection: {}",
            serde_json::to_string(self.initial_infection)?
        );
        for intervention in self.interventions {
            let _ = writeln!(
                text,
                "intervention: {}",
                serde_json::to_string(intervention)?
            );
        }
        for extension in self.extensions {
            let _ = writeln!(text, "extension: {}", serde_json::to_string(extension)?);
        }
        fs::write(dir.join("inputs.txt"), text)?;
        Ok(())
    }

    fn write_interventions(&self, dir: &Path) -> Result<(), EpiError> {
        let mut writer = Writer::from_path(dir.join("interventions_inputs.csv"))?;
        writer.write_record(["type", "instance", "key", "value"])?;
        let mut instances: HashMap<&str, usize> = HashMap::default();
        for intervention in self.interventions {
            let type_name = intervention.type_name();
            let count = instances.entry(type_name).or_default();
            *count += 1;
            let instance = count.to_string();
            for (key, value) in intervention.parameters() {
                writer.write_record([type_name, instance.as_str(), key.as_str(), value.as_str()])?;
            }
        }
        writer.flush()?;
        Ok(())
    }

    fn write_params(&self, dir: &Path) -> Result<(), EpiError> {
        assert_eq!(
            self.params.hash(),
            self.params_hash,
            "params changed while {} was running",
            self.run.name
        );
        let file = fs::File::create(dir.join("params.json"))?;
        serde_json::to_writer_pretty(file, self.params)?;
        Ok(())
    }

    fn write_series(&self, dir: &Path) -> Result<(), EpiError> {
        for (series, values) in &self.run.plots {
            let path = dir.join(format!("{}.csv", series.as_ref()));
            let mut writer = Writer::from_path(&path)?;
            writer.write_record(["date", series.as_ref()])?;
            for (day, value) in self.statistics.days().iter().zip(values) {
                writer.write_record([day.date.0.to_string(), value.to_string()])?;
            }
            writer.flush()?;
            debug!("wrote {}", path.display());
        }
        Ok(())
    }

    fn write_r_data(&self, dir: &Path) -> Result<(), EpiError> {
        let estimates = self.statistics.r_estimates();
        if estimates.is_empty() {
            return Ok(());
        }
        let mut writer = Writer::from_path(dir.join("r_data.csv"))?;
        writer.write_record(["date", "cohort", "r"])?;
        for estimate in estimates {
            writer.write_record([
                estimate.date.0.to_string(),
                estimate.cohort.to_string(),
                estimate.r.to_string(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }
}

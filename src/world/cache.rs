//! Generated worlds stored on disk as bincode, one file per (city, scale, params hash).
//!
//! The job driver fills the cache before starting workers; workers only read it.

use std::fs;
use std::path::{Path, PathBuf};

use super::generator::{generate_world, CityDescription};
use super::World;
use crate::error::EpiError;
use crate::hashing::hash_str;
use crate::log::{debug, info};
use crate::params::Params;

#[derive(Debug, Clone)]
pub struct WorldCache {
    dir: PathBuf,
}

/// Deterministic generation seed for a cache entry.
pub fn population_seed(city: &str, scale: f64, params_hash: u64) -> u64 {
    hash_str(&format!("{city}/{scale}/{params_hash:016x}"))
}

impl WorldCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, city: &str, scale: f64, params_hash: u64) -> PathBuf {
        let city = city.replace(|c: char| !c.is_ascii_alphanumeric(), "_");
        self.dir
            .join(format!("{city}_{scale}_{params_hash:016x}.bin"))
    }

    pub fn load(&self, city: &str, scale: f64, params_hash: u64) -> Result<Option<World>, EpiError> {
        let path = self.path_for(city, scale, params_hash);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        let (world, _): (World, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())?;
        debug!("loaded world from {}", path.display());
        Ok(Some(world))
    }

    pub fn store(
        &self,
        world: &World,
        city: &str,
        scale: f64,
        params_hash: u64,
    ) -> Result<PathBuf, EpiError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(city, scale, params_hash);
        let bytes = bincode::serde::encode_to_vec(world, bincode::config::standard())?;
        // Readers never observe a partially written file.
        let partial = path.with_extension("partial");
        fs::write(&partial, bytes)?;
        fs::rename(&partial, &path)?;
        info!("cached world at {}", path.display());
        Ok(path)
    }

    /// Returns the cached world, generating and storing it first if needed.
    pub fn load_or_generate(
        &self,
        params: &Params,
        cities: &[CityDescription],
        city: &str,
        scale: f64,
    ) -> Result<World, EpiError> {
        let params_hash = params.hash();
        if let Some(world) = self.load(city, scale, params_hash)? {
            return Ok(world);
        }
        let world = generate_uncached(params, cities, city, scale)?;
        self.store(&world, city, scale, params_hash)?;
        Ok(world)
    }
}

/// `city` is either a city name from `cities` or `"all"`.
pub fn generate_uncached(
    params: &Params,
    cities: &[CityDescription],
    city: &str,
    scale: f64,
) -> Result<World, EpiError> {
    let selected: Vec<CityDescription> = if city == "all" {
        cities.to_vec()
    } else {
        cities.iter().filter(|c| c.name == city).cloned().collect()
    };
    if selected.is_empty() {
        return Err(EpiError::ConfigError(format!("unknown city {city:?}")));
    }
    generate_world(
        params,
        &selected,
        scale,
        population_seed(city, scale, params.hash()),
    )
}

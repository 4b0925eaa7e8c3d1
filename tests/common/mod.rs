#![allow(dead_code)]

use std::path::{Path, PathBuf};

use episim::environment::EnvironmentKind;
use episim::intervention::Intervention;
use episim::person::PersonId;
use episim::seeding::SeedStrategy;
use episim::world::cache::generate_uncached;
use episim::world::generator::load_cities;
use episim::world::{World, WorldBuilder};
use episim::Params;

pub const KEFAR_YONA: &str = "kefar yona";

pub fn data_path(file: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("data").join(file)
}

pub fn params() -> Params {
    Params::load(&data_path("params.json")).expect("bundled params are valid")
}

/// The bundled city at `scale`, generated with the given params.
pub fn kefar_yona(params: &Params, scale: f64) -> World {
    let cities = load_cities(&data_path("cities.json")).expect("bundled cities are valid");
    generate_uncached(params, &cities, KEFAR_YONA, scale).expect("kefar yona generates")
}

/// One household holding everybody.
pub fn household(ages: &[u32], base_infectiousness: f64) -> World {
    let mut builder = WorldBuilder::new();
    let people: Vec<PersonId> = ages
        .iter()
        .map(|age| builder.add_person(*age, base_infectiousness))
        .collect();
    builder.add_environment(EnvironmentKind::Household, "home", people, 2.0);
    builder.build()
}

pub fn random_seed(num_to_infect: usize) -> SeedStrategy {
    serde_json::from_str(&format!(
        r#"{{"mode": "random", "num_to_infect": {num_to_infect}}}"#
    ))
    .unwrap()
}

pub fn interventions(json: &str) -> Vec<Intervention> {
    serde_json::from_str(json).unwrap()
}

//! Named, independently seeded random streams.
//!
//! A simulation owns one [`RandomStreams`]. Code that needs randomness asks it for the stream it
//! draws from and passes the resulting `&mut` generator down to the sampling site. Nothing in the
//! crate touches a global or thread-local generator, so a run is a pure function of its seed.
mod macros;
mod sampling_algorithms;

use std::any::{Any, TypeId};

pub use macros::define_rng;
pub use sampling_algorithms::{bisect_cumulative, permutation, sample_without_replacement};

use crate::hashing::{hash_str, HashMap};
use crate::log::trace;
use crate::rand::{Rng, SeedableRng};

pub trait RngId: Copy + Clone {
    type RngType: SeedableRng + Rng + Send + 'static;
    fn get_name() -> &'static str;
}

pub struct RandomStreams {
    base_seed: u64,
    rngs: HashMap<TypeId, Box<dyn Any + Send>>,
}

impl RandomStreams {
    #[must_use]
    pub fn new(base_seed: u64) -> Self {
        Self {
            base_seed,
            rngs: HashMap::default(),
        }
    }

    #[must_use]
    pub fn base_seed(&self) -> u64 {
        self.base_seed
    }

    /// Streams for a nested run (the smart seed's mock simulation). The derived seed does not
    /// collide with any stream of `self`.
    #[must_use]
    pub fn derive(&self, label: &str) -> RandomStreams {
        RandomStreams::new(self.base_seed ^ hash_str(label).rotate_left(17))
    }

    /// The generator for stream `R`, created on first use.
    pub fn get<R: RngId + 'static>(&mut self, _rng_id: R) -> &mut R::RngType {
        let base_seed = self.base_seed;
        self.rngs
            .entry(TypeId::of::<R>())
            .or_insert_with(|| {
                trace!("creating RNG {} (base seed {})", R::get_name(), base_seed);
                let seed_offset = hash_str(R::get_name());
                Box::new(R::RngType::seed_from_u64(base_seed.wrapping_add(seed_offset)))
            })
            .downcast_mut::<R::RngType>()
            .expect("RNG stored under the TypeId of its own RngId")
    }
}

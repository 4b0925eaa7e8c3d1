//! Small sampling helpers shared by seeding, interventions and the disease model.

use crate::rand::seq::index::sample as choose_range;
use crate::rand::seq::SliceRandom;
use crate::rand::Rng;

/// Picks `requested` distinct items uniformly at random. The result keeps the input order, which
/// keeps downstream iteration deterministic. Returns everything if fewer items are available.
pub fn sample_without_replacement<R, T>(rng: &mut R, items: &[T], requested: usize) -> Vec<T>
where
    R: Rng,
    T: Clone,
{
    if requested >= items.len() {
        return items.to_vec();
    }
    let mut indexes = choose_range(rng, items.len(), requested).into_vec();
    indexes.sort_unstable();
    indexes.into_iter().map(|i| items[i].clone()).collect()
}

/// A uniformly random ordering of `0..n`.
pub fn permutation<R: Rng>(rng: &mut R, n: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(rng);
    order
}

/// Index of the first cumulative probability that is `>= u`. `cumulative` must be
/// non-decreasing; draws past the last entry (rounding) map to the last index.
pub fn bisect_cumulative(cumulative: &[f64], u: f64) -> usize {
    let index = cumulative.partition_point(|&c| c < u);
    index.min(cumulative.len().saturating_sub(1))
}

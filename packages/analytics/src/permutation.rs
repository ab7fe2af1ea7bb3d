//! Seeded permutation inference shared by every statistic.
//!
//! Each permutation of a global test, and each area of a conditional
//! local test, draws from its own RNG stream derived from the master
//! seed and the stream index. Workers never share a generator, so results
//! are bit-for-bit identical whatever the thread count or scheduling.

use std::sync::Arc;

use need_map_analytics_models::SimulationSummary;
use need_map_spatial::SpatialWeights;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::{SliceRandom, index};
use rayon::prelude::*;

use crate::progress::ProgressCallback;
use crate::standardize::{mean, population_std};

const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

/// splitmix64 finalizer.
const fn mix(value: u64) -> u64 {
    let mut z = value.wrapping_add(GOLDEN_GAMMA);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Seed of stream `stream` under the master `seed`.
#[must_use]
pub const fn sub_seed(seed: u64, stream: u64) -> u64 {
    mix(seed ^ mix(stream))
}

/// Independent generator for one stream.
#[must_use]
pub fn stream_rng(seed: u64, stream: u64) -> StdRng {
    StdRng::seed_from_u64(sub_seed(seed, stream))
}

/// Folded pseudo p-value of `observed` against `simulated`.
///
/// Counts simulated values at or above the observed one and at or below
/// it, and takes the smaller tail. Ties fall in both tails, so a value
/// equal to every draw is never extreme. Result is
/// `(extreme + 1) / (permutations + 1)`.
#[must_use]
pub fn folded_p_value(observed: f64, simulated: &[f64]) -> f64 {
    let mut tails = Tails::default();
    for &s in simulated {
        tails.record(s, observed);
    }
    tails.p_value(simulated.len())
}

#[derive(Debug, Default, Clone, Copy)]
struct Tails {
    at_least: usize,
    at_most: usize,
}

impl Tails {
    const fn record(&mut self, simulated: f64, observed: f64) {
        if simulated >= observed {
            self.at_least += 1;
        }
        if simulated <= observed {
            self.at_most += 1;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn p_value(self, permutations: usize) -> f64 {
        let extreme = self.at_least.min(self.at_most);
        (extreme + 1) as f64 / (permutations + 1) as f64
    }
}

/// Recomputes `statistic` over `permutations` random reorderings of
/// `values`, in permutation order.
pub fn permute_values<F>(
    values: &[f64],
    permutations: u32,
    seed: u64,
    progress: &Arc<dyn ProgressCallback>,
    statistic: F,
) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64 + Sync,
{
    progress.set_total(u64::from(permutations));
    (0..permutations)
        .into_par_iter()
        .map(|p| {
            let mut rng = stream_rng(seed, u64::from(p));
            let mut shuffled = values.to_vec();
            shuffled.shuffle(&mut rng);
            let simulated = statistic(&shuffled);
            progress.inc(1);
            simulated
        })
        .collect()
}

/// Summarizes a reference distribution around the observed statistic.
#[must_use]
pub fn summarize(
    observed: f64,
    simulated: &[f64],
    permutations: u32,
    seed: u64,
) -> SimulationSummary {
    let mean_sim = mean(simulated);
    let std_sim = population_std(simulated);
    SimulationSummary {
        permutations,
        seed,
        p_sim: folded_p_value(observed, simulated),
        mean: mean_sim,
        std_dev: std_sim,
        z_score: (std_sim > 0.0).then(|| (observed - mean_sim) / std_sim),
    }
}

/// Conditional permutation p-values for a local statistic
/// `focal[i] * lag(linked)[i]`.
///
/// Area `i` keeps its focal value while `|N(i)|` linked values are drawn
/// without replacement from the other `n - 1` areas. Islands get `None`.
///
/// # Panics
///
/// Panics if `focal`, `linked` or `observed` is shorter than the graph.
#[allow(clippy::cast_precision_loss)]
pub fn conditional_p_values(
    weights: &SpatialWeights,
    focal: &[f64],
    linked: &[f64],
    observed: &[f64],
    permutations: u32,
    seed: u64,
    progress: &Arc<dyn ProgressCallback>,
) -> Vec<Option<f64>> {
    let n = weights.len();
    let draws = permutations as usize;
    progress.set_total(n as u64);

    (0..n)
        .into_par_iter()
        .map(|i| {
            let k = weights.cardinality(i);
            let p_sim = (k > 0).then(|| {
                let mut rng = stream_rng(seed, i as u64);
                let row_weight = 1.0 / k as f64;
                let mut tails = Tails::default();
                for _ in 0..draws {
                    let drawn = index::sample(&mut rng, n - 1, k);
                    let sum: f64 = drawn
                        .iter()
                        .map(|j| linked[if j < i { j } else { j + 1 }])
                        .sum();
                    tails.record(focal[i] * sum * row_weight, observed[i]);
                }
                tails.p_value(draws)
            });
            progress.inc(1);
            p_sim
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::null_progress;
    use crate::test_support::{assert_close, line};

    #[test]
    fn sub_seeds_differ_per_stream_and_seed() {
        assert_ne!(sub_seed(42, 0), sub_seed(42, 1));
        assert_ne!(sub_seed(42, 0), sub_seed(43, 0));
        assert_eq!(sub_seed(42, 7), sub_seed(42, 7));
    }

    #[test]
    fn p_value_folds_to_the_nearer_tail() {
        let sims: Vec<f64> = (0..99).map(f64::from).collect();
        // 1 value >= 98 -> (1 + 1) / 100
        assert_close(folded_p_value(98.0, &sims), 0.02, 1e-12);
        // 99 values >= -1 -> folded to 0 -> 1 / 100
        assert_close(folded_p_value(-1.0, &sims), 0.01, 1e-12);
        // 50 values >= 49 and 50 values <= 49 -> 51 / 100
        assert_close(folded_p_value(49.0, &sims), 0.51, 1e-12);
    }

    #[test]
    fn p_value_of_a_value_tied_with_every_draw_is_one() {
        assert_close(folded_p_value(0.0, &[0.0; 9]), 1.0, 1e-12);
        assert_close(folded_p_value(2.0, &[2.0; 99]), 1.0, 1e-12);
    }

    #[test]
    fn ties_count_toward_both_tails() {
        // Two ties: 2 values >= 1 and 9 values <= 1 -> (2 + 1) / 10
        let sims = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0];
        let mut with_larger = sims.to_vec();
        with_larger[0] = 5.0;
        assert_close(folded_p_value(1.0, &sims), 0.3, 1e-12);
        // 3 values >= 1 and 8 values <= 1 -> (3 + 1) / 10
        assert_close(folded_p_value(1.0, &with_larger), 0.4, 1e-12);
    }

    #[test]
    fn permutations_are_reproducible() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let progress = null_progress();
        let first_element = |v: &[f64]| v[0];
        let a = permute_values(&values, 50, 42, &progress, first_element);
        let b = permute_values(&values, 50, 42, &progress, first_element);
        let c = permute_values(&values, 50, 7, &progress, first_element);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.iter().all(|v| values.contains(v)));
    }

    #[test]
    fn permutation_preserves_the_multiset() {
        let values = [3.0, 1.0, 4.0, 1.0, 5.0];
        let sums = permute_values(&values, 20, 1, &null_progress(), |v| v.iter().sum());
        assert!(sums.iter().all(|&s| (s - 14.0).abs() < 1e-12));
    }

    #[test]
    fn summary_of_constant_distribution_has_no_z() {
        let summary = summarize(1.0, &[0.5; 9], 9, 42);
        assert_eq!(summary.z_score, None);
        assert_close(summary.p_sim, 0.1, 1e-12);
        assert_eq!(summary.permutations, 9);
    }

    #[test]
    fn conditional_test_skips_islands() {
        let ids = (1..=4)
            .map(|i| need_map_geography_models::AreaId::new(i.to_string()))
            .collect();
        let w = SpatialWeights::from_adjacency(ids, [(0, 1), (1, 2)]).unwrap();
        let z = [-1.0, 0.0, 1.0, 2.0];
        let observed: Vec<f64> = (0..4).map(|i| z[i] * w.lag_at(i, &z)).collect();
        let p = conditional_p_values(&w, &z, &z, &observed, 99, 42, &null_progress());
        assert!(p[..3].iter().all(Option::is_some));
        assert_eq!(p[3], None);
        // Area 1 has z = 0, so every draw ties its statistic.
        assert_eq!(p[1], Some(1.0));
    }

    #[test]
    fn conditional_test_is_reproducible() {
        let w = line(6);
        let z = [-2.0, -1.0, -0.5, 0.5, 1.0, 2.0];
        let observed: Vec<f64> = (0..6).map(|i| z[i] * w.lag_at(i, &z)).collect();
        let a = conditional_p_values(&w, &z, &z, &observed, 199, 42, &null_progress());
        let b = conditional_p_values(&w, &z, &z, &observed, 199, 42, &null_progress());
        assert_eq!(a, b);
        for p in a.into_iter().flatten() {
            assert!(p >= 1.0 / 200.0 && p <= 1.0, "p = {p}");
        }
    }
}

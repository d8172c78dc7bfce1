use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::kinematics::object::{pair_mass, Kinematic};

/// Nominal W boson mass used as the pair-search target.
pub const W_MASS_TARGET: f64 = 80.0;

/// A scored unordered pair; `left < right` index into the searched collection.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PairCandidate {
    pub score: f64,
    pub left: usize,
    pub right: usize,
}

impl PairCandidate {
    #[inline]
    pub fn distance(&self, target: f64) -> f64 {
        (self.score - target).abs()
    }
}

/// Score every unordered pair once and rank by closeness of the score to `target`.
///
/// Pairs are produced as `(0,1), (0,2), ..., (1,2), ...` and the sort is stable, so
/// pairs at equal distance keep that order. Fewer than two objects give an empty list.
pub fn rank_pairs_by<T, F>(objects: &[T], target: f64, score: F) -> Vec<PairCandidate>
where
    F: Fn(&T, &T) -> f64,
{
    if objects.len() < 2 {
        return Vec::new();
    }

    let mut pairs: Vec<PairCandidate> = (0..objects.len())
        .tuple_combinations()
        .map(|(i, j)| PairCandidate {
            score: score(&objects[i], &objects[j]),
            left: i,
            right: j,
        })
        .collect();

    pairs.sort_by_key(|p| OrderedFloat(p.distance(target)));
    pairs
}

/// Rank all object pairs by |m(pair) - target|, best first.
///
/// # Examples
///
/// ```
/// use mecore::algorithm::pairs::rank_pairs_by_mass;
/// use mecore::kinematics::object::PtEtaPhiM;
///
/// let jets = vec![
///     PtEtaPhiM::new(40.0, 0.0, 0.0, 0.0),
///     PtEtaPhiM::new(40.0, 0.0, std::f64::consts::PI, 0.0),
///     PtEtaPhiM::new(10.0, 2.0, 1.0, 0.0),
/// ];
/// let ranked = rank_pairs_by_mass(&jets, 80.0);
/// assert_eq!(ranked.len(), 3);
/// assert_eq!((ranked[0].left, ranked[0].right), (0, 1));
/// ```
pub fn rank_pairs_by_mass<K: Kinematic>(objects: &[K], target: f64) -> Vec<PairCandidate> {
    rank_pairs_by(objects, target, |a, b| pair_mass(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinematics::object::PtEtaPhiM;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashSet;
    use std::f64::consts::PI;

    #[test]
    fn test_exact_target_pair_ranks_first() {
        let objs = vec![
            PtEtaPhiM::new(25.0, 1.2, 0.3, 5.0),
            PtEtaPhiM::new(40.0, 0.0, 0.0, 0.0),
            PtEtaPhiM::new(60.0, -0.8, 2.0, 8.0),
            PtEtaPhiM::new(40.0, 0.0, PI, 0.0),
        ];
        let ranked = rank_pairs_by_mass(&objs, W_MASS_TARGET);
        assert_eq!((ranked[0].left, ranked[0].right), (1, 3));
        assert_relative_eq!(ranked[0].distance(W_MASS_TARGET), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_each_unordered_pair_once() {
        let mut rng = StdRng::seed_from_u64(7);
        for m in 0usize..9 {
            let objs: Vec<PtEtaPhiM> = (0..m)
                .map(|_| {
                    PtEtaPhiM::new(
                        rng.gen_range(20.0..200.0),
                        rng.gen_range(-2.5..2.5),
                        rng.gen_range(-PI..PI),
                        rng.gen_range(0.0..15.0),
                    )
                })
                .collect();
            let ranked = rank_pairs_by_mass(&objs, W_MASS_TARGET);
            assert_eq!(ranked.len(), m * m.saturating_sub(1) / 2);

            let mut seen = HashSet::new();
            for p in &ranked {
                assert!(p.left < p.right);
                assert!(seen.insert((p.left, p.right)));
                assert!(!seen.contains(&(p.right, p.left)));
            }
            for w in ranked.windows(2) {
                assert!(w[0].distance(W_MASS_TARGET) <= w[1].distance(W_MASS_TARGET));
            }
        }
    }

    #[test]
    fn test_equal_distance_keeps_encounter_order() {
        let values = vec![0.0, 10.0, 20.0, 30.0];
        // every pair sum scored against 30: (0,3)=30 (1,2)=30 tie at 0
        let ranked = rank_pairs_by(&values, 30.0, |a, b| a + b);
        assert_eq!((ranked[0].left, ranked[0].right), (0, 3));
        assert_eq!((ranked[1].left, ranked[1].right), (1, 2));
    }

    #[test]
    fn test_fewer_than_two_objects() {
        let one = vec![PtEtaPhiM::new(30.0, 0.0, 0.0, 0.0)];
        assert!(rank_pairs_by_mass(&one, W_MASS_TARGET).is_empty());
    }
}

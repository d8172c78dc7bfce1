//! Likelihood of a role split over all orderings of per-object role probabilities.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::algorithm::permutation::IndexPermutations;
use crate::error::{Error, Result};

/// Orderings evaluated between two deadline checks.
const DEADLINE_STRIDE: usize = 1024;

/// Default cap on the number of objects fed to the factorial enumeration.
pub const DEFAULT_MAX_OBJECTS: usize = 8;

/// Role an object plays inside a hypothesis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Signal,
    BackgroundA,
    BackgroundB,
}

/// Per-object probability triple, one entry per role.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleProbabilities {
    pub signal: f64,
    pub background_a: f64,
    pub background_b: f64,
}

impl RoleProbabilities {
    pub fn new(signal: f64, background_a: f64, background_b: f64) -> Self {
        RoleProbabilities { signal, background_a, background_b }
    }

    #[inline]
    pub fn for_role(&self, role: Role) -> f64 {
        match role {
            Role::Signal => self.signal,
            Role::BackgroundA => self.background_a,
            Role::BackgroundB => self.background_b,
        }
    }
}

/// How many positions of an ordering take each role.
///
/// The first `n_signal` positions are signal, the next `n_background_a` are
/// background-A, every remaining position is background-B.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSplit {
    pub n_signal: usize,
    pub n_background_a: usize,
}

impl RoleSplit {
    pub fn new(n_signal: usize, n_background_a: usize) -> Self {
        RoleSplit { n_signal, n_background_a }
    }

    #[inline]
    pub fn role_at(&self, position: usize) -> Role {
        if position < self.n_signal {
            Role::Signal
        } else if position < self.n_signal + self.n_background_a {
            Role::BackgroundA
        } else {
            Role::BackgroundB
        }
    }
}

/// Outcome of a full permutation scan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PermutationLikelihood {
    /// Mean of the role-probability product over all orderings (model evidence).
    pub mean: f64,
    /// First ordering reaching the maximum product.
    pub best_assignment: Vec<usize>,
    /// The maximum product.
    pub best_value: f64,
    pub n_permutations: usize,
    pub split: RoleSplit,
}

impl PermutationLikelihood {
    /// Object indices placed in the signal role by the best ordering.
    pub fn best_signal(&self) -> &[usize] {
        &self.best_assignment[..self.split.n_signal.min(self.best_assignment.len())]
    }

    /// Object indices placed in either background role by the best ordering.
    pub fn best_background(&self) -> &[usize] {
        &self.best_assignment[self.split.n_signal.min(self.best_assignment.len())..]
    }
}

/// Scores every assignment of roles to a short list of objects.
///
/// Cost is O(N!) so the list length is capped (`max_objects`).
#[derive(Clone, Debug)]
pub struct PermutationLikelihoodScorer {
    pub max_objects: usize,
}

impl Default for PermutationLikelihoodScorer {
    fn default() -> Self {
        PermutationLikelihoodScorer { max_objects: DEFAULT_MAX_OBJECTS }
    }
}

impl PermutationLikelihoodScorer {
    pub fn new(max_objects: usize) -> Self {
        PermutationLikelihoodScorer { max_objects }
    }

    pub fn score(&self, probs: &[RoleProbabilities], split: RoleSplit) -> Result<PermutationLikelihood> {
        self.score_until(probs, split, None)
    }

    /// Enumerate all orderings of `probs` and accumulate the role-probability products.
    ///
    /// Arguments:
    ///
    /// * `probs` - one probability triple per object
    /// * `split` - number of signal and background-A positions
    /// * `deadline` - optional wall-clock bound, checked every few orderings
    ///
    /// Returns:
    ///
    /// * `PermutationLikelihood` - mean product, best ordering and its product
    ///
    /// # Examples
    ///
    /// ```
    /// use mecore::algorithm::likelihood::{PermutationLikelihoodScorer, RoleProbabilities, RoleSplit};
    ///
    /// let probs = vec![RoleProbabilities::new(0.5, 0.5, 0.5); 4];
    /// let res = PermutationLikelihoodScorer::default().score(&probs, RoleSplit::new(2, 0)).unwrap();
    /// assert!((res.mean - 0.0625).abs() < 1e-12);
    /// assert_eq!(res.n_permutations, 24);
    /// ```
    pub fn score_until(
        &self,
        probs: &[RoleProbabilities],
        split: RoleSplit,
        deadline: Option<Instant>,
    ) -> Result<PermutationLikelihood> {
        let n = probs.len();
        if n == 0 {
            return Err(Error::InputInsufficient("permutation scorer called with no objects".into()));
        }
        if n > self.max_objects {
            return Err(Error::CombinatoricLimit { n, max: self.max_objects });
        }
        if split.n_signal + split.n_background_a > n {
            return Err(Error::InputInsufficient(format!(
                "role split {}+{} exceeds {} objects",
                split.n_signal, split.n_background_a, n
            )));
        }

        let roles: Vec<Role> = (0..n).map(|pos| split.role_at(pos)).collect();

        let mut total = 0.0_f64;
        let mut best_value = f64::NEG_INFINITY;
        let mut best_assignment: Vec<usize> = Vec::with_capacity(n);
        let mut n_permutations = 0usize;

        let mut perms = IndexPermutations::new(n);
        while let Some(perm) = perms.advance() {
            if let Some(limit) = deadline {
                if n_permutations % DEADLINE_STRIDE == 0 && Instant::now() >= limit {
                    return Err(Error::BudgetExceeded("permutation likelihood".into()));
                }
            }

            let mut p = 1.0_f64;
            for (pos, &obj) in perm.iter().enumerate() {
                p *= probs[obj].for_role(roles[pos]);
            }

            // strict comparison keeps the first ordering on ties
            if p > best_value {
                best_value = p;
                best_assignment.clear();
                best_assignment.extend_from_slice(perm);
            }

            total += p;
            n_permutations += 1;
        }

        Ok(PermutationLikelihood {
            mean: total / n_permutations as f64,
            best_assignment,
            best_value,
            n_permutations,
            split,
        })
    }
}

/// l1 / (l1 + l2), or 0 when both vanish.
pub fn likelihood_ratio(l1: f64, l2: f64) -> f64 {
    if l1 + l2 > 0.0 {
        l1 / (l1 + l2)
    } else {
        0.0
    }
}

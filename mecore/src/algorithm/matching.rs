//! Angular matching of reconstructed objects to truth particles.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::kinematics::object::Kinematic;

/// Winning truth match of one reconstructed object.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TruthMatch<L> {
    pub label: L,
    pub truth_index: usize,
    pub delta_r: f64,
}

/// Nearest-neighbour angular matching of reconstructed objects to labelled truth
/// collections.
///
/// Each reconstructed object keeps at most one match: the truth particle with the
/// smallest angular distance below `max_delta_r` across all collections. A later
/// candidate replaces the current one only when strictly closer, so exact ties go to
/// the collection listed first and, within a collection, to the lower truth index.
#[derive(Clone, Debug)]
pub struct LabelledMatcher {
    pub max_delta_r: f64,
}

impl LabelledMatcher {
    pub fn new(max_delta_r: f64) -> Self {
        LabelledMatcher { max_delta_r }
    }

    /// Match `reco` against `truth`, which must be ordered by label priority.
    pub fn match_all<L, R, T>(&self, reco: &[R], truth: &[(L, &[T])]) -> Vec<Option<TruthMatch<L>>>
    where
        L: Copy,
        R: Kinematic,
        T: Kinematic,
    {
        let mut matches: Vec<Option<TruthMatch<L>>> = vec![None; reco.len()];

        for &(label, collection) in truth {
            for (ij, obj) in reco.iter().enumerate() {
                for (iq, particle) in collection.iter().enumerate() {
                    let dr = particle.delta_r_to(obj);
                    if dr >= self.max_delta_r {
                        continue;
                    }
                    let closer = match &matches[ij] {
                        Some(current) => dr < current.delta_r,
                        None => true,
                    };
                    if closer {
                        matches[ij] = Some(TruthMatch { label, truth_index: iq, delta_r: dr });
                    }
                }
            }
        }

        matches
    }
}

/// One-to-one assignment of quarks to distinct objects.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UniqueAssignment {
    /// `links[i]` is the object assigned to quark `i`.
    pub links: Vec<usize>,
    pub delta_r: Vec<f64>,
}

impl UniqueAssignment {
    pub fn sum_delta_r(&self) -> f64 {
        self.delta_r.iter().sum()
    }
}

/// Why no unique assignment exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignmentFailure {
    /// No quarks were given.
    NoQuarks,
    /// Quark has no object inside the cone.
    NoCandidate { quark: usize },
    /// Two quarks can only be linked to the same single object.
    SharedSingleCandidate { first: usize, second: usize },
    /// Every combination reuses an object.
    NoDistinctCombination,
}

impl AssignmentFailure {
    pub fn counter_name(&self) -> &'static str {
        match self {
            AssignmentFailure::NoQuarks => "no_quarks",
            AssignmentFailure::NoCandidate { .. } => "no_jet_for_quark",
            AssignmentFailure::SharedSingleCandidate { .. } => "two_quarks_one_jet",
            AssignmentFailure::NoDistinctCombination => "no_unique_match",
        }
    }
}

impl From<AssignmentFailure> for Error {
    fn from(f: AssignmentFailure) -> Self {
        match f {
            AssignmentFailure::NoQuarks => Error::InputInsufficient("no quarks to assign".into()),
            AssignmentFailure::NoCandidate { quark } => {
                Error::InputInsufficient(format!("quark {} has no object inside the cone", quark))
            }
            AssignmentFailure::SharedSingleCandidate { first, second } => Error::AmbiguousAssignment(format!(
                "quarks {} and {} can only be linked to the same object",
                first, second
            )),
            AssignmentFailure::NoDistinctCombination => {
                Error::AmbiguousAssignment("no combination with distinct objects".into())
            }
        }
    }
}

/// Assign each quark to a distinct object inside `max_delta_r`, minimising the summed
/// angular distance.
///
/// Arguments:
///
/// * `quarks` - truth quarks, in a fixed role order
/// * `objects` - reconstructed objects (jets or subjets)
/// * `max_delta_r` - cone size; links at or above it are not considered
///
/// Returns:
///
/// * `UniqueAssignment` - the first combination (in quark-major order) with the lowest sum
pub fn unique_delta_r_assignment<Q, J>(
    quarks: &[Q],
    objects: &[J],
    max_delta_r: f64,
) -> Result<UniqueAssignment, AssignmentFailure>
where
    Q: Kinematic,
    J: Kinematic,
{
    if quarks.is_empty() {
        return Err(AssignmentFailure::NoQuarks);
    }

    let rmat: Vec<Vec<f64>> = quarks
        .iter()
        .map(|q| objects.iter().map(|j| q.delta_r_to(j)).collect())
        .collect();

    let links: Vec<Vec<usize>> = rmat
        .iter()
        .map(|row| (0..row.len()).filter(|&j| row[j] < max_delta_r).collect())
        .collect();

    for i in 0..links.len() {
        if links[i].is_empty() {
            return Err(AssignmentFailure::NoCandidate { quark: i });
        }
        for k in 0..links.len() {
            if i == k {
                continue;
            }
            if links[i].len() == 1 && links[k].len() == 1 && links[i] == links[k] {
                return Err(AssignmentFailure::SharedSingleCandidate { first: i.min(k), second: i.max(k) });
            }
        }
    }

    let mut best: Option<(f64, Vec<usize>)> = None;
    let mut current = Vec::with_capacity(quarks.len());
    search_distinct(&rmat, &links, 0, 0.0, &mut current, &mut best);

    match best {
        Some((_, chosen)) => {
            let delta_r = chosen.iter().enumerate().map(|(i, &j)| rmat[i][j]).collect();
            Ok(UniqueAssignment { links: chosen, delta_r })
        }
        None => Err(AssignmentFailure::NoDistinctCombination),
    }
}

fn search_distinct(
    rmat: &[Vec<f64>],
    links: &[Vec<usize>],
    quark: usize,
    sum: f64,
    current: &mut Vec<usize>,
    best: &mut Option<(f64, Vec<usize>)>,
) {
    if quark == links.len() {
        let better = match best {
            Some((best_sum, _)) => sum < *best_sum,
            None => true,
        };
        if better {
            *best = Some((sum, current.clone()));
        }
        return;
    }

    for &j in &links[quark] {
        if current.contains(&j) {
            continue;
        }
        current.push(j);
        search_distinct(rmat, links, quark + 1, sum + rmat[quark][j], current, best);
        current.pop();
    }
}

/// Lexicographic permutations of the index array `0..n`, driven explicitly.
///
/// The generator owns a single index buffer and rewrites it in place, so the caller
/// borrows each ordering until the next call to [`IndexPermutations::advance`].
///
/// # Examples
///
/// ```
/// use mecore::algorithm::permutation::IndexPermutations;
///
/// let mut perms = IndexPermutations::new(3);
/// let mut seen = Vec::new();
/// while let Some(p) = perms.advance() {
///     seen.push(p.to_vec());
/// }
/// assert_eq!(seen.len(), 6);
/// assert_eq!(seen[0], vec![0, 1, 2]);
/// assert_eq!(seen[5], vec![2, 1, 0]);
/// ```
#[derive(Clone, Debug)]
pub struct IndexPermutations {
    perm: Vec<usize>,
    started: bool,
    exhausted: bool,
}

impl IndexPermutations {
    pub fn new(n: usize) -> Self {
        IndexPermutations {
            perm: (0..n).collect(),
            started: false,
            exhausted: false,
        }
    }

    /// Next ordering, or `None` once all `n!` have been produced.
    pub fn advance(&mut self) -> Option<&[usize]> {
        if self.exhausted {
            return None;
        }
        if !self.started {
            self.started = true;
            return Some(&self.perm);
        }
        if next_permutation(&mut self.perm) {
            Some(&self.perm)
        } else {
            self.exhausted = true;
            None
        }
    }
}

/// Rearrange `perm` into the next lexicographically greater ordering.
///
/// Returns `false` (leaving `perm` untouched) when `perm` is already the last ordering.
pub fn next_permutation(perm: &mut [usize]) -> bool {
    let n = perm.len();
    if n < 2 {
        return false;
    }

    // longest non-increasing suffix starts at i
    let mut i = n - 1;
    while i > 0 && perm[i - 1] >= perm[i] {
        i -= 1;
    }
    if i == 0 {
        return false;
    }

    // rightmost element exceeding the pivot
    let pivot = i - 1;
    let mut j = n - 1;
    while perm[j] <= perm[pivot] {
        j -= 1;
    }
    perm.swap(pivot, j);
    perm[i..].reverse();
    true
}

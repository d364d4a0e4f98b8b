//! Random candidate generation.

use std::collections::HashSet;
use std::fmt;

use rand::Rng;

/// Symbols a generated candidate is drawn from: `a-z` followed by `0-9`.
pub const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Shortest username the registry accepts.
pub const MIN_LENGTH: usize = 3;

/// Longest username the registry accepts.
pub const MAX_LENGTH: usize = 16;

/// One generated username waiting to be looked up.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Candidate(String);

impl Candidate {
    /// Wrap an existing name, e.g. one read back from a previous run.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Unwrap into the owned name.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Candidate {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Candidate {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Number of distinct names of `length` symbols over `alphabet`, saturating at `u128::MAX`.
#[must_use]
pub fn space_size(length: usize, alphabet: &[u8]) -> u128 {
    let base = alphabet.len() as u128;
    (0..length).try_fold(1u128, |acc, _| acc.checked_mul(base)).unwrap_or(u128::MAX)
}

/// Draw one uniform-random name of `length` symbols from `alphabet`.
pub fn random_name<R: Rng + ?Sized>(rng: &mut R, length: usize, alphabet: &[u8]) -> Candidate {
    let name = (0..length)
        .map(|_| char::from(alphabet[rng.random_range(0..alphabet.len())]))
        .collect::<String>();
    Candidate(name)
}

/// Generate `count` pairwise-distinct names, in draw order.
///
/// Collisions are discarded and redrawn with no retry limit, so `count` must stay
/// within [`space_size`] of `length` and `alphabet` or this never returns.
///
/// # Panics
///
/// Panics if `alphabet` is empty and `length` is non-zero.
pub fn generate_unique<R: Rng + ?Sized>(
    rng: &mut R,
    count: usize,
    length: usize,
    alphabet: &[u8],
) -> Vec<Candidate> {
    let mut seen = HashSet::with_capacity(count);
    let mut out = Vec::with_capacity(count);
    while out.len() < count {
        let candidate = random_name(rng, length, alphabet);
        if seen.insert(candidate.clone()) {
            out.push(candidate);
        }
    }
    out
}

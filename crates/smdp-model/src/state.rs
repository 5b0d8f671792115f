//! State representation for the reference models.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Bounds a type must satisfy to be used as a model state.
///
/// The engine only hashes and compares states; it never inspects them.
pub trait ModelState: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

impl<T> ModelState for T where T: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

/// Hash a single variable at a given position (splitmix64-style mixing).
#[inline]
fn hash_var(idx: usize, val: i64) -> u64 {
    let h = ((idx as u64) ^ 0x2d358dccaa6c78a5).wrapping_mul(0x9e3779b97f4a7c15);
    let h = (h ^ (val as u64)).wrapping_mul(0x517cc1b727220a95);
    h ^ (h >> 32)
}

/// XOR of hash_var(i, var[i]) for all i.
fn hash_vars(vars: &[i64]) -> u64 {
    vars.iter()
        .enumerate()
        .fold(0, |h, (i, &var)| h ^ hash_var(i, var))
}

/// A valuation of integer model variables.
///
/// Cloning is an atomic increment. The hash is cached at construction and
/// is what the policy and reward maps hash on.
#[derive(Debug, Clone)]
pub struct State {
    pub vars: Arc<Vec<i64>>,
    hash: u64,
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.vars == other.vars
    }
}

impl Eq for State {}

impl Hash for State {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl State {
    pub fn new(vars: Vec<i64>) -> Self {
        let hash = hash_vars(&vars);
        Self {
            vars: Arc::new(vars),
            hash,
        }
    }

    /// Value of variable `idx`. Panics if out of range.
    #[inline]
    pub fn get(&self, idx: usize) -> i64 {
        self.vars[idx]
    }

    /// Copy of this state with one variable changed; the hash is updated
    /// incrementally.
    pub fn with_var(&self, idx: usize, val: i64) -> State {
        let old = self.vars[idx];
        if old == val {
            return self.clone();
        }
        let mut vars = (*self.vars).clone();
        vars[idx] = val;
        State {
            vars: Arc::new(vars),
            hash: self.hash ^ hash_var(idx, old) ^ hash_var(idx, val),
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.vars.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, ")")
    }
}

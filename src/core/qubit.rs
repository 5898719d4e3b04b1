// src/core/qubit.rs

use std::fmt;

/// Opaque handle to one qubit of the simulated state.
///
/// The wrapped value is the qubit's global position in the backend: qubit
/// `i` corresponds to bit `i` of a computational basis index. Handles are
/// handed out by the [`RegisterStore`](crate::store::RegisterStore) when a
/// quantum register is declared and are only meaningful for that store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QubitRef(pub usize);

impl QubitRef {
    /// Global index of the qubit inside its backend.
    pub fn index(&self) -> usize {
        self.0
    }

    /// Mask selecting this qubit's bit in a basis index.
    pub(crate) fn mask(&self) -> usize {
        1usize << self.0
    }
}

impl fmt::Display for QubitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

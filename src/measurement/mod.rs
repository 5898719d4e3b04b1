// src/measurement/mod.rs

//! The measurement unit: the only place randomness enters a run.

use crate::core::{QinvResult, QubitRef};
use crate::store::RegisterStore;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

/// Probabilities this close to 0 or 1 are treated as certain.
const CERTAINTY_TOLERANCE: f64 = 1e-12;

/// Collapses single qubits to classical outcomes.
///
/// When the backend reports a certain outcome (always the case for the
/// basis-state tracker) no random number is drawn, so deterministic programs
/// stay deterministic regardless of the seed.
#[derive(Debug)]
pub struct MeasurementUnit {
    rng: StdRng,
}

impl MeasurementUnit {
    /// Seeded for reproducible runs, or from OS entropy when `seed` is `None`.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { rng }
    }

    /// Measures `qubit`, collapsing the state, and returns the outcome.
    /// Storing the bit is the caller's job.
    pub fn measure(&mut self, store: &mut RegisterStore, qubit: QubitRef) -> QinvResult<bool> {
        let p_one = store.backend().probability_of_one(qubit)?;
        let outcome = if p_one <= CERTAINTY_TOLERANCE {
            false
        } else if p_one >= 1.0 - CERTAINTY_TOLERANCE {
            true
        } else {
            self.rng.random::<f64>() < p_one
        };
        store.backend_mut().collapse(qubit, outcome)?;
        trace!(%qubit, p_one, outcome, "measured");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::{ElementaryGate, Operation};
    use crate::simulation::{BasisStateTracker, StatevectorEngine};
    use crate::store::RegisterKind;

    fn hadamard_store() -> QinvResult<RegisterStore> {
        let mut store = RegisterStore::new(Box::new(StatevectorEngine::new(8)));
        let q = store.allocate("q", RegisterKind::Quantum, 2)?;
        let q0 = store.qubit(q, 0)?;
        store.apply(&Operation::new(ElementaryGate::H, vec![q0], vec![])?)?;
        Ok(store)
    }

    #[test]
    fn same_seed_same_outcomes() -> QinvResult<()> {
        let outcomes = |seed| -> QinvResult<Vec<bool>> {
            let mut unit = MeasurementUnit::new(Some(seed));
            (0..16)
                .map(|_| {
                    let mut store = hadamard_store()?;
                    unit.measure(&mut store, QubitRef(0))
                })
                .collect()
        };
        assert_eq!(outcomes(7)?, outcomes(7)?);
        Ok(())
    }

    #[test]
    fn outcome_sticks_after_collapse() -> QinvResult<()> {
        let mut unit = MeasurementUnit::new(Some(3));
        let mut store = hadamard_store()?;
        let first = unit.measure(&mut store, QubitRef(0))?;
        for _ in 0..8 {
            assert_eq!(unit.measure(&mut store, QubitRef(0))?, first);
        }
        Ok(())
    }

    #[test]
    fn unaddressed_qubits_are_untouched() -> QinvResult<()> {
        let mut store = RegisterStore::new(Box::new(BasisStateTracker::new()));
        let q = store.allocate("q", RegisterKind::Quantum, 2)?;
        let q1 = store.qubit(q, 1)?;
        store.apply(&Operation::new(ElementaryGate::X, vec![q1], vec![])?)?;
        let mut unit = MeasurementUnit::new(None);
        assert!(!unit.measure(&mut store, QubitRef(0))?);
        assert_eq!(store.backend().basis_state(), Some(vec![false, true]));
        Ok(())
    }
}

// src/simulation/mod.rs

//! Quantum state representations behind the register store.
//!
//! Two backends implement [`QuantumBackend`]:
//! - [`BasisStateTracker`] keeps one classical bit per qubit. It is exact
//!   for programs whose gates never leave the computational basis (the
//!   Clifford/Toffoli shift-register programs) and makes measurement
//!   deterministic.
//! - [`StatevectorEngine`] keeps all `2^n` amplitudes and supports any gate.

mod basis;
pub(crate) mod engine;

pub use basis::BasisStateTracker;
pub use engine::StatevectorEngine;

use crate::core::{QinvResult, QubitRef};
use crate::operations::Operation;
use num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default ceiling on statevector size (`2^24` amplitudes).
pub const DEFAULT_MAX_STATEVECTOR_QUBITS: usize = 24;

/// Largest ceiling a configuration may request (`2^32` amplitudes, 64 GiB).
pub const STATEVECTOR_QUBIT_LIMIT: usize = 32;

/// Which representation a run uses for quantum state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SimulationMode {
    /// One definite bit per qubit; rejects gates that create superposition.
    ExactBasisState,
    /// Full complex statevector.
    FullStatevector,
    /// Pick `ExactBasisState` when every gate in the program is
    /// basis-preserving, `FullStatevector` otherwise.
    #[default]
    Auto,
}

impl fmt::Display for SimulationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationMode::ExactBasisState => write!(f, "exact-basis-state"),
            SimulationMode::FullStatevector => write!(f, "full-statevector"),
            SimulationMode::Auto => write!(f, "auto"),
        }
    }
}

/// State storage and evolution for the qubits of one run.
///
/// Implementations own the state exclusively and mutate it in place.
pub trait QuantumBackend: fmt::Debug + Send {
    /// The concrete mode this backend implements (never `Auto`).
    fn mode(&self) -> SimulationMode;

    /// Number of qubits allocated so far.
    fn num_qubits(&self) -> usize;

    /// Adds `count` qubits in `|0⟩`; returns the first new qubit.
    fn allocate(&mut self, count: usize) -> QinvResult<QubitRef>;

    /// Applies one resolved operation.
    fn apply(&mut self, op: &Operation) -> QinvResult<()>;

    /// Applies a sequence of operations all-or-nothing: on error the state
    /// is left as it was before the first operation.
    fn apply_all(&mut self, ops: &[Operation]) -> QinvResult<()>;

    /// Probability that measuring `qubit` yields 1.
    fn probability_of_one(&self, qubit: QubitRef) -> QinvResult<f64>;

    /// Projects `qubit` onto `outcome` and renormalises.
    fn collapse(&mut self, qubit: QubitRef, outcome: bool) -> QinvResult<()>;

    /// Bit values of all qubits if the state is a computational basis state.
    fn basis_state(&self) -> Option<Vec<bool>>;

    /// Dense amplitudes of the whole state (expensive for large states).
    ///
    /// # Errors
    /// `Backend` when the state spans more than [`STATEVECTOR_QUBIT_LIMIT`]
    /// qubits or the vector cannot be allocated.
    fn amplitudes(&self) -> QinvResult<Vec<Complex<f64>>>;
}

/// Builds the backend for a concrete mode. `Auto` must be resolved by the
/// caller first; it falls back to the statevector here.
pub fn create_backend(mode: SimulationMode, max_statevector_qubits: usize) -> Box<dyn QuantumBackend> {
    match mode {
        SimulationMode::ExactBasisState => Box::new(BasisStateTracker::new()),
        SimulationMode::FullStatevector | SimulationMode::Auto => {
            Box::new(StatevectorEngine::new(max_statevector_qubits))
        }
    }
}

pub(crate) fn check_qubit(qubit: QubitRef, num_qubits: usize) -> QinvResult<()> {
    if qubit.index() >= num_qubits {
        return Err(crate::core::QinvError::backend(format!(
            "qubit {} is not allocated ({} qubits in state)",
            qubit, num_qubits
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::ElementaryGate;

    fn op(gate: ElementaryGate, qubits: &[usize]) -> Operation {
        Operation::new(gate, qubits.iter().map(|&i| QubitRef(i)).collect(), vec![]).expect("valid op")
    }

    /// Both backends agree on every basis-preserving circuit.
    #[test]
    fn backends_agree_on_reversible_circuit() -> QinvResult<()> {
        let ops = [
            op(ElementaryGate::X, &[0]),
            op(ElementaryGate::CX, &[0, 1]),
            op(ElementaryGate::CCX, &[0, 1, 2]),
            op(ElementaryGate::Swap, &[2, 3]),
            op(ElementaryGate::Z, &[3]),
            op(ElementaryGate::CX, &[3, 0]),
        ];
        let mut basis = create_backend(SimulationMode::ExactBasisState, DEFAULT_MAX_STATEVECTOR_QUBITS);
        let mut dense = create_backend(SimulationMode::FullStatevector, DEFAULT_MAX_STATEVECTOR_QUBITS);
        basis.allocate(4)?;
        dense.allocate(4)?;
        for o in &ops {
            basis.apply(o)?;
            dense.apply(o)?;
        }
        assert_eq!(basis.basis_state(), dense.basis_state());
        assert_eq!(basis.basis_state(), Some(vec![false, true, false, true]));
        Ok(())
    }

    #[test]
    fn mode_serialises_kebab_case() {
        let json = serde_json::to_string(&SimulationMode::ExactBasisState).expect("serialise");
        assert_eq!(json, "\"exact-basis-state\"");
        let mode: SimulationMode = serde_json::from_str("\"full-statevector\"").expect("parse");
        assert_eq!(mode, SimulationMode::FullStatevector);
    }
}

// src/simulation/basis.rs

use crate::core::{QinvError, QinvResult, QuantumState, QubitRef};
use crate::operations::Operation;
use crate::simulation::{QuantumBackend, STATEVECTOR_QUBIT_LIMIT, SimulationMode, check_qubit};
use num_complex::Complex;
use num_traits::{One, Zero};

/// Exact simulation of states that stay in the computational basis.
///
/// Each qubit is a plain bit. A kernel whose controls are all set either
/// flips its target (anti-diagonal matrix) or only contributes a phase
/// (diagonal matrix), which is global on a single basis state and dropped.
/// Anything else would create superposition and is rejected.
#[derive(Debug, Clone, Default)]
pub struct BasisStateTracker {
    bits: Vec<bool>,
}

impl BasisStateTracker {
    /// A tracker with no qubits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current bit of `qubit`.
    pub fn bit(&self, qubit: QubitRef) -> QinvResult<bool> {
        check_qubit(qubit, self.bits.len())?;
        Ok(self.bits[qubit.index()])
    }

    fn basis_index(&self) -> usize {
        self.bits
            .iter()
            .enumerate()
            .fold(0usize, |k, (i, &b)| if b { k | (1usize << i) } else { k })
    }
}

impl QuantumBackend for BasisStateTracker {
    fn mode(&self) -> SimulationMode {
        SimulationMode::ExactBasisState
    }

    fn num_qubits(&self) -> usize {
        self.bits.len()
    }

    fn allocate(&mut self, count: usize) -> QinvResult<QubitRef> {
        let first = self.bits.len();
        self.bits.resize(first + count, false);
        Ok(QubitRef(first))
    }

    fn apply(&mut self, op: &Operation) -> QinvResult<()> {
        for q in op.involved_qubits() {
            check_qubit(q, self.bits.len())?;
        }
        for kernel in op.kernels() {
            if !kernel.controls.iter().all(|c| self.bits[c.index()]) {
                continue;
            }
            match kernel.flips_target() {
                Some(true) => {
                    let bit = &mut self.bits[kernel.target.index()];
                    *bit = !*bit;
                }
                Some(false) => {}
                None => {
                    return Err(QinvError::backend(format!(
                        "'{}' leaves the computational basis; use the full-statevector mode",
                        op
                    )));
                }
            }
        }
        Ok(())
    }

    fn apply_all(&mut self, ops: &[Operation]) -> QinvResult<()> {
        let saved = self.bits.clone();
        for op in ops {
            if let Err(err) = self.apply(op) {
                self.bits = saved;
                return Err(err);
            }
        }
        Ok(())
    }

    fn probability_of_one(&self, qubit: QubitRef) -> QinvResult<f64> {
        Ok(if self.bit(qubit)? { 1.0 } else { 0.0 })
    }

    fn collapse(&mut self, qubit: QubitRef, outcome: bool) -> QinvResult<()> {
        if self.bit(qubit)? != outcome {
            return Err(QinvError::backend(format!(
                "{} is in basis state {} and cannot collapse to {}",
                qubit,
                self.bit(qubit)? as u8,
                outcome as u8
            )));
        }
        Ok(())
    }

    fn basis_state(&self) -> Option<Vec<bool>> {
        Some(self.bits.clone())
    }

    fn amplitudes(&self) -> QinvResult<Vec<Complex<f64>>> {
        if self.bits.len() > STATEVECTOR_QUBIT_LIMIT {
            return Err(QinvError::backend(format!(
                "cannot densify {} tracked qubits, limit is {}",
                self.bits.len(),
                STATEVECTOR_QUBIT_LIMIT
            )));
        }
        let mut state = QuantumState::zero(0);
        state.grow(self.bits.len())?;
        let mut amplitudes = state.into_amplitudes();
        amplitudes[0] = Complex::zero();
        amplitudes[self.basis_index()] = Complex::one();
        Ok(amplitudes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::ElementaryGate;

    fn op(gate: ElementaryGate, qubits: &[usize], controls: &[usize]) -> Operation {
        Operation::new(
            gate,
            qubits.iter().map(|&i| QubitRef(i)).collect(),
            controls.iter().map(|&i| QubitRef(i)).collect(),
        )
        .expect("valid op")
    }

    #[test]
    fn hadamard_is_rejected_only_when_active() -> QinvResult<()> {
        let mut tracker = BasisStateTracker::new();
        tracker.allocate(2)?;
        // control q0 is 0, so the controlled H never fires
        tracker.apply(&op(ElementaryGate::H, &[1], &[0]))?;
        assert_eq!(tracker.basis_state(), Some(vec![false, false]));

        tracker.apply(&op(ElementaryGate::X, &[0], &[]))?;
        let err = tracker.apply(&op(ElementaryGate::H, &[1], &[0])).unwrap_err();
        assert!(matches!(err, QinvError::Backend { .. }));
        Ok(())
    }

    #[test]
    fn failed_sequence_rolls_back() -> QinvResult<()> {
        let mut tracker = BasisStateTracker::new();
        tracker.allocate(2)?;
        let ops = [op(ElementaryGate::X, &[0], &[]), op(ElementaryGate::H, &[1], &[0])];
        assert!(tracker.apply_all(&ops).is_err());
        assert_eq!(tracker.basis_state(), Some(vec![false, false]));
        Ok(())
    }

    #[test]
    fn phases_do_not_change_bits() -> QinvResult<()> {
        let mut tracker = BasisStateTracker::new();
        tracker.allocate(1)?;
        tracker.apply(&op(ElementaryGate::X, &[0], &[]))?;
        tracker.apply(&op(ElementaryGate::Z, &[0], &[]))?;
        tracker.apply(&op(ElementaryGate::T, &[0], &[]))?;
        assert!(tracker.bit(QubitRef(0))?);
        Ok(())
    }

    #[test]
    fn measurement_is_deterministic() -> QinvResult<()> {
        let mut tracker = BasisStateTracker::new();
        tracker.allocate(2)?;
        tracker.apply(&op(ElementaryGate::X, &[1], &[]))?;
        assert_eq!(tracker.probability_of_one(QubitRef(0))?, 0.0);
        assert_eq!(tracker.probability_of_one(QubitRef(1))?, 1.0);
        tracker.collapse(QubitRef(1), true)?;
        assert!(tracker.collapse(QubitRef(1), false).is_err());
        Ok(())
    }

    #[test]
    fn amplitudes_place_weight_on_basis_index() -> QinvResult<()> {
        let mut tracker = BasisStateTracker::new();
        tracker.allocate(3)?;
        tracker.apply(&op(ElementaryGate::X, &[2], &[]))?;
        let amps = tracker.amplitudes()?;
        assert_eq!(amps.len(), 8);
        assert_eq!(amps[4], Complex::one());
        assert_eq!(amps.iter().filter(|a| !a.is_zero()).count(), 1);
        Ok(())
    }

    #[test]
    fn wide_registers_cannot_be_densified() -> QinvResult<()> {
        let mut tracker = BasisStateTracker::new();
        tracker.allocate(70)?;
        tracker.apply(&op(ElementaryGate::X, &[69], &[]))?;
        assert_eq!(tracker.basis_state().map(|bits| bits[69]), Some(true));
        assert!(matches!(tracker.amplitudes(), Err(QinvError::Backend { .. })));
        Ok(())
    }
}

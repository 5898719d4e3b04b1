// src/simulation/engine.rs
use crate::core::state::AMPLITUDE_TOLERANCE;
use crate::core::{QinvError, QinvResult, QuantumState, QubitRef};
use crate::operations::{Kernel, Operation};
use crate::simulation::{QuantumBackend, STATEVECTOR_QUBIT_LIMIT, SimulationMode, check_qubit};
use num_complex::Complex;
use num_traits::Zero;
use tracing::trace;

/// Full statevector simulation.
///
/// Holds the global [`QuantumState`] of every allocated qubit and evolves it
/// kernel by kernel. Declaring a register grows the state in place.
#[derive(Debug, Clone)]
pub struct StatevectorEngine {
    state: QuantumState,
    max_qubits: usize,
}

impl StatevectorEngine {
    /// An empty engine (zero qubits) that refuses to grow past `max_qubits`.
    pub fn new(max_qubits: usize) -> Self {
        Self { state: QuantumState::zero(0), max_qubits }
    }

    /// The current global state.
    pub fn state(&self) -> &QuantumState {
        &self.state
    }

    // Test hook: replaces the state wholesale.
    #[cfg(test)]
    pub(crate) fn set_state(&mut self, state: QuantumState) -> QinvResult<()> {
        if state.dim() != self.state.dim() {
            return Err(QinvError::backend(format!(
                "cannot set state: provided dimension {} does not match engine dimension {}",
                state.dim(),
                self.state.dim()
            )));
        }
        self.state = state;
        Ok(())
    }

    fn apply_kernel(&mut self, kernel: &Kernel) {
        apply_kernel(self.state.vector_mut(), kernel);
    }
}

/// Applies the kernel's matrix to the target on every amplitude pair whose
/// controls are all set.
pub(crate) fn apply_kernel(amplitudes: &mut [Complex<f64>], kernel: &Kernel) {
    let target_mask = kernel.target.mask();
    let control_mask = kernel.control_mask();
    let m = &kernel.matrix;

    for i0 in 0..amplitudes.len() {
        if i0 & target_mask != 0 || i0 & control_mask != control_mask {
            continue;
        }
        let i1 = i0 | target_mask;
        let psi_0 = amplitudes[i0];
        let psi_1 = amplitudes[i1];
        amplitudes[i0] = m[0][0] * psi_0 + m[0][1] * psi_1;
        amplitudes[i1] = m[1][0] * psi_0 + m[1][1] * psi_1;
    }
}

impl QuantumBackend for StatevectorEngine {
    fn mode(&self) -> SimulationMode {
        SimulationMode::FullStatevector
    }

    fn num_qubits(&self) -> usize {
        self.state.num_qubits()
    }

    fn allocate(&mut self, count: usize) -> QinvResult<QubitRef> {
        let first = self.state.num_qubits();
        let ceiling = self.max_qubits.min(STATEVECTOR_QUBIT_LIMIT);
        let total = first.saturating_add(count);
        if total > ceiling {
            return Err(QinvError::backend(format!(
                "statevector limited to {} qubits, program needs {}",
                ceiling, total
            )));
        }
        self.state.grow(count)?;
        trace!(first, count, dim = self.state.dim(), "statevector grown");
        Ok(QubitRef(first))
    }

    fn apply(&mut self, op: &Operation) -> QinvResult<()> {
        let n = self.state.num_qubits();
        for q in op.involved_qubits() {
            check_qubit(q, n)?;
        }
        for kernel in op.kernels() {
            self.apply_kernel(&kernel);
        }
        Ok(())
    }

    fn apply_all(&mut self, ops: &[Operation]) -> QinvResult<()> {
        // kernels cannot fail once every qubit is known to exist
        let n = self.state.num_qubits();
        for q in ops.iter().flat_map(Operation::involved_qubits) {
            check_qubit(q, n)?;
        }
        for op in ops {
            for kernel in op.kernels() {
                self.apply_kernel(&kernel);
            }
        }
        Ok(())
    }

    fn probability_of_one(&self, qubit: QubitRef) -> QinvResult<f64> {
        check_qubit(qubit, self.state.num_qubits())?;
        let mask = qubit.mask();
        let p: f64 = self
            .state
            .vector()
            .iter()
            .enumerate()
            .filter(|(k, _)| k & mask != 0)
            .map(|(_, amp)| amp.norm_sqr())
            .sum();
        Ok(p.clamp(0.0, 1.0))
    }

    fn collapse(&mut self, qubit: QubitRef, outcome: bool) -> QinvResult<()> {
        let p_one = self.probability_of_one(qubit)?;
        let p = if outcome { p_one } else { 1.0 - p_one };
        if p <= AMPLITUDE_TOLERANCE {
            return Err(QinvError::backend(format!(
                "cannot collapse {} onto outcome {} with probability {:.3e}",
                qubit, outcome as u8, p
            )));
        }
        let mask = qubit.mask();
        let scale = 1.0 / p.sqrt();
        for (k, amp) in self.state.vector_mut().iter_mut().enumerate() {
            if (k & mask != 0) == outcome {
                *amp *= scale;
            } else {
                *amp = Complex::zero();
            }
        }
        Ok(())
    }

    fn basis_state(&self) -> Option<Vec<bool>> {
        let k = self.state.basis_index()?;
        Some((0..self.state.num_qubits()).map(|i| (k >> i) & 1 == 1).collect())
    }

    fn amplitudes(&self) -> QinvResult<Vec<Complex<f64>>> {
        Ok(self.state.vector().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::ElementaryGate;
    use std::f64::consts::FRAC_1_SQRT_2;

    const TEST_TOLERANCE: f64 = 1e-9;

    fn op(gate: ElementaryGate, qubits: &[usize]) -> Operation {
        Operation::new(gate, qubits.iter().map(|&i| QubitRef(i)).collect(), vec![]).expect("valid op")
    }

    /// Asserts that two complex state vectors are approximately equal component-wise.
    fn assert_complex_vec_approx_equal(actual: &[Complex<f64>], expected: &[Complex<f64>], context: &str) {
        assert_eq!(actual.len(), expected.len(), "Vector length mismatch - {}", context);
        for i in 0..actual.len() {
            let dist_sq = (actual[i] - expected[i]).norm_sqr();
            assert!(
                dist_sq < TEST_TOLERANCE * TEST_TOLERANCE,
                "Vector mismatch at index {} - Actual: {}, Expected: {}, Context: {}",
                i, actual[i], expected[i], context
            );
        }
    }

    #[test]
    fn bell_pair_amplitudes() -> QinvResult<()> {
        let mut engine = StatevectorEngine::new(8);
        engine.allocate(2)?;
        engine.apply(&op(ElementaryGate::H, &[0]))?;
        engine.apply(&op(ElementaryGate::CX, &[0, 1]))?;
        let h = Complex::new(FRAC_1_SQRT_2, 0.0);
        assert_complex_vec_approx_equal(
            &engine.amplitudes()?,
            &[h, Complex::zero(), Complex::zero(), h],
            "H then CX",
        );
        assert!((engine.probability_of_one(QubitRef(1))? - 0.5).abs() < TEST_TOLERANCE);
        Ok(())
    }

    #[test]
    fn collapse_renormalises_and_correlates() -> QinvResult<()> {
        let mut engine = StatevectorEngine::new(8);
        engine.allocate(2)?;
        engine.apply(&op(ElementaryGate::H, &[0]))?;
        engine.apply(&op(ElementaryGate::CX, &[0, 1]))?;
        engine.collapse(QubitRef(0), true)?;
        assert_eq!(engine.basis_state(), Some(vec![true, true]));
        assert!((engine.state().norm_sqr() - 1.0).abs() < TEST_TOLERANCE);
        Ok(())
    }

    #[test]
    fn collapse_onto_impossible_outcome_fails() -> QinvResult<()> {
        let mut engine = StatevectorEngine::new(8);
        engine.allocate(1)?;
        let err = engine.collapse(QubitRef(0), true).unwrap_err();
        assert!(matches!(err, QinvError::Backend { .. }));
        Ok(())
    }

    #[test]
    fn allocation_respects_ceiling() -> QinvResult<()> {
        let mut engine = StatevectorEngine::new(3);
        assert_eq!(engine.allocate(2)?, QubitRef(0));
        assert_eq!(engine.allocate(1)?, QubitRef(2));
        assert!(matches!(engine.allocate(1), Err(QinvError::Backend { .. })));
        Ok(())
    }

    #[test]
    fn unbounded_engine_still_rejects_huge_registers() -> QinvResult<()> {
        let mut engine = StatevectorEngine::new(usize::MAX);
        engine.allocate(2)?;
        for count in [64, STATEVECTOR_QUBIT_LIMIT, usize::MAX] {
            assert!(matches!(engine.allocate(count), Err(QinvError::Backend { .. })), "{}", count);
        }
        assert_eq!(engine.num_qubits(), 2);
        assert_eq!(engine.state().dim(), 4);
        Ok(())
    }

    #[test]
    fn hadamard_twice_restores_state() -> QinvResult<()> {
        let mut engine = StatevectorEngine::new(8);
        engine.allocate(3)?;
        let start = QuantumState::from_amplitudes(
            (0..8).map(|k| if k == 5 { Complex::new(1.0, 0.0) } else { Complex::zero() }).collect(),
        )
        .expect("power of two");
        engine.set_state(start.clone())?;
        engine.apply(&op(ElementaryGate::H, &[1]))?;
        engine.apply(&op(ElementaryGate::H, &[1]))?;
        assert_complex_vec_approx_equal(engine.state().vector(), start.vector(), "H·H");
        Ok(())
    }

    #[test]
    fn unallocated_qubit_is_rejected() {
        let mut engine = StatevectorEngine::new(8);
        let err = engine.apply(&op(ElementaryGate::X, &[0])).unwrap_err();
        assert!(matches!(err, QinvError::Backend { .. }));
    }
}

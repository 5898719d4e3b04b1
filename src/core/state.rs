// src/core/state.rs

use crate::core::{QinvError, QinvResult};
use num_complex::Complex;
use num_traits::{One, Zero};
use std::fmt;

/// Amplitudes below this squared magnitude are treated as zero.
pub(crate) const AMPLITUDE_TOLERANCE: f64 = 1e-12;

/// Dense state vector of `n` qubits: `2^n` complex amplitudes.
///
/// Qubit `i` is bit `i` of the basis index, so `|q1 q0⟩ = |01⟩` lives at
/// index 1. Growing the state by `k` fresh qubits in `|0⟩` only appends
/// zeros, because the new qubits occupy the high bits.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantumState {
    amplitudes: Vec<Complex<f64>>,
    num_qubits: usize,
}

impl QuantumState {
    /// The `n`-qubit state `|0...0⟩`. Zero qubits gives the scalar `1`.
    ///
    /// # Panics
    /// If `2^n` amplitudes do not fit in memory.
    pub fn zero(num_qubits: usize) -> Self {
        let mut amplitudes = vec![Complex::zero(); 1usize << num_qubits];
        amplitudes[0] = Complex::one();
        Self { amplitudes, num_qubits }
    }

    /// Wraps raw amplitudes. The length must be a power of two.
    pub(crate) fn from_amplitudes(amplitudes: Vec<Complex<f64>>) -> Option<Self> {
        let dim = amplitudes.len();
        if dim == 0 || !dim.is_power_of_two() {
            return None;
        }
        Some(Self { num_qubits: dim.trailing_zeros() as usize, amplitudes })
    }

    /// Read-only access to the amplitudes.
    pub fn vector(&self) -> &[Complex<f64>] {
        &self.amplitudes
    }

    pub(crate) fn vector_mut(&mut self) -> &mut [Complex<f64>] {
        &mut self.amplitudes
    }

    pub(crate) fn into_amplitudes(self) -> Vec<Complex<f64>> {
        self.amplitudes
    }

    /// Number of amplitudes (`2^n`).
    pub fn dim(&self) -> usize {
        self.amplitudes.len()
    }

    /// Number of qubits described.
    pub fn num_qubits(&self) -> usize {
        self.num_qubits
    }

    /// Tensors `count` new qubits in `|0⟩` onto the high end.
    ///
    /// # Errors
    /// `Backend` when `2^(n + count)` amplitudes overflow the address space
    /// or cannot be allocated. The state is unchanged in that case.
    pub(crate) fn grow(&mut self, count: usize) -> QinvResult<()> {
        let total = self
            .num_qubits
            .checked_add(count)
            .ok_or_else(|| QinvError::backend("qubit count overflows"))?;
        let dim = u32::try_from(total)
            .ok()
            .and_then(|shift| 1usize.checked_shl(shift))
            .filter(|dim| dim.checked_mul(size_of::<Complex<f64>>()).is_some_and(|bytes| bytes <= isize::MAX as usize))
            .ok_or_else(|| QinvError::backend(format!("a statevector of {} qubits is not addressable", total)))?;
        self.amplitudes
            .try_reserve_exact(dim - self.amplitudes.len())
            .map_err(|err| QinvError::backend(format!("cannot allocate {} amplitudes: {}", dim, err)))?;
        self.amplitudes.resize(dim, Complex::zero());
        self.num_qubits = total;
        Ok(())
    }

    /// Index of the single basis state carrying all the weight, if the state
    /// is a computational basis state up to a global phase.
    pub fn basis_index(&self) -> Option<usize> {
        let mut found = None;
        for (k, amp) in self.amplitudes.iter().enumerate() {
            if amp.norm_sqr() > AMPLITUDE_TOLERANCE {
                if found.is_some() {
                    return None;
                }
                found = Some(k);
            }
        }
        found
    }

    /// Sum of squared magnitudes; 1 for a normalised state.
    pub fn norm_sqr(&self) -> f64 {
        self.amplitudes.iter().map(|c| c.norm_sqr()).sum()
    }
}

impl fmt::Display for QuantumState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "State[")?;
        let mut first = true;
        for (k, amp) in self.amplitudes.iter().enumerate() {
            if amp.norm_sqr() <= AMPLITUDE_TOLERANCE {
                continue;
            }
            if !first {
                write!(f, " + ")?;
            }
            first = false;
            write!(f, "({:.4})|{:0width$b}⟩", amp, k, width = self.num_qubits.max(1))?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grow_keeps_existing_amplitudes() {
        let mut state = QuantumState::zero(1);
        state.vector_mut()[0] = Complex::zero();
        state.vector_mut()[1] = Complex::one();
        state.grow(2).expect("small growth");
        assert_eq!(state.num_qubits(), 3);
        assert_eq!(state.dim(), 8);
        assert_eq!(state.basis_index(), Some(1));
    }

    #[test]
    fn oversized_growth_is_an_error() {
        let mut state = QuantumState::zero(1);
        for count in [usize::BITS as usize, usize::MAX] {
            assert!(matches!(state.grow(count), Err(QinvError::Backend { .. })));
        }
        assert_eq!(state.num_qubits(), 1);
        assert_eq!(state.dim(), 2);
    }

    #[test]
    fn superposition_has_no_basis_index() {
        let h = std::f64::consts::FRAC_1_SQRT_2;
        let state = QuantumState::from_amplitudes(vec![Complex::new(h, 0.0), Complex::new(h, 0.0)])
            .expect("power of two");
        assert_eq!(state.basis_index(), None);
        assert!((state.norm_sqr() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_non_power_of_two() {
        assert!(QuantumState::from_amplitudes(vec![Complex::one(); 3]).is_none());
    }
}

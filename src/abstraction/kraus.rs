// src/abstraction/kraus.rs

use crate::core::{QinvError, QinvResult, QubitRef};
use crate::operations::{Kernel, Operation};
use crate::simulation::engine::apply_kernel;
use num_complex::Complex;
use num_traits::{One, Zero};
use std::collections::HashSet;
use std::fmt;

/// Widest support a transition label may have (`64 x 64` operators).
pub const MAX_KRAUS_QUBITS: usize = 6;

/// Most operators a single label may carry.
pub const MAX_KRAUS_OPERATORS: usize = 64;

const ENTRY_TOLERANCE: f64 = 1e-10;

/// Dense square complex matrix, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    dim: usize,
    entries: Vec<Complex<f64>>,
}

impl Matrix {
    /// The `dim x dim` zero matrix.
    pub fn zeros(dim: usize) -> Self {
        Self { dim, entries: vec![Complex::zero(); dim * dim] }
    }

    /// The `dim x dim` identity.
    pub fn identity(dim: usize) -> Self {
        let mut m = Self::zeros(dim);
        for i in 0..dim {
            m.set(i, i, Complex::one());
        }
        m
    }

    /// Diagonal 0/1 matrix keeping the basis states selected by `keep`.
    pub fn projector(dim: usize, keep: impl Fn(usize) -> bool) -> Self {
        let mut m = Self::zeros(dim);
        for i in (0..dim).filter(|&i| keep(i)) {
            m.set(i, i, Complex::one());
        }
        m
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn get(&self, row: usize, col: usize) -> Complex<f64> {
        self.entries[row * self.dim + col]
    }

    fn set(&mut self, row: usize, col: usize, value: Complex<f64>) {
        self.entries[row * self.dim + col] = value;
    }

    /// Conjugate transpose.
    pub fn adjoint(&self) -> Self {
        let mut m = Self::zeros(self.dim);
        for row in 0..self.dim {
            for col in 0..self.dim {
                m.set(col, row, self.get(row, col).conj());
            }
        }
        m
    }

    /// `self * rhs`. Both sides must have the same dimension.
    pub fn product(&self, rhs: &Matrix) -> Self {
        let n = self.dim;
        let mut m = Self::zeros(n);
        for row in 0..n {
            for k in 0..n {
                let a = self.get(row, k);
                if a.norm_sqr() < ENTRY_TOLERANCE {
                    continue;
                }
                for col in 0..n {
                    m.entries[row * n + col] += a * rhs.get(k, col);
                }
            }
        }
        m
    }

    pub fn is_zero(&self) -> bool {
        self.entries.iter().all(|c| c.norm_sqr() < ENTRY_TOLERANCE)
    }

    /// Entry-wise comparison within a fixed tolerance.
    pub fn approx_eq(&self, other: &Matrix) -> bool {
        self.dim == other.dim
            && self
                .entries
                .iter()
                .zip(other.entries.iter())
                .all(|(a, b)| (a - b).norm_sqr() < ENTRY_TOLERANCE)
    }

    pub fn is_identity(&self) -> bool {
        self.approx_eq(&Matrix::identity(self.dim))
    }
}

impl std::ops::AddAssign<&Matrix> for Matrix {
    fn add_assign(&mut self, rhs: &Matrix) {
        for (a, b) in self.entries.iter_mut().zip(rhs.entries.iter()) {
            *a += b;
        }
    }
}

/// A quantum operation in Kraus form, `ρ ↦ Σ K ρ K†`.
///
/// Every operator acts on [`qubits`](KrausMap::qubits) in order: `qubits[i]`
/// is bit `i` of the local basis index, matching the global little-endian
/// layout. Classical bits lowered by the abstraction are variables like
/// any other and only ever hold basis states.
#[derive(Debug, Clone, PartialEq)]
pub struct KrausMap {
    qubits: Vec<QubitRef>,
    operators: Vec<Matrix>,
}

impl KrausMap {
    fn checked(qubits: Vec<QubitRef>, operators: Vec<Matrix>) -> QinvResult<Self> {
        if qubits.len() > MAX_KRAUS_QUBITS {
            return Err(QinvError::invalid(format!(
                "a transition on {} variables exceeds the limit of {}",
                qubits.len(),
                MAX_KRAUS_QUBITS
            )));
        }
        if operators.len() > MAX_KRAUS_OPERATORS {
            return Err(QinvError::invalid(format!(
                "a transition with {} Kraus operators exceeds the limit of {}",
                operators.len(),
                MAX_KRAUS_OPERATORS
            )));
        }
        let mut seen = HashSet::with_capacity(qubits.len());
        if let Some(dup) = qubits.iter().find(|q| !seen.insert(**q)) {
            return Err(QinvError::invalid(format!("variable {} listed twice in a transition", dup)));
        }
        Ok(Self { qubits, operators })
    }

    /// Operators with a single unit entry each, given as `(row, col)` lists.
    fn from_entries(qubits: Vec<QubitRef>, operators: Vec<Vec<(usize, usize)>>) -> QinvResult<Self> {
        let dim = 1usize << qubits.len().min(MAX_KRAUS_QUBITS);
        let operators = operators
            .into_iter()
            .map(|entries| {
                let mut m = Matrix::zeros(dim);
                for (row, col) in entries {
                    m.set(row, col, Complex::one());
                }
                m
            })
            .collect();
        Self::checked(qubits, operators)
    }

    /// The identity channel, acting on nothing.
    pub fn identity() -> Self {
        Self { qubits: Vec::new(), operators: vec![Matrix::identity(1)] }
    }

    /// The unitary of an elementary operation, on its controls followed by
    /// its gate qubits.
    pub fn unitary(op: &Operation) -> QinvResult<Self> {
        let qubits = op.involved_qubits();
        if qubits.len() > MAX_KRAUS_QUBITS {
            return Self::checked(qubits, Vec::new());
        }
        let local = |q: QubitRef| -> QinvResult<QubitRef> {
            qubits
                .iter()
                .position(|&p| p == q)
                .map(QubitRef)
                .ok_or_else(|| QinvError::invalid(format!("{} is not an operand of '{}'", q, op)))
        };
        let kernels = op
            .kernels()
            .into_iter()
            .map(|k| {
                Ok(Kernel {
                    target: local(k.target)?,
                    controls: k.controls.iter().map(|&c| local(c)).collect::<QinvResult<_>>()?,
                    matrix: k.matrix,
                })
            })
            .collect::<QinvResult<Vec<_>>>()?;

        let dim = 1usize << qubits.len();
        let mut matrix = Matrix::zeros(dim);
        for col in 0..dim {
            let mut column = vec![Complex::zero(); dim];
            column[col] = Complex::one();
            for kernel in &kernels {
                apply_kernel(&mut column, kernel);
            }
            for (row, amplitude) in column.into_iter().enumerate() {
                matrix.set(row, col, amplitude);
            }
        }
        Self::checked(qubits, vec![matrix])
    }

    /// Overwrites `variable` with `value`: `{|b⟩⟨0|, |b⟩⟨1|}`.
    pub fn set(variable: QubitRef, value: bool) -> QinvResult<Self> {
        let b = value as usize;
        Self::from_entries(vec![variable], vec![vec![(b, 0)], vec![(b, 1)]])
    }

    /// Copies the basis value of `source` into `target`.
    pub fn copy(source: QubitRef, target: QubitRef) -> QinvResult<Self> {
        // local index: source is bit 0, target bit 1
        let operators = (0..2)
            .map(|old| (0..2).map(|x| (x | (x << 1), x | (old << 1))).collect())
            .collect();
        Self::from_entries(vec![source, target], operators)
    }

    /// Measures `qubit` in the computational basis and writes the outcome
    /// to the classical variable `target`.
    pub fn measure(qubit: QubitRef, target: QubitRef) -> QinvResult<Self> {
        let mut operators = Vec::with_capacity(4);
        for outcome in 0..2usize {
            for old in 0..2usize {
                operators.push(vec![(outcome | (outcome << 1), outcome | (old << 1))]);
            }
        }
        Self::from_entries(vec![qubit, target], operators)
    }

    /// Projects onto the basis states whose value (`qubits[0]` least
    /// significant) satisfies `keep`.
    pub fn projection(qubits: Vec<QubitRef>, keep: impl Fn(u64) -> bool) -> QinvResult<Self> {
        if qubits.len() > MAX_KRAUS_QUBITS {
            return Self::checked(qubits, Vec::new());
        }
        let dim = 1usize << qubits.len();
        let projector = Matrix::projector(dim, |k| keep(k as u64));
        Self::checked(qubits, vec![projector])
    }

    /// Variables the operators act on.
    pub fn qubits(&self) -> &[QubitRef] {
        &self.qubits
    }

    pub fn operators(&self) -> &[Matrix] {
        &self.operators
    }

    /// True when the map is the identity channel.
    pub fn is_identity(&self) -> bool {
        self.operators.len() == 1 && self.operators[0].is_identity()
    }

    /// True when the map annihilates every state.
    pub fn is_zero(&self) -> bool {
        self.operators.iter().all(Matrix::is_zero)
    }

    /// The same channel on `support`, a superset of the map's variables,
    /// acting as the identity on the extra ones.
    pub fn expand_to(&self, support: &[QubitRef]) -> QinvResult<Self> {
        if support.len() > MAX_KRAUS_QUBITS {
            return Self::checked(support.to_vec(), Vec::new());
        }
        let positions = self
            .qubits
            .iter()
            .map(|q| {
                support
                    .iter()
                    .position(|p| p == q)
                    .ok_or_else(|| QinvError::invalid(format!("{} missing from the expanded support", q)))
            })
            .collect::<QinvResult<Vec<_>>>()?;
        let own_mask = positions.iter().fold(0usize, |mask, p| mask | (1 << p));
        let gather = |index: usize| {
            positions
                .iter()
                .enumerate()
                .fold(0usize, |local, (i, p)| local | (((index >> p) & 1) << i))
        };

        let dim = 1usize << support.len();
        let operators = self
            .operators
            .iter()
            .map(|op| {
                let mut m = Matrix::zeros(dim);
                for row in 0..dim {
                    for col in 0..dim {
                        if row & !own_mask == col & !own_mask {
                            m.set(row, col, op.get(gather(row), gather(col)));
                        }
                    }
                }
                m
            })
            .collect();
        Self::checked(support.to_vec(), operators)
    }

    /// `self` followed by `next`. Products that vanish are dropped.
    ///
    /// # Errors
    /// `InvalidOperation` when the result would exceed
    /// [`MAX_KRAUS_QUBITS`] or [`MAX_KRAUS_OPERATORS`].
    pub fn then(&self, next: &KrausMap) -> QinvResult<Self> {
        let mut support = self.qubits.clone();
        support.extend(next.qubits.iter().filter(|q| !self.qubits.contains(q)));
        let pairs = self.operators.len() * next.operators.len();
        if pairs > MAX_KRAUS_OPERATORS * MAX_KRAUS_OPERATORS {
            return Err(QinvError::invalid(format!("composing {} operator pairs is too expensive", pairs)));
        }
        let first = self.expand_to(&support)?;
        let second = next.expand_to(&support)?;

        let mut operators = Vec::new();
        for b in &second.operators {
            for a in &first.operators {
                let product = b.product(a);
                if !product.is_zero() {
                    operators.push(product);
                }
            }
        }
        if operators.is_empty() {
            operators.push(Matrix::zeros(1usize << support.len()));
        }
        Self::checked(support, operators)
    }

    /// `Σ K†K`; the identity exactly when the map is trace preserving.
    pub fn completeness(&self) -> Matrix {
        let mut sum = Matrix::zeros(1usize << self.qubits.len());
        for op in &self.operators {
            sum += &op.adjoint().product(op);
        }
        sum
    }
}

impl fmt::Display for KrausMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let qubits: Vec<String> = self.qubits.iter().map(|q| q.to_string()).collect();
        write!(f, "kraus[{}] on [{}]", self.operators.len(), qubits.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::ElementaryGate;

    fn q(i: usize) -> QubitRef {
        QubitRef(i)
    }

    fn one() -> Complex<f64> {
        Complex::one()
    }

    #[test]
    fn cx_unitary_uses_operand_order() -> QinvResult<()> {
        let op = Operation::new(ElementaryGate::CX, vec![q(5), q(2)], vec![])?;
        let map = KrausMap::unitary(&op)?;
        assert_eq!(map.qubits(), &[q(5), q(2)]);
        let u = &map.operators()[0];
        // control is local bit 0
        assert_eq!(u.get(0, 0), one());
        assert_eq!(u.get(2, 2), one());
        assert_eq!(u.get(3, 1), one());
        assert_eq!(u.get(1, 3), one());
        assert!(u.get(1, 1).norm() < 1e-12);
        assert!(map.completeness().is_identity());
        Ok(())
    }

    #[test]
    fn expansion_acts_as_identity_elsewhere() -> QinvResult<()> {
        let x = KrausMap::unitary(&Operation::new(ElementaryGate::X, vec![q(1)], vec![])?)?;
        let wide = x.expand_to(&[q(0), q(1)])?;
        let u = &wide.operators()[0];
        assert_eq!(u.get(2, 0), one());
        assert_eq!(u.get(3, 1), one());
        assert_eq!(u.get(0, 2), one());
        assert!(u.get(1, 0).norm() < 1e-12);
        assert!(wide.completeness().is_identity());
        Ok(())
    }

    #[test]
    fn composition_cancels_and_prunes() -> QinvResult<()> {
        let x = KrausMap::unitary(&Operation::new(ElementaryGate::X, vec![q(0)], vec![])?)?;
        assert!(x.then(&x)?.is_identity());

        // setting c to 0 leaves only the "old value 0" half of a measurement
        let measured = KrausMap::set(q(1), false)?.then(&KrausMap::measure(q(0), q(1))?)?;
        assert_eq!(measured.qubits(), &[q(1), q(0)]);
        assert_eq!(measured.operators().len(), 4);
        let guarded = KrausMap::measure(q(0), q(1))?.then(&KrausMap::projection(vec![q(1)], |v| v == 1)?)?;
        assert_eq!(guarded.operators().len(), 2);
        Ok(())
    }

    #[test]
    fn classical_maps_are_trace_preserving() -> QinvResult<()> {
        for map in [
            KrausMap::set(q(0), true)?,
            KrausMap::copy(q(0), q(1))?,
            KrausMap::measure(q(3), q(1))?,
            KrausMap::identity(),
        ] {
            assert!(map.completeness().is_identity(), "{}", map);
        }
        let true_branch = KrausMap::projection(vec![q(0), q(1)], |v| v < 2)?;
        let false_branch = KrausMap::projection(vec![q(0), q(1)], |v| v >= 2)?;
        let mut sum = true_branch.completeness();
        sum += &false_branch.completeness();
        assert!(sum.is_identity());
        Ok(())
    }

    #[test]
    fn oversized_maps_are_rejected() -> QinvResult<()> {
        let wide: Vec<QubitRef> = (0..=MAX_KRAUS_QUBITS).map(q).collect();
        assert!(matches!(KrausMap::projection(wide, |_| true), Err(QinvError::InvalidOperation { .. })));
        let chain = (0..MAX_KRAUS_QUBITS).try_fold(KrausMap::identity(), |acc, i| acc.then(&KrausMap::set(q(i), false)?))?;
        assert_eq!(chain.operators().len(), 1 << MAX_KRAUS_QUBITS);
        assert_eq!(chain.then(&KrausMap::set(q(0), true)?)?.operators().len(), 1 << MAX_KRAUS_QUBITS);
        assert!(chain.then(&KrausMap::set(q(MAX_KRAUS_QUBITS), true)?).is_err());
        Ok(())
    }
}

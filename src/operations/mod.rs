// src/operations/mod.rs

//! Elementary gates and the resolved operations the backends execute.
//!
//! Every elementary gate lowers to one or more [`Kernel`]s: a 2x2 matrix on
//! a target qubit, conditioned on a set of control qubits all being `|1⟩`.
//! Both simulation backends only ever see kernels, so multi-qubit gates and
//! `ctrl @` modifiers need no special cases there.

use crate::core::{QinvError, QinvResult, QubitRef};
use num_complex::Complex;
use num_traits::{One, Zero};
use std::collections::HashSet;
use std::f64::consts::{FRAC_1_SQRT_2, FRAC_PI_2, FRAC_PI_4};
use std::fmt;

/// 2x2 complex matrix, row major.
pub(crate) type Matrix2 = [[Complex<f64>; 2]; 2];

const MATRIX_TOLERANCE: f64 = 1e-12;

/// Name, qubit count and angle count of every elementary gate.
pub const ELEMENTARY_GATES: &[(&str, usize, usize)] = &[
    ("id", 1, 0),
    ("x", 1, 0),
    ("y", 1, 0),
    ("z", 1, 0),
    ("h", 1, 0),
    ("s", 1, 0),
    ("sdg", 1, 0),
    ("t", 1, 0),
    ("tdg", 1, 0),
    ("p", 1, 1),
    ("u", 1, 3),
    ("cx", 2, 0),
    ("cy", 2, 0),
    ("cz", 2, 0),
    ("cp", 2, 1),
    ("cu", 2, 4),
    ("swap", 2, 0),
    ("ccx", 3, 0),
];

/// The built-in gate set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ElementaryGate {
    /// Identity.
    Id,
    /// Pauli-X (NOT).
    X,
    /// Pauli-Y.
    Y,
    /// Pauli-Z.
    Z,
    /// Hadamard.
    H,
    /// Phase by π/2.
    S,
    /// Phase by -π/2.
    Sdg,
    /// Phase by π/4.
    T,
    /// Phase by -π/4.
    Tdg,
    /// Phase by an arbitrary angle.
    P(f64),
    /// Generic single-qubit rotation `U(θ, φ, λ)`.
    U(f64, f64, f64),
    /// Controlled-X (CNOT); qubits are `[control, target]`.
    CX,
    /// Controlled-Y.
    CY,
    /// Controlled-Z.
    CZ,
    /// Controlled phase.
    CP(f64),
    /// Controlled `e^{iγ} U(θ, φ, λ)`; qubits are `[control, target]`.
    CU(f64, f64, f64, f64),
    /// Exchange two qubits.
    Swap,
    /// Toffoli; qubits are `[control, control, target]`.
    CCX,
}

impl ElementaryGate {
    /// Qubit and angle counts for an elementary gate name, if it is one.
    pub fn signature(name: &str) -> Option<(usize, usize)> {
        ELEMENTARY_GATES
            .iter()
            .find(|(n, _, _)| *n == name)
            .map(|(_, qubits, params)| (*qubits, *params))
    }

    /// Whether `name` refers to a built-in gate.
    pub fn is_elementary(name: &str) -> bool {
        Self::signature(name).is_some()
    }

    /// Resolves a gate name and its angle arguments.
    ///
    /// # Errors
    /// `UndefinedReference` for unknown names, `ParameterMismatch` when the
    /// number of angles is wrong.
    pub fn from_name(name: &str, params: &[f64]) -> QinvResult<Self> {
        let (_, expected) = Self::signature(name)
            .ok_or_else(|| QinvError::undefined(crate::core::ReferenceKind::Gate, name))?;
        if params.len() != expected {
            return Err(QinvError::ParameterMismatch {
                gate: name.to_string(),
                expected,
                got: params.len(),
            });
        }
        let gate = match name {
            "id" => ElementaryGate::Id,
            "x" => ElementaryGate::X,
            "y" => ElementaryGate::Y,
            "z" => ElementaryGate::Z,
            "h" => ElementaryGate::H,
            "s" => ElementaryGate::S,
            "sdg" => ElementaryGate::Sdg,
            "t" => ElementaryGate::T,
            "tdg" => ElementaryGate::Tdg,
            "p" => ElementaryGate::P(params[0]),
            "u" => ElementaryGate::U(params[0], params[1], params[2]),
            "cx" => ElementaryGate::CX,
            "cy" => ElementaryGate::CY,
            "cz" => ElementaryGate::CZ,
            "cp" => ElementaryGate::CP(params[0]),
            "cu" => ElementaryGate::CU(params[0], params[1], params[2], params[3]),
            "swap" => ElementaryGate::Swap,
            "ccx" => ElementaryGate::CCX,
            other => return Err(QinvError::undefined(crate::core::ReferenceKind::Gate, other)),
        };
        Ok(gate)
    }

    /// Canonical lower-case name.
    pub fn name(&self) -> &'static str {
        match self {
            ElementaryGate::Id => "id",
            ElementaryGate::X => "x",
            ElementaryGate::Y => "y",
            ElementaryGate::Z => "z",
            ElementaryGate::H => "h",
            ElementaryGate::S => "s",
            ElementaryGate::Sdg => "sdg",
            ElementaryGate::T => "t",
            ElementaryGate::Tdg => "tdg",
            ElementaryGate::P(_) => "p",
            ElementaryGate::U(..) => "u",
            ElementaryGate::CX => "cx",
            ElementaryGate::CY => "cy",
            ElementaryGate::CZ => "cz",
            ElementaryGate::CP(_) => "cp",
            ElementaryGate::CU(..) => "cu",
            ElementaryGate::Swap => "swap",
            ElementaryGate::CCX => "ccx",
        }
    }

    /// Number of qubits the gate acts on.
    pub fn num_qubits(&self) -> usize {
        match self {
            ElementaryGate::CX
            | ElementaryGate::CY
            | ElementaryGate::CZ
            | ElementaryGate::CP(_)
            | ElementaryGate::CU(..)
            | ElementaryGate::Swap => 2,
            ElementaryGate::CCX => 3,
            _ => 1,
        }
    }

    /// True when the gate maps every computational basis state to a single
    /// basis state (up to phase), i.e. it can run on the basis-state tracker.
    pub fn is_basis_preserving(&self) -> bool {
        let local: Vec<QubitRef> = (0..self.num_qubits()).map(QubitRef).collect();
        self.kernels(&local, &[])
            .iter()
            .all(|kernel| kernel.flips_target().is_some())
    }

    fn angles(&self) -> Vec<f64> {
        match *self {
            ElementaryGate::P(theta) | ElementaryGate::CP(theta) => vec![theta],
            ElementaryGate::U(theta, phi, lambda) => vec![theta, phi, lambda],
            ElementaryGate::CU(theta, phi, lambda, gamma) => vec![theta, phi, lambda, gamma],
            _ => Vec::new(),
        }
    }

    /// Lowers the gate on `qubits`, with extra `controls`, into kernels.
    /// `qubits` must already have the right length.
    pub(crate) fn kernels(&self, qubits: &[QubitRef], controls: &[QubitRef]) -> Vec<Kernel> {
        let with = |extra: &[QubitRef]| -> Vec<QubitRef> {
            controls.iter().chain(extra.iter()).copied().collect()
        };
        let single = |matrix: Matrix2| {
            vec![Kernel { matrix, target: qubits[0], controls: with(&[]) }]
        };
        match *self {
            ElementaryGate::Id => single(identity()),
            ElementaryGate::X => single(pauli_x()),
            ElementaryGate::Y => single(pauli_y()),
            ElementaryGate::Z => single(phase(std::f64::consts::PI)),
            ElementaryGate::H => single(hadamard()),
            ElementaryGate::S => single(phase(FRAC_PI_2)),
            ElementaryGate::Sdg => single(phase(-FRAC_PI_2)),
            ElementaryGate::T => single(phase(FRAC_PI_4)),
            ElementaryGate::Tdg => single(phase(-FRAC_PI_4)),
            ElementaryGate::P(theta) => single(phase(theta)),
            ElementaryGate::U(theta, phi, lambda) => single(rotation(theta, phi, lambda)),
            ElementaryGate::CX => vec![Kernel { matrix: pauli_x(), target: qubits[1], controls: with(&qubits[..1]) }],
            ElementaryGate::CY => vec![Kernel { matrix: pauli_y(), target: qubits[1], controls: with(&qubits[..1]) }],
            ElementaryGate::CZ => vec![Kernel {
                matrix: phase(std::f64::consts::PI),
                target: qubits[1],
                controls: with(&qubits[..1]),
            }],
            ElementaryGate::CP(theta) => vec![Kernel { matrix: phase(theta), target: qubits[1], controls: with(&qubits[..1]) }],
            ElementaryGate::CU(theta, phi, lambda, gamma) => {
                let global = Complex::from_polar(1.0, gamma);
                let matrix = rotation(theta, phi, lambda).map(|row| row.map(|entry| global * entry));
                vec![Kernel { matrix, target: qubits[1], controls: with(&qubits[..1]) }]
            }
            ElementaryGate::Swap => vec![
                Kernel { matrix: pauli_x(), target: qubits[1], controls: with(&qubits[..1]) },
                Kernel { matrix: pauli_x(), target: qubits[0], controls: with(&qubits[1..2]) },
                Kernel { matrix: pauli_x(), target: qubits[1], controls: with(&qubits[..1]) },
            ],
            ElementaryGate::CCX => vec![Kernel { matrix: pauli_x(), target: qubits[2], controls: with(&qubits[..2]) }],
        }
    }
}

impl fmt::Display for ElementaryGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())?;
        let angles = self.angles();
        if !angles.is_empty() {
            let rendered: Vec<String> = angles.iter().map(|a| format!("{a}")).collect();
            write!(f, "({})", rendered.join(", "))?;
        }
        Ok(())
    }
}

/// A 2x2 unitary on `target`, applied only where every control is `|1⟩`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Kernel {
    pub(crate) matrix: Matrix2,
    pub(crate) target: QubitRef,
    pub(crate) controls: Vec<QubitRef>,
}

impl Kernel {
    /// `Some(false)` for a diagonal matrix, `Some(true)` for an anti-diagonal
    /// one, `None` when the matrix mixes basis states.
    pub(crate) fn flips_target(&self) -> Option<bool> {
        let m = &self.matrix;
        let off_zero = m[0][1].norm_sqr() < MATRIX_TOLERANCE && m[1][0].norm_sqr() < MATRIX_TOLERANCE;
        let diag_zero = m[0][0].norm_sqr() < MATRIX_TOLERANCE && m[1][1].norm_sqr() < MATRIX_TOLERANCE;
        match (off_zero, diag_zero) {
            (true, false) => Some(false),
            (false, true) => Some(true),
            _ => None,
        }
    }

    /// Bit mask of all controls.
    pub(crate) fn control_mask(&self) -> usize {
        self.controls.iter().fold(0, |mask, q| mask | q.mask())
    }
}

/// An elementary gate bound to concrete qubits, possibly under extra
/// controls from `ctrl @` modifiers. This is what gate expansion produces
/// and what the register store applies.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    gate: ElementaryGate,
    qubits: Vec<QubitRef>,
    controls: Vec<QubitRef>,
}

impl Operation {
    /// Binds `gate` to `qubits` under `controls`.
    ///
    /// # Errors
    /// `ArityMismatch` when `qubits` has the wrong length and
    /// `InvalidOperation` when any qubit appears twice.
    pub fn new(gate: ElementaryGate, qubits: Vec<QubitRef>, controls: Vec<QubitRef>) -> QinvResult<Self> {
        if qubits.len() != gate.num_qubits() {
            return Err(QinvError::ArityMismatch {
                gate: gate.name().to_string(),
                expected: gate.num_qubits(),
                got: qubits.len(),
            });
        }
        let mut seen = HashSet::with_capacity(qubits.len() + controls.len());
        for q in controls.iter().chain(qubits.iter()) {
            if !seen.insert(*q) {
                return Err(QinvError::invalid(format!(
                    "qubit {} used more than once in '{}'",
                    q,
                    gate.name()
                )));
            }
        }
        Ok(Self { gate, qubits, controls })
    }

    /// The underlying elementary gate.
    pub fn gate(&self) -> &ElementaryGate {
        &self.gate
    }

    /// Qubits in gate order.
    pub fn qubits(&self) -> &[QubitRef] {
        &self.qubits
    }

    /// Extra controls added by `ctrl @` modifiers.
    pub fn controls(&self) -> &[QubitRef] {
        &self.controls
    }

    /// All qubits the operation touches, controls first.
    pub fn involved_qubits(&self) -> Vec<QubitRef> {
        self.controls.iter().chain(self.qubits.iter()).copied().collect()
    }

    pub(crate) fn kernels(&self) -> Vec<Kernel> {
        self.gate.kernels(&self.qubits, &self.controls)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.controls.is_empty() {
            write!(f, "ctrl({}) @ ", self.controls.len())?;
        }
        write!(f, "{}", self.gate)?;
        let operands: Vec<String> = self.involved_qubits().iter().map(|q| q.to_string()).collect();
        write!(f, " {}", operands.join(", "))
    }
}

fn identity() -> Matrix2 {
    [[Complex::one(), Complex::zero()], [Complex::zero(), Complex::one()]]
}

fn pauli_x() -> Matrix2 {
    [[Complex::zero(), Complex::one()], [Complex::one(), Complex::zero()]]
}

fn pauli_y() -> Matrix2 {
    [[Complex::zero(), -Complex::i()], [Complex::i(), Complex::zero()]]
}

fn hadamard() -> Matrix2 {
    let h = Complex::new(FRAC_1_SQRT_2, 0.0);
    [[h, h], [h, -h]]
}

fn phase(theta: f64) -> Matrix2 {
    [[Complex::one(), Complex::zero()], [Complex::zero(), Complex::from_polar(1.0, theta)]]
}

fn rotation(theta: f64, phi: f64, lambda: f64) -> Matrix2 {
    let (sin, cos) = (theta / 2.0).sin_cos();
    [
        [Complex::new(cos, 0.0), -Complex::from_polar(sin, lambda)],
        [Complex::from_polar(sin, phi), Complex::from_polar(cos, phi + lambda)],
    ]
}

//! Error handling logic

use std::fmt;
use thiserror::Error;

/// What kind of named entity a failed lookup was looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    /// A `qubit[n]` register.
    QuantumRegister,
    /// A `bit[n]` or `int[n]` register.
    ClassicalRegister,
    /// A gate, elementary or composite.
    Gate,
    /// A formal qubit parameter inside a gate definition.
    GateParameter,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceKind::QuantumRegister => write!(f, "quantum register"),
            ReferenceKind::ClassicalRegister => write!(f, "classical register"),
            ReferenceKind::Gate => write!(f, "gate"),
            ReferenceKind::GateParameter => write!(f, "gate parameter"),
        }
    }
}

/// Errors raised while building gate tables, manipulating registers or
/// interpreting a program.
///
/// Every failure of a run ends up here. The evaluator turns the terminal
/// error into an [`ExecutionStatus`](crate::vm::ExecutionStatus) instead of
/// returning it, so partial classical results stay inspectable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum QinvError {
    /// A gate was applied to the wrong number of qubits.
    #[error("Gate '{gate}' expects {expected} qubit argument(s), got {got}")]
    ArityMismatch {
        /// Gate name.
        gate: String,
        /// Number of qubits the gate acts on.
        expected: usize,
        /// Number of qubits supplied.
        got: usize,
    },

    /// A gate was given the wrong number of angle parameters.
    #[error("Gate '{gate}' expects {expected} angle parameter(s), got {got}")]
    ParameterMismatch {
        /// Gate name.
        gate: String,
        /// Number of angles the gate takes.
        expected: usize,
        /// Number of angles supplied.
        got: usize,
    },

    /// Unknown register, gate or gate parameter name.
    #[error("Undefined {kind} '{name}'")]
    UndefinedReference {
        /// What was being looked up.
        kind: ReferenceKind,
        /// The name that did not resolve.
        name: String,
    },

    /// A composite gate refers to itself, directly or transitively.
    #[error("Gate '{name}' is defined in terms of itself")]
    CyclicDefinition {
        /// The gate found on the expansion stack twice.
        name: String,
    },

    /// A register or gate name was declared twice.
    #[error("'{name}' is already declared")]
    Redeclaration {
        /// The clashing name.
        name: String,
    },

    /// A gate definition is malformed (no parameters, repeated parameters).
    #[error("Invalid definition of gate '{name}': {reason}")]
    InvalidDefinition {
        /// Gate name.
        name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Register index outside the declared width.
    #[error("Index {index} out of range for register '{register}' of width {width}")]
    IndexOutOfRange {
        /// Register name.
        register: String,
        /// Offending index.
        index: usize,
        /// Declared width.
        width: usize,
    },

    /// A statement is inconsistent with the current program state.
    #[error("Invalid operation: {message}")]
    InvalidOperation {
        /// Details.
        message: String,
    },

    /// The simulation backend rejected an operation.
    #[error("Simulation backend failure: {message}")]
    Backend {
        /// Details.
        message: String,
    },

    /// The configured while-loop iteration budget ran out.
    #[error("Loop iteration budget of {budget} exhausted")]
    LoopBudgetExceeded {
        /// The configured budget.
        budget: u64,
    },

    /// The run was cancelled between statements.
    #[error("Run cancelled")]
    Cancelled,

    /// Run configuration could not be loaded.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Details.
        message: String,
    },
}

impl QinvError {
    pub(crate) fn undefined(kind: ReferenceKind, name: impl Into<String>) -> Self {
        QinvError::UndefinedReference { kind, name: name.into() }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        QinvError::InvalidOperation { message: message.into() }
    }

    pub(crate) fn backend(message: impl Into<String>) -> Self {
        QinvError::Backend { message: message.into() }
    }
}

impl From<serde_json::Error> for QinvError {
    fn from(err: serde_json::Error) -> Self {
        QinvError::Config { message: err.to_string() }
    }
}

/// Result type used throughout the crate.
pub type QinvResult<T> = Result<T, QinvError>;

// src/vm/outcome.rs

use crate::core::QinvError;
use crate::simulation::SimulationMode;
use crate::store::ClassicalSnapshot;
use std::fmt;

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// Every statement ran.
    Completed,
    /// A while loop would have exceeded the configured iteration budget.
    LoopBudgetExceeded,
    /// The cancellation token was triggered.
    Cancelled,
    /// The run stopped on an error.
    Failed(QinvError),
}

impl ExecutionStatus {
    /// True only for [`ExecutionStatus::Completed`].
    pub fn is_completed(&self) -> bool {
        matches!(self, ExecutionStatus::Completed)
    }

    pub(crate) fn from_error(err: QinvError) -> Self {
        match err {
            QinvError::LoopBudgetExceeded { .. } => ExecutionStatus::LoopBudgetExceeded,
            QinvError::Cancelled => ExecutionStatus::Cancelled,
            other => ExecutionStatus::Failed(other),
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Completed => write!(f, "completed"),
            ExecutionStatus::LoopBudgetExceeded => write!(f, "loop budget exceeded"),
            ExecutionStatus::Cancelled => write!(f, "cancelled"),
            ExecutionStatus::Failed(err) => write!(f, "failed: {}", err),
        }
    }
}

/// Result of one program run.
///
/// Classical registers are reported whatever the status, so callers can
/// inspect partial results of a failed or interrupted run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// How the run ended.
    pub status: ExecutionStatus,
    /// Final contents of every declared classical register.
    pub classical: ClassicalSnapshot,
    /// While-loop body executions.
    pub loop_iterations: u64,
    /// Statements started (including loop and switch statements themselves).
    pub statements_executed: u64,
    /// Concrete simulation mode used.
    pub mode: SimulationMode,
}

impl RunOutcome {
    /// Integer value of a classical register, if declared.
    pub fn value(&self, register: &str) -> Option<u64> {
        self.classical.get(register).map(|v| v.value)
    }

    /// One bit of a classical register, if declared.
    pub fn bit(&self, register: &str, index: usize) -> Option<bool> {
        self.classical.get(register).map(|v| v.bit(index))
    }
}

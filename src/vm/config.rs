// src/vm/config.rs

use crate::core::{QinvError, QinvResult};
use crate::simulation::{DEFAULT_MAX_STATEVECTOR_QUBITS, STATEVECTOR_QUBIT_LIMIT, SimulationMode};
use serde::{Deserialize, Serialize};

/// Per-run settings.
///
/// Deserialises from camelCase JSON; every field is optional.
///
/// ```
/// # use qinv::vm::RunConfig;
/// # use qinv::SimulationMode;
/// let config = RunConfig::from_json_str(
///     r#"{ "loopIterationBudget": 100, "simulationMode": "full-statevector", "seed": 7 }"#,
/// ).expect("valid config");
/// assert_eq!(config.loop_iteration_budget, Some(100));
/// assert_eq!(config.simulation_mode, SimulationMode::FullStatevector);
/// assert_eq!(config.max_statevector_qubits, 24);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct RunConfig {
    /// Maximum number of while-loop body executions across the whole run.
    /// `None` means unbounded.
    pub loop_iteration_budget: Option<u64>,
    /// Quantum state representation.
    pub simulation_mode: SimulationMode,
    /// Seed for measurement sampling; `None` draws from OS entropy.
    pub seed: Option<u64>,
    /// Largest register set the statevector engine will hold.
    pub max_statevector_qubits: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            loop_iteration_budget: None,
            simulation_mode: SimulationMode::Auto,
            seed: None,
            max_statevector_qubits: DEFAULT_MAX_STATEVECTOR_QUBITS,
        }
    }
}

impl RunConfig {
    /// Parses a JSON document.
    ///
    /// # Errors
    /// `Config` for malformed JSON, unknown fields or a statevector ceiling
    /// outside `1..=STATEVECTOR_QUBIT_LIMIT`.
    pub fn from_json_str(json: &str) -> QinvResult<Self> {
        let config: RunConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks field ranges.
    pub fn validate(&self) -> QinvResult<()> {
        if self.max_statevector_qubits == 0 || self.max_statevector_qubits > STATEVECTOR_QUBIT_LIMIT {
            return Err(QinvError::Config {
                message: format!(
                    "maxStatevectorQubits must be between 1 and {}, got {}",
                    STATEVECTOR_QUBIT_LIMIT, self.max_statevector_qubits
                ),
            });
        }
        Ok(())
    }

    /// Sets the loop budget.
    pub fn with_loop_budget(mut self, budget: u64) -> Self {
        self.loop_iteration_budget = Some(budget);
        self
    }

    /// Sets the simulation mode.
    pub fn with_mode(mut self, mode: SimulationMode) -> Self {
        self.simulation_mode = mode;
        self
    }

    /// Sets the measurement seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sets the statevector ceiling.
    pub fn with_max_statevector_qubits(mut self, qubits: usize) -> Self {
        self.max_statevector_qubits = qubits;
        self
    }
}

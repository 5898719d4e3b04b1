// src/validation/mod.rs

//! Static checks on programs and runtime checks on quantum states.

use crate::core::{QinvError, QinvResult};
use crate::gates::GateDefinition;
use crate::operations::ElementaryGate;
use crate::simulation::SimulationMode;
use crate::vm::{Program, Statement};
use num_complex::Complex;
use std::collections::HashMap;

// Default tolerance (can be overridden by caller)
const DEFAULT_NORM_TOLERANCE: f64 = 1e-9;

/// Checks if the state vector is normalized (sum of squared amplitudes ≈ 1.0).
///
/// # Arguments
/// * `amplitudes` - Dense state vector.
/// * `tolerance` - Allowed deviation from 1.0. Defaults to `1e-9`.
///
/// # Returns
/// * `Ok(())` if normalized within tolerance.
/// * `Err(QinvError::Backend)` otherwise.
pub fn check_normalization(amplitudes: &[Complex<f64>], tolerance: Option<f64>) -> QinvResult<()> {
    let effective_tolerance = tolerance.unwrap_or(DEFAULT_NORM_TOLERANCE);
    let norm_sq: f64 = amplitudes.iter().map(|c| c.norm_sqr()).sum();
    if (norm_sq - 1.0).abs() > effective_tolerance {
        Err(QinvError::backend(format!(
            "state vector normalization failed: sum |c_i|^2 = {} (deviation > {})",
            norm_sq, effective_tolerance
        )))
    } else {
        Ok(())
    }
}

/// True when every gate the program can apply maps basis states to basis
/// states, so the whole run can use the basis-state tracker.
///
/// The scan is static: both branches of every switch and every loop body
/// count. Calls to gates that are not (yet) defined make the result false.
pub fn is_basis_preserving(program: &Program) -> bool {
    let mut composites: HashMap<&str, bool> = HashMap::new();
    scan_block(program.statements(), &mut composites)
}

fn scan_block<'a>(statements: &'a [Statement], composites: &mut HashMap<&'a str, bool>) -> bool {
    statements.iter().all(|statement| match statement {
        Statement::DefineGate(definition) => {
            let preserving = definition_preserves_basis(definition, composites);
            composites.insert(definition.name.as_str(), preserving);
            true
        }
        Statement::Gate(call) => gate_preserves_basis(&call.name, &call.params, composites),
        Statement::While { body, .. } | Statement::Block(body) => scan_block(body, composites),
        Statement::Switch { cases, default, .. } => {
            cases.iter().all(|case| scan_block(&case.body, composites))
                && default.as_deref().is_none_or(|body| scan_block(body, composites))
        }
        _ => true,
    })
}

fn definition_preserves_basis(definition: &GateDefinition, composites: &HashMap<&str, bool>) -> bool {
    definition
        .body
        .iter()
        .all(|step| gate_preserves_basis(&step.gate, &step.params, composites))
}

fn gate_preserves_basis(name: &str, params: &[f64], composites: &HashMap<&str, bool>) -> bool {
    if ElementaryGate::is_elementary(name) {
        return ElementaryGate::from_name(name, params).is_ok_and(|gate| gate.is_basis_preserving());
    }
    composites.get(name).copied().unwrap_or(false)
}

/// Replaces [`SimulationMode::Auto`] with the concrete mode for `program`.
pub fn resolve_mode(program: &Program, requested: SimulationMode) -> SimulationMode {
    match requested {
        SimulationMode::Auto if is_basis_preserving(program) => SimulationMode::ExactBasisState,
        SimulationMode::Auto => SimulationMode::FullStatevector,
        concrete => concrete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gates::GateStep;
    use crate::vm::{ClassicalExpr, Comparison, Condition, Operand, ProgramBuilder, SwitchCase};
    use std::f64::consts::{FRAC_1_SQRT_2, PI};

    fn shift() -> GateDefinition {
        GateDefinition::new("shift", ["d", "p0", "p1"])
            .step(GateStep::new("ccx", ["d", "p0", "p1"]))
            .step(GateStep::new("cx", ["d", "p0"]))
    }

    #[test]
    fn toffoli_programs_use_the_tracker() -> QinvResult<()> {
        let program = ProgramBuilder::new()
            .qubits("dir", 1)
            .qubits("pos", 2)
            .define(shift())
            .gate("x", [Operand::at("dir", 0)])
            .gate("shift", [Operand::at("dir", 0), Operand::at("pos", 0), Operand::at("pos", 1)])
            .call(crate::vm::GateCall::new("p", [Operand::at("dir", 0)]).with_params(vec![PI / 3.0]))
            .build()?;
        assert!(is_basis_preserving(&program));
        assert_eq!(resolve_mode(&program, SimulationMode::Auto), SimulationMode::ExactBasisState);
        assert_eq!(resolve_mode(&program, SimulationMode::FullStatevector), SimulationMode::FullStatevector);
        Ok(())
    }

    #[test]
    fn hadamard_anywhere_needs_the_statevector() -> QinvResult<()> {
        let program = ProgramBuilder::new()
            .qubits("q", 1)
            .int("c", 1, 0)
            .switch(
                ClassicalExpr::register("c"),
                vec![SwitchCase::new(vec![1], vec![Statement::Gate(crate::vm::GateCall::new("h", [Operand::at("q", 0)]))])],
                None,
            )
            .build()?;
        assert!(!is_basis_preserving(&program));

        let wrapped = ProgramBuilder::new()
            .qubits("q", 1)
            .bits("c", 1)
            .define(GateDefinition::new("mix", ["a"]).step(GateStep::new("h", ["a"])))
            .while_loop(Condition::new(ClassicalExpr::bit("c", 0), Comparison::Eq, 1), |b| {
                b.gate("mix", [Operand::at("q", 0)])
            })
            .build()?;
        assert_eq!(resolve_mode(&wrapped, SimulationMode::Auto), SimulationMode::FullStatevector);
        Ok(())
    }

    #[test]
    fn unknown_gates_are_not_assumed_safe() -> QinvResult<()> {
        let program = ProgramBuilder::new().qubits("q", 1).gate("mystery", [Operand::at("q", 0)]).build()?;
        assert!(!is_basis_preserving(&program));
        Ok(())
    }

    #[test]
    fn normalization() {
        let h = Complex::new(FRAC_1_SQRT_2, 0.0);
        assert!(check_normalization(&[h, h], None).is_ok());
        assert!(check_normalization(&[h, Complex::new(0.0, 0.0)], None).is_err());
        assert!(check_normalization(&[h, Complex::new(0.0, 0.0)], Some(0.6)).is_ok());
    }
}

// src/vm/interpreter.rs

//! The control-flow evaluator.

use super::cancel::CancellationToken;
use super::config::RunConfig;
use super::outcome::{ExecutionStatus, RunOutcome};
use super::program::{ClassicalExpr, Condition, GateCall, Operand, Program, Statement, SwitchCase};
use crate::core::{QinvError, QinvResult, QubitRef, ReferenceKind};
use crate::gates::GateLibrary;
use crate::measurement::MeasurementUnit;
use crate::operations::{ElementaryGate, Operation};
use crate::simulation::{SimulationMode, create_backend};
use crate::store::{RegisterKind, RegisterStore};
use crate::validation;
use tracing::{debug, info, instrument, trace, warn};

/// Executes [`Program`]s against a fresh register store per run.
///
/// Each call to [`run`](Evaluator::run) resolves the simulation mode,
/// creates an empty [`RegisterStore`], [`GateLibrary`] and
/// [`MeasurementUnit`], and walks the statement tree. The run never
/// panics and never returns an error: failures are reported in the
/// [`RunOutcome`] together with the classical registers reached so far.
///
/// # Examples
///
/// ```
/// # use qinv::vm::{Evaluator, ExecutionStatus, Operand, ProgramBuilder, RunConfig};
/// let program = ProgramBuilder::new()
///     .qubits("q", 2)
///     .bits("c", 2)
///     .gate("x", [Operand::at("q", 0)])
///     .gate("cx", [Operand::at("q", 0), Operand::at("q", 1)])
///     .measure(Operand::whole("q"), Operand::whole("c"))
///     .build()
///     .expect("well-formed program");
///
/// let mut vm = Evaluator::new(RunConfig::default());
/// let outcome = vm.run(&program);
/// assert_eq!(outcome.status, ExecutionStatus::Completed);
/// assert_eq!(outcome.value("c"), Some(0b11));
/// ```
#[derive(Debug, Default)]
pub struct Evaluator {
    config: RunConfig,
    cancel: CancellationToken,
    /// Register store of the most recent run.
    store: Option<RegisterStore>,
}

impl Evaluator {
    /// An evaluator with its own cancellation token.
    pub fn new(config: RunConfig) -> Self {
        Self { config, cancel: CancellationToken::new(), store: None }
    }

    /// Uses an externally owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// A handle that cancels this evaluator's runs. Once cancelled, later
    /// runs stop before their first statement as well.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The configuration applied to every run.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Registers and quantum state left by the last run, if any.
    pub fn store(&self) -> Option<&RegisterStore> {
        self.store.as_ref()
    }

    /// Runs `program` to completion, budget exhaustion, cancellation or
    /// the first error.
    #[instrument(level = "debug", skip_all, fields(statements = program.statement_count()))]
    pub fn run(&mut self, program: &Program) -> RunOutcome {
        self.store = None;
        let mode = validation::resolve_mode(program, self.config.simulation_mode);
        let mut machine = Machine {
            store: RegisterStore::new(create_backend(mode, self.config.max_statevector_qubits)),
            gates: GateLibrary::new(),
            meter: MeasurementUnit::new(self.config.seed),
            budget: self.config.loop_iteration_budget,
            cancel: &self.cancel,
            loop_iterations: 0,
            statements_executed: 0,
        };
        debug!(%mode, budget = ?machine.budget, seed = ?self.config.seed, "run started");

        let result = self.config.validate().and_then(|()| machine.exec_block(program.statements()));
        let status = match result {
            Ok(()) => ExecutionStatus::Completed,
            Err(err) => ExecutionStatus::from_error(err),
        };
        match &status {
            ExecutionStatus::Completed => {}
            ExecutionStatus::Failed(err) => warn!(error = %err, "run failed"),
            other => warn!(status = %other, "run stopped early"),
        }

        if mode == SimulationMode::FullStatevector {
            let amplitudes = machine.store.backend().amplitudes();
            if let Err(err) = amplitudes.and_then(|amps| validation::check_normalization(&amps, None)) {
                warn!(error = %err, "final state drifted");
            }
        }

        let outcome = RunOutcome {
            status,
            classical: machine.store.classical_snapshot(),
            loop_iterations: machine.loop_iterations,
            statements_executed: machine.statements_executed,
            mode,
        };
        info!(
            status = %outcome.status,
            loop_iterations = outcome.loop_iterations,
            statements = outcome.statements_executed,
            "run finished"
        );
        self.store = Some(machine.store);
        outcome
    }
}

/// State of one run.
struct Machine<'r> {
    store: RegisterStore,
    gates: GateLibrary,
    meter: MeasurementUnit,
    budget: Option<u64>,
    cancel: &'r CancellationToken,
    loop_iterations: u64,
    statements_executed: u64,
}

impl Machine<'_> {
    fn check_cancelled(&self) -> QinvResult<()> {
        if self.cancel.is_cancelled() {
            return Err(QinvError::Cancelled);
        }
        Ok(())
    }

    fn exec_block(&mut self, statements: &[Statement]) -> QinvResult<()> {
        for statement in statements {
            self.exec(statement)?;
        }
        Ok(())
    }

    fn exec(&mut self, statement: &Statement) -> QinvResult<()> {
        self.check_cancelled()?;
        self.statements_executed += 1;
        trace!(statement = keyword(statement), n = self.statements_executed, "exec");

        match statement {
            Statement::DeclareQubits { name, size } => {
                self.store.allocate(name, RegisterKind::Quantum, *size)?;
            }
            Statement::DeclareClassical { name, kind, width, initial } => {
                let handle = self.store.allocate(name, RegisterKind::Classical(*kind), *width)?;
                if let Some(value) = initial {
                    self.store.write_value(handle, *value)?;
                }
            }
            Statement::DefineGate(definition) => {
                self.gates.define(definition.clone())?;
            }
            Statement::Gate(call) => self.apply_call(call)?,
            Statement::Measure { qubit, target } => self.measure(qubit, target)?,
            Statement::Reset(operand) => self.reset(operand)?,
            Statement::Assign { target, value } => self.assign(target, value)?,
            Statement::While { condition, body } => self.run_loop(condition, body)?,
            Statement::Switch { scrutinee, cases, default } => {
                self.switch(scrutinee, cases, default.as_deref())?;
            }
            Statement::Block(body) => self.exec_block(body)?,
        }
        Ok(())
    }

    fn run_loop(&mut self, condition: &Condition, body: &[Statement]) -> QinvResult<()> {
        while self.holds(condition)? {
            self.check_cancelled()?;
            if let Some(budget) = self.budget {
                if self.loop_iterations >= budget {
                    return Err(QinvError::LoopBudgetExceeded { budget });
                }
            }
            self.loop_iterations += 1;
            self.exec_block(body)?;
        }
        Ok(())
    }

    fn switch(&mut self, scrutinee: &ClassicalExpr, cases: &[SwitchCase], default: Option<&[Statement]>) -> QinvResult<()> {
        let value = self.eval(scrutinee)?;
        match cases.iter().find(|case| case.labels.contains(&value)) {
            Some(case) => self.exec_block(&case.body),
            None => match default {
                Some(body) => self.exec_block(body),
                None => {
                    debug!(value, "switch without matching case");
                    Ok(())
                }
            },
        }
    }

    fn holds(&self, condition: &Condition) -> QinvResult<bool> {
        Ok(condition.op.evaluate(self.eval(&condition.lhs)?, condition.rhs))
    }

    fn eval(&self, expr: &ClassicalExpr) -> QinvResult<u64> {
        match expr {
            ClassicalExpr::Register(name) => self.store.read_value(self.store.classical_handle(name)?),
            ClassicalExpr::Bit { register, index } => {
                Ok(self.store.read_bit(self.store.classical_handle(register)?, *index)? as u64)
            }
            ClassicalExpr::Literal(value) => Ok(*value),
        }
    }

    fn assign(&mut self, target: &Operand, value: &ClassicalExpr) -> QinvResult<()> {
        let value = self.eval(value)?;
        let handle = self.store.classical_handle(&target.register)?;
        match target.index {
            Some(index) => self.store.write_bit(handle, index, value & 1 == 1),
            None => self.store.write_value(handle, value),
        }
    }

    /// Expands a call, then applies the whole expansion atomically.
    fn apply_call(&mut self, call: &GateCall) -> QinvResult<()> {
        let ops = expand_call(&self.gates, &self.store, call)?;
        trace!(call = %call, operations = ops.len(), "applying");
        self.store.apply_all(&ops)
    }

    fn measure(&mut self, qubit: &Operand, target: &Operand) -> QinvResult<()> {
        let qubits = operand_qubits(&self.store, qubit)?;
        let handle = self.store.classical_handle(&target.register)?;
        let bits: Vec<usize> = match target.index {
            Some(index) => vec![index],
            None => (0..self.store.width(handle)?).collect(),
        };
        if qubits.len() != bits.len() {
            return Err(QinvError::invalid(format!(
                "cannot measure {} ({} qubits) into {} ({} bits)",
                qubit,
                qubits.len(),
                target,
                bits.len()
            )));
        }
        for (q, bit) in qubits.into_iter().zip(bits) {
            let outcome = self.meter.measure(&mut self.store, q)?;
            self.store.write_bit(handle, bit, outcome)?;
        }
        Ok(())
    }

    fn reset(&mut self, operand: &Operand) -> QinvResult<()> {
        for q in operand_qubits(&self.store, operand)? {
            if self.meter.measure(&mut self.store, q)? {
                self.store.apply(&Operation::new(ElementaryGate::X, vec![q], Vec::new())?)?;
            }
        }
        Ok(())
    }
}

/// Qubits named by an operand: one, or the whole register in order.
pub(crate) fn operand_qubits(store: &RegisterStore, operand: &Operand) -> QinvResult<Vec<QubitRef>> {
    let handle = store.quantum_handle(&operand.register)?;
    match operand.index {
        Some(index) => Ok(vec![store.qubit(handle, index)?]),
        None => store.qubits(handle),
    }
}

/// Resolves a call against `store` and lowers it to elementary operations,
/// broadcasting whole-register operands element-wise.
pub(crate) fn expand_call(gates: &GateLibrary, store: &RegisterStore, call: &GateCall) -> QinvResult<Vec<Operation>> {
    let (arity, _) = gates
        .signature(&call.name)
        .ok_or_else(|| QinvError::undefined(ReferenceKind::Gate, call.name.clone()))?;
    let own = call.operands.len().checked_sub(call.controls).ok_or_else(|| {
        QinvError::invalid(format!("'{}' declares more controls than operands", call))
    })?;
    if own != arity {
        return Err(QinvError::ArityMismatch { gate: call.name.clone(), expected: arity, got: own });
    }

    let resolved = call
        .operands
        .iter()
        .map(|operand| operand_qubits(store, operand))
        .collect::<QinvResult<Vec<_>>>()?;
    let width = resolved.iter().map(Vec::len).max().unwrap_or(1);
    if let Some(bad) = resolved.iter().position(|qs| qs.len() != 1 && qs.len() != width) {
        return Err(QinvError::invalid(format!(
            "cannot broadcast '{}': operand {} has {} qubits, expected 1 or {}",
            call,
            call.operands[bad],
            resolved[bad].len(),
            width
        )));
    }

    let mut ops = Vec::new();
    for k in 0..width {
        let qubits: Vec<QubitRef> = resolved.iter().map(|qs| if qs.len() == 1 { qs[0] } else { qs[k] }).collect();
        let (controls, operands) = qubits.split_at(call.controls);
        ops.extend(gates.expand(&call.name, &call.params, controls, operands)?);
    }
    Ok(ops)
}

fn keyword(statement: &Statement) -> &'static str {
    match statement {
        Statement::DeclareQubits { .. } => "qubit",
        Statement::DeclareClassical { .. } => "classical",
        Statement::DefineGate(_) => "gate-def",
        Statement::Gate(_) => "gate",
        Statement::Measure { .. } => "measure",
        Statement::Reset(_) => "reset",
        Statement::Assign { .. } => "assign",
        Statement::While { .. } => "while",
        Statement::Switch { .. } => "switch",
        Statement::Block(_) => "block",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::{Comparison, ProgramBuilder};

    #[test]
    fn broadcasting_applies_element_wise() -> QinvResult<()> {
        let program = ProgramBuilder::new()
            .qubits("a", 3)
            .qubits("b", 3)
            .qubits("c", 1)
            .bits("m", 3)
            .gate("x", [Operand::whole("a")])
            .gate("cx", [Operand::whole("a"), Operand::whole("b")])
            .gate("cx", [Operand::at("a", 0), Operand::at("c", 0)])
            .measure(Operand::whole("b"), Operand::whole("m"))
            .build()?;
        let mut vm = Evaluator::new(RunConfig::default());
        let outcome = vm.run(&program);
        assert_eq!(outcome.status, ExecutionStatus::Completed);
        assert_eq!(outcome.value("m"), Some(0b111));
        let store = vm.store().expect("store kept after run");
        assert_eq!(store.quantum_basis_value("c")?, Some(1));
        Ok(())
    }

    #[test]
    fn broadcast_size_mismatch_fails_before_applying() -> QinvResult<()> {
        let program = ProgramBuilder::new()
            .qubits("a", 2)
            .qubits("b", 3)
            .gate("cx", [Operand::whole("a"), Operand::whole("b")])
            .build()?;
        let mut vm = Evaluator::new(RunConfig::default());
        let outcome = vm.run(&program);
        assert!(matches!(outcome.status, ExecutionStatus::Failed(QinvError::InvalidOperation { .. })));
        Ok(())
    }

    #[test]
    fn failed_application_leaves_no_partial_effect() -> QinvResult<()> {
        use crate::gates::{GateDefinition, GateStep};
        let program = ProgramBuilder::new()
            .qubits("q", 2)
            .define(GateDefinition::new("mixed", ["a", "b"]).step(GateStep::new("x", ["a"])).step(GateStep::new("h", ["b"])))
            .gate("mixed", [Operand::at("q", 0), Operand::at("q", 1)])
            .build()?;
        let mut vm = Evaluator::new(RunConfig::default().with_mode(SimulationMode::ExactBasisState));
        let outcome = vm.run(&program);
        assert!(matches!(outcome.status, ExecutionStatus::Failed(QinvError::Backend { .. })));
        let store = vm.store().expect("store kept after run");
        assert_eq!(store.quantum_basis_value("q")?, Some(0));
        Ok(())
    }

    #[test]
    fn reset_returns_qubits_to_zero()-> QinvResult<()> {
        let program = ProgramBuilder::new()
            .qubits("q", 2)
            .bits("c", 2)
            .gate("x", [Operand::whole("q")])
            .reset(Operand::at("q", 1))
            .measure(Operand::whole("q"), Operand::whole("c"))
            .build()?;
        let outcome = Evaluator::new(RunConfig::default()).run(&program);
        assert_eq!(outcome.value("c"), Some(0b01));
        Ok(())
    }

    #[test]
    fn assignment_copies_and_truncates() -> QinvResult<()> {
        let program = ProgramBuilder::new()
            .int("wide", 8, 0b1011_0110)
            .int("narrow", 3, 0)
            .bits("flag", 2)
            .assign(Operand::whole("narrow"), ClassicalExpr::register("wide"))
            .assign(Operand::at("flag", 1), ClassicalExpr::Literal(3))
            .build()?;
        let outcome = Evaluator::new(RunConfig::default()).run(&program);
        assert_eq!(outcome.value("narrow"), Some(0b110));
        assert_eq!(outcome.value("flag"), Some(0b10));
        Ok(())
    }

    #[test]
    fn loop_counts_every_body_entry() -> QinvResult<()> {
        let program = ProgramBuilder::new()
            .qubits("q", 2)
            .bits("c", 2)
            .while_loop(
                Condition::new(ClassicalExpr::register("c"), Comparison::Ne, 3),
                |b| {
                    b.gate("x", [Operand::at("q", 0)])
                        .gate("cx", [Operand::at("q", 0), Operand::at("q", 1)])
                        .measure(Operand::whole("q"), Operand::whole("c"))
                },
            )
            .build()?;
        let outcome = Evaluator::new(RunConfig::default()).run(&program);
        // x then cx takes |00> to |11> on the first pass
        assert_eq!(outcome.status, ExecutionStatus::Completed);
        assert_eq!(outcome.loop_iterations, 1);
        assert_eq!(outcome.statements_executed, 3 + 3);
        Ok(())
    }
}

// src/lib.rs

//! `qinv` - an interpreter core for hybrid classical/quantum circuit programs
//!
//! Programs declare qubit and classical registers, define composite gates
//! from elementary ones, apply gates, measure, and steer execution with
//! `while` loops and `switch` statements on measured values. The
//! [`Evaluator`] walks a [`Program`] against a [`RegisterStore`] backed
//! either by an exact basis-state tracker or a full statevector.

pub mod abstraction;
pub mod core;
pub mod gates;
pub mod measurement;
pub mod operations;
pub mod simulation;
pub mod store;
pub mod validation;
pub mod vm;

// Re-export the most common types for easier top-level use
pub use abstraction::{TransitionSystem, abstract_program};
pub use crate::core::{QinvError, QinvResult, QuantumState, QubitRef, ReferenceKind};
pub use gates::{GateDefinition, GateLibrary, GateStep};
pub use measurement::MeasurementUnit;
pub use operations::{ElementaryGate, Operation};
pub use simulation::{QuantumBackend, SimulationMode};
pub use store::{ClassicalKind, ClassicalSnapshot, ClassicalValue, RegisterStore};
pub use validation::{check_normalization, is_basis_preserving, resolve_mode};
pub use vm::{
    CancellationToken, ClassicalExpr, Comparison, Condition, Evaluator, ExecutionStatus, GateCall, Operand, Program,
    ProgramBuilder, RunConfig, RunOutcome, Statement, SwitchCase, run_batch,
};

// Example 1: Shift register driven by a Toffoli-based composite gate
// With `dir = 1` the two-qubit position register steps |00> -> |01>.
/// ```
/// use qinv::{
///     Evaluator, ExecutionStatus, GateDefinition, GateStep, Operand, ProgramBuilder, RunConfig,
///     SimulationMode,
/// };
///
/// let shift = GateDefinition::new("shift", ["d", "p0", "p1"])
///     .step(GateStep::new("ccx", ["d", "p0", "p1"]))
///     .step(GateStep::new("cx", ["d", "p0"]));
///
/// let program = ProgramBuilder::new()
///     .qubits("dir", 1)
///     .qubits("pos", 2)
///     .bits("out", 2)
///     .define(shift)
///     .gate("x", [Operand::at("dir", 0)])
///     .gate("shift", [Operand::at("dir", 0), Operand::at("pos", 0), Operand::at("pos", 1)])
///     .measure(Operand::whole("pos"), Operand::whole("out"))
///     .build()
///     .expect("well-formed program");
///
/// let config = RunConfig::default().with_mode(SimulationMode::ExactBasisState);
/// let outcome = Evaluator::new(config).run(&program);
/// println!("{}", program);
///
/// assert_eq!(outcome.status, ExecutionStatus::Completed);
/// assert_eq!(outcome.bit("out", 0), Some(true));
/// assert_eq!(outcome.bit("out", 1), Some(false));
/// ```
#[doc(hidden)]
const _: () = (); // Attaches the preceding doc comment block to a hidden item

// Example 2: Repeat-until-success loop on a superposed qubit
// Measurement outcomes depend on the seed; the loop stops once it sees a 1.
/// ```
/// use qinv::{
///     ClassicalExpr, Comparison, Condition, Evaluator, ExecutionStatus, Operand, ProgramBuilder,
///     RunConfig, SimulationMode,
/// };
///
/// let program = ProgramBuilder::new()
///     .qubits("q", 1)
///     .bits("c", 1)
///     .while_loop(Condition::new(ClassicalExpr::bit("c", 0), Comparison::Eq, 0), |body| {
///         body.reset(Operand::at("q", 0))
///             .gate("h", [Operand::at("q", 0)])
///             .measure(Operand::at("q", 0), Operand::at("c", 0))
///     })
///     .build()
///     .expect("well-formed program");
///
/// let config = RunConfig::default().with_seed(42).with_loop_budget(1_000);
/// let outcome = Evaluator::new(config).run(&program);
///
/// assert_eq!(outcome.mode, SimulationMode::FullStatevector);
/// assert_eq!(outcome.status, ExecutionStatus::Completed);
/// assert_eq!(outcome.value("c"), Some(1));
/// assert!(outcome.loop_iterations >= 1);
/// ```
#[doc(hidden)]
const _: () = (); // Attaches the preceding doc comment block to a hidden item

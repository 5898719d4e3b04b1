// src/vm/mod.rs

//! Program representation and the evaluator that runs it.

mod batch;
mod cancel;
mod config;
mod interpreter;
pub mod program;
mod outcome;

pub use batch::run_batch;
pub use cancel::CancellationToken;
pub use config::RunConfig;
pub use interpreter::Evaluator;
pub(crate) use interpreter::{expand_call, operand_qubits};
pub use outcome::{ExecutionStatus, RunOutcome};
pub use program::{
    ClassicalExpr, Comparison, Condition, GateCall, Operand, Program, ProgramBuilder, Statement, SwitchCase,
};

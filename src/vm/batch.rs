// src/vm/batch.rs

use super::config::RunConfig;
use super::interpreter::Evaluator;
use super::outcome::RunOutcome;
use super::program::Program;
use rayon::prelude::*;
use tracing::debug;

/// Runs independent programs in parallel, one evaluator per program.
///
/// Outcomes are returned in input order. With a fixed seed every program
/// sees the same measurement stream it would see when run alone.
pub fn run_batch(programs: &[Program], config: &RunConfig) -> Vec<RunOutcome> {
    debug!(programs = programs.len(), "batch started");
    programs
        .par_iter()
        .map(|program| Evaluator::new(config.clone()).run(program))
        .collect()
}

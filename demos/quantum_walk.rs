//! Example: Discrete quantum walk on a cycle of four positions.
//! A Hadamard coin decides the direction; controlled increment and
//! decrement gates move the walker; the loop repeats until the walker is
//! measured away from the origin. Runs on the full statevector.

use qinv::{
    ClassicalExpr, Comparison, Condition, Evaluator, ExecutionStatus, GateCall, GateDefinition, GateStep, Operand,
    ProgramBuilder, RunConfig, run_batch,
};
use std::collections::BTreeMap;
use tracing_subscriber::EnvFilter;

fn coin_controlled(gate: &str) -> GateCall {
    GateCall::new(gate, [Operand::at("dir", 0), Operand::at("pos", 0), Operand::at("pos", 1)]).controlled(1)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("--- qinv Example: Quantum Walk ---");

    let config = match std::env::args().nth(1) {
        Some(path) => RunConfig::from_json_str(&std::fs::read_to_string(path)?)?,
        None => RunConfig::default().with_seed(7).with_loop_budget(1_000),
    };

    let program = ProgramBuilder::new()
        .qubits("dir", 1)
        .qubits("pos", 2)
        .bits("out", 2)
        .define(
            GateDefinition::new("dec", ["p0", "p1"])
                .step(GateStep::new("x", ["p0"]))
                .step(GateStep::new("cx", ["p0", "p1"])),
        )
        .define(
            GateDefinition::new("inc", ["p0", "p1"])
                .step(GateStep::new("cx", ["p0", "p1"]))
                .step(GateStep::new("x", ["p0"])),
        )
        .measure(Operand::whole("pos"), Operand::whole("out"))
        .while_loop(Condition::new(ClassicalExpr::register("out"), Comparison::Eq, 0), |body| {
            body.gate("h", [Operand::at("dir", 0)])
                .gate("x", [Operand::at("dir", 0)])
                .call(coin_controlled("dec"))
                .gate("x", [Operand::at("dir", 0)])
                .call(coin_controlled("inc"))
                .measure(Operand::whole("pos"), Operand::whole("out"))
        })
        .build()?;

    println!("Program:\n{}", program);

    let outcome = Evaluator::new(config.clone()).run(&program);
    println!("Single run: status={} mode={} out={:?}", outcome.status, outcome.mode, outcome.value("out"));

    // Many unseeded walks in parallel give the landing distribution.
    let trials = 256;
    let unseeded = RunConfig { seed: None, ..config };
    let programs = vec![program; trials];
    let mut histogram: BTreeMap<u64, usize> = BTreeMap::new();
    for outcome in run_batch(&programs, &unseeded) {
        if outcome.status == ExecutionStatus::Completed {
            if let Some(out) = outcome.value("out") {
                *histogram.entry(out).or_default() += 1;
            }
        }
    }
    println!("Landing positions over {} walks:", trials);
    for (position, count) in histogram {
        println!("  {:>2}: {}", position, count);
    }
    Ok(())
}

//! Example: Toffoli shift register driven by measured classical control.
//! A direction qubit is prepared and measured; `switch` on the measured
//! value picks which composite shift to apply, and a `while` loop keeps
//! shifting until the position register wraps back to zero.

use qinv::vm::Statement;
use qinv::{
    ClassicalExpr, Comparison, Condition, Evaluator, GateCall, GateDefinition, GateStep, Operand, ProgramBuilder,
    RunConfig, SimulationMode, SwitchCase,
};
use tracing_subscriber::EnvFilter;

fn pos_call(gate: &str) -> Statement {
    Statement::Gate(GateCall::new(gate, [Operand::at("dir", 0), Operand::at("pos", 0), Operand::at("pos", 1)]))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("--- qinv Example: Shift Register ---");

    // shift right: pos += dir
    let rshift = GateDefinition::new("rshift", ["d", "p0", "p1"])
        .step(GateStep::new("ccx", ["d", "p0", "p1"]))
        .step(GateStep::new("cx", ["d", "p0"]));
    // shift left: pos -= dir
    let lshift = GateDefinition::new("lshift", ["d", "p0", "p1"])
        .step(GateStep::new("cx", ["d", "p0"]))
        .step(GateStep::new("ccx", ["d", "p0", "p1"]));

    let program = ProgramBuilder::new()
        .qubits("dir", 1)
        .qubits("pos", 2)
        .bits("d", 1)
        .bits("out", 2)
        .int("steps", 8, 0)
        .define(rshift)
        .define(lshift)
        .gate("x", [Operand::at("dir", 0)])
        .measure(Operand::at("dir", 0), Operand::at("d", 0))
        .pb_add(pos_call("rshift"))
        .measure(Operand::whole("pos"), Operand::whole("out"))
        .while_loop(Condition::new(ClassicalExpr::register("out"), Comparison::Ne, 0), |body| {
            body.switch(
                ClassicalExpr::register("d"),
                vec![
                    SwitchCase::new(vec![0], vec![pos_call("lshift")]),
                    SwitchCase::new(vec![1], vec![pos_call("rshift")]),
                ],
                None,
            )
            .measure(Operand::whole("pos"), Operand::whole("out"))
        })
        .assign(Operand::whole("steps"), ClassicalExpr::register("out"))
        .build()?;

    println!("Program:\n{}", program);

    let config = RunConfig::default().with_mode(SimulationMode::ExactBasisState).with_loop_budget(16);
    let mut vm = Evaluator::new(config);
    let outcome = vm.run(&program);

    println!("Status:          {}", outcome.status);
    println!("Loop iterations: {}", outcome.loop_iterations);
    println!("Final registers: {}", serde_json::to_string_pretty(&outcome.classical)?);
    if let Some(store) = vm.store() {
        println!("pos basis value: {:?}", store.quantum_basis_value("pos")?);
    }
    Ok(())
}

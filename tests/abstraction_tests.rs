// tests/abstraction_tests.rs

use qinv::abstraction::{TransitionKind, abstract_program};
use qinv::vm::GateCall;
use qinv::{ClassicalExpr, Comparison, Condition, GateDefinition, GateStep, Operand, Program, ProgramBuilder};

fn increment() -> GateDefinition {
    GateDefinition::new("inc", ["p0", "p1"])
        .step(GateStep::new("cx", ["p0", "p1"]))
        .step(GateStep::new("x", ["p0"]))
}

fn decrement() -> GateDefinition {
    GateDefinition::new("dec", ["p0", "p1"])
        .step(GateStep::new("x", ["p0"]))
        .step(GateStep::new("cx", ["p0", "p1"]))
}

fn quantum_walk() -> Result<Program, Box<dyn std::error::Error>> {
    let walk = ProgramBuilder::new()
        .qubits("dir", 1)
        .qubits("pos", 2)
        .bits("out", 2)
        .define(decrement())
        .define(increment())
        .measure(Operand::whole("pos"), Operand::whole("out"))
        .while_loop(Condition::new(ClassicalExpr::register("out"), Comparison::Eq, 0), |b| {
            b.gate("h", [Operand::at("dir", 0)])
                .gate("x", [Operand::at("dir", 0)])
                .call(GateCall::new("dec", [Operand::at("dir", 0), Operand::at("pos", 0), Operand::at("pos", 1)]).controlled(1))
                .gate("x", [Operand::at("dir", 0)])
                .call(GateCall::new("inc", [Operand::at("dir", 0), Operand::at("pos", 0), Operand::at("pos", 1)]).controlled(1))
                .measure(Operand::whole("pos"), Operand::whole("out"))
        })
        .build()?;
    Ok(walk)
}

#[test]
fn test_walk_abstraction_is_complete() -> Result<(), Box<dyn std::error::Error>> {
    let program = quantum_walk()?;
    let mut system = abstract_program(&program)?;

    assert_eq!(system.num_variables(), 5);
    let widths: Vec<(&str, usize)> = system.registers().iter().map(|(name, vars)| (name.as_str(), vars.len())).collect();
    assert_eq!(widths, vec![("dir", 1), ("out", 2), ("pos", 2)]);

    let before = system.locations().len();
    system.minimise();
    assert!(system.locations().len() < before, "chains contract");

    for location in system.locations() {
        if location != system.exit() {
            assert!(system.is_complete_at(location)?, "location {} leaks weight", location.index());
        }
    }
    let leaves = system
        .transitions()
        .into_iter()
        .filter(|(_, to, t)| *to == system.exit() && t.kind == TransitionKind::Guard)
        .count();
    assert_eq!(leaves, 1, "the loop is left through its guard");
    Ok(())
}

#[test]
fn test_exit_loop_closes_the_system() -> Result<(), Box<dyn std::error::Error>> {
    let program = quantum_walk()?;
    let mut system = abstract_program(&program)?;
    system.minimise();

    assert!(!system.is_complete_at(system.exit())?, "terminal exit");
    system.add_exit_loop();
    for location in system.locations() {
        assert!(system.is_complete_at(location)?);
    }
    let exit = system.exit();
    assert_eq!(system.outgoing(exit).len(), 1);
    assert_eq!(system.outgoing(exit)[0].0, exit);
    assert!(system.to_string().contains("skip"));
    Ok(())
}

#[test]
fn test_controlled_u_becomes_one_unitary_edge() -> Result<(), Box<dyn std::error::Error>> {
    let program = ProgramBuilder::new()
        .qubits("q", 2)
        .call(
            GateCall::new("cu", [Operand::at("q", 0), Operand::at("q", 1)])
                .with_params(vec![std::f64::consts::FRAC_PI_2, 0.0, 0.0, 0.5]),
        )
        .build()?;
    let system = abstract_program(&program)?;

    let unitaries: Vec<_> = system.transitions().into_iter().filter(|(_, _, t)| t.kind == TransitionKind::Unitary).collect();
    assert_eq!(unitaries.len(), 1);
    let (from, _, transition) = unitaries[0];
    assert_eq!(transition.map.operators().len(), 1);
    assert_eq!(transition.map.qubits().len(), 2);
    assert!(system.is_complete_at(from)?);
    Ok(())
}

// src/abstraction/lower.rs

use super::{KrausMap, Location, Transition, TransitionKind, TransitionSystem};
use crate::core::{QinvError, QinvResult, QubitRef, ReferenceKind};
use crate::gates::GateLibrary;
use crate::simulation::BasisStateTracker;
use crate::store::{RegisterKind, RegisterStore};
use crate::vm::{ClassicalExpr, Condition, Operand, Program, Statement, SwitchCase, expand_call, operand_qubits};
use petgraph::Direction;
use petgraph::stable_graph::StableDiGraph;
use petgraph::visit::EdgeRef;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, instrument};

/// Lowers `program` into its transition system.
///
/// Registers, gate definitions and calls resolve exactly as in the
/// evaluator. Loop bodies and switch arms whose guard can never hold are
/// not lowered.
///
/// # Errors
/// Any resolution error in a lowered statement, and `InvalidOperation` when
/// a guard reads more than [`MAX_KRAUS_QUBITS`](super::MAX_KRAUS_QUBITS)
/// classical bits or a gate touches more than that many qubits.
///
/// # Examples
///
/// ```
/// # use qinv::abstraction::abstract_program;
/// # use qinv::{ClassicalExpr, Comparison, Condition, Operand, ProgramBuilder};
/// let program = ProgramBuilder::new()
///     .bits("c", 1)
///     .qubits("q", 1)
///     .while_loop(Condition::new(ClassicalExpr::register("c"), Comparison::Eq, 0), |b| {
///         b.gate("h", [Operand::at("q", 0)]).measure(Operand::at("q", 0), Operand::at("c", 0))
///     })
///     .build()
///     .expect("well-formed program");
///
/// let mut system = abstract_program(&program).expect("abstractable");
/// system.minimise();
/// assert_eq!(system.locations().len(), 3);
/// for location in system.locations() {
///     if location != system.exit() {
///         assert!(system.is_complete_at(location).expect("small maps"));
///     }
/// }
/// ```
#[instrument(level = "debug", skip_all, fields(statements = program.statement_count()))]
pub fn abstract_program(program: &Program) -> QinvResult<TransitionSystem> {
    let mut lowering = Lowering::new();
    let entry = lowering.graph.add_node(());
    let exit = lowering.block(program.statements(), entry)?;
    let num_variables = lowering.store.backend().num_qubits();
    debug!(
        locations = lowering.graph.node_count(),
        transitions = lowering.graph.edge_count(),
        variables = num_variables,
        "abstraction built"
    );
    Ok(TransitionSystem { graph: lowering.graph, entry, exit, registers: lowering.registers, num_variables })
}

/// A classical value read by a guard or an assignment.
enum Read {
    Bits(Vec<QubitRef>),
    Constant(u64),
}

struct Lowering {
    graph: StableDiGraph<(), Transition, u32>,
    /// Resolves quantum operands; classical bits get anonymous variables
    /// allocated after their register.
    store: RegisterStore,
    gates: GateLibrary,
    classical: HashMap<String, Vec<QubitRef>>,
    registers: BTreeMap<String, Vec<QubitRef>>,
}

impl Lowering {
    fn new() -> Self {
        Self {
            graph: StableDiGraph::default(),
            store: RegisterStore::new(Box::new(BasisStateTracker::new())),
            gates: GateLibrary::new(),
            classical: HashMap::new(),
            registers: BTreeMap::new(),
        }
    }

    fn edge(&mut self, from: Location, kind: TransitionKind, map: KrausMap) -> Location {
        let to = self.graph.add_node(());
        self.graph.add_edge(from, to, Transition::new(kind, map));
        to
    }

    /// One edge per map, or a single skip when there are none.
    fn chain(&mut self, from: Location, kind: TransitionKind, maps: Vec<KrausMap>) -> Location {
        if maps.is_empty() {
            return self.edge(from, TransitionKind::Skip, KrausMap::identity());
        }
        maps.into_iter().fold(from, |at, map| self.edge(at, kind, map))
    }

    fn block(&mut self, statements: &[Statement], mut at: Location) -> QinvResult<Location> {
        for statement in statements {
            at = self.statement(statement, at)?;
        }
        Ok(at)
    }

    fn statement(&mut self, statement: &Statement, at: Location) -> QinvResult<Location> {
        match statement {
            Statement::DeclareQubits { name, size } => {
                let handle = self.store.allocate(name, RegisterKind::Quantum, *size)?;
                let qubits = self.store.qubits(handle)?;
                let maps = qubits.iter().map(|&q| KrausMap::set(q, false)).collect::<QinvResult<_>>()?;
                self.registers.insert(name.clone(), qubits);
                Ok(self.chain(at, TransitionKind::Init, maps))
            }
            Statement::DeclareClassical { name, kind, width, initial } => {
                self.store.allocate(name, RegisterKind::Classical(*kind), *width)?;
                let first = self.store.backend_mut().allocate(*width)?.index();
                let bits: Vec<QubitRef> = (first..first + width).map(QubitRef).collect();
                let maps = set_bits(&bits, initial.unwrap_or(0))?;
                self.classical.insert(name.clone(), bits.clone());
                self.registers.insert(name.clone(), bits);
                Ok(self.chain(at, TransitionKind::Init, maps))
            }
            Statement::DefineGate(definition) => {
                self.gates.define(definition.clone())?;
                Ok(self.edge(at, TransitionKind::Skip, KrausMap::identity()))
            }
            Statement::Gate(call) => {
                let ops = expand_call(&self.gates, &self.store, call)?;
                let maps = ops.iter().map(KrausMap::unitary).collect::<QinvResult<_>>()?;
                Ok(self.chain(at, TransitionKind::Unitary, maps))
            }
            Statement::Measure { qubit, target } => {
                let qubits = operand_qubits(&self.store, qubit)?;
                let bits = self.classical_bits(target)?;
                if qubits.len() != bits.len() {
                    return Err(QinvError::invalid(format!(
                        "cannot measure {} ({} qubits) into {} ({} bits)",
                        qubit,
                        qubits.len(),
                        target,
                        bits.len()
                    )));
                }
                let maps = qubits
                    .into_iter()
                    .zip(bits)
                    .map(|(q, b)| KrausMap::measure(q, b))
                    .collect::<QinvResult<_>>()?;
                Ok(self.chain(at, TransitionKind::Measure, maps))
            }
            Statement::Reset(operand) => {
                let maps = operand_qubits(&self.store, operand)?
                    .into_iter()
                    .map(|q| KrausMap::set(q, false))
                    .collect::<QinvResult<_>>()?;
                Ok(self.chain(at, TransitionKind::Init, maps))
            }
            Statement::Assign { target, value } => {
                let maps = self.assign(target, value)?;
                Ok(self.chain(at, TransitionKind::Init, maps))
            }
            Statement::While { condition, body } => self.while_loop(condition, body, at),
            Statement::Switch { scrutinee, cases, default } => self.switch(scrutinee, cases, default.as_deref(), at),
            Statement::Block(body) => self.block(body, at),
        }
    }

    /// Variables of a classical operand: one bit or the whole register.
    fn classical_bits(&self, operand: &Operand) -> QinvResult<Vec<QubitRef>> {
        let handle = self.store.classical_handle(&operand.register)?;
        let bits = self
            .classical
            .get(&operand.register)
            .ok_or_else(|| QinvError::undefined(ReferenceKind::ClassicalRegister, operand.register.clone()))?;
        match operand.index {
            Some(index) => {
                self.store.read_bit(handle, index)?;
                Ok(vec![bits[index]])
            }
            None => Ok(bits.clone()),
        }
    }

    fn read(&self, expr: &ClassicalExpr) -> QinvResult<Read> {
        Ok(match expr {
            ClassicalExpr::Register(name) => Read::Bits(self.classical_bits(&Operand::whole(name))?),
            ClassicalExpr::Bit { register, index } => Read::Bits(self.classical_bits(&Operand::at(register, *index))?),
            ClassicalExpr::Literal(value) => Read::Constant(*value),
        })
    }

    /// Bitwise copy with the evaluator's wrap-around: target bit `i` takes
    /// source bit `i`, or 0 past the end of the source.
    fn assign(&self, target: &Operand, value: &ClassicalExpr) -> QinvResult<Vec<KrausMap>> {
        let targets = self.classical_bits(target)?;
        match self.read(value)? {
            Read::Constant(v) => set_bits(&targets, v),
            Read::Bits(sources) => targets
                .iter()
                .enumerate()
                .filter(|&(i, t)| sources.get(i) != Some(t))
                .map(|(i, &t)| match sources.get(i) {
                    Some(&s) => KrausMap::copy(s, t),
                    None => KrausMap::set(t, false),
                })
                .collect(),
        }
    }

    /// Projection onto the values of `read` accepted by `select`.
    fn guard(&self, read: &Read, select: impl Fn(u64) -> bool) -> QinvResult<KrausMap> {
        match read {
            Read::Bits(bits) => KrausMap::projection(bits.clone(), select),
            Read::Constant(value) => {
                let value = *value;
                KrausMap::projection(Vec::new(), move |_| select(value))
            }
        }
    }

    fn while_loop(&mut self, condition: &Condition, body: &[Statement], head: Location) -> QinvResult<Location> {
        let read = self.read(&condition.lhs)?;
        let holds = |v: u64| condition.op.evaluate(v, condition.rhs);
        let enter = self.guard(&read, holds)?;
        let leave = self.guard(&read, |v| !holds(v))?;

        if !enter.is_zero() {
            let start = self.graph.add_node(());
            self.graph.add_edge(head, start, Transition::new(TransitionKind::Guard, enter));
            let end = self.block(body, start)?;
            self.merge(end, head);
        }
        let exit = self.graph.add_node(());
        if !leave.is_zero() {
            self.graph.add_edge(head, exit, Transition::new(TransitionKind::Guard, leave));
        }
        Ok(exit)
    }

    fn switch(
        &mut self,
        scrutinee: &ClassicalExpr,
        cases: &[SwitchCase],
        default: Option<&[Statement]>,
        at: Location,
    ) -> QinvResult<Location> {
        let read = self.read(scrutinee)?;
        let arm_of = |v: u64| cases.iter().position(|case| case.labels.contains(&v));
        let exit = self.graph.add_node(());

        for (k, case) in cases.iter().enumerate() {
            let select = self.guard(&read, |v| arm_of(v) == Some(k))?;
            self.arm(at, select, &case.body, exit)?;
        }
        let unmatched = self.guard(&read, |v| arm_of(v).is_none())?;
        self.arm(at, unmatched, default.unwrap_or(&[]), exit)?;
        Ok(exit)
    }

    fn arm(&mut self, at: Location, select: KrausMap, body: &[Statement], exit: Location) -> QinvResult<()> {
        if select.is_zero() {
            return Ok(());
        }
        let start = self.graph.add_node(());
        self.graph.add_edge(at, start, Transition::new(TransitionKind::Guard, select));
        let end = self.block(body, start)?;
        self.merge(end, exit);
        Ok(())
    }

    /// Moves every transition of `from` onto `into` and drops `from`.
    fn merge(&mut self, from: Location, into: Location) {
        if from == into {
            return;
        }
        for direction in [Direction::Incoming, Direction::Outgoing] {
            let edges: Vec<_> = self.graph.edges_directed(from, direction).map(|e| e.id()).collect();
            for id in edges {
                let Some((source, target)) = self.graph.edge_endpoints(id) else { continue };
                let Some(transition) = self.graph.remove_edge(id) else { continue };
                let source = if source == from { into } else { source };
                let target = if target == from { into } else { target };
                self.graph.add_edge(source, target, transition);
            }
        }
        self.graph.remove_node(from);
    }
}

/// Sets `bits` to `value` modulo `2^len`.
fn set_bits(bits: &[QubitRef], value: u64) -> QinvResult<Vec<KrausMap>> {
    bits.iter()
        .enumerate()
        .map(|(i, &b)| KrausMap::set(b, (value >> i) & 1 == 1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abstraction::Matrix;
    use crate::vm::{Comparison, ProgramBuilder};

    fn guard_sources(system: &TransitionSystem) -> Vec<Location> {
        let mut sources: Vec<Location> = system
            .transitions()
            .into_iter()
            .filter(|(_, _, t)| t.kind == TransitionKind::Guard)
            .map(|(from, _, _)| from)
            .collect();
        sources.dedup();
        sources
    }

    #[test]
    fn straight_line_program_is_a_chain() -> QinvResult<()> {
        let program = ProgramBuilder::new().qubits("q", 2).gate("h", [Operand::at("q", 0)]).build()?;
        let system = abstract_program(&program)?;
        assert_eq!(system.num_variables(), 2);
        assert_eq!(system.registers()["q"], vec![QubitRef(0), QubitRef(1)]);

        let kinds: Vec<TransitionKind> = system.transitions().iter().map(|(_, _, t)| t.kind).collect();
        assert_eq!(kinds, vec![TransitionKind::Init, TransitionKind::Init, TransitionKind::Unitary]);
        let (_, _, h) = system.transitions()[2];
        let entry = h.map.operators()[0].get(1, 0);
        assert!((entry.re - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-12);
        assert!(system.outgoing(system.exit()).is_empty());
        Ok(())
    }

    #[test]
    fn loop_back_edge_returns_to_head() -> QinvResult<()> {
        let program = ProgramBuilder::new()
            .bits("c", 1)
            .qubits("q", 1)
            .while_loop(Condition::new(ClassicalExpr::register("c"), Comparison::Eq, 0), |b| {
                b.gate("h", [Operand::at("q", 0)]).measure(Operand::at("q", 0), Operand::at("c", 0))
            })
            .build()?;
        let mut system = abstract_program(&program)?;
        let heads = guard_sources(&system);
        assert_eq!(heads.len(), 1);
        let head = heads[0];
        assert_eq!(system.outgoing(head).len(), 2);
        assert!(system.is_complete_at(head)?);

        system.minimise();
        let transitions = system.transitions();
        assert_eq!(transitions.len(), 3);
        assert!(transitions.iter().any(|(from, to, t)| *from == head && *to == head && t.kind == TransitionKind::Path));
        assert!(transitions.iter().any(|(from, to, _)| *from == system.entry() && *to == head));
        assert!(transitions.iter().any(|(from, to, t)| *from == head && *to == system.exit() && t.kind == TransitionKind::Guard));
        Ok(())
    }

    #[test]
    fn constant_guards_drop_impossible_branches() -> QinvResult<()> {
        let never = ProgramBuilder::new()
            .qubits("q", 1)
            .while_loop(Condition::new(ClassicalExpr::Literal(1), Comparison::Eq, 0), |b| {
                b.gate("undefined_gate", [Operand::at("q", 0)])
            })
            .build()?;
        let system = abstract_program(&never)?;
        let head = guard_sources(&system)[0];
        let out = system.outgoing(head);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, system.exit());
        assert!(out[0].1.map.is_identity());
        Ok(())
    }

    #[test]
    fn assignment_copies_bits_and_clears_the_rest() -> QinvResult<()> {
        let program = ProgramBuilder::new()
            .bits("a", 1)
            .int("b", 3, 0)
            .assign(Operand::whole("b"), ClassicalExpr::register("a"))
            .assign(Operand::whole("b"), ClassicalExpr::register("b"))
            .build()?;
        let system = abstract_program(&program)?;
        let inits: Vec<&Transition> = system
            .transitions()
            .into_iter()
            .map(|(_, _, t)| t)
            .filter(|t| t.kind == TransitionKind::Init)
            .collect();
        // a: 1 bit, b: 3 bits, then b := a as one copy and two clears
        assert_eq!(inits.len(), 7);
        assert_eq!(inits[4].map, KrausMap::copy(QubitRef(0), QubitRef(1))?);
        assert_eq!(inits[5].map, KrausMap::set(QubitRef(2), false)?);
        // self-assignment is a skip
        assert_eq!(system.transitions().last().map(|(_, _, t)| t.kind), Some(TransitionKind::Skip));
        Ok(())
    }

    #[test]
    fn resolution_errors_match_the_evaluator() {
        let undeclared = ProgramBuilder::new().qubits("q", 1).measure(Operand::at("q", 0), Operand::at("c", 0));
        assert!(matches!(
            abstract_program(&undeclared.build().expect("builds")),
            Err(QinvError::UndefinedReference { kind: ReferenceKind::ClassicalRegister, .. })
        ));

        let wide_guard = ProgramBuilder::new()
            .int("n", 16, 0)
            .while_loop(Condition::new(ClassicalExpr::register("n"), Comparison::Lt, 3), |b| b)
            .build()
            .expect("builds");
        assert!(matches!(abstract_program(&wide_guard), Err(QinvError::InvalidOperation { .. })));
    }

    #[test]
    fn switch_branches_partition_the_scrutinee() -> QinvResult<()> {
        let program = ProgramBuilder::new()
            .int("c", 2, 0)
            .qubits("q", 1)
            .switch(
                ClassicalExpr::register("c"),
                vec![
                    SwitchCase::new(vec![0, 1], Vec::new()),
                    SwitchCase::new(vec![7], vec![Statement::Reset(Operand::whole("q"))]),
                ],
                None,
            )
            .build()?;
        let system = abstract_program(&program)?;
        let switch_at = guard_sources(&system)[0];
        let out = system.outgoing(switch_at);
        // first arm and the no-match branch; label 7 never fits in two bits
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|(to, _)| *to == system.exit()));
        let mut sum = Matrix::zeros(4);
        for (_, t) in &out {
            sum += &t.map.completeness();
        }
        assert!(sum.is_identity());
        Ok(())
    }
}

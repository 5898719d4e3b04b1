// src/vm/program.rs

//! Program representation: a tree of statements over named registers.
//!
//! Programs are produced by an external parser or by [`ProgramBuilder`] and
//! are read-only while being evaluated.

use crate::core::{QinvError, QinvResult};
use crate::store::ClassicalKind;
use std::collections::HashSet;
use std::fmt;

pub use crate::gates::{GateDefinition, GateStep};

/// A register reference in a statement: `q[1]` or the whole register `q`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Operand {
    /// Register name.
    pub register: String,
    /// Element index, or `None` for the whole register.
    pub index: Option<usize>,
}

impl Operand {
    /// `register[index]`
    pub fn at(register: &str, index: usize) -> Self {
        Self { register: register.to_string(), index: Some(index) }
    }

    /// The whole register.
    pub fn whole(register: &str) -> Self {
        Self { register: register.to_string(), index: None }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(i) => write!(f, "{}[{}]", self.register, i),
            None => write!(f, "{}", self.register),
        }
    }
}

/// Classical value read by guards, switches and assignments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassicalExpr {
    /// Integer interpretation of a whole classical register.
    Register(String),
    /// One bit of a classical register (0 or 1).
    Bit {
        /// Register name.
        register: String,
        /// Bit index.
        index: usize,
    },
    /// Constant.
    Literal(u64),
}

impl ClassicalExpr {
    /// Whole register `name`.
    pub fn register(name: &str) -> Self {
        ClassicalExpr::Register(name.to_string())
    }

    /// Bit `index` of register `name`.
    pub fn bit(name: &str, index: usize) -> Self {
        ClassicalExpr::Bit { register: name.to_string(), index }
    }
}

impl fmt::Display for ClassicalExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassicalExpr::Register(name) => write!(f, "{}", name),
            ClassicalExpr::Bit { register, index } => write!(f, "{}[{}]", register, index),
            ClassicalExpr::Literal(value) => write!(f, "{}", value),
        }
    }
}

/// Relational operator of a loop guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl Comparison {
    /// Applies the operator to unsigned operands.
    pub fn evaluate(self, lhs: u64, rhs: u64) -> bool {
        match self {
            Comparison::Eq => lhs == rhs,
            Comparison::Ne => lhs != rhs,
            Comparison::Lt => lhs < rhs,
            Comparison::Le => lhs <= rhs,
            Comparison::Gt => lhs > rhs,
            Comparison::Ge => lhs >= rhs,
        }
    }

    /// Source form of the operator.
    pub fn symbol(self) -> &'static str {
        match self {
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
        }
    }
}

/// `lhs <op> rhs` with a literal right-hand side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    /// Value under test.
    pub lhs: ClassicalExpr,
    /// Operator.
    pub op: Comparison,
    /// Literal compared against.
    pub rhs: u64,
}

impl Condition {
    /// Builds a condition.
    pub fn new(lhs: ClassicalExpr, op: Comparison, rhs: u64) -> Self {
        Self { lhs, op, rhs }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.lhs, self.op.symbol(), self.rhs)
    }
}

/// A gate application in a program.
///
/// The first `controls` operands are `ctrl @` controls; the rest are the
/// gate's own operands. Whole-register operands broadcast element-wise.
#[derive(Debug, Clone, PartialEq)]
pub struct GateCall {
    /// Elementary or composite gate name.
    pub name: String,
    /// Angle arguments.
    pub params: Vec<f64>,
    /// Number of leading control operands.
    pub controls: usize,
    /// Operands, controls first.
    pub operands: Vec<Operand>,
}

impl GateCall {
    /// A call without angles or controls.
    pub fn new<I>(name: &str, operands: I) -> Self
    where
        I: IntoIterator<Item = Operand>,
    {
        Self { name: name.to_string(), params: Vec::new(), controls: 0, operands: operands.into_iter().collect() }
    }

    /// Sets the angle arguments.
    pub fn with_params(mut self, params: Vec<f64>) -> Self {
        self.params = params;
        self
    }

    /// Marks the first `controls` operands as controls.
    pub fn controlled(mut self, controls: usize) -> Self {
        self.controls = controls;
        self
    }
}

impl fmt::Display for GateCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.controls > 0 {
            write!(f, "ctrl({}) @ ", self.controls)?;
        }
        write!(f, "{}", self.name)?;
        if !self.params.is_empty() {
            let rendered: Vec<String> = self.params.iter().map(|p| p.to_string()).collect();
            write!(f, "({})", rendered.join(", "))?;
        }
        let operands: Vec<String> = self.operands.iter().map(|o| o.to_string()).collect();
        write!(f, " {}", operands.join(", "))
    }
}

/// One arm of a `switch`.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    /// Values selecting this arm.
    pub labels: Vec<u64>,
    /// Statements run when selected.
    pub body: Vec<Statement>,
}

impl SwitchCase {
    /// Builds a case.
    pub fn new(labels: Vec<u64>, body: Vec<Statement>) -> Self {
        Self { labels, body }
    }
}

/// A program statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `qubit[size] name;`
    DeclareQubits {
        /// Register name.
        name: String,
        /// Number of qubits.
        size: usize,
    },
    /// `bit[width] name;` or `int[width] name = initial;`
    DeclareClassical {
        /// Register name.
        name: String,
        /// Bit or integer register.
        kind: ClassicalKind,
        /// Width in bits.
        width: usize,
        /// Optional initial value (wraps modulo `2^width`).
        initial: Option<u64>,
    },
    /// `gate name a, b { ... }`
    DefineGate(GateDefinition),
    /// A gate application.
    Gate(GateCall),
    /// `target = measure qubit;`
    Measure {
        /// Qubit or whole quantum register.
        qubit: Operand,
        /// Bit or whole classical register.
        target: Operand,
    },
    /// `reset q;`
    Reset(Operand),
    /// `target = value;`
    Assign {
        /// Register or single bit written.
        target: Operand,
        /// Value read.
        value: ClassicalExpr,
    },
    /// Pre-tested loop.
    While {
        /// Loop guard.
        condition: Condition,
        /// Loop body.
        body: Vec<Statement>,
    },
    /// Multi-way branch on a classical value.
    Switch {
        /// Value selecting the arm.
        scrutinee: ClassicalExpr,
        /// Arms in order; the first match wins.
        cases: Vec<SwitchCase>,
        /// Arm run when no case matches.
        default: Option<Vec<Statement>>,
    },
    /// `{ ... }`
    Block(Vec<Statement>),
}

// --- Program Structure ---

/// A complete program: top-level statements in source order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub(crate) statements: Vec<Statement>,
}

impl Program {
    /// Wraps a statement list without checking it; prefer [`ProgramBuilder`].
    pub fn new(statements: Vec<Statement>) -> Self {
        Self { statements }
    }

    /// Top-level statements.
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// Number of statements in the tree, nested bodies included.
    pub fn statement_count(&self) -> usize {
        fn count(statements: &[Statement]) -> usize {
            statements
                .iter()
                .map(|s| {
                    1 + match s {
                        Statement::While { body, .. } | Statement::Block(body) => count(body),
                        Statement::Switch { cases, default, .. } => {
                            cases.iter().map(|c| count(&c.body)).sum::<usize>()
                                + default.as_deref().map_or(0, count)
                        }
                        _ => 0,
                    }
                })
                .sum()
        }
        count(&self.statements)
    }
}

fn write_block(f: &mut fmt::Formatter<'_>, statements: &[Statement], depth: usize) -> fmt::Result {
    for statement in statements {
        write_statement(f, statement, depth)?;
    }
    Ok(())
}

fn write_statement(f: &mut fmt::Formatter<'_>, statement: &Statement, depth: usize) -> fmt::Result {
    let pad = "  ".repeat(depth);
    match statement {
        Statement::DeclareQubits { name, size } => writeln!(f, "{}qubit[{}] {};", pad, size, name),
        Statement::DeclareClassical { name, kind, width, initial } => {
            let ty = match kind {
                ClassicalKind::Bit => "bit",
                ClassicalKind::Int => "int",
            };
            match initial {
                Some(value) => writeln!(f, "{}{}[{}] {} = {};", pad, ty, width, name, value),
                None => writeln!(f, "{}{}[{}] {};", pad, ty, width, name),
            }
        }
        Statement::DefineGate(definition) => writeln!(f, "{}{}", pad, definition),
        Statement::Gate(call) => writeln!(f, "{}{};", pad, call),
        Statement::Measure { qubit, target } => writeln!(f, "{}{} = measure {};", pad, target, qubit),
        Statement::Reset(operand) => writeln!(f, "{}reset {};", pad, operand),
        Statement::Assign { target, value } => writeln!(f, "{}{} = {};", pad, target, value),
        Statement::While { condition, body } => {
            writeln!(f, "{}while ({}) {{", pad, condition)?;
            write_block(f, body, depth + 1)?;
            writeln!(f, "{}}}", pad)
        }
        Statement::Switch { scrutinee, cases, default } => {
            writeln!(f, "{}switch ({}) {{", pad, scrutinee)?;
            for case in cases {
                let labels: Vec<String> = case.labels.iter().map(|l| l.to_string()).collect();
                writeln!(f, "{}  case {} {{", pad, labels.join(", "))?;
                write_block(f, &case.body, depth + 2)?;
                writeln!(f, "{}  }}", pad)?;
            }
            if let Some(body) = default {
                writeln!(f, "{}  default {{", pad)?;
                write_block(f, body, depth + 2)?;
                writeln!(f, "{}  }}", pad)?;
            }
            writeln!(f, "{}}}", pad)
        }
        Statement::Block(body) => {
            writeln!(f, "{}{{", pad)?;
            write_block(f, body, depth + 1)?;
            writeln!(f, "{}}}", pad)
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_block(f, &self.statements, 0)
    }
}

// --- Program Builder ---

/// Facilitates the construction of [`Program`] instances using a fluent API.
///
/// Loop and switch bodies are built with nested builders.
///
/// # Examples
/// ```
/// # use qinv::vm::{ClassicalExpr, Comparison, Condition, Operand, ProgramBuilder};
/// let program = ProgramBuilder::new()
///     .qubits("q", 1)
///     .bits("c", 1)
///     .while_loop(Condition::new(ClassicalExpr::bit("c", 0), Comparison::Eq, 0), |body| {
///         body.gate("x", [Operand::at("q", 0)])
///             .measure(Operand::at("q", 0), Operand::at("c", 0))
///     })
///     .build()
///     .expect("well-formed program");
///
/// assert_eq!(program.statement_count(), 5);
/// println!("{}", program);
/// ```
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    statements: Vec<Statement>,
}

impl ProgramBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a statement.
    pub fn pb_add(mut self, statement: Statement) -> Self {
        self.statements.push(statement);
        self
    }

    /// Appends several statements.
    pub fn add_many<I>(mut self, statements: I) -> Self
    where
        I: IntoIterator<Item = Statement>,
    {
        self.statements.extend(statements);
        self
    }

    /// `qubit[size] name;`
    pub fn qubits(self, name: &str, size: usize) -> Self {
        self.pb_add(Statement::DeclareQubits { name: name.to_string(), size })
    }

    /// `bit[width] name;`
    pub fn bits(self, name: &str, width: usize) -> Self {
        self.pb_add(Statement::DeclareClassical {
            name: name.to_string(),
            kind: ClassicalKind::Bit,
            width,
            initial: None,
        })
    }

    /// `int[width] name = initial;`
    pub fn int(self, name: &str, width: usize, initial: u64) -> Self {
        self.pb_add(Statement::DeclareClassical {
            name: name.to_string(),
            kind: ClassicalKind::Int,
            width,
            initial: Some(initial),
        })
    }

    /// Defines a composite gate.
    pub fn define(self, definition: GateDefinition) -> Self {
        self.pb_add(Statement::DefineGate(definition))
    }

    /// Applies a gate without angles or controls.
    pub fn gate<I>(self, name: &str, operands: I) -> Self
    where
        I: IntoIterator<Item = Operand>,
    {
        self.pb_add(Statement::Gate(GateCall::new(name, operands)))
    }

    /// Applies an arbitrary gate call.
    pub fn call(self, call: GateCall) -> Self {
        self.pb_add(Statement::Gate(call))
    }

    /// `target = measure qubit;`
    pub fn measure(self, qubit: Operand, target: Operand) -> Self {
        self.pb_add(Statement::Measure { qubit, target })
    }

    /// `reset operand;`
    pub fn reset(self, operand: Operand) -> Self {
        self.pb_add(Statement::Reset(operand))
    }

    /// `target = value;`
    pub fn assign(self, target: Operand, value: ClassicalExpr) -> Self {
        self.pb_add(Statement::Assign { target, value })
    }

    /// `while (condition) { body }`
    pub fn while_loop<F>(self, condition: Condition, body: F) -> Self
    where
        F: FnOnce(ProgramBuilder) -> ProgramBuilder,
    {
        let body = body(ProgramBuilder::new()).into_statements();
        self.pb_add(Statement::While { condition, body })
    }

    /// `switch (scrutinee) { cases.. default }`
    pub fn switch(self, scrutinee: ClassicalExpr, cases: Vec<SwitchCase>, default: Option<Vec<Statement>>) -> Self {
        self.pb_add(Statement::Switch { scrutinee, cases, default })
    }

    /// The statements collected so far, for use as a nested body.
    pub fn into_statements(self) -> Vec<Statement> {
        self.statements
    }

    /// Builds the final `Program`.
    ///
    /// # Errors
    /// `InvalidOperation` when a gate call has more controls than operands
    /// or a switch repeats a case label.
    pub fn build(self) -> QinvResult<Program> {
        check_block(&self.statements)?;
        Ok(Program { statements: self.statements })
    }
}

fn check_block(statements: &[Statement]) -> QinvResult<()> {
    for statement in statements {
        match statement {
            Statement::Gate(call) if call.controls > call.operands.len() => {
                return Err(QinvError::invalid(format!(
                    "'{}' declares {} controls but has {} operands",
                    call,
                    call.controls,
                    call.operands.len()
                )));
            }
            Statement::While { body, .. } | Statement::Block(body) => check_block(body)?,
            Statement::Switch { cases, default, .. } => {
                let mut seen = HashSet::new();
                for case in cases {
                    for label in &case.labels {
                        if !seen.insert(*label) {
                            return Err(QinvError::invalid(format!("duplicate switch case label {}", label)));
                        }
                    }
                    check_block(&case.body)?;
                }
                if let Some(body) = default {
                    check_block(body)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

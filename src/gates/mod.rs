// src/gates/mod.rs

//! User-defined composite gates.
//!
//! A [`GateLibrary`] is an interned table of immutable [`GateDefinition`]
//! records. Definitions may only refer to elementary gates and to composite
//! gates defined before them, so the table is a DAG by construction;
//! expansion still tracks the gates it is inside of and reports
//! [`QinvError::CyclicDefinition`] rather than recursing forever.

use crate::core::{QinvError, QinvResult, QubitRef, ReferenceKind};
use crate::operations::{ElementaryGate, Operation};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, trace};

/// One step of a gate body: apply `gate` to formal parameters.
///
/// The first `controls` names in `qubits` are extra controls (the
/// `ctrl @` modifier); the rest are the gate's own operands.
#[derive(Debug, Clone, PartialEq)]
pub struct GateStep {
    /// Elementary or previously defined composite gate.
    pub gate: String,
    /// Angle arguments (elementary parameterised gates only).
    pub params: Vec<f64>,
    /// Number of leading qubits used as controls.
    pub controls: usize,
    /// Formal parameter names.
    pub qubits: Vec<String>,
}

impl GateStep {
    /// A step without angles or controls.
    pub fn new<I, S>(gate: &str, qubits: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            gate: gate.to_string(),
            params: Vec::new(),
            controls: 0,
            qubits: qubits.into_iter().map(Into::into).collect(),
        }
    }

    /// Sets the angle arguments.
    pub fn with_params(mut self, params: Vec<f64>) -> Self {
        self.params = params;
        self
    }

    /// Marks the first `controls` qubits as controls.
    pub fn controlled(mut self, controls: usize) -> Self {
        self.controls = controls;
        self
    }
}

impl fmt::Display for GateStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.controls > 0 {
            write!(f, "ctrl({}) @ ", self.controls)?;
        }
        write!(f, "{}", self.gate)?;
        if !self.params.is_empty() {
            let rendered: Vec<String> = self.params.iter().map(|p| p.to_string()).collect();
            write!(f, "({})", rendered.join(", "))?;
        }
        write!(f, " {};", self.qubits.join(", "))
    }
}

/// `gate name a, b, c { ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct GateDefinition {
    /// Gate name.
    pub name: String,
    /// Formal qubit parameters, in call order.
    pub qubits: Vec<String>,
    /// Steps applied in order.
    pub body: Vec<GateStep>,
}

impl GateDefinition {
    /// A definition with an empty body.
    pub fn new<I, S>(name: &str, qubits: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            qubits: qubits.into_iter().map(Into::into).collect(),
            body: Vec::new(),
        }
    }

    /// Appends a step.
    pub fn step(mut self, step: GateStep) -> Self {
        self.body.push(step);
        self
    }

    /// Number of formal qubit parameters.
    pub fn arity(&self) -> usize {
        self.qubits.len()
    }
}

impl fmt::Display for GateDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gate {} {} {{", self.name, self.qubits.join(", "))?;
        for step in &self.body {
            write!(f, " {}", step)?;
        }
        write!(f, " }}")
    }
}

/// Index of a definition inside its [`GateLibrary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GateId(usize);

/// Table of composite gates for one run.
#[derive(Debug, Clone, Default)]
pub struct GateLibrary {
    index: HashMap<String, GateId>,
    definitions: Vec<GateDefinition>,
}

impl GateLibrary {
    /// An empty library; elementary gates are always available.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of composite definitions.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// True when no composite gate has been defined.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Looks up a composite gate.
    pub fn lookup(&self, name: &str) -> QinvResult<GateId> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| QinvError::undefined(ReferenceKind::Gate, name))
    }

    /// The record behind an id.
    pub fn get(&self, id: GateId) -> &GateDefinition {
        &self.definitions[id.0]
    }

    /// `(qubits, angles)` taken by a gate name, elementary or composite.
    pub fn signature(&self, name: &str) -> Option<(usize, usize)> {
        ElementaryGate::signature(name).or_else(|| self.index.get(name).map(|id| (self.get(*id).arity(), 0)))
    }

    /// Validates and interns a definition.
    ///
    /// # Errors
    /// - `Redeclaration` when the name is elementary or already defined.
    /// - `InvalidDefinition` for missing or repeated formal parameters, or a
    ///   step naming the same parameter twice.
    /// - `CyclicDefinition` when a step calls the gate being defined.
    /// - `UndefinedReference` for unknown (or not yet defined) gates and for
    ///   qubits that are not formal parameters.
    /// - `ArityMismatch` / `ParameterMismatch` for malformed steps.
    pub fn define(&mut self, definition: GateDefinition) -> QinvResult<GateId> {
        let name = definition.name.clone();
        if ElementaryGate::is_elementary(&name) || self.index.contains_key(&name) {
            return Err(QinvError::Redeclaration { name });
        }
        if definition.qubits.is_empty() {
            return Err(QinvError::InvalidDefinition { name, reason: "needs at least one qubit parameter".into() });
        }
        let formals: HashSet<&str> = definition.qubits.iter().map(String::as_str).collect();
        if formals.len() != definition.qubits.len() {
            return Err(QinvError::InvalidDefinition { name, reason: "qubit parameters must be distinct".into() });
        }

        for step in &definition.body {
            if step.gate == name {
                return Err(QinvError::CyclicDefinition { name });
            }
            let (arity, angles) = self
                .signature(&step.gate)
                .ok_or_else(|| QinvError::undefined(ReferenceKind::Gate, step.gate.clone()))?;
            if step.params.len() != angles {
                return Err(QinvError::ParameterMismatch {
                    gate: step.gate.clone(),
                    expected: angles,
                    got: step.params.len(),
                });
            }
            if step.qubits.len() != arity + step.controls {
                return Err(QinvError::ArityMismatch {
                    gate: step.gate.clone(),
                    expected: arity + step.controls,
                    got: step.qubits.len(),
                });
            }
            let mut used = HashSet::with_capacity(step.qubits.len());
            for q in &step.qubits {
                if !formals.contains(q.as_str()) {
                    return Err(QinvError::undefined(ReferenceKind::GateParameter, q.clone()));
                }
                if !used.insert(q.as_str()) {
                    return Err(QinvError::InvalidDefinition {
                        name,
                        reason: format!("step '{}' uses '{}' more than once", step, q),
                    });
                }
            }
        }

        let id = GateId(self.definitions.len());
        debug!(gate = %name, arity = definition.arity(), steps = definition.body.len(), "gate defined");
        self.index.insert(name, id);
        self.definitions.push(definition);
        Ok(id)
    }

    // Bypasses validation so expansion-time cycle detection can be tested.
    #[cfg(test)]
    pub(crate) fn insert_unchecked(&mut self, definition: GateDefinition) -> GateId {
        let id = GateId(self.definitions.len());
        self.index.insert(definition.name.clone(), id);
        self.definitions.push(definition);
        id
    }

    /// Expands a gate application into elementary operations.
    ///
    /// `controls` are extra control qubits from `ctrl @` modifiers and
    /// `qubits` the gate's own operands. Nothing is applied; on error no
    /// partial expansion escapes.
    pub fn expand(
        &self,
        name: &str,
        params: &[f64],
        controls: &[QubitRef],
        qubits: &[QubitRef],
    ) -> QinvResult<Vec<Operation>> {
        let mut out = Vec::new();
        let mut stack = Vec::new();
        self.expand_into(name, params, controls, qubits, &mut stack, &mut out)?;
        trace!(gate = name, operations = out.len(), "gate expanded");
        Ok(out)
    }

    fn expand_into(
        &self,
        name: &str,
        params: &[f64],
        controls: &[QubitRef],
        qubits: &[QubitRef],
        stack: &mut Vec<GateId>,
        out: &mut Vec<Operation>,
    ) -> QinvResult<()> {
        if let Some((arity, _)) = ElementaryGate::signature(name) {
            if qubits.len() != arity {
                return Err(QinvError::ArityMismatch { gate: name.to_string(), expected: arity, got: qubits.len() });
            }
            let gate = ElementaryGate::from_name(name, params)?;
            out.push(Operation::new(gate, qubits.to_vec(), controls.to_vec())?);
            return Ok(());
        }

        let id = self.lookup(name)?;
        let definition = self.get(id);
        if !params.is_empty() {
            return Err(QinvError::ParameterMismatch { gate: name.to_string(), expected: 0, got: params.len() });
        }
        if qubits.len() != definition.arity() {
            return Err(QinvError::ArityMismatch {
                gate: name.to_string(),
                expected: definition.arity(),
                got: qubits.len(),
            });
        }
        if stack.contains(&id) {
            return Err(QinvError::CyclicDefinition { name: name.to_string() });
        }
        let distinct: HashSet<QubitRef> = controls.iter().chain(qubits.iter()).copied().collect();
        if distinct.len() != controls.len() + qubits.len() {
            return Err(QinvError::invalid(format!("gate '{}' applied to the same qubit twice", name)));
        }

        let binding: HashMap<&str, QubitRef> =
            definition.qubits.iter().map(String::as_str).zip(qubits.iter().copied()).collect();

        stack.push(id);
        for step in &definition.body {
            let resolved = step
                .qubits
                .iter()
                .map(|formal| {
                    binding
                        .get(formal.as_str())
                        .copied()
                        .ok_or_else(|| QinvError::undefined(ReferenceKind::GateParameter, formal.clone()))
                })
                .collect::<QinvResult<Vec<QubitRef>>>()?;
            let (step_controls, operands) = resolved.split_at(step.controls.min(resolved.len()));
            let all_controls: Vec<QubitRef> = controls.iter().chain(step_controls.iter()).copied().collect();
            self.expand_into(&step.gate, &step.params, &all_controls, operands, stack, out)?;
        }
        stack.pop();
        Ok(())
    }
}

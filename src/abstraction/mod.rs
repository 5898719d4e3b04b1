// src/abstraction/mod.rs

//! Control-flow abstraction of programs.
//!
//! [`abstract_program`] lowers a [`Program`](crate::vm::Program) into a
//! [`TransitionSystem`]: a control-flow graph whose edges are labelled with
//! Kraus maps. Every qubit and every classical bit becomes a variable, so
//! measurements, assignments and branch guards are ordinary quantum
//! operations on basis states:
//!
//! - declarations and `reset` set their variables,
//! - gate calls expand to one unitary edge per elementary operation,
//! - `measure` is a dephasing copy from the qubit to the classical bit,
//! - `while` and `switch` guards are projections onto the classical values
//!   that select each branch.
//!
//! Branches that can never be taken are left out, so the Kraus maps leaving
//! any location other than the exit sum to a trace-preserving channel.

mod kraus;
mod lower;

pub use kraus::{KrausMap, MAX_KRAUS_OPERATORS, MAX_KRAUS_QUBITS, Matrix};
pub use lower::abstract_program;

use crate::core::{QinvResult, QubitRef};
use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use std::collections::BTreeMap;
use std::fmt;
use tracing::trace;

/// A program point.
pub type Location = NodeIndex<u32>;

/// The statement a transition came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionKind {
    /// No effect on any variable.
    Skip,
    /// Declaration, `reset` or classical assignment.
    Init,
    /// Elementary gate.
    Unitary,
    /// Measurement into a classical bit.
    Measure,
    /// Branch taken by a `while` or `switch`.
    Guard,
    /// Several transitions contracted by [`TransitionSystem::minimise`].
    Path,
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransitionKind::Skip => "skip",
            TransitionKind::Init => "init",
            TransitionKind::Unitary => "unit",
            TransitionKind::Measure => "measure",
            TransitionKind::Guard => "guard",
            TransitionKind::Path => "path",
        };
        write!(f, "{name}")
    }
}

/// An edge label.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub kind: TransitionKind,
    pub map: KrausMap,
}

impl Transition {
    pub fn new(kind: TransitionKind, map: KrausMap) -> Self {
        Self { kind, map }
    }

    pub fn skip() -> Self {
        Self::new(TransitionKind::Skip, KrausMap::identity())
    }

    /// `self` followed by `next`, as one transition.
    fn then(&self, next: &Transition) -> QinvResult<Self> {
        let kind = match (self.kind, next.kind) {
            (TransitionKind::Skip, kind) | (kind, TransitionKind::Skip) => kind,
            _ => TransitionKind::Path,
        };
        Ok(Self::new(kind, self.map.then(&next.map)?))
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.map)
    }
}

/// Kraus-map-labelled control-flow graph of a program.
#[derive(Debug, Clone)]
pub struct TransitionSystem {
    graph: StableDiGraph<(), Transition, u32>,
    entry: Location,
    exit: Location,
    registers: BTreeMap<String, Vec<QubitRef>>,
    num_variables: usize,
}

impl TransitionSystem {
    /// Where execution starts.
    pub fn entry(&self) -> Location {
        self.entry
    }

    /// Where execution ends.
    pub fn exit(&self) -> Location {
        self.exit
    }

    /// Total number of variables (qubits plus classical bits).
    pub fn num_variables(&self) -> usize {
        self.num_variables
    }

    /// Variables of every declared register, by name. Bit `i` of a register
    /// is element `i`.
    pub fn registers(&self) -> &BTreeMap<String, Vec<QubitRef>> {
        &self.registers
    }

    pub fn locations(&self) -> Vec<Location> {
        self.graph.node_indices().collect()
    }

    /// All transitions as `(from, to, label)`, ordered by endpoints.
    pub fn transitions(&self) -> Vec<(Location, Location, &Transition)> {
        let mut all: Vec<_> = self
            .graph
            .edge_indices()
            .filter_map(|e| {
                let (from, to) = self.graph.edge_endpoints(e)?;
                Some((from, to, self.graph.edge_weight(e)?))
            })
            .collect();
        all.sort_by_key(|(from, to, _)| (from.index(), to.index()));
        all
    }

    /// Transitions leaving `location` as `(to, label)`.
    pub fn outgoing(&self, location: Location) -> Vec<(Location, &Transition)> {
        let mut out: Vec<_> = self
            .graph
            .edges_directed(location, Direction::Outgoing)
            .map(|e| (e.target(), e.weight()))
            .collect();
        out.sort_by_key(|(to, _)| to.index());
        out
    }

    /// Whether the maps leaving `location` together form a trace-preserving
    /// channel. A location without outgoing transitions is not complete.
    pub fn is_complete_at(&self, location: Location) -> QinvResult<bool> {
        let outgoing = self.outgoing(location);
        if outgoing.is_empty() {
            return Ok(false);
        }
        let mut support: Vec<QubitRef> = Vec::new();
        for (_, t) in &outgoing {
            for q in t.map.qubits() {
                if !support.contains(q) {
                    support.push(*q);
                }
            }
        }
        let mut sum = Matrix::zeros(1usize << support.len().min(MAX_KRAUS_QUBITS));
        for (_, t) in &outgoing {
            sum += &t.map.expand_to(&support)?.completeness();
        }
        Ok(sum.is_identity())
    }

    /// Contracts every location with exactly one incoming and one outgoing
    /// transition into a single `path` transition. Entry and exit are kept,
    /// and so is any location whose composed map would exceed the Kraus
    /// limits.
    pub fn minimise(&mut self) {
        loop {
            let candidate = self.graph.node_indices().find_map(|v| {
                if v == self.entry || v == self.exit {
                    return None;
                }
                let mut incoming = self.graph.edges_directed(v, Direction::Incoming);
                let mut outgoing = self.graph.edges_directed(v, Direction::Outgoing);
                let (into, out) = (incoming.next()?, outgoing.next()?);
                if incoming.next().is_some() || outgoing.next().is_some() {
                    return None;
                }
                if into.source() == v || out.target() == v {
                    return None;
                }
                let merged = into.weight().then(out.weight()).ok()?;
                Some((v, into.source(), out.target(), merged))
            });
            let Some((v, from, to, merged)) = candidate else { break };
            trace!(location = v.index(), from = from.index(), to = to.index(), "contracting");
            self.graph.remove_node(v);
            self.graph.add_edge(from, to, merged);
        }
    }

    /// Adds an identity self-loop at the exit, making every location
    /// non-terminal.
    pub fn add_exit_loop(&mut self) {
        self.graph.add_edge(self.exit, self.exit, Transition::skip());
    }
}

impl fmt::Display for TransitionSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "entry: {}", self.entry.index())?;
        writeln!(f, "exit: {}", self.exit.index())?;
        for (from, to, t) in self.transitions() {
            writeln!(f, "{} -> {}: {}", from.index(), to.index(), t)?;
        }
        Ok(())
    }
}

// src/store/mod.rs

//! The register store: named quantum and classical registers of one run.
//!
//! Quantum registers are contiguous runs of [`QubitRef`]s into a single
//! [`QuantumBackend`]; classical registers are fixed-width bit vectors held
//! as `u64` values, bit `i` weighing `2^i`. All writes of integers wrap
//! modulo `2^width`.

use crate::core::{QinvError, QinvResult, QubitRef, ReferenceKind};
use crate::operations::Operation;
use crate::simulation::{QuantumBackend, SimulationMode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Widest classical register the store can hold.
pub const MAX_CLASSICAL_WIDTH: usize = 64;

/// Width of an `int` declared without one.
pub const DEFAULT_INT_WIDTH: usize = 32;

/// Declared type of a classical register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassicalKind {
    /// `bit[n]`
    Bit,
    /// `int[n]` (unsigned interpretation, wraps like `bit[n]`)
    Int,
}

/// What [`RegisterStore::allocate`] should create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterKind {
    /// A qubit register.
    Quantum,
    /// A classical register of the given type.
    Classical(ClassicalKind),
}

/// Handle to a register declared in a [`RegisterStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterHandle {
    /// Index into the quantum register table.
    Quantum(usize),
    /// Index into the classical register table.
    Classical(usize),
}

#[derive(Debug, Clone)]
struct QuantumRegister {
    name: String,
    first: QubitRef,
    size: usize,
}

#[derive(Debug, Clone)]
struct ClassicalRegister {
    name: String,
    kind: ClassicalKind,
    width: usize,
    value: u64,
}

impl ClassicalRegister {
    fn mask(&self) -> u64 {
        if self.width >= 64 { u64::MAX } else { (1u64 << self.width) - 1 }
    }
}

/// Value of one classical register at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassicalValue {
    /// Declared type.
    pub kind: ClassicalKind,
    /// Declared width in bits.
    pub width: usize,
    /// Integer interpretation, bit 0 least significant.
    pub value: u64,
}

impl ClassicalValue {
    /// Bit `index` of the value.
    pub fn bit(&self, index: usize) -> bool {
        index < self.width && (self.value >> index) & 1 == 1
    }
}

/// Classical register contents keyed by name.
pub type ClassicalSnapshot = BTreeMap<String, ClassicalValue>;

/// Owns all register state of one program run.
#[derive(Debug)]
pub struct RegisterStore {
    backend: Box<dyn QuantumBackend>,
    quantum: Vec<QuantumRegister>,
    classical: Vec<ClassicalRegister>,
    names: HashMap<String, RegisterHandle>,
}

impl RegisterStore {
    /// An empty store on top of `backend`.
    pub fn new(backend: Box<dyn QuantumBackend>) -> Self {
        Self { backend, quantum: Vec::new(), classical: Vec::new(), names: HashMap::new() }
    }

    /// Declares a register.
    ///
    /// # Errors
    /// `Redeclaration` if the name is taken, `InvalidOperation` for a zero
    /// width or a classical width above 64, and `Backend` when the quantum
    /// state cannot grow.
    pub fn allocate(&mut self, name: &str, kind: RegisterKind, width: usize) -> QinvResult<RegisterHandle> {
        if self.names.contains_key(name) {
            return Err(QinvError::Redeclaration { name: name.to_string() });
        }
        if width == 0 {
            return Err(QinvError::invalid(format!("register '{}' must have a positive width", name)));
        }
        let handle = match kind {
            RegisterKind::Quantum => {
                let first = self.backend.allocate(width)?;
                self.quantum.push(QuantumRegister { name: name.to_string(), first, size: width });
                RegisterHandle::Quantum(self.quantum.len() - 1)
            }
            RegisterKind::Classical(kind) => {
                if width > MAX_CLASSICAL_WIDTH {
                    return Err(QinvError::invalid(format!(
                        "classical register '{}' is {} bits wide, at most {} supported",
                        name, width, MAX_CLASSICAL_WIDTH
                    )));
                }
                self.classical.push(ClassicalRegister { name: name.to_string(), kind, width, value: 0 });
                RegisterHandle::Classical(self.classical.len() - 1)
            }
        };
        debug!(register = name, ?kind, width, "register declared");
        self.names.insert(name.to_string(), handle);
        Ok(handle)
    }

    /// Looks up a quantum register by name.
    pub fn quantum_handle(&self, name: &str) -> QinvResult<RegisterHandle> {
        match self.names.get(name) {
            Some(handle @ RegisterHandle::Quantum(_)) => Ok(*handle),
            _ => Err(QinvError::undefined(ReferenceKind::QuantumRegister, name)),
        }
    }

    /// Looks up a classical register by name.
    pub fn classical_handle(&self, name: &str) -> QinvResult<RegisterHandle> {
        match self.names.get(name) {
            Some(handle @ RegisterHandle::Classical(_)) => Ok(*handle),
            _ => Err(QinvError::undefined(ReferenceKind::ClassicalRegister, name)),
        }
    }

    /// Width of any register.
    pub fn width(&self, handle: RegisterHandle) -> QinvResult<usize> {
        match handle {
            RegisterHandle::Quantum(_) => Ok(self.quantum_register(handle)?.size),
            RegisterHandle::Classical(_) => Ok(self.classical_register(handle)?.width),
        }
    }

    /// Opaque reference to qubit `index` of a quantum register.
    pub fn qubit(&self, handle: RegisterHandle, index: usize) -> QinvResult<QubitRef> {
        let reg = self.quantum_register(handle)?;
        if index >= reg.size {
            return Err(QinvError::IndexOutOfRange { register: reg.name.clone(), index, width: reg.size });
        }
        Ok(QubitRef(reg.first.index() + index))
    }

    /// All qubits of a quantum register, in index order.
    pub fn qubits(&self, handle: RegisterHandle) -> QinvResult<Vec<QubitRef>> {
        let reg = self.quantum_register(handle)?;
        Ok((0..reg.size).map(|i| QubitRef(reg.first.index() + i)).collect())
    }

    /// Reads bit `index` of a classical register.
    pub fn read_bit(&self, handle: RegisterHandle, index: usize) -> QinvResult<bool> {
        let reg = self.classical_register(handle)?;
        if index >= reg.width {
            return Err(QinvError::IndexOutOfRange { register: reg.name.clone(), index, width: reg.width });
        }
        Ok((reg.value >> index) & 1 == 1)
    }

    /// Writes bit `index` of a classical register.
    pub fn write_bit(&mut self, handle: RegisterHandle, index: usize, value: bool) -> QinvResult<()> {
        let reg = self.classical_register_mut(handle)?;
        if index >= reg.width {
            return Err(QinvError::IndexOutOfRange { register: reg.name.clone(), index, width: reg.width });
        }
        if value {
            reg.value |= 1u64 << index;
        } else {
            reg.value &= !(1u64 << index);
        }
        Ok(())
    }

    /// Integer interpretation of a classical register.
    pub fn read_value(&self, handle: RegisterHandle) -> QinvResult<u64> {
        Ok(self.classical_register(handle)?.value)
    }

    /// Stores `value` modulo `2^width`.
    pub fn write_value(&mut self, handle: RegisterHandle, value: u64) -> QinvResult<()> {
        let reg = self.classical_register_mut(handle)?;
        reg.value = value & reg.mask();
        Ok(())
    }

    /// Applies one resolved operation to the quantum state.
    pub fn apply(&mut self, op: &Operation) -> QinvResult<()> {
        self.backend.apply(op)
    }

    /// Applies an expanded gate application as one unit.
    pub fn apply_all(&mut self, ops: &[Operation]) -> QinvResult<()> {
        self.backend.apply_all(ops)
    }

    /// Read access to the quantum backend.
    pub fn backend(&self) -> &dyn QuantumBackend {
        self.backend.as_ref()
    }

    pub(crate) fn backend_mut(&mut self) -> &mut dyn QuantumBackend {
        self.backend.as_mut()
    }

    /// Mode of the underlying backend.
    pub fn mode(&self) -> SimulationMode {
        self.backend.mode()
    }

    /// Basis-state bits of a quantum register, if the global state is a
    /// basis state. Bit `i` of the result is qubit `i` of the register.
    pub fn quantum_basis_value(&self, name: &str) -> QinvResult<Option<u64>> {
        let handle = self.quantum_handle(name)?;
        let Some(bits) = self.backend.basis_state() else {
            return Ok(None);
        };
        let value = self
            .qubits(handle)?
            .iter()
            .enumerate()
            .fold(0u64, |acc, (i, q)| if bits[q.index()] { acc | (1u64 << i) } else { acc });
        Ok(Some(value))
    }

    /// Copies out every classical register.
    pub fn classical_snapshot(&self) -> ClassicalSnapshot {
        self.classical
            .iter()
            .map(|reg| {
                (reg.name.clone(), ClassicalValue { kind: reg.kind, width: reg.width, value: reg.value })
            })
            .collect()
    }

    fn quantum_register(&self, handle: RegisterHandle) -> QinvResult<&QuantumRegister> {
        match handle {
            RegisterHandle::Quantum(i) => self
                .quantum
                .get(i)
                .ok_or_else(|| QinvError::invalid(format!("stale quantum register handle {}", i))),
            RegisterHandle::Classical(_) => Err(QinvError::invalid("expected a quantum register handle")),
        }
    }

    fn classical_register(&self, handle: RegisterHandle) -> QinvResult<&ClassicalRegister> {
        match handle {
            RegisterHandle::Classical(i) => self
                .classical
                .get(i)
                .ok_or_else(|| QinvError::invalid(format!("stale classical register handle {}", i))),
            RegisterHandle::Quantum(_) => Err(QinvError::invalid("expected a classical register handle")),
        }
    }

    fn classical_register_mut(&mut self, handle: RegisterHandle) -> QinvResult<&mut ClassicalRegister> {
        match handle {
            RegisterHandle::Classical(i) => self
                .classical
                .get_mut(i)
                .ok_or_else(|| QinvError::invalid(format!("stale classical register handle {}", i))),
            RegisterHandle::Quantum(_) => Err(QinvError::invalid("expected a classical register handle")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::BasisStateTracker;

    fn store() -> RegisterStore {
        RegisterStore::new(Box::new(BasisStateTracker::new()))
    }

    #[test]
    fn quantum_registers_are_contiguous() -> QinvResult<()> {
        let mut store = store();
        let dir = store.allocate("dir", RegisterKind::Quantum, 1)?;
        let pos = store.allocate("pos", RegisterKind::Quantum, 2)?;
        assert_eq!(store.qubit(dir, 0)?, QubitRef(0));
        assert_eq!(store.qubits(pos)?, vec![QubitRef(1), QubitRef(2)]);
        assert_eq!(store.backend().num_qubits(), 3);
        Ok(())
    }

    #[test]
    fn bits_and_values_share_storage() -> QinvResult<()> {
        let mut store = store();
        let c = store.allocate("c", RegisterKind::Classical(ClassicalKind::Bit), 3)?;
        store.write_bit(c, 0, true)?;
        store.write_bit(c, 2, true)?;
        assert_eq!(store.read_value(c)?, 0b101);
        store.write_bit(c, 0, false)?;
        assert!(!store.read_bit(c, 0)?);
        assert_eq!(store.read_value(c)?, 0b100);
        Ok(())
    }

    #[test]
    fn values_wrap_modulo_width() -> QinvResult<()> {
        let mut store = store();
        let c = store.allocate("c", RegisterKind::Classical(ClassicalKind::Bit), 2)?;
        store.write_value(c, 7)?;
        assert_eq!(store.read_value(c)?, 3);
        store.write_value(c, 4)?;
        assert_eq!(store.read_value(c)?, 0);

        let wide = store.allocate("w", RegisterKind::Classical(ClassicalKind::Int), 64)?;
        store.write_value(wide, u64::MAX)?;
        assert_eq!(store.read_value(wide)?, u64::MAX);
        Ok(())
    }

    #[test]
    fn lookup_errors() -> QinvResult<()> {
        let mut store = store();
        let q = store.allocate("q", RegisterKind::Quantum, 1)?;
        store.allocate("c", RegisterKind::Classical(ClassicalKind::Bit), 1)?;

        assert_eq!(
            store.classical_handle("q").unwrap_err(),
            QinvError::UndefinedReference { kind: ReferenceKind::ClassicalRegister, name: "q".into() }
        );
        assert!(matches!(store.quantum_handle("nope"), Err(QinvError::UndefinedReference { .. })));
        assert!(matches!(store.qubit(q, 1), Err(QinvError::IndexOutOfRange { index: 1, width: 1, .. })));
        assert!(matches!(
            store.allocate("c", RegisterKind::Quantum, 1),
            Err(QinvError::Redeclaration { .. })
        ));
        assert!(matches!(
            store.allocate("z", RegisterKind::Classical(ClassicalKind::Bit), 0),
            Err(QinvError::InvalidOperation { .. })
        ));
        assert!(matches!(
            store.allocate("big", RegisterKind::Classical(ClassicalKind::Int), 65),
            Err(QinvError::InvalidOperation { .. })
        ));
        Ok(())
    }

    #[test]
    fn snapshot_is_sorted_by_name() -> QinvResult<()> {
        let mut store = store();
        let b = store.allocate("b", RegisterKind::Classical(ClassicalKind::Bit), 1)?;
        store.allocate("a", RegisterKind::Classical(ClassicalKind::Int), 32)?;
        store.write_bit(b, 0, true)?;
        let names: Vec<_> = store.classical_snapshot().keys().cloned().collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
        assert!(store.classical_snapshot()["b"].bit(0));
        Ok(())
    }
}

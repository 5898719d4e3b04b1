// src/core/mod.rs

//! Core data structures and types

pub mod error;
pub mod qubit;
pub mod state;

// Re-export public types for convenient access via `qinv::core::TypeName`
pub use error::{QinvError, QinvResult, ReferenceKind};
pub use qubit::QubitRef;
pub use state::QuantumState;

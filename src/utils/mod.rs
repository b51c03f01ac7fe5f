//! Utility modules

pub mod memory_ledger;
pub mod memory_sequence;
pub mod memory_storage;
pub mod validation;

pub use memory_ledger::*;
pub use memory_sequence::*;
pub use memory_storage::*;
pub use validation::*;

//! Batch module containing grouping, membership management and status derivation

pub mod grouping;
pub mod manager;
pub mod service;
pub mod settlement;
pub mod state;

pub use manager::*;
pub use service::*;

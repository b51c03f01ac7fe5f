//! # Batch Payment Core
//!
//! Groups posted vendor and customer payments into batch payments, keeps
//! batch membership consistent and derives each batch's status from its
//! member payments.
//!
//! ## Features
//!
//! - **Grouping**: one batch per (bank journal, payment method, currency) of a selection
//! - **Membership validation**: members always share currency, direction, journal and method
//! - **Status derivation**: aggregated from members, or driven by a settlement entry
//! - **Numbering**: per-direction references from a pluggable numbering service
//! - **Storage abstraction**: database-agnostic design with trait-based storage
//!
//! ## Quick Start
//!
//! ```rust
//! use batch_payment_core::utils::{MemorySequence, MemoryStorage};
//! use batch_payment_core::{BatchConfig, BatchPayments};
//!
//! let storage = MemoryStorage::new();
//! let service = BatchPayments::new(
//!     storage,
//!     Box::new(MemorySequence::new()),
//!     "my_company".to_string(),
//!     BatchConfig::default(),
//! );
//! // service.create_from_selection(&payment_ids).await?;
//! # let _ = service;
//! ```

pub mod batch;
pub mod config;
pub mod reconciliation;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use batch::*;
pub use config::*;
pub use traits::*;
pub use types::*;

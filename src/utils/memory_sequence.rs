//! In-memory numbering service

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::traits::SequenceGenerator;
use crate::types::*;
use crate::utils::memory_storage::poisoned;

#[derive(Debug, Clone)]
struct Sequence {
    prefix: String,
    padding: usize,
    next: u64,
}

/// Per-code counters, shared between clones
#[derive(Debug, Clone)]
pub struct MemorySequence {
    sequences: Arc<Mutex<HashMap<String, Sequence>>>,
}

impl MemorySequence {
    /// Create a numbering service with no registered codes
    pub fn empty() -> Self {
        Self {
            sequences: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Create a numbering service for the default batch sequence codes
    pub fn new() -> Self {
        let defaults = [
            ("batch.payment.out", "BATCH/OUT/"),
            ("batch.payment.in", "BATCH/IN/"),
        ];
        let sequences = defaults
            .into_iter()
            .map(|(code, prefix)| {
                (
                    code.to_string(),
                    Sequence {
                        prefix: prefix.to_string(),
                        padding: 4,
                        next: 1,
                    },
                )
            })
            .collect();
        Self {
            sequences: Arc::new(Mutex::new(sequences)),
        }
    }

    /// Register a code; an existing counter for the code is kept
    pub fn register(&self, code: &str, prefix: &str, padding: usize) -> BatchResult<()> {
        self.sequences
            .lock()
            .map_err(poisoned)?
            .entry(code.to_string())
            .or_insert(Sequence {
                prefix: prefix.to_string(),
                padding,
                next: 1,
            });
        Ok(())
    }
}

impl Default for MemorySequence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SequenceGenerator for MemorySequence {
    async fn next_by_code(&self, code: &str) -> BatchResult<Option<String>> {
        let mut sequences = self.sequences.lock().map_err(poisoned)?;
        Ok(sequences.get_mut(code).map(|sequence| {
            let value = format!(
                "{}{:0width$}",
                sequence.prefix,
                sequence.next,
                width = sequence.padding
            );
            sequence.next += 1;
            value
        }))
    }
}

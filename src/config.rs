//! Runtime configuration for the batch payment core

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::types::{BatchError, BatchResult, BatchType};

/// How a batch's status is derived
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatePolicy {
    /// Status follows the batch's settlement entry; batches are validated
    /// explicitly, which books one entry for the whole batch total
    SettlementEntry,
    /// Status is a read-only projection of member payments
    #[default]
    MemberAggregation,
}

impl StatePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatePolicy::SettlementEntry => "settlement_entry",
            StatePolicy::MemberAggregation => "member_aggregation",
        }
    }
}

impl FromStr for StatePolicy {
    type Err = BatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "settlement_entry" | "settlement" => Ok(StatePolicy::SettlementEntry),
            "member_aggregation" | "aggregation" => Ok(StatePolicy::MemberAggregation),
            other => Err(BatchError::InvalidConfig(format!(
                "unknown state policy '{}'",
                other
            ))),
        }
    }
}

/// Batch payment settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub state_policy: StatePolicy,
    /// Sequence code for vendor payment batches
    pub outbound_sequence: String,
    /// Sequence code for customer payment batches
    pub inbound_sequence: String,
    /// Reference used when the numbering service yields nothing
    pub placeholder_reference: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            state_policy: StatePolicy::default(),
            outbound_sequence: "batch.payment.out".to_string(),
            inbound_sequence: "batch.payment.in".to_string(),
            placeholder_reference: "New".to_string(),
        }
    }
}

impl BatchConfig {
    /// Load settings from `BATCH_*` environment variables, falling back to defaults
    pub fn from_env() -> BatchResult<Self> {
        let defaults = Self::default();

        let state_policy = match env::var("BATCH_STATE_POLICY") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.state_policy,
        };

        let config = Self {
            state_policy,
            outbound_sequence: env::var("BATCH_OUTBOUND_SEQUENCE")
                .unwrap_or(defaults.outbound_sequence),
            inbound_sequence: env::var("BATCH_INBOUND_SEQUENCE")
                .unwrap_or(defaults.inbound_sequence),
            placeholder_reference: env::var("BATCH_PLACEHOLDER_REF")
                .unwrap_or(defaults.placeholder_reference),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_policy(mut self, state_policy: StatePolicy) -> Self {
        self.state_policy = state_policy;
        self
    }

    pub fn validate(&self) -> BatchResult<()> {
        if self.outbound_sequence.trim().is_empty() || self.inbound_sequence.trim().is_empty() {
            return Err(BatchError::InvalidConfig(
                "sequence codes cannot be empty".to_string(),
            ));
        }
        if self.outbound_sequence == self.inbound_sequence {
            return Err(BatchError::InvalidConfig(
                "outbound and inbound batches need distinct sequence codes".to_string(),
            ));
        }
        if self.placeholder_reference.trim().is_empty() {
            return Err(BatchError::InvalidConfig(
                "placeholder reference cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Sequence code batches of the given type are numbered from
    pub fn sequence_code(&self, batch_type: BatchType) -> &str {
        match batch_type {
            BatchType::Outbound => &self.outbound_sequence,
            BatchType::Inbound => &self.inbound_sequence,
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::StoreError;

/// Auto-top-up policy for one application on one network.
///
/// Amounts are in upokt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopUpPolicy {
    pub enabled: bool,
    pub trigger_threshold: i64,
    pub target_amount: i64,
}

impl TopUpPolicy {
    /// `target_amount > trigger_threshold > 0`
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.trigger_threshold <= 0 || self.target_amount <= 0 {
            return Err(StoreError::InvalidPolicy(
                "trigger threshold and target amount must be positive".to_string(),
            ));
        }
        if self.target_amount <= self.trigger_threshold {
            return Err(StoreError::InvalidPolicy(
                "target amount must be greater than trigger threshold".to_string(),
            ));
        }
        Ok(())
    }
}

/// address -> policy
pub type PolicyMap = BTreeMap<String, TopUpPolicy>;

/// network -> address -> policy
pub type StoreData = BTreeMap<String, PolicyMap>;

/// Furthest phase an account reached in a top-up attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopUpPhase {
    Check,
    Fund,
    Upstake,
    Complete,
}

/// Outcome of processing one account in one cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopUpEvent {
    pub timestamp: DateTime<Utc>,
    pub network: String,
    pub address: String,
    pub phase: TopUpPhase,
    pub previous_stake: i64,
    pub target_amount: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fund_tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stake_tx_hash: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TopUpEvent {
    pub fn start(network: &str, address: &str, policy: &TopUpPolicy) -> Self {
        Self {
            timestamp: Utc::now(),
            network: network.to_string(),
            address: address.to_string(),
            phase: TopUpPhase::Check,
            previous_stake: 0,
            target_amount: policy.target_amount,
            fund_tx_hash: None,
            stake_tx_hash: None,
            success: false,
            error: None,
        }
    }

    pub fn fail(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }

    pub fn complete(mut self, stake_tx_hash: Option<String>) -> Self {
        self.phase = TopUpPhase::Complete;
        self.stake_tx_hash = stake_tx_hash;
        self.success = true;
        self.error = None;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(trigger_threshold: i64, target_amount: i64) -> TopUpPolicy {
        TopUpPolicy {
            enabled: true,
            trigger_threshold,
            target_amount,
        }
    }

    #[test]
    fn test_policy_validation() {
        assert!(policy(1_000_000, 5_000_000).validate().is_ok());
        assert!(policy(1, 2).validate().is_ok());

        assert!(policy(0, 5_000_000).validate().is_err());
        assert!(policy(-1, 5_000_000).validate().is_err());
        assert!(policy(1_000_000, 1_000_000).validate().is_err());
        assert!(policy(5_000_000, 1_000_000).validate().is_err());
        assert!(policy(1_000_000, -5).validate().is_err());
    }

    #[test]
    fn test_event_serializes_lowercase_phase() {
        let event = TopUpEvent::start("pocket", "pokt1abc", &policy(1, 2)).complete(Some("ABC".into()));
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["phase"], "complete");
        assert_eq!(json["stake_tx_hash"], "ABC");
        assert!(json.get("error").is_none());
        assert!(json.get("fund_tx_hash").is_none());
    }
}

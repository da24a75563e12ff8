use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::autotopup::TopUpPolicy;
use crate::config::Thresholds;

pub const DEFAULT_NETWORK: &str = "pocket";

// ========== REQUEST MODELS ==========

/// `?network=<name>&refresh=true`, shared by most routes
#[derive(Debug, Default, Deserialize, Validate)]
pub struct NetworkQuery {
    #[validate(length(min = 1, max = 64, message = "network name must be 1-64 characters"))]
    pub network: Option<String>,
    /// Bypass the read cache
    #[serde(default)]
    pub refresh: bool,
}

impl NetworkQuery {
    pub fn network(&self) -> &str {
        self.network.as_deref().unwrap_or(DEFAULT_NETWORK)
    }
}

/// Manual fund or upstake, amount in POKT
#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: Decimal,
}

/// Stake a new application, amount in POKT
#[derive(Debug, Deserialize)]
pub struct NewStakeRequest {
    pub address: String,
    pub service_id: String,
    pub amount: Decimal,
}

/// Auto-top-up policy as the UI sends it, amounts in POKT
#[derive(Debug, Deserialize)]
pub struct PolicyRequest {
    pub enabled: bool,
    pub trigger_threshold: Decimal,
    pub target_amount: Decimal,
}

// ========== RESPONSE MODELS ==========

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub pocketd: String,
    pub networks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub thresholds: Thresholds,
}

/// Stored policy with the amounts in upokt
#[derive(Debug, Serialize)]
pub struct PolicyResponse {
    pub network: String,
    pub address: String,
    #[serde(flatten)]
    pub policy: TopUpPolicy,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn new(status: &str) -> Self {
        Self {
            status: status.to_string(),
        }
    }
}

use serde::{Deserialize, Serialize};

pub const DENOM: &str = "upokt";

/// A staked application as seen by the REST API, amounts in upokt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub address: String,
    pub service_id: String,
    pub stake: i64,
    pub liquid_balance: i64,
    pub gateway: String,
    pub network: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankAccount {
    pub address: String,
    pub balance: i64,
    pub network: String,
}

/// Result of a submitted write transaction.
///
/// `success == false` is a rejected transaction, distinct from a transport
/// error; callers treat both as failures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TxOutcome {
    pub fn submitted(tx_hash: Option<String>) -> Self {
        let message = tx_hash
            .is_none()
            .then(|| "Transaction submitted".to_string());
        Self {
            success: true,
            tx_hash,
            message,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            tx_hash: None,
            message: Some(message.into()),
        }
    }
}

// ========== REST PAYLOADS ==========

#[derive(Debug, Clone, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: String,
}

#[derive(Debug, Deserialize)]
pub struct BalanceResponse {
    #[serde(default)]
    pub balances: Vec<Coin>,
}

#[derive(Debug, Deserialize)]
pub struct ApplicationResponse {
    pub application: ApplicationPayload,
}

#[derive(Debug, Deserialize)]
pub struct ApplicationPayload {
    pub stake: Option<Coin>,
    #[serde(default)]
    pub service_configs: Vec<ServiceConfig>,
    #[serde(default)]
    pub delegatee_gateway_addresses: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub service_id: String,
    pub service: Option<Service>,
}

/// A registered service; also nested inside application service configs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ServicesResponse {
    #[serde(default)]
    pub service: Vec<Service>,
}

impl ServiceConfig {
    /// Nested `service.id` wins over the flat `service_id`
    pub fn id(&self) -> &str {
        self.service
            .as_ref()
            .map(|s| s.id.as_str())
            .unwrap_or(&self.service_id)
    }
}

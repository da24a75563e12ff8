use async_trait::async_trait;

use super::models::{Application, BankAccount, Service, TxOutcome};
use crate::config::NetworkConfig;
use crate::error::ChainResult;

/// Which network a call targets: its chain id plus connection settings
#[derive(Debug, Clone, Copy)]
pub struct NetworkRef<'a> {
    pub name: &'a str,
    pub config: &'a NetworkConfig,
}

impl<'a> NetworkRef<'a> {
    pub fn new(name: &'a str, config: &'a NetworkConfig) -> Self {
        Self { name, config }
    }
}

/// Read-only on-chain queries
#[async_trait]
pub trait AccountQuery: Send + Sync {
    /// Current stake and liquid balance of an application
    async fn application(&self, network: NetworkRef<'_>, address: &str) -> ChainResult<Application>;

    /// Liquid upokt balance of any account
    async fn balance(&self, network: NetworkRef<'_>, address: &str) -> ChainResult<i64>;

    /// Every service registered on the network
    async fn services(&self, network: NetworkRef<'_>) -> ChainResult<Vec<Service>>;

    async fn bank_account(&self, network: NetworkRef<'_>, address: &str) -> ChainResult<BankAccount> {
        let balance = self.balance(network, address).await?;
        Ok(BankAccount {
            address: address.to_string(),
            balance,
            network: network.name.to_string(),
        })
    }
}

/// Signed write transactions.
///
/// A transport failure is `Err`; a transaction the chain or CLI refused is
/// `Ok(TxOutcome { success: false, .. })`.
#[async_trait]
pub trait TxExecutor: Send + Sync {
    /// Send `amount` upokt from the network's bank account to `to`
    async fn fund(&self, network: NetworkRef<'_>, to: &str, amount: i64) -> ChainResult<TxOutcome>;

    /// Increase the application's stake by `amount` upokt
    async fn upstake(&self, network: NetworkRef<'_>, address: &str, amount: i64) -> ChainResult<TxOutcome>;

    /// Stake a not-yet-staked application for `service_id` with `amount` upokt
    async fn stake_new(
        &self,
        network: NetworkRef<'_>,
        address: &str,
        service_id: &str,
        amount: i64,
    ) -> ChainResult<TxOutcome>;

    async fn is_available(&self) -> bool {
        true
    }
}

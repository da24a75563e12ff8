use async_trait::async_trait;
use reqwest::{redirect, Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use super::models::{
    Application, ApplicationResponse, BalanceResponse, Service, ServicesResponse, DENOM,
};
use super::traits::{AccountQuery, NetworkRef};
use crate::error::{ChainError, ChainResult};

/// Largest API response body accepted (1 MiB)
const MAX_RESPONSE_BODY: usize = 1 << 20;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_REDIRECTS: usize = 3;

/// Read-only client for the network's REST API
#[derive(Clone)]
pub struct PocketClient {
    http: Client,
}

impl PocketClient {
    pub fn new() -> ChainResult<Self> {
        // Same-host redirects only
        let policy = redirect::Policy::custom(|attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                return attempt.error("too many redirects");
            }
            let same_host = attempt
                .previous()
                .first()
                .map(|first| first.host_str() == attempt.url().host_str())
                .unwrap_or(true);
            if same_host {
                attempt.follow()
            } else {
                let host = attempt.url().host_str().unwrap_or_default().to_string();
                attempt.error(format!("redirect to different host blocked: {}", host))
            }
        });

        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .redirect(policy)
            .build()?;

        Ok(Self { http })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> ChainResult<(StatusCode, Option<T>)> {
        debug!("GET {}", url);
        let response = self.http.get(url).send().await?;
        let status = response.status();

        if let Some(len) = response.content_length() {
            if len as usize > MAX_RESPONSE_BODY {
                return Err(ChainError::Parse(format!(
                    "response body too large: {} bytes",
                    len
                )));
            }
        }

        let body = response.bytes().await?;
        if body.len() > MAX_RESPONSE_BODY {
            return Err(ChainError::Parse(format!(
                "response body too large: {} bytes",
                body.len()
            )));
        }

        if status == StatusCode::NOT_FOUND {
            return Ok((status, None));
        }
        if !status.is_success() {
            return Err(ChainError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let parsed = serde_json::from_slice(&body).map_err(|e| ChainError::Parse(e.to_string()))?;
        Ok((status, Some(parsed)))
    }
}

#[async_trait]
impl AccountQuery for PocketClient {
    async fn balance(&self, network: NetworkRef<'_>, address: &str) -> ChainResult<i64> {
        let url = format!(
            "{}/cosmos/bank/v1beta1/balances/{}",
            network.config.api_endpoint, address
        );

        let (status, body) = self.get_json::<BalanceResponse>(&url).await?;
        let body = body.ok_or_else(|| ChainError::Status {
            status: status.as_u16(),
            body: format!("balance not found for {}", address),
        })?;

        parse_upokt_balance(&body)
    }

    async fn application(&self, network: NetworkRef<'_>, address: &str) -> ChainResult<Application> {
        let url = format!(
            "{}/pokt-network/poktroll/application/application/{}",
            network.config.api_endpoint, address
        );

        let (_, body) = self.get_json::<ApplicationResponse>(&url).await?;
        let payload = body
            .ok_or_else(|| ChainError::NotFound(address.to_string()))?
            .application;

        let mut app = Application {
            address: address.to_string(),
            network: network.name.to_string(),
            ..Default::default()
        };

        if let Some(stake) = payload.stake {
            match stake.amount.parse::<i64>() {
                Ok(amount) => app.stake = amount,
                Err(e) => warn!("⚠️ Failed to parse stake amount for {}: {}", address, e),
            }
        }

        if let Some(service) = payload.service_configs.first() {
            app.service_id = service.id().to_string();
        }

        if let Some(gateway) = payload.delegatee_gateway_addresses.first() {
            app.gateway = gateway.clone();
        }

        // Balance failure leaves liquid_balance at 0
        match self.balance(network, address).await {
            Ok(balance) => app.liquid_balance = balance,
            Err(e) => warn!("⚠️ Failed to query balance for {}: {}", address, e),
        }

        Ok(app)
    }

    async fn services(&self, network: NetworkRef<'_>) -> ChainResult<Vec<Service>> {
        let url = format!(
            "{}/pokt-network/poktroll/service/all_services",
            network.config.api_endpoint
        );

        let (status, body) = self.get_json::<ServicesResponse>(&url).await?;
        let body = body.ok_or_else(|| ChainError::Status {
            status: status.as_u16(),
            body: "service list not found".to_string(),
        })?;

        Ok(body.service)
    }
}

fn parse_upokt_balance(response: &BalanceResponse) -> ChainResult<i64> {
    response
        .balances
        .iter()
        .find(|coin| coin.denom == DENOM)
        .map(|coin| {
            coin.amount
                .parse::<i64>()
                .map_err(|e| ChainError::Parse(format!("failed to parse balance amount: {}", e)))
        })
        .unwrap_or(Ok(0))
}

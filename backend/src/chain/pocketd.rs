use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, error, info};

use super::models::{TxOutcome, DENOM};
use super::traits::{AccountQuery, NetworkRef, TxExecutor};
use crate::config::Config;
use crate::error::{ChainError, ChainResult};
use crate::middleware::validation::validate_service_id;

const TX_FEES: &str = "--fees=1upokt";

/// Submits write transactions by shelling out to the node CLI.
///
/// Signing happens inside the CLI against its own keyring; this type only
/// marshals arguments.
pub struct PocketdExecutor {
    binary: String,
    keyring_backend: Option<String>,
    pocketd_home: Option<String>,
    query: Arc<dyn AccountQuery>,
}

impl PocketdExecutor {
    pub fn new(config: &Config, query: Arc<dyn AccountQuery>) -> Self {
        Self {
            binary: config.pocketd_binary.clone(),
            keyring_backend: config.keyring_backend.clone(),
            pocketd_home: config.pocketd_home.clone(),
            query,
        }
    }

    /// Run the CLI with a scrubbed environment; non-zero exit is an error
    /// carrying the combined output.
    pub async fn run(&self, args: &[String]) -> ChainResult<String> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .env_clear()
            .env("HOME", std::env::var("HOME").unwrap_or_default())
            .env("PATH", std::env::var("PATH").unwrap_or_default())
            .kill_on_drop(true);

        if let Some(home) = &self.pocketd_home {
            cmd.env("POCKETD_HOME", home);
        }
        if let Some(backend) = &self.keyring_backend {
            cmd.env("KEYRING_BACKEND", backend);
        }

        let output = cmd
            .output()
            .await
            .map_err(|e| ChainError::Command(format!("failed to start {}: {}", self.binary, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ChainError::Command(format!(
                "{} exited with {}: {}{}",
                self.binary, output.status, stdout, stderr
            )));
        }

        Ok(stdout)
    }

    fn common_tx_args(&self, network: NetworkRef<'_>) -> Vec<String> {
        let mut args = vec![
            "--node".to_string(),
            network.config.rpc_endpoint.clone(),
            "--chain-id".to_string(),
            network.name.to_string(),
            "--yes".to_string(),
            "--gas=auto".to_string(),
            TX_FEES.to_string(),
            "--output".to_string(),
            "json".to_string(),
        ];
        if let Some(backend) = &self.keyring_backend {
            args.push("--keyring-backend".to_string());
            args.push(backend.clone());
        }
        args
    }

    fn fund_args(&self, network: NetworkRef<'_>, to: &str, amount: i64) -> Vec<String> {
        let mut args = vec![
            "tx".to_string(),
            "bank".to_string(),
            "send".to_string(),
            network.config.bank.clone(),
            to.to_string(),
            format!("{}{}", amount, DENOM),
        ];
        args.extend(self.common_tx_args(network));
        args
    }

    fn stake_args(&self, network: NetworkRef<'_>, address: &str, stake_config: &Path) -> Vec<String> {
        let mut args = vec![
            "tx".to_string(),
            "application".to_string(),
            "stake-application".to_string(),
            "--config".to_string(),
            stake_config.display().to_string(),
            "--from".to_string(),
            address.to_string(),
        ];
        args.extend(self.common_tx_args(network));
        args
    }

    async fn submit(&self, kind: &str, args: &[String]) -> TxOutcome {
        debug!("{} command: {:?}", kind, args);

        match self.run(args).await {
            Ok(output) => {
                info!("✓ {} transaction submitted", kind);
                outcome_from_output(&output)
            }
            Err(e) => {
                error!("❌ {} command failed: {}", kind, e);
                TxOutcome::rejected(format!("{} transaction failed", kind))
            }
        }
    }
}

#[async_trait]
impl TxExecutor for PocketdExecutor {
    async fn fund(&self, network: NetworkRef<'_>, to: &str, amount: i64) -> ChainResult<TxOutcome> {
        if amount <= 0 {
            return Err(ChainError::InvalidInput("fund amount must be positive".to_string()));
        }
        if network.config.bank.is_empty() {
            return Err(ChainError::InvalidInput(format!(
                "no bank account configured for network {}",
                network.name
            )));
        }

        info!("💸 Funding {} with {}{}", to, amount, DENOM);
        let args = self.fund_args(network, to, amount);
        Ok(self.submit("fund", &args).await)
    }

    async fn upstake(&self, network: NetworkRef<'_>, address: &str, amount: i64) -> ChainResult<TxOutcome> {
        if amount <= 0 {
            return Err(ChainError::InvalidInput("stake addition must be positive".to_string()));
        }

        let app = self.query.application(network, address).await?;
        if app.service_id.is_empty() {
            return Err(ChainError::InvalidInput(
                "application has no service ID configured".to_string(),
            ));
        }
        validate_service_id(&app.service_id)
            .map_err(|e| ChainError::InvalidInput(format!("unsafe service ID from API: {}", e)))?;

        let new_stake = app.stake.checked_add(amount).ok_or_else(|| {
            ChainError::InvalidInput(format!(
                "stake overflow: {} + {} exceeds maximum",
                app.stake, amount
            ))
        })?;

        info!(
            "📈 Upstaking {}: {} + {} = {}{}",
            address, app.stake, amount, new_stake, DENOM
        );

        // Removed when dropped, after the command has read it.
        let stake_config = write_stake_config(new_stake, &app.service_id)?;
        let args = self.stake_args(network, address, stake_config.path());
        Ok(self.submit("upstake", &args).await)
    }

    async fn stake_new(
        &self,
        network: NetworkRef<'_>,
        address: &str,
        service_id: &str,
        amount: i64,
    ) -> ChainResult<TxOutcome> {
        if amount <= 0 {
            return Err(ChainError::InvalidInput("stake amount must be positive".to_string()));
        }
        validate_service_id(service_id).map_err(|e| ChainError::InvalidInput(e.to_string()))?;

        info!(
            "🆕 Staking new application {} for service {} with {}{}",
            address, service_id, amount, DENOM
        );

        let stake_config = write_stake_config(amount, service_id)?;
        let args = self.stake_args(network, address, stake_config.path());
        Ok(self.submit("stake", &args).await)
    }

    async fn is_available(&self) -> bool {
        find_binary(&self.binary).is_some()
    }
}

fn write_stake_config(stake: i64, service_id: &str) -> ChainResult<tempfile::NamedTempFile> {
    let io = |e: std::io::Error| ChainError::Command(format!("failed to write stake config: {}", e));

    // tempfile creates the file with 0600 permissions
    let mut file = tempfile::Builder::new()
        .prefix("pocketd-stake-")
        .suffix(".yaml")
        .tempfile()
        .map_err(io)?;
    write!(
        file,
        "stake_amount: {}{}\nservice_ids:\n  - {}\n",
        stake, DENOM, service_id
    )
    .map_err(io)?;
    file.flush().map_err(io)?;

    Ok(file)
}

/// Extract the tx hash from `--output json`; a non-zero `code` means the
/// node refused the transaction even though the CLI exited cleanly.
fn outcome_from_output(output: &str) -> TxOutcome {
    let Ok(json) = serde_json::from_str::<serde_json::Value>(output.trim()) else {
        return TxOutcome::submitted(None);
    };

    let tx_hash = json
        .get("txhash")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    match json.get("code").and_then(|v| v.as_u64()) {
        Some(code) if code != 0 => {
            let raw_log = json.get("raw_log").and_then(|v| v.as_str()).unwrap_or_default();
            TxOutcome {
                success: false,
                tx_hash,
                message: Some(format!("transaction rejected with code {}: {}", code, raw_log)),
            }
        }
        _ => TxOutcome::submitted(tx_hash),
    }
}

fn find_binary(binary: &str) -> Option<PathBuf> {
    let candidate = Path::new(binary);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(binary))
        .find(|full| full.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::models::Application;
    use crate::config::NetworkConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const APP: &str = "pokt1aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const BANK: &str = "pokt1bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    struct FixedQuery {
        stake: i64,
        service_id: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AccountQuery for FixedQuery {
        async fn application(&self, network: NetworkRef<'_>, address: &str) -> ChainResult<Application> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Application {
                address: address.to_string(),
                service_id: self.service_id.to_string(),
                stake: self.stake,
                network: network.name.to_string(),
                ..Default::default()
            })
        }

        async fn balance(&self, _network: NetworkRef<'_>, _address: &str) -> ChainResult<i64> {
            Ok(0)
        }

        async fn services(&self, _network: NetworkRef<'_>) -> ChainResult<Vec<crate::chain::Service>> {
            Ok(vec![])
        }
    }

    fn network_config() -> NetworkConfig {
        NetworkConfig {
            rpc_endpoint: "https://rpc.example.com".to_string(),
            api_endpoint: "https://api.example.com".to_string(),
            bank: BANK.to_string(),
            ..Default::default()
        }
    }

    fn executor(stake: i64, service_id: &'static str) -> PocketdExecutor {
        PocketdExecutor {
            binary: "pocketd".to_string(),
            keyring_backend: Some("test".to_string()),
            pocketd_home: None,
            query: Arc::new(FixedQuery {
                stake,
                service_id,
                calls: AtomicUsize::new(0),
            }),
        }
    }

    #[test]
    fn test_outcome_from_output() {
        let ok = outcome_from_output(r#"{"height":"0","txhash":"ABCDEF","code":0}"#);
        assert!(ok.success);
        assert_eq!(ok.tx_hash.as_deref(), Some("ABCDEF"));

        let rejected = outcome_from_output(r#"{"txhash":"ABCDEF","code":5,"raw_log":"insufficient funds"}"#);
        assert!(!rejected.success);
        assert!(rejected.message.unwrap().contains("insufficient funds"));

        let plain = outcome_from_output("gas estimate: 1234\n");
        assert!(plain.success);
        assert_eq!(plain.tx_hash, None);
    }

    #[test]
    fn test_fund_args() {
        let cfg = network_config();
        let exec = executor(0, "anvil");

        let args = exec.fund_args(NetworkRef::new("pocket", &cfg), APP, 4_500_000);

        assert_eq!(&args[..6], ["tx", "bank", "send", BANK, APP, "4500000upokt"]);
        assert!(args.windows(2).any(|w| w == ["--chain-id", "pocket"]));
        assert!(args.windows(2).any(|w| w == ["--keyring-backend", "test"]));
        assert!(args.contains(&"--yes".to_string()));
    }

    #[test]
    fn test_stake_config_contents() {
        let file = write_stake_config(5_000_000, "anvil").unwrap();
        let contents = std::fs::read_to_string(file.path()).unwrap();

        assert_eq!(contents, "stake_amount: 5000000upokt\nservice_ids:\n  - anvil\n");
    }

    #[tokio::test]
    async fn test_upstake_rejects_unsafe_service_id() {
        let cfg = network_config();
        let exec = executor(1_000, "anvil\nstake_amount: 1upokt");

        let result = exec.upstake(NetworkRef::new("pocket", &cfg), APP, 10).await;
        assert!(matches!(result, Err(ChainError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_upstake_rejects_overflow() {
        let cfg = network_config();
        let exec = executor(i64::MAX - 5, "anvil");

        let result = exec.upstake(NetworkRef::new("pocket", &cfg), APP, 10).await;
        assert!(matches!(result, Err(ChainError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_stake_new_validates_before_running() {
        let cfg = network_config();
        let mut exec = executor(0, "anvil");
        exec.binary = "/nonexistent/pocketd".to_string();
        let network = NetworkRef::new("pocket", &cfg);

        let unsafe_id = exec.stake_new(network, APP, "anvil\nstake_amount: 1upokt", 10).await;
        assert!(matches!(unsafe_id, Err(ChainError::InvalidInput(_))));

        let zero = exec.stake_new(network, APP, "anvil", 0).await;
        assert!(matches!(zero, Err(ChainError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_fund_without_bank_is_error() {
        let cfg = NetworkConfig {
            bank: String::new(),
            ..network_config()
        };
        let exec = executor(0, "anvil");

        let result = exec.fund(NetworkRef::new("pocket", &cfg), APP, 10).await;
        assert!(matches!(result, Err(ChainError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_missing_binary_is_rejected_not_error() {
        let cfg = network_config();
        let mut exec = executor(0, "anvil");
        exec.binary = "/nonexistent/pocketd".to_string();

        assert!(!exec.is_available().await);
        let outcome = exec
            .fund(NetworkRef::new("pocket", &cfg), APP, 10)
            .await
            .unwrap();
        assert!(!outcome.success);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_cli_and_parses_hash() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("pocketd");
        std::fs::write(
            &script,
            "#!/bin/sh\necho '{\"txhash\":\"F00D\",\"code\":0}'\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let cfg = network_config();
        let mut exec = executor(1_000_000, "anvil");
        exec.binary = script.display().to_string();

        assert!(exec.is_available().await);
        let outcome = exec
            .upstake(NetworkRef::new("pocket", &cfg), APP, 4_000_000)
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.tx_hash.as_deref(), Some("F00D"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stake_new_writes_config_and_args() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("pocketd");
        let args_out = dir.path().join("args");
        let config_out = dir.path().join("stake.yaml");
        // $5 is the path following --config
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\necho \"$@\" > {}\ncat \"$5\" > {}\necho '{{\"txhash\":\"BEEF\",\"code\":0}}'\n",
                args_out.display(),
                config_out.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let cfg = network_config();
        let mut exec = executor(0, "unused");
        exec.binary = script.display().to_string();

        let outcome = exec
            .stake_new(NetworkRef::new("pocket", &cfg), APP, "anvil", 2_000_000)
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.tx_hash.as_deref(), Some("BEEF"));

        let args = std::fs::read_to_string(&args_out).unwrap();
        assert!(args.starts_with("tx application stake-application --config "));
        assert!(args.contains(&format!("--from {}", APP)));
        assert!(args.contains("--chain-id pocket"));
        assert_eq!(
            std::fs::read_to_string(&config_out).unwrap(),
            "stake_amount: 2000000upokt\nservice_ids:\n  - anvil\n"
        );
    }
}

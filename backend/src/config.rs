use config::{File, FileFormat};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::autotopup::events::DEFAULT_EVENT_CAPACITY;
use crate::autotopup::poll::PollPolicy;
use crate::error::{AppError, AppResult};
use crate::middleware::validation::validate_address;

pub const ALLOWED_KEYRING_BACKENDS: [&str; 5] = ["test", "file", "os", "kwallet", "pass"];

/// Per-network connection and address settings
#[derive(Debug, Deserialize, Clone, Default)]
pub struct NetworkConfig {
    pub rpc_endpoint: String,
    #[serde(default)]
    pub api_endpoint: String,
    #[serde(default)]
    pub gateways: Vec<String>,
    #[serde(default)]
    pub bank: String,
    #[serde(default)]
    pub applications: Vec<String>,
}

/// Warning/danger stake levels in upokt, surfaced to the UI only
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct Thresholds {
    #[serde(default)]
    pub warning_threshold: i64,
    #[serde(default)]
    pub danger_threshold: i64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AutoTopUpSettings {
    pub store_path: String,
    pub interval_secs: u64,
    pub poll_interval_secs: u64,
    pub poll_max_attempts: u32,
    pub call_timeout_secs: u64,
    pub event_capacity: usize,
}

impl Default for AutoTopUpSettings {
    fn default() -> Self {
        Self {
            store_path: "autotopup.json".to_string(),
            interval_secs: 300,
            poll_interval_secs: 10,
            poll_max_attempts: 6,
            call_timeout_secs: 120,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl AutoTopUpSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.poll_interval_secs),
            max_attempts: self.poll_max_attempts,
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default, rename = "keyring-backend")]
    pub keyring_backend: Option<String>,
    #[serde(default, rename = "pocketd-home")]
    pub pocketd_home: Option<String>,
    #[serde(default = "default_pocketd_binary", rename = "pocketd-binary")]
    pub pocketd_binary: String,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,
    #[serde(default)]
    pub autotopup: AutoTopUpSettings,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

/// The document nests everything under a top-level `config:` key
#[derive(Debug, Deserialize)]
struct ConfigFile {
    config: Config,
}

fn default_pocketd_binary() -> String {
    "pocketd".to_string()
}

fn default_cache_ttl_secs() -> u64 {
    60
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let raw = config::Config::builder()
            .add_source(File::from(path).format(FileFormat::Yaml))
            .build()?;

        Self::from_source(raw)
    }

    pub fn from_yaml(yaml: &str) -> AppResult<Self> {
        let raw = config::Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?;

        Self::from_source(raw)
    }

    fn from_source(raw: config::Config) -> AppResult<Self> {
        let mut cfg = raw.try_deserialize::<ConfigFile>()?.config;

        for network in cfg.networks.values_mut() {
            if network.api_endpoint.is_empty() {
                network.api_endpoint = derive_api_endpoint(&network.rpc_endpoint);
            }
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn network(&self, name: &str) -> Option<&NetworkConfig> {
        self.networks.get(name)
    }

    pub fn network_names(&self) -> Vec<String> {
        self.networks.keys().cloned().collect()
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    fn validate(&self) -> AppResult<()> {
        if self.networks.is_empty() {
            return Err(AppError::Config(
                "at least one network must be configured".to_string(),
            ));
        }

        if let Some(backend) = &self.keyring_backend {
            validate_keyring_backend(backend)?;
        }

        for (name, network) in &self.networks {
            validate_endpoint(&network.rpc_endpoint)
                .map_err(|e| AppError::Config(format!("network {:?} rpc_endpoint: {}", name, e)))?;
            validate_endpoint(&network.api_endpoint)
                .map_err(|e| AppError::Config(format!("network {:?} api_endpoint: {}", name, e)))?;

            if !network.bank.is_empty() {
                validate_address(&network.bank)
                    .map_err(|e| AppError::Config(format!("network {:?} bank: {}", name, e)))?;
            }
            for app in &network.applications {
                validate_address(app).map_err(|e| {
                    AppError::Config(format!("network {:?} application {}: {}", name, app, e))
                })?;
            }
        }

        let settings = &self.autotopup;
        for (field, value) in [
            ("interval_secs", settings.interval_secs),
            ("call_timeout_secs", settings.call_timeout_secs),
            ("poll_max_attempts", u64::from(settings.poll_max_attempts)),
        ] {
            if value == 0 {
                return Err(AppError::Config(format!("autotopup.{} must be positive", field)));
            }
        }

        Ok(())
    }
}

pub fn validate_keyring_backend(backend: &str) -> AppResult<()> {
    if ALLOWED_KEYRING_BACKENDS.contains(&backend) {
        Ok(())
    } else {
        Err(AppError::Config(format!(
            "unsupported keyring backend {:?}: must be one of {}",
            backend,
            ALLOWED_KEYRING_BACKENDS.join(", ")
        )))
    }
}

fn validate_endpoint(raw: &str) -> Result<(), String> {
    let url = reqwest::Url::parse(raw).map_err(|e| format!("invalid endpoint URL: {}", e))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(format!(
            "endpoint must use http or https scheme, got {:?}",
            url.scheme()
        ));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err("endpoint must have a host".to_string());
    }
    Ok(())
}

/// `https://shannon-rpc.example:443` -> `https://shannon-api.example`
fn derive_api_endpoint(rpc_endpoint: &str) -> String {
    rpc_endpoint
        .replacen(":443", "", 1)
        .replacen(":26657", "", 1)
        .replacen("rpc", "api", 1)
}

/// Tracked application addresses per network.
///
/// Seeded from the loaded config; newly staked applications are added at
/// runtime and, when the config came from a file, written back into it.
pub struct ApplicationRegistry {
    networks: RwLock<BTreeMap<String, Vec<String>>>,
    source: Option<PathBuf>,
}

impl ApplicationRegistry {
    pub fn new(config: &Config, source: Option<PathBuf>) -> Self {
        let networks = config
            .networks
            .iter()
            .map(|(name, network)| (name.clone(), network.applications.clone()))
            .collect();

        Self {
            networks: RwLock::new(networks),
            source,
        }
    }

    pub fn addresses(&self, network: &str) -> Vec<String> {
        self.networks.read().get(network).cloned().unwrap_or_default()
    }

    /// Start tracking `address`; duplicates and unknown networks are errors
    pub fn add(&self, network: &str, address: &str) -> AppResult<()> {
        let mut networks = self.networks.write();
        let addresses = networks
            .get_mut(network)
            .ok_or_else(|| AppError::UnknownNetwork(network.to_string()))?;

        if addresses.iter().any(|existing| existing == address) {
            return Err(AppError::InvalidInput(format!(
                "address {} already tracked on {}",
                address, network
            )));
        }

        addresses.push(address.to_string());
        Ok(())
    }

    /// Append `address` to the network's list in the source file, keeping
    /// every other line as written. A no-op without a source file.
    pub fn persist(&self, network: &str, address: &str) -> AppResult<()> {
        let Some(path) = &self.source else {
            return Ok(());
        };
        // serializes writers
        let _networks = self.networks.write();

        let io = |action: &str, e: std::io::Error| {
            AppError::Config(format!("failed to {} {}: {}", action, path.display(), e))
        };

        let document = std::fs::read_to_string(path).map_err(|e| io("read", e))?;
        let updated = insert_application_line(&document, network, address).ok_or_else(|| {
            AppError::Config(format!(
                "could not find applications list for network {:?} in {}",
                network,
                path.display()
            ))
        })?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::Builder::new()
            .prefix("config-")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|e| io("create temp file next to", e))?;
        tmp.write_all(updated.as_bytes()).map_err(|e| io("write", e))?;
        tmp.as_file().sync_all().map_err(|e| io("sync", e))?;
        tmp.persist(path).map_err(|e| io("replace", e.error))?;

        Ok(())
    }
}

/// Insert `- <address>` after the last entry of `network`'s block-style
/// `applications:` list. `None` if the network has no such list.
fn insert_application_line(document: &str, network: &str, address: &str) -> Option<String> {
    let lines: Vec<&str> = document.split('\n').collect();
    let leading = |line: &str| line.len() - line.trim_start().len();

    let mut network_indent = None;
    let mut in_applications = false;
    let mut applications_key = None;
    let mut last_entry = None;

    for (idx, line) in lines.iter().copied().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let is_comment = trimmed.starts_with('#');

        let Some(indent) = network_indent else {
            if !is_comment && trimmed.strip_suffix(':') == Some(network) {
                network_indent = Some(leading(line));
            }
            continue;
        };

        if in_applications {
            if trimmed.starts_with("- ") {
                last_entry = Some(idx);
                continue;
            }
            if is_comment {
                continue;
            }
            in_applications = false;
        }

        if !is_comment && leading(line) <= indent {
            break;
        }
        if trimmed == "applications:" {
            in_applications = true;
            applications_key = Some(idx);
        }
    }

    let (at, entry) = match (last_entry, applications_key) {
        (Some(idx), _) => (idx, format!("{}- {}", &lines[idx][..leading(lines[idx])], address)),
        (None, Some(idx)) => (idx, format!("{}  - {}", &lines[idx][..leading(lines[idx])], address)),
        (None, None) => return None,
    };

    let (head, tail) = lines.split_at(at + 1);
    let mut out = Vec::with_capacity(lines.len() + 1);
    out.extend_from_slice(head);
    out.push(entry.as_str());
    out.extend_from_slice(tail);
    Some(out.join("\n"))
}

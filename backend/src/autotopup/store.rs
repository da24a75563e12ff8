use parking_lot::RwLock;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use super::models::{PolicyMap, StoreData, TopUpPolicy};
use crate::error::{StoreError, StoreResult};

/// Durable (network, address) -> policy mapping.
///
/// Every mutation rewrites the whole file (temp file, fsync, rename) while the
/// write lock is held, so readers never see memory ahead of disk.
pub struct PolicyStore {
    path: PathBuf,
    data: RwLock<StoreData>,
}

impl PolicyStore {
    /// Load the store from `path`, creating an empty file if none exists.
    ///
    /// An unparseable file is an error: starting empty would silently drop
    /// every configured policy on the next write.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();

        let data = match std::fs::read(&path) {
            Ok(raw) if raw.iter().all(u8::is_ascii_whitespace) => StoreData::new(),
            Ok(raw) => serde_json::from_slice(&raw).map_err(|source| StoreError::Corrupt {
                path: path.display().to_string(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let data = StoreData::new();
                write_atomic(&path, &data)?;
                info!("📁 Created auto-top-up store at {}", path.display());
                data
            }
            Err(source) => {
                return Err(StoreError::Io {
                    action: "read",
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        let policies: usize = data.values().map(|apps| apps.len()).sum();
        info!(
            "✓ Auto-top-up store loaded: {} policies across {} networks",
            policies,
            data.len()
        );

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, network: &str, address: &str) -> Option<TopUpPolicy> {
        self.data
            .read()
            .get(network)
            .and_then(|apps| apps.get(address))
            .copied()
    }

    /// All policies for a network; empty for an unknown network.
    pub fn get_all(&self, network: &str) -> PolicyMap {
        self.data.read().get(network).cloned().unwrap_or_default()
    }

    /// Enabled policies across all networks. Networks with no enabled
    /// policy are left out entirely.
    pub fn get_enabled(&self) -> StoreData {
        let data = self.data.read();

        data.iter()
            .filter_map(|(network, apps)| {
                let enabled: PolicyMap = apps
                    .iter()
                    .filter(|(_, policy)| policy.enabled)
                    .map(|(address, policy)| (address.clone(), *policy))
                    .collect();
                (!enabled.is_empty()).then(|| (network.clone(), enabled))
            })
            .collect()
    }

    /// Insert or replace a policy and persist before returning.
    ///
    /// Invalid policies are rejected without touching memory or disk. If the
    /// write fails the in-memory change is rolled back.
    pub fn set(&self, network: &str, address: &str, policy: TopUpPolicy) -> StoreResult<()> {
        policy.validate()?;

        let mut data = self.data.write();
        let previous = data
            .entry(network.to_string())
            .or_default()
            .insert(address.to_string(), policy);

        if let Err(e) = write_atomic(&self.path, &data) {
            error!(
                "❌ Failed to persist auto-top-up policy for {} on {}: {}",
                address, network, e
            );
            match previous {
                Some(previous) => {
                    if let Some(apps) = data.get_mut(network) {
                        apps.insert(address.to_string(), previous);
                    }
                }
                None => remove_entry(&mut data, network, address),
            }
            return Err(e);
        }

        Ok(())
    }

    /// Remove a policy if present. Deleting a missing entry is a no-op.
    pub fn delete(&self, network: &str, address: &str) -> StoreResult<()> {
        let mut data = self.data.write();

        let Some(previous) = data.get(network).and_then(|apps| apps.get(address)).copied() else {
            return Ok(());
        };

        remove_entry(&mut data, network, address);

        if let Err(e) = write_atomic(&self.path, &data) {
            error!(
                "❌ Failed to persist auto-top-up deletion for {} on {}: {}",
                address, network, e
            );
            data.entry(network.to_string())
                .or_default()
                .insert(address.to_string(), previous);
            return Err(e);
        }

        Ok(())
    }
}

/// Drops the address and the network key once it has no policies left.
fn remove_entry(data: &mut StoreData, network: &str, address: &str) {
    if let Some(apps) = data.get_mut(network) {
        apps.remove(address);
        if apps.is_empty() {
            data.remove(network);
        }
    }
}

fn write_atomic(path: &Path, data: &StoreData) -> StoreResult<()> {
    let raw = serde_json::to_vec_pretty(data).map_err(StoreError::Encode)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let io_err = |action: &'static str, target: &Path| {
        let target = target.display().to_string();
        move |source: std::io::Error| StoreError::Io {
            action,
            path: target,
            source,
        }
    };

    // The temp file is removed on drop if anything below fails.
    let mut tmp = tempfile::Builder::new()
        .prefix("autotopup-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(io_err("create temp file in", dir))?;

    tmp.write_all(&raw).map_err(io_err("write", tmp.path()))?;
    tmp.as_file().sync_all().map_err(io_err("sync", tmp.path()))?;
    tmp.persist(path)
        .map_err(|e| io_err("rename temp file over", path)(e.error))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    const APP: &str = "pokt1qqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqq";
    const APP2: &str = "pokt1zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz";

    fn policy(enabled: bool) -> TopUpPolicy {
        TopUpPolicy {
            enabled,
            trigger_threshold: 1_000_000,
            target_amount: 5_000_000,
        }
    }

    fn open_store(dir: &TempDir) -> PolicyStore {
        PolicyStore::open(dir.path().join("autotopup.json")).unwrap()
    }

    #[test]
    fn test_open_creates_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("autotopup.json");

        let store = PolicyStore::open(&path).unwrap();

        assert!(path.exists());
        assert!(store.get_enabled().is_empty());
        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(serde_json::from_str::<StoreData>(&raw).unwrap(), StoreData::new());
    }

    #[test]
    fn test_open_rejects_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("autotopup.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = PolicyStore::open(&path);
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));

        // the corrupt file must be left alone
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn test_open_accepts_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("autotopup.json");
        std::fs::write(&path, "").unwrap();

        let store = PolicyStore::open(&path).unwrap();
        assert!(store.get_all("pocket").is_empty());
    }

    #[test]
    fn test_set_then_get() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.set("pocket", APP, policy(true)).unwrap();

        assert_eq!(store.get("pocket", APP), Some(policy(true)));
        assert_eq!(store.get("pocket", APP2), None);
        assert_eq!(store.get("beta", APP), None);
    }

    #[test]
    fn test_set_rejects_invalid_policy_without_mutation() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.set("pocket", APP, policy(true)).unwrap();
        let before = std::fs::read_to_string(store.path()).unwrap();

        let invalid = [
            (0, 5_000_000),
            (-5, 5_000_000),
            (1_000_000, 0),
            (5_000_000, 5_000_000),
            (6_000_000, 5_000_000),
        ];
        for (trigger_threshold, target_amount) in invalid {
            let bad = TopUpPolicy {
                enabled: true,
                trigger_threshold,
                target_amount,
            };
            assert!(matches!(
                store.set("pocket", APP, bad),
                Err(StoreError::InvalidPolicy(_))
            ));
        }

        assert_eq!(store.get("pocket", APP), Some(policy(true)));
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), before);
    }

    #[test]
    fn test_set_survives_reload() {
        let dir = TempDir::new().unwrap();
        let stored = TopUpPolicy {
            enabled: false,
            trigger_threshold: 250_000,
            target_amount: 9_000_000,
        };

        {
            let store = open_store(&dir);
            store.set("pocket", APP, stored).unwrap();
            store.set("beta", APP2, policy(true)).unwrap();
        }

        let reloaded = open_store(&dir);
        assert_eq!(reloaded.get("pocket", APP), Some(stored));
        assert_eq!(reloaded.get("beta", APP2), Some(policy(true)));
    }

    #[test]
    fn test_get_all_returns_independent_copy() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.set("pocket", APP, policy(true)).unwrap();

        let mut all = store.get_all("pocket");
        all.get_mut(APP).unwrap().target_amount = 1;
        all.insert(APP2.to_string(), policy(false));

        let fresh = store.get_all("pocket");
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[APP], policy(true));
    }

    #[test]
    fn test_get_enabled_filters_and_copies() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.set("pocket", APP, policy(true)).unwrap();
        store.set("pocket", APP2, policy(false)).unwrap();
        store.set("beta", APP2, policy(false)).unwrap();

        let mut enabled = store.get_enabled();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled["pocket"].len(), 1);
        assert!(enabled["pocket"].contains_key(APP));

        enabled.get_mut("pocket").unwrap().get_mut(APP).unwrap().enabled = false;
        assert!(store.get("pocket", APP).unwrap().enabled);
    }

    #[test]
    fn test_get_all_unknown_network_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        assert!(store.get_all("nowhere").is_empty());
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.set("pocket", APP, policy(true)).unwrap();

        store.delete("pocket", APP2).unwrap();
        store.delete("beta", APP).unwrap();

        assert_eq!(store.get_all("pocket").len(), 1);
    }

    #[test]
    fn test_delete_last_entry_removes_network() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.set("pocket", APP, policy(true)).unwrap();
        store.set("pocket", APP2, policy(true)).unwrap();

        store.delete("pocket", APP).unwrap();
        assert_eq!(store.get_all("pocket").len(), 1);

        store.delete("pocket", APP2).unwrap();
        assert!(store.get_all("pocket").is_empty());

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let on_disk: StoreData = serde_json::from_str(&raw).unwrap();
        assert!(!on_disk.contains_key("pocket"));
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.set("pocket", APP, policy(true)).unwrap();
        store.delete("pocket", APP).unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["autotopup.json".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn test_persist_failure_rolls_back() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("state");
        std::fs::create_dir(&sub).unwrap();
        let store = PolicyStore::open(sub.join("autotopup.json")).unwrap();
        store.set("pocket", APP, policy(true)).unwrap();

        std::fs::set_permissions(&sub, std::fs::Permissions::from_mode(0o500)).unwrap();
        // root ignores directory permissions, nothing to assert there
        let writable = tempfile::tempfile_in(&sub);
        if writable.is_ok() {
            std::fs::set_permissions(&sub, std::fs::Permissions::from_mode(0o700)).unwrap();
            return;
        }

        assert!(matches!(
            store.set("pocket", APP2, policy(true)),
            Err(StoreError::Io { .. })
        ));
        assert!(store.delete("pocket", APP).is_err());

        std::fs::set_permissions(&sub, std::fs::Permissions::from_mode(0o700)).unwrap();

        assert_eq!(store.get("pocket", APP2), None);
        assert_eq!(store.get("pocket", APP), Some(policy(true)));
    }

    #[test]
    fn test_concurrent_writers() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(open_store(&dir));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let network = format!("net-{}", i);
                    for n in 0..10 {
                        let address = format!("pokt1{:038}", n);
                        store.set(&network, &address, policy(n % 2 == 0)).unwrap();
                        let _ = store.get_enabled();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let reloaded = open_store(&dir);
        for i in 0..4 {
            assert_eq!(reloaded.get_all(&format!("net-{}", i)).len(), 10);
        }
    }
}

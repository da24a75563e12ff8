// Auto-top-up worker
//
// Per account, per cycle:
// 1. check    - query stake and liquid balance
// 2. fund     - send the shortfall from the bank (skipped if liquid covers it)
// 3. confirm  - poll the balance until the transfer shows up (best effort)
// 4. upstake  - raise the stake by the full amount needed
// 5. complete - record the hashes, invalidate read caches for the network

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use super::events::EventLog;
use super::models::{TopUpEvent, TopUpPhase, TopUpPolicy};
use super::poll::{PollOutcome, PollPolicy};
use super::store::PolicyStore;
use crate::cache::TtlCache;
use crate::chain::{AccountQuery, Application, BankAccount, NetworkRef, TxExecutor};
use crate::config::Config;
use crate::error::{ChainError, ChainResult};

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(120);

/// What a call to `run_once` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStatus {
    /// Another cycle was already in flight; nothing ran
    Skipped,
    Completed { processed: usize },
    /// Shutdown was requested part-way; remaining accounts were not started
    Interrupted { processed: usize },
}

/// Amounts for one top-up, in upokt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopUpPlan {
    pub amount_needed: i64,
    /// `None` when the liquid balance already covers `amount_needed`
    pub fund_amount: Option<i64>,
}

impl TopUpPlan {
    /// `None` means the account is healthy and nothing should happen.
    pub fn evaluate(policy: &TopUpPolicy, stake: i64, liquid_balance: i64) -> Option<Self> {
        if stake >= policy.trigger_threshold {
            return None;
        }

        let amount_needed = policy.target_amount.saturating_sub(stake);
        if amount_needed <= 0 {
            return None;
        }

        let fund_amount = amount_needed.saturating_sub(liquid_balance);
        Some(Self {
            amount_needed,
            fund_amount: (fund_amount > 0).then_some(fund_amount),
        })
    }
}

/// Releases the single-cycle flag when the cycle ends, panics included
struct CycleGuard<'a>(&'a AtomicBool);

impl<'a> CycleGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        claim(flag).then(|| Self(flag))
    }
}

fn claim(flag: &AtomicBool) -> bool {
    flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Periodic reconciler that keeps enabled applications staked above their
/// trigger threshold.
pub struct TopUpWorker {
    store: Arc<PolicyStore>,
    config: Arc<Config>,
    query: Arc<dyn AccountQuery>,
    executor: Arc<dyn TxExecutor>,
    app_cache: Arc<TtlCache<Vec<Application>>>,
    bank_cache: Arc<TtlCache<BankAccount>>,
    events: EventLog,
    running: AtomicBool,
    poll: PollPolicy,
    call_timeout: Duration,
    shutdown: watch::Sender<bool>,
}

impl TopUpWorker {
    pub fn new(
        store: Arc<PolicyStore>,
        config: Arc<Config>,
        query: Arc<dyn AccountQuery>,
        executor: Arc<dyn TxExecutor>,
        app_cache: Arc<TtlCache<Vec<Application>>>,
        bank_cache: Arc<TtlCache<BankAccount>>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            store,
            config,
            query,
            executor,
            app_cache,
            bank_cache,
            events: EventLog::default(),
            running: AtomicBool::new(false),
            poll: PollPolicy::default(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            shutdown,
        }
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.events = EventLog::new(capacity);
        self
    }

    /// Up to the configured capacity of recent outcomes, newest last
    pub fn recent_events(&self) -> Vec<TopUpEvent> {
        self.events.snapshot()
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop starting new accounts and cut any balance poll short
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Run one reconciliation cycle over every enabled policy.
    ///
    /// Returns `Skipped` immediately if a cycle is already running; the
    /// trigger is dropped, not queued.
    pub async fn run_once(&self) -> CycleStatus {
        let Some(_guard) = CycleGuard::try_acquire(&self.running) else {
            warn!("⚠️ Auto-top-up cycle already in progress, skipping");
            return CycleStatus::Skipped;
        };

        self.run_cycle().await
    }

    /// Claim the cycle flag now and run the cycle on a background task.
    ///
    /// `false` means a cycle was already in flight and nothing was spawned.
    pub fn try_start(self: &Arc<Self>) -> bool {
        if !claim(&self.running) {
            warn!("⚠️ Auto-top-up cycle already in progress, not starting another");
            return false;
        }

        let worker = self.clone();
        tokio::spawn(async move {
            let _guard = CycleGuard(&worker.running);
            worker.run_cycle().await;
        });
        true
    }

    async fn run_cycle(&self) -> CycleStatus {
        let enabled = self.store.get_enabled();
        if enabled.is_empty() {
            debug!("No enabled auto-top-up policies");
            return CycleStatus::Completed { processed: 0 };
        }

        info!("🔄 Auto-top-up cycle starting across {} networks", enabled.len());

        let mut processed = 0;
        for (network, apps) in &enabled {
            let Some(network_config) = self.config.network(network) else {
                warn!("⚠️ Auto-top-up: unknown network {}, skipping {} policies", network, apps.len());
                continue;
            };
            let network = NetworkRef::new(network, network_config);

            for (address, policy) in apps {
                if self.is_shutting_down() {
                    warn!("⚠️ Auto-top-up cycle interrupted by shutdown after {} accounts", processed);
                    return CycleStatus::Interrupted { processed };
                }

                if let Some(event) = self.process_account(network, address, policy).await {
                    if event.success {
                        self.invalidate_caches(network.name);
                    }
                    self.events.push(event);
                }
                processed += 1;
            }
        }

        info!("✓ Auto-top-up cycle complete ({} accounts checked)", processed);
        CycleStatus::Completed { processed }
    }

    /// Drive one account through the workflow. `None` means it was healthy.
    #[instrument(skip(self, network, policy), fields(network = network.name))]
    async fn process_account(
        &self,
        network: NetworkRef<'_>,
        address: &str,
        policy: &TopUpPolicy,
    ) -> Option<TopUpEvent> {
        let mut event = TopUpEvent::start(network.name, address, policy);

        let app = match self.timed(self.query.application(network, address)).await {
            Ok(app) => app,
            Err(e) => {
                error!("❌ Auto-top-up: failed to query application: {}", e);
                return Some(event.fail(e.to_string()));
            }
        };
        event.previous_stake = app.stake;

        let Some(plan) = TopUpPlan::evaluate(policy, app.stake, app.liquid_balance) else {
            debug!(
                "Stake {} at or above threshold {}, skipping",
                app.stake, policy.trigger_threshold
            );
            return None;
        };

        info!(
            "📉 Application needs top-up: stake {} -> target {} (needs {})",
            app.stake, policy.target_amount, plan.amount_needed
        );

        if let Some(fund_amount) = plan.fund_amount {
            event.phase = TopUpPhase::Fund;
            info!("💸 Funding {} from bank", fund_amount);

            match self.timed(self.executor.fund(network, address, fund_amount)).await {
                Ok(outcome) if outcome.success => event.fund_tx_hash = outcome.tx_hash,
                Ok(outcome) => {
                    let reason = outcome.message.unwrap_or_else(|| "fund failed".to_string());
                    error!("❌ Auto-top-up: fund rejected: {}", reason);
                    return Some(event.fail(reason));
                }
                Err(e) => {
                    error!("❌ Auto-top-up: fund failed: {}", e);
                    return Some(event.fail(e.to_string()));
                }
            }

            let expected = app.liquid_balance.saturating_add(fund_amount);
            match self.confirm_balance(network, address, expected).await {
                PollOutcome::Confirmed { attempts } => {
                    info!("✓ Funding confirmed after {} polls", attempts)
                }
                // The stake call can still land once the transfer settles;
                // if it doesn't, the upstake phase records the failure.
                PollOutcome::Exhausted => warn!(
                    "⚠️ Balance not confirmed after {:?}, proceeding anyway",
                    self.poll.budget()
                ),
                PollOutcome::Cancelled => {
                    warn!("⚠️ Balance poll cancelled by shutdown, proceeding anyway")
                }
            }
        } else {
            info!("✓ Liquid balance {} covers the top-up, skipping fund", app.liquid_balance);
        }

        event.phase = TopUpPhase::Upstake;
        info!("📈 Upstaking {}", plan.amount_needed);

        match self.timed(self.executor.upstake(network, address, plan.amount_needed)).await {
            Ok(outcome) if outcome.success => {
                info!("✅ Auto-top-up complete");
                Some(event.complete(outcome.tx_hash))
            }
            Ok(outcome) => {
                let reason = outcome.message.unwrap_or_else(|| "upstake failed".to_string());
                error!("❌ Auto-top-up: upstake rejected: {}", reason);
                Some(event.fail(reason))
            }
            Err(e) => {
                error!("❌ Auto-top-up: upstake failed: {}", e);
                Some(event.fail(e.to_string()))
            }
        }
    }

    async fn confirm_balance(&self, network: NetworkRef<'_>, address: &str, expected: i64) -> PollOutcome {
        let mut shutdown = self.shutdown.subscribe();

        self.poll
            .poll(&mut shutdown, |attempt| async move {
                match self.timed(self.query.balance(network, address)).await {
                    Ok(balance) => {
                        debug!("Poll {}: balance {} / {}", attempt, balance, expected);
                        Some(balance >= expected)
                    }
                    Err(e) => {
                        warn!("⚠️ Poll {}: balance query failed: {}", attempt, e);
                        None
                    }
                }
            })
            .await
    }

    fn invalidate_caches(&self, network: &str) {
        self.app_cache.delete(network);
        self.bank_cache.delete(network);
    }

    async fn timed<T>(&self, call: impl Future<Output = ChainResult<T>>) -> ChainResult<T> {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| ChainError::Timeout(self.call_timeout))?
    }
}

//! Ledger engine
//!
//! The engine is what an application talks to. It routes writes to the
//! ledger store, parks retryable failures in the pending queue and keeps the
//! observable [`LedgerState`] current.
//!
//! # Write path
//!
//! | Store result                 | Engine result                     |
//! |------------------------------|-----------------------------------|
//! | success                      | `Committed`, balances recomputed  |
//! | transport or FX failure      | queued, `Pending`                 |
//! | validation or not found      | `Err`, nothing queued             |
//!
//! While operations are queued, new writes are queued behind them without
//! being attempted, so the document store sees them in the order they were
//! made.
//!
//! A `Pending` write is settled later by a drain. Its terminal result is
//! published on [`LedgerEngine::subscribe_commits`].

use chrono::NaiveDate;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, instrument, warn, Instrument};

use core_kernel::{
    Clock, Currency, DocumentStore, ExpenseId, GroupId, HealthCheckResult, HealthCheckable,
    KeyValueStore, Money, OperationId, SystemClock, Timezone, UserId,
};
use domain_balance::{
    compute_friend_balance, compute_group_balances, simplify_debts, Balance, RateTable, Transfer,
};
use domain_fx::{HttpRateSource, RateCache, RateSource};
use domain_ledger::{
    Expense, ExpenseDraft, ExpensePatch, ExpenseRevision, LedgerError, LedgerStore, Settlement,
    SettlementDraft,
};
use domain_sync::{
    CommitEvent, CommitStatus, DrainReport, OperationPayload, PendingOperation, PendingQueue,
};
use infra_store::FileKeyValueStore;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::state::LedgerState;

/// Result of a write made through the engine
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome<T> {
    /// The document store accepted the write
    Committed(T),
    /// The write is queued and will be replayed
    Pending {
        operation_id: OperationId,
        reason: String,
    },
}

impl<T> WriteOutcome<T> {
    pub fn is_committed(&self) -> bool {
        matches!(self, WriteOutcome::Committed(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, WriteOutcome::Pending { .. })
    }

    pub fn committed(self) -> Option<T> {
        match self {
            WriteOutcome::Committed(value) => Some(value),
            WriteOutcome::Pending { .. } => None,
        }
    }

    pub fn operation_id(&self) -> Option<OperationId> {
        match self {
            WriteOutcome::Committed(_) => None,
            WriteOutcome::Pending { operation_id, .. } => Some(*operation_id),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> WriteOutcome<U> {
        match self {
            WriteOutcome::Committed(value) => WriteOutcome::Committed(f(value)),
            WriteOutcome::Pending {
                operation_id,
                reason,
            } => WriteOutcome::Pending {
                operation_id,
                reason,
            },
        }
    }
}

/// Adapters an engine runs on
pub struct EngineParts {
    pub documents: Arc<dyn DocumentStore>,
    /// Holds the pending queue and the persisted rate tier
    pub durable: Arc<dyn KeyValueStore>,
    pub rate_source: Arc<dyn RateSource>,
    pub clock: Arc<dyn Clock>,
}

/// One user's view of the ledger
pub struct LedgerEngine {
    user_id: UserId,
    store: Arc<LedgerStore>,
    queue: Arc<PendingQueue>,
    rates: Arc<RateCache>,
    state: Arc<LedgerState>,
    clock: Arc<dyn Clock>,
    timezone: Timezone,
    // Recomputations run one at a time so the last one to finish saw the latest records
    recompute_lock: Arc<Mutex<()>>,
    health_checks: Vec<Arc<dyn HealthCheckable>>,
    listener: JoinHandle<()>,
}

impl std::fmt::Debug for LedgerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerEngine")
            .field("user_id", &self.user_id)
            .field("timezone", &self.timezone)
            .finish_non_exhaustive()
    }
}

impl Drop for LedgerEngine {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

impl LedgerEngine {
    /// Wires an engine for `user_id` over the given adapters
    ///
    /// Loads the user's pending queue and starts listening for commit
    /// events. Nothing is replayed until [`LedgerEngine::start`].
    ///
    /// # Errors
    ///
    /// Returns `Sync` if the persisted queue cannot be read.
    #[instrument(skip(config, parts))]
    pub async fn open(
        user_id: UserId,
        config: &EngineConfig,
        parts: EngineParts,
    ) -> Result<Self, EngineError> {
        let rates = Arc::new(
            RateCache::new(
                parts.rate_source,
                parts.durable.clone(),
                parts.clock.clone(),
                config.timezone,
            )
            .with_ttl(config.rate_ttl()),
        );
        let store = Arc::new(LedgerStore::new(
            parts.documents,
            rates.clone(),
            parts.clock.clone(),
        ));
        let queue = Arc::new(PendingQueue::open(user_id.clone(), parts.durable).await?);
        let state = Arc::new(LedgerState::new());
        state.set_pending(queue.pending().await);

        let recompute_lock = Arc::new(Mutex::new(()));
        let listener = spawn_listener(
            queue.clone(),
            store.clone(),
            state.clone(),
            recompute_lock.clone(),
        );

        Ok(Self {
            user_id,
            store,
            queue,
            rates,
            state,
            clock: parts.clock,
            timezone: config.timezone,
            recompute_lock,
            health_checks: Vec::new(),
            listener,
        })
    }

    /// Opens an engine against the HTTP rate API and a file-backed store
    /// at `config.store_path`
    pub async fn connect(
        user_id: UserId,
        config: &EngineConfig,
        documents: Arc<dyn DocumentStore>,
    ) -> Result<Self, EngineError> {
        let durable = Arc::new(FileKeyValueStore::open(&config.store_path).await?);
        let rate_source = Arc::new(HttpRateSource::new(config.rate_source())?);
        let parts = EngineParts {
            documents,
            durable: durable.clone(),
            rate_source,
            clock: Arc::new(SystemClock),
        };
        Ok(Self::open(user_id, config, parts)
            .await?
            .with_health_check(durable))
    }

    /// Adds an adapter to [`LedgerEngine::health`]
    pub fn with_health_check(mut self, check: Arc<dyn HealthCheckable>) -> Self {
        self.health_checks.push(check);
        self
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Direct access for reads and group management
    pub fn store(&self) -> &Arc<LedgerStore> {
        &self.store
    }

    pub fn state(&self) -> &Arc<LedgerState> {
        &self.state
    }

    pub fn queue(&self) -> &Arc<PendingQueue> {
        &self.queue
    }

    pub fn rates(&self) -> &Arc<RateCache> {
        &self.rates
    }

    /// Terminal results of queued writes
    pub fn subscribe_commits(&self) -> broadcast::Receiver<CommitEvent> {
        self.queue.subscribe()
    }

    /// Replays anything left in the queue by a previous run
    ///
    /// Returns `None` if the queue was empty.
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn start(&self) -> Result<Option<DrainReport>, EngineError> {
        let pending = self.queue.len().await;
        if pending == 0 {
            debug!("no pending operations");
            return Ok(None);
        }
        info!(pending, "replaying operations queued before start");
        self.reconnect().await.map(Some)
    }

    /// Replays the queue, typically after connectivity returns
    ///
    /// A retryable failure stops the pass without error; check
    /// [`DrainReport::halted`].
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn reconnect(&self) -> Result<DrainReport, EngineError> {
        self.state.set_syncing(true);
        let result = self.queue.drain(self.store.as_ref()).await;
        self.state.set_syncing(false);
        self.publish_pending().await;
        Ok(result?)
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    #[instrument(skip(self, draft), fields(user_id = %self.user_id, amount = %draft.amount))]
    pub async fn create_expense(
        &self,
        mut draft: ExpenseDraft,
    ) -> Result<WriteOutcome<Expense>, EngineError> {
        let operation_id = *draft.operation_id.get_or_insert_with(OperationId::new_v7);
        let payload = OperationPayload::CreateExpense {
            draft: draft.clone(),
        };
        if self.has_backlog().await {
            return self.defer(operation_id, payload, BACKLOG_REASON).await;
        }
        let attempt = self.store.create_expense(draft).await;
        self.settle(operation_id, payload, attempt, |e| e.group_id).await
    }

    #[instrument(skip(self, patch), fields(user_id = %self.user_id))]
    pub async fn update_expense(
        &self,
        expense_id: ExpenseId,
        mut patch: ExpensePatch,
    ) -> Result<WriteOutcome<Expense>, EngineError> {
        let operation_id = *patch.operation_id.get_or_insert_with(OperationId::new_v7);
        let payload = OperationPayload::UpdateExpense {
            expense_id,
            patch: patch.clone(),
        };
        if self.has_backlog().await {
            return self.defer(operation_id, payload, BACKLOG_REASON).await;
        }
        let attempt = self.store.revise_expense(expense_id, patch).await;
        let outcome = self
            .settle(operation_id, payload, attempt, ExpenseRevision::touched_groups)
            .await?;
        Ok(outcome.map(|revision| revision.after))
    }

    /// Deletes an expense, returning the removed record when committed
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn delete_expense(
        &self,
        expense_id: ExpenseId,
    ) -> Result<WriteOutcome<Expense>, EngineError> {
        let operation_id = OperationId::new_v7();
        let payload = OperationPayload::DeleteExpense { expense_id };
        if self.has_backlog().await {
            return self.defer(operation_id, payload, BACKLOG_REASON).await;
        }
        let attempt = self.store.delete_expense(expense_id).await;
        self.settle(operation_id, payload, attempt, |e| e.group_id).await
    }

    #[instrument(skip(self, draft), fields(user_id = %self.user_id, amount = %draft.amount))]
    pub async fn create_settlement(
        &self,
        mut draft: SettlementDraft,
    ) -> Result<WriteOutcome<Settlement>, EngineError> {
        let operation_id = *draft.operation_id.get_or_insert_with(OperationId::new_v7);
        let payload = OperationPayload::CreateSettlement {
            draft: draft.clone(),
        };
        if self.has_backlog().await {
            return self.defer(operation_id, payload, BACKLOG_REASON).await;
        }
        let attempt = self.store.create_settlement(draft).await;
        self.settle(operation_id, payload, attempt, |s| s.group_id).await
    }

    async fn has_backlog(&self) -> bool {
        !self.queue.is_empty().await
    }

    async fn settle<T, G>(
        &self,
        operation_id: OperationId,
        payload: OperationPayload,
        attempt: Result<T, LedgerError>,
        groups_of: impl FnOnce(&T) -> G,
    ) -> Result<WriteOutcome<T>, EngineError>
    where
        G: IntoIterator<Item = GroupId>,
    {
        match attempt {
            Ok(value) => {
                for group_id in groups_of(&value) {
                    // Detached; the state channel carries the result
                    let _ = self.recompute_group(group_id);
                }
                Ok(WriteOutcome::Committed(value))
            }
            Err(err) if err.is_retryable() => {
                warn!(operation_id = %operation_id, error = %err, "write failed, queueing for replay");
                self.defer(operation_id, payload, err.to_string()).await
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn defer<T>(
        &self,
        operation_id: OperationId,
        payload: OperationPayload,
        reason: impl Into<String>,
    ) -> Result<WriteOutcome<T>, EngineError> {
        let operation =
            PendingOperation::new(operation_id, self.user_id.clone(), payload, self.clock.now());
        self.queue.enqueue(operation).await?;
        self.publish_pending().await;
        Ok(WriteOutcome::Pending {
            operation_id,
            reason: reason.into(),
        })
    }

    async fn publish_pending(&self) {
        self.state.set_pending(self.queue.pending().await);
    }

    // ------------------------------------------------------------------
    // Balances
    // ------------------------------------------------------------------

    /// Recomputes a group's balances in the background
    ///
    /// The handle may be dropped; the result is also published to
    /// [`LedgerState`].
    pub fn recompute_group(
        &self,
        group_id: GroupId,
    ) -> JoinHandle<Result<Vec<Balance>, EngineError>> {
        let store = self.store.clone();
        let state = self.state.clone();
        let lock = self.recompute_lock.clone();
        tokio::spawn(
            async move {
                let result = refresh_group(&store, &state, &lock, group_id).await;
                if let Err(err) = &result {
                    warn!(error = %err, "balance recomputation failed");
                }
                result
            }
            .instrument(info_span!("recompute", group_id = %group_id)),
        )
    }

    /// Recomputes a group's balances and waits for the result
    pub async fn refresh_balances(&self, group_id: GroupId) -> Result<Vec<Balance>, EngineError> {
        refresh_group(&self.store, &self.state, &self.recompute_lock, group_id).await
    }

    /// Transfers that would settle every member of the group
    #[instrument(skip(self))]
    pub async fn simplify_group(&self, group_id: GroupId) -> Result<Vec<Transfer>, EngineError> {
        let balances = self.refresh_balances(group_id).await?;
        Ok(simplify_debts(&balances)?)
    }

    /// Net position between this user and `friend`, in `currency`
    ///
    /// Records without a frozen rate into `currency` are converted with the
    /// rates currently held by the FX cache.
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn friend_balance(
        &self,
        friend: &UserId,
        currency: Currency,
    ) -> Result<Balance, EngineError> {
        let (expenses, settlements) = tokio::try_join!(
            self.store.list_user_expenses(&self.user_id),
            self.store.list_user_settlements(&self.user_id),
        )?;
        let rates: RateTable = self.rates.fresh_rates().await.into_iter().collect();
        Ok(compute_friend_balance(
            &self.user_id,
            friend,
            currency,
            &expenses,
            &settlements,
            &rates,
        )?)
    }

    /// Converts `amount` for display with today's rate
    pub async fn convert(&self, amount: Money, to: Currency) -> Result<Money, EngineError> {
        Ok(self.rates.convert(amount, to).await?)
    }

    // ------------------------------------------------------------------
    // Recurring expenses
    // ------------------------------------------------------------------

    /// Materialises this user's recurring expenses due on or before `as_of`
    /// and recomputes the groups they landed in
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn run_recurring(&self, as_of: NaiveDate) -> Result<Vec<Expense>, EngineError> {
        let generated = self
            .store
            .generate_due_recurring(&self.user_id, as_of)
            .await?;

        let mut touched: Vec<GroupId> = Vec::new();
        for group_id in generated.iter().filter_map(|e| e.group_id) {
            if !touched.contains(&group_id) {
                touched.push(group_id);
            }
        }
        for group_id in touched {
            self.refresh_balances(group_id).await?;
        }
        Ok(generated)
    }

    /// [`LedgerEngine::run_recurring`] for today in the configured timezone
    pub async fn run_recurring_today(&self) -> Result<Vec<Expense>, EngineError> {
        let today = self.timezone.date_of(self.clock.now());
        self.run_recurring(today).await
    }

    /// Health of every registered adapter
    pub async fn health(&self) -> Vec<HealthCheckResult> {
        let mut results = Vec::with_capacity(self.health_checks.len());
        for check in &self.health_checks {
            results.push(check.health_check().await);
        }
        results
    }
}

const BACKLOG_REASON: &str = "queued behind earlier pending operations";

async fn refresh_group(
    store: &LedgerStore,
    state: &LedgerState,
    lock: &Mutex<()>,
    group_id: GroupId,
) -> Result<Vec<Balance>, EngineError> {
    let _serial = lock.lock().await;
    let group = match store.get_group(group_id).await {
        Ok(group) => group,
        Err(err) => {
            if err.is_not_found() {
                state.remove_group(group_id);
            }
            return Err(err.into());
        }
    };
    let (expenses, settlements) = tokio::try_join!(
        store.list_group_expenses(group_id),
        store.list_group_settlements(group_id),
    )?;
    let balances = compute_group_balances(&group, &expenses, &settlements)?;
    state.set_balances(group_id, balances.clone());
    debug!(group_id = %group_id, members = balances.len(), "balances published");
    Ok(balances)
}

/// Follows the queue's commit events, keeping pending operations and
/// balances in the state current
fn spawn_listener(
    queue: Arc<PendingQueue>,
    store: Arc<LedgerStore>,
    state: Arc<LedgerState>,
    lock: Arc<Mutex<()>>,
) -> JoinHandle<()> {
    let mut events = queue.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    state.set_pending(queue.pending().await);
                    match &event.status {
                        CommitStatus::Confirmed => {
                            refresh_groups(&store, &state, &lock, event.groups).await;
                        }
                        CommitStatus::Rejected { reason } => {
                            warn!(
                                operation_id = %event.operation_id,
                                kind = event.kind,
                                reason = %reason,
                                "pending operation rejected"
                            );
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    // Skipped confirmations may have touched any published group
                    warn!(skipped, "commit listener lagged, refreshing every published group");
                    state.set_pending(queue.pending().await);
                    let published: Vec<GroupId> =
                        state.snapshot().balances.keys().copied().collect();
                    refresh_groups(&store, &state, &lock, published).await;
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

async fn refresh_groups(
    store: &LedgerStore,
    state: &LedgerState,
    lock: &Mutex<()>,
    groups: Vec<GroupId>,
) {
    for group_id in groups {
        if let Err(err) = refresh_group(store, state, lock, group_id).await {
            warn!(group_id = %group_id, error = %err, "balance recomputation failed");
        }
    }
}

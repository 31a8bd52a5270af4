use std::sync::Arc;

use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::LedgerConfig;
use crate::domain::{
    Balance, Cents, Expense, ExpenseId, IntegrityReport, LedgerState, NewExpense, ParticipantId,
    Settlement, Split, build_integrity_report, compute_balances, settlement_plan, validate,
};
use crate::storage::{LeaseRecord, LedgerStore};

use super::{AppError, RetryPolicy};

/// Application service providing high-level operations for the ledger.
/// This is the primary interface for any client (HTTP, CLI, tests).
///
/// Cloning is cheap; clones share the same store and therefore the same
/// in-process commit gate.
#[derive(Clone)]
pub struct LedgerService {
    store: Arc<LedgerStore>,
    retry: RetryPolicy,
}

/// Filter for querying expenses
#[derive(Debug, Clone, Default)]
pub struct ExpenseFilter {
    /// Only expenses the participant paid for or owes part of
    pub participant: Option<String>,
    /// Keep only the most recent N expenses
    pub limit: Option<usize>,
}

/// Liveness report; a running process is always live.
#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub status: &'static str,
}

/// Diagnostic view used by the integrity check command.
pub struct LedgerCheck {
    pub report: IntegrityReport,
    pub lease: Option<LeaseRecord>,
}

impl LedgerService {
    /// Create a new ledger service with the given store.
    pub fn new(store: LedgerStore, retry: RetryPolicy) -> Self {
        Self {
            store: Arc::new(store),
            retry,
        }
    }

    /// Open the store described by `config`, creating the data directory if needed.
    pub async fn open(config: &LedgerConfig) -> Result<Self, AppError> {
        let store = LedgerStore::open(config).await?;
        Ok(Self::new(store, RetryPolicy::from_config(config)))
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    // ========================
    // Expense operations
    // ========================

    /// Record a new expense. Validation happens before any I/O; contention with
    /// other writers is retried with jittered backoff up to the configured bound.
    pub async fn add_expense(&self, input: NewExpense) -> Result<Expense, AppError> {
        let expense = Expense::record(input)?;
        self.commit_expense(expense).await
    }

    /// Record an expense divided equally among `participants`.
    pub async fn add_equal_expense(
        &self,
        description: impl Into<String>,
        amount: Cents,
        payer: impl Into<ParticipantId>,
        participants: Vec<ParticipantId>,
    ) -> Result<Expense, AppError> {
        self.add_expense(NewExpense::equal(description, amount, payer, participants))
            .await
    }

    /// Record a repayment from a debtor to a creditor.
    ///
    /// Modeled as an expense paid by `from` and owed entirely by `to`, which moves
    /// both balances towards zero without touching past records.
    pub async fn record_payment(
        &self,
        from: impl Into<ParticipantId>,
        to: impl Into<ParticipantId>,
        amount: Cents,
        description: Option<String>,
    ) -> Result<Expense, AppError> {
        let from = from.into();
        let to = to.into();
        if from.trim() == to.trim() {
            return Err(AppError::InvalidRequest(
                "a payment needs two different participants".to_string(),
            ));
        }

        let description = description.unwrap_or_else(|| format!("Payment from {} to {}", from, to));
        self.add_expense(NewExpense::exact(
            description,
            amount,
            from,
            vec![Split::new(to, amount)],
        ))
        .await
    }

    async fn commit_expense(&self, expense: Expense) -> Result<Expense, AppError> {
        validate(&expense)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let state = self.store.load().await?;
            let outcome = self
                .store
                .commit(state.version, |current| current.append(expense.clone()))
                .await;

            match outcome {
                Ok(committed) => {
                    info!(
                        id = %expense.id,
                        amount = expense.amount,
                        payer = %expense.payer,
                        version = committed.version,
                        attempt,
                        "Recorded expense"
                    );
                    return Ok(expense);
                }
                Err(e) if e.is_contention() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay(attempt);
                    debug!(error = %e, attempt, ?delay, "Commit contended, retrying");
                    sleep(delay).await;
                }
                Err(e) if e.is_contention() => {
                    warn!(error = %e, attempts = attempt, "Giving up on contended commit");
                    return Err(AppError::Overloaded {
                        attempts: attempt,
                        last: e.to_string(),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// List all expenses in insertion order.
    pub async fn list_expenses(&self) -> Result<Vec<Expense>, AppError> {
        Ok(self.store.load().await?.expenses)
    }

    /// List expenses with filters.
    pub async fn list_expenses_filtered(
        &self,
        filter: ExpenseFilter,
    ) -> Result<Vec<Expense>, AppError> {
        let mut expenses: Vec<Expense> = self
            .list_expenses()
            .await?
            .into_iter()
            .filter(|e| {
                filter
                    .participant
                    .as_deref()
                    .is_none_or(|participant| e.involves(participant))
            })
            .collect();

        if let Some(limit) = filter.limit {
            let skip = expenses.len().saturating_sub(limit);
            expenses = expenses.split_off(skip);
        }
        Ok(expenses)
    }

    /// Get a single expense by id.
    pub async fn get_expense(&self, id: ExpenseId) -> Result<Expense, AppError> {
        self.store
            .load()
            .await?
            .find_expense(id)
            .cloned()
            .ok_or(AppError::ExpenseNotFound(id))
    }

    // ========================
    // Balance operations
    // ========================

    /// Net balance of every participant, sorted by participant.
    pub async fn get_balances(&self) -> Result<Vec<Balance>, AppError> {
        let state = self.store.load().await?;
        Ok(compute_balances(&state))
    }

    /// Transfers that would settle every balance. Greedy: short, but not
    /// guaranteed to be the shortest possible plan.
    pub async fn settlement_plan(&self) -> Result<Vec<Settlement>, AppError> {
        let balances = self.get_balances().await?;
        Ok(settlement_plan(&balances))
    }

    /// The full current ledger, as last committed.
    pub async fn snapshot(&self) -> Result<LedgerState, AppError> {
        Ok(self.store.load().await?)
    }

    // ========================
    // Health and integrity
    // ========================

    /// Process liveness. Succeeds whenever the process can answer at all.
    pub fn health(&self) -> Health {
        Health { status: "ok" }
    }

    /// Readiness: the shared volume must be reachable and writable.
    pub async fn ready(&self) -> Result<(), AppError> {
        self.store.health_check().await.map_err(|e| {
            warn!(error = %e, "Ledger storage not ready");
            AppError::from(e)
        })
    }

    /// Check ledger integrity and report who, if anyone, currently holds the lease.
    pub async fn check_integrity(&self) -> Result<LedgerCheck, AppError> {
        let state = self.store.load().await?;
        let lease = self.store.current_lease().await?;
        Ok(LedgerCheck {
            report: build_integrity_report(&state),
            lease,
        })
    }
}

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Cents, Expense, ExpenseId, InvalidExpense, compute_balances, validate};

/// Tag written into every persisted ledger so that future formats can be told apart.
pub const SCHEMA_VERSION: u32 = 1;

/// The full ledger document: every expense ever recorded plus a commit counter.
///
/// Treat values of this type as immutable between commits; use [`LedgerState::append`]
/// to derive a new state instead of mutating a loaded one in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    pub schema_version: u32,
    /// Incremented by exactly one on every successful commit
    pub version: u64,
    /// Insertion-ordered, append-only history
    pub expenses: Vec<Expense>,
}

impl Default for LedgerState {
    fn default() -> Self {
        Self::empty()
    }
}

impl LedgerState {
    /// The state of a ledger that has never been committed.
    pub fn empty() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            version: 0,
            expenses: Vec::new(),
        }
    }

    /// Return a new state with `expense` appended. The version is left alone;
    /// bumping it is the job of the commit protocol.
    pub fn append(&self, expense: Expense) -> Self {
        let mut expenses = Vec::with_capacity(self.expenses.len() + 1);
        expenses.extend_from_slice(&self.expenses);
        expenses.push(expense);
        Self {
            schema_version: self.schema_version,
            version: self.version,
            expenses,
        }
    }

    pub fn find_expense(&self, id: ExpenseId) -> Option<&Expense> {
        self.expenses.iter().find(|e| e.id == id)
    }

    /// Every participant referenced as payer or in a split, sorted.
    pub fn participants(&self) -> BTreeSet<&str> {
        let mut participants = BTreeSet::new();
        for expense in &self.expenses {
            participants.insert(expense.payer.as_str());
            for split in &expense.splits {
                participants.insert(split.participant.as_str());
            }
        }
        participants
    }

    /// Structural check run on every load and before every write.
    pub fn verify(&self) -> Result<(), LedgerIntegrityError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(LedgerIntegrityError::UnsupportedSchema(self.schema_version));
        }

        // Every participant's paid and owed totals are bounded by the ledger total,
        // so keeping the total representable keeps every balance representable.
        let mut total: Cents = 0;
        let mut ids = HashSet::with_capacity(self.expenses.len());
        for (index, expense) in self.expenses.iter().enumerate() {
            validate(expense).map_err(|source| LedgerIntegrityError::InvalidExpense {
                index,
                id: expense.id,
                source,
            })?;
            if !ids.insert(expense.id) {
                return Err(LedgerIntegrityError::DuplicateId(expense.id));
            }
            total = total
                .checked_add(expense.amount)
                .ok_or(LedgerIntegrityError::AmountOverflow { index })?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerIntegrityError {
    #[error("Unsupported schema version {0}")]
    UnsupportedSchema(u32),

    #[error("Expense #{index} ({id}) is invalid: {source}")]
    InvalidExpense {
        index: usize,
        id: ExpenseId,
        #[source]
        source: InvalidExpense,
    },

    #[error("Expense id {0} appears more than once")]
    DuplicateId(ExpenseId),

    #[error("Expense #{index} pushes the ledger total past the largest representable amount")]
    AmountOverflow { index: usize },
}

/// Summary produced by the integrity check command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub schema_version: u32,
    pub version: u64,
    pub expense_count: usize,
    pub participant_count: usize,
    pub total_amount: Cents,
    /// Sum of every participant's net balance; anything but zero is a defect
    pub balance_total: Cents,
    pub issues: Vec<String>,
}

impl IntegrityReport {
    pub fn is_ok(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Build an integrity report for a loaded ledger.
pub fn build_integrity_report(state: &LedgerState) -> IntegrityReport {
    let mut issues = Vec::new();

    if let Err(e) = state.verify() {
        issues.push(e.to_string());
    }

    let balances = compute_balances(state);
    let balance_total = balances
        .iter()
        .fold(0, |sum: Cents, b| sum.saturating_add(b.net));
    if balance_total != 0 {
        issues.push(format!("Balances sum to {} instead of zero", balance_total));
    }

    if state.version < state.expenses.len() as u64 {
        issues.push(format!(
            "Version {} is lower than the number of expenses ({})",
            state.version,
            state.expenses.len()
        ));
    }

    IntegrityReport {
        schema_version: state.schema_version,
        version: state.version,
        expense_count: state.expenses.len(),
        participant_count: state.participants().len(),
        total_amount: state
            .expenses
            .iter()
            .fold(0, |sum: Cents, e| sum.saturating_add(e.amount)),
        balance_total,
        issues,
    }
}

use thiserror::Error;

use crate::domain::{ExpenseId, InvalidExpense, LedgerIntegrityError};
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid expense: {0}")]
    InvalidExpense(#[from] InvalidExpense),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Expense not found: {0}")]
    ExpenseNotFound(ExpenseId),

    #[error("Ledger data is corrupt: {0}")]
    CorruptState(String),

    #[error("Ledger is busy, gave up after {attempts} attempts: {last}")]
    Overloaded { attempts: u32, last: String },

    #[error("Ledger storage is unreachable: {0}")]
    StorageUnreachable(String),

    #[error("Ledger rejected the update: {0}")]
    Rejected(String),
}

impl AppError {
    /// Errors caused by the caller's input rather than the ledger's condition.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::InvalidExpense(_) | AppError::InvalidRequest(_) | AppError::ExpenseNotFound(_)
        )
    }
}

impl From<StorageError> for AppError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::CorruptState { .. } => AppError::CorruptState(error.to_string()),
            StorageError::StorageUnreachable { .. } => {
                AppError::StorageUnreachable(error.to_string())
            }
            StorageError::LockTimeout { .. }
            | StorageError::VersionConflict { .. }
            | StorageError::LeaseLost => AppError::Overloaded {
                attempts: 1,
                last: error.to_string(),
            },
            StorageError::Rejected(LedgerIntegrityError::AmountOverflow { .. }) => {
                AppError::InvalidRequest(error.to_string())
            }
            StorageError::Rejected(_) | StorageError::Encode(_) => {
                AppError::Rejected(error.to_string())
            }
        }
    }
}

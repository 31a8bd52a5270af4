use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::Cents;

pub type ExpenseId = Uuid;

/// Participants are identified by an opaque, non-empty name.
pub type ParticipantId = String;

/// The share of one expense owed by a single participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub participant: ParticipantId,
    /// Amount in cents (always positive)
    pub owed_amount: Cents,
}

impl Split {
    pub fn new(participant: impl Into<ParticipantId>, owed_amount: Cents) -> Self {
        Self {
            participant: participant.into(),
            owed_amount,
        }
    }
}

/// An expense records money advanced by one participant on behalf of several.
/// Expenses are immutable - corrections are made via new offsetting expenses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    /// Human-readable description
    pub description: String,
    /// Amount in cents (always positive)
    pub amount: Cents,
    /// Who advanced the money
    pub payer: ParticipantId,
    /// Who owes what; sums to `amount` exactly
    pub splits: Vec<Split>,
    /// When the expense was recorded in the ledger
    pub created_at: DateTime<Utc>,
}

/// How an expense's amount is divided among participants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shares {
    /// Explicit per-participant amounts.
    Exact(Vec<Split>),
    /// Divide equally among the listed participants, remainder to the first ones.
    Equal(Vec<ParticipantId>),
}

/// Input for recording a new expense, before an id and timestamp are assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewExpense {
    pub description: String,
    pub amount: Cents,
    pub payer: ParticipantId,
    pub shares: Shares,
}

impl NewExpense {
    pub fn exact(
        description: impl Into<String>,
        amount: Cents,
        payer: impl Into<ParticipantId>,
        splits: Vec<Split>,
    ) -> Self {
        Self {
            description: description.into(),
            amount,
            payer: payer.into(),
            shares: Shares::Exact(splits),
        }
    }

    pub fn equal(
        description: impl Into<String>,
        amount: Cents,
        payer: impl Into<ParticipantId>,
        participants: Vec<ParticipantId>,
    ) -> Self {
        Self {
            description: description.into(),
            amount,
            payer: payer.into(),
            shares: Shares::Equal(participants),
        }
    }
}

impl Expense {
    /// Turn a command input into a validated expense with a fresh id and timestamp.
    pub fn record(input: NewExpense) -> Result<Self, InvalidExpense> {
        let splits = match input.shares {
            Shares::Exact(splits) => splits,
            Shares::Equal(participants) => equal_split(input.amount, &participants)?,
        };

        let expense = Self {
            id: Uuid::new_v4(),
            description: input.description,
            amount: input.amount,
            payer: input.payer,
            splits,
            created_at: Utc::now(),
        };
        validate(&expense)?;
        Ok(expense)
    }

    /// Returns true if the participant paid for or owes part of this expense.
    pub fn involves(&self, participant: &str) -> bool {
        self.payer == participant || self.splits.iter().any(|s| s.participant == participant)
    }

    /// Sum of all split amounts.
    pub fn split_total(&self) -> Cents {
        self.splits.iter().map(|s| s.owed_amount).sum()
    }
}

/// Split `amount` equally across `participants`.
///
/// When the amount does not divide evenly, the first `amount % n` participants
/// (in listed order) each carry one extra minor unit.
pub fn equal_split(amount: Cents, participants: &[ParticipantId]) -> Result<Vec<Split>, InvalidExpense> {
    if participants.is_empty() {
        return Err(InvalidExpense::NoSplits);
    }
    if amount <= 0 {
        return Err(InvalidExpense::NonPositiveAmount(amount));
    }

    let n = participants.len() as Cents;
    let base = amount / n;
    let remainder = amount % n;

    Ok(participants
        .iter()
        .enumerate()
        .map(|(i, participant)| {
            let extra = if (i as Cents) < remainder { 1 } else { 0 };
            Split::new(participant.clone(), base + extra)
        })
        .collect())
}

/// Check every structural rule of an expense. Pure, no side effects.
pub fn validate(expense: &Expense) -> Result<(), InvalidExpense> {
    if expense.amount <= 0 {
        return Err(InvalidExpense::NonPositiveAmount(expense.amount));
    }
    if expense.payer.trim().is_empty() {
        return Err(InvalidExpense::EmptyPayer);
    }
    if expense.splits.is_empty() {
        return Err(InvalidExpense::NoSplits);
    }

    let mut seen = HashSet::new();
    let mut total: Cents = 0;
    for split in &expense.splits {
        if split.participant.trim().is_empty() {
            return Err(InvalidExpense::EmptyParticipant);
        }
        if split.owed_amount <= 0 {
            return Err(InvalidExpense::NonPositiveShare {
                participant: split.participant.clone(),
                owed_amount: split.owed_amount,
            });
        }
        if !seen.insert(split.participant.as_str()) {
            return Err(InvalidExpense::DuplicateParticipant(split.participant.clone()));
        }
        total = total
            .checked_add(split.owed_amount)
            .ok_or(InvalidExpense::SplitSumMismatch {
                amount: expense.amount,
                split_total: Cents::MAX,
            })?;
    }

    if total != expense.amount {
        return Err(InvalidExpense::SplitSumMismatch {
            amount: expense.amount,
            split_total: total,
        });
    }

    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidExpense {
    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(Cents),

    #[error("Payer must not be empty")]
    EmptyPayer,

    #[error("Expense must have at least one split")]
    NoSplits,

    #[error("Split participant must not be empty")]
    EmptyParticipant,

    #[error("Share owed by {participant} must be positive, got {owed_amount}")]
    NonPositiveShare {
        participant: ParticipantId,
        owed_amount: Cents,
    },

    #[error("Participant {0} appears more than once in the splits")]
    DuplicateParticipant(ParticipantId),

    #[error("Splits sum to {split_total} but the amount is {amount}")]
    SplitSumMismatch { amount: Cents, split_total: Cents },
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Cents, LedgerState, ParticipantId};

/// Net position of one participant across the whole ledger.
/// Positive `net` means the participant is owed money; negative means they owe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub participant: ParticipantId,
    /// Total advanced as payer
    pub paid: Cents,
    /// Total of the participant's own shares
    pub owed: Cents,
    pub net: Cents,
}

/// Compute the balance of every participant ever referenced, sorted by participant.
///
/// The payer is credited the full amount and every split participant is debited
/// their share. A payer who also carries a share sees the two cancel out.
///
/// Totals saturate instead of overflowing; a ledger that passes
/// [`LedgerState::verify`] never gets near the limit.
pub fn compute_balances(state: &LedgerState) -> Vec<Balance> {
    let mut totals: BTreeMap<&str, (Cents, Cents)> = BTreeMap::new();

    for expense in &state.expenses {
        let paid = &mut totals.entry(expense.payer.as_str()).or_default().0;
        *paid = paid.saturating_add(expense.amount);
        for split in &expense.splits {
            let owed = &mut totals.entry(split.participant.as_str()).or_default().1;
            *owed = owed.saturating_add(split.owed_amount);
        }
    }

    totals
        .into_iter()
        .map(|(participant, (paid, owed))| Balance {
            participant: participant.to_string(),
            paid,
            owed,
            net: paid.saturating_sub(owed),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Expense, NewExpense, Split};

    fn exact(amount: Cents, payer: &str, splits: &[(&str, Cents)]) -> Expense {
        Expense::record(NewExpense::exact(
            "test",
            amount,
            payer,
            splits.iter().map(|(p, a)| Split::new(*p, *a)).collect(),
        ))
        .unwrap()
    }

    fn nets(balances: &[Balance]) -> Vec<(&str, Cents)> {
        balances
            .iter()
            .map(|b| (b.participant.as_str(), b.net))
            .collect()
    }

    #[test]
    fn test_empty_ledger_has_no_balances() {
        assert!(compute_balances(&LedgerState::empty()).is_empty());
    }

    #[test]
    fn test_dinner_and_taxi_scenario() {
        let state = LedgerState::empty()
            .append(exact(90, "A", &[("A", 30), ("B", 30), ("C", 30)]))
            .append(exact(60, "B", &[("A", 20), ("B", 20), ("C", 20)]));

        let balances = compute_balances(&state);

        assert_eq!(nets(&balances), vec![("A", 40), ("B", 10), ("C", -50)]);
        assert_eq!(balances[0].paid, 90);
        assert_eq!(balances[0].owed, 50);
        assert_eq!(balances.iter().map(|b| b.net).sum::<Cents>(), 0);
    }

    #[test]
    fn test_payer_outside_splits() {
        let state = LedgerState::empty().append(exact(100, "A", &[("B", 60), ("C", 40)]));

        assert_eq!(
            nets(&compute_balances(&state)),
            vec![("A", 100), ("B", -60), ("C", -40)]
        );
    }

    #[test]
    fn test_payer_covering_only_themselves_nets_to_zero() {
        let state = LedgerState::empty().append(exact(500, "A", &[("A", 500)]));

        assert_eq!(nets(&compute_balances(&state)), vec![("A", 0)]);
    }

    #[test]
    fn test_balances_sum_to_zero_with_uneven_equal_splits() {
        let participants = |list: &[&str]| -> Vec<ParticipantId> {
            list.iter().map(|p| p.to_string()).collect()
        };
        let record = |description: &str, amount: Cents, payer: &str, among: &[&str]| {
            Expense::record(NewExpense::equal(description, amount, payer, participants(among)))
                .unwrap()
        };
        let state = LedgerState::empty()
            .append(record("a", 100, "A", &["A", "B", "C"]))
            .append(record("b", 101, "C", &["B", "C", "D"]))
            .append(record("c", 7, "D", &["A", "D"]));

        let total: Cents = compute_balances(&state).iter().map(|b| b.net).sum();
        assert_eq!(total, 0, "All balances must sum to zero (closed system)");
    }

    #[test]
    fn test_largest_representable_ledger_balances_exactly() {
        let huge = 4_000_000_000_000_000_000;
        let state = LedgerState::empty()
            .append(exact(huge, "A", &[("B", huge)]))
            .append(exact(huge, "B", &[("A", huge / 2), ("C", huge / 2)]));
        assert!(state.verify().is_ok());

        assert_eq!(
            nets(&compute_balances(&state)),
            vec![("A", huge / 2), ("B", 0), ("C", -huge / 2)]
        );
    }

    #[test]
    fn test_unverified_overflowing_ledger_does_not_panic() {
        let huge = 5_000_000_000_000_000_000;
        let state = LedgerState::empty()
            .append(exact(huge, "A", &[("B", huge)]))
            .append(exact(huge, "A", &[("B", huge)]));

        let balances = compute_balances(&state);
        assert_eq!(balances[0].paid, Cents::MAX);
        assert_eq!(balances[1].net, -Cents::MAX);
    }
}

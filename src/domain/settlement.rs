use std::cmp::Reverse;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use super::{Balance, Cents, ParticipantId};

/// A single transfer that moves money from a debtor to a creditor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub from: ParticipantId,
    pub to: ParticipantId,
    pub amount: Cents,
}

/// Build a settlement plan that zeroes every balance.
///
/// Greedy: the largest creditor is repeatedly matched against the largest debtor
/// and the smaller of the two amounts changes hands. The plan has at most
/// `participants - 1` transfers but is not guaranteed to be the shortest possible
/// plan for every input. Ties are broken by participant name so the result is
/// deterministic.
pub fn settlement_plan(balances: &[Balance]) -> Vec<Settlement> {
    let mut creditors: BinaryHeap<(Cents, Reverse<&str>)> = BinaryHeap::new();
    let mut debtors: BinaryHeap<(Cents, Reverse<&str>)> = BinaryHeap::new();

    for balance in balances {
        if balance.net > 0 {
            creditors.push((balance.net, Reverse(balance.participant.as_str())));
        } else if balance.net < 0 {
            debtors.push((balance.net.saturating_neg(), Reverse(balance.participant.as_str())));
        }
    }

    let mut plan = Vec::new();
    while let (Some((credit, Reverse(creditor))), Some((debt, Reverse(debtor)))) =
        (creditors.pop(), debtors.pop())
    {
        let amount = credit.min(debt);
        plan.push(Settlement {
            from: debtor.to_string(),
            to: creditor.to_string(),
            amount,
        });

        if credit > amount {
            creditors.push((credit - amount, Reverse(creditor)));
        }
        if debt > amount {
            debtors.push((debt - amount, Reverse(debtor)));
        }
    }

    plan
}

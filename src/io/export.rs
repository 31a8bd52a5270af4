use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::application::LedgerService;
use crate::domain::{Balance, LedgerState, Settlement, compute_balances, settlement_plan};

/// Full ledger snapshot for JSON export, with derived views alongside.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub exporter_version: String,
    pub exported_at: DateTime<Utc>,
    pub ledger: LedgerState,
    pub balances: Vec<Balance>,
    pub settlements: Vec<Settlement>,
}

/// Exporter for converting ledger data to various formats.
///
/// Every export reads the ledger once, so the output reflects a single commit.
pub struct Exporter<'a> {
    service: &'a LedgerService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    /// Export expenses to CSV, one row per expense with splits as `name:amount;...`.
    pub async fn export_expenses_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let state = self.service.snapshot().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "created_at",
            "description",
            "amount",
            "payer",
            "splits",
        ])?;

        for expense in &state.expenses {
            let splits = expense
                .splits
                .iter()
                .map(|s| format!("{}:{}", s.participant, s.owed_amount))
                .collect::<Vec<_>>()
                .join(";");

            csv_writer.write_record([
                expense.id.to_string(),
                expense.created_at.to_rfc3339(),
                expense.description.clone(),
                expense.amount.to_string(),
                expense.payer.clone(),
                splits,
            ])?;
        }

        csv_writer.flush()?;
        Ok(state.expenses.len())
    }

    /// Export balances to CSV format
    pub async fn export_balances_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let balances = self.service.get_balances().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["participant", "paid", "owed", "net"])?;
        for balance in &balances {
            csv_writer.write_record([
                balance.participant.clone(),
                balance.paid.to_string(),
                balance.owed.to_string(),
                balance.net.to_string(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(balances.len())
    }

    /// Export the settlement plan to CSV format
    pub async fn export_settlements_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let plan = self.service.settlement_plan().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["from", "to", "amount"])?;
        for settlement in &plan {
            csv_writer.write_record([
                settlement.from.clone(),
                settlement.to.clone(),
                settlement.amount.to_string(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(plan.len())
    }

    /// Export the full ledger as a JSON snapshot
    pub async fn export_full_json<W: Write>(&self, mut writer: W) -> Result<LedgerSnapshot> {
        let ledger = self.service.snapshot().await?;
        let balances = compute_balances(&ledger);
        let settlements = settlement_plan(&balances);

        let snapshot = LedgerSnapshot {
            exporter_version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            ledger,
            balances,
            settlements,
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(snapshot)
    }
}

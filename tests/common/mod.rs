// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use splitwise::application::LedgerService;
use splitwise::config::LedgerConfig;
use splitwise::domain::{NewExpense, ParticipantId, Split};
use splitwise::storage::LeaseRecord;
use tempfile::TempDir;
use uuid::Uuid;

/// Config pointing at `dir`, tuned so contended tests finish quickly.
pub fn test_config(dir: &TempDir) -> LedgerConfig {
    LedgerConfig::new(dir.path())
        .with_lock_timeout(Duration::from_secs(10))
        .with_backoff(Duration::from_millis(2), Duration::from_millis(50))
}

/// Helper to create a test service over a temporary data directory
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let service = LedgerService::open(&test_config(&temp_dir)).await?;
    Ok((service, temp_dir))
}

pub fn names(list: &[&str]) -> Vec<ParticipantId> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Test fixture: two shared expenses among A, B and C.
///
/// A pays 90.00 split 30.00 each; B pays 60.00 split 20.00 each.
/// Nets: A +40.00, B +10.00, C -50.00.
pub async fn seed_shared_expenses(service: &LedgerService) -> Result<()> {
    service
        .add_expense(NewExpense::exact(
            "Dinner",
            9000,
            "A",
            vec![
                Split::new("A", 3000),
                Split::new("B", 3000),
                Split::new("C", 3000),
            ],
        ))
        .await?;
    service
        .add_expense(NewExpense::exact(
            "Taxi",
            6000,
            "B",
            vec![
                Split::new("A", 2000),
                Split::new("B", 2000),
                Split::new("C", 2000),
            ],
        ))
        .await?;
    Ok(())
}

/// Leave a live lease from another replica on the ledger, so every commit blocks.
pub fn hold_foreign_lease(service: &LedgerService) -> Result<()> {
    let now = Utc::now();
    let record = LeaseRecord {
        owner: Uuid::new_v4(),
        token: 1_000,
        acquired_at: now,
        expires_at: now + chrono::Duration::seconds(60),
    };
    std::fs::write(service.store().lease_path(), serde_json::to_vec(&record)?)?;
    Ok(())
}

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};
use uuid::Uuid;

use super::StorageError;
use super::atomic::{sibling, write_atomically};

/// Timing knobs for the cross-process lease.
#[derive(Debug, Clone, Copy)]
pub struct LeaseSettings {
    /// How long a lease stays valid before other processes may reclaim it
    pub ttl: Duration,
    /// Total time a commit may spend waiting, in-process queue included
    pub acquire_timeout: Duration,
    /// Base delay between acquisition attempts (jittered)
    pub poll_interval: Duration,
}

/// Content of the lease file while a writer holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRecord {
    /// Process-level identity of the holder
    pub owner: Uuid,
    /// Fencing token; strictly increases with every acquisition
    pub token: u64,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl LeaseRecord {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// What was found in a lease file.
enum Observed {
    Record(LeaseRecord),
    /// Being written by its creator, or garbage left by a crash.
    Unreadable { modified: SystemTime },
}

impl Observed {
    fn is_stale(&self, ttl: Duration) -> bool {
        match self {
            Observed::Record(record) => record.is_expired(),
            Observed::Unreadable { modified } => older_than(*modified, ttl),
        }
    }

    fn describe(&self) -> String {
        match self {
            Observed::Record(r) => format!("owner {} token {}", r.owner, r.token),
            Observed::Unreadable { .. } => "unreadable lease file".to_string(),
        }
    }
}

fn older_than(modified: SystemTime, ttl: Duration) -> bool {
    modified.elapsed().map(|age| age > ttl).unwrap_or(false)
}

/// An exclusive, time-bounded hold on the ledger.
///
/// The lease file is created with exclusive-create semantics so only one process
/// can hold it. A holder that dies leaves the file behind; once it expires any
/// other process may reclaim it.
///
/// Removing the lease file (release or reclaim) happens only under the removal
/// guard, a second exclusive-create file. While the lease file exists nobody can
/// create a new one, so whoever holds the guard removes exactly the lease it
/// inspected and never a live lease that replaced it.
#[derive(Debug)]
pub struct Lease {
    path: PathBuf,
    record: LeaseRecord,
    settings: LeaseSettings,
}

impl Lease {
    /// Wait until the lease is ours, or fail with `LockTimeout` at `deadline`.
    pub async fn acquire(
        path: &Path,
        fence_path: &Path,
        owner: Uuid,
        settings: &LeaseSettings,
        deadline: Instant,
    ) -> Result<Self, StorageError> {
        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
                .await
            {
                Ok(file) => {
                    return match write_record(file, path, fence_path, owner, settings).await {
                        Ok(record) => {
                            debug!(token = record.token, "Acquired ledger lease");
                            Ok(Self {
                                path: path.to_path_buf(),
                                record,
                                settings: *settings,
                            })
                        }
                        Err(e) => {
                            let _ = fs::remove_file(path).await;
                            Err(e)
                        }
                    };
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if reclaim_if_stale(path, settings, deadline).await? {
                        continue;
                    }
                }
                Err(e) => return Err(StorageError::unreachable(path, e)),
            }

            pause_until(settings, deadline).await?;
        }
    }

    pub fn token(&self) -> u64 {
        self.record.token
    }

    /// Confirm the lease file still carries our token and has not expired.
    /// Called right before the commit becomes visible.
    pub async fn ensure_held(&self) -> Result<(), StorageError> {
        match read_observed(&self.path).await? {
            Some(Observed::Record(current))
                if self.is_same_hold(&current) && !current.is_expired() =>
            {
                Ok(())
            }
            _ => Err(StorageError::LeaseLost),
        }
    }

    /// Give the lease up. A lease that was already taken over is left alone.
    pub async fn release(self) -> Result<(), StorageError> {
        let deadline = Instant::now() + self.settings.acquire_timeout;
        let guard = RemovalGuard::acquire(&self.path, &self.settings, deadline).await?;
        let outcome = self.remove_if_ours().await;
        guard.release().await;
        outcome
    }

    async fn remove_if_ours(&self) -> Result<(), StorageError> {
        match read_observed(&self.path).await? {
            Some(Observed::Record(current)) if self.is_same_hold(&current) => {
                match fs::remove_file(&self.path).await {
                    Ok(()) => {
                        debug!(token = self.record.token, "Released ledger lease");
                        Ok(())
                    }
                    Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(StorageError::unreachable(&self.path, e)),
                }
            }
            other => {
                warn!(
                    token = self.record.token,
                    found = %other.map(|o| o.describe()).unwrap_or_else(|| "nothing".into()),
                    "Ledger lease was taken over before release"
                );
                Ok(())
            }
        }
    }

    fn is_same_hold(&self, other: &LeaseRecord) -> bool {
        other.owner == self.record.owner && other.token == self.record.token
    }
}

/// Read the current lease record, if any, without taking it.
pub async fn read_lease(path: &Path) -> Result<Option<LeaseRecord>, StorageError> {
    Ok(match read_observed(path).await? {
        Some(Observed::Record(record)) => Some(record),
        _ => None,
    })
}

/// Exclusive right to delete the lease file, held only for a read and an unlink.
struct RemovalGuard {
    path: PathBuf,
}

impl RemovalGuard {
    async fn acquire(
        lease_path: &Path,
        settings: &LeaseSettings,
        deadline: Instant,
    ) -> Result<Self, StorageError> {
        let path = sibling(lease_path, "guard");
        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    // A guard outlives its critical section only if its holder crashed.
                    let abandoned = fs::metadata(&path)
                        .await
                        .and_then(|m| m.modified())
                        .is_ok_and(|modified| older_than(modified, settings.ttl));
                    if abandoned {
                        warn!(guard = %path.display(), "Removing abandoned lease guard");
                        let _ = fs::remove_file(&path).await;
                        continue;
                    }
                }
                Err(e) => return Err(StorageError::unreachable(&path, e)),
            }

            pause_until(settings, deadline).await?;
        }
    }

    async fn release(self) {
        if let Err(e) = fs::remove_file(&self.path).await {
            warn!(error = %e, guard = %self.path.display(), "Failed to remove lease guard");
        }
    }
}

/// Sleep one jittered poll interval, or fail once `deadline` has passed.
async fn pause_until(settings: &LeaseSettings, deadline: Instant) -> Result<(), StorageError> {
    let now = Instant::now();
    if now >= deadline {
        return Err(StorageError::LockTimeout {
            waited: settings.acquire_timeout,
        });
    }
    sleep(jittered(settings.poll_interval).min(deadline - now)).await;
    Ok(())
}

async fn write_record(
    mut file: fs::File,
    path: &Path,
    fence_path: &Path,
    owner: Uuid,
    settings: &LeaseSettings,
) -> Result<LeaseRecord, StorageError> {
    let token = next_fence_token(fence_path).await?;
    let acquired_at = Utc::now();
    let ttl = chrono::Duration::from_std(settings.ttl).unwrap_or_else(|_| chrono::Duration::days(1));
    let record = LeaseRecord {
        owner,
        token,
        acquired_at,
        expires_at: acquired_at + ttl,
    };

    let bytes = serde_json::to_vec(&record)?;
    file.write_all(&bytes)
        .await
        .map_err(|e| StorageError::unreachable(path, e))?;
    file.sync_all()
        .await
        .map_err(|e| StorageError::unreachable(path, e))?;
    Ok(record)
}

/// Bump the persisted fencing counter. Only called while holding the lease file.
async fn next_fence_token(fence_path: &Path) -> Result<u64, StorageError> {
    let previous = match fs::read_to_string(fence_path).await {
        Ok(content) => match content.trim().parse::<u64>() {
            Ok(value) => value,
            Err(_) => {
                // Jump ahead of any counter we could have written before.
                warn!(path = %fence_path.display(), "Unreadable lease fence, restarting from clock");
                Utc::now().timestamp_millis().max(0) as u64
            }
        },
        Err(e) if e.kind() == ErrorKind::NotFound => 0,
        Err(e) => return Err(StorageError::unreachable(fence_path, e)),
    };

    let token = previous + 1;
    write_atomically(fence_path, token.to_string().as_bytes())
        .await
        .map_err(|e| StorageError::unreachable(fence_path, e))?;
    Ok(token)
}

async fn read_observed(path: &Path) -> Result<Option<Observed>, StorageError> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StorageError::unreachable(path, e)),
    };

    if let Ok(record) = serde_json::from_slice::<LeaseRecord>(&bytes) {
        return Ok(Some(Observed::Record(record)));
    }

    let metadata = match fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StorageError::unreachable(path, e)),
    };
    let modified = metadata
        .modified()
        .map_err(|e| StorageError::unreachable(path, e))?;
    Ok(Some(Observed::Unreadable { modified }))
}

/// Delete an expired lease so the slot can be taken again.
///
/// Returns `true` when the slot may now be free. The staleness check is repeated
/// under the removal guard, so the file deleted is the one found stale.
async fn reclaim_if_stale(
    path: &Path,
    settings: &LeaseSettings,
    deadline: Instant,
) -> Result<bool, StorageError> {
    match read_observed(path).await? {
        None => return Ok(true),
        Some(observed) if !observed.is_stale(settings.ttl) => return Ok(false),
        Some(_) => {}
    }

    let guard = RemovalGuard::acquire(path, settings, deadline).await?;
    let outcome = remove_if_stale(path, settings.ttl).await;
    guard.release().await;
    outcome
}

async fn remove_if_stale(path: &Path, ttl: Duration) -> Result<bool, StorageError> {
    let observed = match read_observed(path).await? {
        None => return Ok(true),
        Some(observed) if !observed.is_stale(ttl) => return Ok(false),
        Some(observed) => observed,
    };

    match fs::remove_file(path).await {
        Ok(()) => {
            warn!(
                lease = %path.display(),
                previous = %observed.describe(),
                "Reclaimed expired ledger lease"
            );
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
        Err(e) => Err(StorageError::unreachable(path, e)),
    }
}

fn jittered(base: Duration) -> Duration {
    let micros = base.as_micros().min(u64::MAX as u128) as u64;
    if micros == 0 {
        return base;
    }
    let spread = rand::thread_rng().gen_range(micros / 2..=micros + micros / 2);
    Duration::from_micros(spread)
}

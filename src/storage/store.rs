use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::LedgerConfig;
use crate::domain::{Expense, LedgerState, SCHEMA_VERSION};

use super::StorageError;
use super::atomic::{self, sibling};
use super::lease::{Lease, LeaseRecord, LeaseSettings, read_lease};

/// On-disk shape of the ledger: the state, the lease token of the commit that
/// wrote it, and a checksum over both.
#[derive(Debug, Serialize, Deserialize)]
struct LedgerDocument {
    schema_version: u32,
    version: u64,
    fence_token: u64,
    expenses: Vec<Expense>,
    checksum: String,
}

/// The part of the document the checksum covers.
#[derive(Serialize)]
struct ChecksumInput<'a> {
    schema_version: u32,
    version: u64,
    fence_token: u64,
    expenses: &'a [Expense],
}

fn checksum(
    schema_version: u32,
    version: u64,
    fence_token: u64,
    expenses: &[Expense],
) -> Result<String, serde_json::Error> {
    let canonical = serde_json::to_vec(&ChecksumInput {
        schema_version,
        version,
        fence_token,
        expenses,
    })?;
    Ok(hex::encode(Sha256::digest(&canonical)))
}

/// Serialize a state into the persisted document format, stamped with the
/// fencing token of the lease it is committed under.
pub fn encode_state(state: &LedgerState, fence_token: u64) -> Result<Vec<u8>, StorageError> {
    let document = LedgerDocument {
        schema_version: state.schema_version,
        version: state.version,
        fence_token,
        expenses: state.expenses.clone(),
        checksum: checksum(
            state.schema_version,
            state.version,
            fence_token,
            &state.expenses,
        )?,
    };
    let mut bytes = serde_json::to_vec_pretty(&document)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Parse and verify a persisted document. `path` is only used for error reporting.
pub fn decode_state(bytes: &[u8], path: &Path) -> Result<LedgerState, StorageError> {
    decode_document(bytes, path).map(|(state, _)| state)
}

/// Like [`decode_state`], also returning the fencing token the document was written with.
fn decode_document(bytes: &[u8], path: &Path) -> Result<(LedgerState, u64), StorageError> {
    let document: LedgerDocument = serde_json::from_slice(bytes)
        .map_err(|e| StorageError::corrupt(path, format!("unparseable document: {}", e)))?;

    let expected = checksum(
        document.schema_version,
        document.version,
        document.fence_token,
        &document.expenses,
    )?;
    if expected != document.checksum {
        return Err(StorageError::corrupt(
            path,
            format!(
                "checksum mismatch (stored {}, computed {})",
                document.checksum, expected
            ),
        ));
    }

    let state = LedgerState {
        schema_version: document.schema_version,
        version: document.version,
        expenses: document.expenses,
    };
    state
        .verify()
        .map_err(|e| StorageError::corrupt(path, e.to_string()))?;
    Ok((state, document.fence_token))
}

/// Owns the ledger file on the shared volume.
///
/// Readers call [`LedgerStore::load`] without any locking: the file is only ever
/// replaced by an atomic rename, so a load observes some completed commit.
/// Writers go through [`LedgerStore::commit`], which serializes them first within
/// the process and then across processes via a lease file.
pub struct LedgerStore {
    data_dir: PathBuf,
    data_path: PathBuf,
    lease_path: PathBuf,
    fence_path: PathBuf,
    lease: LeaseSettings,
    holder: Uuid,
    commit_gate: Mutex<()>,
}

impl LedgerStore {
    pub fn new(config: &LedgerConfig) -> Self {
        let data_path = config.data_path();
        Self {
            data_dir: config.data_dir.clone(),
            lease_path: sibling(&data_path, "lease"),
            fence_path: sibling(&data_path, "fence"),
            data_path,
            lease: LeaseSettings {
                ttl: config.lease_ttl,
                acquire_timeout: config.lock_timeout,
                poll_interval: config.lock_poll_interval,
            },
            holder: Uuid::new_v4(),
            commit_gate: Mutex::new(()),
        }
    }

    /// Create the data directory if needed and return a store for it.
    pub async fn open(config: &LedgerConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(&config.data_dir)
            .await
            .map_err(|e| StorageError::unreachable(&config.data_dir, e))?;
        let store = Self::new(config);
        info!(
            path = %store.data_path.display(),
            holder = %store.holder,
            "Opened ledger store"
        );
        Ok(store)
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn lease_path(&self) -> &Path {
        &self.lease_path
    }

    /// Identity this process uses when holding the lease.
    pub fn holder(&self) -> Uuid {
        self.holder
    }

    /// Read the current ledger. A missing file is an empty ledger; a damaged one
    /// is reported as corrupt and left exactly as found.
    pub async fn load(&self) -> Result<LedgerState, StorageError> {
        self.load_document().await.map(|(state, _)| state)
    }

    async fn load_document(&self) -> Result<(LedgerState, u64), StorageError> {
        let bytes = match fs::read(&self.data_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok((LedgerState::empty(), 0)),
            Err(e) => return Err(StorageError::unreachable(&self.data_path, e)),
        };

        decode_document(&bytes, &self.data_path).inspect_err(|e| {
            if let StorageError::CorruptState { reason, .. } = e {
                warn!(path = %self.data_path.display(), %reason, "Ledger file failed verification");
            }
        })
    }

    /// Apply `mutate` to the current ledger and persist the result as version
    /// `base_version + 1`.
    ///
    /// Fails with [`StorageError::VersionConflict`] if someone else committed after
    /// the caller loaded `base_version`; the caller should reload and retry.
    /// Waiting for the in-process gate and for the lease together never exceeds
    /// the configured lock timeout. Nothing is written unless the whole commit
    /// succeeds.
    pub async fn commit<F>(&self, base_version: u64, mutate: F) -> Result<LedgerState, StorageError>
    where
        F: FnOnce(&LedgerState) -> LedgerState,
    {
        let deadline = Instant::now() + self.lease.acquire_timeout;
        let _gate = timeout_at(deadline, self.commit_gate.lock())
            .await
            .map_err(|_| StorageError::LockTimeout {
                waited: self.lease.acquire_timeout,
            })?;
        let lease = Lease::acquire(
            &self.lease_path,
            &self.fence_path,
            self.holder,
            &self.lease,
            deadline,
        )
        .await?;

        let outcome = self.commit_under_lease(&lease, base_version, mutate).await;

        if let Err(e) = lease.release().await {
            warn!(error = %e, "Failed to release ledger lease");
        }
        outcome
    }

    async fn commit_under_lease<F>(
        &self,
        lease: &Lease,
        base_version: u64,
        mutate: F,
    ) -> Result<LedgerState, StorageError>
    where
        F: FnOnce(&LedgerState) -> LedgerState,
    {
        let (current, written_with) = self.load_document().await?;
        if written_with > lease.token() {
            warn!(
                ours = lease.token(),
                found = written_with,
                "Ledger was written under a newer lease, aborting commit"
            );
            return Err(StorageError::LeaseLost);
        }
        if current.version != base_version {
            debug!(
                expected = base_version,
                found = current.version,
                "Ledger version moved, rejecting commit"
            );
            return Err(StorageError::VersionConflict {
                expected: base_version,
                found: current.version,
            });
        }

        let mut next = mutate(&current);
        next.schema_version = SCHEMA_VERSION;
        next.version = base_version + 1;
        next.verify()?;

        let temp = self.write_temp(&next, lease.token()).await?;
        if let Err(e) = self.confirm_still_ours(lease, base_version).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e);
        }
        atomic::replace(&temp, &self.data_path)
            .await
            .map_err(|e| StorageError::unreachable(&self.data_path, e))?;

        info!(
            version = next.version,
            expenses = next.expenses.len(),
            token = lease.token(),
            "Committed ledger"
        );

        match atomic::sweep_orphaned_temps(&self.data_path, self.lease.ttl).await {
            Ok(0) => {}
            Ok(removed) => info!(removed, "Removed orphaned ledger temp files"),
            Err(e) => debug!(error = %e, "Skipped temp file sweep"),
        }

        Ok(next)
    }

    /// Last check before publishing: the lease is still ours and nobody has
    /// written the ledger since it was reloaded.
    async fn confirm_still_ours(&self, lease: &Lease, base_version: u64) -> Result<(), StorageError> {
        lease.ensure_held().await?;
        let (latest, written_with) = self.load_document().await?;
        if latest.version != base_version || written_with > lease.token() {
            warn!(
                version = latest.version,
                found = written_with,
                "Ledger moved while the commit was being written"
            );
            return Err(StorageError::LeaseLost);
        }
        Ok(())
    }

    /// Durably write `state` to a temp file beside the ledger without publishing it.
    pub(crate) async fn write_temp(
        &self,
        state: &LedgerState,
        fence_token: u64,
    ) -> Result<PathBuf, StorageError> {
        let bytes = encode_state(state, fence_token)?;
        atomic::write_temp(&self.data_path, &bytes)
            .await
            .map_err(|e| StorageError::unreachable(&self.data_path, e))
    }

    /// Check that the data directory exists and accepts writes.
    /// Never waits on the lease, so a busy writer elsewhere does not make us unready.
    pub async fn health_check(&self) -> Result<(), StorageError> {
        let metadata = fs::metadata(&self.data_dir)
            .await
            .map_err(|e| StorageError::unreachable(&self.data_dir, e))?;
        if !metadata.is_dir() {
            return Err(StorageError::unreachable(
                &self.data_dir,
                io::Error::other("data path is not a directory"),
            ));
        }

        let marker = sibling(&self.data_path, &format!("ready-{}", Uuid::new_v4().simple()));
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&marker)
            .await
            .map_err(|e| StorageError::unreachable(&self.data_dir, e))?;
        let written = file.write_all(b"ok").await;
        drop(file);
        let removed = fs::remove_file(&marker).await;

        written
            .and(removed)
            .map_err(|e| StorageError::unreachable(&self.data_dir, e))
    }

    /// The lease currently sitting on the ledger, if any.
    pub async fn current_lease(&self) -> Result<Option<LeaseRecord>, StorageError> {
        read_lease(&self.lease_path).await
    }
}

//! Pointer-addressed operation history with undo/redo.
//!
//! ## Architecture
//!
//! ```text
//!   ┌───────────────────────────────────────────────────────────────┐
//!   │                        OperationLog                           │
//!   │                                                               │
//!   │   versions: Vec<VersionId>                                    │
//!   │     [v0] [v1] [v2] [v3]                                       │
//!   │                 ▲                                             │
//!   │              current (pinned in records)                      │
//!   │                                                               │
//!   │   records: BoundedCache<OperationRecord>                      │
//!   │     v0 ─► { forward, revert }   (evictable)                   │
//!   │     v2 ─► { forward, revert }   (pinned while current)        │
//!   └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Navigation
//!
//! | Call                    | Applies                  | Pointer        |
//! |-------------------------|--------------------------|----------------|
//! | `forward_one_operation` | `versions[i + 1].forward`| `i -> i + 1`   |
//! | `revert_one_operation`  | `versions[i].revert`     | `i -> i - 1`   |
//! | `to_version(t)`         | one step at a time       | `i -> t`       |
//! | `add_operation`         | nothing                  | truncate, push |
//!
//! Reverting at index `0` is a no-op: the first recorded operation marks the
//! start of the reachable history.
//!
//! ## Bounded History
//!
//! Records live in a [`BoundedCache`], so a long session drops its oldest
//! history instead of growing without bound. Ids evicted from the cache are
//! removed from the version list. The record under the pointer is pinned and
//! the pin moves with the pointer, so the current version is never evicted.

use std::fmt;

use uuid::Uuid;

use crate::cache::{BoundedCache, EvictionPolicy};
use crate::error::{InvariantError, VersionError};
use crate::version::operation::{Operation, OperationRecord, VersionId};

/// Ordered history of `(forward, revert)` pairs with a current-version pointer.
///
/// # Example
///
/// ```
/// use kvfacade::cache::EvictionPolicy;
/// use kvfacade::version::{Operation, OperationLog};
/// use serde_json::json;
///
/// let mut log = OperationLog::new(0, EvictionPolicy::Fifo);
/// let first = log.add_operation(Operation::set("k", json!(1)), Some(Operation::delete("k")));
/// let second = log.add_operation(Operation::set("k", json!(2)), Some(Operation::set("k", json!(1))));
///
/// let mut applied = Vec::new();
/// log.to_version::<_, kvfacade::StorageError>(&first, |op| {
///     applied.push(op.clone());
///     Ok(())
/// })
/// .unwrap();
///
/// assert_eq!(applied, vec![Operation::set("k", json!(1))]);
/// assert_eq!(log.current_version(), Some(first.as_str()));
/// assert_eq!(log.versions().len(), 2);
/// # let _ = second;
/// ```
pub struct OperationLog {
    records: BoundedCache<OperationRecord>,
    versions: Vec<VersionId>,
    current: Option<VersionId>,
}

impl OperationLog {
    /// Creates a log whose records may use up to `limit_bytes` (`0` = unbounded).
    pub fn new(limit_bytes: usize, policy: EvictionPolicy) -> Self {
        Self {
            records: BoundedCache::new(limit_bytes, policy),
            versions: Vec::new(),
            current: None,
        }
    }

    pub fn with_megabytes(limit_mb: f64, policy: EvictionPolicy) -> Self {
        Self {
            records: BoundedCache::with_megabytes(limit_mb, policy),
            versions: Vec::new(),
            current: None,
        }
    }

    /// Records a new operation and moves the pointer to it.
    ///
    /// Any versions after the pointer (a redo branch left by earlier undos)
    /// are discarded first.
    pub fn add_operation(&mut self, forward: Operation, revert: Option<Operation>) -> VersionId {
        self.truncate_redo_branch();

        let id = Uuid::new_v4().to_string();
        let record = OperationRecord {
            id: id.clone(),
            forward,
            revert,
        };

        self.move_pointer(id.clone());
        let outcome = self.records.set(id.clone(), record);
        self.versions.push(id.clone());
        self.prune(&outcome.evicted);

        id
    }

    /// Removes the newest record when it is current and moves the pointer
    /// back to the version before it.
    ///
    /// Returns `None`, leaving the log untouched, when the pointer is not at
    /// the tail. A redo branch dropped by the discarded `add_operation` is not
    /// restored.
    pub fn discard_latest(&mut self) -> Option<OperationRecord> {
        let index = self.current_index()?;
        if index + 1 != self.versions.len() {
            return None;
        }

        let id = self.versions.pop()?;
        self.current = None;
        self.records.unpin(&id);
        let record = self.records.delete(&id).ok();
        if let Some(previous) = self.versions.last().cloned() {
            self.move_pointer(previous);
        }

        tracing::debug!(version = %id, "discarded newest operation");
        record
    }

    /// Applies the operation after the pointer and advances to it.
    ///
    /// Returns `Ok(false)` when the pointer is already at the newest version.
    /// The pointer only moves when `apply` succeeds.
    pub fn forward_one_operation<F, E>(&mut self, mut apply: F) -> Result<bool, E>
    where
        F: FnMut(&Operation) -> Result<(), E>,
    {
        let next = self.current_index().map_or(0, |index| index + 1);
        let Some(id) = self.versions.get(next).cloned() else {
            return Ok(false);
        };
        let Some(forward) = self.records.get(&id).map(|record| record.forward.clone()) else {
            return Ok(false);
        };

        apply(&forward)?;
        self.move_pointer(id);
        Ok(true)
    }

    /// Applies the revert of the current version and steps back one version.
    ///
    /// Returns `Ok(false)` when the pointer is null or at the first version.
    /// A record without a revert is stepped over without calling `apply`.
    pub fn revert_one_operation<F, E>(&mut self, mut apply: F) -> Result<bool, E>
    where
        F: FnMut(&Operation) -> Result<(), E>,
    {
        let index = match self.current_index() {
            Some(index) if index > 0 => index,
            _ => return Ok(false),
        };

        let id = &self.versions[index];
        let revert = self.records.get(id).and_then(|record| record.revert.clone());
        if let Some(revert) = revert {
            apply(&revert)?;
        }

        let previous = self.versions[index - 1].clone();
        self.move_pointer(previous);
        Ok(true)
    }

    /// Steps forward or backward one operation at a time until `target` is
    /// current.
    ///
    /// Fails with [`VersionError::UnknownVersion`] if `target` is not in the
    /// version list. A failing `apply` stops the walk at the last version
    /// that was reached.
    pub fn to_version<F, E>(&mut self, target: &str, mut apply: F) -> Result<(), E>
    where
        F: FnMut(&Operation) -> Result<(), E>,
        E: From<VersionError>,
    {
        let target_index = self
            .versions
            .iter()
            .position(|id| id == target)
            .ok_or_else(|| VersionError::UnknownVersion(target.to_string()))?;

        loop {
            let stepped = match self.current_index() {
                Some(index) if index == target_index => return Ok(()),
                Some(index) if index > target_index => self.revert_one_operation(&mut apply)?,
                _ => self.forward_one_operation(&mut apply)?,
            };
            if !stepped {
                return Ok(());
            }
        }
    }

    /// Version ids, oldest first.
    pub fn versions(&self) -> &[VersionId] {
        &self.versions
    }

    pub fn current_version(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Looks up a record without touching eviction order.
    pub fn record(&self, id: &str) -> Option<&OperationRecord> {
        self.records.peek(id)
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Bytes held by stored records.
    pub fn bytes_used(&self) -> usize {
        self.records.bytes_used()
    }

    pub fn bytes_used_human(&self) -> String {
        self.records.bytes_used_human()
    }

    pub fn limit_bytes(&self) -> usize {
        self.records.max_bytes()
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.records.policy()
    }

    /// Drops every record and resets the pointer to null.
    pub fn clear(&mut self) {
        if let Some(current) = self.current.take() {
            self.records.unpin(&current);
        }
        self.records.clear();
        self.versions.clear();
    }

    /// Verifies pointer, version list and record store agree.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        self.records.check_invariants()?;

        if let Some(current) = &self.current {
            if !self.versions.contains(current) {
                return Err(InvariantError::new(format!(
                    "current version {current} is not in the version list"
                )));
            }
            if !self.records.is_pinned(current) {
                return Err(InvariantError::new(format!(
                    "current version {current} is not pinned"
                )));
            }
        } else if !self.versions.is_empty() {
            return Err(InvariantError::new(
                "null pointer with a non-empty version list",
            ));
        }

        if let Some(missing) = self.versions.iter().find(|id| !self.records.contains(id)) {
            return Err(InvariantError::new(format!(
                "version {missing} has no stored record"
            )));
        }
        if self.versions.len() != self.records.len() {
            return Err(InvariantError::new(format!(
                "{} versions but {} stored records",
                self.versions.len(),
                self.records.len()
            )));
        }
        Ok(())
    }

    fn current_index(&self) -> Option<usize> {
        let current = self.current.as_ref()?;
        self.versions.iter().position(|id| id == current)
    }

    fn move_pointer(&mut self, id: VersionId) {
        if let Some(previous) = self.current.take() {
            self.records.unpin(&previous);
        }
        self.records.pin(id.clone());
        self.current = Some(id);
    }

    fn truncate_redo_branch(&mut self) {
        let keep = self.current_index().map_or(0, |index| index + 1);
        if keep >= self.versions.len() {
            return;
        }

        let discarded: Vec<VersionId> = self.versions.drain(keep..).collect();
        for id in &discarded {
            // Already gone if the cache evicted it.
            let _ = self.records.delete(id);
        }
        tracing::debug!(discarded = discarded.len(), "truncated redo branch");
    }

    fn prune(&mut self, evicted: &[VersionId]) {
        if evicted.is_empty() {
            return;
        }
        debug_assert!(
            self.current
                .as_ref()
                .map_or(true, |current| !evicted.contains(current)),
            "current version evicted from the operation log"
        );
        self.versions.retain(|id| !evicted.contains(id));
        tracing::debug!(
            evicted = evicted.len(),
            remaining = self.versions.len(),
            "operation log dropped oldest records"
        );
    }
}

impl Default for OperationLog {
    fn default() -> Self {
        Self::new(0, EvictionPolicy::Fifo)
    }
}

impl fmt::Debug for OperationLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationLog")
            .field("versions", &self.versions.len())
            .field("current", &self.current)
            .field("bytes_used", &self.records.bytes_used())
            .field("limit_bytes", &self.records.max_bytes())
            .finish()
    }
}

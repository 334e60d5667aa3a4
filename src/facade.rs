//! Backend-agnostic key-value facade.
//!
//! ## Architecture
//!
//! ```text
//!   caller ──► SingletonKeyValueStorage
//!                │
//!                │  write verb (set / delete / clean / load / loads)
//!                │    1. compute revert from the live backend
//!                │    2. OperationLog::add_operation(forward, revert)
//!                │    3. apply forward to the Backend (sealed if a cipher is set)
//!                │    4. EventBus::dispatch_event(verb, forward)  ──► slaves
//!                │
//!                │  read verb (exists / keys / get / dumps / dump)
//!                │    backend call, envelope opened if a cipher is set
//!                ▼
//!             Backend  (Memory | Bounded | Custom)
//! ```
//!
//! ## Failure Handling
//!
//! | Surface                         | On error                          |
//! |---------------------------------|-----------------------------------|
//! | write verbs                     | `false`, logged at `warn`         |
//! | read verbs                      | `None` (`false` for `dump`)       |
//! | version navigation              | `Err(StorageError)`               |
//! | re-assigning a slave id         | panic                             |
//!
//! ## Thread Safety
//!
//! The facade is a plain single-owner value. Wrap it with
//! [`into_shared`](SingletonKeyValueStorage::into_shared) to share it across
//! threads; compound sequences still need the caller to hold the lock.

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::builder::StorageBuilder;
use crate::cipher::{self, Cipher};
use crate::error::{Result, StorageError};
use crate::events::EventBus;
use crate::store::{parse_snapshot, Backend, BackendAdapter};
use crate::version::{Operation, OperationLog, Verb, VersionId};

const COMPONENT: &str = "SingletonKeyValueStorage";

/// Verbs mirrored by [`add_slave`](SingletonKeyValueStorage::add_slave) when
/// the caller has no preference.
pub const DEFAULT_SLAVE_VERBS: [Verb; 2] = [Verb::Set, Verb::Delete];

/// Facade shared between threads.
pub type SharedStorage = Arc<Mutex<SingletonKeyValueStorage>>;

/// Receiver of mirrored mutations.
///
/// Each write verb receives the same arguments the facade received. Verbs a
/// replica does not support can keep the default, which refuses the call.
pub trait Slave: Send {
    fn slave_id(&self) -> Option<&str>;

    /// Gives the slave its id. Called once, when the slave has none.
    fn assign_slave_id(&mut self, id: String);

    fn set(&mut self, key: &str, value: Value) -> bool;

    fn delete(&mut self, key: &str) -> bool;

    fn clean(&mut self) -> bool {
        unsupported(Verb::Clean)
    }

    fn load(&mut self, path: &Path) -> bool {
        let _ = path;
        unsupported(Verb::Load)
    }

    fn loads(&mut self, snapshot: &str) -> bool {
        let _ = snapshot;
        unsupported(Verb::Loads)
    }
}

fn unsupported(verb: Verb) -> bool {
    tracing::debug!(verb = verb.as_str(), "slave does not mirror this verb");
    false
}

/// Key-value session bound to one backend, with optional undo/redo history,
/// replication hooks and value encryption.
///
/// # Example
///
/// ```
/// use kvfacade::SingletonKeyValueStorage;
/// use serde_json::json;
///
/// let mut storage = SingletonKeyValueStorage::new();
/// assert!(storage.set("alpha", json!({"n": 1})));
/// let first = storage.current_version().unwrap().to_string();
///
/// assert!(storage.set("alpha", json!({"n": 2})));
/// storage.to_version(&first).unwrap();
/// assert_eq!(storage.get("alpha"), Some(json!({"n": 1})));
///
/// // Deleting a missing key is reported, not raised.
/// assert!(!storage.delete("ghost"));
/// ```
pub struct SingletonKeyValueStorage {
    backend: Backend,
    events: EventBus<Operation>,
    log: OperationLog,
    version_control: bool,
    cipher: Option<Box<dyn Cipher>>,
    slave_id: Option<String>,
}

impl SingletonKeyValueStorage {
    /// Session over an in-memory backend with the default configuration.
    pub fn new() -> Self {
        StorageBuilder::new().build()
    }

    pub fn builder() -> StorageBuilder {
        StorageBuilder::new()
    }

    pub(crate) fn from_parts(
        backend: Backend,
        log: OperationLog,
        version_control: bool,
        cipher: Option<Box<dyn Cipher>>,
    ) -> Self {
        Self {
            backend,
            events: EventBus::new(),
            log,
            version_control,
            cipher,
            slave_id: None,
        }
    }

    // -----------------------------------------------------------------------
    // Write verbs
    // -----------------------------------------------------------------------

    pub fn set(&mut self, key: &str, value: Value) -> bool {
        self.write(Operation::set(key, value))
    }

    pub fn delete(&mut self, key: &str) -> bool {
        self.write(Operation::delete(key))
    }

    pub fn clean(&mut self) -> bool {
        self.write(Operation::Clean)
    }

    /// Merges the snapshot file at `path` into the store.
    pub fn load(&mut self, path: impl AsRef<Path>) -> bool {
        self.write(Operation::Load {
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Merges a JSON object snapshot into the store.
    pub fn loads(&mut self, snapshot: &str) -> bool {
        self.write(Operation::Loads {
            snapshot: snapshot.to_string(),
        })
    }

    /// Decrypts the snapshot at `path` with `cipher` and merges it, recorded
    /// as a `loads`.
    pub fn load_encrypted(&mut self, path: impl AsRef<Path>, cipher: &dyn Cipher) -> bool {
        let plaintext = fs::read_to_string(path.as_ref())
            .map_err(StorageError::from)
            .and_then(|ciphertext| Ok(cipher.decrypt_string(&ciphertext)?));
        match self.report("load_encrypted", plaintext) {
            Some(snapshot) => self.loads(&snapshot),
            None => false,
        }
    }

    // -----------------------------------------------------------------------
    // Read verbs
    // -----------------------------------------------------------------------

    pub fn exists(&self, key: &str) -> Option<bool> {
        self.report("exists", self.backend.exists(key))
    }

    /// Keys matching a shell glob (`*`, `?`).
    pub fn keys(&self, pattern: &str) -> Option<Vec<String>> {
        self.report("keys", self.backend.keys(pattern))
    }

    /// Plaintext value under `key`; `None` if absent or on failure.
    pub fn get(&mut self, key: &str) -> Option<Value> {
        let result = read_plain(&mut self.backend, self.cipher.as_deref(), key);
        self.report("get", result).flatten()
    }

    /// The whole keyspace as one plaintext JSON object.
    pub fn dumps(&mut self) -> Option<String> {
        let result = snapshot_plain(&mut self.backend, self.cipher.as_deref());
        self.report("dumps", result)
    }

    /// Writes [`dumps`](Self::dumps) output to `path`.
    pub fn dump(&mut self, path: impl AsRef<Path>) -> bool {
        let result = snapshot_plain(&mut self.backend, self.cipher.as_deref())
            .and_then(|snapshot| Ok(fs::write(path.as_ref(), snapshot)?));
        self.report("dump", result).is_some()
    }

    /// Writes the snapshot encrypted with `cipher` to `path`.
    pub fn dump_encrypted(&mut self, path: impl AsRef<Path>, cipher: &dyn Cipher) -> bool {
        let result = snapshot_plain(&mut self.backend, self.cipher.as_deref())
            .and_then(|snapshot| Ok(cipher.encrypt_string(&snapshot)?))
            .and_then(|ciphertext| Ok(fs::write(path.as_ref(), ciphertext)?));
        self.report("dump_encrypted", result).is_some()
    }

    // -----------------------------------------------------------------------
    // Version control
    // -----------------------------------------------------------------------

    /// Undoes the current version. `Ok(false)` when there is nothing to undo.
    pub fn revert_one_operation(&mut self) -> Result<bool> {
        let Self {
            backend,
            log,
            cipher,
            ..
        } = self;
        log.revert_one_operation(|op| apply_operation(backend, cipher.as_deref(), op))
    }

    /// Redoes the next version. `Ok(false)` when already at the newest.
    pub fn forward_one_operation(&mut self) -> Result<bool> {
        let Self {
            backend,
            log,
            cipher,
            ..
        } = self;
        log.forward_one_operation(|op| apply_operation(backend, cipher.as_deref(), op))
    }

    /// Walks the history until `version` is current.
    pub fn to_version(&mut self, version: &str) -> Result<()> {
        let Self {
            backend,
            log,
            cipher,
            ..
        } = self;
        log.to_version(version, |op| apply_operation(backend, cipher.as_deref(), op))
    }

    pub fn current_version(&self) -> Option<&str> {
        self.log.current_version()
    }

    /// Recorded version ids, oldest first.
    pub fn versions(&self) -> &[VersionId] {
        self.log.versions()
    }

    pub fn operation_log(&self) -> &OperationLog {
        &self.log
    }

    pub fn version_control(&self) -> bool {
        self.version_control
    }

    // -----------------------------------------------------------------------
    // Events and replication
    // -----------------------------------------------------------------------

    /// Registers `callback` for a verb name and returns the subscriber id.
    pub fn set_event<C>(&mut self, event: &str, callback: C, id: Option<&str>) -> String
    where
        C: FnMut(&Operation) + Send + 'static,
    {
        self.events.set_event(event, callback, id)
    }

    pub fn get_event(&self, id: &str) -> Vec<String> {
        self.events.get_event(id)
    }

    pub fn delete_event(&mut self, id: &str) -> usize {
        self.events.delete_event(id)
    }

    pub fn dispatch_event(&mut self, event: &str, op: &Operation) -> usize {
        self.events.dispatch_event(event, op)
    }

    /// Mirrors every local `verbs` mutation onto `slave`.
    ///
    /// The slave gets a fresh id if it has none; the id is returned and can
    /// be passed to [`delete_slave`](Self::delete_slave).
    pub fn add_slave<S>(&mut self, slave: Arc<Mutex<S>>, verbs: &[Verb]) -> String
    where
        S: Slave + 'static,
    {
        let id = {
            let mut guard = slave.lock();
            let existing = guard.slave_id().map(str::to_string);
            match existing {
                Some(id) => id,
                None => {
                    let id = Uuid::new_v4().to_string();
                    guard.assign_slave_id(id.clone());
                    id
                },
            }
        };

        for verb in verbs {
            let target = Arc::clone(&slave);
            let slave_id = id.clone();
            self.events.set_event(
                verb.as_str(),
                move |op: &Operation| {
                    if !replicate(&mut *target.lock(), op) {
                        tracing::warn!(
                            component = COMPONENT,
                            slave = %slave_id,
                            verb = op.name(),
                            "slave rejected mirrored call"
                        );
                    }
                },
                Some(id.as_str()),
            );
        }
        id
    }

    /// Stops mirroring to the slave with `id`. Returns `false` if unknown.
    pub fn delete_slave(&mut self, id: &str) -> bool {
        self.events.delete_event(id) > 0
    }

    // -----------------------------------------------------------------------
    // Session
    // -----------------------------------------------------------------------

    /// Binds a new backend and starts a fresh session: events and history
    /// are dropped. Returns the previous backend.
    pub fn switch_backend(&mut self, backend: Backend) -> Backend {
        tracing::debug!(
            from = self.backend.kind(),
            to = backend.kind(),
            "switching storage backend"
        );
        self.events.clear();
        self.log = OperationLog::new(self.log.limit_bytes(), self.log.policy());
        std::mem::replace(&mut self.backend, backend)
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn has_cipher(&self) -> bool {
        self.cipher.is_some()
    }

    pub fn into_shared(self) -> SharedStorage {
        Arc::new(Mutex::new(self))
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn write(&mut self, forward: Operation) -> bool {
        let verb = forward.name();
        let result = self.try_write(forward);
        self.report(verb, result).is_some()
    }

    fn try_write(&mut self, forward: Operation) -> Result<()> {
        if self.version_control {
            let revert = self.revert_for(&forward)?;
            self.log.add_operation(forward.clone(), revert);
        }
        if let Err(err) = apply_operation(&mut self.backend, self.cipher.as_deref(), &forward) {
            // A record whose forward never applied would block every redo past it.
            if self.version_control {
                self.log.discard_latest();
            }
            return Err(err);
        }
        self.events.dispatch_event(forward.name(), &forward);
        Ok(())
    }

    fn revert_for(&mut self, forward: &Operation) -> Result<Option<Operation>> {
        let cipher = self.cipher.as_deref();
        let revert = match forward {
            Operation::Set { key, .. } => match read_plain(&mut self.backend, cipher, key)? {
                Some(previous) => Operation::set(key.as_str(), previous),
                None => Operation::delete(key.as_str()),
            },
            Operation::Delete { key } => {
                let previous = read_plain(&mut self.backend, cipher, key)?
                    .ok_or_else(|| StorageError::KeyNotFound(key.clone()))?;
                Operation::set(key.as_str(), previous)
            },
            Operation::Loads { snapshot } | Operation::Restore { snapshot } => {
                parse_snapshot(snapshot)?;
                Operation::Restore {
                    snapshot: snapshot_plain(&mut self.backend, cipher)?,
                }
            },
            Operation::Clean | Operation::Load { .. } => Operation::Restore {
                snapshot: snapshot_plain(&mut self.backend, cipher)?,
            },
        };
        Ok(Some(revert))
    }

    fn report<T>(&self, verb: &str, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(
                    component = COMPONENT,
                    verb,
                    backend = self.backend.kind(),
                    error = %err,
                    "storage call failed"
                );
                None
            },
        }
    }
}

/// Applies `op` to the backend, sealing values when a cipher is set.
fn apply_operation(backend: &mut Backend, cipher: Option<&dyn Cipher>, op: &Operation) -> Result<()> {
    match op {
        Operation::Set { key, value } => {
            let stored = match cipher {
                Some(cipher) => cipher::seal(cipher, value)?,
                None => value.clone(),
            };
            backend.set(key, stored)
        },
        Operation::Delete { key } => backend.delete(key),
        Operation::Clean => backend.clean(),
        Operation::Load { path } => {
            let snapshot = fs::read_to_string(path)?;
            load_snapshot(backend, cipher, &snapshot)
        },
        Operation::Loads { snapshot } => load_snapshot(backend, cipher, snapshot),
        Operation::Restore { snapshot } => {
            backend.clean()?;
            load_snapshot(backend, cipher, snapshot)
        },
    }
}

fn load_snapshot(backend: &mut Backend, cipher: Option<&dyn Cipher>, snapshot: &str) -> Result<()> {
    let Some(cipher) = cipher else {
        return backend.loads(snapshot);
    };
    for (key, value) in parse_snapshot(snapshot)? {
        backend.set(&key, cipher::seal(cipher, &value)?)?;
    }
    Ok(())
}

fn read_plain(backend: &mut Backend, cipher: Option<&dyn Cipher>, key: &str) -> Result<Option<Value>> {
    match (backend.get(key)?, cipher) {
        (Some(stored), Some(cipher)) => cipher::open(cipher, stored).map(Some),
        (stored, _) => Ok(stored),
    }
}

fn snapshot_plain(backend: &mut Backend, cipher: Option<&dyn Cipher>) -> Result<String> {
    if cipher.is_none() {
        return backend.dumps();
    }
    let mut snapshot = Map::new();
    for key in backend.keys("*")? {
        if let Some(value) = read_plain(backend, cipher, &key)? {
            snapshot.insert(key, value);
        }
    }
    Ok(serde_json::to_string(&Value::Object(snapshot))?)
}

fn replicate<S: Slave + ?Sized>(slave: &mut S, op: &Operation) -> bool {
    match op {
        Operation::Set { key, value } => slave.set(key, value.clone()),
        Operation::Delete { key } => slave.delete(key),
        Operation::Clean => slave.clean(),
        Operation::Load { path } => slave.load(path),
        Operation::Loads { snapshot } => slave.loads(snapshot),
        Operation::Restore { snapshot } => slave.clean() && slave.loads(snapshot),
    }
}

impl Default for SingletonKeyValueStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Slave for SingletonKeyValueStorage {
    fn slave_id(&self) -> Option<&str> {
        self.slave_id.as_deref()
    }

    fn assign_slave_id(&mut self, id: String) {
        assert!(
            self.slave_id.is_none(),
            "storage already has slave id {:?}",
            self.slave_id
        );
        self.slave_id = Some(id);
    }

    fn set(&mut self, key: &str, value: Value) -> bool {
        SingletonKeyValueStorage::set(self, key, value)
    }

    fn delete(&mut self, key: &str) -> bool {
        SingletonKeyValueStorage::delete(self, key)
    }

    fn clean(&mut self) -> bool {
        SingletonKeyValueStorage::clean(self)
    }

    fn load(&mut self, path: &Path) -> bool {
        SingletonKeyValueStorage::load(self, path)
    }

    fn loads(&mut self, snapshot: &str) -> bool {
        SingletonKeyValueStorage::loads(self, snapshot)
    }
}

impl fmt::Debug for SingletonKeyValueStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingletonKeyValueStorage")
            .field("backend", &self.backend.kind())
            .field("version_control", &self.version_control)
            .field("versions", &self.log.len())
            .field("events", &self.events.len())
            .field("encrypted", &self.cipher.is_some())
            .finish()
    }
}

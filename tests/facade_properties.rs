// ==============================================
// FACADE BEHAVIOR TESTS (integration)
// ==============================================
//
// End-to-end properties of SingletonKeyValueStorage: snapshot round-trips,
// bounded backends, undo/redo, redo-branch truncation, glob listing, value
// encryption, replication and sentinel conversion of backend failures.

use std::sync::{Arc, OnceLock};

use kvfacade::cache::EvictionPolicy;
use kvfacade::cipher::{is_sealed, RsaChunkCipher};
use kvfacade::error::{StorageError, VersionError};
use kvfacade::facade::DEFAULT_SLAVE_VERBS;
use kvfacade::store::{Backend, BackendAdapter};
use kvfacade::{Result, SingletonKeyValueStorage};
use parking_lot::Mutex;
use serde_json::{json, Value};

fn test_cipher() -> RsaChunkCipher {
    static CIPHER: OnceLock<RsaChunkCipher> = OnceLock::new();
    CIPHER
        .get_or_init(|| RsaChunkCipher::generate(512).unwrap())
        .clone()
}

fn encrypted_storage() -> SingletonKeyValueStorage {
    SingletonKeyValueStorage::builder()
        .cipher(test_cipher())
        .build()
}

// ==============================================
// Snapshot Round-Trip
// ==============================================

mod round_trip {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// dumps -> clean -> loads reproduces the keyspace.
        #[test]
        fn prop_dumps_clean_loads(
            entries in prop::collection::vec(("[a-z]{1,8}", 0i64..1000), 0..40)
        ) {
            let mut storage = SingletonKeyValueStorage::new();
            for (key, n) in &entries {
                let stored = storage.set(key, json!({ "n": n }));
                prop_assert!(stored);
            }

            let before = storage.dumps().unwrap();
            prop_assert!(storage.clean());
            prop_assert_eq!(storage.keys("*"), Some(vec![]));
            prop_assert!(storage.loads(&before));
            prop_assert_eq!(storage.dumps().unwrap(), before);
        }
    }

    #[test]
    fn dump_and_load_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");

        let mut source = SingletonKeyValueStorage::new();
        source.set("a", json!({"x": [1, 2]}));
        source.set("b", json!({"y": "z"}));
        assert!(source.dump(&path));

        let mut target = SingletonKeyValueStorage::new();
        assert!(target.load(&path));
        assert_eq!(target.dumps(), source.dumps());
    }

    #[test]
    fn load_of_missing_file_is_false() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = SingletonKeyValueStorage::new();
        storage.set("a", json!(1));
        let before = storage.dumps().unwrap();

        assert!(!storage.load(dir.path().join("absent.json")));
        assert_eq!(storage.dumps().unwrap(), before);
    }

    #[test]
    fn undo_load_restores_prior_keyspace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, r#"{"b": 2, "c": 3}"#).unwrap();

        let mut storage = SingletonKeyValueStorage::new();
        storage.set("a", json!(1));
        storage.set("b", json!(0));
        let before = storage.dumps().unwrap();

        assert!(storage.load(&path));
        assert_eq!(storage.get("b"), Some(json!(2)));
        assert!(storage.revert_one_operation().unwrap());
        assert_eq!(storage.dumps().unwrap(), before);
    }
}

// ==============================================
// Bounded Backend
// ==============================================

mod bounded_backend {
    use super::*;

    // key (1 byte) + {"v":N} (7 bytes)
    const ENTRY: usize = 8;

    fn bounded(entries: usize, policy: EvictionPolicy) -> SingletonKeyValueStorage {
        SingletonKeyValueStorage::builder()
            .backend(Backend::bounded(ENTRY * entries, policy))
            .build()
    }

    #[test]
    fn lru_read_protects_key_from_eviction() {
        let mut storage = bounded(3, EvictionPolicy::Lru);
        storage.set("A", json!({"v": 1}));
        storage.set("B", json!({"v": 2}));
        storage.set("C", json!({"v": 3}));

        assert_eq!(storage.get("A"), Some(json!({"v": 1})));
        storage.set("D", json!({"v": 4}));

        assert_eq!(storage.exists("A"), Some(true));
        assert_eq!(storage.exists("B"), Some(false));
        assert_eq!(storage.exists("C"), Some(true));
        assert_eq!(storage.exists("D"), Some(true));
    }

    #[test]
    fn fifo_read_does_not_protect_key() {
        let mut storage = bounded(3, EvictionPolicy::Fifo);
        storage.set("A", json!({"v": 1}));
        storage.set("B", json!({"v": 2}));
        storage.set("C", json!({"v": 3}));

        storage.get("A");
        storage.set("D", json!({"v": 4}));

        assert_eq!(storage.exists("A"), Some(false));
        assert_eq!(storage.exists("B"), Some(true));
    }

    #[test]
    fn usage_stays_within_budget() {
        let mut storage = bounded(4, EvictionPolicy::Lru);
        for n in 0..50 {
            let key = ((b'a' + (n % 26) as u8) as char).to_string();
            storage.set(&key, json!({"v": n % 10}));
            match storage.backend() {
                Backend::Bounded(cache) => {
                    assert!(cache.bytes_used() <= ENTRY * 4);
                    cache.check_invariants().unwrap();
                },
                other => panic!("unexpected backend {other:?}"),
            }
        }
    }
}

// ==============================================
// Undo / Redo
// ==============================================

mod undo_redo {
    use super::*;

    #[test]
    fn to_version_restores_each_snapshot() {
        let mut storage = SingletonKeyValueStorage::new();

        storage.set("k", json!({"v": 1}));
        let v_a = storage.current_version().unwrap().to_string();
        let snapshot_a = storage.dumps().unwrap();

        storage.set("k", json!({"v": 2}));
        let v_b = storage.current_version().unwrap().to_string();
        let snapshot_b = storage.dumps().unwrap();

        storage.to_version(&v_a).unwrap();
        assert_eq!(storage.dumps().unwrap(), snapshot_a);

        storage.to_version(&v_b).unwrap();
        assert_eq!(storage.dumps().unwrap(), snapshot_b);
    }

    #[test]
    fn new_write_after_undo_truncates_redo_branch() {
        let mut storage = SingletonKeyValueStorage::new();

        storage.set("k", json!({"v": 1}));
        let v_a = storage.current_version().unwrap().to_string();
        storage.set("k", json!({"v": 2}));
        let v_b = storage.current_version().unwrap().to_string();

        storage.to_version(&v_a).unwrap();
        assert!(storage.set("k", json!({"v": 3})));

        let err = storage.to_version(&v_b).unwrap_err();
        assert!(matches!(
            err,
            StorageError::Version(VersionError::UnknownVersion(ref id)) if id == &v_b
        ));
        assert_eq!(storage.versions().len(), 2);
        assert_eq!(storage.get("k"), Some(json!({"v": 3})));
    }

    #[test]
    fn failed_writes_leave_no_version_behind() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = SingletonKeyValueStorage::new();

        assert!(storage.set("a", json!(1)));
        let first = storage.current_version().unwrap().to_string();

        assert!(!storage.loads("not json"));
        assert!(!storage.loads("[1, 2]"));
        assert!(!storage.load(dir.path().join("absent.json")));
        assert_eq!(storage.versions().len(), 1);
        assert_eq!(storage.current_version(), Some(first.as_str()));

        assert!(storage.set("b", json!(2)));
        let last = storage.current_version().unwrap().to_string();
        assert_eq!(storage.versions().len(), 2);

        storage.to_version(&first).unwrap();
        assert_eq!(storage.dumps().unwrap(), r#"{"a":1}"#);
        storage.to_version(&last).unwrap();
        assert_eq!(storage.current_version(), Some(last.as_str()));
        assert_eq!(storage.dumps().unwrap(), r#"{"a":1,"b":2}"#);
        storage.operation_log().check_invariants().unwrap();
    }

    #[test]
    fn undo_of_delete_restores_value() {
        let mut storage = SingletonKeyValueStorage::new();
        storage.set("k", json!({"keep": true}));
        storage.delete("k");
        assert_eq!(storage.get("k"), None);

        storage.revert_one_operation().unwrap();
        assert_eq!(storage.get("k"), Some(json!({"keep": true})));
    }

    #[test]
    fn bounded_log_keeps_recent_history() {
        let mut storage = SingletonKeyValueStorage::builder()
            .log_limit_mb(0.001)
            .build();
        for n in 0..200 {
            storage.set("k", json!({ "n": n }));
        }

        let log = storage.operation_log();
        assert!(log.len() < 200);
        assert!(log.bytes_used() <= log.limit_bytes());
        log.check_invariants().unwrap();

        let oldest = storage.versions()[0].clone();
        storage.to_version(&oldest).unwrap();
        let expected = 200 - storage.versions().len();
        assert_eq!(storage.get("k"), Some(json!({ "n": expected })));
    }
}

// ==============================================
// Glob Listing
// ==============================================

#[test]
fn keys_filters_by_glob() {
    for backend in [
        Backend::memory(),
        Backend::bounded(0, EvictionPolicy::Fifo),
    ] {
        let mut storage = SingletonKeyValueStorage::builder().backend(backend).build();
        for key in ["alpha", "abeta", "gamma"] {
            storage.set(key, json!({}));
        }
        let mut keys = storage.keys("a*").unwrap();
        keys.sort();
        assert_eq!(keys, vec!["abeta", "alpha"]);
        assert_eq!(storage.keys("?amma"), Some(vec!["gamma".to_string()]));
    }
}

// ==============================================
// Encryption
// ==============================================

mod encryption {
    use super::*;

    fn stored_value(storage: &SingletonKeyValueStorage, key: &str) -> Option<Value> {
        match storage.backend() {
            Backend::Memory(store) => store.peek(key).cloned(),
            _ => None,
        }
    }

    #[test]
    fn get_returns_plaintext_of_sealed_value() {
        let mut storage = encrypted_storage();
        assert!(storage.set("k", json!({"data": 1})));

        let raw = stored_value(&storage, "k").unwrap();
        assert!(is_sealed(&raw));
        assert_ne!(raw, json!({"data": 1}));
        assert_eq!(storage.get("k"), Some(json!({"data": 1})));
    }

    #[test]
    fn dumps_and_undo_work_with_cipher() {
        let mut storage = encrypted_storage();
        storage.set("k", json!({"v": 1}));
        storage.set("k", json!({"v": 2}));
        assert_eq!(storage.dumps(), Some(r#"{"k":{"v":2}}"#.to_string()));

        storage.revert_one_operation().unwrap();
        assert!(is_sealed(&stored_value(&storage, "k").unwrap()));
        assert_eq!(storage.get("k"), Some(json!({"v": 1})));

        assert!(storage.loads(r#"{"other": {"w": 3}}"#));
        assert!(is_sealed(&stored_value(&storage, "other").unwrap()));
    }

    #[test]
    fn encrypted_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.enc");
        let cipher = test_cipher();

        let mut source = SingletonKeyValueStorage::new();
        source.set("a", json!({"secret": "value"}));
        assert!(source.dump_encrypted(&path, &cipher));

        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert!(serde_json::from_str::<Value>(&on_disk).is_err());

        let mut target = SingletonKeyValueStorage::new();
        assert!(target.load_encrypted(&path, &cipher));
        assert_eq!(target.get("a"), Some(json!({"secret": "value"})));
    }

    #[test]
    fn public_only_cipher_cannot_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.enc");
        let cipher = test_cipher();
        let public = RsaChunkCipher::from_pem(&cipher.public_key_pem().unwrap(), None).unwrap();

        let mut source = SingletonKeyValueStorage::new();
        source.set("a", json!(1));
        assert!(source.dump_encrypted(&path, &public));

        let mut target = SingletonKeyValueStorage::new();
        assert!(!target.load_encrypted(&path, &public));
        assert!(target.load_encrypted(&path, &cipher));
    }
}

// ==============================================
// Replication
// ==============================================

#[test]
fn slave_receives_plaintext_and_applies_its_own_cipher() {
    let replica = Arc::new(Mutex::new(encrypted_storage()));
    let mut primary = SingletonKeyValueStorage::new();
    primary.add_slave(Arc::clone(&replica), &DEFAULT_SLAVE_VERBS);

    primary.set("a", json!({"n": 1}));
    primary.set("b", json!({"n": 2}));
    primary.delete("b");

    let mut replica = replica.lock();
    assert_eq!(replica.keys("*"), Some(vec!["a".to_string()]));
    assert_eq!(replica.get("a"), Some(json!({"n": 1})));
}

// ==============================================
// Sentinel Conversion
// ==============================================

mod failing_backend {
    use super::*;

    struct Offline;

    fn offline<T>() -> Result<T> {
        Err(StorageError::Backend("offline".into()))
    }

    impl BackendAdapter for Offline {
        fn exists(&self, _key: &str) -> Result<bool> {
            offline()
        }

        fn set(&mut self, _key: &str, _value: Value) -> Result<()> {
            offline()
        }

        fn get(&mut self, _key: &str) -> Result<Option<Value>> {
            offline()
        }

        fn delete(&mut self, _key: &str) -> Result<()> {
            offline()
        }

        fn keys(&self, _pattern: &str) -> Result<Vec<String>> {
            offline()
        }
    }

    fn storage() -> SingletonKeyValueStorage {
        SingletonKeyValueStorage::builder()
            .backend(Backend::custom(Offline))
            .build()
    }

    #[test]
    fn write_verbs_return_false() {
        let mut storage = storage();
        assert!(!storage.set("k", json!(1)));
        assert!(!storage.delete("k"));
        assert!(!storage.clean());
        assert!(!storage.loads("{}"));
        assert!(storage.versions().is_empty());
    }

    #[test]
    fn read_verbs_return_none() {
        let mut storage = storage();
        assert_eq!(storage.exists("k"), None);
        assert_eq!(storage.keys("*"), None);
        assert_eq!(storage.get("k"), None);
        assert_eq!(storage.dumps(), None);

        let dir = tempfile::tempdir().unwrap();
        assert!(!storage.dump(dir.path().join("out.json")));
    }

    // In-memory sink for formatted log lines.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn has_field(output: &str, name: &str, value: &str) -> bool {
        output.contains(&format!("{name}=\"{value}\""))
            || output.contains(&format!("{name}={value}"))
    }

    #[test]
    fn failures_are_logged_as_warnings() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(captured.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            let mut storage = storage();
            assert!(!storage.set("k", json!(1)));
            assert_eq!(storage.keys("*"), None);
        });

        let output = captured.contents();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2, "unexpected log output: {output}");
        assert!(lines.iter().all(|line| line.contains("WARN")));
        assert!(lines
            .iter()
            .all(|line| has_field(line, "component", "SingletonKeyValueStorage")));
        assert!(has_field(lines[0], "verb", "set"));
        assert!(has_field(lines[1], "verb", "keys"));
        assert!(lines
            .iter()
            .all(|line| line.contains("error=backend error: offline")));
    }

    #[test]
    fn events_do_not_fire_on_failure() {
        let fired = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&fired);
        let mut storage = storage();
        storage.set_event("set", move |_| *counter.lock() += 1, None);
        storage.set("k", json!(1));
        assert_eq!(*fired.lock(), 0);
    }
}

mod common;
use common::{tmp_dir, ENV_LOCK};

use chrono::{Duration, Utc};
use cloudharvest::stores::{CredentialKey, CredentialRecord, CredentialStore};
use serde_json::Value;

fn future_expiry() -> String {
    (Utc::now().naive_utc() + Duration::hours(2))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

#[tokio::test]
async fn roundtrip_and_tolerant_reads() {
    let _guard = ENV_LOCK.lock().await;
    let dir = tmp_dir("cred-roundtrip");
    let store = CredentialStore::new(&dir);
    let key = CredentialKey::Organization;

    assert!(store.read(&key).is_none(), "missing file reads as absent");

    let record = CredentialRecord::active("tok-1", future_expiry());
    store.write(&key, &record).expect("write record");
    let loaded = store.read(&key).expect("record present");
    assert_eq!(loaded.token, "tok-1");
    assert!(loaded.is_usable(Utc::now().naive_utc()));

    std::fs::write(store.path_for(&key), "{not json").expect("corrupt file");
    assert!(
        store.read(&key).is_none(),
        "corrupt file reads as absent and forces a refresh"
    );
}

#[tokio::test]
async fn record_files_use_camel_case_fields() {
    let _guard = ENV_LOCK.lock().await;
    let dir = tmp_dir("cred-shape");
    let store = CredentialStore::new(&dir);
    let key = CredentialKey::Tenant("t-7".to_string());

    store
        .write(&key, &CredentialRecord::active("tok-7", future_expiry()))
        .expect("write record");

    let raw = std::fs::read_to_string(store.path_for(&key)).expect("read file");
    let parsed: Value = serde_json::from_str(&raw).expect("valid json");
    assert!(parsed.get("expiresAt").is_some(), "expiresAt is camelCase");
    assert_eq!(parsed.get("locked"), Some(&Value::Bool(false)));
    assert!(
        parsed.get("lockedSince").is_none(),
        "unlocked records omit lockedSince"
    );
}

#[tokio::test]
async fn acquire_marks_the_record_locked_until_completed() {
    let _guard = ENV_LOCK.lock().await;
    let dir = tmp_dir("cred-lease");
    let store = CredentialStore::new(&dir);
    let key = CredentialKey::Organization;

    let lease = store
        .acquire(&key, Utc::now().naive_utc())
        .expect("acquire lease");

    let placeholder = store.read(&key).expect("placeholder present");
    assert!(placeholder.locked);
    assert!(placeholder.token.is_empty());
    assert!(
        !placeholder.is_usable(Utc::now().naive_utc()),
        "locked placeholder must never be usable"
    );

    lease
        .complete(&CredentialRecord::active("fresh", future_expiry()))
        .expect("complete lease");
    let finished = store.read(&key).expect("record present");
    assert!(!finished.locked);
    assert_eq!(finished.token, "fresh");
}

#[tokio::test]
async fn abandoned_lease_rolls_the_placeholder_back() {
    let _guard = ENV_LOCK.lock().await;
    let dir = tmp_dir("cred-abandon");
    let store = CredentialStore::new(&dir);
    let key = CredentialKey::Tenant("t-1".to_string());

    {
        let _lease = store
            .acquire(&key, Utc::now().naive_utc())
            .expect("acquire lease");
        // dropped without complete(), as after a failed refresh call
    }

    assert!(
        store.read(&key).is_none(),
        "placeholder is removed so later runs refresh immediately"
    );
}

#[tokio::test]
async fn completed_lease_survives_drop() {
    let _guard = ENV_LOCK.lock().await;
    let dir = tmp_dir("cred-keep");
    let store = CredentialStore::new(&dir);
    let key = CredentialKey::Organization;

    let lease = store
        .acquire(&key, Utc::now().naive_utc())
        .expect("acquire lease");
    lease
        .complete(&CredentialRecord::active("kept", future_expiry()))
        .expect("complete lease");

    let record = store.read(&key).expect("record present");
    assert_eq!(record.token, "kept", "completion must not be rolled back");
}
